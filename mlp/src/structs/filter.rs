//! Prediction filter parameter blocks.
//!
//! Each channel carries an FIR filter and an IIR filter of combined order
//! at most 8. Coefficients are transmitted at a configurable width and
//! left-shifted into a fixed 16-bit budget; only the IIR filter may preset
//! its state.

use anyhow::{Result, bail};

use crate::process::MAX_FILTER_ORDER;
use crate::process::decode::DecoderState;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::FilterError;

/// Which of the channel's two prediction filters a parameter block updates.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum FilterType {
    Fir = 0,
    Iir = 1,
}

impl FilterType {
    fn letter(self) -> char {
        match self {
            FilterType::Fir => 'F',
            FilterType::Iir => 'I',
        }
    }
}

/// Reads one filter parameter block into the channel state.
pub fn read_filter_params(
    state: &mut DecoderState,
    reader: &mut BsIoSliceReader,
    ch: usize,
    filter: FilterType,
) -> Result<()> {
    let f = filter as usize;

    let order = reader.get_n::<u8>(4)? as usize;

    if order > MAX_FILTER_ORDER {
        bail!(FilterError::OrderTooHigh {
            filter: filter.letter(),
            order
        });
    }

    state.channel[ch].filter_order[f] = order;

    if order == 0 {
        return Ok(());
    }

    state.channel[ch].filter_coeff_q[f] = reader.get_n::<u8>(4)? as u32;

    let coeff_bits = reader.get_n::<u8>(5)? as u32;
    let coeff_shift = reader.get_n::<u8>(3)? as u32;

    if !(1..=16).contains(&coeff_bits) {
        bail!(FilterError::InvalidCoeffBits {
            filter: filter.letter(),
            bits: coeff_bits
        });
    }

    if coeff_bits + coeff_shift > 16 {
        bail!(FilterError::CoeffBitsPlusShiftTooHigh {
            filter: filter.letter(),
            total: coeff_bits + coeff_shift
        });
    }

    for i in 0..order {
        state.channel[ch].filter_coeff[f][i] = reader.get_s::<i32>(coeff_bits)? << coeff_shift;
    }

    // State preset flag.
    if reader.get()? {
        if filter == FilterType::Fir {
            bail!(FilterError::FirStateSpecified);
        }

        let state_bits = reader.get_n::<u8>(4)? as u32;
        let state_shift = reader.get_n::<u8>(4)? as u32;

        for i in 0..order {
            state.channel[ch].filter_state[f][i] = if state_bits == 0 {
                0
            } else {
                reader.get_s::<i32>(state_bits)? << state_shift
            };
        }
    }

    Ok(())
}
