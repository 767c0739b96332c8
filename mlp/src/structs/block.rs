//! Decoding-parameter blocks and block data.
//!
//! A block optionally refreshes decoding parameters, then carries
//! `blocksize` entropy-coded samples per coded channel. Parameter sections
//! appear in a fixed order gated by the substream's presence-flag byte:
//!
//! | bit  | section           |
//! |------|-------------------|
//! | 0x80 | block size        |
//! | 0x40 | matrices          |
//! | 0x20 | output shifts     |
//! | 0x10 | quant step sizes  |
//! | 0x08 | FIR filter        |
//! | 0x04 | IIR filter        |
//! | 0x02 | Huffman offset    |
//!
//! The per-channel codebook and LSB count have no presence flag of their
//! own; they are re-read whenever a channel's parameter bit is set.

use anyhow::{Result, anyhow, bail};

use crate::log_or_err;
use crate::process::decode::DecoderState;
use crate::process::{MAX_BLOCKSIZE, MAX_FILTER_ORDER, MAX_MATRICES};
use crate::structs::filter::{FilterType, read_filter_params};
use crate::structs::matrix::read_matrix_params;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::{BlockError, FilterError};

/// Maximum LSB count; a larger value would overflow the 24-bit sample path.
const MAX_HUFF_LSBS: u32 = 24;

/// Reads a decoding-parameter block.
pub fn read_decoding_params(
    state: &mut DecoderState,
    reader: &mut BsIoSliceReader,
    substr: usize,
) -> Result<()> {
    if reader.get()? {
        state.substream[substr].param_presence_flags = reader.get_n(8)?;
    }

    let flags = state.substream[substr].param_presence_flags;

    if flags & 0x80 != 0 && reader.get()? {
        let blocksize = reader.get_n::<u16>(9)? as usize;

        if blocksize > MAX_BLOCKSIZE {
            state.substream[substr].blocksize = 0;
            bail!(BlockError::BlocksizeTooLarge(blocksize));
        }

        state.substream[substr].blocksize = blocksize;
    }

    if flags & 0x40 != 0 && reader.get()? {
        read_matrix_params(state, reader, substr)?;
    }

    if flags & 0x20 != 0 && reader.get()? {
        for ch in 0..=state.substream[substr].max_matrix_channel {
            state.substream[substr].output_shift[ch] = reader.get_s(4)?;
        }
    }

    if flags & 0x10 != 0 && reader.get()? {
        for ch in 0..=state.substream[substr].max_channel {
            let quant_step_size = reader.get_n::<u8>(4)? as u32;

            state.substream[substr].quant_step_size[ch] = quant_step_size;
            state.channel[ch].calculate_sign_huff(quant_step_size);
        }
    }

    for ch in state.substream[substr].min_channel..=state.substream[substr].max_channel {
        // params_for_this_chan
        if !reader.get()? {
            continue;
        }

        if flags & 0x08 != 0 && reader.get()? {
            read_filter_params(state, reader, ch, FilterType::Fir)?;
        }

        if flags & 0x04 != 0 && reader.get()? {
            read_filter_params(state, reader, ch, FilterType::Iir)?;
        }

        let channel = &state.channel[ch];
        let (fir_order, iir_order) = (channel.filter_order[0], channel.filter_order[1]);

        if fir_order + iir_order > MAX_FILTER_ORDER {
            bail!(FilterError::TotalOrderTooHigh(fir_order + iir_order));
        }

        if fir_order > 0 && iir_order > 0 && channel.filter_coeff_q[0] != channel.filter_coeff_q[1]
        {
            bail!(FilterError::PrecisionMismatch(ch));
        }

        if fir_order == 0 && iir_order > 0 {
            state.channel[ch].filter_coeff_q[0] = state.channel[ch].filter_coeff_q[1];
        }

        if flags & 0x02 != 0 && reader.get()? {
            state.channel[ch].huff_offset = reader.get_s(15)?;
        }

        state.channel[ch].codebook = reader.get_n::<u8>(2)? as usize;
        state.channel[ch].huff_lsbs = reader.get_n::<u8>(5)? as u32;

        if state.channel[ch].huff_lsbs > MAX_HUFF_LSBS {
            bail!(BlockError::HuffLsbsTooLarge {
                channel: ch,
                actual: state.channel[ch].huff_lsbs
            });
        }

        let quant_step_size = state.substream[substr].quant_step_size[ch];
        state.channel[ch].calculate_sign_huff(quant_step_size);
    }

    Ok(())
}

/// Reads one sample: an optional Huffman-coded MSB prefix, an optional raw
/// LSB suffix, then the sign correction and the quant-grid shift.
#[inline(always)]
fn read_huff(
    state: &DecoderState,
    reader: &mut BsIoSliceReader,
    substr: usize,
    ch: usize,
) -> Result<i32> {
    let channel = &state.channel[ch];
    let quant_step_size = state.substream[substr].quant_step_size[ch];
    let lsb_bits = channel.huff_lsbs as i32 - quant_step_size as i32;

    let mut result = if channel.codebook > 0 {
        reader.get_huffman(channel.codebook)?
    } else {
        0
    };

    if lsb_bits > 0 {
        result = (result << lsb_bits) + reader.get_n::<u32>(lsb_bits as u32)? as i32;
    }

    result += channel.sign_huff_offset;

    Ok(result << quant_step_size)
}

/// Reads a block of residuals, runs them through the prediction filters,
/// and appends the reconstructed samples to the access unit.
pub fn read_block_data(
    state: &mut DecoderState,
    reader: &mut BsIoSliceReader,
    substr: usize,
) -> Result<()> {
    let blockpos = state.substream[substr].blockpos;
    let blocksize = state.substream[substr].blocksize;

    // Untested in the wild; kept best-effort.
    let expected_stream_pos = if state.substream[substr].data_check_present {
        let base = reader.position()?;
        Some(base + reader.get_n::<u16>(16)? as u64)
    } else {
        None
    };

    if blockpos + blocksize > state.access_unit_size {
        bail!(BlockError::BlockOverflow {
            pos: blockpos,
            blocksize,
            unit: state.access_unit_size
        });
    }

    for row in state.bypassed_lsbs[blockpos..blockpos + blocksize].iter_mut() {
        *row = [0; MAX_MATRICES];
    }

    let min_channel = state.substream[substr].min_channel;
    let max_channel = state.substream[substr].max_channel;
    let num_primitive_matrices = state.substream[substr].num_primitive_matrices;

    for i in blockpos..blockpos + blocksize {
        for mat in 0..num_primitive_matrices {
            if state.substream[substr].lsb_bypass[mat] {
                state.bypassed_lsbs[i][mat] = reader.get()? as i32;
            }
        }

        for ch in min_channel..=max_channel {
            let residual = read_huff(state, reader, substr, ch)?;
            let quant_step_size = state.substream[substr].quant_step_size[ch];

            state.sample_buffer[i][ch] = state.channel[ch].filter(quant_step_size, residual);
        }
    }

    state.substream[substr].blockpos += blocksize;

    if let Some(expected) = expected_stream_pos {
        let actual = reader.position()?;

        if actual != expected {
            log_or_err!(
                state,
                log::Level::Warn,
                anyhow!(BlockError::DataCheckMismatch { expected, actual })
            );
        }

        reader.skip_n(8)?;
    }

    Ok(())
}
