//! Primitive matrix parameter blocks.
//!
//! A primitive matrix rewrites one destination channel as a 2.14
//! fixed-point combination of the matrix channels. `0x31EA` substreams
//! extend the source range by two noise channels; `0x31EB` substreams dither
//! the accumulator from the noise table instead, scaled per matrix.

use anyhow::{Result, bail};

use crate::process::decode::DecoderState;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::MatrixError;

/// Reads the matrix section of a decoding-parameter block.
pub fn read_matrix_params(
    state: &mut DecoderState,
    reader: &mut BsIoSliceReader,
    substr: usize,
) -> Result<()> {
    let num_primitive_matrices = reader.get_n::<u8>(4)? as usize;

    let ss = &mut state.substream[substr];
    ss.num_primitive_matrices = num_primitive_matrices;

    for mat in 0..num_primitive_matrices {
        let dest = reader.get_n::<u8>(4)? as usize;
        let frac_bits = reader.get_n::<u8>(4)? as u32;

        ss.lsb_bypass[mat] = reader.get()?;

        if dest > ss.max_channel {
            bail!(MatrixError::DestinationOutOfRange(dest));
        }

        if frac_bits > 14 {
            bail!(MatrixError::FracBitsTooHigh(frac_bits));
        }

        ss.matrix_ch[mat] = dest;

        let mut max_chan = ss.max_matrix_channel;
        if ss.restart_sync_word == 0x31EA {
            max_chan += 2;
        }

        for ch in 0..=max_chan {
            let coeff = if reader.get()? {
                reader.get_s::<i32>(frac_bits + 2)?
            } else {
                0
            };

            // Stored in 2.14 regardless of the transmitted precision.
            ss.matrix_coeff[mat][ch] = coeff << (14 - frac_bits);
        }

        ss.matrix_noise_shift[mat] = if ss.restart_sync_word == 0x31EB {
            reader.get_n::<u8>(4)? as u32
        } else {
            0
        };
    }

    Ok(())
}
