//! Restart headers.
//!
//! A restart header resets a substream's decoding parameters to known
//! defaults and carries the channel layout, the noise generator seed, and
//! the lossless check byte for the samples emitted since the previous
//! restart. Sync word `0x31EA` selects the two-noise-channel rematrix
//! variant, `0x31EB` the noise-table variant.

use anyhow::{Result, anyhow, bail};
use log::{info, trace};

use crate::log_or_err;
use crate::process::MAX_CHANNELS;
use crate::process::decode::{ChannelState, DecoderState, SubstreamState};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::crc::CRC_RESTART_HEADER;
use crate::utils::errors::RestartHeaderError;

/// Parsed restart header fields.
#[derive(Debug, Clone, Default)]
pub struct RestartHeader {
    pub sync_word: u16,
    pub min_channel: usize,
    pub max_channel: usize,
    pub max_matrix_channel: usize,
    pub noise_shift: u32,
    pub noisegen_seed: u32,
    pub data_check_present: bool,
    pub lossless_check: u8,
    pub ch_assign: [usize; MAX_CHANNELS],
    pub checksum: u8,
}

impl RestartHeader {
    /// Reads a restart header and resets the substream to its defaults.
    ///
    /// On a sync-word mismatch the substream state is cleared so a stale
    /// parameter set cannot outlive a corrupted restart.
    pub fn read(
        state: &mut DecoderState,
        reader: &mut BsIoSliceReader,
        substr: usize,
    ) -> Result<Self> {
        let start_pos = reader.position()?;

        let mut rh = Self {
            sync_word: reader.get_n(14)?,
            ..Default::default()
        };

        if rh.sync_word & 0x3FFE != 0x31EA {
            state.substream[substr] = SubstreamState::default();
            bail!(RestartHeaderError::SyncMismatch(rh.sync_word));
        }

        // Output timestamp.
        reader.skip_n(16)?;

        rh.min_channel = reader.get_n::<u8>(4)? as usize;
        rh.max_channel = reader.get_n::<u8>(4)? as usize;
        rh.max_matrix_channel = reader.get_n::<u8>(4)? as usize;

        if rh.min_channel > rh.max_channel {
            state.substream[substr] = SubstreamState::default();
            bail!(RestartHeaderError::ChannelRangeInverted {
                substream: substr,
                min: rh.min_channel,
                max: rh.max_channel
            });
        }

        if rh.max_channel > rh.max_matrix_channel {
            state.substream[substr] = SubstreamState::default();
            bail!(RestartHeaderError::ChannelBeyondMatrix {
                substream: substr,
                max: rh.max_channel,
                max_matrix: rh.max_matrix_channel
            });
        }

        if let Some(request_channels) = state.request_channels {
            if rh.max_channel + 1 >= request_channels && substr < state.max_decoded_substream {
                info!(
                    "Extracting {} channel downmix from substream {substr}. \
                     Further substreams will be skipped.",
                    rh.max_channel + 1
                );
                state.max_decoded_substream = substr;
            }
        }

        rh.noise_shift = reader.get_n::<u8>(4)? as u32;
        rh.noisegen_seed = reader.get_n(23)?;

        reader.skip_n(19)?;

        rh.data_check_present = reader.get()?;
        rh.lossless_check = reader.get_n(8)?;

        if substr == state.max_decoded_substream
            && state.substream[substr].lossless_check_data != 0xFFFF_FFFF
        {
            let mut folded = state.substream[substr].lossless_check_data;
            folded ^= folded >> 16;
            folded ^= folded >> 8;
            folded &= 0xFF;

            if folded as u8 != rh.lossless_check {
                log_or_err!(
                    state,
                    log::Level::Warn,
                    anyhow!(RestartHeaderError::LosslessCheckFailed {
                        substream: substr,
                        calculated: folded as u8,
                        read: rh.lossless_check
                    })
                );
            } else {
                trace!("Lossless check passed for substream {substr} ({folded:#04X})");
            }
        }

        reader.skip_n(16)?;

        for ch in 0..=rh.max_matrix_channel {
            let ch_assign = reader.get_n::<u8>(6)? as usize;

            if ch_assign > rh.max_matrix_channel {
                bail!(RestartHeaderError::ChannelAssignOutOfRange {
                    channel: ch,
                    output: ch_assign
                });
            }

            rh.ch_assign[ch_assign] = ch;
        }

        let crc_len = reader.position()? - start_pos;
        let calculated = reader.crc8_check(&CRC_RESTART_HEADER, start_pos, crc_len)?;

        rh.checksum = reader.get_n(8)?;

        if calculated != rh.checksum {
            log_or_err!(
                state,
                log::Level::Warn,
                anyhow!(RestartHeaderError::ChecksumMismatch {
                    calculated,
                    read: rh.checksum
                })
            );
        }

        // Reset to the default decoding parameters.
        let ss = &mut state.substream[substr];
        ss.restart_sync_word = rh.sync_word;
        ss.min_channel = rh.min_channel;
        ss.max_channel = rh.max_channel;
        ss.max_matrix_channel = rh.max_matrix_channel;
        ss.noise_shift = rh.noise_shift;
        ss.noisegen_seed = rh.noisegen_seed;
        ss.data_check_present = rh.data_check_present;
        ss.ch_assign = rh.ch_assign;

        ss.param_presence_flags = 0xFF;
        ss.num_primitive_matrices = 0;
        ss.blocksize = 8;
        ss.lossless_check_data = 0;
        ss.output_shift = [0; MAX_CHANNELS];
        ss.quant_step_size = [0; MAX_CHANNELS];

        for ch in rh.min_channel..=rh.max_channel {
            state.channel[ch] = ChannelState::default();
            state.channel[ch].calculate_sign_huff(0);
        }

        Ok(rh)
    }
}
