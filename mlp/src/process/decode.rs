use anyhow::{Result, anyhow, bail};
use log::{debug, info, warn};

use crate::log_or_err;
use crate::process::{
    MAX_BLOCKSIZE, MAX_BLOCKSIZE_POW2, MAX_CHANNELS, MAX_FILTER_ORDER, MAX_MATRICES,
    MAX_SUBSTREAMS,
};
use crate::structs::block::{read_block_data, read_decoding_params};
use crate::structs::restart_header::RestartHeader;
use crate::structs::sync::{MAJOR_SYNC_FBA, MajorSyncInfo};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::crc::CRC_SUBSTREAM;
use crate::utils::errors::{AccessUnitError, RestartHeaderError};
use crate::utils::noise::{fill_noise_31eb, noise_step_31ea};

/// PCM sample layout of the decoder output.
///
/// 16-bit drops the low 8 bits of the 24-bit samples; 32-bit places them in
/// the upper 24 bits of each word. Both are little-endian interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcmFormat {
    #[default]
    S16,
    S32,
}

impl PcmFormat {
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            PcmFormat::S16 => 2,
            PcmFormat::S32 => 4,
        }
    }
}

/// Decoder construction parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecoderConfig {
    pub pcm_format: PcmFormat,

    /// When set, decoding stops at the first substream that already covers
    /// this many channels; later substreams are skipped.
    pub request_channels: Option<usize>,
}

/// Result of feeding one packet to [`Decoder::read_access_unit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutput {
    /// The packet is too short to hold an access unit header.
    NeedMore,

    /// One access unit was consumed. `pcm_len` is zero when the unit was
    /// skipped while waiting for a major sync.
    Unit { bytes_consumed: usize, pcm_len: usize },
}

/// Decodes MLP/TrueHD access units to PCM audio samples.
#[derive(Default)]
pub struct Decoder {
    state: DecoderState,
}

impl Decoder {
    /// A PCM buffer of this size fits any access unit.
    pub const MAX_PCM_BYTES: usize = MAX_BLOCKSIZE * MAX_CHANNELS * 4;

    pub fn new(config: DecoderConfig) -> Self {
        Self {
            state: DecoderState {
                pcm_format: config.pcm_format,
                request_channels: config.request_channels,
                ..Default::default()
            },
        }
    }

    /// Decodes one access unit from the front of `packet` into `pcm`.
    ///
    /// Any fatal parse error invalidates the stream parameters; decoding
    /// resumes at the next major sync.
    pub fn read_access_unit(&mut self, packet: &[u8], pcm: &mut [u8]) -> Result<DecodeOutput> {
        if packet.len() < 2 {
            return Ok(DecodeOutput::NeedMore);
        }

        match self.state.decode_access_unit(packet, pcm) {
            Ok(output) => Ok(output),
            Err(e) => {
                self.state.params_valid = false;
                Err(e)
            }
        }
    }

    /// Sets the failure level for integrity mismatches.
    ///
    /// - `log::Level::Error`: only fail on hard parse errors (default)
    /// - `log::Level::Warn`: fail on checksum/parity/lossless warnings too
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.state.fail_level = level;
    }

    /// Sampling frequency from the last major sync, 0 before one is seen.
    pub fn sample_rate(&self) -> u32 {
        self.state.sample_rate
    }

    /// Samples per access unit from the last major sync.
    pub fn frame_size(&self) -> usize {
        self.state.access_unit_size
    }

    /// Output channel count of the decoded substream.
    pub fn channels(&self) -> usize {
        self.state.substream[self.state.max_decoded_substream].max_matrix_channel + 1
    }
}

/// Per-channel prediction and entropy parameters.
///
/// Channel indices are global across substreams, so this state is flat on
/// the decoder rather than nested per substream.
#[derive(Debug, Clone, Copy)]
pub struct ChannelState {
    /// Taps in use; index 0 is the FIR filter, index 1 the IIR filter.
    pub filter_order: [usize; 2],
    pub filter_coeff_q: [u32; 2],
    pub filter_coeff: [[i32; MAX_FILTER_ORDER]; 2],
    pub filter_state: [[i32; MAX_FILTER_ORDER]; 2],

    pub huff_offset: i32,
    pub sign_huff_offset: i32,
    pub codebook: usize,
    pub huff_lsbs: u32,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            filter_order: [0; 2],
            filter_coeff_q: [0; 2],
            filter_coeff: [[0; MAX_FILTER_ORDER]; 2],
            filter_state: [[0; MAX_FILTER_ORDER]; 2],
            huff_offset: 0,
            sign_huff_offset: -(1 << 23),
            codebook: 0,
            huff_lsbs: 24,
        }
    }
}

impl ChannelState {
    /// Rebuilds the sign/rounding correction applied to decoded residuals.
    ///
    /// The codebooks are symmetric around zero and the raw-LSB path is
    /// offset binary, so the correction is a single subtraction chosen from
    /// the codebook and the LSB width.
    pub fn calculate_sign_huff(&mut self, quant_step_size: u32) {
        let lsb_bits = self.huff_lsbs as i32 - quant_step_size as i32;
        let sign_shift = lsb_bits
            + if self.codebook > 0 {
                2 - self.codebook as i32
            } else {
                -1
            };

        self.sign_huff_offset = self.huff_offset;

        if sign_shift >= 0 {
            self.sign_huff_offset -= 1 << sign_shift;
        }
    }

    /// Runs one residual through the FIR+IIR predictor pair and updates the
    /// shared state window.
    pub fn filter(&mut self, quant_step_size: u32, residual: i32) -> i32 {
        let mut accum = 0i64;

        for f in 0..2 {
            for i in 0..self.filter_order[f] {
                accum += self.filter_state[f][i] as i64 * self.filter_coeff[f][i] as i64;
            }
        }

        accum >>= self.filter_coeff_q[0];
        let result = ((accum + residual as i64) & !((1i64 << quant_step_size) - 1)) as i32;

        for f in 0..2 {
            self.filter_state[f].copy_within(0..MAX_FILTER_ORDER - 1, 1);
        }

        self.filter_state[0][0] = result;
        self.filter_state[1][0] = (result as i64 - accum) as i32;

        result
    }
}

/// Per-substream restart and decoding-parameter state.
#[derive(Debug, Clone, Copy)]
pub struct SubstreamState {
    pub restart_seen: bool,
    pub restart_sync_word: u16,

    pub min_channel: usize,
    pub max_channel: usize,
    pub max_matrix_channel: usize,
    pub ch_assign: [usize; MAX_CHANNELS],

    pub noise_shift: u32,
    pub noisegen_seed: u32,

    pub data_check_present: bool,
    pub param_presence_flags: u8,

    pub num_primitive_matrices: usize,
    pub matrix_ch: [usize; MAX_MATRICES],
    pub lsb_bypass: [bool; MAX_MATRICES],
    pub matrix_coeff: [[i32; MAX_CHANNELS + 2]; MAX_MATRICES],
    pub matrix_noise_shift: [u32; MAX_MATRICES],

    pub quant_step_size: [u32; MAX_CHANNELS],
    pub blocksize: usize,
    pub blockpos: usize,
    pub output_shift: [i8; MAX_CHANNELS],

    /// Running XOR of all output samples; `0xFFFFFFFF` means "no samples
    /// emitted yet" and suppresses validation at the next restart header.
    pub lossless_check_data: u32,
}

impl Default for SubstreamState {
    fn default() -> Self {
        Self {
            restart_seen: false,
            restart_sync_word: 0,
            min_channel: 0,
            max_channel: 0,
            max_matrix_channel: 0,
            ch_assign: [0; MAX_CHANNELS],
            noise_shift: 0,
            noisegen_seed: 0,
            data_check_present: false,
            param_presence_flags: 0xFF,
            num_primitive_matrices: 0,
            matrix_ch: [0; MAX_MATRICES],
            lsb_bypass: [false; MAX_MATRICES],
            matrix_coeff: [[0; MAX_CHANNELS + 2]; MAX_MATRICES],
            matrix_noise_shift: [0; MAX_MATRICES],
            quant_step_size: [0; MAX_CHANNELS],
            blocksize: 8,
            blockpos: 0,
            output_shift: [0; MAX_CHANNELS],
            lossless_check_data: 0xFFFF_FFFF,
        }
    }
}

#[derive(Debug)]
pub struct DecoderState {
    pub fail_level: log::Level,
    pub pcm_format: PcmFormat,
    pub request_channels: Option<usize>,

    /// Whether valid stream parameters from a major sync have been seen.
    pub params_valid: bool,

    pub num_substreams: usize,
    pub max_decoded_substream: usize,
    pub access_unit_size: usize,
    pub access_unit_size_pow2: usize,
    pub sample_rate: u32,

    pub substream: [SubstreamState; MAX_SUBSTREAMS],
    pub channel: [ChannelState; MAX_CHANNELS],

    pub sample_buffer: [[i32; MAX_CHANNELS + 2]; MAX_BLOCKSIZE],
    pub bypassed_lsbs: [[i32; MAX_MATRICES]; MAX_BLOCKSIZE],
    pub noise_buffer: [i8; MAX_BLOCKSIZE_POW2],
}

impl Default for DecoderState {
    fn default() -> Self {
        Self {
            fail_level: log::Level::Error,
            pcm_format: PcmFormat::default(),
            request_channels: None,
            params_valid: false,
            num_substreams: 0,
            max_decoded_substream: 0,
            access_unit_size: 0,
            access_unit_size_pow2: 0,
            sample_rate: 0,
            substream: [SubstreamState::default(); MAX_SUBSTREAMS],
            channel: [ChannelState::default(); MAX_CHANNELS],
            sample_buffer: [[0; MAX_CHANNELS + 2]; MAX_BLOCKSIZE],
            bypassed_lsbs: [[0; MAX_MATRICES]; MAX_BLOCKSIZE],
            noise_buffer: [0; MAX_BLOCKSIZE_POW2],
        }
    }
}

impl DecoderState {
    fn decode_access_unit(&mut self, packet: &[u8], pcm: &mut [u8]) -> Result<DecodeOutput> {
        let length = (u16::from_be_bytes([packet[0], packet[1]]) & 0xFFF) as usize * 2;

        if length > packet.len() || length < 4 {
            bail!(AccessUnitError::FrameTooShort {
                length,
                available: packet.len()
            });
        }

        let au = &packet[..length];
        let reader = &mut BsIoSliceReader::from_slice(au);

        reader.skip_n(32)?;

        if reader.available()? >= 31 && reader.show_n(31)? == (MAJOR_SYNC_FBA >> 1) as u64 {
            debug!("Found major sync");
            MajorSyncInfo::read(self, reader)?;
        }

        if !self.params_valid {
            warn!("Stream parameters not seen; skipping frame");
            return Ok(DecodeOutput::Unit {
                bytes_consumed: length,
                pcm_len: 0,
            });
        }

        let length_words = length / 2;
        let header_words = (reader.position()? >> 4) as usize;

        let mut substream_parity_present = [false; MAX_SUBSTREAMS];
        let mut substream_data_len = [0usize; MAX_SUBSTREAMS];
        let mut substream_start = 0usize;

        for substr in 0..self.num_substreams {
            let extraword_present = reader.get()?;
            reader.skip_n(1)?;
            let checkdata_present = reader.get()?;
            reader.skip_n(1)?;

            let mut end = reader.get_n::<u16>(12)? as usize;

            if extraword_present {
                reader.skip_n(16)?;
            }

            if end + header_words > length_words {
                log_or_err!(
                    self,
                    log::Level::Warn,
                    anyhow!(AccessUnitError::SubstreamDirectoryOverflow { substream: substr })
                );
                end = length_words.saturating_sub(header_words);
            }

            if substr > self.max_decoded_substream {
                continue;
            }

            if end < substream_start {
                bail!(AccessUnitError::SubstreamDirectoryInverted {
                    substream: substr,
                    end,
                    start: substream_start
                });
            }

            substream_parity_present[substr] = checkdata_present;
            substream_data_len[substr] = end - substream_start;
            substream_start = end;
        }

        let mut offset = (reader.position()? >> 3) as usize;

        for substr in 0..=self.max_decoded_substream {
            let segment_bytes = substream_data_len[substr] * 2;

            if offset + segment_bytes > length {
                bail!(AccessUnitError::SubstreamDirectoryOverflow { substream: substr });
            }

            let segment = &au[offset..offset + segment_bytes];
            let end_bits = (segment_bytes as u64) << 3;
            let reader = &mut BsIoSliceReader::from_slice(segment);

            self.substream[substr].blockpos = 0;

            loop {
                if reader.get()? {
                    if reader.get()? {
                        RestartHeader::read(self, reader, substr)?;
                        self.substream[substr].restart_seen = true;
                    }

                    if !self.substream[substr].restart_seen {
                        bail!(RestartHeaderError::NoRestartHeader(substr));
                    }

                    read_decoding_params(self, reader, substr)?;
                }

                if !self.substream[substr].restart_seen {
                    bail!(RestartHeaderError::NoRestartHeader(substr));
                }

                read_block_data(self, reader, substr)?;

                if reader.position()? >= end_bits || reader.get()? {
                    break;
                }
            }

            reader.align_16bit()?;

            if end_bits.saturating_sub(reader.position()?) >= 48
                && (reader.show_n(32)? == 0xD234_D234 || reader.show_n(20)? == 0xD234E)
            {
                reader.skip_n(18)?;

                if substr == self.max_decoded_substream {
                    info!("End of stream indicated");
                }

                if reader.get()? {
                    let shorten_by =
                        (reader.get_n::<u16>(13)? as usize).min(self.substream[substr].blockpos);
                    self.substream[substr].blockpos -= shorten_by;
                } else {
                    reader.skip_n(13)?;
                }
            }

            if substream_parity_present[substr] {
                let checked_bits = (segment_bytes as u64 - 2) << 3;

                let parity = reader.parity_check(0, checked_bits)?;
                if parity ^ reader.get_n::<u8>(8)? != 0xA9 {
                    log_or_err!(
                        self,
                        log::Level::Warn,
                        anyhow!(AccessUnitError::ParityMismatch { substream: substr })
                    );
                }

                let checksum = reader.crc8_check(&CRC_SUBSTREAM, 0, checked_bits)?;
                let read = reader.get_n::<u8>(8)?;
                if checksum != read {
                    log_or_err!(
                        self,
                        log::Level::Warn,
                        anyhow!(AccessUnitError::ChecksumMismatch {
                            substream: substr,
                            calculated: checksum,
                            read
                        })
                    );
                }
            }

            let cursor = reader.position()?;
            if cursor != end_bits {
                bail!(AccessUnitError::SubstreamLengthMismatch {
                    substream: substr,
                    cursor,
                    expected: end_bits
                });
            }

            offset += segment_bytes;
        }

        self.rematrix_channels(self.max_decoded_substream);

        let pcm_len = self.output_data(self.max_decoded_substream, pcm)?;

        Ok(DecodeOutput::Unit {
            bytes_consumed: length,
            pcm_len,
        })
    }

    /// Applies the primitive matrices in turn, regenerating the noise
    /// channels (variant A) or the shared noise buffer (variant B) first.
    fn rematrix_channels(&mut self, substr: usize) {
        let SubstreamState {
            restart_sync_word,
            max_matrix_channel,
            noise_shift,
            num_primitive_matrices,
            matrix_ch,
            matrix_coeff,
            matrix_noise_shift,
            quant_step_size,
            blockpos,
            ..
        } = self.substream[substr];

        let mut maxchan = max_matrix_channel;
        let mut seed = self.substream[substr].noisegen_seed;

        if restart_sync_word == 0x31EA {
            for i in 0..blockpos {
                let (first, second) = noise_step_31ea(&mut seed);

                self.sample_buffer[i][maxchan + 1] = (first as i32) << noise_shift;
                self.sample_buffer[i][maxchan + 2] = (second as i32) << noise_shift;
            }

            maxchan += 2;
        } else {
            fill_noise_31eb(
                &mut self.noise_buffer[..self.access_unit_size_pow2],
                &mut seed,
            );
        }

        self.substream[substr].noisegen_seed = seed;

        for mat in 0..num_primitive_matrices {
            let dest = matrix_ch[mat];
            let coeffs = &matrix_coeff[mat];
            let quant_mask = !((1i64 << quant_step_size[dest]) - 1);

            for i in 0..blockpos {
                let mut accum = 0i64;

                for src in 0..=maxchan {
                    accum += self.sample_buffer[i][src] as i64 * coeffs[src] as i64;
                }

                if matrix_noise_shift[mat] != 0 {
                    let index = num_primitive_matrices - mat;
                    let index = (i * (index * 2 + 1) + index) & (self.access_unit_size_pow2 - 1);
                    accum += (self.noise_buffer[index] as i64) << (matrix_noise_shift[mat] + 7);
                }

                self.sample_buffer[i][dest] =
                    (((accum >> 14) & quant_mask) as i32) + self.bypassed_lsbs[i][mat];
            }
        }
    }

    /// Interleaves the rematrixed samples into `pcm` and folds them into the
    /// running lossless check.
    fn output_data(&mut self, substr: usize, pcm: &mut [u8]) -> Result<usize> {
        let ss = &self.substream[substr];
        let channels = ss.max_matrix_channel + 1;
        let bytes_per_sample = self.pcm_format.bytes_per_sample();
        let needed = ss.blockpos * channels * bytes_per_sample;

        if pcm.len() < needed {
            bail!(AccessUnitError::OutputBufferTooSmall {
                needed,
                available: pcm.len()
            });
        }

        let mut check = ss.lossless_check_data;
        let mut pos = 0;

        for i in 0..ss.blockpos {
            for out_ch in 0..channels {
                let mat_ch = ss.ch_assign[out_ch];
                let shift = ss.output_shift[mat_ch];

                let sample = if shift < 0 {
                    self.sample_buffer[i][mat_ch] >> (-shift) as u32
                } else {
                    self.sample_buffer[i][mat_ch] << shift as u32
                };

                check ^= (sample as u32 & 0xFFFFFF) << mat_ch;

                match self.pcm_format {
                    PcmFormat::S32 => {
                        pcm[pos..pos + 4].copy_from_slice(&(sample << 8).to_le_bytes());
                    }
                    PcmFormat::S16 => {
                        pcm[pos..pos + 2].copy_from_slice(&((sample >> 8) as i16).to_le_bytes());
                    }
                }

                pos += bytes_per_sample;
            }
        }

        self.substream[substr].lossless_check_data = check;

        Ok(needed)
    }
}
