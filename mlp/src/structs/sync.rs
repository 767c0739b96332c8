//! Major sync information.
//!
//! A major sync carries the stream-level configuration: sample rates,
//! quantization widths, access-unit size, and the substream count. It is
//! protected by a 16-bit CRC and repeats periodically so a decoder can join
//! a stream mid-flight.
//!
//! Two format variants share the container: `0xF8726FBA` (TrueHD / FBA) and
//! `0xF8726FBB` (classic MLP / FBB). They differ only in the 32-bit
//! `format_info` field.

use anyhow::{Result, bail};
use log::trace;

use crate::process::MAX_SUBSTREAMS;
use crate::process::decode::DecoderState;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::crc::CRC_MAJOR_SYNC;
use crate::utils::errors::SyncError;

/// Major sync pattern for FBA (TrueHD) streams.
pub const MAJOR_SYNC_FBA: u32 = 0xF8_72_6F_BA;

/// Major sync pattern for FBB (classic MLP) streams.
pub const MAJOR_SYNC_FBB: u32 = 0xF8_72_6F_BB;

/// Base number of samples per access unit at 48/44.1 kHz.
const BASE_SAMPLES_PER_AU: usize = 40;

/// Stream format parsed from the 32-bit `format_info` field.
#[derive(Debug, Clone, Default)]
pub struct FormatInfo {
    pub group1_bits: u8,
    pub group2_bits: u8,

    /// Raw sampling-frequency code of group 1; the low three bits select
    /// the access-unit size.
    pub ratebits: u8,

    pub group1_samplerate: u32,
    pub group2_samplerate: u32,

    // FBA fields.
    pub sixch_multi_channel_type: bool,
    pub eightch_multi_channel_type: bool,
    pub twoch_decoder_channel_modifier: u8,
    pub sixch_decoder_channel_modifier: u8,
    pub sixch_decoder_channel_assignment: u8,
    pub eightch_decoder_channel_modifier: u8,
    pub eightch_decoder_channel_assignment: u16,

    // FBB fields.
    pub multi_channel_type: u8,
    pub channel_assignment: u8,
}

impl FormatInfo {
    fn read_fba(reader: &mut BsIoSliceReader) -> Result<Self> {
        let mut fi = Self {
            group1_bits: 24,
            group2_bits: 0,
            ratebits: reader.get_n(4)?,
            sixch_multi_channel_type: reader.get()?,
            eightch_multi_channel_type: reader.get()?,
            ..Default::default()
        };

        reader.skip_n(2)?;
        fi.twoch_decoder_channel_modifier = reader.get_n(2)?;
        fi.sixch_decoder_channel_modifier = reader.get_n(2)?;
        fi.sixch_decoder_channel_assignment = reader.get_n(5)?;
        fi.eightch_decoder_channel_modifier = reader.get_n(2)?;
        fi.eightch_decoder_channel_assignment = reader.get_n(13)?;

        fi.group1_samplerate = map_samplerate(fi.ratebits)?;
        fi.group2_samplerate = 0;

        Ok(fi)
    }

    fn read_fbb(reader: &mut BsIoSliceReader) -> Result<Self> {
        let quant1: u8 = reader.get_n(4)?;
        let quant2: u8 = reader.get_n(4)?;

        let mut fi = Self {
            group1_bits: map_quantization(quant1),
            group2_bits: map_quantization(quant2),
            ratebits: reader.get_n(4)?,
            ..Default::default()
        };

        let rate2: u8 = reader.get_n(4)?;

        reader.skip_n(4)?;
        fi.multi_channel_type = reader.get_n(4)?;
        reader.skip_n(3)?;
        fi.channel_assignment = reader.get_n(5)?;

        if fi.group1_bits == 0 {
            bail!(SyncError::InvalidQuantization(quant1));
        }

        fi.group1_samplerate = map_samplerate(fi.ratebits)?;
        fi.group2_samplerate = if rate2 == 0xF {
            0
        } else {
            map_samplerate(rate2)?
        };

        Ok(fi)
    }
}

fn map_quantization(value: u8) -> u8 {
    match value {
        0 => 16,
        1 => 20,
        2 => 24,
        _ => 0,
    }
}

fn map_samplerate(value: u8) -> Result<u32> {
    match value {
        0..=2 => Ok(48_000 << value),
        8..=10 => Ok(44_100 << (value - 8)),
        _ => bail!(SyncError::InvalidSamplingFrequency(value)),
    }
}

/// Complete major sync info block (28 bytes, CRC-16 protected).
#[derive(Debug, Clone, Default)]
pub struct MajorSyncInfo {
    pub format_sync: u32,
    pub format_info: FormatInfo,
    pub signature: u16,
    pub flags: u16,
    pub reserved: u16,
    pub variable_rate: bool,
    pub peak_data_rate: u16,
    pub num_substreams: usize,
    pub extended_substream_info: u8,
    pub substream_info: u8,
    pub major_sync_info_crc: u16,
}

impl MajorSyncInfo {
    pub fn read(state: &mut DecoderState, reader: &mut BsIoSliceReader) -> Result<Self> {
        let start_pos = reader.position()?;

        let mut ms = Self {
            format_sync: reader.get_n(32)?,
            ..Default::default()
        };

        ms.format_info = match ms.format_sync {
            MAJOR_SYNC_FBA => FormatInfo::read_fba(reader)?,
            MAJOR_SYNC_FBB => FormatInfo::read_fbb(reader)?,
            sync => bail!(SyncError::InvalidFormatSync(sync)),
        };

        ms.signature = reader.get_n(16)?;

        if ms.signature != 0xB752 {
            bail!(SyncError::InvalidSignature(ms.signature));
        }

        ms.flags = reader.get_n(16)?;
        ms.reserved = reader.get_n(16)?;

        ms.variable_rate = reader.get()?;
        ms.peak_data_rate = reader.get_n(15)?;

        ms.num_substreams = reader.get_n::<u8>(4)? as usize;
        reader.skip_n(2)?;
        ms.extended_substream_info = reader.get_n(2)?;
        ms.substream_info = reader.get_n(8)?;

        // Channel meaning block: playback metadata only.
        reader.skip_n(64)?;

        let len = reader.position()? - start_pos;
        let calculated = reader.crc16_check(&CRC_MAJOR_SYNC, start_pos, len)?;

        ms.major_sync_info_crc = reader.get_n(16)?;

        if calculated != ms.major_sync_info_crc {
            bail!(SyncError::MajorSyncCrcMismatch {
                calculated,
                read: ms.major_sync_info_crc
            });
        }

        let fi = &ms.format_info;

        if fi.group2_bits > fi.group1_bits {
            bail!(SyncError::GroupBitsMismatch {
                group1: fi.group1_bits,
                group2: fi.group2_bits
            });
        }

        if fi.group2_samplerate != 0 && fi.group2_samplerate != fi.group1_samplerate {
            bail!(SyncError::GroupRateMismatch);
        }

        if ms.num_substreams == 0 || ms.num_substreams > MAX_SUBSTREAMS {
            bail!(SyncError::InvalidSubstreamCount(ms.num_substreams));
        }

        state.sample_rate = fi.group1_samplerate;
        state.access_unit_size = BASE_SAMPLES_PER_AU << (fi.ratebits & 7);
        state.access_unit_size_pow2 = 64 << (fi.ratebits & 7);
        state.num_substreams = ms.num_substreams;
        state.max_decoded_substream = ms.num_substreams - 1;
        state.params_valid = true;

        for ss in &mut state.substream {
            ss.restart_seen = false;
        }

        trace!(
            "Major sync: {} Hz, {} samples/unit, {} substream(s)",
            state.sample_rate, state.access_unit_size, state.num_substreams
        );

        Ok(ms)
    }
}
