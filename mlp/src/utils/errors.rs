//! Error types for MLP parsing and decoding.
//!
//! Fatal conditions invalidate the stream parameters and abort the current
//! access unit. Integrity mismatches (checksums, parity, lossless check,
//! data-check words) are logged as warnings and only become fatal when the
//! caller lowers the decoder's fail level.

#[macro_export]
macro_rules! log_or_err {
    ($state:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $state.fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum SyncError {
    #[error("Invalid format_sync, read {0:#010X}")]
    InvalidFormatSync(u32),

    #[error("Invalid signature in major_sync_info. Read {0:#06X}, expected 0xB752")]
    InvalidSignature(u16),

    #[error("Invalid/unknown quantization word length index {0}")]
    InvalidQuantization(u8),

    #[error("Invalid/unknown sampling frequency index {0:#X}")]
    InvalidSamplingFrequency(u8),

    #[error("Channel group 2 cannot have more bits per sample than group 1 ({group2} > {group1})")]
    GroupBitsMismatch { group1: u8, group2: u8 },

    #[error("Channel groups with differing sample rates are not supported")]
    GroupRateMismatch,

    #[error("Substream count {0} out of range (1..=3 supported)")]
    InvalidSubstreamCount(usize),

    #[error("major_sync_info CRC failed. Calculated {calculated:#06X}, read {read:#06X}")]
    MajorSyncCrcMismatch { calculated: u16, read: u16 },
}

#[derive(thiserror::Error, Debug)]
pub enum RestartHeaderError {
    #[error("Restart header sync incorrect (got {0:#06X})")]
    SyncMismatch(u16),

    #[error("Substream {substream} min channel {min} greater than max channel {max}")]
    ChannelRangeInverted {
        substream: usize,
        min: usize,
        max: usize,
    },

    #[error("Substream {substream} max channel {max} exceeds max matrix channel {max_matrix}")]
    ChannelBeyondMatrix {
        substream: usize,
        max: usize,
        max_matrix: usize,
    },

    #[error("Assignment of matrix channel {channel} to invalid output channel {output}")]
    ChannelAssignOutOfRange { channel: usize, output: usize },

    #[error("Restart header checksum failed. Calculated {calculated:#04X}, read {read:#04X}")]
    ChecksumMismatch { calculated: u8, read: u8 },

    #[error(
        "Lossless check failed for substream {substream}. Calculated {calculated:#04X}, read {read:#04X}"
    )]
    LosslessCheckFailed {
        substream: usize,
        calculated: u8,
        read: u8,
    },

    #[error("No restart header present in substream {0}")]
    NoRestartHeader(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum FilterError {
    #[error("{filter} filter order {order} is greater than maximum 8")]
    OrderTooHigh { filter: char, order: usize },

    #[error("Total FIR + IIR filter order for one channel must be <= 8, got {0}")]
    TotalOrderTooHigh(usize),

    #[error("{filter} filter coeff_bits must be between 1 and 16, got {bits}")]
    InvalidCoeffBits { filter: char, bits: u32 },

    #[error("Sum of coeff_bits and coeff_shift for {filter} filter must be 16 or less, got {total}")]
    CoeffBitsPlusShiftTooHigh { filter: char, total: u32 },

    #[error("FIR and IIR filters must use the same precision on channel {0}")]
    PrecisionMismatch(usize),

    #[error("FIR filter has state data specified")]
    FirStateSpecified,
}

#[derive(thiserror::Error, Debug)]
pub enum MatrixError {
    #[error("Invalid channel {0} specified as output from matrix")]
    DestinationOutOfRange(usize),

    #[error("Matrix fractional bits {0} exceed 14")]
    FracBitsTooHigh(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum BlockError {
    #[error("Block size {0} is greater than maximum 160")]
    BlocksizeTooLarge(usize),

    #[error("Too many audio samples in frame: {pos} + {blocksize} > {unit}")]
    BlockOverflow {
        pos: usize,
        blocksize: usize,
        unit: usize,
    },

    #[error("Block data length mismatch: expected bit position {expected}, got {actual}")]
    DataCheckMismatch { expected: u64, actual: u64 },

    #[error("huff_lsbs[{channel}] = {actual} exceeds the 24-bit sample path")]
    HuffLsbsTooLarge { channel: usize, actual: u32 },
}

#[derive(thiserror::Error, Debug)]
pub enum AccessUnitError {
    #[error("Access unit length {length} bytes exceeds packet of {available} bytes")]
    FrameTooShort { length: usize, available: usize },

    #[error("Substream {substream} data indicated length goes off end of packet")]
    SubstreamDirectoryOverflow { substream: usize },

    #[error("Substream {substream} directory end pointer decreases ({end} < {start})")]
    SubstreamDirectoryInverted {
        substream: usize,
        end: usize,
        start: usize,
    },

    #[error("Substream {substream} length mismatch: cursor {cursor}, expected {expected} bits")]
    SubstreamLengthMismatch {
        substream: usize,
        cursor: u64,
        expected: u64,
    },

    #[error("Substream {substream} parity check failed")]
    ParityMismatch { substream: usize },

    #[error(
        "Substream {substream} checksum failed. Calculated {calculated:#04X}, read {read:#04X}"
    )]
    ChecksumMismatch {
        substream: usize,
        calculated: u8,
        read: u8,
    },

    #[error("PCM output buffer too small: need {needed} bytes, got {available}")]
    OutputBufferTooSmall { needed: usize, available: usize },
}
