/// Access-unit decoding to PCM samples.
///
/// Provides the [`Decoder`](decode::Decoder) for turning MLP/TrueHD access
/// units into interleaved PCM.
pub mod decode;

/// Maximum number of channels that can be decoded.
pub const MAX_CHANNELS: usize = 16;

/// Maximum number of matrices used in decoding. Most streams carry one
/// matrix per output channel, but some rematrix a channel more than once.
pub const MAX_MATRICES: usize = 15;

/// Maximum number of substreams.
pub const MAX_SUBSTREAMS: usize = 3;

/// Maximum number of taps in either the FIR or IIR prediction filter.
pub const MAX_FILTER_ORDER: usize = 8;

/// Maximum supported sampling frequency.
pub const MAX_SAMPLERATE: usize = 192_000;

/// Maximum number of audio samples within one access unit.
pub const MAX_BLOCKSIZE: usize = 40 * (MAX_SAMPLERATE / 48_000);

/// The next power of two above [`MAX_BLOCKSIZE`].
pub const MAX_BLOCKSIZE_POW2: usize = 64 * (MAX_SAMPLERATE / 48_000);
