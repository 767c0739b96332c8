//! Decoder core for Meridian Lossless Packing (MLP) and Dolby TrueHD
//! bitstreams.
//!
//! ## Bitstream organization
//!
//! A stream is a sequence of *access units*. Each starts with a 12-bit
//! length word, optionally carries a CRC-protected major sync with the
//! stream configuration, and then a directory of up to three *substreams*.
//! A substream is a run of *blocks*: each block may refresh decoding
//! parameters (gated by presence flags), may open with a *restart header*
//! resetting the substream to known defaults, and always carries
//! entropy-coded residuals.
//!
//! ## Reconstruction pipeline
//!
//! Residuals pass through a per-channel FIR+IIR predictor pair, the channel
//! set is recombined by up to 15 primitive matrices in 2.14 fixed point
//! (with seeded noise injection), and the result is shifted and interleaved
//! to 16- or 32-bit PCM. Integrity is tracked by two 8-bit checksums, an
//! XOR parity, and a running lossless check over all output samples.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use mlp::process::decode::{Decoder, DecoderConfig, DecodeOutput};
//!
//! let mut decoder = Decoder::new(DecoderConfig::default());
//! let mut pcm = vec![0u8; Decoder::MAX_PCM_BYTES];
//! let mut stream: &[u8] = &[/* elementary stream bytes */];
//!
//! while let DecodeOutput::Unit { bytes_consumed, pcm_len } =
//!     decoder.read_access_unit(stream, &mut pcm)?
//! {
//!     let samples = &pcm[..pcm_len];
//!     // ... consume interleaved little-endian PCM ...
//!     stream = &stream[bytes_consumed..];
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

/// Access-unit decoding.
pub mod process;

/// Bitstream structure parsers.
pub mod structs;

/// Bit I/O, checksums, noise generation, and error types.
pub mod utils;
