/// Decoding-parameter blocks and entropy-coded block data.
pub mod block;

/// Prediction filter parameter blocks.
pub mod filter;

/// Primitive matrix parameter blocks.
pub mod matrix;

/// Restart headers.
pub mod restart_header;

/// Major sync information.
pub mod sync;
