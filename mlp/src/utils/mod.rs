/// Bit-level reading with Huffman decode and windowed integrity checks.
pub mod bitstream_io;

/// MLP-specific CRC-8/CRC-16 algorithms.
pub mod crc;

/// Error types for parsing and decoding.
pub mod errors;

/// Seeded noise generators for the rematrix stage.
pub mod noise;
