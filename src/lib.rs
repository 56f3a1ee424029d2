#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! Decoder for Vorbis audio bitstreams: per-packet synthesis of float PCM
//! from variable-bitrate perceptual-audio packets.
//!
//! ### Bitstream Organization
//!
//! **Headers**: three packets (identification, comment, setup) carry the
//! complete stream configuration: codebooks, floors, residues, mappings,
//! modes. Parsed once; immutable afterwards.
//! **Audio packets**: one windowed MDCT block each, short or long, decoded
//! through floor + residue reconstruction and channel coupling.
//!
//! ### Processing Steps
//!
//! 1. Parse the three header packets with [`process::headers::HeaderParser`]
//! 2. Build a [`process::synthesis::Synthesizer`] from the parsed setup
//! 3. Feed audio packets in stream order; each yields fully overlapped PCM
//!
//! One corrupt audio packet never aborts the stream: it is dropped (or
//! decodes to silence when only its payload is starved) and decoding
//! continues with the next packet.

/// Processing pipeline for Vorbis streams.
///
/// 1. **Header parsing** ([`process::headers`]): three-packet state machine
///    producing the immutable stream configuration.
///
/// 2. **Synthesis** ([`process::synthesis`]): per-packet block decode,
///    overlap-add and PCM emission.
pub mod process;

/// Data structures representing Vorbis bitstream components.
///
/// - **Identification** ([`structs::info`]): channels, rate, block sizes, modes
/// - **Comments** ([`structs::comment`]): vendor string and user tags
/// - **Codebooks** ([`structs::codebook`]): Huffman/VQ decode tables
/// - **Floors** ([`structs::floor`]): spectral envelope reconstruction
/// - **Residue** ([`structs::residue`]): partitioned cascaded VQ fine detail
/// - **Mappings** ([`structs::mapping`]): submaps and channel coupling
pub mod structs;

/// Signal math used by synthesis.
///
/// - **Inverse MDCT** ([`dsp::mdct`]): frequency to time domain
/// - **LSP curves** ([`dsp::lsp`]): floor 0 envelope evaluation
/// - **Windows** ([`dsp::window`]): block overlap windows
pub mod dsp;

/// Utility functions and supporting infrastructure.
///
/// - **Bitstream I/O** ([`utils::bitstream_io`]): LSB-first bit-level reading
/// - **Error Handling** ([`utils::errors`]): error types
pub mod utils;
