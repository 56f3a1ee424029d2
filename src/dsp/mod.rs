//! Signal math used by synthesis.
//!
//! Pure functions and precomputed-table transforms with no bitstream
//! knowledge: the inverse MDCT, LSP envelope evaluation for floor 0, and
//! the overlap window shapes.

pub mod lsp;
pub mod mdct;
pub mod window;
