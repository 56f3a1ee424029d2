//! Spectral envelope ("floor") reconstruction.
//!
//! Two floor variants exist, selected per configuration by a 16-bit type
//! id: type 0 codes the envelope as LSP filter roots, type 1 as a piecewise
//! line curve between breakpoints. The type space is fixed and
//! bitstream-defined, so dispatch is a closed enum.
//!
//! Floor decode is two explicit passes: pass 1 reads the packet and leaves
//! an opaque memo plus a per-channel silence flag, pass 2 renders the memo
//! multiplicatively onto the channel spectrum. Residue decode needs the
//! silence flags and runs between the passes, so the passes must not be
//! collapsed into one call.

use anyhow::{Result, bail};

use crate::structs::codebook::{Codebook, CodebookConfig};
use crate::structs::floor0::{Floor0Config, Floor0Runtime};
use crate::structs::floor1::{Floor1Config, Floor1Runtime};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::FloorError;

#[derive(Debug, Clone)]
pub enum FloorConfig {
    Lsp(Floor0Config),
    Piecewise(Floor1Config),
}

impl FloorConfig {
    pub fn read(reader: &mut BsIoSliceReader, books: &[CodebookConfig]) -> Result<Self> {
        let kind = reader.get_n::<u32>(16)?;
        match kind {
            0 => Ok(Self::Lsp(Floor0Config::read(reader, books)?)),
            1 => Ok(Self::Piecewise(Floor1Config::read(reader, books)?)),
            t => bail!(FloorError::InvalidType(t)),
        }
    }

    /// Builds the per-mode runtime for a block of `blocksize` samples.
    pub fn look(&self, blocksize: usize) -> FloorRuntime {
        match self {
            Self::Lsp(cfg) => FloorRuntime::Lsp(Floor0Runtime::new(cfg.clone(), blocksize)),
            Self::Piecewise(cfg) => {
                FloorRuntime::Piecewise(Floor1Runtime::new(cfg.clone(), blocksize))
            }
        }
    }
}

#[derive(Debug)]
pub enum FloorRuntime {
    Lsp(Floor0Runtime),
    Piecewise(Floor1Runtime),
}

/// Per-channel floor memo, reused across packets.
///
/// Pass 1 fills the variant matching the channel's floor; `nonzero` is the
/// silence flag residue decode consults. An unset flag means pass 2
/// renders silence.
#[derive(Debug, Default)]
pub struct FloorState {
    pub nonzero: bool,
    /// Piecewise memo: unwrapped breakpoint amplitudes.
    pub posts: Vec<i32>,
    /// LSP memo: coefficient vector and quantized amplitude.
    pub lsp: Vec<f32>,
    pub amp: f32,
}

impl FloorRuntime {
    /// Pass 1: read the channel's envelope from the packet.
    ///
    /// Bit starvation is not an error here; it leaves the channel silent
    /// and the packet decodes on.
    pub fn inverse1(
        &self,
        reader: &mut BsIoSliceReader,
        books: &[Codebook],
        state: &mut FloorState,
    ) -> Result<()> {
        match self {
            Self::Lsp(f) => match f.inverse1(reader, books, &mut state.lsp)? {
                Some(amp) => {
                    state.amp = amp;
                    state.nonzero = true;
                }
                None => state.nonzero = false,
            },
            Self::Piecewise(f) => {
                state.nonzero = f.inverse1(reader, books, &mut state.posts)?;
            }
        }
        Ok(())
    }

    /// Pass 2: render the envelope multiplicatively onto `out`, or zero it
    /// when the channel was silent.
    pub fn inverse2(&self, state: &mut FloorState, out: &mut [f32]) {
        match self {
            Self::Lsp(f) => f.inverse2(state.nonzero, &mut state.lsp, state.amp, out),
            Self::Piecewise(f) => f.inverse2(state.nonzero, &state.posts, out),
        }
    }
}
