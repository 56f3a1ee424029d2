//! Floor type 0: LSP-coded spectral envelope.
//!
//! The envelope is an all-pole filter response transmitted as LSP roots.
//! A bark-scale map, fixed at setup, folds the linear spectrum onto the
//! filter's evaluation grid. Decode is a single-stage declarative vector
//! fetch scaled by a quantized amplitude; a zero amplitude (or starved
//! packet) leaves the channel silent.

use anyhow::{Result, bail};

use crate::dsp::lsp::lsp_to_curve;
use crate::structs::codebook::{Codebook, CodebookConfig};
use crate::utils::bitstream_io::{BsIoSliceReader, ilog, starved};
use crate::utils::errors::FloorError;

#[derive(Debug, Clone)]
pub struct Floor0Config {
    /// LSP filter order.
    pub order: usize,
    /// Rate the bark map was tuned against (not the stream rate).
    pub rate: u32,
    /// Bark map resolution.
    pub barkmap: usize,
    pub ampbits: u32,
    pub ampdb: u32,
    /// Candidate coefficient books; one is chosen per block.
    pub books: Vec<usize>,
}

impl Floor0Config {
    pub fn read(reader: &mut BsIoSliceReader, books: &[CodebookConfig]) -> Result<Self> {
        let order = reader.get_n::<u32>(8)? as usize;
        let rate = reader.get_n::<u32>(16)?;
        let barkmap = reader.get_n::<u32>(16)? as usize;
        let ampbits = reader.get_n::<u32>(6)?;
        let ampdb = reader.get_n::<u32>(8)?;
        let numbooks = reader.get_n::<u32>(4)? as usize + 1;

        if order < 1 {
            bail!(FloorError::ZeroOrder);
        }
        if rate < 1 {
            bail!(FloorError::ZeroRate);
        }
        if barkmap < 1 {
            bail!(FloorError::ZeroBarkMap);
        }
        if ampbits > 32 {
            bail!(FloorError::AmpBitsTooWide(ampbits));
        }

        let mut book_list = Vec::with_capacity(numbooks);
        for _ in 0..numbooks {
            let book = reader.get_n::<u8>(8)? as usize;
            if book >= books.len() {
                bail!(FloorError::BookOutOfRange {
                    book,
                    books: books.len(),
                });
            }
            if !books[book].is_value_mapped() {
                bail!(FloorError::NotValueMapped(book));
            }
            book_list.push(book);
        }

        Ok(Self {
            order,
            rate,
            barkmap,
            ampbits,
            ampdb,
            books: book_list,
        })
    }
}

#[derive(Debug)]
pub struct Floor0Runtime {
    pub cfg: Floor0Config,
    /// Half the block size: the spectrum length this floor renders.
    pub n: usize,
    /// Linear bin to bark bin, precomputed once per mode.
    pub linearmap: Vec<usize>,
}

fn to_bark(f: f32) -> f32 {
    13.1 * (0.000_74 * f).atan() + 2.24 * (f * f * 1.85e-8).atan() + 1e-4 * f
}

impl Floor0Runtime {
    pub fn new(cfg: Floor0Config, blocksize: usize) -> Self {
        let n = blocksize / 2;
        let ln = cfg.barkmap;
        let scale = ln as f32 / to_bark(cfg.rate as f32 / 2.0);

        // the linear-to-bark mapping may skip bark bins; decode simply
        // never evaluates the skipped ones
        let linearmap = (0..n)
            .map(|j| {
                let val = (to_bark((cfg.rate as f32 / 2.0) / n as f32 * j as f32) * scale)
                    .floor() as usize;
                val.min(ln)
            })
            .collect();

        Self { cfg, n, linearmap }
    }

    /// Pass 1: returns the amplitude and fills `lsp` with the coefficient
    /// vector, or `None` for a silent channel.
    pub fn inverse1(
        &self,
        reader: &mut BsIoSliceReader,
        books: &[Codebook],
        lsp: &mut Vec<f32>,
    ) -> Result<Option<f32>> {
        match self.decode_coeffs(reader, books, lsp) {
            Ok(amp) => Ok(amp),
            Err(e) if starved(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn decode_coeffs(
        &self,
        reader: &mut BsIoSliceReader,
        books: &[Codebook],
        lsp: &mut Vec<f32>,
    ) -> std::io::Result<Option<f32>> {
        let cfg = &self.cfg;
        let m = cfg.order;

        let ampraw = reader.get_n0(cfg.ampbits)? as u64;
        if ampraw == 0 {
            return Ok(None);
        }

        let maxval = (1u64 << cfg.ampbits) - 1;
        let amp = ampraw as f32 / maxval as f32 * cfg.ampdb as f32;
        let booknum = reader.get_n::<u32>(ilog(cfg.books.len() as u32))? as usize;
        if booknum >= cfg.books.len() {
            return Ok(None);
        }

        let b = &books[cfg.books[booknum]];

        // coefficient chunks may overhang the order; pad the scratch
        lsp.clear();
        lsp.resize(m + b.dim, 0.0);

        let mut j = 0;
        while j < m {
            b.decodev_set(lsp, j, reader, b.dim)?;
            j += b.dim;
        }

        // each chunk rides on the running sum of the previous one
        let mut last = 0.0f32;
        let mut j = 0;
        while j < m {
            for _ in 0..b.dim {
                lsp[j] += last;
                j += 1;
            }
            last = lsp[j - 1];
        }

        Ok(Some(amp))
    }

    /// Pass 2: evaluate the LSP curve and multiply it onto `out`.
    pub fn inverse2(&self, present: bool, lsp: &mut [f32], amp: f32, out: &mut [f32]) {
        if !present {
            out[..self.n].fill(0.0);
            return;
        }

        lsp_to_curve(
            out,
            &self.linearmap,
            self.n,
            self.cfg.barkmap,
            lsp,
            self.cfg.order,
            amp,
            self.cfg.ampdb as f32,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bark_map_is_monotonic_and_clamped() {
        let cfg = Floor0Config {
            order: 8,
            rate: 44100,
            barkmap: 64,
            ampbits: 6,
            ampdb: 140,
            books: vec![0],
        };
        let rt = Floor0Runtime::new(cfg, 256);
        assert_eq!(rt.linearmap.len(), 128);
        assert_eq!(rt.linearmap[0], 0);
        for w in rt.linearmap.windows(2) {
            assert!(w[0] <= w[1]);
        }
        assert!(rt.linearmap.iter().all(|&v| v <= 64));
    }

    #[test]
    fn silent_channel_zeroes_spectrum() {
        let cfg = Floor0Config {
            order: 4,
            rate: 8000,
            barkmap: 16,
            ampbits: 4,
            ampdb: 100,
            books: vec![0],
        };
        let rt = Floor0Runtime::new(cfg, 64);
        let mut out = vec![1.0f32; 32];
        rt.inverse2(false, &mut [], 0.0, &mut out);
        assert!(out.iter().all(|v| *v == 0.0));
    }
}
