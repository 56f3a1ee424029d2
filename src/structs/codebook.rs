//! Canonical Huffman / vector quantization codebooks.
//!
//! Every higher decode stage draws symbols through a codebook. The parsed
//! [`CodebookConfig`] persists the codeword length list and quantization
//! parameters; [`Codebook`] derives the runtime decode structures once: the
//! canonical codeword assignment, a binary decode trie, a fixed-depth fast
//! lookup table, and the dequantized value vectors.
//!
//! ## Decode structures
//!
//! - **Trie**: child-pointer pairs, a non-positive pointer marks a leaf
//!   holding the negated entry number.
//! - **Fast table**: `max(5, ilog(entries) - 4)` bits of lookahead mapped
//!   directly to a leaf or a partial trie position plus consumed length.
//! - **Values**: `entries * dim` floats, present for map types 1 and 2.

use std::io;

use anyhow::{Result, bail};
use log::trace;

use crate::utils::bitstream_io::{BsIoSliceReader, ilog};
use crate::utils::errors::CodebookError;

/// 24-bit sync pattern opening every codebook ("BCV").
pub const CODEBOOK_SYNC: u32 = 0x56_43_42;

/// Parsed, persistent codebook parameters.
#[derive(Debug, Clone, Default)]
pub struct CodebookConfig {
    /// Elements per value vector.
    pub dim: usize,
    /// Codebook entries; entries with codeword length 0 are unused.
    pub entries: usize,
    pub lengths: Vec<u8>,

    /// 0 = no value mapping, 1 = implicit lattice, 2 = explicit values.
    pub map_type: u32,
    /// Packed-float minimum value.
    pub q_min: u32,
    /// Packed-float value spacing.
    pub q_delta: u32,
    /// Bits per quantized value, 1..=16.
    pub q_bits: u32,
    /// Values accumulate across the vector when set.
    pub q_sequence: bool,
    pub quant_values: Vec<u32>,
}

impl CodebookConfig {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let sync = reader.get_n::<u32>(24)?;
        if sync != CODEBOOK_SYNC {
            bail!(CodebookError::InvalidSync(sync));
        }

        let dim = reader.get_n::<u32>(16)? as usize;
        let entries = reader.get_n::<u32>(24)? as usize;
        if dim == 0 {
            bail!(CodebookError::ZeroDimension);
        }
        if entries == 0 {
            bail!(CodebookError::ZeroEntries);
        }

        let mut cfg = Self {
            dim,
            entries,
            lengths: Vec::new(),
            ..Default::default()
        };

        if !reader.get()? {
            // unordered; a sparse codebook tags each entry as used or not
            let sparse = reader.get()?;
            let min_bits = entries as u64 * if sparse { 1 } else { 5 };
            if min_bits > reader.available()? {
                bail!(CodebookError::TruncatedQuantList {
                    needed: min_bits,
                    available: reader.available()?,
                });
            }

            cfg.lengths = vec![0u8; entries];
            for length in cfg.lengths.iter_mut() {
                if sparse && !reader.get()? {
                    continue;
                }
                *length = reader.get_n::<u8>(5)? + 1;
            }
        } else {
            // length ordered; only the run count of each length is coded
            let mut length = reader.get_n::<u8>(5)? + 1;
            cfg.lengths = vec![0u8; entries];

            let mut i = 0;
            while i < entries {
                if length > 32 {
                    bail!(CodebookError::CodewordTooLong);
                }
                let num = reader.get_n::<u32>(ilog((entries - i) as u32))? as usize;
                if num > entries - i {
                    bail!(CodebookError::LengthListOverflow {
                        num,
                        remaining: entries - i,
                    });
                }
                cfg.lengths[i..i + num].fill(length);
                i += num;
                length += 1;
            }
        }

        cfg.map_type = reader.get_n::<u32>(4)?;
        match cfg.map_type {
            0 => {}
            1 | 2 => {
                cfg.q_min = reader.get_n::<u32>(32)?;
                cfg.q_delta = reader.get_n::<u32>(32)?;
                cfg.q_bits = reader.get_n::<u32>(4)? + 1;
                cfg.q_sequence = reader.get()?;

                let quantvals = match cfg.map_type {
                    1 => cfg.lattice_values(),
                    _ => entries * dim,
                };

                // a valid value list must fit in the packet; checking up
                // front keeps a hostile count from allocating first
                let needed = quantvals as u64 * cfg.q_bits as u64;
                let available = reader.available()?;
                if needed > available {
                    bail!(CodebookError::TruncatedQuantList { needed, available });
                }

                cfg.quant_values = (0..quantvals)
                    .map(|_| reader.get_n::<u32>(cfg.q_bits))
                    .collect::<io::Result<_>>()?;
            }
            t => bail!(CodebookError::InvalidMapType(t)),
        }

        trace!(
            "codebook: dim {}, entries {}, map type {}",
            cfg.dim, cfg.entries, cfg.map_type
        );

        Ok(cfg)
    }

    /// True when the book carries value vectors and may feed VQ decode.
    pub fn is_value_mapped(&self) -> bool {
        self.map_type != 0
    }

    /// Lattice column length for map type 1: the greatest `v` with
    /// `v^dim <= entries`. The float guess is verified by integer means;
    /// bitstream sync must not hang off float rounding.
    fn lattice_values(&self) -> usize {
        let mut vals = (self.entries as f64).powf(1.0 / self.dim as f64).floor() as usize;
        loop {
            let mut acc: u64 = 1;
            let mut acc1: u64 = 1;
            for _ in 0..self.dim {
                acc = acc.saturating_mul(vals as u64);
                acc1 = acc1.saturating_mul(vals as u64 + 1);
            }
            if acc <= self.entries as u64 && acc1 > self.entries as u64 {
                return vals;
            }
            if acc > self.entries as u64 {
                vals -= 1;
            } else {
                vals += 1;
            }
        }
    }

    /// Expands the quantized values into the `entries * dim` float table.
    ///
    /// Map type 1 counts each vector column through the shared lattice
    /// column; map type 2 lists every value explicitly. Both apply
    /// `value = quant * delta + min`, accumulating across the vector when
    /// the sequence flag is set.
    pub fn unquantize(&self) -> Option<Vec<f32>> {
        if !self.is_value_mapped() {
            return None;
        }

        let mindel = float32_unpack(self.q_min);
        let delta = float32_unpack(self.q_delta);
        let mut r = vec![0.0f32; self.entries * self.dim];

        match self.map_type {
            1 => {
                let quantvals = self.lattice_values();
                for j in 0..self.entries {
                    let mut last = 0.0f32;
                    let mut indexdiv = 1usize;
                    for k in 0..self.dim {
                        let index = (j / indexdiv) % quantvals;
                        let val = self.quant_values[index] as f32 * delta + mindel + last;
                        if self.q_sequence {
                            last = val;
                        }
                        r[j * self.dim + k] = val;
                        indexdiv *= quantvals;
                    }
                }
            }
            _ => {
                for j in 0..self.entries {
                    let mut last = 0.0f32;
                    for k in 0..self.dim {
                        let val = self.quant_values[j * self.dim + k] as f32 * delta
                            + mindel
                            + last;
                        if self.q_sequence {
                            last = val;
                        }
                        r[j * self.dim + k] = val;
                    }
                }
            }
        }

        Some(r)
    }
}

/// Unpacks the codebook float format: 21-bit mantissa, 10-bit biased
/// exponent, sign. Not IEEE; the bias favors values well below one.
pub fn float32_unpack(val: u32) -> f32 {
    let mut mant = (val & 0x1f_ffff) as f64;
    let exp = (val & 0x7fe0_0000) >> 21;
    if val & 0x8000_0000 != 0 {
        mant = -mant;
    }
    (mant * 2f64.powi(exp as i32 - 788)) as f32
}

/// Canonical codeword assignment: lowest-valued codeword first per length,
/// zero-length (unused) entries skipped. Works for ordered and unordered
/// length lists. An overpopulated tree is rejected outright, never
/// silently truncated.
pub fn make_words(lengths: &[u8]) -> Result<Vec<u32>> {
    let mut marker = [0u32; 33];
    let mut codes = vec![0u32; lengths.len()];

    for (i, &len) in lengths.iter().enumerate() {
        if len == 0 {
            continue;
        }
        let length = len as usize;
        let mut entry = marker[length];

        // claiming a node claims the subtree below it and blocks the
        // nodes directly above from becoming leaves
        if length < 32 && (entry >> length) != 0 {
            bail!(CodebookError::OverpopulatedTree);
        }
        codes[i] = entry;

        for j in (1..=length).rev() {
            if marker[j] & 1 != 0 {
                // have to jump branches
                if j == 1 {
                    marker[1] += 1;
                } else {
                    marker[j] = marker[j - 1] << 1;
                }
                break;
            }
            marker[j] += 1;
        }

        // re-dangle the longer markers off the new node
        for j in length + 1..33 {
            if marker[j] >> 1 == entry {
                entry = marker[j];
                marker[j] = marker[j - 1] << 1;
            } else {
                break;
            }
        }
    }

    // bit-reverse the words; the packer is LSB-first
    for (i, &len) in lengths.iter().enumerate() {
        let mut t = 0u32;
        for j in 0..len {
            t <<= 1;
            t |= (codes[i] >> j) & 1;
        }
        codes[i] = t;
    }

    Ok(codes)
}

#[derive(Debug, Default)]
struct DecodeTree {
    ptr0: Vec<i32>,
    ptr1: Vec<i32>,
    /// Fast-path table: leaf (non-positive, negated entry) or trie node.
    tab: Vec<i32>,
    /// Bits consumed by each fast-path hit.
    tabl: Vec<u32>,
    tabn: u32,
}

/// Runtime codebook: decode trie, fast lookup table, dequantized values.
#[derive(Debug)]
pub struct Codebook {
    pub dim: usize,
    pub entries: usize,
    /// `entries * dim` floats; empty for books without a value mapping.
    pub values: Vec<f32>,
    tree: DecodeTree,
}

impl Codebook {
    pub fn new(cfg: &CodebookConfig) -> Result<Self> {
        let codes = make_words(&cfg.lengths)?;

        let mut tree = DecodeTree {
            ptr0: vec![0i32; cfg.entries * 2],
            ptr1: vec![0i32; cfg.entries * 2],
            ..Default::default()
        };

        let mut top = 0i32;
        for i in 0..cfg.entries {
            let length = cfg.lengths[i] as usize;
            if length == 0 {
                continue;
            }

            let mut p = 0usize;
            for j in 0..length - 1 {
                let bit = (codes[i] >> j) & 1;
                let mut next = if bit == 0 { tree.ptr0[p] } else { tree.ptr1[p] };
                if next == 0 {
                    top += 1;
                    // deep sparse trees can outgrow the 2*entries guess
                    if top as usize >= tree.ptr0.len() {
                        tree.ptr0.push(0);
                        tree.ptr1.push(0);
                    }
                    if bit == 0 {
                        tree.ptr0[p] = top;
                    } else {
                        tree.ptr1[p] = top;
                    }
                    next = top;
                }
                p = next as usize;
            }

            if (codes[i] >> (length - 1)) & 1 == 0 {
                tree.ptr0[p] = -(i as i32);
            } else {
                tree.ptr1[p] = -(i as i32);
            }
        }

        tree.tabn = ilog(cfg.entries as u32).saturating_sub(4).max(5);
        let n = 1usize << tree.tabn;
        tree.tab = vec![0i32; n];
        tree.tabl = vec![0u32; n];
        for i in 0..n {
            let mut p = 0i32;
            let mut j = 0;
            while j < tree.tabn && (p > 0 || j == 0) {
                p = if i & (1 << j) != 0 {
                    tree.ptr1[p as usize]
                } else {
                    tree.ptr0[p as usize]
                };
                j += 1;
            }
            tree.tab[i] = p;
            tree.tabl[i] = j;
        }

        Ok(Self {
            dim: cfg.dim,
            entries: cfg.entries,
            values: cfg.unquantize().unwrap_or_default(),
            tree,
        })
    }

    /// Decodes one codeword, returning its entry number.
    ///
    /// Fast table first; a partial hit leaves a trie position to continue
    /// from one bit at a time. Runs the trie from the root when fewer bits
    /// remain than the table peeks.
    pub fn decode(&self, reader: &mut BsIoSliceReader) -> io::Result<u32> {
        let t = &self.tree;
        let mut p: i32 = 0;

        if let Some(window) = reader.look_n(t.tabn)? {
            let slot = window as usize;
            p = t.tab[slot];
            reader.skip_n(t.tabl[slot])?;
            if p <= 0 {
                return Ok((-p) as u32);
            }
        }

        loop {
            p = if reader.get()? {
                t.ptr1[p as usize]
            } else {
                t.ptr0[p as usize]
            };
            if p <= 0 {
                return Ok((-p) as u32);
            }
        }
    }

    /// Declarative: one vector decoded into `a[offset..]`.
    pub fn decodev_set(
        &self,
        a: &mut [f32],
        offset: usize,
        reader: &mut BsIoSliceReader,
        n: usize,
    ) -> io::Result<()> {
        let mut i = 0;
        while i < n {
            let t = self.decode(reader)? as usize * self.dim;
            for j in 0..self.dim {
                if i >= n {
                    break;
                }
                a[offset + i] = self.values[t + j];
                i += 1;
            }
        }
        Ok(())
    }

    /// Additive, sequential (residue kind 1).
    pub fn decodev_add(
        &self,
        a: &mut [f32],
        offset: usize,
        reader: &mut BsIoSliceReader,
        n: usize,
    ) -> io::Result<()> {
        let mut i = 0;
        while i < n {
            let t = self.decode(reader)? as usize * self.dim;
            for j in 0..self.dim {
                if i >= n {
                    break;
                }
                a[offset + i] += self.values[t + j];
                i += 1;
            }
        }
        Ok(())
    }

    /// Additive, interleaved within one channel (residue kind 0): vector
    /// element `k` lands every `n / dim` samples.
    pub fn decodevs_add(
        &self,
        a: &mut [f32],
        offset: usize,
        reader: &mut BsIoSliceReader,
        n: usize,
        t: &mut Vec<usize>,
    ) -> io::Result<()> {
        let step = n / self.dim;

        t.clear();
        for _ in 0..step {
            t.push(self.decode(reader)? as usize * self.dim);
        }

        for i in 0..self.dim {
            let o = i * step;
            for (j, &base) in t.iter().enumerate() {
                a[offset + o + j] += self.values[base + i];
            }
        }

        Ok(())
    }

    /// Additive, de-interleaved across a channel bundle (residue kind 2):
    /// consecutive vector elements rotate through the channels.
    pub fn decodevv_add(
        &self,
        bundle: &mut [&mut [f32]],
        offset: usize,
        reader: &mut BsIoSliceReader,
        n: usize,
    ) -> io::Result<()> {
        let ch = bundle.len();
        let mut i = offset / ch;
        let end = (offset + n) / ch;
        let mut chptr = 0;

        while i < end {
            let t = self.decode(reader)? as usize * self.dim;
            for j in 0..self.dim {
                if i >= end {
                    break;
                }
                bundle[chptr][i] += self.values[t + j];
                chptr += 1;
                if chptr == ch {
                    chptr = 0;
                    i += 1;
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use bitstream_io::{BitWrite, BitWriter, LittleEndian};

    fn book_from_lengths(lengths: &[u8]) -> Result<Codebook> {
        let cfg = CodebookConfig {
            dim: 1,
            entries: lengths.len(),
            lengths: lengths.to_vec(),
            ..Default::default()
        };
        Codebook::new(&cfg)
    }

    #[test]
    fn huffman_round_trip() -> Result<()> {
        // the length list from the format specification's worked example
        let lengths = [2u8, 4, 4, 4, 4, 2, 3, 3];
        let codes = make_words(&lengths)?;
        let book = book_from_lengths(&lengths)?;

        // write every codeword back-to-back, decode them all in order
        let mut w = BitWriter::endian(Vec::new(), LittleEndian);
        for (i, &len) in lengths.iter().enumerate() {
            w.write_var(len as u32, codes[i])?;
        }
        w.byte_align()?;
        let buf = w.into_writer();

        let mut r = BsIoSliceReader::from_slice(&buf);
        for i in 0..lengths.len() as u32 {
            assert_eq!(book.decode(&mut r)?, i);
        }
        Ok(())
    }

    #[test]
    fn round_trip_with_unused_and_long_entries() -> Result<()> {
        // sparse list with codewords longer than the fast table depth
        let lengths = [1u8, 0, 3, 0, 4, 5, 7, 7, 8, 8];
        let codes = make_words(&lengths)?;
        let book = book_from_lengths(&lengths)?;

        for (i, &len) in lengths.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let mut w = BitWriter::endian(Vec::new(), LittleEndian);
            w.write_var(len as u32, codes[i])?;
            w.byte_align()?;
            let buf = w.into_writer();
            let mut r = BsIoSliceReader::from_slice(&buf);
            assert_eq!(book.decode(&mut r)?, i as u32);
        }
        Ok(())
    }

    #[test]
    fn single_entry_book() -> Result<()> {
        let book = book_from_lengths(&[1])?;
        let mut r = BsIoSliceReader::from_slice(&[0x00]);
        assert_eq!(book.decode(&mut r)?, 0);
        Ok(())
    }

    #[test]
    fn overpopulated_tree_rejected() {
        // three length-1 codewords cannot fit a binary tree
        assert!(make_words(&[1, 1, 1]).is_err());
        // two length-1 leaves fill the tree; nothing may hang below
        assert!(make_words(&[1, 1, 2]).is_err());
        // valid sibling structure for contrast
        assert!(make_words(&[1, 2, 3, 3]).is_ok());
    }

    #[test]
    fn decode_starves_mid_codeword() -> Result<()> {
        // every codeword is 10 bits; one byte holds a valid 8-bit prefix
        // and the trie descent runs out of payload
        let lengths = [10u8; 12];
        let book = book_from_lengths(&lengths)?;
        let mut r = BsIoSliceReader::from_slice(&[0x00]);
        let e = book.decode(&mut r).unwrap_err();
        assert!(crate::utils::bitstream_io::starved(&e));
        Ok(())
    }

    /// Builds the packed non-IEEE float for `mant * 2^(exp - 788)`.
    fn float32_pack(mant: u32, exp: u32) -> u32 {
        (exp << 21) | mant
    }

    #[test]
    fn unquantize_zero_index_is_min_exactly() {
        // min = 1.0, delta = 0.25; quant value 0 must equal min with no
        // rounding slack, for both map types
        let q_min = float32_pack(1 << 20, 768);
        let q_delta = float32_pack(1 << 20, 766);
        assert_eq!(float32_unpack(q_min), 1.0);
        assert_eq!(float32_unpack(q_delta), 0.25);

        for map_type in [1u32, 2] {
            let cfg = CodebookConfig {
                dim: 2,
                entries: 4,
                lengths: vec![2; 4],
                map_type,
                q_min,
                q_delta,
                q_bits: 3,
                q_sequence: false,
                quant_values: vec![0; 8],
            };
            let values = cfg.unquantize().unwrap();
            assert_eq!(values.len(), 8);
            assert!(values.iter().all(|v| *v == 1.0), "map type {map_type}");
        }
    }

    #[test]
    fn unquantize_lattice_counts_columns() {
        // entries = 4, dim = 2 -> lattice column of 2 values; entry j
        // takes column values (j % 2, j / 2)
        let q_min = float32_pack(0, 768);
        let q_delta = float32_pack(1 << 20, 768);
        let cfg = CodebookConfig {
            dim: 2,
            entries: 4,
            lengths: vec![2; 4],
            map_type: 1,
            q_min,
            q_delta,
            q_bits: 2,
            q_sequence: false,
            quant_values: vec![0, 1],
        };
        let values = cfg.unquantize().unwrap();
        assert_eq!(values, vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn sequence_flag_accumulates() {
        let q_min = float32_pack(0, 768);
        let q_delta = float32_pack(1 << 20, 768);
        let cfg = CodebookConfig {
            dim: 3,
            entries: 1,
            lengths: vec![1],
            map_type: 2,
            q_min,
            q_delta,
            q_bits: 3,
            q_sequence: true,
            quant_values: vec![1, 2, 3],
        };
        let values = cfg.unquantize().unwrap();
        assert_eq!(values, vec![1.0, 3.0, 6.0]);
    }
}
