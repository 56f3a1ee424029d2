//! Partitioned cascaded VQ residue.
//!
//! The residue spectrum between `begin` and `end` splits into fixed-size
//! partitions. A phrase book jointly codes the class choice of several
//! consecutive partitions per codeword; each class selects up to eight
//! additive stage books through its cascade bitmask. Three kinds share the
//! machinery and differ only in vector layout: kind 0 interleaves within a
//! channel, kind 1 is sequential, kind 2 decodes all coupled channels as
//! one concatenated stream.

use std::io;

use anyhow::{Result, bail};

use crate::structs::codebook::{Codebook, CodebookConfig};
use crate::utils::bitstream_io::{BsIoSliceReader, icount, ilog, starved};
use crate::utils::errors::ResidueError;

#[derive(Debug, Clone)]
pub struct ResidueConfig {
    /// 0 = interleaved, 1 = sequential, 2 = cross-channel.
    pub kind: u32,
    pub begin: usize,
    pub end: usize,
    /// Samples per partition.
    pub grouping: usize,
    /// Partition classes.
    pub partitions: usize,
    /// Phrase book jointly coding partition classes.
    pub groupbook: usize,
    /// Per-class cascade bitmask selecting stage books.
    pub cascade: Vec<u32>,
    /// Stage books in cascade-bit order.
    pub booklist: Vec<usize>,
}

impl ResidueConfig {
    pub fn read(reader: &mut BsIoSliceReader, books: &[CodebookConfig]) -> Result<Self> {
        let kind = reader.get_n::<u32>(16)?;
        if kind > 2 {
            bail!(ResidueError::InvalidType(kind));
        }

        let begin = reader.get_n::<u32>(24)? as usize;
        let end = reader.get_n::<u32>(24)? as usize;
        let grouping = reader.get_n::<u32>(24)? as usize + 1;
        let partitions = reader.get_n::<u32>(6)? as usize + 1;
        let groupbook = reader.get_n::<u8>(8)? as usize;

        if begin > end {
            bail!(ResidueError::BeginPastEnd { begin, end });
        }

        let mut cascade = Vec::with_capacity(partitions);
        let mut acc = 0usize;
        for _ in 0..partitions {
            let mut bits = reader.get_n::<u32>(3)?;
            if reader.get()? {
                bits |= reader.get_n::<u32>(5)? << 3;
            }
            acc += icount(bits) as usize;
            cascade.push(bits);
        }

        let mut booklist = Vec::with_capacity(acc);
        for _ in 0..acc {
            let book = reader.get_n::<u8>(8)? as usize;
            if book >= books.len() {
                bail!(ResidueError::BookOutOfRange {
                    book,
                    books: books.len(),
                });
            }
            // stage books feed VQ decode; a scalar book here would leave
            // the hot path with no values to combine
            if !books[book].is_value_mapped() {
                bail!(ResidueError::StageBookNotValueMapped(book));
            }
            booklist.push(book);
        }

        if groupbook >= books.len() {
            bail!(ResidueError::BookOutOfRange {
                book: groupbook,
                books: books.len(),
            });
        }

        // the phrase book must describe a consistent partitioning: one
        // codeword covers dim partitions, so partitions^dim class tuples
        // must all be addressable
        let phrase = &books[groupbook];
        if phrase.dim < 1 {
            bail!(ResidueError::InvalidPhraseBookDim(groupbook));
        }
        let mut partvals = 1usize;
        for _ in 0..phrase.dim {
            partvals = partvals.saturating_mul(partitions);
            if partvals > phrase.entries {
                bail!(ResidueError::InconsistentPartitioning {
                    partitions,
                    entries: phrase.entries,
                });
            }
        }

        Ok(Self {
            kind,
            begin,
            end,
            grouping,
            partitions,
            groupbook,
            cascade,
            booklist,
        })
    }
}

/// Per-stream scratch for residue decode, reused across packets.
#[derive(Debug, Default)]
pub struct ResidueScratch {
    /// Decoded phrase words per channel per group.
    pub partwords: Vec<Vec<usize>>,
    /// Interleave offsets for kind 0 vector fetches.
    pub t: Vec<usize>,
}

#[derive(Debug)]
pub struct ResidueRuntime {
    pub cfg: ResidueConfig,
    /// Highest cascade stage in use.
    pub stages: usize,
    /// Stage books per class, `None` where the cascade bit is clear.
    pub stage_books: Vec<[Option<usize>; 8]>,
    /// Class tuples addressable by one phrase codeword.
    pub partvals: usize,
    /// Phrase entry to per-slot classes, mixed radix.
    pub decodemap: Vec<Vec<usize>>,
    pub phrase_dim: usize,
}

impl ResidueRuntime {
    pub fn new(cfg: ResidueConfig, books: &[Codebook]) -> Self {
        let phrase_dim = books[cfg.groupbook].dim;
        let parts = cfg.partitions;

        let mut stage_books = vec![[None; 8]; parts];
        let mut stages = 0usize;
        let mut acc = 0usize;
        for (j, &bits) in cfg.cascade.iter().enumerate() {
            let class_stages = ilog(bits) as usize;
            stages = stages.max(class_stages);
            for (k, slot) in stage_books[j].iter_mut().enumerate().take(class_stages) {
                if bits & (1 << k) != 0 {
                    *slot = Some(cfg.booklist[acc]);
                    acc += 1;
                }
            }
        }

        let partvals = parts.pow(phrase_dim as u32);
        let mut decodemap = Vec::with_capacity(partvals);
        for j in 0..partvals {
            let mut val = j;
            let mut mult = partvals / parts;
            let mut row = vec![0usize; phrase_dim];
            for slot in row.iter_mut() {
                let deco = val / mult;
                val -= deco * mult;
                mult /= parts;
                *slot = deco;
            }
            decodemap.push(row);
        }

        Self {
            cfg,
            stages,
            stage_books,
            partvals,
            decodemap,
            phrase_dim,
        }
    }

    /// Decodes this residue for one submap bundle.
    ///
    /// `nonzero` flags which bundle channels carry audio this block. Kinds
    /// 0 and 1 decode only those; kind 2 decodes the whole bundle jointly
    /// whenever any channel is live. Bit starvation ends decode quietly,
    /// leaving the remaining spectrum zero.
    pub fn inverse(
        &self,
        reader: &mut BsIoSliceReader,
        books: &[Codebook],
        bundle: &mut [&mut [f32]],
        nonzero: &[bool],
        n2: usize,
        scratch: &mut ResidueScratch,
    ) -> Result<()> {
        let result = match self.cfg.kind {
            2 => {
                if nonzero.iter().any(|&f| f) {
                    self.inverse2(reader, books, bundle, n2, scratch)
                } else {
                    Ok(())
                }
            }
            _ => {
                let mut live: Vec<&mut [f32]> = Vec::with_capacity(bundle.len());
                for (ch, &f) in bundle.iter_mut().zip(nonzero) {
                    if f {
                        live.push(&mut ch[..]);
                    }
                }
                if live.is_empty() {
                    Ok(())
                } else {
                    self.inverse01(reader, books, &mut live, n2, scratch)
                }
            }
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if starved(&e) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn inverse01(
        &self,
        reader: &mut BsIoSliceReader,
        books: &[Codebook],
        bundle: &mut [&mut [f32]],
        n2: usize,
        scratch: &mut ResidueScratch,
    ) -> io::Result<()> {
        let info = &self.cfg;
        let ch = bundle.len();

        let samples_per_partition = info.grouping;
        let partitions_per_word = self.phrase_dim;
        let end = info.end.min(n2);
        if end <= info.begin {
            return Ok(());
        }
        let n = end - info.begin;

        let partvals = n / samples_per_partition;
        let partwords = partvals.div_ceil(partitions_per_word);

        if scratch.partwords.len() < ch {
            scratch.partwords.resize_with(ch, Vec::new);
        }
        for pw in scratch.partwords.iter_mut().take(ch) {
            pw.clear();
            pw.resize(partwords, 0);
        }

        let phrasebook = &books[info.groupbook];

        for s in 0..self.stages {
            let mut i = 0;
            let mut l = 0;
            while i < partvals {
                if s == 0 {
                    // fetch the partition word for each channel
                    for pw in scratch.partwords.iter_mut().take(ch) {
                        let temp = phrasebook.decode(reader)? as usize;
                        if temp >= self.partvals {
                            return Ok(());
                        }
                        pw[l] = temp;
                    }
                }

                // decode residual values for this group's partitions
                let mut k = 0;
                while k < partitions_per_word && i < partvals {
                    for (j, part) in bundle.iter_mut().enumerate() {
                        let offset = info.begin + i * samples_per_partition;
                        let class = self.decodemap[scratch.partwords[j][l]][k];
                        if info.cascade[class] & (1 << s) == 0 {
                            continue;
                        }
                        let Some(book) = self.stage_books[class][s] else {
                            continue;
                        };
                        let book = &books[book];
                        if info.kind == 0 {
                            book.decodevs_add(
                                part,
                                offset,
                                reader,
                                samples_per_partition,
                                &mut scratch.t,
                            )?;
                        } else {
                            book.decodev_add(part, offset, reader, samples_per_partition)?;
                        }
                    }
                    k += 1;
                    i += 1;
                }
                l += 1;
            }
        }

        Ok(())
    }

    fn inverse2(
        &self,
        reader: &mut BsIoSliceReader,
        books: &[Codebook],
        bundle: &mut [&mut [f32]],
        n2: usize,
        scratch: &mut ResidueScratch,
    ) -> io::Result<()> {
        let info = &self.cfg;

        let samples_per_partition = info.grouping;
        let partitions_per_word = self.phrase_dim;
        let end = info.end.min(n2 * bundle.len());
        if end <= info.begin {
            return Ok(());
        }
        let n = end - info.begin;

        let partvals = n / samples_per_partition;
        let partwords = partvals.div_ceil(partitions_per_word);

        if scratch.partwords.is_empty() {
            scratch.partwords.resize_with(1, Vec::new);
        }
        let partword = &mut scratch.partwords[0];
        partword.clear();
        partword.resize(partwords, 0);

        let phrasebook = &books[info.groupbook];

        for s in 0..self.stages {
            let mut i = 0;
            let mut l = 0;
            while i < partvals {
                if s == 0 {
                    // one partition word covers all channels jointly
                    let temp = phrasebook.decode(reader)? as usize;
                    if temp >= self.partvals {
                        return Ok(());
                    }
                    partword[l] = temp;
                }

                let mut k = 0;
                while k < partitions_per_word && i < partvals {
                    let offset = info.begin + i * samples_per_partition;
                    let class = self.decodemap[partword[l]][k];
                    if info.cascade[class] & (1 << s) != 0 {
                        if let Some(book) = self.stage_books[class][s] {
                            books[book].decodevv_add(
                                bundle,
                                offset,
                                reader,
                                samples_per_partition,
                            )?;
                        }
                    }
                    k += 1;
                    i += 1;
                }
                l += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime_with(parts: usize, phrase_dim: usize) -> ResidueRuntime {
        let phrase_entries = parts.pow(phrase_dim as u32);
        let cfg = ResidueConfig {
            kind: 1,
            begin: 0,
            end: 256,
            grouping: 32,
            partitions: parts,
            groupbook: 0,
            cascade: vec![0; parts],
            booklist: vec![],
        };
        let books = vec![
            Codebook::new(&CodebookConfig {
                dim: phrase_dim,
                entries: phrase_entries,
                lengths: vec![ilog(phrase_entries as u32 - 1).max(1) as u8; phrase_entries],
                ..Default::default()
            })
            .unwrap(),
        ];
        ResidueRuntime::new(cfg, &books)
    }

    #[test]
    fn decodemap_is_mixed_radix() {
        let rt = runtime_with(3, 2);
        assert_eq!(rt.partvals, 9);
        // entry j maps to (j / 3, j % 3), most significant slot first
        assert_eq!(rt.decodemap[0], vec![0, 0]);
        assert_eq!(rt.decodemap[5], vec![1, 2]);
        assert_eq!(rt.decodemap[8], vec![2, 2]);
    }

    #[test]
    fn stage_books_follow_cascade_bits() {
        let cfg = ResidueConfig {
            kind: 1,
            begin: 0,
            end: 256,
            grouping: 32,
            partitions: 2,
            groupbook: 0,
            // class 0 decodes at stages 0 and 2, class 1 at stage 1
            cascade: vec![0b101, 0b010],
            booklist: vec![1, 2, 3],
        };
        let books: Vec<Codebook> = (0..2)
            .map(|_| {
                Codebook::new(&CodebookConfig {
                    dim: 1,
                    entries: 2,
                    lengths: vec![1, 1],
                    ..Default::default()
                })
                .unwrap()
            })
            .collect();
        let rt = ResidueRuntime::new(cfg, &books);

        assert_eq!(rt.stages, 3);
        assert_eq!(rt.stage_books[0][0], Some(1));
        assert_eq!(rt.stage_books[0][1], None);
        assert_eq!(rt.stage_books[0][2], Some(2));
        assert_eq!(rt.stage_books[1][1], Some(3));
    }
}
