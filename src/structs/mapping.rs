//! Channel mapping and coupling.
//!
//! A mapping assigns each channel to a submap (a floor/residue bundle) and
//! declares zero or more magnitude/angle coupling pairs. Its inverse is the
//! per-block decode pipeline: floor pass 1, residue per submap, coupling
//! undo, floor pass 2, inverse MDCT, window.

use anyhow::{Result, bail};

use crate::dsp::mdct::Mdct;
use crate::structs::codebook::Codebook;
use crate::structs::floor::{FloorRuntime, FloorState};
use crate::structs::residue::{ResidueRuntime, ResidueScratch};
use crate::utils::bitstream_io::{BsIoSliceReader, ilog};
use crate::utils::errors::MappingError;

#[derive(Debug, Clone)]
pub struct MappingConfig {
    pub submaps: usize,
    /// Channel to submap, all zero when only one submap exists.
    pub chmux: Vec<usize>,
    pub submap_floor: Vec<usize>,
    pub submap_residue: Vec<usize>,
    /// (magnitude, angle) channel pairs, undone in reverse order.
    pub coupling: Vec<(usize, usize)>,
}

impl MappingConfig {
    pub fn read(
        reader: &mut BsIoSliceReader,
        channels: usize,
        times: usize,
        floors: usize,
        residues: usize,
    ) -> Result<Self> {
        let kind = reader.get_n::<u32>(16)?;
        if kind != 0 {
            bail!(MappingError::InvalidType(kind));
        }

        let submaps = if reader.get()? {
            reader.get_n::<u32>(4)? as usize + 1
        } else {
            1
        };

        let mut coupling = Vec::new();
        if reader.get()? {
            let steps = reader.get_n::<u8>(8)? as usize + 1;
            let bits = ilog(channels as u32 - 1);
            for _ in 0..steps {
                let magnitude = reader.get_n0(bits)? as usize;
                let angle = reader.get_n0(bits)? as usize;
                if magnitude == angle || magnitude >= channels || angle >= channels {
                    bail!(MappingError::InvalidCoupling {
                        magnitude,
                        angle,
                        channels,
                    });
                }
                coupling.push((magnitude, angle));
            }
        }

        let reserved = reader.get_n::<u32>(2)?;
        if reserved != 0 {
            bail!(MappingError::ReservedBitsSet(reserved));
        }

        let mut chmux = vec![0usize; channels];
        if submaps > 1 {
            for mux in chmux.iter_mut() {
                let submap = reader.get_n::<u32>(4)? as usize;
                if submap >= submaps {
                    bail!(MappingError::SubmapOutOfRange { submap, submaps });
                }
                *mux = submap;
            }
        }

        let mut submap_floor = Vec::with_capacity(submaps);
        let mut submap_residue = Vec::with_capacity(submaps);
        for _ in 0..submaps {
            let time = reader.get_n::<u8>(8)? as usize;
            if time >= times {
                bail!(MappingError::TimeOutOfRange { index: time, times });
            }
            let floor = reader.get_n::<u8>(8)? as usize;
            if floor >= floors {
                bail!(MappingError::FloorOutOfRange {
                    index: floor,
                    floors,
                });
            }
            let residue = reader.get_n::<u8>(8)? as usize;
            if residue >= residues {
                bail!(MappingError::ResidueOutOfRange {
                    index: residue,
                    residues,
                });
            }
            submap_floor.push(floor);
            submap_residue.push(residue);
        }

        Ok(Self {
            submaps,
            chmux,
            submap_floor,
            submap_residue,
            coupling,
        })
    }
}

/// Per-mode mapping runtime: the submap floor and residue lookups built for
/// this mode's block size.
#[derive(Debug)]
pub struct MappingRuntime {
    pub cfg: MappingConfig,
    pub floors: Vec<FloorRuntime>,
    pub residues: Vec<ResidueRuntime>,
}

impl MappingRuntime {
    /// Runs the block decode pipeline over `pcm` (channels × blocksize).
    #[allow(clippy::too_many_arguments)]
    pub fn inverse(
        &self,
        reader: &mut BsIoSliceReader,
        books: &[Codebook],
        mdct: &mut Mdct,
        window: &[f32],
        pcm: &mut [Vec<f32>],
        floor_states: &mut [FloorState],
        residue_scratch: &mut ResidueScratch,
        n: usize,
    ) -> Result<()> {
        let info = &self.cfg;
        let n2 = n / 2;

        // recover the spectral envelope per channel; the memo is rendered
        // only after residue decode, which needs the silence flags first
        for (i, ch_pcm) in pcm.iter_mut().enumerate() {
            let submap = info.chmux[i];
            self.floors[submap].inverse1(reader, books, &mut floor_states[i])?;
            ch_pcm[..n2].fill(0.0);
        }

        // a live channel keeps its coupling partner live
        for &(m, a) in &info.coupling {
            if floor_states[m].nonzero || floor_states[a].nonzero {
                floor_states[m].nonzero = true;
                floor_states[a].nonzero = true;
            }
        }

        // recover the residue directly into the spectral buffers
        for s in 0..info.submaps {
            let mut bundle: Vec<&mut [f32]> = Vec::new();
            let mut flags: Vec<bool> = Vec::new();
            for (i, ch_pcm) in pcm.iter_mut().enumerate() {
                if info.chmux[i] == s {
                    flags.push(floor_states[i].nonzero);
                    bundle.push(&mut ch_pcm[..]);
                }
            }
            self.residues[s].inverse(reader, books, &mut bundle, &flags, n2, residue_scratch)?;
        }

        // undo coupling in reverse declaration order
        for &(mi, ai) in info.coupling.iter().rev() {
            let (mag_ch, ang_ch) = pair_mut(pcm, mi, ai);
            for (m, a) in mag_ch[..n2].iter_mut().zip(&mut ang_ch[..n2]) {
                (*m, *a) = uncouple(*m, *a);
            }
        }

        // apply the floor curve onto the residue
        for (i, ch_pcm) in pcm.iter_mut().enumerate() {
            let submap = info.chmux[i];
            self.floors[submap].inverse2(&mut floor_states[i], &mut ch_pcm[..n2]);
        }

        for ch_pcm in pcm.iter_mut() {
            mdct.backward(&mut ch_pcm[..n]);
        }

        // window the data; silent channels emit exact zeros
        for (i, ch_pcm) in pcm.iter_mut().enumerate() {
            if floor_states[i].nonzero {
                for (v, w) in ch_pcm[..n].iter_mut().zip(window) {
                    *v *= w;
                }
            } else {
                ch_pcm[..n].fill(0.0);
            }
        }

        Ok(())
    }
}

/// Rebuilds the coupled channel pair from magnitude and angle. The sign
/// branches decide which channel absorbs the sum and which the difference,
/// avoiding sign ambiguity in the folded representation.
fn uncouple(mag: f32, ang: f32) -> (f32, f32) {
    if mag > 0.0 {
        if ang > 0.0 {
            (mag, mag - ang)
        } else {
            (mag + ang, mag)
        }
    } else if ang > 0.0 {
        (mag, mag + ang)
    } else {
        (mag - ang, mag)
    }
}

fn pair_mut(pcm: &mut [Vec<f32>], a: usize, b: usize) -> (&mut Vec<f32>, &mut Vec<f32>) {
    if a < b {
        let (lo, hi) = pcm.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = pcm.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use bitstream_io::{BitWrite, BitWriter, LittleEndian};

    #[test]
    fn uncouple_sign_branches() {
        // magnitude/angle reconstruction per quadrant
        assert_eq!(uncouple(3.0, 1.0), (3.0, 2.0));
        assert_eq!(uncouple(3.0, -1.0), (2.0, 3.0));
        assert_eq!(uncouple(-3.0, 1.0), (-3.0, -2.0));
        assert_eq!(uncouple(-3.0, -1.0), (-2.0, -3.0));
        // zero angle leaves both channels at the magnitude
        assert_eq!(uncouple(2.0, 0.0), (2.0, 2.0));
    }

    #[test]
    fn read_rejects_self_coupling() {
        let mut w = BitWriter::endian(Vec::new(), LittleEndian);
        w.write_var(16, 0u32).unwrap(); // mapping type
        w.write_bit(false).unwrap(); // one submap
        w.write_bit(true).unwrap(); // coupling present
        w.write_var(8, 0u32).unwrap(); // one step
        w.write_var(1, 0u32).unwrap(); // magnitude 0
        w.write_var(1, 0u32).unwrap(); // angle 0: invalid
        w.byte_align().unwrap();
        let body = w.into_writer();

        let mut r = BsIoSliceReader::from_slice(&body);
        assert!(MappingConfig::read(&mut r, 2, 1, 1, 1).is_err());
    }

    #[test]
    fn read_stereo_coupled_mapping() -> Result<()> {
        let mut w = BitWriter::endian(Vec::new(), LittleEndian);
        w.write_var(16, 0u32).unwrap(); // mapping type
        w.write_bit(false).unwrap(); // one submap
        w.write_bit(true).unwrap(); // coupling present
        w.write_var(8, 0u32).unwrap(); // one step
        w.write_var(1, 0u32).unwrap(); // magnitude 0
        w.write_var(1, 1u32).unwrap(); // angle 1
        w.write_var(2, 0u32).unwrap(); // reserved
        w.write_var(8, 0u32).unwrap(); // time 0
        w.write_var(8, 0u32).unwrap(); // floor 0
        w.write_var(8, 0u32).unwrap(); // residue 0
        w.byte_align().unwrap();
        let body = w.into_writer();

        let mut r = BsIoSliceReader::from_slice(&body);
        let cfg = MappingConfig::read(&mut r, 2, 1, 1, 1)?;
        assert_eq!(cfg.submaps, 1);
        assert_eq!(cfg.chmux, vec![0, 0]);
        assert_eq!(cfg.coupling, vec![(0, 1)]);
        assert_eq!(cfg.submap_floor, vec![0]);
        assert_eq!(cfg.submap_residue, vec![0]);
        Ok(())
    }
}
