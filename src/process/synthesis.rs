//! Audio packet synthesis.
//!
//! One packet in, one PCM block out. Each audio packet carries a mode
//! index, optional window-shape flags and the mapping payload; synthesis
//! decodes the windowed block and overlap-adds it against the previous
//! block's retained half, emitting only fully reconstructed samples. The
//! first audio packet primes the lap and emits nothing.
//!
//! Decode is single-threaded and stateless across packets apart from the
//! read-only setup tables and this struct's scratch; concurrent streams
//! each need their own [`Synthesizer`].

use anyhow::{Result, bail};
use log::trace;

use crate::dsp::mdct::Mdct;
use crate::dsp::window::WindowSet;
use crate::process::Packet;
use crate::process::headers::HeaderParser;
use crate::structs::codebook::Codebook;
use crate::structs::floor::FloorState;
use crate::structs::info::SetupHeader;
use crate::structs::mapping::MappingRuntime;
use crate::structs::residue::{ResidueRuntime, ResidueScratch};
use crate::utils::bitstream_io::{BsIoSliceReader, ilog};
use crate::utils::errors::{HeaderError, SynthesisError};

/// One mode's decode machinery: block size flag plus the mapping runtime
/// built for that block size.
#[derive(Debug)]
pub struct ModeRuntime {
    pub blockflag: usize,
    pub mapping: MappingRuntime,
}

/// The result of synthesizing one audio packet.
///
/// `pcm[channel]` holds `samples` fully overlapped samples in the nominal
/// -1..1 range. The caller owns interleaving and format conversion.
#[derive(Debug)]
pub struct DecodedBlock {
    pub pcm: Vec<Vec<f32>>,
    pub samples: usize,
}

/// Decodes audio packets to PCM for one logical stream.
pub struct Synthesizer {
    pub channels: usize,
    pub rate: u32,
    pub blocksizes: [usize; 2],

    pub books: Vec<Codebook>,
    pub modes: Vec<ModeRuntime>,
    mode_bits: u32,
    windows: WindowSet,
    mdct: [Mdct; 2],

    /// Per-packet windowed block scratch, channels x long block size.
    pub pcm: Vec<Vec<f32>>,
    floor_states: Vec<FloorState>,
    residue_scratch: ResidueScratch,

    /// Right half of the previous windowed block, awaiting overlap.
    lap: Vec<Vec<f32>>,
    lap_flag: usize,
    primed: bool,
    /// Samples emitted so far, for end-of-stream granule truncation.
    emitted: u64,
}

impl Synthesizer {
    /// Builds the decode runtime from fully parsed headers.
    pub fn new(headers: &HeaderParser) -> Result<Self> {
        let Some(ident) = &headers.ident else {
            bail!(HeaderError::Incomplete("identification"));
        };
        if headers.comment.is_none() {
            bail!(HeaderError::Incomplete("comment"));
        }
        let Some(setup) = &headers.setup else {
            bail!(HeaderError::Incomplete("setup"));
        };

        let books = setup
            .codebooks
            .iter()
            .map(Codebook::new)
            .collect::<Result<Vec<_>>>()?;

        let modes = setup
            .modes
            .iter()
            .map(|mode| {
                let blocksize = ident.blocksizes[mode.blockflag];
                Ok(ModeRuntime {
                    blockflag: mode.blockflag,
                    mapping: build_mapping(setup, &books, mode.mapping, blocksize),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let channels = ident.channels;
        let long = ident.blocksizes[1];

        Ok(Self {
            channels,
            rate: ident.rate,
            blocksizes: ident.blocksizes,
            mode_bits: ilog(modes.len() as u32 - 1),
            modes,
            books,
            windows: WindowSet::new(ident.blocksizes),
            mdct: [Mdct::new(ident.blocksizes[0]), Mdct::new(ident.blocksizes[1])],
            pcm: vec![vec![0.0; long]; channels],
            floor_states: std::iter::repeat_with(FloorState::default)
                .take(channels)
                .collect(),
            residue_scratch: ResidueScratch::default(),
            lap: vec![Vec::new(); channels],
            lap_flag: 0,
            primed: false,
            emitted: 0,
        })
    }

    /// Decodes one audio packet.
    ///
    /// A failure drops only this packet: the lap state and scratch stay
    /// valid and the next packet decodes normally. A payload that starves
    /// mid-decode is not a failure; it yields a silent or partial block.
    pub fn synthesis(&mut self, packet: &Packet) -> Result<DecodedBlock> {
        let reader = &mut BsIoSliceReader::from_slice(packet.data);

        if reader.get()? {
            bail!(SynthesisError::NotAudioPacket);
        }

        let mode = reader.get_n0(self.mode_bits)? as usize;
        if mode >= self.modes.len() {
            bail!(SynthesisError::InvalidMode {
                mode,
                modes: self.modes.len(),
            });
        }

        let w = self.modes[mode].blockflag;
        let (lw, nw) = if w != 0 {
            (reader.get()? as usize, reader.get()? as usize)
        } else {
            (0, 0)
        };
        let n = self.blocksizes[w];

        trace!("audio packet: mode {mode}, block {n}, window {lw}/{nw}");

        let channels = self.channels;
        let blocksizes = self.blocksizes;
        let Self {
            modes,
            books,
            windows,
            mdct,
            pcm,
            floor_states,
            residue_scratch,
            lap,
            lap_flag,
            primed,
            emitted,
            ..
        } = self;

        modes[mode].mapping.inverse(
            reader,
            books,
            &mut mdct[w],
            windows.get(w, lw, nw),
            pcm,
            floor_states,
            residue_scratch,
            n,
        )?;

        // overlap-add against the previous block's right half; output
        // spans the previous center to the current center
        let mut out_samples = 0;
        let mut out: Vec<Vec<f32>> = vec![Vec::new(); channels];
        if *primed {
            let prev_n = blocksizes[*lap_flag];
            let d = prev_n / 4 + n / 4;
            let shift = n as isize / 4 - prev_n as isize / 4;

            for (ch, out_ch) in out.iter_mut().enumerate() {
                out_ch.resize(d, 0.0);
                for (i, v) in out_ch.iter_mut().enumerate() {
                    if i < prev_n / 2 {
                        *v = lap[ch][i];
                    }
                    let j = i as isize + shift;
                    if j >= 0 {
                        *v += pcm[ch][j as usize];
                    }
                }
            }
            out_samples = d;
        }

        for (ch, lap_ch) in lap.iter_mut().enumerate() {
            lap_ch.clear();
            lap_ch.extend_from_slice(&pcm[ch][n / 2..n]);
        }
        *lap_flag = w;
        *primed = true;

        // the end-of-stream granule marks the true last sample; the final
        // block may be cut short to land on it
        if packet.end_of_stream && packet.granule_pos >= 0 {
            let granule = packet.granule_pos as u64;
            if granule < *emitted + out_samples as u64 {
                out_samples = granule.saturating_sub(*emitted) as usize;
                for out_ch in out.iter_mut() {
                    out_ch.truncate(out_samples);
                }
            }
        }
        *emitted += out_samples as u64;

        Ok(DecodedBlock {
            pcm: out,
            samples: out_samples,
        })
    }

    /// Block size an audio packet would decode to, without decoding it.
    pub fn packet_blocksize(&self, packet: &Packet) -> Result<usize> {
        let reader = &mut BsIoSliceReader::from_slice(packet.data);

        if reader.get()? {
            bail!(SynthesisError::NotAudioPacket);
        }
        let mode = reader.get_n0(self.mode_bits)? as usize;
        if mode >= self.modes.len() {
            bail!(SynthesisError::InvalidMode {
                mode,
                modes: self.modes.len(),
            });
        }

        Ok(self.blocksizes[self.modes[mode].blockflag])
    }
}

fn build_mapping(
    setup: &SetupHeader,
    books: &[Codebook],
    mapping: usize,
    blocksize: usize,
) -> MappingRuntime {
    let cfg = setup.mappings[mapping].clone();

    let floors = cfg
        .submap_floor
        .iter()
        .map(|&f| setup.floors[f].look(blocksize))
        .collect();
    let residues = cfg
        .submap_residue
        .iter()
        .map(|&r| ResidueRuntime::new(setup.residues[r].clone(), books))
        .collect();

    MappingRuntime {
        cfg,
        floors,
        residues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use bitstream_io::{BitWrite, BitWriter, LittleEndian};

    use crate::process::headers::{
        HEADER_COMMENT, HEADER_IDENTIFICATION, HEADER_SETUP, VORBIS_MAGIC,
    };
    use crate::structs::codebook::CODEBOOK_SYNC;

    fn header_packet(packtype: u8, body: &[u8]) -> Vec<u8> {
        let mut p = vec![packtype];
        p.extend_from_slice(VORBIS_MAGIC);
        p.extend_from_slice(body);
        p
    }

    fn identification_packet() -> Vec<u8> {
        let mut w = BitWriter::endian(Vec::new(), LittleEndian);
        w.write_var(32, 0u32).unwrap(); // version
        w.write_var(8, 1u32).unwrap(); // channels
        w.write_var(32, 44100u32).unwrap(); // rate
        w.write_var(32, 0u32).unwrap(); // bitrate upper
        w.write_var(32, 0u32).unwrap(); // bitrate nominal
        w.write_var(32, 0u32).unwrap(); // bitrate lower
        w.write_var(4, 8u32).unwrap(); // blocksize 0: 256
        w.write_var(4, 11u32).unwrap(); // blocksize 1: 2048
        w.write_bit(true).unwrap(); // framing
        w.byte_align().unwrap();
        header_packet(HEADER_IDENTIFICATION, &w.into_writer())
    }

    fn comment_packet() -> Vec<u8> {
        let mut w = BitWriter::endian(Vec::new(), LittleEndian);
        w.write_var(32, 0u32).unwrap(); // vendor length
        w.write_var(32, 0u32).unwrap(); // comment count
        w.write_bit(true).unwrap(); // framing
        w.byte_align().unwrap();
        header_packet(HEADER_COMMENT, &w.into_writer())
    }

    /// Minimal setup: one single-entry scalar book, one floor 1 with a
    /// single partition and no subclass books, one residue with an empty
    /// cascade, one mapping, one short-block mode.
    fn setup_packet() -> Vec<u8> {
        let mut w = BitWriter::endian(Vec::new(), LittleEndian);

        w.write_var(8, 0u32).unwrap(); // book count - 1
        w.write_var(24, CODEBOOK_SYNC).unwrap();
        w.write_var(16, 1u32).unwrap(); // dim
        w.write_var(24, 1u32).unwrap(); // entries
        w.write_bit(false).unwrap(); // unordered
        w.write_bit(false).unwrap(); // no sparse tagging
        w.write_var(5, 0u32).unwrap(); // entry 0: length 1
        w.write_var(4, 0u32).unwrap(); // map type 0

        w.write_var(6, 0u32).unwrap(); // time count - 1
        w.write_var(16, 0u32).unwrap(); // time type 0

        w.write_var(6, 0u32).unwrap(); // floor count - 1
        w.write_var(16, 1u32).unwrap(); // floor type 1
        w.write_var(5, 1u32).unwrap(); // partitions
        w.write_var(4, 0u32).unwrap(); // partition class
        w.write_var(3, 0u32).unwrap(); // class dim - 1
        w.write_var(2, 0u32).unwrap(); // class subs
        w.write_var(8, 0u32).unwrap(); // subbook 0: unused
        w.write_var(2, 0u32).unwrap(); // mult - 1
        w.write_var(4, 8u32).unwrap(); // rangebits
        w.write_var(8, 128u32).unwrap(); // post position

        w.write_var(6, 0u32).unwrap(); // residue count - 1
        w.write_var(16, 0u32).unwrap(); // residue type 0
        w.write_var(24, 0u32).unwrap(); // begin
        w.write_var(24, 128u32).unwrap(); // end
        w.write_var(24, 15u32).unwrap(); // grouping - 1
        w.write_var(6, 0u32).unwrap(); // partitions - 1
        w.write_var(8, 0u32).unwrap(); // group book
        w.write_var(3, 0u32).unwrap(); // cascade low bits
        w.write_bit(false).unwrap(); // no high bits

        w.write_var(6, 0u32).unwrap(); // mapping count - 1
        w.write_var(16, 0u32).unwrap(); // mapping type 0
        w.write_bit(false).unwrap(); // one submap
        w.write_bit(false).unwrap(); // no coupling
        w.write_var(2, 0u32).unwrap(); // reserved
        w.write_var(8, 0u32).unwrap(); // time 0
        w.write_var(8, 0u32).unwrap(); // floor 0
        w.write_var(8, 0u32).unwrap(); // residue 0

        w.write_var(6, 0u32).unwrap(); // mode count - 1
        w.write_bit(false).unwrap(); // blockflag: short
        w.write_var(16, 0u32).unwrap(); // window type
        w.write_var(16, 0u32).unwrap(); // transform type
        w.write_var(8, 0u32).unwrap(); // mapping 0

        w.write_bit(true).unwrap(); // framing
        w.byte_align().unwrap();
        header_packet(HEADER_SETUP, &w.into_writer())
    }

    fn parsed_headers() -> Result<HeaderParser> {
        let mut parser = HeaderParser::default();
        let ident = identification_packet();
        parser.parse(&Packet {
            begin_of_stream: true,
            ..Packet::new(&ident)
        })?;
        parser.parse(&Packet::new(&comment_packet()))?;
        parser.parse(&Packet::new(&setup_packet()))?;
        assert!(parser.is_complete());
        Ok(parser)
    }

    #[test]
    fn crafted_headers_build_a_synthesizer() -> Result<()> {
        let synth = Synthesizer::new(&parsed_headers()?)?;
        assert_eq!(synth.channels, 1);
        assert_eq!(synth.rate, 44100);
        assert_eq!(synth.blocksizes, [256, 2048]);
        assert_eq!(synth.modes.len(), 1);
        Ok(())
    }

    #[test]
    fn incomplete_headers_rejected() -> Result<()> {
        let mut parser = HeaderParser::default();
        let ident = identification_packet();
        parser.parse(&Packet {
            begin_of_stream: true,
            ..Packet::new(&ident)
        })?;
        assert!(Synthesizer::new(&parser).is_err());
        Ok(())
    }

    #[test]
    fn silent_packet_yields_a_full_zero_block() -> Result<()> {
        let mut synth = Synthesizer::new(&parsed_headers()?)?;

        // type bit 0, zero mode bits, floor presence bit 0
        let audio = [0x00u8];
        let first = synth.synthesis(&Packet::new(&audio))?;

        // the windowed block spans exactly the short block size, finite
        // and silent
        assert!(synth.pcm[0][..256].iter().all(|v| *v == 0.0 && v.is_finite()));
        // the first block only primes the lap
        assert_eq!(first.samples, 0);

        let second = synth.synthesis(&Packet::new(&audio))?;
        assert_eq!(second.samples, 128);
        assert_eq!(second.pcm[0].len(), 128);
        assert!(second.pcm[0].iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn packet_blocksize_reports_the_mode_block() -> Result<()> {
        let synth = Synthesizer::new(&parsed_headers()?)?;
        assert_eq!(synth.packet_blocksize(&Packet::new(&[0x00]))?, 256);
        assert!(synth.packet_blocksize(&Packet::new(&[0x01])).is_err());
        Ok(())
    }

    #[test]
    fn corrupt_packets_drop_without_poisoning_the_stream() -> Result<()> {
        let mut synth = Synthesizer::new(&parsed_headers()?)?;
        let audio = [0x00u8];

        synth.synthesis(&Packet::new(&audio))?;

        // empty payload starves on the type bit: a per-packet error
        assert!(synth.synthesis(&Packet::new(&[])).is_err());
        // set type bit: not an audio packet
        assert!(synth.synthesis(&Packet::new(&[0x01])).is_err());

        // the stream continues as if the bad packets never arrived
        let ok = synth.synthesis(&Packet::new(&audio))?;
        assert_eq!(ok.samples, 128);
        assert!(ok.pcm[0].iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn truncated_payload_decodes_to_silence_not_error() -> Result<()> {
        let mut synth = Synthesizer::new(&parsed_headers()?)?;
        synth.synthesis(&Packet::new(&[0x00]))?;

        // floor presence bit set, then the payload ends mid-amplitude:
        // the floor starves, the channel falls silent, the block stands
        let truncated = [0x02u8];
        let out = synth.synthesis(&Packet::new(&truncated))?;
        assert_eq!(out.samples, 128);
        assert!(out.pcm[0].iter().all(|v| *v == 0.0));
        assert!(synth.pcm[0][..256].iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn end_of_stream_granule_truncates_the_tail() -> Result<()> {
        let mut synth = Synthesizer::new(&parsed_headers()?)?;
        let audio = [0x00u8];

        synth.synthesis(&Packet::new(&audio))?;
        let mid = synth.synthesis(&Packet::new(&audio))?;
        assert_eq!(mid.samples, 128);

        let last = synth.synthesis(&Packet {
            granule_pos: 200,
            end_of_stream: true,
            ..Packet::new(&audio)
        })?;
        assert_eq!(last.samples, 200 - 128);
        assert_eq!(last.pcm[0].len(), 72);
        Ok(())
    }
}
