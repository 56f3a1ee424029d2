//! Identification header and stream setup tables.
//!
//! The identification packet carries the basic stream parameters; the
//! setup packet carries everything decode reads from afterwards: codebooks,
//! the (vestigial) time table, floors, residues, mappings and modes. Every
//! count and cross-reference is validated here, and the decode hot paths
//! trust those bounds without re-checking: header parsing is the only
//! barrier between a hostile stream and out-of-bounds access.

use anyhow::{Result, bail};
use log::debug;

use crate::structs::codebook::CodebookConfig;
use crate::structs::floor::FloorConfig;
use crate::structs::mapping::MappingConfig;
use crate::structs::residue::ResidueConfig;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::HeaderError;

/// Basic stream parameters from the identification header.
#[derive(Debug, Clone, Default)]
pub struct IdentHeader {
    pub version: u32,
    pub channels: usize,
    pub rate: u32,

    /// Bitrate hints; all three equal means fixed rate, only nominal set
    /// means an unconstrained VBR average, zero means no statement.
    pub bitrate_upper: i32,
    pub bitrate_nominal: i32,
    pub bitrate_lower: i32,

    /// Short and long block size, powers of two with
    /// `blocksizes[0] <= blocksizes[1]`.
    pub blocksizes: [usize; 2],
}

impl IdentHeader {
    pub fn read(reader: &mut BsIoSliceReader) -> Result<Self> {
        let version = reader.get_n::<u32>(32)?;
        if version != 0 {
            bail!(HeaderError::UnsupportedVersion(version));
        }

        let channels = reader.get_n::<u8>(8)? as usize;
        let rate = reader.get_n::<u32>(32)?;
        if channels < 1 {
            bail!(HeaderError::InvalidChannelCount);
        }
        if rate < 1 {
            bail!(HeaderError::InvalidSampleRate(rate));
        }

        let bitrate_upper = reader.get_n::<u32>(32)? as i32;
        let bitrate_nominal = reader.get_n::<u32>(32)? as i32;
        let bitrate_lower = reader.get_n::<u32>(32)? as i32;

        let mut blocksizes = [0usize; 2];
        for (index, size) in blocksizes.iter_mut().enumerate() {
            *size = 1usize << reader.get_n::<u32>(4)?;
            if !(8..=8192).contains(size) {
                bail!(HeaderError::InvalidBlockSize { index, size: *size });
            }
        }
        if blocksizes[1] < blocksizes[0] {
            bail!(HeaderError::BlockSizeOrder {
                short: blocksizes[0],
                long: blocksizes[1],
            });
        }

        if !reader.get()? {
            bail!(HeaderError::MissingFramingBit("identification"));
        }

        debug!(
            "identification: {channels} ch, {rate} Hz, blocks {}/{}",
            blocksizes[0], blocksizes[1]
        );

        Ok(Self {
            version,
            channels,
            rate,
            bitrate_upper,
            bitrate_nominal,
            bitrate_lower,
            blocksizes,
        })
    }
}

/// One decode mode: a block size flag and a mapping.
#[derive(Debug, Clone, Copy)]
pub struct ModeConfig {
    pub blockflag: usize,
    pub mapping: usize,
}

/// The complete setup header.
#[derive(Debug, Default)]
pub struct SetupHeader {
    pub codebooks: Vec<CodebookConfig>,
    /// Entry count of the vestigial time table; every type must be zero.
    pub times: usize,
    pub floors: Vec<FloorConfig>,
    pub residues: Vec<ResidueConfig>,
    pub mappings: Vec<MappingConfig>,
    pub modes: Vec<ModeConfig>,
}

impl SetupHeader {
    pub fn read(reader: &mut BsIoSliceReader, ident: &IdentHeader) -> Result<Self> {
        let mut setup = SetupHeader::default();

        let books = reader.get_n::<u8>(8)? as usize + 1;
        for _ in 0..books {
            setup.codebooks.push(CodebookConfig::read(reader)?);
        }

        // time backend settings: the table survives in the bitstream but
        // every entry must carry the null transform
        setup.times = reader.get_n::<u8>(6)? as usize + 1;
        for index in 0..setup.times {
            let value = reader.get_n::<u32>(16)?;
            if value != 0 {
                bail!(HeaderError::InvalidTimeType { index, value });
            }
        }

        let floors = reader.get_n::<u8>(6)? as usize + 1;
        for _ in 0..floors {
            setup
                .floors
                .push(FloorConfig::read(reader, &setup.codebooks)?);
        }

        let residues = reader.get_n::<u8>(6)? as usize + 1;
        for _ in 0..residues {
            setup
                .residues
                .push(ResidueConfig::read(reader, &setup.codebooks)?);
        }

        let maps = reader.get_n::<u8>(6)? as usize + 1;
        for _ in 0..maps {
            setup.mappings.push(MappingConfig::read(
                reader,
                ident.channels,
                setup.times,
                setup.floors.len(),
                setup.residues.len(),
            )?);
        }

        let modes = reader.get_n::<u8>(6)? as usize + 1;
        for index in 0..modes {
            let blockflag = reader.get()? as usize;
            let windowtype = reader.get_n::<u32>(16)?;
            let transformtype = reader.get_n::<u32>(16)?;
            let mapping = reader.get_n::<u8>(8)? as usize;

            if windowtype != 0 {
                bail!(HeaderError::InvalidWindowType {
                    index,
                    value: windowtype,
                });
            }
            if transformtype != 0 {
                bail!(HeaderError::InvalidTransformType {
                    index,
                    value: transformtype,
                });
            }
            if mapping >= setup.mappings.len() {
                bail!(HeaderError::ModeMappingOutOfRange {
                    index,
                    mapping,
                    mappings: setup.mappings.len(),
                });
            }

            setup.modes.push(ModeConfig { blockflag, mapping });
        }

        if !reader.get()? {
            bail!(HeaderError::MissingFramingBit("setup"));
        }

        debug!(
            "setup: {} books, {} floors, {} residues, {} mappings, {} modes",
            setup.codebooks.len(),
            setup.floors.len(),
            setup.residues.len(),
            setup.mappings.len(),
            setup.modes.len()
        );

        Ok(setup)
    }
}
