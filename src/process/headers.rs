//! Header packet parsing.
//!
//! A Vorbis stream opens with three header packets (identification,
//! comment, setup), each gated by a one-byte type tag and the six-byte
//! magic. Ordering is enforced; every field is range-checked; a violation
//! discards the partial configuration and fails the stream. Decode trusts
//! these bounds and never re-validates them.

use anyhow::{Result, bail};

use crate::process::Packet;
use crate::structs::comment::CommentHeader;
use crate::structs::info::{IdentHeader, SetupHeader};
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::HeaderError;

pub const VORBIS_MAGIC: &[u8; 6] = b"vorbis";

pub const HEADER_IDENTIFICATION: u8 = 0x01;
pub const HEADER_COMMENT: u8 = 0x03;
pub const HEADER_SETUP: u8 = 0x05;

/// Parses the three header packets into the stream configuration.
///
/// Feed header packets in stream order with [`parse`](Self::parse); once
/// [`is_complete`](Self::is_complete) the parsed parts seed a
/// [`Synthesizer`](crate::process::synthesis::Synthesizer).
pub struct HeaderParser {
    pub ident: Option<IdentHeader>,
    pub comment: Option<CommentHeader>,
    pub setup: Option<SetupHeader>,
    pub fail_level: log::Level,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self {
            ident: None,
            comment: None,
            setup: None,
            fail_level: log::Level::Error,
        }
    }
}

impl HeaderParser {
    pub fn parse(&mut self, packet: &Packet) -> Result<()> {
        let reader = &mut BsIoSliceReader::from_slice(packet.data);

        let packtype = reader.get_n::<u8>(8)?;
        let mut magic = [0u8; 6];
        reader.read_bytes(&mut magic)?;
        if &magic != VORBIS_MAGIC {
            bail!(HeaderError::NotVorbis);
        }

        match packtype {
            HEADER_IDENTIFICATION => {
                if !packet.begin_of_stream {
                    bail!(HeaderError::IdentificationMidStream);
                }
                if self.ident.is_some() {
                    bail!(HeaderError::DuplicateHeader("identification"));
                }
                self.ident = Some(IdentHeader::read(reader)?);
            }
            HEADER_COMMENT => {
                if self.ident.is_none() {
                    bail!(HeaderError::HeaderOutOfOrder {
                        got: "comment",
                        expected: "identification",
                    });
                }
                if self.comment.is_some() {
                    bail!(HeaderError::DuplicateHeader("comment"));
                }
                self.comment = Some(CommentHeader::read(reader, self.fail_level)?);
            }
            HEADER_SETUP => {
                let Some(ident) = &self.ident else {
                    bail!(HeaderError::HeaderOutOfOrder {
                        got: "setup",
                        expected: "identification",
                    });
                };
                if self.comment.is_none() {
                    bail!(HeaderError::HeaderOutOfOrder {
                        got: "setup",
                        expected: "comment",
                    });
                }
                if self.setup.is_some() {
                    bail!(HeaderError::DuplicateHeader("setup"));
                }
                self.setup = Some(SetupHeader::read(reader, ident)?);
            }
            t => bail!(HeaderError::InvalidHeaderType(t)),
        }

        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.ident.is_some() && self.comment.is_some() && self.setup.is_some()
    }

    /// Sets the failure level for tolerated irregularities.
    ///
    /// - `log::Level::Error`: only fail on hard violations (default)
    /// - `log::Level::Warn`: fail on tolerated irregularities too (strict)
    pub fn set_fail_level(&mut self, level: log::Level) {
        self.fail_level = level;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn header_packet(packtype: u8, body: &[u8]) -> Vec<u8> {
        let mut p = vec![packtype];
        p.extend_from_slice(VORBIS_MAGIC);
        p.extend_from_slice(body);
        p
    }

    fn bos_packet(data: &[u8]) -> Packet<'_> {
        Packet {
            begin_of_stream: true,
            ..Packet::new(data)
        }
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut parser = HeaderParser::default();
        let data = [0x01, b'v', b'o', b'r', b'b', b'e', b's'];
        assert!(parser.parse(&bos_packet(&data)).is_err());
    }

    #[test]
    fn rejects_identification_mid_stream() {
        let mut parser = HeaderParser::default();
        let data = header_packet(HEADER_IDENTIFICATION, &[]);
        assert!(parser.parse(&Packet::new(&data)).is_err());
    }

    #[test]
    fn rejects_out_of_order_headers() {
        let mut parser = HeaderParser::default();
        let comment = header_packet(HEADER_COMMENT, &[]);
        let e = parser.parse(&Packet::new(&comment)).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<HeaderError>(),
            Some(HeaderError::HeaderOutOfOrder { .. })
        ));
    }

    #[test]
    fn rejects_unknown_header_type() {
        let mut parser = HeaderParser::default();
        let data = header_packet(0x07, &[]);
        let e = parser.parse(&Packet::new(&data)).unwrap_err();
        assert!(matches!(
            e.downcast_ref::<HeaderError>(),
            Some(HeaderError::InvalidHeaderType(0x07))
        ));
    }

    #[test]
    fn rejects_bad_identification_fields() -> Result<()> {
        use bitstream_io::{BitWrite, BitWriter, LittleEndian};

        // zero channels
        let mut w = BitWriter::endian(Vec::new(), LittleEndian);
        w.write_var(32, 0u32)?; // version
        w.write_var(8, 0u32)?; // channels: invalid
        w.write_var(32, 44100u32)?;
        w.write_var(32, 0u32)?;
        w.write_var(32, 0u32)?;
        w.write_var(32, 0u32)?;
        w.write_var(4, 8u32)?;
        w.write_var(4, 11u32)?;
        w.write_bit(true)?;
        w.byte_align()?;
        let data = header_packet(HEADER_IDENTIFICATION, &w.into_writer());

        let mut parser = HeaderParser::default();
        assert!(parser.parse(&bos_packet(&data)).is_err());
        assert!(parser.ident.is_none());
        Ok(())
    }
}
