//! Comment header: vendor string and user tag list.
//!
//! Tags are `NAME=value` pairs with ASCII-case-insensitive names. Some
//! real-world encoders truncate this packet or drop the framing bit, so
//! irregularities here are tolerated at the default fail level.

use anyhow::{Result, anyhow};
use log::Level::Warn;
use log::debug;

use crate::log_or_err;
use crate::utils::bitstream_io::BsIoSliceReader;
use crate::utils::errors::HeaderError;

#[derive(Debug, Clone, Default)]
pub struct CommentHeader {
    pub vendor: String,
    pub comments: Vec<String>,
}

impl CommentHeader {
    pub fn read(reader: &mut BsIoSliceReader, fail_level: log::Level) -> Result<Self> {
        let vendor = read_lengthed_string(reader, "vendor string")?;

        let count = reader.get_n::<u32>(32)? as usize;
        // each entry carries at least its own length field
        let remaining = (reader.available()? / 8) as usize;
        if count * 4 > remaining {
            return Err(anyhow!(HeaderError::CommentOverrun {
                what: "comment list",
                len: count * 4,
                remaining,
            }));
        }

        let mut comments = Vec::with_capacity(count);
        for _ in 0..count {
            comments.push(read_lengthed_string(reader, "comment")?);
        }

        match reader.get() {
            Ok(true) => {}
            _ => log_or_err!(
                fail_level,
                Warn,
                anyhow!(HeaderError::MissingFramingBit("comment"))
            ),
        }

        debug!("comments: vendor {vendor:?}, {} tags", comments.len());

        Ok(Self { vendor, comments })
    }

    /// First value for `tag`, matched ASCII-case-insensitively.
    pub fn query(&self, tag: &str) -> Option<&str> {
        self.query_nth(tag, 0)
    }

    /// `count`-th value for `tag` in stream order.
    pub fn query_nth(&self, tag: &str, count: usize) -> Option<&str> {
        self.matches(tag).nth(count)
    }

    /// Number of instances of `tag`.
    pub fn query_count(&self, tag: &str) -> usize {
        self.matches(tag).count()
    }

    fn matches<'s>(&'s self, tag: &str) -> impl Iterator<Item = &'s str> {
        self.comments.iter().filter_map(move |c| {
            let (name, value) = c.split_once('=')?;
            name.eq_ignore_ascii_case(tag).then_some(value)
        })
    }
}

fn read_lengthed_string(reader: &mut BsIoSliceReader, what: &'static str) -> Result<String> {
    let len = reader.get_n::<u32>(32)? as usize;
    let remaining = (reader.available()? / 8) as usize;
    if len > remaining {
        return Err(anyhow!(HeaderError::CommentOverrun {
            what,
            len,
            remaining,
        }));
    }

    let mut buf = vec![0u8; len];
    reader.read_bytes(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use bitstream_io::{BitWrite, BitWriter, LittleEndian};

    fn comment_packet_body(vendor: &str, tags: &[&str], framing: bool) -> Vec<u8> {
        let mut w = BitWriter::endian(Vec::new(), LittleEndian);
        w.write_var(32, vendor.len() as u32).unwrap();
        w.write_bytes(vendor.as_bytes()).unwrap();
        w.write_var(32, tags.len() as u32).unwrap();
        for t in tags {
            w.write_var(32, t.len() as u32).unwrap();
            w.write_bytes(t.as_bytes()).unwrap();
        }
        w.write_bit(framing).unwrap();
        w.byte_align().unwrap();
        w.into_writer()
    }

    #[test]
    fn parse_and_query() -> Result<()> {
        let body = comment_packet_body(
            "test vendor",
            &["ARTIST=somebody", "artist=somebody else", "TITLE=a song"],
            true,
        );
        let mut r = BsIoSliceReader::from_slice(&body);
        let c = CommentHeader::read(&mut r, log::Level::Error)?;

        assert_eq!(c.vendor, "test vendor");
        assert_eq!(c.query("artist"), Some("somebody"));
        assert_eq!(c.query_nth("Artist", 1), Some("somebody else"));
        assert_eq!(c.query_count("ARTIST"), 2);
        assert_eq!(c.query("album"), None);
        Ok(())
    }

    #[test]
    fn missing_framing_bit_tolerated_but_strict_fails() -> Result<()> {
        let mut body = comment_packet_body("v", &[], false);
        // drop the framing byte entirely as sloppy encoders do
        body.pop();

        let mut r = BsIoSliceReader::from_slice(&body);
        assert!(CommentHeader::read(&mut r, log::Level::Error).is_ok());

        let mut r = BsIoSliceReader::from_slice(&body);
        assert!(CommentHeader::read(&mut r, log::Level::Warn).is_err());
        Ok(())
    }

    #[test]
    fn oversized_length_fails_closed() {
        let mut w = BitWriter::endian(Vec::new(), LittleEndian);
        w.write_var(32, u32::MAX).unwrap();
        w.byte_align().unwrap();
        let body = w.into_writer();

        let mut r = BsIoSliceReader::from_slice(&body);
        assert!(CommentHeader::read(&mut r, log::Level::Error).is_err());
    }
}
