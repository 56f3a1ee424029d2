//! Bitstream I/O utilities for packet parsing.
//!
//! Vorbis packs fields LSB-first: the first bit read is the lowest bit of
//! the first byte, and multi-bit values fill from the least significant bit
//! up. Reads never cross packet boundaries; running out of payload is the
//! end-of-packet condition every decode stage checks for.

use std::io;
use std::io::SeekFrom;

use bitstream_io::{BitRead, BitReader, LittleEndian, UnsignedInteger};

/// Number of bits needed to represent `v` (`ilog(0) == 0`, `ilog(7) == 3`).
#[inline(always)]
pub fn ilog(v: u32) -> u32 {
    32 - v.leading_zeros()
}

/// Floor of log2 (`ilog2(1) == 0`, `ilog2(7) == 2`). `v` must be nonzero.
#[inline(always)]
pub fn ilog2(v: u32) -> u32 {
    31 - v.leading_zeros()
}

/// Population count, used for cascade bitmask bookkeeping.
#[inline(always)]
pub fn icount(v: u32) -> u32 {
    v.count_ones()
}

/// True when an error is bit starvation (the packet ran out mid-read).
#[inline(always)]
pub fn starved(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::UnexpectedEof
}

#[derive(Debug)]
pub struct BitstreamIoReader<R: io::Read + io::Seek> {
    bs: BitReader<R, LittleEndian>,
    len: u64,
}

pub type BsIoSliceReader<'a> = BitstreamIoReader<io::Cursor<&'a [u8]>>;

impl<R> BitstreamIoReader<R>
where
    R: io::Read + io::Seek,
{
    pub fn new(read: R, len_bytes: u64) -> Self {
        Self {
            bs: BitReader::new(read),
            len: len_bytes << 3,
        }
    }

    #[inline(always)]
    pub fn get(&mut self) -> io::Result<bool> {
        self.bs.read_bit()
    }

    #[inline(always)]
    pub fn get_n<I: UnsignedInteger>(&mut self, n: u32) -> io::Result<I> {
        match self.bs.read_unsigned_var(n) {
            Ok(val) => Ok(val),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                // Only call position() on the error path to avoid overhead
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!(
                        "get_n({}): out of bounds bits at {}",
                        n,
                        self.bs.position_in_bits().unwrap_or(0)
                    ),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// `get_n` for field widths that may legitimately be zero bits wide
    /// (a count of one needs no index bits); a zero-width read yields zero
    /// without touching the cursor.
    #[inline(always)]
    pub fn get_n0(&mut self, n: u32) -> io::Result<u32> {
        if n == 0 {
            return Ok(0);
        }
        self.get_n(n)
    }

    /// Peek at the next `n` bits without advancing.
    ///
    /// Returns `None` when fewer than `n` bits remain; the cursor never
    /// moves either way. Table-driven codeword decode peeks a fixed window
    /// and advances only by the consumed length afterwards.
    #[inline(always)]
    pub fn look_n(&mut self, n: u32) -> io::Result<Option<u32>> {
        if self.available()? < n as u64 {
            return Ok(None);
        }

        let position = self.bs.position_in_bits()?;
        let val = self.bs.read_unsigned_var(n)?;
        self.bs.seek_bits(SeekFrom::Start(position))?;

        Ok(Some(val))
    }

    #[inline(always)]
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if (buf.len() as u64) << 3 > self.available()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "read_bytes: out of bounds bits",
            ));
        }
        self.bs.read_bytes(buf)
    }

    #[inline(always)]
    pub fn skip_n(&mut self, n: u32) -> io::Result<()> {
        if n as u64 > self.available()? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "skip_n: out of bounds bits",
            ));
        }
        self.bs.skip(n)
    }

    #[inline(always)]
    pub fn available(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits().map(|pos| self.len - pos)
    }

    #[inline(always)]
    pub fn position(&mut self) -> io::Result<u64> {
        self.bs.position_in_bits()
    }
}

impl<'a> BsIoSliceReader<'a> {
    pub fn from_slice(buf: &'a [u8]) -> Self {
        let len = buf.len() as u64;
        let read = io::Cursor::new(buf);

        Self::new(read, len)
    }
}

impl Default for BsIoSliceReader<'_> {
    fn default() -> Self {
        Self::from_slice(&[])
    }
}
