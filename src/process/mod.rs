//! Processing pipeline for Vorbis streams.

/// Header packet parsing into the immutable stream setup.
///
/// Provides the [`HeaderParser`](headers::HeaderParser) consuming the
/// identification, comment and setup packets in order.
pub mod headers;

/// Audio packet decoding to PCM samples.
///
/// Provides the [`Synthesizer`](synthesis::Synthesizer) converting audio
/// packets into [`DecodedBlock`](synthesis::DecodedBlock) objects of
/// overlapped float PCM.
pub mod synthesis;

/// One packet as delivered by the transport layer.
///
/// The transport (an Ogg demuxer) owns framing, ordering and the payload
/// bytes; this crate only reads them. Packets must arrive in stream order.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    pub data: &'a [u8],
    /// Sample-accurate position marker from the transport, -1 when the
    /// transport does not know it.
    pub granule_pos: i64,
    pub begin_of_stream: bool,
    pub end_of_stream: bool,
}

impl<'a> Packet<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            granule_pos: -1,
            begin_of_stream: false,
            end_of_stream: false,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
