#[macro_export]
macro_rules! log_or_err {
    ($fail_level:expr, $level:expr, $err:expr $(,)?) => {{
        if $level <= $fail_level {
            return Err($err);
        } else {
            match $level {
                ::log::Level::Error => ::log::error!("{}", $err),
                ::log::Level::Warn => ::log::warn!("{}", $err),
                ::log::Level::Info => ::log::info!("{}", $err),
                ::log::Level::Debug => ::log::debug!("{}", $err),
                ::log::Level::Trace => ::log::trace!("{}", $err),
            }
        }
    }};
}

#[derive(thiserror::Error, Debug)]
pub enum HeaderError {
    #[error("Header packet does not carry the vorbis magic")]
    NotVorbis,

    #[error("Unknown header packet type {0:#04X}")]
    InvalidHeaderType(u8),

    #[error("Identification header must arrive on a begin-of-stream packet")]
    IdentificationMidStream,

    #[error("Duplicate {0} header")]
    DuplicateHeader(&'static str),

    #[error("{got} header received while waiting for the {expected} header")]
    HeaderOutOfOrder {
        got: &'static str,
        expected: &'static str,
    },

    #[error("Unsupported stream version {0}")]
    UnsupportedVersion(u32),

    #[error("Channel count must be at least 1")]
    InvalidChannelCount,

    #[error("Sample rate must be at least 1 Hz. Read {0}")]
    InvalidSampleRate(u32),

    #[error("Block size {size} (index {index}) outside the supported 8..=8192 range")]
    InvalidBlockSize { index: usize, size: usize },

    #[error("Short block size {short} exceeds long block size {long}")]
    BlockSizeOrder { short: usize, long: usize },

    #[error("Missing framing bit at the end of the {0} header")]
    MissingFramingBit(&'static str),

    #[error("{what} length {len} exceeds the {remaining} bytes left in the packet")]
    CommentOverrun {
        what: &'static str,
        len: usize,
        remaining: usize,
    },

    #[error("Time table entry {index} has nonzero type {value}")]
    InvalidTimeType { index: usize, value: u32 },

    #[error("Mode {index} window type must be 0. Read {value}")]
    InvalidWindowType { index: usize, value: u32 },

    #[error("Mode {index} transform type must be 0. Read {value}")]
    InvalidTransformType { index: usize, value: u32 },

    #[error("Mode {index} references mapping {mapping}, only {mappings} defined")]
    ModeMappingOutOfRange {
        index: usize,
        mapping: usize,
        mappings: usize,
    },

    #[error("Stream setup is incomplete: missing the {0} header")]
    Incomplete(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum CodebookError {
    #[error("Codebook sync pattern mismatch. Read {0:#08X}, expected 0x564342")]
    InvalidSync(u32),

    #[error("Codebook dimension must be at least 1")]
    ZeroDimension,

    #[error("Codebook entry count must be at least 1")]
    ZeroEntries,

    #[error("Ordered length list run of {num} exceeds the {remaining} entries left")]
    LengthListOverflow { num: usize, remaining: usize },

    #[error("Codeword length exceeds 32 bits")]
    CodewordTooLong,

    #[error("Length list specifies an overpopulated Huffman tree")]
    OverpopulatedTree,

    #[error("Unknown codebook map type {0}")]
    InvalidMapType(u32),

    #[error("Quantized value list needs {needed} bits, packet has {available}")]
    TruncatedQuantList { needed: u64, available: u64 },
}

#[derive(thiserror::Error, Debug)]
pub enum FloorError {
    #[error("Unknown floor type {0}")]
    InvalidType(u32),

    #[error("Floor references book {book}, only {books} defined")]
    BookOutOfRange { book: usize, books: usize },

    #[error("Floor book {0} carries no value mapping")]
    NotValueMapped(usize),

    #[error("LSP filter order must be at least 1")]
    ZeroOrder,

    #[error("LSP mapping rate must be at least 1")]
    ZeroRate,

    #[error("Bark map size must be at least 1")]
    ZeroBarkMap,

    #[error("Amplitude bit width {0} exceeds 32")]
    AmpBitsTooWide(u32),

    #[error("Post list holds {0} entries, at most 65 allowed")]
    TooManyPosts(usize),

    #[error("Duplicate post position {0} would create a zero-length segment")]
    DuplicatePostPosition(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum ResidueError {
    #[error("Unknown residue type {0}")]
    InvalidType(u32),

    #[error("Residue references book {book}, only {books} defined")]
    BookOutOfRange { book: usize, books: usize },

    #[error("Residue begin {begin} lies past end {end}")]
    BeginPastEnd { begin: usize, end: usize },

    #[error("Phrase book {0} must have dimension of at least 1")]
    InvalidPhraseBookDim(usize),

    #[error("Partition count {partitions} to the phrase book dimension exceeds its {entries} entries")]
    InconsistentPartitioning { partitions: usize, entries: usize },

    #[error("Stage book {0} carries no value mapping")]
    StageBookNotValueMapped(usize),
}

#[derive(thiserror::Error, Debug)]
pub enum MappingError {
    #[error("Unknown mapping type {0}")]
    InvalidType(u32),

    #[error("Reserved mapping bits must be zero. Read {0:#X}")]
    ReservedBitsSet(u32),

    #[error("Coupling pair ({magnitude}, {angle}) invalid for {channels} channels")]
    InvalidCoupling {
        magnitude: usize,
        angle: usize,
        channels: usize,
    },

    #[error("Channel multiplex references submap {submap}, only {submaps} defined")]
    SubmapOutOfRange { submap: usize, submaps: usize },

    #[error("Submap references time {index}, only {times} defined")]
    TimeOutOfRange { index: usize, times: usize },

    #[error("Submap references floor {index}, only {floors} defined")]
    FloorOutOfRange { index: usize, floors: usize },

    #[error("Submap references residue {index}, only {residues} defined")]
    ResidueOutOfRange { index: usize, residues: usize },
}

#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("Packet type bit set; not an audio packet")]
    NotAudioPacket,

    #[error("Audio packet selects mode {mode}, only {modes} defined")]
    InvalidMode { mode: usize, modes: usize },
}
