use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way reading or rewriting a Mach-O can go wrong.
///
/// Parsers fail fast on structural problems; per-entry resolution failures
/// (a bind entry with a bogus ordinal, a symbol with a bad string offset)
/// are logged and skipped instead so partial output stays useful.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not a recognized Mach-O or fat magic: {0:#010x}")]
    BadMagic(u32),
    #[error("declared offset or count exceeds input length: {0}")]
    Truncated(String),
    #[error("malformed load commands: {0}")]
    MalformedLoadCommands(String),
    #[error("unknown opcode {opcode:#04x} at offset {offset} in {stream} stream")]
    UnknownOpcode {
        stream: &'static str,
        opcode: u8,
        offset: usize,
    },
    #[error("virtual address {0:#x} is not mapped by any segment")]
    UnmappedAddress(u64),
    #[error("virtual address {0:#x} falls in a zero-fill region")]
    ZeroFill(u64),
    #[error("export trie node at offset {0:#x} re-enters an already visited node")]
    ExportTrieCycle(usize),
    #[error(
        "load command region would grow to {needed} bytes but only {available} fit before file content"
    )]
    NoHeaderPadding { needed: u64, available: u64 },
    #[error("unsupported edit: {0}")]
    UnsupportedEdit(String),
    #[error("big-endian slices are not supported by this operation")]
    UnsupportedEndianness,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        // scroll only fails on out-of-range reads and writes for the plain
        // integer/array types used here, which all map onto truncation
        Error::Truncated(err.to_string())
    }
}
