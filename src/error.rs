use std::borrow::Cow;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type used across the ZDW codec.
pub type Result<T> = std::result::Result<T, Error>;

/// High-level error type surfaced by the ZDW reader and writer.
///
/// Every variant maps to a stable numeric code via [`Error::code`]; the CLI
/// tools use those codes as process exit statuses.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failure while reading from or writing to the underlying stream.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// A bad command-line or API parameter.
    #[error("bad parameter: {details}")]
    BadParameter { details: Cow<'static, str> },

    /// A flag that requires an argument was given without one.
    #[error("missing argument after parameter '{parameter}'")]
    MissingArgument { parameter: Cow<'static, str> },

    /// More than one input file supplied in a single-input mode.
    #[error("too many input files")]
    TooManyInputFiles,

    /// No input files supplied.
    #[error("no input files")]
    NoInputFiles,

    /// Output file could not be created.
    #[error("could not create {path}")]
    FileCreate { path: PathBuf },

    /// Input file could not be opened.
    #[error("could not open {path}")]
    FileOpen { path: PathBuf },

    /// Temporary spill file could not be created.
    #[error("could not open temporary file: {details}")]
    CannotOpenTempFile { details: Cow<'static, str> },

    /// The file declares a version this codec does not read.
    #[error("unsupported ZDW version {version}")]
    UnsupportedVersion { version: u16 },

    /// `read_header` was called twice on the same reader.
    #[error("header already read")]
    HeaderAlreadyRead,

    /// A row or schema accessor was used before `read_header`.
    #[error("header not read yet")]
    HeaderNotReadYet,

    /// Bytes remain after the block flagged as final.
    #[error("file is longer than its final block indicates")]
    TruncatedOrLonger,

    /// The file appears corrupt or inconsistent while processing a section.
    #[error("corrupted data while processing {section}: {details}")]
    CorruptedData {
        section: Section,
        details: Cow<'static, str>,
    },

    /// A block ended before yielding its declared number of rows.
    #[error("row count mismatch: unpacked {actual} of expected {expected}")]
    RowCountMismatch { expected: u32, actual: u32 },

    /// An input row's field count disagrees with the schema.
    #[error("row {row} has {actual} columns, schema declares {expected}")]
    WrongColumnCountOnRow {
        row: u64,
        expected: usize,
        actual: usize,
    },

    /// A projected column name does not exist (or was requested twice).
    #[error("bad requested column: {details}")]
    BadRequestedColumn { details: Cow<'static, str> },

    /// Projection resolved to an empty output set.
    #[error("no columns to output")]
    NoColumnsToOutput,

    /// A column type in the schema cannot be rendered as a description line.
    #[error("unexpected column type in description: {details}")]
    UnexpectedDescType { details: Cow<'static, str> },

    /// A description side-car line is missing its tab-separated type.
    #[error("description file is missing type info")]
    DescFileMissingTypeInfo,

    /// The writer could not stay within its memory budget.
    #[error("out of memory")]
    OutOfMemory,

    /// A metadata key or value contains a forbidden character.
    #[error("bad metadata parameter: {details}")]
    BadMetadataParam { details: Cow<'static, str> },

    /// A metadata file line could not be parsed.
    #[error("bad metadata file {path} (line {line})")]
    BadMetadataFile { path: PathBuf, line: usize },

    /// Validation found the decoded output differs from the source rows.
    #[error("validation failed: {details}")]
    FilesDiffer { details: Cow<'static, str> },

    /// Failure to convert bytes between character encodings.
    #[error("encoding conversion to {encoding} failed: {details}")]
    Encoding {
        encoding: Cow<'static, str>,
        details: Cow<'static, str>,
    },

    /// Internal processing failure that does not fit another class.
    #[error("processing error: {details}")]
    Processing { details: Cow<'static, str> },

    /// The requested operation is not available in the current mode or state.
    #[error("unsupported operation: {details}")]
    UnsupportedOperation { details: Cow<'static, str> },
}

impl Error {
    /// Stable numeric code for this error class, used as a CLI exit status.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::BadParameter { .. } => 1,
            Self::Io(_) => 2,
            Self::FileCreate { .. } => 3,
            Self::FileOpen { .. } => 4,
            Self::UnsupportedVersion { .. } => 5,
            Self::TruncatedOrLonger => 6,
            Self::UnexpectedDescType { .. } => 7,
            Self::RowCountMismatch { .. } => 8,
            Self::CorruptedData { .. } => 9,
            Self::HeaderNotReadYet => 10,
            Self::HeaderAlreadyRead => 11,
            Self::BadRequestedColumn { .. } => 13,
            Self::NoColumnsToOutput => 14,
            Self::Processing { .. } | Self::Encoding { .. } => 15,
            Self::UnsupportedOperation { .. } => 16,
            Self::MissingArgument { .. } => 17,
            Self::TooManyInputFiles => 18,
            Self::NoInputFiles => 19,
            Self::CannotOpenTempFile { .. } => 20,
            Self::WrongColumnCountOnRow { .. } => 21,
            Self::DescFileMissingTypeInfo => 22,
            Self::OutOfMemory => 23,
            Self::BadMetadataParam { .. } => 24,
            Self::BadMetadataFile { .. } => 25,
            Self::FilesDiffer { .. } => 26,
        }
    }
}

/// Logical section of a ZDW file used for diagnostic reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    Metadata,
    BlockHeader { block: u32 },
    Dictionary { block: u32 },
    Row { block: u32, row: u32 },
    Column { index: usize },
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => write!(f, "file header"),
            Self::Metadata => write!(f, "metadata block"),
            Self::BlockHeader { block } => write!(f, "header of block {block}"),
            Self::Dictionary { block } => write!(f, "dictionary of block {block}"),
            Self::Row { block, row } => write!(f, "row {row} of block {block}"),
            Self::Column { index } => write!(f, "column {index}"),
        }
    }
}
