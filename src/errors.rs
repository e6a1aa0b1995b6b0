use std::io;

use ebml_tags_specification::ElementKind;
use thiserror::Error;

pub mod tool {
    use thiserror::Error;

    #[derive(Debug, Error, Clone, PartialEq, Eq)]
    pub enum ToolError {
        #[error("Vint has no length marker in its first byte.")]
        ReadVintOverflow,

        #[error("Vint needs {needed} bytes but only {available} are available.")]
        ReadVintTruncated { needed: usize, available: usize },

        #[error("Element ids are at most 4 bytes long, found a {0} byte id.")]
        ReadIdOverflow(usize),

        #[error("Value too large to be written as a {length} byte vint: {value}")]
        WriteVintOverflow { value: u64, length: usize },

        #[error("Could not read unsigned int from array: {0:?}")]
        ReadU64Overflow(Vec<u8>),

        #[error("Could not read float from array: {0:?}")]
        ReadF64Mismatch(Vec<u8>),
    }
}

pub mod config {
    use std::io;
    use std::path::PathBuf;

    use thiserror::Error;

    #[derive(Debug, Error)]
    pub enum ConfigError {
        #[error("Could not read configuration file {path:?}")]
        Read {
            path: PathBuf,
            #[source]
            source: io::Error,
        },

        #[error("Invalid configuration: {0}")]
        Parse(#[from] toml::de::Error),
    }
}

use self::tool::ToolError;

///
/// Errors raised while parsing, querying, mutating or serializing an element tree.
///
/// Parse errors abort the whole load; no partial tree is ever returned.  I/O failures are passed through unchanged.
///
#[derive(Debug, Error)]
pub enum EbmlError {
    #[error("Malformed vint at byte {position}: {source}")]
    MalformedVarint {
        position: u64,
        #[source]
        source: ToolError,
    },

    #[error("Element {id:#x} at byte {position} declares {declared} bytes but only {available} remain in its scope.")]
    TruncatedElement {
        id: u64,
        position: u64,
        declared: u64,
        available: u64,
    },

    #[error("Source does not start with the EBML magic, found {0:02x?}")]
    UnrecognizedMagic(Vec<u8>),

    #[error("Cannot encode element {id:#x}: {reason}")]
    UnencodableValue { id: u64, reason: String },

    #[error("Element {id:#x} holds {actual:?} data, not {requested:?}.")]
    KindMismatch {
        id: u64,
        requested: ElementKind,
        actual: ElementKind,
    },

    #[error("Element {id:#x} does not contain valid {kind:?} data: {reason}")]
    InvalidPayload {
        id: u64,
        kind: ElementKind,
        reason: String,
    },

    #[error("Payload of element {id:#x} ({size} bytes) was left on disk and cannot be decoded.")]
    PayloadNotLoaded { id: u64, size: u64 },

    #[error("Document has no {0} element.")]
    MissingElement(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}
