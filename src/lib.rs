//! This crate reads and rewrites the file-level tags of [Matroska][mkv] and [WebM][webm] files.  Its primary goal is
//! to change tags without disturbing anything else in the file.
//!
//! [EBML][EBML] stands for Extensible Binary Meta-Language and is somewhat of a
//! binary version of XML. It's used for container formats like [WebM][webm] or
//! [MKV][mkv].
//!
//! # Overview
//! A document is parsed into an [`ElementTree`]: a flat arena of elements that records where each one came from in
//! the source.  Payloads are only read when they are small and part of the schema, so opening a multi-gigabyte video
//! reads a few kilobytes.  The file-level tag (`TargetTypeValue` 50 with no target entities) is merged with a
//! [`TagMap`], the `Segment` is rearranged so clusters keep their offsets, and the tree is written back.  Elements that
//! did not change are copied byte-for-byte from the source.
//!
//! ```no_run
//! use ebml_tags::{MatroskaFile, TaggedFile, TagValue};
//!
//! let mut file = MatroskaFile::open("song.mka")?;
//! file.set("artist", TagValue::string("Someone"));
//! file.save()?;
//! # Ok::<(), ebml_tags::error::EbmlError>(())
//! ```
//!
//! # Unknown sizes
//! Elements with an "Unknown Data Size" as defined in [RFC8794][rfc8794] are supported.  Such an element ends at the
//! first element that cannot be its descendant: its parent, a sibling, or a top level element.
//!
//! [EBML]: http://ebml.sourceforge.net/
//! [webm]: https://www.webmproject.org/
//! [mkv]: http://www.matroska.org/technical/specs/index.html
//! [rfc8794]: https://datatracker.ietf.org/doc/rfc8794/
//!

mod errors;
mod spec_util;
mod lookup;
mod tag_sync;
mod file;
pub mod tools;
pub mod element;
pub mod tree;
pub mod tree_parser;
pub mod tree_writer;
pub mod tags;
pub mod rearrange;
pub mod info;
pub mod config;

pub use ebml_tags_specification::{matroska::Matroska, EbmlSpecification, ElementKind};

pub use self::element::{Element, NodeId, Span, Value};
pub use self::file::{load, load_with, save, save_file, save_file_with, save_with, MatroskaFile, SaveSummary, TaggedFile};
pub use self::info::StreamInfo;
pub use self::lookup::{ChildrenWithId, Descendants};
pub use self::tag_sync::{append_simple_tag, ensure_file_tags, sync_tags, update_simple_tag, FileTagScope, SyncSummary};
pub use self::tags::{TagData, TagMap, TagValue};
pub use self::tree::{ElementTree, MatroskaTree};
pub use self::tree_parser::{parse_tree, ParseOptions, TreeParser};
pub use self::tree_writer::{to_bytes, TreeWriter};

pub mod error {
    pub use super::errors::config::ConfigError;
    pub use super::errors::tool::ToolError;
    pub use super::errors::EbmlError;
}
