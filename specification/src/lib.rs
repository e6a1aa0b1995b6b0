//! This crate provides the element schema used by the ebml-tags crate.
//!
//! A schema maps an EBML element id to a name, a data kind and the document path the element lives under.  The
//! [`ebml_schema!`] macro builds such a table from a compact declaration; [`matroska::Matroska`] is the table for
//! the Matroska/WebM subset the tagging engine works with.
//!

#[macro_use]
mod schema;

///
/// Contains the Matroska/WebM element table.
///
pub mod matroska;

///
/// Different data kinds defined in the EBML specification.
///
/// The kind of an element is never read from the file - it is looked up in a schema by element id.  Ids that are
/// not in the schema are treated as [`ElementKind::Binary`] and preserved untouched.
///
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub enum ElementKind {
    Master,
    UnsignedInt,
    String,
    Utf8String,
    Binary,
    Float,
    Date,
}

impl ElementKind {
    pub fn is_master(self) -> bool {
        matches!(self, ElementKind::Master)
    }
}

///
/// A single schema entry.
///
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct ElementSpec {
    /// Element id including the vint length marker, e.g. `0x1A45DFA3`.
    pub id: u64,
    pub name: &'static str,
    pub kind: ElementKind,
    /// Ids of all ancestors, outermost first.  Empty for root and global elements.
    pub path: &'static [u64],
    /// Global elements (Void, CRC-32) may appear as a child of any master.
    pub global: bool,
}

impl ElementSpec {
    pub fn is_root(&self) -> bool {
        self.path.is_empty() && !self.global
    }
}

///
/// This trait provides lookups into an element table.  Typically implemented by the [`ebml_schema!`] macro.
///
/// The functions are associated (no `self`) so that engines can be generic over a specification type, in the same
/// way they would be generic over an encoding.
///
pub trait EbmlSpecification {
    ///
    /// Finds the schema entry for an element id.
    ///
    /// This function *must* return [`None`] if the id is not in the specification.
    ///
    fn get_element(id: u64) -> Option<&'static ElementSpec>;

    ///
    /// Finds the schema entry for an element name, e.g. `"SimpleTag"`.
    ///
    fn get_element_by_name(name: &str) -> Option<&'static ElementSpec>;

    fn get_kind(id: u64) -> Option<ElementKind> {
        Self::get_element(id).map(|element| element.kind)
    }

    fn get_name(id: u64) -> Option<&'static str> {
        Self::get_element(id).map(|element| element.name)
    }

    ///
    /// Gets the ancestor path of an element.  Returns an empty path for ids that are not in the specification.
    ///
    fn get_path(id: u64) -> &'static [u64] {
        Self::get_element(id).map(|element| element.path).unwrap_or(&[])
    }
}
