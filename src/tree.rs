use std::convert::TryFrom;
use std::io::{Read, Seek, SeekFrom};
use std::marker::PhantomData;

use ebml_tags_specification::matroska::Matroska;
use ebml_tags_specification::{EbmlSpecification, ElementKind};

use crate::element::{Element, NodeId, Span, Value};
use crate::errors::EbmlError;

///
/// An EBML document held as a flat arena of [`Element`]s.
///
/// Children refer to each other by [`NodeId`]; the parent link is a plain index used for navigation only.  The tree
/// owns every element, nothing is shared between trees.
///
/// `TSpec` is the element table used to resolve names and kinds.  It defaults to [`Matroska`].
///
#[derive(Clone, Debug)]
pub struct ElementTree<TSpec = Matroska> {
    pub(crate) nodes: Vec<Element>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) trailing: Option<Span>,
    _spec: PhantomData<TSpec>,
}

pub type MatroskaTree = ElementTree<Matroska>;

impl<TSpec: EbmlSpecification> Default for ElementTree<TSpec> {
    fn default() -> Self {
        ElementTree::new()
    }
}

impl<TSpec: EbmlSpecification> ElementTree<TSpec> {
    pub fn new() -> Self {
        ElementTree {
            nodes: Vec::new(),
            roots: Vec::new(),
            trailing: None,
            _spec: PhantomData,
        }
    }

    pub(crate) fn from_parts(nodes: Vec<Element>, roots: Vec<NodeId>, trailing: Option<Span>) -> Self {
        ElementTree {
            nodes,
            roots,
            trailing,
            _spec: PhantomData,
        }
    }

    ///
    /// Top level elements in document order.
    ///
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    ///
    /// Bytes after the last parseable element, kept as they were.
    ///
    pub fn trailing(&self) -> Option<Span> {
        self.trailing
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    ///
    /// Returns the element behind `node`.
    ///
    /// # Panics
    ///
    /// Panics if `node` was issued by a different tree.
    ///
    pub fn element(&self, node: NodeId) -> &Element {
        &self.nodes[node.0]
    }

    pub(crate) fn element_mut(&mut self, node: NodeId) -> &mut Element {
        &mut self.nodes[node.0]
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].children
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node.0].parent
    }

    pub fn id(&self, node: NodeId) -> u64 {
        self.nodes[node.0].id
    }

    ///
    /// Schema name of the element, or `None` for ids the schema does not know.
    ///
    pub fn name(&self, node: NodeId) -> Option<&'static str> {
        TSpec::get_name(self.nodes[node.0].id)
    }

    fn siblings(&self, node: NodeId) -> &[NodeId] {
        match self.parent(node) {
            Some(parent) => self.children(parent),
            None => &self.roots,
        }
    }

    ///
    /// Position of `node` among its parent's children (or among the roots).
    ///
    pub fn index_of_child(&self, node: NodeId) -> Option<usize> {
        self.siblings(node).iter().position(|sibling| *sibling == node)
    }

    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let index = self.index_of_child(node)?;
        self.siblings(node).get(index + 1).copied()
    }

    pub fn previous_sibling(&self, node: NodeId) -> Option<NodeId> {
        let index = self.index_of_child(node)?;
        index.checked_sub(1).and_then(|index| self.siblings(node).get(index).copied())
    }

    ///
    /// Returns whether anything in the subtree rooted at `node` differs from the source.
    ///
    pub fn is_modified(&self, node: NodeId) -> bool {
        let element = self.element(node);
        element.dirty || element.origin.is_none() || element.children.iter().any(|child| self.is_modified(*child))
    }

    ///
    /// Reads the payloads of schema-known leaves under `node` that were left on disk while parsing, so their values
    /// can be decoded.  Returns how many payloads were read.
    ///
    /// `source` must be the source the tree was parsed from.  Elements with unknown ids stay on disk.
    ///
    pub fn load_payloads<S: Read + Seek>(&mut self, node: NodeId, source: &mut S) -> Result<usize, EbmlError> {
        let pending: Vec<NodeId> = self.descendants(node).filter(|leaf| self.needs_payload(*leaf)).collect();
        for leaf in &pending {
            let element = &self.nodes[leaf.0];
            let span = match element.raw_span {
                Some(span) => span,
                None => continue,
            };
            let len = usize::try_from(span.len).map_err(|_| EbmlError::PayloadNotLoaded { id: element.id, size: span.len })?;

            let mut data = vec![0; len];
            source.seek(SeekFrom::Start(span.offset))?;
            source.read_exact(&mut data)?;
            self.nodes[leaf.0].raw = Some(data);
        }
        Ok(pending.len())
    }

    fn needs_payload(&self, node: NodeId) -> bool {
        let element = &self.nodes[node.0];
        !element.is_master() && !element.is_loaded() && element.raw_span.is_some() && TSpec::get_kind(element.id).is_some()
    }

    fn push(&mut self, element: Element) -> NodeId {
        self.nodes.push(element);
        NodeId(self.nodes.len() - 1)
    }

    ///
    /// Creates a detached, empty master element.
    ///
    pub fn create_master(&mut self, id: u64) -> Result<NodeId, EbmlError> {
        match TSpec::get_kind(id) {
            Some(ElementKind::Master) | None => Ok(self.push(Element::new_master(id))),
            Some(actual) => Err(EbmlError::KindMismatch { id, requested: ElementKind::Master, actual }),
        }
    }

    ///
    /// Creates a detached leaf element.  The value must have the kind the schema declares for `id`.
    ///
    pub fn create_element(&mut self, id: u64, value: Value) -> Result<NodeId, EbmlError> {
        if let Some(expected) = TSpec::get_kind(id) {
            if expected != value.kind() {
                return Err(EbmlError::KindMismatch { id, requested: value.kind(), actual: expected });
            }
        }
        Ok(self.push(Element::new_leaf(id, value)))
    }

    ///
    /// Creates a detached text element, picking `String` or `UTF-8` from the schema.
    ///
    pub fn create_string(&mut self, id: u64, text: &str) -> Result<NodeId, EbmlError> {
        let value = match TSpec::get_kind(id) {
            Some(ElementKind::String) => Value::String(text.to_owned()),
            _ => Value::Utf8String(text.to_owned()),
        };
        self.create_element(id, value)
    }

    pub fn create_unsigned(&mut self, id: u64, val: u64) -> Result<NodeId, EbmlError> {
        self.create_element(id, Value::UnsignedInt(val))
    }

    pub fn create_binary(&mut self, id: u64, data: &[u8]) -> Result<NodeId, EbmlError> {
        self.create_element(id, Value::Binary(data.to_vec()))
    }

    pub fn add_root(&mut self, node: NodeId) {
        self.detach(node);
        self.roots.push(node);
    }

    fn check_parent(&self, parent: NodeId) -> Result<(), EbmlError> {
        let element = self.element(parent);
        if !element.is_master() {
            return Err(EbmlError::KindMismatch { id: element.id, requested: ElementKind::Master, actual: element.kind });
        }
        if element.opaque {
            return Err(EbmlError::UnencodableValue {
                id: element.id,
                reason: String::from("children of this element were not parsed"),
            });
        }
        Ok(())
    }

    fn detach(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            let element = self.element_mut(parent);
            element.children.retain(|child| *child != node);
            element.dirty = true;
        } else {
            self.roots.retain(|root| *root != node);
        }
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), EbmlError> {
        let index = self.children(parent).len();
        self.insert_child(parent, index, child)
    }

    ///
    /// Moves `child` under `parent` at `index`.  A child that is already linked elsewhere is unlinked first.
    ///
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> Result<(), EbmlError> {
        self.check_parent(parent)?;
        self.detach(child);

        let element = self.element_mut(parent);
        let index = index.min(element.children.len());
        element.children.insert(index, child);
        element.dirty = true;
        self.nodes[child.0].parent = Some(parent);
        Ok(())
    }

    ///
    /// Unlinks `child` from its parent.  The element stays in the arena and can be linked again.
    ///
    pub fn remove_child(&mut self, child: NodeId) {
        self.detach(child);
    }

    ///
    /// Puts `new_child` in the position held by `old_child`, which is unlinked.
    ///
    pub fn replace_child(&mut self, old_child: NodeId, new_child: NodeId) -> Result<(), EbmlError> {
        match self.parent(old_child) {
            Some(parent) => {
                let index = self.index_of_child(old_child).unwrap_or(0);
                self.detach(old_child);
                self.insert_child(parent, index, new_child)
            },
            None => {
                let index = self.index_of_child(old_child).unwrap_or(self.roots.len());
                self.detach(old_child);
                self.detach(new_child);
                self.roots.insert(index.min(self.roots.len()), new_child);
                Ok(())
            },
        }
    }

    pub fn set_value(&mut self, node: NodeId, value: Value) -> Result<bool, EbmlError> {
        self.element_mut(node).set_value(value)
    }

    ///
    /// Sets the text of a `String` or `UTF-8` element, keeping the element's kind.
    ///
    pub fn set_string(&mut self, node: NodeId, text: &str) -> Result<bool, EbmlError> {
        let value = match self.element(node).kind {
            ElementKind::String => Value::String(text.to_owned()),
            _ => Value::Utf8String(text.to_owned()),
        };
        self.set_value(node, value)
    }

    pub fn set_binary(&mut self, node: NodeId, data: &[u8]) -> Result<bool, EbmlError> {
        self.set_value(node, Value::Binary(data.to_vec()))
    }

    pub fn set_unsigned(&mut self, node: NodeId, val: u64) -> Result<bool, EbmlError> {
        self.set_value(node, Value::UnsignedInt(val))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::tree_parser::{ParseOptions, TreeParser};

    fn small_tree() -> (MatroskaTree, NodeId, NodeId) {
        let mut tree = MatroskaTree::new();
        let tag = tree.create_master(Matroska::Tag.id()).unwrap();
        tree.add_root(tag);
        let simple = tree.create_master(Matroska::SimpleTag.id()).unwrap();
        tree.append_child(tag, simple).unwrap();
        (tree, tag, simple)
    }

    #[test]
    fn append_links_both_directions() {
        let (tree, tag, simple) = small_tree();
        assert_eq!(&[simple], tree.children(tag));
        assert_eq!(Some(tag), tree.parent(simple));
        assert_eq!(Some("SimpleTag"), tree.name(simple));
    }

    #[test]
    fn insert_and_navigate_siblings() {
        let (mut tree, tag, simple) = small_tree();
        let targets = tree.create_master(Matroska::Targets.id()).unwrap();
        tree.insert_child(tag, 0, targets).unwrap();

        assert_eq!(&[targets, simple], tree.children(tag));
        assert_eq!(Some(simple), tree.next_sibling(targets));
        assert_eq!(Some(targets), tree.previous_sibling(simple));
        assert_eq!(None, tree.next_sibling(simple));
    }

    #[test]
    fn replace_keeps_position() {
        let (mut tree, _, simple) = small_tree();
        let name = tree.create_string(Matroska::TagName.id(), "ALBUM").unwrap();
        let value = tree.create_string(Matroska::TagString.id(), "Foo").unwrap();
        tree.append_child(simple, name).unwrap();
        tree.append_child(simple, value).unwrap();

        let binary = tree.create_binary(Matroska::TagBinary.id(), &[1, 2]).unwrap();
        tree.replace_child(value, binary).unwrap();

        assert_eq!(&[name, binary], tree.children(simple));
        assert_eq!(None, tree.parent(value));
    }

    #[test]
    fn moving_a_child_unlinks_it_first() {
        let (mut tree, tag, simple) = small_tree();
        let other = tree.create_master(Matroska::Tag.id()).unwrap();
        tree.add_root(other);
        tree.append_child(other, simple).unwrap();

        assert!(tree.children(tag).is_empty());
        assert_eq!(&[simple], tree.children(other));
    }

    #[test]
    fn create_checks_schema_kind() {
        let mut tree = MatroskaTree::new();
        assert!(tree.create_master(Matroska::TagName.id()).is_err());
        assert!(tree.create_unsigned(Matroska::TagName.id(), 1).is_err());
        let language = tree.create_string(Matroska::TagLanguage.id(), "eng").unwrap();
        assert_eq!(ElementKind::String, tree.element(language).kind());
    }

    #[test]
    fn leaves_cannot_have_children() {
        let mut tree = MatroskaTree::new();
        let name = tree.create_string(Matroska::TagName.id(), "ALBUM").unwrap();
        let other = tree.create_string(Matroska::TagName.id(), "ARTIST").unwrap();
        assert!(tree.append_child(name, other).is_err());
    }

    #[test]
    fn payloads_left_on_disk_are_read_back() {
        let bytes = vec![
            0x1A, 0x45, 0xDF, 0xA3, 0x80,
            0x18, 0x53, 0x80, 0x67, 0x93,
            0x12, 0x54, 0xC3, 0x67, 0x8E,
            0x73, 0x73, 0x8B,
            0x67, 0xC8, 0x88,
            0x45, 0xA3, 0x85, b'A', b'L', b'B', b'U', b'M',
        ];
        let options = ParseOptions::default().with_inline_payload_limit(0);
        let mut tree: MatroskaTree = TreeParser::with_options(Cursor::new(&bytes), options).parse().unwrap();
        let segment = tree.root_named("Segment").unwrap();
        let name = tree.first_named(segment, "TagName").unwrap();
        assert!(matches!(tree.element(name).string_value(), Err(EbmlError::PayloadNotLoaded { size: 5, .. })));

        assert_eq!(1, tree.load_payloads(segment, &mut Cursor::new(&bytes)).unwrap());
        assert_eq!("ALBUM", tree.element(name).string_value().unwrap());
        assert!(!tree.is_modified(segment));
        assert_eq!(0, tree.load_payloads(segment, &mut Cursor::new(&bytes)).unwrap());
    }
}
