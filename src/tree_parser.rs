use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};
use std::marker::PhantomData;

use ebml_tags_specification::matroska::Matroska;
use ebml_tags_specification::{EbmlSpecification, ElementKind};
use tracing::{debug, trace, warn};

use crate::element::{Element, NodeId, Span};
use crate::errors::EbmlError;
use crate::spec_util;
use crate::tools::{self, EbmlSize};
use crate::tree::ElementTree;

///
/// Every EBML document starts with the id of the EBML header element.
///
pub const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

///
/// Leaf payloads larger than this are left on disk unless configured otherwise.
///
pub const DEFAULT_INLINE_PAYLOAD_LIMIT: u64 = 16 * 1024 * 1024;

const DEFAULT_BUFFER_LEN: usize = 1024 * 64;

// Longest possible header: a 4 byte id followed by an 8 byte size.
const MAX_HEADER_LEN: usize = 12;

///
/// Controls how much of a document is materialized while parsing.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    ///
    /// Known-size masters that are recorded as a single opaque span instead of being descended into.
    ///
    pub opaque_ids: HashSet<u64>,

    ///
    /// Schema-known leaf payloads up to this many bytes are read into memory.  Larger payloads keep only their span.
    ///
    pub inline_payload_limit: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            opaque_ids: HashSet::new(),
            inline_payload_limit: DEFAULT_INLINE_PAYLOAD_LIMIT,
        }
    }
}

impl ParseOptions {
    ///
    /// Options for tag work: media, cues, chapters and attachments stay on disk.
    ///
    pub fn for_tags() -> Self {
        ParseOptions {
            opaque_ids: Matroska::BULK_ELEMENTS.iter().map(|element| element.id()).collect(),
            ..ParseOptions::default()
        }
    }

    pub fn with_inline_payload_limit(mut self, limit: u64) -> Self {
        self.inline_payload_limit = limit;
        self
    }
}

struct OpenMaster {
    node: NodeId,
    end: Option<u64>,
    opaque: bool,
}

struct Header {
    id: u64,
    size: EbmlSize,
    size_len: usize,
    position: u64,
    payload_start: u64,
}

///
/// Builds an [`ElementTree`] from a source implementing [`std::io::Read`] and [`std::io::Seek`].
///
/// Parsing starts at the current position of the source, which must hold the EBML magic.  Element spans are recorded
/// as absolute positions in the source so that untouched regions can later be copied back from it.  Payloads that
/// are not needed (opaque masters, unknown ids, large leaves) are skipped by seeking, so only a small part of a
/// media file is ever read.
///
/// ## Example
///
/// ```
/// use std::io::Cursor;
/// use ebml_tags::TreeParser;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// // EBML header with an empty payload, then an empty Segment.
/// let bytes = vec![0x1A, 0x45, 0xDF, 0xA3, 0x80, 0x18, 0x53, 0x80, 0x67, 0x80];
/// let tree = TreeParser::new(Cursor::new(bytes)).parse()?;
/// assert_eq!(2, tree.roots().len());
/// assert!(tree.root_named("Segment").is_some());
/// # Ok(())
/// # }
/// ```
///
pub struct TreeParser<R: Read + Seek, TSpec = Matroska> {
    source: R,
    options: ParseOptions,

    buffer: Box<[u8]>,
    buffer_offset: u64,
    buffered_byte_length: usize,
    internal_buffer_position: usize,
    reached_eof: bool,

    nodes: Vec<Element>,
    roots: Vec<NodeId>,
    stack: Vec<OpenMaster>,
    _spec: PhantomData<TSpec>,
}

impl<R: Read + Seek> TreeParser<R, Matroska> {
    ///
    /// Returns a parser using the Matroska table and default [`ParseOptions`].
    ///
    pub fn new(source: R) -> Self {
        TreeParser::with_options(source, ParseOptions::default())
    }
}

impl<R: Read + Seek, TSpec: EbmlSpecification> TreeParser<R, TSpec> {
    pub fn with_options(source: R, options: ParseOptions) -> Self {
        TreeParser {
            source,
            options,
            buffer: vec![0; DEFAULT_BUFFER_LEN].into_boxed_slice(),
            buffer_offset: 0,
            buffered_byte_length: 0,
            internal_buffer_position: 0,
            reached_eof: false,
            nodes: Vec::new(),
            roots: Vec::new(),
            stack: Vec::new(),
            _spec: PhantomData,
        }
    }

    fn current_offset(&self) -> u64 {
        self.buffer_offset + self.internal_buffer_position as u64
    }

    fn available(&self) -> &[u8] {
        &self.buffer[self.internal_buffer_position..self.buffered_byte_length]
    }

    fn private_read(&mut self) -> Result<(), EbmlError> {
        let bytes_read = self.source.read(&mut self.buffer[self.buffered_byte_length..])?;
        if bytes_read == 0 {
            self.reached_eof = true;
        }
        self.buffered_byte_length += bytes_read;
        Ok(())
    }

    fn ensure_capacity(&mut self, required_capacity: usize) {
        if required_capacity > self.buffer.len() {
            let mut new_buffer = Vec::from(&self.buffer[..]);
            new_buffer.resize(required_capacity, 0);
            self.buffer = new_buffer.into_boxed_slice();
        }
    }

    fn ensure_data_read(&mut self, length: usize) -> Result<(), EbmlError> {
        if self.internal_buffer_position + length > self.buffered_byte_length {
            self.buffer.copy_within(self.internal_buffer_position..self.buffered_byte_length, 0);
            self.buffered_byte_length -= self.internal_buffer_position;
            self.buffer_offset += self.internal_buffer_position as u64;
            self.internal_buffer_position = 0;
            self.ensure_capacity(length);

            while self.buffered_byte_length < length && !self.reached_eof {
                self.private_read()?;
            }
        }

        Ok(())
    }

    fn at_eof(&mut self) -> Result<bool, EbmlError> {
        self.ensure_data_read(1)?;
        Ok(self.internal_buffer_position >= self.buffered_byte_length)
    }

    fn skip(&mut self, length: u64) -> Result<(), EbmlError> {
        let buffered = (self.buffered_byte_length - self.internal_buffer_position) as u64;
        if length <= buffered {
            self.internal_buffer_position += length as usize;
        } else {
            let target = self.current_offset() + length;
            self.source.seek(SeekFrom::Start(target))?;
            self.buffer_offset = target;
            self.buffered_byte_length = 0;
            self.internal_buffer_position = 0;
            self.reached_eof = false;
        }
        Ok(())
    }

    fn read_payload(&mut self, header: &Header, length: usize) -> Result<Vec<u8>, EbmlError> {
        self.ensure_data_read(length)?;
        let available = self.buffered_byte_length - self.internal_buffer_position;
        if available < length {
            return Err(EbmlError::TruncatedElement {
                id: header.id,
                position: header.position,
                declared: length as u64,
                available: available as u64,
            });
        }

        let data = self.buffer[self.internal_buffer_position..(self.internal_buffer_position + length)].to_vec();
        self.internal_buffer_position += length;
        Ok(data)
    }

    fn read_header(&mut self) -> Result<Header, EbmlError> {
        let position = self.current_offset();
        self.ensure_data_read(MAX_HEADER_LEN)?;

        let (id, id_len) = tools::read_element_id(self.available())
            .map_err(|source| EbmlError::MalformedVarint { position, source })?;
        let (size, size_len) = EbmlSize::read(&self.available()[id_len..])
            .map_err(|source| EbmlError::MalformedVarint { position: position + id_len as u64, source })?;

        self.internal_buffer_position += id_len + size_len;
        Ok(Header {
            id,
            size,
            size_len,
            position,
            payload_start: position + (id_len + size_len) as u64,
        })
    }

    fn check_magic(&mut self) -> Result<(), EbmlError> {
        self.ensure_data_read(EBML_MAGIC.len())?;
        let head = &self.available()[..self.available().len().min(EBML_MAGIC.len())];
        if head != EBML_MAGIC {
            return Err(EbmlError::UnrecognizedMagic(head.to_vec()));
        }
        Ok(())
    }

    fn enclosing_end(&self) -> Option<u64> {
        self.stack.iter().rev().find_map(|open| open.end)
    }

    fn has_known_size_scope(&self) -> bool {
        self.enclosing_end().is_some()
    }

    fn close(&mut self, open: OpenMaster, end: u64) {
        let element = &mut self.nodes[open.node.0];
        if !element.size.is_known() {
            if let (Some(origin), Some(payload)) = (element.origin, element.raw_span) {
                element.origin = Some(Span::new(origin.offset, end - origin.offset));
                element.raw_span = Some(Span::new(payload.offset, end - payload.offset));
            }
        }
    }

    fn close_finished(&mut self, offset: u64) {
        let outermost = self.stack.iter().position(|open| matches!(open.end, Some(end) if offset >= end));
        if let Some(index) = outermost {
            while self.stack.len() > index {
                if let Some(open) = self.stack.pop() {
                    let end = open.end.unwrap_or(offset);
                    self.close(open, end);
                }
            }
        }
    }

    fn close_ended_by(&mut self, id: u64, offset: u64) {
        while let Some(open) = self.stack.last() {
            if open.end.is_some() || !spec_util::is_ended_by::<TSpec>(self.nodes[open.node.0].id, id) {
                break;
            }
            if let Some(open) = self.stack.pop() {
                self.close(open, offset);
            }
        }
    }

    fn link(&mut self, element: Element) -> NodeId {
        let node = NodeId(self.nodes.len());
        let mut element = element;
        match self.stack.last() {
            Some(open) => {
                element.parent = Some(open.node);
                self.nodes[open.node.0].children.push(node);
            },
            None => self.roots.push(node),
        }
        self.nodes.push(element);
        node
    }

    fn read_element(&mut self, header: Header, source_len: u64) -> Result<(), EbmlError> {
        let limit = self.enclosing_end().unwrap_or(source_len);
        let remaining = limit.saturating_sub(header.payload_start);
        if header.payload_start > limit || matches!(header.size, EbmlSize::Known(size) if size > remaining) {
            return Err(EbmlError::TruncatedElement {
                id: header.id,
                position: header.position,
                declared: header.size.value().unwrap_or(0),
                available: remaining,
            });
        }

        let kind = TSpec::get_kind(header.id);
        let scope_opaque = self.stack.last().map(|open| open.opaque).unwrap_or(false);
        let opaque = scope_opaque || self.options.opaque_ids.contains(&header.id);
        let is_master = kind == Some(ElementKind::Master);
        let descend = is_master && (!opaque || !header.size.is_known());

        // A leaf of unknown size runs to the end of its scope.
        let payload_len = header.size.value().unwrap_or(if is_master { 0 } else { remaining });

        trace!(
            offset = header.position,
            size = ?header.size,
            "{} ({:#x})", TSpec::get_name(header.id).unwrap_or("unknown"), header.id
        );

        let mut element = Element::parsed(
            header.id,
            kind.unwrap_or(ElementKind::Binary),
            header.size,
            header.size_len,
            header.position,
            Span::new(header.payload_start, payload_len),
        );
        element.opaque = is_master && !descend;

        let node = self.link(element);

        if descend {
            self.stack.push(OpenMaster {
                node,
                end: header.size.value().map(|size| header.payload_start + size),
                opaque,
            });
        } else if kind.is_some() && !is_master && !opaque && payload_len <= self.options.inline_payload_limit {
            let data = self.read_payload(&header, payload_len as usize)?;
            self.nodes[node.0].raw = Some(data);
        } else {
            self.skip(payload_len)?;
        }

        Ok(())
    }

    ///
    /// Parses the whole source into an element tree.
    ///
    /// # Errors
    ///
    /// Fails with [`EbmlError::UnrecognizedMagic`] if the source does not start with an EBML header, with
    /// [`EbmlError::MalformedVarint`] or [`EbmlError::TruncatedElement`] if an element is corrupt, and with
    /// [`EbmlError::Io`] if reading fails.  Undecodable bytes after the last element are tolerated (and logged) as
    /// long as they are not inside a known-size master.
    ///
    pub fn parse(mut self) -> Result<ElementTree<TSpec>, EbmlError> {
        let start = self.source.stream_position()?;
        let source_len = self.source.seek(SeekFrom::End(0))?;
        self.source.seek(SeekFrom::Start(start))?;
        self.buffer_offset = start;

        self.check_magic()?;

        let mut trailing = None;
        loop {
            let offset = self.current_offset();
            self.close_finished(offset);

            if self.at_eof()? {
                break;
            }

            let header = match self.read_header() {
                Ok(header) => header,
                Err(err) if !self.has_known_size_scope() => {
                    warn!(offset, error = %err, "ignoring {} undecodable trailing bytes", source_len - offset);
                    trailing = Some(Span::new(offset, source_len - offset));
                    break;
                },
                Err(err) => return Err(err),
            };

            self.close_ended_by(header.id, header.position);
            self.read_element(header, source_len)?;
        }

        let end = trailing.map(|span| span.offset).unwrap_or_else(|| self.current_offset());
        while let Some(open) = self.stack.pop() {
            let close_at = open.end.unwrap_or(end);
            self.close(open, close_at);
        }

        debug!(elements = self.nodes.len(), bytes = end - start, "parsed element tree");
        Ok(ElementTree::from_parts(self.nodes, self.roots, trailing))
    }
}

///
/// Parses a Matroska document with default options.
///
pub fn parse_tree<R: Read + Seek>(source: R) -> Result<ElementTree<Matroska>, EbmlError> {
    TreeParser::new(source).parse()
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn element(id: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut bytes = id.to_vec();
        bytes.push(0x80 | payload.len() as u8);
        bytes.extend_from_slice(payload);
        bytes
    }

    fn header() -> Vec<u8> {
        element(&EBML_MAGIC, &element(&[0x42, 0x82], b"matroska"))
    }

    #[test]
    fn rejects_missing_magic() {
        let result = parse_tree(Cursor::new(vec![0x1A, 0x45, 0x00, 0x00, 0x80]));
        assert!(matches!(result, Err(EbmlError::UnrecognizedMagic(bytes)) if bytes == vec![0x1A, 0x45, 0x00, 0x00]));
        assert!(matches!(parse_tree(Cursor::new(vec![])), Err(EbmlError::UnrecognizedMagic(_))));
    }

    #[test]
    fn leaves_are_loaded_lazily() {
        let tree = parse_tree(Cursor::new(header())).unwrap();
        let doc_type = tree.first_named(tree.roots()[0], "DocType").unwrap();
        let element = tree.element(doc_type);
        assert!(element.is_loaded());
        assert!(element.value.get().is_none());
        assert_eq!("matroska", element.string_value().unwrap());
        assert_eq!(Some(Span::new(8, 8)), element.raw_span());
    }

    #[test]
    fn unknown_ids_stay_on_disk() {
        let mut bytes = header();
        let mut segment = element(&[0xF2], &[1, 2, 3]);
        segment = element(&[0x18, 0x53, 0x80, 0x67], &segment);
        bytes.extend(segment);

        let tree = parse_tree(Cursor::new(bytes)).unwrap();
        let segment = tree.root_named("Segment").unwrap();
        let unknown = tree.children(segment)[0];
        assert_eq!(0xF2, tree.id(unknown));
        assert_eq!(ElementKind::Binary, tree.element(unknown).kind());
        assert!(!tree.element(unknown).is_loaded());
    }

    #[test]
    fn opaque_masters_are_skipped() {
        let mut bytes = header();
        let cluster = element(&[0x1F, 0x43, 0xB6, 0x75], &element(&[0xE7], &[5]));
        bytes.extend(element(&[0x18, 0x53, 0x80, 0x67], &cluster));

        let tree: ElementTree<Matroska> = TreeParser::with_options(Cursor::new(bytes), ParseOptions::for_tags()).parse().unwrap();
        let segment = tree.root_named("Segment").unwrap();
        let cluster = tree.child_named(segment, "Cluster").unwrap();
        assert!(tree.element(cluster).is_opaque());
        assert!(tree.children(cluster).is_empty());
        assert_eq!(Some(Span::new(header().len() as u64 + 5, 8)), tree.element(cluster).origin());
    }

    #[test]
    fn unknown_size_segment_runs_to_end() {
        let mut bytes = header();
        bytes.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0xFF]);
        bytes.extend(element(&[0x1F, 0x43, 0xB6, 0x75], &element(&[0xE7], &[5])));
        let total = bytes.len() as u64;

        let tree = parse_tree(Cursor::new(bytes)).unwrap();
        let segment = tree.root_named("Segment").unwrap();
        assert_eq!(EbmlSize::Unknown, tree.element(segment).size());
        assert_eq!(total, tree.element(segment).origin().unwrap().end());
        assert_eq!(1, tree.children(segment).len());
    }

    #[test]
    fn unknown_size_cluster_is_ended_by_sibling() {
        let mut bytes = header();
        let mut payload = vec![0x1F, 0x43, 0xB6, 0x75, 0xFF];
        payload.extend(element(&[0xE7], &[5]));
        payload.extend(element(&[0x12, 0x54, 0xC3, 0x67], &[]));
        bytes.extend(element(&[0x18, 0x53, 0x80, 0x67], &payload));

        let tree = parse_tree(Cursor::new(bytes)).unwrap();
        let segment = tree.root_named("Segment").unwrap();
        let names: Vec<_> = tree.children(segment).iter().map(|child| tree.name(*child)).collect();
        assert_eq!(vec![Some("Cluster"), Some("Tags")], names);

        let cluster = tree.children(segment)[0];
        assert_eq!(8, tree.element(cluster).origin().unwrap().len);
    }

    #[test]
    fn declared_size_past_end_is_truncated() {
        let mut bytes = header();
        bytes.extend_from_slice(&[0x18, 0x53, 0x80, 0x67, 0x90, 0xEC, 0x80]);

        let result = parse_tree(Cursor::new(bytes));
        assert!(matches!(
            result,
            Err(EbmlError::TruncatedElement { id: 0x18538067, declared: 16, available: 2, .. })
        ));
    }

    #[test]
    fn child_overrunning_parent_is_truncated() {
        let mut bytes = header();
        let mut payload = element(&[0x12, 0x54, 0xC3, 0x67], &[]);
        payload[4] = 0x85;
        bytes.extend(element(&[0x18, 0x53, 0x80, 0x67], &payload));
        bytes.extend_from_slice(&[0xEC, 0x83, 0, 0, 0]);

        let result = parse_tree(Cursor::new(bytes));
        assert!(matches!(result, Err(EbmlError::TruncatedElement { id: 0x1254C367, .. })));
    }

    #[test]
    fn trailing_garbage_is_tolerated() {
        let mut bytes = header();
        bytes.extend_from_slice(&[0x00, 0x00, 0x00]);
        let garbage_at = header().len() as u64;

        let tree = parse_tree(Cursor::new(bytes)).unwrap();
        assert_eq!(1, tree.roots().len());
        assert_eq!(Some(Span::new(garbage_at, 3)), tree.trailing());
    }

    #[test]
    fn garbage_inside_a_master_is_an_error() {
        let mut bytes = header();
        bytes.extend(element(&[0x18, 0x53, 0x80, 0x67], &[0x00, 0x00]));

        let result = parse_tree(Cursor::new(bytes));
        assert!(matches!(result, Err(EbmlError::MalformedVarint { .. })));
    }

    #[test]
    fn large_leaves_stay_on_disk() {
        let mut bytes = header();
        bytes.extend(element(&[0x18, 0x53, 0x80, 0x67], &element(&[0x63, 0xA2], &[7; 20])));

        let options = ParseOptions::default().with_inline_payload_limit(10);
        let tree: ElementTree<Matroska> = TreeParser::with_options(Cursor::new(bytes), options).parse().unwrap();
        let private = tree.first_named(tree.roots()[1], "CodecPrivate").unwrap();
        assert!(!tree.element(private).is_loaded());
        assert!(matches!(tree.element(private).value(), Err(EbmlError::PayloadNotLoaded { size: 20, .. })));
    }
}
