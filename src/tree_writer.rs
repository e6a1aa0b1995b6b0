use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use ebml_tags_specification::matroska::Matroska;
use ebml_tags_specification::EbmlSpecification;
use tracing::{debug, warn};

use crate::element::{Element, NodeId, Span};
use crate::errors::EbmlError;
use crate::tools::{self, EbmlSize, Vint};
use crate::tree::ElementTree;

///
/// Masters with a payload above this size keep their existing CRC-32 instead of having it recomputed.
///
pub const CRC_REGENERATION_LIMIT: u64 = 16 * 1024 * 1024;

const CRC_PAYLOAD_LEN: u64 = 4;

#[derive(Clone, Debug)]
enum Encoding {
    /// Untouched element, copied from the source.
    Verbatim(Span),
    Master { header: Vec<u8>, regenerate_crc: bool },
    Leaf { header: Vec<u8>, payload: Vec<u8> },
    /// Regenerated CRC-32 element.  The checksum itself is computed while writing.
    Crc { header: Vec<u8> },
}

#[derive(Clone, Debug)]
struct Encoded {
    encoding: Encoding,
    len: u64,
}

///
/// Encoded sizes of a set of subtrees.
///
/// Built by walking the elements bottom-up once, so the size of every master is known before its header is
/// encoded.  Elements with nothing modified below them keep their source bytes.
///
#[derive(Clone, Debug)]
pub struct Layout {
    entries: Vec<Option<Encoded>>,
}

impl Layout {
    ///
    /// Full encoded length (header included) of an element covered by this layout.
    ///
    pub fn len(&self, node: NodeId) -> Option<u64> {
        self.entries.get(node.0).and_then(|entry| entry.as_ref()).map(|entry| entry.len)
    }

    ///
    /// Whether `node` will be copied byte for byte from the source.
    ///
    pub fn is_verbatim(&self, node: NodeId) -> bool {
        matches!(self.entry(node), Some(Encoded { encoding: Encoding::Verbatim(_), .. }))
    }

    fn entry(&self, node: NodeId) -> Option<&Encoded> {
        self.entries.get(node.0).and_then(|entry| entry.as_ref())
    }
}

fn size_field(id: u64, size: u64, width: Option<usize>) -> Result<Vec<u8>, EbmlError> {
    let encoded = match width {
        Some(width) if width <= 8 && size <= tools::max_vint_value(width) => size.as_vint_with_length(width),
        _ => size.as_vint(),
    };
    encoded.map_err(|e| EbmlError::UnencodableValue { id, reason: e.to_string() })
}

fn encoded_len_of(entries: &[Option<Encoded>], node: NodeId) -> u64 {
    entries[node.0].as_ref().map(|entry| entry.len).unwrap_or(0)
}

fn element_header(element: &Element, payload_len: u64) -> Result<Vec<u8>, EbmlError> {
    let mut header = tools::id_bytes(element.id);
    if element.size == EbmlSize::Unknown {
        header.extend(EbmlSize::unknown_marker(element.size_width.unwrap_or(1)));
    } else {
        header.extend(size_field(element.id, payload_len, element.size_width)?);
    }
    Ok(header)
}

impl<TSpec: EbmlSpecification> ElementTree<TSpec> {
    ///
    /// Computes the layout of the whole document.
    ///
    pub fn layout(&self) -> Result<Layout, EbmlError> {
        self.layout_of(self.roots())
    }

    ///
    /// Computes the layout of the subtrees rooted at `nodes`.
    ///
    /// # Errors
    ///
    /// Fails with [`EbmlError::UnencodableValue`] if a modified value cannot be encoded, or with
    /// [`EbmlError::PayloadNotLoaded`] if a modified element has neither a value nor a source span.
    ///
    pub fn layout_of(&self, nodes: &[NodeId]) -> Result<Layout, EbmlError> {
        let mut entries: Vec<Option<Encoded>> = vec![None; self.len()];
        let mut modified = vec![false; self.len()];

        let mut stack: Vec<(NodeId, bool)> = nodes.iter().rev().map(|node| (*node, false)).collect();
        while let Some((node, visited)) = stack.pop() {
            let element = self.element(node);
            if !visited {
                stack.push((node, true));
                stack.extend(element.children.iter().rev().map(|child| (*child, false)));
                continue;
            }

            let is_modified = element.dirty
                || element.origin.is_none()
                || element.children.iter().any(|child| modified[child.0]);
            modified[node.0] = is_modified;

            let encoded = match element.origin {
                Some(origin) if !is_modified => Encoded { encoding: Encoding::Verbatim(origin), len: origin.len },
                _ if element.is_master() => self.encode_master(node, &mut entries)?,
                _ => {
                    let value = element.value()?.ok_or(EbmlError::PayloadNotLoaded { id: element.id, size: 0 })?;
                    let payload = value.encode(element.id, element.payload_width)?;
                    let header = element_header(element, payload.len() as u64)?;
                    Encoded {
                        len: (header.len() + payload.len()) as u64,
                        encoding: Encoding::Leaf { header, payload },
                    }
                },
            };
            entries[node.0] = Some(encoded);
        }

        Ok(Layout { entries })
    }

    fn encode_master(&self, node: NodeId, entries: &mut [Option<Encoded>]) -> Result<Encoded, EbmlError> {
        let element = self.element(node);

        let mut regenerate_crc = false;
        if let Some(first) = element.children.first() {
            let crc = self.element(*first);
            if crc.id == Matroska::Crc32.id() {
                let protected: u64 = element.children[1..].iter().map(|child| encoded_len_of(entries, *child)).sum();
                if protected <= CRC_REGENERATION_LIMIT {
                    let mut header = tools::id_bytes(crc.id);
                    header.extend(size_field(crc.id, CRC_PAYLOAD_LEN, crc.size_width)?);
                    let len = header.len() as u64 + CRC_PAYLOAD_LEN;
                    entries[first.0] = Some(Encoded { encoding: Encoding::Crc { header }, len });
                    regenerate_crc = true;
                } else {
                    warn!(
                        id = element.id,
                        bytes = protected,
                        "keeping stale CRC-32, element is too large to checksum"
                    );
                }
            }
        }

        let payload_len: u64 = element.children.iter().map(|child| encoded_len_of(entries, *child)).sum();
        let header = element_header(element, payload_len)?;
        Ok(Encoded {
            len: header.len() as u64 + payload_len,
            encoding: Encoding::Master { header, regenerate_crc },
        })
    }

    ///
    /// Full encoded length of a single element, header included.
    ///
    pub fn encoded_len(&self, node: NodeId) -> Result<u64, EbmlError> {
        let layout = self.layout_of(&[node])?;
        Ok(layout.len(node).unwrap_or(0))
    }
}

///
/// Writes an [`ElementTree`] to a destination that implements [`std::io::Write`].
///
/// Elements that were not modified are copied from the source the tree was parsed from, so the same source (or an
/// identical copy of it) must be passed to [`TreeWriter::write_tree`].  Trees built entirely in memory need no source
/// and can be written with [`to_bytes`].
///
pub struct TreeWriter<W: Write> {
    dest: W,
}

impl<W: Write> TreeWriter<W> {
    pub fn new(dest: W) -> Self {
        TreeWriter { dest }
    }

    pub fn into_inner(self) -> W {
        self.dest
    }

    ///
    /// Writes every root element and any trailing bytes.  Returns the number of bytes written.
    ///
    pub fn write_tree<TSpec: EbmlSpecification, S: Read + Seek>(&mut self, tree: &ElementTree<TSpec>, source: &mut S) -> Result<u64, EbmlError> {
        let layout = tree.layout()?;
        let mut written = 0;
        for root in tree.roots() {
            write_element(tree, &layout, *root, &mut self.dest, source)?;
            written += layout.len(*root).unwrap_or(0);
        }

        if let Some(trailing) = tree.trailing() {
            copy_span(source, trailing, &mut self.dest)?;
            written += trailing.len;
        }

        self.dest.flush()?;
        debug!(bytes = written, "wrote element tree");
        Ok(written)
    }
}

fn copy_span<S: Read + Seek, W: Write>(source: &mut S, span: Span, dest: &mut W) -> Result<(), EbmlError> {
    source.seek(SeekFrom::Start(span.offset))?;
    let copied = io::copy(&mut source.by_ref().take(span.len), dest)?;
    if copied != span.len {
        return Err(EbmlError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("source ended after {} of {} bytes at offset {}", copied, span.len, span.offset),
        )));
    }
    Ok(())
}

fn write_element<TSpec: EbmlSpecification, W: Write, S: Read + Seek>(
    tree: &ElementTree<TSpec>,
    layout: &Layout,
    node: NodeId,
    dest: &mut W,
    source: &mut S,
) -> Result<(), EbmlError> {
    let entry = layout.entry(node).ok_or(EbmlError::MissingElement("layout entry"))?;
    match &entry.encoding {
        Encoding::Verbatim(span) => copy_span(source, *span, dest)?,
        Encoding::Leaf { header, payload } => {
            dest.write_all(header)?;
            dest.write_all(payload)?;
        },
        Encoding::Crc { header } => {
            // A detached CRC-32 has nothing to protect.
            dest.write_all(header)?;
            dest.write_all(&[0; CRC_PAYLOAD_LEN as usize])?;
        },
        Encoding::Master { header, regenerate_crc } => {
            dest.write_all(header)?;
            let children = tree.children(node);
            if *regenerate_crc {
                let mut protected = Vec::new();
                for child in &children[1..] {
                    write_element(tree, layout, *child, &mut protected, source)?;
                }
                if let Some(Encoded { encoding: Encoding::Crc { header }, .. }) = layout.entry(children[0]) {
                    dest.write_all(header)?;
                }
                dest.write_all(&crc32fast::hash(&protected).to_le_bytes())?;
                dest.write_all(&protected)?;
            } else {
                for child in children {
                    write_element(tree, layout, *child, dest, source)?;
                }
            }
        },
    }
    Ok(())
}

///
/// Serializes a tree that does not reference any source bytes, e.g. one built in memory.
///
pub fn to_bytes<TSpec: EbmlSpecification>(tree: &ElementTree<TSpec>) -> Result<Vec<u8>, EbmlError> {
    let mut writer = TreeWriter::new(Vec::new());
    writer.write_tree(tree, &mut Cursor::new(Vec::<u8>::new()))?;
    Ok(writer.into_inner())
}
