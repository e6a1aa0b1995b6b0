//!
//! Keeps the rest of a `Segment` in place when the tag region changes size.
//!
//! Clusters are addressed by absolute offsets inside the segment (from `SeekHead` and `Cues`), so a resized `Tags`
//! element must not push them around.  A length change is absorbed by an adjacent `Void` where possible; otherwise the
//! `Tags` element is moved to the end of the segment and a `Void` of its old length is left behind.  `SeekHead`
//! entries are then refreshed for everything that did move.
//!

use std::collections::HashMap;

use ebml_tags_specification::matroska::Matroska;
use serde::Serialize;
use tracing::{debug, warn};

use crate::element::NodeId;
use crate::errors::EbmlError;
use crate::tools;
use crate::tree::ElementTree;
use crate::tree_writer::Layout;

///
/// Number of times `SeekPosition`s are recomputed before giving up on a stable layout.
///
pub const MAX_SEEK_PASSES: usize = 4;

const VOID_ID_LEN: u64 = 1;

///
/// What [`rearrange`] did to the segment.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RearrangeReport {
    /// `Tags` did not fit in its old place and was moved to the end of the segment.
    pub relocated_tags: bool,
    /// `SeekPosition` values that were rewritten.
    pub seek_entries_updated: usize,
    /// Clusters and cues that ended up at a different offset.  Cue points are not rewritten.
    pub shifted_elements: usize,
}

///
/// Splits the total length of a `Void` element into `(size field length, payload length)`.
///
/// Returns `None` for lengths below 2, which no `Void` can occupy.
///
pub fn void_payload_len(total: u64) -> Option<(usize, u64)> {
    (1..=8usize).find_map(|size_len| {
        let payload = total.checked_sub(VOID_ID_LEN + size_len as u64)?;
        if payload <= tools::max_vint_value(size_len) {
            Some((size_len, payload))
        } else {
            None
        }
    })
}

///
/// Creates a detached `Void` element that encodes to exactly `total` bytes.
///
pub fn create_void(tree: &mut ElementTree, total: u64) -> Result<NodeId, EbmlError> {
    let (size_len, payload) = void_payload_len(total).ok_or_else(|| EbmlError::UnencodableValue {
        id: Matroska::Void.id(),
        reason: format!("a Void element cannot be {} bytes long", total),
    })?;
    let void = tree.create_binary(Matroska::Void.id(), &vec![0; payload as usize])?;
    tree.element_mut(void).size_width = Some(size_len);
    Ok(void)
}

///
/// Room an element may use without moving its later siblings: its source length plus any `Void` right after it.
///
#[derive(Clone, Debug)]
struct Slot {
    node: NodeId,
    budget: u64,
    void: Option<(NodeId, u64)>,
}

impl Slot {
    fn of(tree: &ElementTree, node: NodeId) -> Option<Slot> {
        let origin = tree.element(node).origin()?;
        let void = tree
            .next_sibling(node)
            .filter(|next| tree.id(*next) == Matroska::Void.id())
            .and_then(|next| tree.element(next).origin().map(|origin| (next, origin.len)));
        Some(Slot {
            node,
            budget: origin.len + void.map(|(_, len)| len).unwrap_or(0),
            void,
        })
    }

    ///
    /// Resizes (or removes, or adds) the trailing `Void` so the slot is filled by an element of `len` bytes.  Returns
    /// `false` when that is impossible.
    ///
    fn fit(&mut self, tree: &mut ElementTree, len: u64) -> Result<bool, EbmlError> {
        if len > self.budget || self.budget - len == 1 {
            return Ok(false);
        }
        let gap = self.budget - len;

        if let Some((void, void_len)) = self.void {
            if void_len == gap {
                return Ok(true);
            }
            tree.remove_child(void);
            self.void = None;
        }

        if gap > 0 {
            let parent = tree.parent(self.node).ok_or(EbmlError::MissingElement("Segment"))?;
            let index = tree.index_of_child(self.node).map(|index| index + 1).unwrap_or(0);
            let void = create_void(tree, gap)?;
            tree.insert_child(parent, index, void)?;
            self.void = Some((void, gap));
        }
        Ok(true)
    }
}

struct SeekEntry {
    position: NodeId,
    target: NodeId,
}

fn payload_start(tree: &ElementTree, segment: NodeId) -> Option<u64> {
    tree.element(segment).raw_span().map(|span| span.offset)
}

///
/// Pairs every `SeekPosition` with the segment child it pointed at in the source.
///
fn resolve_seek_entries(tree: &ElementTree, segment: NodeId) -> Result<Vec<SeekEntry>, EbmlError> {
    let start = match payload_start(tree, segment) {
        Some(start) => start,
        None => return Ok(Vec::new()),
    };
    let by_offset: HashMap<u64, NodeId> = tree
        .children(segment)
        .iter()
        .filter_map(|child| tree.element(*child).origin().map(|origin| (origin.offset.saturating_sub(start), *child)))
        .collect();

    let mut entries = Vec::new();
    for seek_head in tree.children_with_id(segment, Matroska::SeekHead.id()) {
        for seek in tree.children_with_id(seek_head, Matroska::Seek.id()) {
            let position = match tree.child_with_id(seek, Matroska::SeekPosition.id()) {
                Some(position) => position,
                None => continue,
            };
            let offset = tree.element(position).unsigned_value()?;
            match by_offset.get(&offset) {
                Some(target) => entries.push(SeekEntry { position, target: *target }),
                None => debug!(offset, "seek entry does not point at a segment child"),
            }
        }
    }
    Ok(entries)
}

fn child_offsets(tree: &ElementTree, segment: NodeId, layout: &Layout) -> HashMap<NodeId, u64> {
    let mut offset = 0;
    let mut offsets = HashMap::new();
    for child in tree.children(segment) {
        offsets.insert(*child, offset);
        offset += layout.len(*child).unwrap_or(0);
    }
    offsets
}

///
/// Rewrites `SeekPosition`s until they agree with the layout, absorbing `SeekHead` growth into following `Void`s.
///
/// Returns the number of entries whose value changed.
///
fn refresh_seek_positions(tree: &mut ElementTree, segment: NodeId, entries: &[SeekEntry]) -> Result<usize, EbmlError> {
    if entries.is_empty() {
        return Ok(0);
    }

    let mut seek_heads: Vec<Slot> = tree
        .children_with_id(segment, Matroska::SeekHead.id())
        .filter_map(|seek_head| Slot::of(tree, seek_head))
        .collect();

    let mut updated = 0;
    for pass in 0..MAX_SEEK_PASSES {
        let layout = tree.layout_of(&[segment])?;
        let offsets = child_offsets(tree, segment, &layout);

        let mut changed = false;
        for entry in entries {
            if let Some(offset) = offsets.get(&entry.target) {
                if tree.set_unsigned(entry.position, *offset)? {
                    changed = true;
                    updated += 1;
                }
            }
        }
        if !changed {
            debug!(passes = pass, "seek positions are stable");
            return Ok(updated);
        }

        for slot in seek_heads.iter_mut() {
            let len = tree.encoded_len(slot.node)?;
            if !slot.fit(tree, len)? {
                warn!(bytes = len, budget = slot.budget, "SeekHead outgrew its space, following elements will shift");
            }
        }
    }

    warn!(passes = MAX_SEEK_PASSES, "seek positions did not settle");
    Ok(updated)
}

///
/// Lays out a `Segment` after its tags changed.
///
/// `tags` is the segment's `Tags` element.  When it was read from the source and its length changed, the change is
/// absorbed by a following `Void`, by a new `Void` in the space it gave up, or by nothing at all when `Tags` is the
/// last child.  Failing that, `Tags` moves to the end of the segment.  Afterwards every `SeekPosition` that pointed
/// at a moved element is updated.
///
pub fn rearrange(tree: &mut ElementTree, segment: NodeId, tags: NodeId) -> Result<RearrangeReport, EbmlError> {
    let mut report = RearrangeReport::default();
    let seek_entries = resolve_seek_entries(tree, segment)?;
    let original_offsets: HashMap<NodeId, u64> = match payload_start(tree, segment) {
        Some(start) => tree
            .children(segment)
            .iter()
            .filter_map(|child| tree.element(*child).origin().map(|origin| (*child, origin.offset - start)))
            .collect(),
        None => HashMap::new(),
    };

    if let Some(mut slot) = Slot::of(tree, tags) {
        let len = tree.encoded_len(tags)?;
        let is_last = tree.next_sibling(tags).is_none();
        let old_len = tree.element(tags).origin().map(|origin| origin.len).unwrap_or(0);

        if len != old_len && !is_last && !slot.fit(tree, len)? {
            let void = create_void(tree, old_len)?;
            tree.replace_child(tags, void)?;
            tree.append_child(segment, tags)?;
            report.relocated_tags = true;
            debug!(bytes = len, budget = slot.budget, "moved Tags to the end of the segment");
        }
    }

    report.seek_entries_updated = refresh_seek_positions(tree, segment, &seek_entries)?;

    let layout = tree.layout_of(&[segment])?;
    let offsets = child_offsets(tree, segment, &layout);
    report.shifted_elements = tree
        .children(segment)
        .iter()
        .filter(|child| {
            let id = tree.id(**child);
            id == Matroska::Cluster.id() || id == Matroska::Cues.id()
        })
        .filter(|child| original_offsets.get(*child) != offsets.get(*child))
        .count();
    if report.shifted_elements > 0 {
        warn!(count = report.shifted_elements, "clusters or cues moved, cue points were not updated");
    }

    Ok(report)
}
