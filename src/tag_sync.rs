use std::collections::HashSet;

use ebml_tags_specification::matroska::Matroska;
use serde::Serialize;
use tracing::debug;

use crate::element::NodeId;
use crate::errors::EbmlError;
use crate::tags::{self, TagData, TagMap, TagValue, DEFAULT_LANGUAGE, FILE_TARGET_TYPE, FILE_TARGET_TYPE_VALUE};
use crate::tree::ElementTree;

///
/// The `Tags` container and the file-level `Tag` inside it.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FileTagScope {
    pub tags: NodeId,
    pub tag: NodeId,
    pub created_tags: bool,
    pub created_tag: bool,
}

///
/// What a call to [`sync_tags`] changed.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Existing `SimpleTag`s whose value or language changed.
    pub updated: usize,
    /// Existing `SimpleTag`s that already held the requested value.
    pub unchanged: usize,
    /// New `SimpleTag`s appended for keys that had no match.
    pub appended: usize,
}

impl SyncSummary {
    pub fn is_noop(&self) -> bool {
        self.updated == 0 && self.appended == 0
    }
}

///
/// Finds the file-level `Tag` of a `Segment`, creating whatever is missing.
///
/// A missing `Tags` is appended as the last child of the `Segment`.  A missing file-level `Tag` gets
/// `Targets { TargetTypeValue = 50, TargetType = "ALBUM" }` and is inserted as the first `Tag` (after a leading
/// CRC-32, if any).
///
pub fn ensure_file_tags(tree: &mut ElementTree, segment: NodeId) -> Result<FileTagScope, EbmlError> {
    let (tags, created_tags) = match tree.child_with_id(segment, Matroska::Tags.id()) {
        Some(tags) => (tags, false),
        None => {
            let tags = tree.create_master(Matroska::Tags.id())?;
            tree.append_child(segment, tags)?;
            debug!("created Tags element");
            (tags, true)
        },
    };

    if let Some(tag) = tags::find_file_tags(tree, tags)? {
        return Ok(FileTagScope { tags, tag, created_tags, created_tag: false });
    }

    let tag = tree.create_master(Matroska::Tag.id())?;
    let targets = tree.create_master(Matroska::Targets.id())?;
    let target_type_value = tree.create_unsigned(Matroska::TargetTypeValue.id(), FILE_TARGET_TYPE_VALUE)?;
    let target_type = tree.create_string(Matroska::TargetType.id(), FILE_TARGET_TYPE)?;
    tree.append_child(targets, target_type_value)?;
    tree.append_child(targets, target_type)?;
    tree.append_child(tag, targets)?;

    let leading_crc = tree
        .children(tags)
        .first()
        .map(|first| tree.id(*first) == Matroska::Crc32.id())
        .unwrap_or(false);
    tree.insert_child(tags, if leading_crc { 1 } else { 0 }, tag)?;
    debug!("created file level Tag element");

    Ok(FileTagScope { tags, tag, created_tags, created_tag: true })
}

fn set_tag_data(tree: &mut ElementTree, simple_tag: NodeId, data: &TagData) -> Result<bool, EbmlError> {
    let string = tree.child_with_id(simple_tag, Matroska::TagString.id());
    let binary = tree.child_with_id(simple_tag, Matroska::TagBinary.id());

    let (other, replacement) = match data {
        TagData::String(text) => {
            if let Some(existing) = string {
                return tree.set_string(existing, text);
            }
            (binary, tree.create_string(Matroska::TagString.id(), text)?)
        },
        TagData::Binary(bytes) => {
            if let Some(existing) = binary {
                return tree.set_binary(existing, bytes);
            }
            (string, tree.create_binary(Matroska::TagBinary.id(), bytes)?)
        },
    };

    match other {
        Some(other) => tree.replace_child(other, replacement)?,
        None => tree.append_child(simple_tag, replacement)?,
    }
    Ok(true)
}

fn set_language(tree: &mut ElementTree, simple_tag: NodeId, language: &str) -> Result<bool, EbmlError> {
    if let Some(existing) = tree.child_with_id(simple_tag, Matroska::TagLanguage.id()) {
        return tree.set_string(existing, language);
    }
    if language == DEFAULT_LANGUAGE {
        return Ok(false);
    }

    let index = tree
        .child_with_id(simple_tag, Matroska::TagName.id())
        .and_then(|name| tree.index_of_child(name))
        .map(|index| index + 1)
        .unwrap_or(0);
    let element = tree.create_string(Matroska::TagLanguage.id(), language)?;
    tree.insert_child(simple_tag, index, element)?;
    Ok(true)
}

///
/// Writes `value` into an existing `SimpleTag`.  Returns whether anything changed.
///
pub fn update_simple_tag(tree: &mut ElementTree, simple_tag: NodeId, value: &TagValue) -> Result<bool, EbmlError> {
    let data_changed = set_tag_data(tree, simple_tag, &value.data)?;
    let language_changed = set_language(tree, simple_tag, &value.language)?;
    Ok(data_changed || language_changed)
}

///
/// Appends a new `SimpleTag` for `key` to a `Tag`.
///
pub fn append_simple_tag(tree: &mut ElementTree, tag: NodeId, key: &str, value: &TagValue) -> Result<NodeId, EbmlError> {
    let simple_tag = tree.create_master(Matroska::SimpleTag.id())?;
    let name = tree.create_string(Matroska::TagName.id(), &tags::tag_name_for(key))?;
    let language = tree.create_string(Matroska::TagLanguage.id(), &value.language)?;
    let default = tree.create_unsigned(Matroska::TagDefault.id(), 1)?;
    let data = match &value.data {
        TagData::String(text) => tree.create_string(Matroska::TagString.id(), text)?,
        TagData::Binary(bytes) => tree.create_binary(Matroska::TagBinary.id(), bytes)?,
    };

    for child in [name, language, default, data].iter() {
        tree.append_child(simple_tag, *child)?;
    }
    tree.append_child(tag, simple_tag)?;
    Ok(simple_tag)
}

///
/// Merges `map` into the `SimpleTag` children of `tag`.
///
/// The first `SimpleTag` whose name matches a key (ignoring ASCII case) and that holds a value is updated in place;
/// later duplicates are left alone, as are `SimpleTag`s with an empty `TagString` and no `TagBinary`.  Keys without a match are appended in map order.  `SimpleTag`s whose names are not in the map are
/// never removed.
///
pub fn sync_tags(tree: &mut ElementTree, tag: NodeId, map: &TagMap) -> Result<SyncSummary, EbmlError> {
    let mut summary = SyncSummary::default();
    let mut handled: HashSet<String> = HashSet::new();

    let simple_tags: Vec<NodeId> = tree.children_with_id(tag, Matroska::SimpleTag.id()).collect();
    for simple_tag in simple_tags {
        let key = match tags::simple_tag_name(tree, simple_tag)? {
            Some(name) => tags::normalize_key(name),
            None => continue,
        };
        if handled.contains(&key) {
            continue;
        }
        let value = match map.get(&key) {
            Some(value) => value,
            None => continue,
        };
        // Same entries as `read_tags` sees.
        if tags::simple_tag_data(tree, simple_tag)?.is_none() {
            continue;
        }

        if update_simple_tag(tree, simple_tag, value)? {
            summary.updated += 1;
        } else {
            summary.unchanged += 1;
        }
        handled.insert(key);
    }

    for (key, value) in map.iter() {
        if !handled.contains(key) {
            append_simple_tag(tree, tag, key, value)?;
            summary.appended += 1;
        }
    }

    debug!(
        updated = summary.updated,
        unchanged = summary.unchanged,
        appended = summary.appended,
        "synchronized tags"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::MatroskaTree;

    fn segment_with_album() -> (MatroskaTree, NodeId, NodeId) {
        let mut tree = MatroskaTree::new();
        let segment = tree.create_master(Matroska::Segment.id()).unwrap();
        tree.add_root(segment);
        let scope = ensure_file_tags(&mut tree, segment).unwrap();
        append_simple_tag(&mut tree, scope.tag, "album", &TagValue::string("Bar")).unwrap();
        (tree, segment, scope.tag)
    }

    #[test]
    fn creates_tags_and_file_tag() {
        let mut tree = MatroskaTree::new();
        let segment = tree.create_master(Matroska::Segment.id()).unwrap();
        tree.add_root(segment);

        let scope = ensure_file_tags(&mut tree, segment).unwrap();
        assert!(scope.created_tags && scope.created_tag);
        assert_eq!(Some(scope.tag), tags::find_file_tags(&tree, scope.tags).unwrap());

        let again = ensure_file_tags(&mut tree, segment).unwrap();
        assert_eq!(scope.tag, again.tag);
        assert!(!again.created_tags && !again.created_tag);
    }

    #[test]
    fn new_tag_goes_after_leading_crc() {
        let mut tree = MatroskaTree::new();
        let segment = tree.create_master(Matroska::Segment.id()).unwrap();
        tree.add_root(segment);
        let tags_element = tree.create_master(Matroska::Tags.id()).unwrap();
        tree.append_child(segment, tags_element).unwrap();
        let crc = tree.create_binary(Matroska::Crc32.id(), &[0; 4]).unwrap();
        tree.append_child(tags_element, crc).unwrap();

        let scope = ensure_file_tags(&mut tree, segment).unwrap();
        assert_eq!(&[crc, scope.tag], tree.children(tags_element));
    }

    #[test]
    fn updates_first_match_only() {
        let (mut tree, _, tag) = segment_with_album();
        let duplicate = append_simple_tag(&mut tree, tag, "ALBUM", &TagValue::string("Old")).unwrap();

        let map: TagMap = vec![("album", "Foo")].into_iter().collect();
        let summary = sync_tags(&mut tree, tag, &map).unwrap();
        assert_eq!(SyncSummary { updated: 1, unchanged: 0, appended: 0 }, summary);

        let read = tags::read_tags(&tree, tag).unwrap();
        assert_eq!(Some("Foo"), read.get("album").and_then(|value| value.as_str()));
        let old = tree.child_with_id(duplicate, Matroska::TagString.id()).unwrap();
        assert_eq!("Old", tree.element(old).string_value().unwrap());
    }

    #[test]
    fn switching_to_binary_replaces_value_element() {
        let (mut tree, _, tag) = segment_with_album();
        let simple_tag = tree.child_with_id(tag, Matroska::SimpleTag.id()).unwrap();
        let map: TagMap = vec![("album", vec![1u8, 2])].into_iter().collect();
        sync_tags(&mut tree, tag, &map).unwrap();

        assert_eq!(None, tree.child_with_id(simple_tag, Matroska::TagString.id()));
        let binary = tree.child_with_id(simple_tag, Matroska::TagBinary.id()).unwrap();
        assert_eq!(&[1, 2], tree.element(binary).binary_value().unwrap());
        assert_eq!(4, tree.children(simple_tag).len());
        assert_eq!(Some(3), tree.index_of_child(binary));
    }

    #[test]
    fn language_is_inserted_after_name() {
        let mut tree = MatroskaTree::new();
        let tag = tree.create_master(Matroska::Tag.id()).unwrap();
        tree.add_root(tag);
        let simple_tag = tree.create_master(Matroska::SimpleTag.id()).unwrap();
        tree.append_child(tag, simple_tag).unwrap();
        let name = tree.create_string(Matroska::TagName.id(), "TITLE").unwrap();
        let value = tree.create_string(Matroska::TagString.id(), "x").unwrap();
        tree.append_child(simple_tag, name).unwrap();
        tree.append_child(simple_tag, value).unwrap();

        let unchanged: TagMap = vec![("title", "x")].into_iter().collect();
        assert_eq!(1, sync_tags(&mut tree, tag, &unchanged).unwrap().unchanged);
        assert_eq!(2, tree.children(simple_tag).len());

        let german: TagMap = vec![("title", TagValue::string("x").with_language("ger"))].into_iter().collect();
        assert_eq!(1, sync_tags(&mut tree, tag, &german).unwrap().updated);
        let language = tree.children(simple_tag)[1];
        assert_eq!(Some("TagLanguage"), tree.name(language));
        assert_eq!("ger", tags::language(&tree, simple_tag).unwrap());
    }

    #[test]
    fn appended_tags_are_complete() {
        let (mut tree, _, tag) = segment_with_album();
        let map: TagMap = vec![("album artist", "Bar")].into_iter().collect();
        let summary = sync_tags(&mut tree, tag, &map).unwrap();
        assert_eq!(1, summary.appended);

        let simple_tag = *tree.children(tag).last().unwrap();
        let names: Vec<_> = tree.children(simple_tag).iter().map(|child| tree.name(*child)).collect();
        assert_eq!(
            vec![Some("TagName"), Some("TagLanguage"), Some("TagDefault"), Some("TagString")],
            names
        );
        assert_eq!(Some("ALBUM_ARTIST"), tags::simple_tag_name(&tree, simple_tag).unwrap());
        assert_eq!("und", tags::language(&tree, simple_tag).unwrap());
    }
}
