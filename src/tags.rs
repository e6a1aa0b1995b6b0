//!
//! Contains the in-memory tag map and the functions that locate and read the file-level tag scope.
//!
//! A Matroska `Tags` element holds any number of `Tag`s, each scoped by its `Targets`.  Only the `Tag` whose target
//! type is 50 ("album") and that names no track, edition, chapter or attachment applies to the whole file; that is the
//! scope read and written here.
//!

use std::fmt;
use std::iter::FromIterator;

use ebml_tags_specification::matroska::Matroska;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::element::NodeId;
use crate::errors::EbmlError;
use crate::tree::ElementTree;

///
/// `TargetTypeValue` of the file-level ("album") scope.  Also the default when a `Tag` has no `Targets`.
///
pub const FILE_TARGET_TYPE_VALUE: u64 = 50;

///
/// `TargetType` written next to [`FILE_TARGET_TYPE_VALUE`] when a file-level `Tag` is created.
///
pub const FILE_TARGET_TYPE: &str = "ALBUM";

///
/// Language of a `SimpleTag` that has no `TagLanguage` child.
///
pub const DEFAULT_LANGUAGE: &str = "und";

///
/// The payload of a tag: either text (`TagString`) or bytes (`TagBinary`).
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagData {
    String(String),
    Binary(Vec<u8>),
}

///
/// A tag value and its language.
///
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagValue {
    pub data: TagData,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    String::from(DEFAULT_LANGUAGE)
}

impl TagValue {
    pub fn string<S: Into<String>>(text: S) -> Self {
        TagValue {
            data: TagData::String(text.into()),
            language: default_language(),
        }
    }

    pub fn binary<B: Into<Vec<u8>>>(data: B) -> Self {
        TagValue {
            data: TagData::Binary(data.into()),
            language: default_language(),
        }
    }

    pub fn with_language<S: Into<String>>(mut self, language: S) -> Self {
        self.language = language.into();
        self
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            TagData::String(text) => Some(text),
            TagData::Binary(_) => None,
        }
    }

    pub fn as_binary(&self) -> Option<&[u8]> {
        match &self.data {
            TagData::Binary(data) => Some(data),
            TagData::String(_) => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            TagData::String(text) => write!(f, "{}", text),
            TagData::Binary(data) => write!(f, "<{} bytes>", data.len()),
        }
    }
}

impl From<&str> for TagValue {
    fn from(text: &str) -> Self {
        TagValue::string(text)
    }
}

impl From<String> for TagValue {
    fn from(text: String) -> Self {
        TagValue::string(text)
    }
}

impl From<Vec<u8>> for TagValue {
    fn from(data: Vec<u8>) -> Self {
        TagValue::binary(data)
    }
}

///
/// Normalizes a tag name into a map key: ASCII lowercase with every run of whitespace replaced by `_`.
///
/// ```
/// assert_eq!("album_artist", ebml_tags::tags::normalize_key("ALBUM ARTIST"));
/// ```
///
pub fn normalize_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.trim().chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                key.push('_');
            }
            in_whitespace = true;
        } else {
            key.push(c.to_ascii_lowercase());
            in_whitespace = false;
        }
    }
    key
}

///
/// The `TagName` written for a map key, e.g. `ALBUM_ARTIST` for `album artist`.
///
pub fn tag_name_for(key: &str) -> String {
    normalize_key(key).to_ascii_uppercase()
}

///
/// Insertion-ordered map from normalized tag name to [`TagValue`].
///
/// Keys passed to any method are normalized with [`normalize_key`] first, so `"ALBUM"`, `"Album"` and `"album"` all
/// refer to the same entry.
///
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagMap {
    entries: Vec<(String, TagValue)>,
}

impl TagMap {
    pub fn new() -> Self {
        TagMap::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        let key = normalize_key(key);
        self.entries.iter().position(|(existing, _)| *existing == key)
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.position(key).map(|index| &self.entries[index].1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    ///
    /// Inserts or replaces a value.  A replaced entry keeps its position.  Returns the previous value.
    ///
    pub fn insert<V: Into<TagValue>>(&mut self, key: &str, value: V) -> Option<TagValue> {
        let value = value.into();
        match self.position(key) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index].1, value)),
            None => {
                self.entries.push((normalize_key(key), value));
                None
            },
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        let index = self.position(key)?;
        Some(self.entries.remove(index).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(key, _)| key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: AsRef<str>, V: Into<TagValue>> FromIterator<(K, V)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = TagMap::new();
        map.extend(iter);
        map
    }
}

impl<K: AsRef<str>, V: Into<TagValue>> Extend<(K, V)> for TagMap {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key.as_ref(), value);
        }
    }
}

impl Serialize for TagMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

///
/// Returns the `TargetTypeValue` of a `Tag`, or [`FILE_TARGET_TYPE_VALUE`] when it has none.
///
pub fn target_type_value(tree: &ElementTree, tag: NodeId) -> Result<u64, EbmlError> {
    let value = tree
        .child_with_id(tag, Matroska::Targets.id())
        .and_then(|targets| tree.child_with_id(targets, Matroska::TargetTypeValue.id()));
    match value {
        Some(value) => tree.element(value).unsigned_value(),
        None => Ok(FILE_TARGET_TYPE_VALUE),
    }
}

///
/// Counts the track, edition, chapter and attachment references in a `Tag`'s `Targets`.
///
pub fn target_entity_count(tree: &ElementTree, tag: NodeId) -> usize {
    match tree.child_with_id(tag, Matroska::Targets.id()) {
        Some(targets) => tree
            .children(targets)
            .iter()
            .filter(|child| Matroska::TARGET_ENTITIES.iter().any(|entity| entity.id() == tree.id(**child)))
            .count(),
        None => 0,
    }
}

///
/// Finds the file-level `Tag` among the direct children of a `Tags` element.
///
/// Returns the first `Tag` whose target type value is 50 and whose `Targets` reference no specific entity, or `None`
/// if there is no such `Tag`.
///
pub fn find_file_tags(tree: &ElementTree, tags: NodeId) -> Result<Option<NodeId>, EbmlError> {
    for tag in tree.children_with_id(tags, Matroska::Tag.id()) {
        if target_type_value(tree, tag)? == FILE_TARGET_TYPE_VALUE && target_entity_count(tree, tag) == 0 {
            return Ok(Some(tag));
        }
    }
    Ok(None)
}

///
/// Language of a `SimpleTag`, [`DEFAULT_LANGUAGE`] when it has no `TagLanguage`.
///
pub fn language(tree: &ElementTree, simple_tag: NodeId) -> Result<String, EbmlError> {
    match tree.child_with_id(simple_tag, Matroska::TagLanguage.id()) {
        Some(language) => Ok(tree.element(language).string_value()?.to_owned()),
        None => Ok(default_language()),
    }
}

///
/// Returns the `TagName` of a `SimpleTag`, if it has one.
///
pub fn simple_tag_name(tree: &ElementTree, simple_tag: NodeId) -> Result<Option<&str>, EbmlError> {
    match tree.child_with_id(simple_tag, Matroska::TagName.id()) {
        Some(name) => Ok(Some(tree.element(name).string_value()?)),
        None => Ok(None),
    }
}

///
/// Returns the value of a `SimpleTag`, or `None` when it holds neither a non-empty `TagString` nor a `TagBinary`.
///
pub fn simple_tag_data(tree: &ElementTree, simple_tag: NodeId) -> Result<Option<TagData>, EbmlError> {
    if let Some(string) = tree.child_with_id(simple_tag, Matroska::TagString.id()) {
        let text = tree.element(string).string_value()?;
        if text.is_empty() {
            return Ok(None);
        }
        return Ok(Some(TagData::String(text.to_owned())));
    }
    match tree.child_with_id(simple_tag, Matroska::TagBinary.id()) {
        Some(binary) => Ok(Some(TagData::Binary(tree.element(binary).binary_value()?.to_vec()))),
        None => Ok(None),
    }
}

///
/// Reads the direct `SimpleTag`s of a `Tag` into a map.
///
/// The first `SimpleTag` with a given name wins.  Tags without a name and empty string values are skipped; nested
/// `SimpleTag`s are not read.
///
pub fn read_tags(tree: &ElementTree, tag: NodeId) -> Result<TagMap, EbmlError> {
    let mut map = TagMap::new();
    for simple_tag in tree.children_with_id(tag, Matroska::SimpleTag.id()) {
        let name = match simple_tag_name(tree, simple_tag)? {
            Some(name) if !name.trim().is_empty() => name,
            _ => continue,
        };
        if map.contains_key(name) {
            continue;
        }
        if let Some(data) = simple_tag_data(tree, simple_tag)? {
            map.insert(name, TagValue { data, language: language(tree, simple_tag)? });
        }
    }
    Ok(map)
}
