//!
//! Loading and saving the file-level tags of a Matroska/WebM document.
//!

use std::fs::{self, File};
use std::io::{BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use ebml_tags_specification::matroska::Matroska;
use serde::Serialize;
use tracing::debug;

use crate::element::NodeId;
use crate::errors::EbmlError;
use crate::info::StreamInfo;
use crate::rearrange::{self, RearrangeReport};
use crate::tag_sync::{self, SyncSummary};
use crate::tags::{self, TagMap, TagValue};
use crate::tree::ElementTree;
use crate::tree_parser::{ParseOptions, TreeParser};
use crate::tree_writer::TreeWriter;

///
/// Everything a save changed.
///
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SaveSummary {
    pub created_tags: bool,
    pub created_file_tag: bool,
    pub sync: SyncSummary,
    pub rearrange: RearrangeReport,
    pub bytes_written: u64,
}

fn parse<R: Read + Seek>(source: R, options: &ParseOptions) -> Result<ElementTree, EbmlError> {
    TreeParser::with_options(source, options.clone()).parse()
}

fn segment_of(tree: &ElementTree) -> Result<NodeId, EbmlError> {
    tree.root_named(Matroska::Segment.name()).ok_or(EbmlError::MissingElement("Segment"))
}

// Segment children whose values are read on load and on save.
const LOAD_PARTS: [Matroska; 3] = [Matroska::Info, Matroska::Tracks, Matroska::Tags];
const SAVE_PARTS: [Matroska; 2] = [Matroska::SeekHead, Matroska::Tags];

///
/// Reads the payloads of `parts` that the parser left on disk.
///
fn load_parts<S: Read + Seek>(tree: &mut ElementTree, segment: NodeId, parts: &[Matroska], source: &mut S) -> Result<(), EbmlError> {
    let nodes: Vec<NodeId> = tree
        .children(segment)
        .iter()
        .copied()
        .filter(|child| parts.iter().any(|part| part.id() == tree.id(*child)))
        .collect();

    let mut read = 0;
    for node in nodes {
        read += tree.load_payloads(node, source)?;
    }
    if read > 0 {
        debug!(payloads = read, "read payloads above the inline limit");
    }
    Ok(())
}

///
/// Reads the file-level tags and stream information of a document.
///
/// A document without `Tags`, or without a file-level `Tag`, yields an empty map.
///
/// ```no_run
/// use std::fs::File;
///
/// let (tags, info) = ebml_tags::load(File::open("song.mka")?)?;
/// println!("{}", info);
/// for (name, value) in tags.iter() {
///     println!("{} = {}", name, value);
/// }
/// # Ok::<(), ebml_tags::error::EbmlError>(())
/// ```
///
pub fn load<R: Read + Seek>(source: R) -> Result<(TagMap, StreamInfo), EbmlError> {
    load_with(source, &ParseOptions::for_tags())
}

pub fn load_with<R: Read + Seek>(mut source: R, options: &ParseOptions) -> Result<(TagMap, StreamInfo), EbmlError> {
    let mut tree = parse(&mut source, options)?;
    let segment = segment_of(&tree)?;
    if let Some(header) = tree.root_named(Matroska::Ebml.name()) {
        tree.load_payloads(header, &mut source)?;
    }
    load_parts(&mut tree, segment, &LOAD_PARTS, &mut source)?;
    let info = StreamInfo::from_tree(&tree)?;

    let tag_map = match tree.child_with_id(segment, Matroska::Tags.id()) {
        Some(tags_element) => match tags::find_file_tags(&tree, tags_element)? {
            Some(tag) => tags::read_tags(&tree, tag)?,
            None => TagMap::new(),
        },
        None => TagMap::new(),
    };

    debug!(tags = tag_map.len(), doc_type = ?info.doc_type, "loaded file tags");
    Ok((tag_map, info))
}

///
/// Merges `tag_map` into the file-level tags of `source` and writes the complete document to `dest`.
///
/// Keys already present are updated in place, new keys are appended, and tags that are not in the map are left
/// alone.  Everything outside the tag region is copied unchanged from `source`.
///
pub fn save<R: Read + Seek, W: Write>(source: R, dest: W, tag_map: &TagMap) -> Result<SaveSummary, EbmlError> {
    save_with(source, dest, tag_map, &ParseOptions::for_tags())
}

pub fn save_with<R: Read + Seek, W: Write>(
    mut source: R,
    dest: W,
    tag_map: &TagMap,
    options: &ParseOptions,
) -> Result<SaveSummary, EbmlError> {
    let mut tree = parse(&mut source, options)?;
    let segment = segment_of(&tree)?;
    load_parts(&mut tree, segment, &SAVE_PARTS, &mut source)?;

    let scope = tag_sync::ensure_file_tags(&mut tree, segment)?;
    let sync = tag_sync::sync_tags(&mut tree, scope.tag, tag_map)?;
    let rearrange = rearrange::rearrange(&mut tree, segment, scope.tags)?;

    let mut writer = TreeWriter::new(dest);
    let bytes_written = writer.write_tree(&tree, &mut source)?;

    debug!(
        updated = sync.updated,
        appended = sync.appended,
        relocated = rearrange.relocated_tags,
        bytes = bytes_written,
        "saved file tags"
    );
    Ok(SaveSummary {
        created_tags: scope.created_tags,
        created_file_tag: scope.created_tag,
        sync,
        rearrange,
        bytes_written,
    })
}

///
/// Saves tags into the file at `path`, replacing it atomically.
///
/// The new document is written to a temporary file in the same directory, synced to disk, given the permissions of
/// the original and then renamed over it.  If anything fails the original file is left as it was.
///
pub fn save_file<P: AsRef<Path>>(path: P, tag_map: &TagMap) -> Result<SaveSummary, EbmlError> {
    save_file_with(path, tag_map, &ParseOptions::for_tags())
}

pub fn save_file_with<P: AsRef<Path>>(path: P, tag_map: &TagMap, options: &ParseOptions) -> Result<SaveSummary, EbmlError> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let source = File::open(path)?;
    let permissions = source.metadata()?.permissions();
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;

    let summary = {
        let mut dest = BufWriter::new(temp.as_file_mut());
        let summary = save_with(&source, &mut dest, tag_map, options)?;
        dest.flush()?;
        summary
    };
    drop(source);

    temp.as_file().sync_all()?;
    fs::set_permissions(temp.path(), permissions)?;
    temp.persist(path).map_err(|err| EbmlError::Io(err.error))?;

    debug!(path = %path.display(), "replaced file");
    Ok(summary)
}

///
/// A tagged media file that can be read, edited in memory and written back.
///
pub trait TaggedFile: Sized {
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, EbmlError>;

    fn save(&self) -> Result<(), EbmlError>;

    fn get(&self, name: &str) -> Option<&TagValue>;

    fn set(&mut self, name: &str, value: TagValue) -> Option<TagValue>;

    fn iter(&self) -> Box<dyn Iterator<Item = (&str, &TagValue)> + '_>;
}

///
/// A Matroska or WebM file on disk together with its file-level tags.
///
#[derive(Clone, Debug)]
pub struct MatroskaFile {
    path: PathBuf,
    tags: TagMap,
    info: StreamInfo,
    options: ParseOptions,
}

impl MatroskaFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, EbmlError> {
        MatroskaFile::open_with(path, ParseOptions::for_tags())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: ParseOptions) -> Result<Self, EbmlError> {
        let (tags, info) = load_with(File::open(path.as_ref())?, &options)?;
        Ok(MatroskaFile {
            path: path.as_ref().to_path_buf(),
            tags,
            info,
            options,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tags(&self) -> &TagMap {
        &self.tags
    }

    pub fn tags_mut(&mut self) -> &mut TagMap {
        &mut self.tags
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn save_with_summary(&self) -> Result<SaveSummary, EbmlError> {
        save_file_with(&self.path, &self.tags, &self.options)
    }
}

impl TaggedFile for MatroskaFile {
    fn load<P: AsRef<Path>>(path: P) -> Result<Self, EbmlError> {
        MatroskaFile::open(path)
    }

    fn save(&self) -> Result<(), EbmlError> {
        self.save_with_summary().map(|_| ())
    }

    fn get(&self, name: &str) -> Option<&TagValue> {
        self.tags.get(name)
    }

    fn set(&mut self, name: &str, value: TagValue) -> Option<TagValue> {
        self.tags.insert(name, value)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = (&str, &TagValue)> + '_> {
        Box::new(self.tags.iter())
    }
}
