use std::fmt;

use ebml_tags_specification::matroska::Matroska;
use serde::Serialize;

use crate::element::NodeId;
use crate::errors::EbmlError;
use crate::tree::ElementTree;

const DEFAULT_TIMESTAMP_SCALE: u64 = 1_000_000;
const DEFAULT_CHANNELS: u64 = 1;
const DEFAULT_SAMPLING_FREQUENCY: f64 = 8000.0;

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;

///
/// Read-only stream properties of a Matroska/WebM file.
///
/// Audio fields describe the first audio track and are zero when there is none.
///
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamInfo {
    /// Duration in seconds.
    pub length: f64,
    /// `DocType` from the EBML header, e.g. `matroska` or `webm`.
    pub doc_type: Option<String>,
    pub channels: u64,
    pub sample_rate: f64,
    pub bits_per_sample: u64,
    pub has_video: bool,
}

fn unsigned_child(tree: &ElementTree, parent: NodeId, element: Matroska) -> Result<Option<u64>, EbmlError> {
    tree.child_with_id(parent, element.id())
        .map(|child| tree.element(child).unsigned_value())
        .transpose()
}

fn float_child(tree: &ElementTree, parent: NodeId, element: Matroska) -> Result<Option<f64>, EbmlError> {
    tree.child_with_id(parent, element.id())
        .map(|child| tree.element(child).float_value())
        .transpose()
}

impl StreamInfo {
    ///
    /// Collects stream properties from a parsed document.
    ///
    /// # Errors
    ///
    /// Fails with [`EbmlError::MissingElement`] if the document has no `Segment`.
    ///
    pub fn from_tree(tree: &ElementTree) -> Result<StreamInfo, EbmlError> {
        let mut info = StreamInfo::default();

        if let Some(ebml) = tree.root_named(Matroska::Ebml.name()) {
            if let Some(doc_type) = tree.child_with_id(ebml, Matroska::DocType.id()) {
                info.doc_type = Some(tree.element(doc_type).string_value()?.to_owned());
            }
        }

        let segment = tree.root_named(Matroska::Segment.name()).ok_or(EbmlError::MissingElement("Segment"))?;

        if let Some(segment_info) = tree.child_with_id(segment, Matroska::Info.id()) {
            let scale = unsigned_child(tree, segment_info, Matroska::TimestampScale)?.unwrap_or(DEFAULT_TIMESTAMP_SCALE);
            let duration = float_child(tree, segment_info, Matroska::Duration)?.unwrap_or(0.0);
            info.length = duration * scale as f64 / 1e9;
        }

        let tracks = match tree.child_with_id(segment, Matroska::Tracks.id()) {
            Some(tracks) => tracks,
            None => return Ok(info),
        };

        let mut found_audio = false;
        for track in tree.children_with_id(tracks, Matroska::TrackEntry.id()) {
            match unsigned_child(tree, track, Matroska::TrackType)? {
                Some(TRACK_TYPE_VIDEO) => info.has_video = true,
                Some(TRACK_TYPE_AUDIO) if !found_audio => {
                    found_audio = true;
                    info.channels = DEFAULT_CHANNELS;
                    info.sample_rate = DEFAULT_SAMPLING_FREQUENCY;
                    if let Some(audio) = tree.child_with_id(track, Matroska::Audio.id()) {
                        info.channels = unsigned_child(tree, audio, Matroska::Channels)?.unwrap_or(DEFAULT_CHANNELS);
                        info.sample_rate = float_child(tree, audio, Matroska::SamplingFrequency)?
                            .unwrap_or(DEFAULT_SAMPLING_FREQUENCY);
                        info.bits_per_sample = unsigned_child(tree, audio, Matroska::BitDepth)?.unwrap_or(0);
                    }
                },
                _ => {},
            }
        }

        Ok(info)
    }

    pub fn is_webm(&self) -> bool {
        self.doc_type.as_deref() == Some("webm")
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} channel EBML ({}) @ {} bits, {} Hz, {:.2} seconds",
            self.channels,
            self.doc_type.as_deref().unwrap_or("unknown"),
            self.bits_per_sample,
            self.sample_rate as u64,
            self.length
        )
    }
}
