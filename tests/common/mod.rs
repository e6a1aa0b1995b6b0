#![allow(dead_code)]

use std::io::Cursor;

use ebml_tags::tools::id_bytes;
use ebml_tags::{Matroska, TagMap};

///
/// Minimal-length size vint.
///
pub fn size(len: usize) -> Vec<u8> {
    let len = len as u64;
    for width in 1..=8u32 {
        if len < (1u64 << (7 * width)) - 1 {
            let marked = len | (1u64 << (7 * width));
            return marked.to_be_bytes()[(8 - width as usize)..].to_vec();
        }
    }
    panic!("size {} too large for a test fixture", len);
}

pub fn element(id: Matroska, payload: &[u8]) -> Vec<u8> {
    raw_element(id.id(), payload)
}

pub fn raw_element(id: u64, payload: &[u8]) -> Vec<u8> {
    let mut bytes = id_bytes(id);
    bytes.extend(size(payload.len()));
    bytes.extend_from_slice(payload);
    bytes
}

pub fn master(id: Matroska, children: &[Vec<u8>]) -> Vec<u8> {
    element(id, &children.concat())
}

/// A master with the unknown-size marker, running until something ends it.
pub fn unknown_size_master(id: Matroska, children: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = id_bytes(id.id());
    bytes.push(0xFF);
    bytes.extend(children.concat());
    bytes
}

pub fn uint(id: Matroska, value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    element(id, &bytes[first..])
}

pub fn float(id: Matroska, value: f64) -> Vec<u8> {
    element(id, &value.to_be_bytes())
}

pub fn text(id: Matroska, value: &str) -> Vec<u8> {
    element(id, value.as_bytes())
}

/// A Void of exactly `total` bytes (`total` must be 2..=128).
pub fn void(total: usize) -> Vec<u8> {
    assert!((2..=128).contains(&total));
    element(Matroska::Void, &vec![0; total - 2])
}

pub fn ebml_header(doc_type: &str) -> Vec<u8> {
    master(
        Matroska::Ebml,
        &[
            uint(Matroska::EbmlVersion, 1),
            uint(Matroska::EbmlReadVersion, 1),
            text(Matroska::DocType, doc_type),
            uint(Matroska::DocTypeVersion, 4),
            uint(Matroska::DocTypeReadVersion, 2),
        ],
    )
}

pub fn document(segment_children: &[Vec<u8>]) -> Vec<u8> {
    let mut bytes = ebml_header("matroska");
    bytes.extend(master(Matroska::Segment, segment_children));
    bytes
}

pub fn targets(target_type_value: u64) -> Vec<u8> {
    master(Matroska::Targets, &[uint(Matroska::TargetTypeValue, target_type_value)])
}

pub fn simple_tag(name: &str, value: &str) -> Vec<u8> {
    master(Matroska::SimpleTag, &[text(Matroska::TagName, name), text(Matroska::TagString, value)])
}

/// A file-level `Tag` holding the given `SimpleTag`s.
pub fn file_tag(simple_tags: &[Vec<u8>]) -> Vec<u8> {
    let mut children = vec![targets(50)];
    children.extend_from_slice(simple_tags);
    master(Matroska::Tag, &children)
}

pub fn tags(tag_elements: &[Vec<u8>]) -> Vec<u8> {
    master(Matroska::Tags, tag_elements)
}

pub fn info(duration: f64) -> Vec<u8> {
    master(
        Matroska::Info,
        &[uint(Matroska::TimestampScale, 1_000_000), float(Matroska::Duration, duration), text(Matroska::MuxingApp, "test")],
    )
}

pub fn audio_tracks(channels: u64, sampling_frequency: f64, bit_depth: u64) -> Vec<u8> {
    master(
        Matroska::Tracks,
        &[master(
            Matroska::TrackEntry,
            &[
                uint(Matroska::TrackNumber, 1),
                uint(Matroska::TrackType, 2),
                text(Matroska::CodecId, "A_FLAC"),
                master(
                    Matroska::Audio,
                    &[
                        float(Matroska::SamplingFrequency, sampling_frequency),
                        uint(Matroska::Channels, channels),
                        uint(Matroska::BitDepth, bit_depth),
                    ],
                ),
            ],
        )],
    )
}

pub fn cluster(timestamp: u64, block: &[u8]) -> Vec<u8> {
    master(Matroska::Cluster, &[uint(Matroska::Timestamp, timestamp), element(Matroska::SimpleBlock, block)])
}

pub fn load_bytes(bytes: &[u8]) -> TagMap {
    ebml_tags::load(Cursor::new(bytes)).expect("fixture should load").0
}

pub fn save_bytes(bytes: &[u8], map: &TagMap) -> Vec<u8> {
    let mut dest = Vec::new();
    ebml_tags::save(Cursor::new(bytes), &mut dest, map).expect("fixture should save");
    dest
}

pub fn map(entries: &[(&str, &str)]) -> TagMap {
    entries.iter().map(|(key, value)| (*key, *value)).collect()
}

/// Index of the first occurrence of `needle` in `haystack`.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}
