//!
//! The subset of the [Matroska element specification](https://www.matroska.org/technical/elements.html) needed to
//! navigate to tags, read stream properties and keep the segment index consistent.  Everything else in a file is
//! carried as opaque data.
//!

ebml_schema! {
    ///
    /// Matroska/WebM elements known to the tagging engine.  Each variant's discriminant is its element id.
    ///
    pub enum Matroska {
        Ebml: Master = 0x1A45DFA3,
        EbmlVersion: UnsignedInt = 0x4286 in [Ebml],
        EbmlReadVersion: UnsignedInt = 0x42F7 in [Ebml],
        EbmlMaxIdLength: UnsignedInt = 0x42F2 in [Ebml],
        EbmlMaxSizeLength: UnsignedInt = 0x42F3 in [Ebml],
        DocType: String = 0x4282 in [Ebml],
        DocTypeVersion: UnsignedInt = 0x4287 in [Ebml],
        DocTypeReadVersion: UnsignedInt = 0x4285 in [Ebml],

        Void: Binary = 0xEC @global,
        Crc32: Binary = 0xBF @global,

        Segment: Master = 0x18538067,

        SeekHead: Master = 0x114D9B74 in [Segment],
        Seek: Master = 0x4DBB in [Segment, SeekHead],
        SeekId: Binary = 0x53AB in [Segment, SeekHead, Seek],
        SeekPosition: UnsignedInt = 0x53AC in [Segment, SeekHead, Seek],

        Info: Master = 0x1549A966 in [Segment],
        SegmentUuid: Binary = 0x73A4 in [Segment, Info],
        SegmentFilename: Utf8String = 0x7384 in [Segment, Info],
        TimestampScale: UnsignedInt = 0x2AD7B1 in [Segment, Info],
        Duration: Float = 0x4489 in [Segment, Info],
        DateUtc: Date = 0x4461 in [Segment, Info],
        Title: Utf8String = 0x7BA9 in [Segment, Info],
        MuxingApp: Utf8String = 0x4D80 in [Segment, Info],
        WritingApp: Utf8String = 0x5741 in [Segment, Info],

        Cluster: Master = 0x1F43B675 in [Segment],
        Timestamp: UnsignedInt = 0xE7 in [Segment, Cluster],
        SimpleBlock: Binary = 0xA3 in [Segment, Cluster],
        BlockGroup: Master = 0xA0 in [Segment, Cluster],
        Block: Binary = 0xA1 in [Segment, Cluster, BlockGroup],

        Tracks: Master = 0x1654AE6B in [Segment],
        TrackEntry: Master = 0xAE in [Segment, Tracks],
        TrackNumber: UnsignedInt = 0xD7 in [Segment, Tracks, TrackEntry],
        TrackUid: UnsignedInt = 0x73C5 in [Segment, Tracks, TrackEntry],
        TrackType: UnsignedInt = 0x83 in [Segment, Tracks, TrackEntry],
        FlagDefault: UnsignedInt = 0x88 in [Segment, Tracks, TrackEntry],
        Name: Utf8String = 0x536E in [Segment, Tracks, TrackEntry],
        Language: String = 0x22B59C in [Segment, Tracks, TrackEntry],
        CodecId: String = 0x86 in [Segment, Tracks, TrackEntry],
        CodecPrivate: Binary = 0x63A2 in [Segment, Tracks, TrackEntry],
        Video: Master = 0xE0 in [Segment, Tracks, TrackEntry],
        PixelWidth: UnsignedInt = 0xB0 in [Segment, Tracks, TrackEntry, Video],
        PixelHeight: UnsignedInt = 0xBA in [Segment, Tracks, TrackEntry, Video],
        Audio: Master = 0xE1 in [Segment, Tracks, TrackEntry],
        SamplingFrequency: Float = 0xB5 in [Segment, Tracks, TrackEntry, Audio],
        OutputSamplingFrequency: Float = 0x78B5 in [Segment, Tracks, TrackEntry, Audio],
        Channels: UnsignedInt = 0x9F in [Segment, Tracks, TrackEntry, Audio],
        BitDepth: UnsignedInt = 0x6264 in [Segment, Tracks, TrackEntry, Audio],

        Cues: Master = 0x1C53BB6B in [Segment],
        Attachments: Master = 0x1941A469 in [Segment],
        Chapters: Master = 0x1043A770 in [Segment],

        Tags: Master = 0x1254C367 in [Segment],
        Tag: Master = 0x7373 in [Segment, Tags],
        Targets: Master = 0x63C0 in [Segment, Tags, Tag],
        TargetTypeValue: UnsignedInt = 0x68CA in [Segment, Tags, Tag, Targets],
        TargetType: String = 0x63CA in [Segment, Tags, Tag, Targets],
        TagTrackUid: UnsignedInt = 0x63C5 in [Segment, Tags, Tag, Targets],
        TagEditionUid: UnsignedInt = 0x63C9 in [Segment, Tags, Tag, Targets],
        TagChapterUid: UnsignedInt = 0x63C4 in [Segment, Tags, Tag, Targets],
        TagAttachmentUid: UnsignedInt = 0x63C6 in [Segment, Tags, Tag, Targets],
        SimpleTag: Master = 0x67C8 in [Segment, Tags, Tag],
        TagName: Utf8String = 0x45A3 in [Segment, Tags, Tag, SimpleTag],
        TagLanguage: String = 0x447A in [Segment, Tags, Tag, SimpleTag],
        TagLanguageBcp47: String = 0x447B in [Segment, Tags, Tag, SimpleTag],
        TagDefault: UnsignedInt = 0x4484 in [Segment, Tags, Tag, SimpleTag],
        TagString: Utf8String = 0x4487 in [Segment, Tags, Tag, SimpleTag],
        TagBinary: Binary = 0x4485 in [Segment, Tags, Tag, SimpleTag],
    }
}

impl Matroska {
    ///
    /// `Targets` children that scope a `Tag` to a specific track, edition, chapter or attachment.
    ///
    pub const TARGET_ENTITIES: [Matroska; 4] = [
        Matroska::TagTrackUid,
        Matroska::TagEditionUid,
        Matroska::TagChapterUid,
        Matroska::TagAttachmentUid,
    ];

    ///
    /// Segment children that are large or irrelevant to tagging.  Parsing with these as opaque ids keeps media
    /// data on disk.
    ///
    pub const BULK_ELEMENTS: [Matroska; 4] = [
        Matroska::Cluster,
        Matroska::Cues,
        Matroska::Chapters,
        Matroska::Attachments,
    ];
}
