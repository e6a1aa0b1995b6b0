use std::cell::OnceCell;
use std::convert::TryFrom;
use std::fmt;

use ebml_tags_specification::ElementKind;

use crate::errors::EbmlError;
use crate::tools::{self, EbmlSize};

///
/// Index of an [`Element`] inside an [`ElementTree`](crate::ElementTree).
///
/// Ids are only meaningful for the tree that issued them.  Elements are never removed from the arena, so an id stays
/// valid for the lifetime of its tree even after the element is unlinked.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

///
/// A byte range in the source document.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Span {
    pub offset: u64,
    pub len: u64,
}

impl Span {
    pub fn new(offset: u64, len: u64) -> Self {
        Span { offset, len }
    }

    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

///
/// A decoded leaf value.  The variant always matches the [`ElementKind`] of the element holding it.
///
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    UnsignedInt(u64),
    String(String),
    Utf8String(String),
    Binary(Vec<u8>),
    Float(f64),
    /// Nanoseconds since 2001-01-01T00:00:00 UTC.
    Date(i64),
}

impl Value {
    pub fn kind(&self) -> ElementKind {
        match self {
            Value::UnsignedInt(_) => ElementKind::UnsignedInt,
            Value::String(_) => ElementKind::String,
            Value::Utf8String(_) => ElementKind::Utf8String,
            Value::Binary(_) => ElementKind::Binary,
            Value::Float(_) => ElementKind::Float,
            Value::Date(_) => ElementKind::Date,
        }
    }

    ///
    /// Decodes a payload according to the element kind.
    ///
    pub(crate) fn decode(id: u64, kind: ElementKind, data: &[u8]) -> Result<Value, EbmlError> {
        let invalid = |reason: String| EbmlError::InvalidPayload { id, kind, reason };

        match kind {
            ElementKind::Master => Err(EbmlError::KindMismatch { id, requested: ElementKind::Binary, actual: kind }),
            ElementKind::UnsignedInt => tools::arr_to_u64(data)
                .map(Value::UnsignedInt)
                .map_err(|e| invalid(e.to_string())),
            ElementKind::Float => tools::arr_to_f64(data)
                .map(Value::Float)
                .map_err(|e| invalid(e.to_string())),
            ElementKind::Date => match data.len() {
                0 => Ok(Value::Date(0)),
                8 => {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(data);
                    Ok(Value::Date(i64::from_be_bytes(bytes)))
                },
                len => Err(invalid(format!("dates are 0 or 8 bytes, found {}", len))),
            },
            ElementKind::String | ElementKind::Utf8String => {
                let trimmed = match data.iter().rposition(|b| *b != 0) {
                    Some(last) => &data[..=last],
                    None => &[][..],
                };
                let text = std::str::from_utf8(trimmed).map_err(|e| invalid(e.to_string()))?.to_owned();
                if kind == ElementKind::String {
                    Ok(Value::String(text))
                } else {
                    Ok(Value::Utf8String(text))
                }
            },
            ElementKind::Binary => Ok(Value::Binary(data.to_vec())),
        }
    }

    ///
    /// Encodes the value as an element payload.
    ///
    /// `width` is the payload length the element had in the source.  Integers and floats keep that width when the
    /// value still fits.
    ///
    pub(crate) fn encode(&self, id: u64, width: Option<usize>) -> Result<Vec<u8>, EbmlError> {
        match self {
            Value::UnsignedInt(val) => Ok(tools::u64_to_arr(*val, width)),
            Value::Float(val) => Ok(tools::f64_to_arr(*val, width)),
            Value::Date(val) => Ok(val.to_be_bytes().to_vec()),
            Value::String(text) => {
                if !text.is_ascii() {
                    return Err(EbmlError::UnencodableValue {
                        id,
                        reason: format!("{:?} is not ASCII text", text),
                    });
                }
                Ok(text.as_bytes().to_vec())
            },
            Value::Utf8String(text) => Ok(text.as_bytes().to_vec()),
            Value::Binary(data) => Ok(data.clone()),
        }
    }
}

///
/// One EBML element.
///
/// Elements read from a source remember where they came from (`origin` for the whole element, `raw_span` for the
/// payload) so that unmodified regions can be copied back verbatim.  Leaf payloads are decoded on first access and
/// the decoded value is cached.
///
#[derive(Clone, Debug)]
pub struct Element {
    pub(crate) id: u64,
    pub(crate) kind: ElementKind,
    pub(crate) size: EbmlSize,
    pub(crate) size_width: Option<usize>,
    pub(crate) origin: Option<Span>,
    pub(crate) raw_span: Option<Span>,
    pub(crate) raw: Option<Vec<u8>>,
    pub(crate) payload_width: Option<usize>,
    pub(crate) value: OnceCell<Value>,
    pub(crate) opaque: bool,
    pub(crate) children: Vec<NodeId>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) dirty: bool,
}

impl Element {
    pub(crate) fn new_master(id: u64) -> Self {
        Element {
            id,
            kind: ElementKind::Master,
            size: EbmlSize::Known(0),
            size_width: None,
            origin: None,
            raw_span: None,
            raw: None,
            payload_width: None,
            value: OnceCell::new(),
            opaque: false,
            children: Vec::new(),
            parent: None,
            dirty: true,
        }
    }

    ///
    /// An element read from a source.  The header starts at `position` and the payload occupies `payload`.
    ///
    pub(crate) fn parsed(id: u64, kind: ElementKind, size: EbmlSize, size_width: usize, position: u64, payload: Span) -> Self {
        Element {
            id,
            kind,
            size,
            size_width: Some(size_width),
            origin: Some(Span::new(position, payload.end() - position)),
            raw_span: Some(payload),
            raw: None,
            payload_width: usize::try_from(payload.len).ok(),
            value: OnceCell::new(),
            opaque: false,
            children: Vec::new(),
            parent: None,
            dirty: false,
        }
    }

    pub(crate) fn new_leaf(id: u64, value: Value) -> Self {
        Element {
            id,
            kind: value.kind(),
            size: EbmlSize::Known(0),
            size_width: None,
            origin: None,
            raw_span: None,
            raw: None,
            payload_width: None,
            value: OnceCell::from(value),
            opaque: false,
            children: Vec::new(),
            parent: None,
            dirty: true,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    ///
    /// The payload size declared in the source.  Elements created in memory report `Known(0)` until written.
    ///
    pub fn size(&self) -> EbmlSize {
        self.size
    }

    ///
    /// The bytes this element occupied in the source, header included.
    ///
    pub fn origin(&self) -> Option<Span> {
        self.origin
    }

    ///
    /// The undecoded payload in the source.  Cleared once a new value is set.
    ///
    pub fn raw_span(&self) -> Option<Span> {
        self.raw_span
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_master(&self) -> bool {
        self.kind.is_master()
    }

    ///
    /// Whether this master's children were skipped while parsing.  Opaque masters are carried as a single span.
    ///
    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    ///
    /// Returns whether the payload is available for decoding without going back to the source.
    ///
    pub fn is_loaded(&self) -> bool {
        self.value.get().is_some() || self.raw.is_some()
    }

    ///
    /// Decodes (once) and returns the value of a leaf element.  Returns `None` for masters.
    ///
    /// # Errors
    ///
    /// Fails with [`EbmlError::PayloadNotLoaded`] if the payload was left on disk while parsing and has not been read
    /// back with [`ElementTree::load_payloads`](crate::ElementTree::load_payloads), or with
    /// [`EbmlError::InvalidPayload`] if the stored bytes are not valid for the element kind.
    ///
    pub fn value(&self) -> Result<Option<&Value>, EbmlError> {
        if self.is_master() {
            return Ok(None);
        }
        if let Some(value) = self.value.get() {
            return Ok(Some(value));
        }

        let decoded = match &self.raw {
            Some(raw) => Value::decode(self.id, self.kind, raw)?,
            None => {
                let size = self.raw_span.map(|span| span.len).unwrap_or(0);
                return Err(EbmlError::PayloadNotLoaded { id: self.id, size });
            },
        };
        Ok(Some(self.value.get_or_init(|| decoded)))
    }

    fn mismatch(&self, requested: ElementKind) -> EbmlError {
        EbmlError::KindMismatch { id: self.id, requested, actual: self.kind }
    }

    ///
    /// Returns the text of a `String` or `UTF-8` element.
    ///
    pub fn string_value(&self) -> Result<&str, EbmlError> {
        match self.value()? {
            Some(Value::String(text)) | Some(Value::Utf8String(text)) => Ok(text),
            _ => Err(self.mismatch(ElementKind::Utf8String)),
        }
    }

    pub fn binary_value(&self) -> Result<&[u8], EbmlError> {
        match self.value()? {
            Some(Value::Binary(data)) => Ok(data),
            _ => Err(self.mismatch(ElementKind::Binary)),
        }
    }

    pub fn unsigned_value(&self) -> Result<u64, EbmlError> {
        match self.value()? {
            Some(Value::UnsignedInt(val)) => Ok(*val),
            _ => Err(self.mismatch(ElementKind::UnsignedInt)),
        }
    }

    pub fn float_value(&self) -> Result<f64, EbmlError> {
        match self.value()? {
            Some(Value::Float(val)) => Ok(*val),
            _ => Err(self.mismatch(ElementKind::Float)),
        }
    }

    pub fn date_value(&self) -> Result<i64, EbmlError> {
        match self.value()? {
            Some(Value::Date(val)) => Ok(*val),
            _ => Err(self.mismatch(ElementKind::Date)),
        }
    }

    ///
    /// Replaces the value of a leaf element.
    ///
    /// Returns `Ok(false)` and leaves the element untouched when the new value equals the current one.  Otherwise the
    /// raw payload is dropped and the element is marked dirty so it is re-encoded on save.
    ///
    pub fn set_value(&mut self, value: Value) -> Result<bool, EbmlError> {
        if value.kind() != self.kind {
            return Err(self.mismatch(value.kind()));
        }
        if let Ok(Some(current)) = self.value() {
            if *current == value {
                return Ok(false);
            }
        }

        self.value = OnceCell::from(value);
        self.raw = None;
        self.raw_span = None;
        self.dirty = true;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(id: u64, kind: ElementKind, raw: &[u8]) -> Element {
        let mut element = Element::new_leaf(id, Value::Binary(vec![]));
        element.kind = kind;
        element.value = OnceCell::new();
        element.raw = Some(raw.to_vec());
        element.payload_width = Some(raw.len());
        element.dirty = false;
        element
    }

    #[test]
    fn decode_is_lazy_and_cached() {
        let element = loaded(0x4487, ElementKind::Utf8String, b"Foo\0\0");
        assert!(element.value.get().is_none());
        assert_eq!("Foo", element.string_value().unwrap());
        assert!(element.value.get().is_some());
    }

    #[test]
    fn empty_payloads_decode_to_defaults() {
        assert_eq!(0, loaded(0x68CA, ElementKind::UnsignedInt, &[]).unsigned_value().unwrap());
        assert_eq!(0.0, loaded(0x4489, ElementKind::Float, &[]).float_value().unwrap());
        assert_eq!("", loaded(0x4487, ElementKind::Utf8String, &[]).string_value().unwrap());
        assert_eq!(0, loaded(0x4461, ElementKind::Date, &[]).date_value().unwrap());
    }

    #[test]
    fn invalid_utf8_is_reported() {
        let element = loaded(0x4487, ElementKind::Utf8String, &[0xff, 0xfe]);
        assert!(matches!(element.string_value(), Err(EbmlError::InvalidPayload { id: 0x4487, .. })));
    }

    #[test]
    fn accessor_kind_mismatch() {
        let element = loaded(0x68CA, ElementKind::UnsignedInt, &[50]);
        assert!(matches!(
            element.string_value(),
            Err(EbmlError::KindMismatch { actual: ElementKind::UnsignedInt, .. })
        ));
    }

    #[test]
    fn unloaded_payload_cannot_be_decoded() {
        let mut element = loaded(0xA3, ElementKind::Binary, &[]);
        element.raw = None;
        element.raw_span = Some(Span::new(100, 4096));
        assert!(matches!(element.value(), Err(EbmlError::PayloadNotLoaded { size: 4096, .. })));
    }

    #[test]
    fn setting_equal_value_keeps_element_clean() {
        let mut element = loaded(0x4487, ElementKind::Utf8String, b"Foo");
        assert!(!element.set_value(Value::Utf8String(String::from("Foo"))).unwrap());
        assert!(!element.is_dirty());

        assert!(element.set_value(Value::Utf8String(String::from("Bar"))).unwrap());
        assert!(element.is_dirty());
        assert!(element.raw.is_none());
        assert_eq!("Bar", element.string_value().unwrap());
    }

    #[test]
    fn setting_wrong_kind_fails() {
        let mut element = loaded(0x4487, ElementKind::Utf8String, b"Foo");
        assert!(element.set_value(Value::Binary(vec![1])).is_err());
        assert!(!element.is_dirty());
    }

    #[test]
    fn ascii_strings_reject_other_text() {
        let value = Value::String(String::from("und\u{e9}"));
        assert!(matches!(value.encode(0x447A, None), Err(EbmlError::UnencodableValue { id: 0x447A, .. })));
        assert_eq!(b"und".to_vec(), Value::String(String::from("und")).encode(0x447A, None).unwrap());
    }

    #[test]
    fn unsigned_keeps_width() {
        let value = Value::UnsignedInt(50);
        assert_eq!(vec![0, 50], value.encode(0x68CA, Some(2)).unwrap());
        assert_eq!(vec![50], value.encode(0x68CA, None).unwrap());
    }
}
