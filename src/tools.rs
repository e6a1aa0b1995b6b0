//!
//! Contains the vint codec and the fixed width number helpers used to read and write EBML data.
//!

use std::convert::TryInto;

use super::errors::tool::ToolError;

///
/// The size of an element's payload.
///
/// A size vint with every data bit set is reserved to mean "unknown", which is used for streamed containers whose
/// end is found by parsing.
///
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum EbmlSize {
    Known(u64),
    Unknown,
}

impl EbmlSize {
    pub fn new(size: u64, vint_length: usize) -> Self {
        if size == all_ones(vint_length) {
            EbmlSize::Unknown
        } else {
            EbmlSize::Known(size)
        }
    }

    ///
    /// Reads a size vint from the beginning of the buffer.  Returns the size and the number of bytes consumed.
    ///
    pub fn read(buffer: &[u8]) -> Result<(EbmlSize, usize), ToolError> {
        let (value, length) = read_vint(buffer)?;
        Ok((EbmlSize::new(value, length), length))
    }

    ///
    /// Encodes the unknown size marker using `length` bytes.
    ///
    pub fn unknown_marker(length: usize) -> Vec<u8> {
        let length = length.clamp(1, 8);
        as_vint_no_check_u64(all_ones(length), length)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, EbmlSize::Known(_))
    }

    pub fn value(&self) -> Option<u64> {
        match self {
            EbmlSize::Known(size) => Some(*size),
            EbmlSize::Unknown => None,
        }
    }
}

#[inline]
fn all_ones(length: usize) -> u64 {
    (1u64 << (7 * length)) - 1
}

///
/// Largest value a vint of `length` bytes can hold.  The all-ones pattern is reserved for [`EbmlSize::Unknown`].
///
#[inline]
pub fn max_vint_value(length: usize) -> u64 {
    all_ones(length) - 1
}

///
/// Trait to enable easy serialization to a vint.
///
/// This is only available for types that can be cast as `u64`.
///
pub trait Vint: Into<u64> + Copy {
    ///
    /// Returns a representation of the current value as a vint array using the fewest bytes possible.
    ///
    /// # Errors
    ///
    /// This can return an error if the value is too large to be representable as a vint.
    ///
    fn as_vint(&self) -> Result<Vec<u8>, ToolError> {
        let val: u64 = (*self).into();
        let length = vint_length(val)?;
        Ok(as_vint_no_check_u64(val, length))
    }

    ///
    /// Returns a representation of the current value as a vint array with a specified length.
    ///
    /// Fixed lengths are used to re-encode a size without shifting the bytes that follow it.
    ///
    /// # Errors
    ///
    /// This can return an error if the value does not fit in `length` bytes.
    ///
    fn as_vint_with_length(&self, length: usize) -> Result<Vec<u8>, ToolError> {
        let val: u64 = (*self).into();
        check_size_u64(val, length)?;
        Ok(as_vint_no_check_u64(val, length))
    }
}

impl Vint for u64 { }
impl Vint for u32 { }
impl Vint for u16 { }
impl Vint for u8 { }

///
/// Returns the smallest vint length able to hold `val`.
///
pub fn vint_length(val: u64) -> Result<usize, ToolError> {
    (1..=8)
        .find(|length| val <= max_vint_value(*length))
        .ok_or(ToolError::WriteVintOverflow { value: val, length: 8 })
}

#[inline]
fn check_size_u64(val: u64, length: usize) -> Result<(), ToolError> {
    if length == 0 || length > 8 || val > max_vint_value(length) {
        Err(ToolError::WriteVintOverflow { value: val, length })
    } else {
        Ok(())
    }
}

#[inline]
fn as_vint_no_check_u64(val: u64, length: usize) -> Vec<u8> {
    let bytes: [u8; 8] = val.to_be_bytes();
    let mut result: Vec<u8> = Vec::from(&bytes[(8-length)..]);
    result[0] |= 1 << (8 - length);
    result
}

///
/// Reads a vint from the beginning of the input array slice.
///
/// The returned tuple contains the value of the vint (`u64`, with the length marker masked off) and the length of
/// the vint (`usize`).
///
/// # Errors
///
/// This method returns a `ToolError` if the first byte carries no length marker or if the buffer ends before the
/// vint does.
///
pub fn read_vint(buffer: &[u8]) -> Result<(u64, usize), ToolError> {
    if buffer.is_empty() {
        return Err(ToolError::ReadVintTruncated { needed: 1, available: 0 });
    }

    if buffer[0] == 0 {
        return Err(ToolError::ReadVintOverflow)
    }

    let length = 8 - buffer[0].ilog2() as usize;

    if length > buffer.len() {
        return Err(ToolError::ReadVintTruncated { needed: length, available: buffer.len() });
    }

    let mut value = buffer[0] as u64;
    value -= 1 << (8 - length);

    for item in buffer.iter().take(length).skip(1) {
        value <<= 8;
        value += *item as u64;
    }

    Ok((value, length))
}

///
/// Reads an element id from the beginning of the input array slice.
///
/// Element ids keep their length marker, so the id of the EBML header reads as `0x1A45DFA3`.  The returned tuple
/// contains the id and the number of bytes consumed.
///
pub fn read_element_id(buffer: &[u8]) -> Result<(u64, usize), ToolError> {
    let (value, length) = read_vint(buffer)?;
    if length > 4 {
        return Err(ToolError::ReadIdOverflow(length));
    }
    Ok((value + (1 << (7 * length)), length))
}

///
/// Returns the encoded bytes of an element id.
///
pub fn id_bytes(id: u64) -> Vec<u8> {
    id.to_be_bytes().iter().skip_while(|&v| *v == 0u8).copied().collect()
}

///
/// Reads a `u64` value from any length array slice.
///
/// Rather than forcing the input to be a `[u8; 8]` like standard library methods, this can interpret a `u64` from a slice of any length <= 8.  Bytes are big endian - i.e. an array of `[4, 0]` would return a value of `1024`.  An empty slice reads as `0`.
///
/// # Errors
///
/// This method will return an error if the input slice has a length > 8.
///
/// ## Example
///
/// ```
/// # use ebml_tags::tools::arr_to_u64;
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let result = arr_to_u64(&[16,0])?;
/// assert_eq!(result, 4096);
/// # Ok(())
/// # }
/// ```
///
pub fn arr_to_u64(arr: &[u8]) -> Result<u64, ToolError> {
    if arr.len() > 8 {
        return Err(ToolError::ReadU64Overflow(Vec::from(arr)));
    }

    let mut val = 0u64;
    for byte in arr {
        val *= 256;
        val += *byte as u64;
    }
    Ok(val)
}

///
/// Reads an `f64` value from an array slice of length 0, 4 or 8.
///
/// This method wraps `f32` and `f64` conversions from big endian byte arrays and casts the result as an `f64`.  An empty slice reads as `0.0`.
///
/// # Errors
///
/// This method will return an error if the input slice length is not 0, 4 or 8.
///
pub fn arr_to_f64(arr: &[u8]) -> Result<f64, ToolError> {
    match arr.len() {
        0 => Ok(0.0),
        4 => {
            let bytes: [u8; 4] = arr.try_into().map_err(|_| ToolError::ReadF64Mismatch(Vec::from(arr)))?;
            Ok(f32::from_be_bytes(bytes) as f64)
        },
        8 => {
            let bytes: [u8; 8] = arr.try_into().map_err(|_| ToolError::ReadF64Mismatch(Vec::from(arr)))?;
            Ok(f64::from_be_bytes(bytes))
        },
        _ => Err(ToolError::ReadF64Mismatch(Vec::from(arr))),
    }
}

///
/// Encodes an unsigned integer payload.
///
/// When `width` is given and the value fits, that many bytes are used so a rewritten element keeps its length.
/// Otherwise the value is written using 1, 2, 4 or 8 bytes.
///
pub fn u64_to_arr(val: u64, width: Option<usize>) -> Vec<u8> {
    let bytes = val.to_be_bytes();
    if let Some(width) = width {
        if width <= 8 && (width == 8 || val < (1u64 << (8 * width))) {
            return Vec::from(&bytes[(8 - width)..]);
        }
    }

    let width = if val <= u8::MAX as u64 {
        1
    } else if val <= u16::MAX as u64 {
        2
    } else if val <= u32::MAX as u64 {
        4
    } else {
        8
    };
    Vec::from(&bytes[(8 - width)..])
}

///
/// Encodes a float payload.  A 4 byte width is kept only when the value survives the round trip through `f32`.
///
pub fn f64_to_arr(val: f64, width: Option<usize>) -> Vec<u8> {
    if width == Some(4) && (val as f32) as f64 == val {
        (val as f32).to_be_bytes().to_vec()
    } else {
        val.to_be_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_vint_sixteen() {
        let buffer = [144];
        let result = read_vint(&buffer).expect("Reading vint failed");

        assert_eq!(16, result.0);
        assert_eq!(1, result.1);
    }

    #[test]
    fn write_vint_sixteen() {
        let result = 16u64.as_vint().expect("Writing vint failed");
        assert_eq!(vec![144u8], result);
    }

    #[test]
    fn read_vint_one_twenty_seven_is_unknown_size() {
        let buffer = [255u8];
        let (size, length) = EbmlSize::read(&buffer).expect("Reading vint failed");

        assert_eq!(EbmlSize::Unknown, size);
        assert_eq!(1, length);
    }

    #[test]
    fn write_vint_one_twenty_seven_uses_two_bytes() {
        let result = 127u64.as_vint().expect("Writing vint failed");
        assert_eq!(vec![0x40u8, 0x7f], result);
    }

    #[test]
    fn read_vint_two_hundred() {
        let buffer = [64, 200];
        let result = read_vint(&buffer).expect("Reading vint failed");

        assert_eq!(200, result.0);
        assert_eq!(2, result.1);
    }

    #[test]
    fn write_vint_two_hundred() {
        let result = 200u64.as_vint().expect("Writing vint failed");
        assert_eq!(vec![64u8, 200u8], result);
    }

    #[test]
    fn read_id_for_ebml_header() {
        let buffer = [0x1a, 0x45, 0xdf, 0xa3];
        let result = read_element_id(&buffer).expect("Reading id failed");

        assert_eq!(0x1a45dfa3, result.0);
        assert_eq!(4, result.1);
        assert_eq!(buffer.to_vec(), id_bytes(result.0));
    }

    #[test]
    fn read_id_rejects_five_bytes() {
        let buffer = [0x08, 0, 0, 0, 1];
        assert_eq!(Err(ToolError::ReadIdOverflow(5)), read_element_id(&buffer));
    }

    #[test]
    fn read_vint_very_long() {
        let buffer = [1, 0, 0, 0, 0, 0, 0, 1];
        let result = read_vint(&buffer).expect("Reading vint failed");

        assert_eq!(1, result.0);
        assert_eq!(8, result.1);
    }

    #[test]
    fn write_vint_very_long() {
        let result = 1u64.as_vint_with_length(8).expect("Writing vint failed");
        assert_eq!(vec![1, 0, 0, 0, 0, 0, 0, 1], result);
    }

    #[test]
    fn read_vint_truncated() {
        let buffer = [1, 0, 0, 0];
        let result = read_vint(&buffer);

        assert_eq!(Err(ToolError::ReadVintTruncated { needed: 8, available: 4 }), result);
    }

    #[test]
    fn read_vint_zero_first_byte() {
        assert_eq!(Err(ToolError::ReadVintOverflow), read_vint(&[0, 1]));
    }

    #[test]
    fn too_big_for_vint() {
        assert!((1u64 << 56).as_vint().is_err());
        assert!(200u64.as_vint_with_length(1).is_err());
    }

    #[test]
    fn vint_round_trip_every_length() {
        for length in 1..=8 {
            for val in [0, 1, max_vint_value(length) / 2, max_vint_value(length)] {
                let bytes = val.as_vint_with_length(length).unwrap();
                assert_eq!(length, bytes.len());
                let (decoded, read_length) = read_vint(&bytes).unwrap();
                assert_eq!(val, decoded);
                assert_eq!(length, read_length);
                assert_eq!(EbmlSize::Known(val), EbmlSize::new(decoded, read_length));
            }
        }
    }

    #[test]
    fn unknown_size_marker_round_trip() {
        for length in 1..=8 {
            let marker = EbmlSize::unknown_marker(length);
            assert_eq!(length, marker.len());
            let (size, read_length) = EbmlSize::read(&marker).unwrap();
            assert_eq!(EbmlSize::Unknown, size);
            assert_eq!(marker, EbmlSize::unknown_marker(read_length));
        }
    }

    #[test]
    fn vint_encode_decode_range() {
        for val in 0..500_000u64 {
            let bytes = val.as_vint().unwrap();
            let result = read_vint(bytes.as_slice()).unwrap().0;
            assert_eq!(val, result);
        }
    }

    #[test]
    fn read_u64_values() {
        let mut buffer = vec![];
        let mut expected = 0;
        for _ in 0..8 {
            buffer.push(0x25);
            expected = (expected << 8) + 0x25;

            let result = arr_to_u64(&buffer).unwrap();
            assert_eq!(expected, result);
        }
        assert!(arr_to_u64(&[0; 9]).is_err());
    }

    #[test]
    fn write_u64_respects_width() {
        assert_eq!(vec![0x00, 0x00, 0x2a], u64_to_arr(42, Some(3)));
        assert_eq!(vec![0x2a], u64_to_arr(42, None));
        assert_eq!(vec![0x01, 0x00], u64_to_arr(256, Some(1)));
        assert_eq!(Vec::<u8>::new(), u64_to_arr(0, Some(0)));
    }

    #[test]
    fn float_widths() {
        assert_eq!(4, f64_to_arr(48000.0, Some(4)).len());
        assert_eq!(8, f64_to_arr(0.1, Some(4)).len());
        assert_eq!(48000.0, arr_to_f64(&f64_to_arr(48000.0, Some(4))).unwrap());
        assert!(arr_to_f64(&[0, 0, 0]).is_err());
    }
}
