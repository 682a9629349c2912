// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

Variable-width numeric arrays.

Independent-variable arrays record their element width and whether the
elements are real numbers, and leave it to the reader to pick the matching
layout. Only a fixed set of combinations is meaningful; anything else is
rejected rather than guessed at.

*/

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

use crate::MudError;

/// Whether an array holds integers or real numbers.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum ElementKind {
    Integer,
    Real,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.pad(match *self {
            ElementKind::Integer => "integer",
            ElementKind::Real => "real",
        })
    }
}

/// A concrete in-file layout of one numeric element.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub enum NumericLayout {
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    /// The x87 80-bit extended-precision format.
    Float80,
}

/// A decoded array. Integers are widened to `i64` and reals to `f64`.
#[derive(Clone, Debug, PartialEq)]
pub enum NumericArray {
    Integer(Vec<i64>),
    Real(Vec<f64>),
}

impl NumericLayout {
    /// Resolve an element width (in bytes) and kind to a layout.
    pub fn resolve(elem_size: usize, kind: ElementKind) -> Result<Self, MudError> {
        match (kind, elem_size) {
            (ElementKind::Integer, 1) => Ok(NumericLayout::Int8),
            (ElementKind::Integer, 2) => Ok(NumericLayout::Int16),
            (ElementKind::Integer, 4) => Ok(NumericLayout::Int32),
            (ElementKind::Integer, 8) => Ok(NumericLayout::Int64),
            (ElementKind::Real, 4) => Ok(NumericLayout::Float32),
            (ElementKind::Real, 8) => Ok(NumericLayout::Float64),
            (ElementKind::Real, 10) => Ok(NumericLayout::Float80),
            (kind, size) => Err(MudError::UnsupportedWidth { size, kind }),
        }
    }

    pub fn size(&self) -> usize {
        match *self {
            NumericLayout::Int8 => 1,
            NumericLayout::Int16 => 2,
            NumericLayout::Int32 => 4,
            NumericLayout::Int64 => 8,
            NumericLayout::Float32 => 4,
            NumericLayout::Float64 => 8,
            NumericLayout::Float80 => 10,
        }
    }

    pub fn kind(&self) -> ElementKind {
        match *self {
            NumericLayout::Int8
            | NumericLayout::Int16
            | NumericLayout::Int32
            | NumericLayout::Int64 => ElementKind::Integer,
            NumericLayout::Float32 | NumericLayout::Float64 | NumericLayout::Float80 => {
                ElementKind::Real
            }
        }
    }

    /// Decode exactly *count* elements from the front of *buf*.
    ///
    /// Trailing bytes beyond the requested elements are ignored, but a buffer
    /// that is too short is an error.
    pub fn decode(&self, buf: &[u8], count: usize) -> Result<NumericArray, MudError> {
        let size = self.size();
        let expected = size * count;

        if buf.len() < expected {
            return Err(MudError::LengthMismatch {
                expected,
                actual: buf.len(),
            });
        }

        let chunks = buf[..expected].chunks(size);

        Ok(match *self {
            NumericLayout::Int8 => NumericArray::Integer(chunks.map(|c| c[0] as i8 as i64).collect()),
            NumericLayout::Int16 => {
                NumericArray::Integer(chunks.map(|c| LittleEndian::read_i16(c) as i64).collect())
            }
            NumericLayout::Int32 => {
                NumericArray::Integer(chunks.map(|c| LittleEndian::read_i32(c) as i64).collect())
            }
            NumericLayout::Int64 => NumericArray::Integer(chunks.map(LittleEndian::read_i64).collect()),
            NumericLayout::Float32 => {
                NumericArray::Real(chunks.map(|c| LittleEndian::read_f32(c) as f64).collect())
            }
            NumericLayout::Float64 => NumericArray::Real(chunks.map(LittleEndian::read_f64).collect()),
            NumericLayout::Float80 => NumericArray::Real(chunks.map(f80_to_f64).collect()),
        })
    }

    /// Encode integers in this layout. Values that do not fit are an error.
    pub fn encode_integers(&self, values: &[i64], dest: &mut Vec<u8>) -> Result<(), MudError> {
        let mut buf = [0u8; 8];

        for &v in values {
            let fits = match *self {
                NumericLayout::Int8 => (i8::MIN as i64) <= v && v <= (i8::MAX as i64),
                NumericLayout::Int16 => (i16::MIN as i64) <= v && v <= (i16::MAX as i64),
                NumericLayout::Int32 => (i32::MIN as i64) <= v && v <= (i32::MAX as i64),
                NumericLayout::Int64 => true,
                _ => {
                    return Err(MudError::UnsupportedWidth {
                        size: self.size(),
                        kind: ElementKind::Integer,
                    })
                }
            };

            if !fits {
                return Err(MudError::Format(format!(
                    "value {v} does not fit in a {}-byte integer",
                    self.size()
                )));
            }

            LittleEndian::write_i64(&mut buf, v);
            // Little-endian truncation keeps the low-order bytes.
            dest.extend_from_slice(&buf[..self.size()]);
        }

        Ok(())
    }

    /// Encode reals in this layout. 32-bit output is rounded.
    pub fn encode_reals(&self, values: &[f64], dest: &mut Vec<u8>) -> Result<(), MudError> {
        for &v in values {
            match *self {
                NumericLayout::Float32 => dest.extend_from_slice(&(v as f32).to_le_bytes()),
                NumericLayout::Float64 => dest.extend_from_slice(&v.to_le_bytes()),
                NumericLayout::Float80 => dest.extend_from_slice(&f64_to_f80(v)),
                _ => {
                    return Err(MudError::UnsupportedWidth {
                        size: self.size(),
                        kind: ElementKind::Real,
                    })
                }
            }
        }

        Ok(())
    }
}

const F80_EXP_BIAS: i32 = 16383;
const F64_EXP_BIAS: i32 = 1023;

/// Convert a little-endian x87 extended-precision value to the nearest `f64`.
pub fn f80_to_f64(bytes: &[u8]) -> f64 {
    let mantissa = LittleEndian::read_u64(&bytes[..8]);
    let sign_exp = LittleEndian::read_u16(&bytes[8..10]);
    let negative = sign_exp & 0x8000 != 0;
    let exp = (sign_exp & 0x7fff) as i32;

    let magnitude = if exp == 0x7fff {
        if mantissa << 1 == 0 {
            f64::INFINITY
        } else {
            f64::NAN
        }
    } else if mantissa == 0 {
        0.0
    } else {
        // The mantissa carries an explicit integer bit, so its value is
        // mantissa × 2^(exp - bias - 63). Scale in steps to stay in range.
        let mut v = mantissa as f64;
        let mut e = exp - F80_EXP_BIAS - 63;

        while e > 1000 {
            v *= 2f64.powi(1000);
            e -= 1000;
        }

        while e < -1000 {
            v *= 2f64.powi(-1000);
            e += 1000;
        }

        v * 2f64.powi(e)
    };

    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Convert an `f64` to little-endian x87 extended precision. Exact.
pub fn f64_to_f80(v: f64) -> [u8; 10] {
    let bits = v.to_bits();
    let negative = bits >> 63 != 0;
    let exp64 = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & ((1u64 << 52) - 1);

    let (exp80, mantissa) = if exp64 == 0x7ff {
        let m = if frac == 0 { 1u64 << 63 } else { (1u64 << 63) | (1u64 << 62) | (frac << 11) };
        (0x7fff, m)
    } else if exp64 == 0 {
        if frac == 0 {
            (0, 0)
        } else {
            // Subnormal: normalize so that the integer bit is set.
            let m = frac << 11;
            let lz = m.leading_zeros() as i32;
            (1 - F64_EXP_BIAS + F80_EXP_BIAS - lz, m << lz)
        }
    } else {
        (exp64 - F64_EXP_BIAS + F80_EXP_BIAS, (1u64 << 63) | (frac << 11))
    };

    let mut out = [0u8; 10];
    LittleEndian::write_u64(&mut out[..8], mantissa);
    let sign_exp = (exp80 as u16) | if negative { 0x8000 } else { 0 };
    LittleEndian::write_u16(&mut out[8..], sign_exp);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_widths() {
        for &size in &[1, 2, 4, 8] {
            let layout = NumericLayout::resolve(size, ElementKind::Integer).unwrap();
            assert_eq!(layout.size(), size);
            assert_eq!(layout.kind(), ElementKind::Integer);
        }

        for &size in &[4, 8, 10] {
            let layout = NumericLayout::resolve(size, ElementKind::Real).unwrap();
            assert_eq!(layout.size(), size);
            assert_eq!(layout.kind(), ElementKind::Real);
        }
    }

    #[test]
    fn unsupported_widths() {
        for size in 0..20 {
            let int_ok = [1, 2, 4, 8].contains(&size);
            let real_ok = [4, 8, 10].contains(&size);

            match NumericLayout::resolve(size, ElementKind::Integer) {
                Err(MudError::UnsupportedWidth { size: s, kind }) => {
                    assert!(!int_ok);
                    assert_eq!(s, size);
                    assert_eq!(kind, ElementKind::Integer);
                }
                Ok(_) => assert!(int_ok),
                Err(e) => panic!("unexpected error {}", e),
            }

            assert_eq!(NumericLayout::resolve(size, ElementKind::Real).is_ok(), real_ok);
        }
    }

    #[test]
    fn decode_signed_integers() {
        let buf = [0xff, 0xfe, 0x01, 0x00];
        assert_eq!(
            NumericLayout::Int8.decode(&buf, 4).unwrap(),
            NumericArray::Integer(vec![-1, -2, 1, 0])
        );
        assert_eq!(
            NumericLayout::Int16.decode(&buf, 2).unwrap(),
            NumericArray::Integer(vec![-257, 1])
        );

        let mut wide = Vec::new();
        wide.extend_from_slice(&(-5_000_000_000i64).to_le_bytes());
        wide.extend_from_slice(&i64::MAX.to_le_bytes());
        assert_eq!(
            NumericLayout::Int64.decode(&wide, 2).unwrap(),
            NumericArray::Integer(vec![-5_000_000_000, i64::MAX])
        );
    }

    #[test]
    fn decode_single_precision() {
        let mut buf = Vec::new();
        for &x in &[1.5f32, -0.25, 3.0e38] {
            buf.extend_from_slice(&x.to_le_bytes());
        }

        assert_eq!(
            NumericLayout::Float32.decode(&buf, 3).unwrap(),
            NumericArray::Real(vec![1.5, -0.25, 3.0e38f32 as f64])
        );
        assert!(matches!(
            NumericLayout::Float32.decode(&buf[..11], 3),
            Err(MudError::LengthMismatch { expected: 12, actual: 11 })
        ));
    }

    #[test]
    fn decode_requires_enough_bytes() {
        let buf = [0u8; 7];

        match NumericLayout::Float64.decode(&buf, 1) {
            Err(MudError::LengthMismatch { expected, actual }) => {
                assert_eq!(expected, 8);
                assert_eq!(actual, 7);
            }
            other => panic!("unexpected result {:?}", other),
        }

        assert_eq!(
            NumericLayout::Int32.decode(&buf, 0).unwrap(),
            NumericArray::Integer(vec![])
        );
    }

    #[test]
    fn extended_precision() {
        // 1.0: integer bit set, unbiased exponent zero.
        let one = [0, 0, 0, 0, 0, 0, 0, 0x80, 0xff, 0x3f];
        assert_eq!(f80_to_f64(&one), 1.0);
        assert_eq!(f64_to_f80(1.0), one);

        for &v in &[0.0, -2.5, 3.0e-310, 1.0e300, -7.25e-5, f64::MAX, f64::MIN_POSITIVE] {
            assert_eq!(f80_to_f64(&f64_to_f80(v)), v);
        }

        assert!(f80_to_f64(&f64_to_f80(f64::NAN)).is_nan());
        assert_eq!(f80_to_f64(&f64_to_f80(f64::NEG_INFINITY)), f64::NEG_INFINITY);
    }

    #[test]
    fn integer_range_is_checked() {
        let mut out = Vec::new();
        NumericLayout::Int16.encode_integers(&[-2, 300], &mut out).unwrap();
        assert_eq!(
            NumericLayout::Int16.decode(&out, 2).unwrap(),
            NumericArray::Integer(vec![-2, 300])
        );
        assert!(NumericLayout::Int8.encode_integers(&[300], &mut out).is_err());
    }
}
