// Copyright 2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

Decoding primitive fields out of section bodies.

Section bodies are flat sequences of little-endian integers, reals, and
length-prefixed strings. A `FieldCursor` walks such a body one field at a
time. Reads never fail loudly: a field that runs off the end of the body comes
back as `None`, and since the position of everything after it is then
unknown, every later field does too. The cursor remembers which field failed
first so that callers can report it.

*/

use byteorder::{ByteOrder, LittleEndian};

#[derive(Clone, Debug)]
pub struct FieldCursor<'a> {
    buf: &'a [u8],
    pos: usize,
    failed_at: Option<&'static str>,
}

impl<'a> FieldCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FieldCursor {
            buf,
            pos: 0,
            failed_at: None,
        }
    }

    /// The name of the first field that could not be read, if any.
    pub fn failed_at(&self) -> Option<&'static str> {
        self.failed_at
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, name: &'static str, n: usize) -> Option<&'a [u8]> {
        if self.failed_at.is_some() {
            return None;
        }

        if self.remaining() < n {
            self.failed_at = Some(name);
            return None;
        }

        let chunk = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(chunk)
    }

    pub fn u32(&mut self, name: &'static str) -> Option<u32> {
        self.take(name, 4).map(LittleEndian::read_u32)
    }

    pub fn i32(&mut self, name: &'static str) -> Option<i32> {
        self.take(name, 4).map(LittleEndian::read_i32)
    }

    pub fn f64(&mut self, name: &'static str) -> Option<f64> {
        self.take(name, 8).map(LittleEndian::read_f64)
    }

    /// Take exactly *n* raw bytes.
    pub fn bytes(&mut self, name: &'static str, n: usize) -> Option<&'a [u8]> {
        self.take(name, n)
    }

    /// Read a length-prefixed string and normalize it with `decode_text`.
    ///
    /// A string that is present but blank still advances the cursor, so the
    /// fields after it remain readable.
    pub fn text(&mut self, name: &'static str, buffer_size: usize) -> Option<String> {
        let len = LittleEndian::read_u16(self.take(name, 2)?) as usize;
        let raw = self.take(name, len)?;
        decode_text(raw, buffer_size)
    }
}

/// Decode a fixed-width text field.
///
/// At most `buffer_size - 1` bytes are kept, as if the text had been copied
/// into a NUL-terminated buffer of that size. The bytes are Latin-1, so every
/// byte maps onto exactly one character and decoding cannot fail. NUL padding
/// and surrounding whitespace are stripped; if nothing is left the field is
/// absent.
pub fn decode_text(raw: &[u8], buffer_size: usize) -> Option<String> {
    let capacity = buffer_size.saturating_sub(1);
    let kept = &raw[..raw.len().min(capacity)];
    let text: String = kept.iter().map(|&b| char::from(b)).collect();
    let trimmed = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());

    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

/// Split a combined value-and-units string such as `"295.0K"` or `"1000 G"`.
///
/// The numeric part is the longest leading run of characters that can belong
/// to a decimal number; the rest, trimmed, is the units. Either part may be
/// missing.
pub fn split_value_units(text: &str) -> (Option<f64>, Option<String>) {
    let text = text.trim();
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut split = text.len();

    for (i, &(ofs, c)) in chars.iter().enumerate() {
        let numeric = match c {
            '0'..='9' | '.' | '+' | '-' => true,
            // An exponent marker only counts if a digit or sign follows and
            // a digit came before.
            'e' | 'E' => {
                i > 0
                    && chars[i - 1].1.is_ascii_digit()
                    && chars
                        .get(i + 1)
                        .map_or(false, |&(_, n)| n.is_ascii_digit() || n == '+' || n == '-')
            }
            _ => false,
        };

        if !numeric {
            split = ofs;
            break;
        }
    }

    let value = text[..split].parse::<f64>().ok();
    let units = text[split..].trim();
    let units = if units.is_empty() {
        None
    } else {
        Some(units.to_owned())
    };

    (value, units)
}
