// Copyright 2017-2024 Peter Williams and collaborators
// Licensed under the MIT License.

/*!

Basic I/O helpers.

 */

use byteorder::{ByteOrder, LittleEndian};
use std::io;
use std::io::{Read, Seek, SeekFrom};
use std::result;

/// Extend the `Read` trait to provide functions for reading an exact number
/// of bytes from a stream and distinguishing whether EOF was encountered
/// immediately, versus whether it was encountered in the midst of the read.
///
/// Block-structured containers are usually allowed to end after any complete
/// block, but never inside one. These helpers make that distinction easy.
pub trait EofReadExactExt: Read {
    /// Like `Read::read_exact`, except returns Ok(false) if EOF was
    /// encountered at the first read attempt. Returns Ok(true) if everything
    /// was OK and EOF has not yet been hit. Returns Err with an IoError with
    /// a "kind" of UnexpectedEof if EOF was encountered somewhere in the
    /// midst of the buffer.
    fn eof_read_exact<E>(&mut self, buf: &mut [u8]) -> result::Result<bool, E>
    where
        E: From<io::Error>;

    /// Like `byteorder::ReadBytesExt::read_u32::<LittleEndian>`, except
    /// returns Some(n) on success and None if EOF was encountered at the
    /// first read attempt.
    fn eof_read_le_u32<E>(&mut self) -> result::Result<Option<u32>, E>
    where
        E: From<io::Error>,
    {
        let mut buf = [0u8; 4];

        if self.eof_read_exact(&mut buf)? {
            Ok(Some(LittleEndian::read_u32(&buf)))
        } else {
            Ok(None)
        }
    }
}

impl<R: Read> EofReadExactExt for R {
    fn eof_read_exact<E>(&mut self, buf: &mut [u8]) -> result::Result<bool, E>
    where
        E: From<io::Error>,
    {
        let mut n_left = buf.len();
        let mut ofs = 0;

        while n_left > 0 {
            let n_read = match self.read(&mut buf[ofs..]) {
                Ok(n) => n,
                Err(e) => {
                    if e.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }

                    return Err(e.into());
                }
            };

            if n_read == 0 {
                return if ofs == 0 {
                    Ok(false) // no more data at an expected stopping point
                } else {
                    Err(
                        io::Error::new(io::ErrorKind::UnexpectedEof, "unexpected end of file")
                            .into(),
                    )
                };
            }

            ofs += n_read;
            n_left -= n_read;
        }

        Ok(true) // more data, we think
    }
}

/// Extend seekable streams with a helper for pulling out a whole block whose
/// location is already known, as is the case once a container's index has
/// been parsed.
pub trait ReadBlockAtExt: Read + Seek {
    /// Seek to *offset* and read exactly *len* bytes into a new vector.
    fn read_block_at(&mut self, offset: u64, len: usize) -> io::Result<Vec<u8>> {
        self.seek(SeekFrom::Start(offset))?;

        // Zero-fill then overwrite; see the discussion in
        // https://github.com/rust-lang/rfcs/blob/master/text/2930-read-buf.md#summary
        let mut buf = vec![0; len];
        self.read_exact(&mut buf[..])?;
        Ok(buf)
    }
}

impl<R: Read + Seek> ReadBlockAtExt for R {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn eof_at_boundary_is_clean() {
        let mut c = Cursor::new(vec![1u8, 0, 0, 0]);
        assert_eq!(c.eof_read_le_u32::<io::Error>().unwrap(), Some(1));
        assert_eq!(c.eof_read_le_u32::<io::Error>().unwrap(), None);
    }

    #[test]
    fn eof_inside_value_is_an_error() {
        let mut c = Cursor::new(vec![1u8, 0]);
        let e = c.eof_read_le_u32::<io::Error>().unwrap_err();
        assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn block_at_offset() {
        let mut c = Cursor::new((0u8..16).collect::<Vec<_>>());
        assert_eq!(c.read_block_at(4, 3).unwrap(), vec![4, 5, 6]);
        assert!(c.read_block_at(14, 3).is_err());
    }
}
