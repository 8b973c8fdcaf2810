use std::io::{self, Read, Write};
use std::marker::PhantomData;

use byteorder::{ByteOrder, ReadBytesExt, WriteBytesExt, LE};

use crate::{Error, FString, Result, StringEncoding};

/// Bounded, seekable view of an in-memory buffer.
pub(crate) trait ArchiveReader: Read {
    /// Cursor position relative to the start of the readable range
    fn position(&self) -> usize;
    fn seek_to(&mut self, offset: usize) -> Result<()>;
    /// Length of the readable range
    fn len(&self) -> usize;

    fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        if len > self.remaining() {
            return Err(Error::Overrun {
                offset: self.position(),
                needed: len,
                end: self.len(),
            });
        }
        let mut buf = vec![0; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_string(&mut self) -> Result<String> {
        Ok(self.read_fstring()?.value)
    }

    fn read_fstring(&mut self) -> Result<FString> {
        let len = self.read_i32::<LE>()?;
        if len == 0 {
            return Ok(FString::default());
        }
        if len < 0 {
            let bytes = self.read_bytes(len.unsigned_abs() as usize * 2)?;
            let units: Vec<u16> = bytes.chunks_exact(2).map(LE::read_u16).collect();
            let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());
            let value = String::from_utf16(&units[..end]).map_err(|e| Error::Other(e.to_string()))?;
            Ok(FString::stored(value, StringEncoding::Wide, bytes[end * 2..].to_vec()))
        } else {
            let bytes = self.read_bytes(len as usize)?;
            let end = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
            let value = bytes[..end].iter().map(|&b| char::from(b)).collect();
            Ok(FString::stored(value, StringEncoding::Narrow, bytes[end..].to_vec()))
        }
    }
}

/// Append-only sink whose already written bytes can be patched through [`Patch`] tokens.
pub(crate) trait ArchiveWriter: Write {
    fn position(&self) -> usize;
    /// Writes a zeroed placeholder and returns the token that fills it in.
    fn reserve<T: Patchable>(&mut self) -> Result<Patch<T>>;
    fn commit<T: Patchable>(&mut self, patch: Patch<T>, value: T);

    fn write_string(&mut self, string: &str) -> Result<()> {
        self.write_fstring(&FString::new(string))
    }

    fn write_fstring(&mut self, string: &FString) -> Result<()> {
        let Some((encoding, trailing)) = string.layout() else {
            self.write_i32::<LE>(0)?;
            return Ok(());
        };
        match encoding {
            StringEncoding::Narrow => {
                let len = string.value.chars().count() + trailing.len();
                self.write_i32::<LE>(string_len(len)?)?;
                for c in string.value.chars() {
                    self.write_u8(c as u8)?;
                }
            }
            StringEncoding::Wide => {
                if trailing.len() % 2 != 0 {
                    return Err(Error::OutOfRange {
                        field: "wide string trailing length",
                        value: trailing.len() as i64,
                    });
                }
                let chars: Vec<u16> = string.value.encode_utf16().collect();
                self.write_i32::<LE>(-string_len(chars.len() + trailing.len() / 2)?)?;
                for c in chars {
                    self.write_u16::<LE>(c)?;
                }
            }
        }
        self.write_all(trailing)?;
        Ok(())
    }
}

fn string_len(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::OutOfRange {
        field: "string length",
        value: len as i64,
    })
}

pub(crate) fn read_array<T, F, A>(length: usize, ar: &mut A, f: F) -> Result<Vec<T>>
where
    A: ArchiveReader + ?Sized,
    F: Fn(&mut A) -> Result<T>,
{
    (0..length).map(|_| f(ar)).collect()
}

/// Fixed-width value that can be written into a reserved slot.
pub(crate) trait Patchable: Copy {
    const SIZE: usize;
    fn encode(self, out: &mut [u8]);
}
impl Patchable for i32 {
    const SIZE: usize = 4;
    fn encode(self, out: &mut [u8]) {
        LE::write_i32(out, self)
    }
}
impl Patchable for u32 {
    const SIZE: usize = 4;
    fn encode(self, out: &mut [u8]) {
        LE::write_u32(out, self)
    }
}
impl Patchable for i64 {
    const SIZE: usize = 8;
    fn encode(self, out: &mut [u8]) {
        LE::write_i64(out, self)
    }
}

/// Reserved slot at an absolute writer offset, committed exactly once.
#[must_use = "reserved slots must be committed"]
#[derive(Debug)]
pub(crate) struct Patch<T> {
    offset: usize,
    marker: PhantomData<T>,
}

/// Cursor over a range of a single shared buffer. Sub-ranges are carved out with
/// [`Reader::range`] instead of copying bytes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    base: usize,
    end: usize,
    pos: usize,
}
impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            base: 0,
            end: data.len(),
            pos: 0,
        }
    }
    /// New reader over `[start, start + len)` relative to this reader's range.
    pub(crate) fn range(&self, start: usize, len: usize) -> Result<Reader<'a>> {
        let abs = self.base + start;
        match abs.checked_add(len) {
            Some(end) if end <= self.end => Ok(Reader {
                data: self.data,
                base: abs,
                end,
                pos: abs,
            }),
            _ => Err(Error::Overrun {
                offset: abs,
                needed: len,
                end: self.end,
            }),
        }
    }
    /// Bytes of the whole range regardless of cursor position
    pub(crate) fn as_slice(&self) -> &'a [u8] {
        &self.data[self.base..self.end]
    }
    /// Cursor position within the underlying buffer
    pub(crate) fn absolute_position(&self) -> usize {
        self.pos
    }
}
impl Read for Reader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = &self.data[self.pos..self.end];
        let n = buf.len().min(available.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.pos += n;
        Ok(n)
    }
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        if buf.len() > self.end - self.pos {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at offset {} overruns range ending at {}",
                    buf.len(),
                    self.pos,
                    self.end
                ),
            ));
        }
        buf.copy_from_slice(&self.data[self.pos..self.pos + buf.len()]);
        self.pos += buf.len();
        Ok(())
    }
}
impl ArchiveReader for Reader<'_> {
    fn position(&self) -> usize {
        self.pos - self.base
    }
    fn seek_to(&mut self, offset: usize) -> Result<()> {
        if offset > self.end - self.base {
            return Err(Error::Overrun {
                offset: self.base + offset,
                needed: 0,
                end: self.end,
            });
        }
        self.pos = self.base + offset;
        Ok(())
    }
    fn len(&self) -> usize {
        self.end - self.base
    }
}

#[derive(Debug, Default)]
pub(crate) struct Writer {
    buffer: Vec<u8>,
}
impl Writer {
    pub(crate) fn new() -> Self {
        Self::default()
    }
    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}
impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
impl ArchiveWriter for Writer {
    fn position(&self) -> usize {
        self.buffer.len()
    }
    fn reserve<T: Patchable>(&mut self) -> Result<Patch<T>> {
        let offset = self.buffer.len();
        self.buffer.resize(offset + T::SIZE, 0);
        Ok(Patch {
            offset,
            marker: PhantomData,
        })
    }
    fn commit<T: Patchable>(&mut self, patch: Patch<T>, value: T) {
        value.encode(&mut self.buffer[patch.offset..patch.offset + T::SIZE]);
    }
}

impl<W: ArchiveWriter + ?Sized> ArchiveWriter for &mut W {
    fn position(&self) -> usize {
        (**self).position()
    }
    fn reserve<T: Patchable>(&mut self) -> Result<Patch<T>> {
        (**self).reserve()
    }
    fn commit<T: Patchable>(&mut self, patch: Patch<T>, value: T) {
        (**self).commit(patch, value)
    }
}
