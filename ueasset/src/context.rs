use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::archive::{ArchiveReader, ArchiveWriter, Patch, Patchable};
use crate::names::{FName, LinkTable, NameTable};
use crate::{Error, Result};

/// Represents the current position in the property hierarchy as a stack of names.
/// Only used for diagnostics.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    components: Vec<String>,
}
impl Scope {
    fn path(&self) -> String {
        self.components.join(".")
    }
    fn push(&mut self, name: &str) {
        self.components.push(name.to_string());
    }
    fn pop(&mut self) {
        self.components.pop();
    }
}

/// How name references are stored on the wire.
#[derive(Debug)]
pub(crate) enum Names<'a> {
    /// Indices into the asset's name table, with links resolved through the link table
    Indexed {
        names: &'a NameTable,
        links: &'a LinkTable,
    },
    /// Inline strings, interned into a local table while reading
    Interning(&'a mut NameTable),
    /// Inline strings, looked up from a local table while writing
    Literal(&'a NameTable),
}
impl Names<'_> {
    fn reborrow(&mut self) -> Names<'_> {
        match self {
            Names::Indexed { names, links } => Names::Indexed {
                names: *names,
                links: *links,
            },
            Names::Interning(names) => Names::Interning(&mut **names),
            Names::Literal(names) => Names::Literal(*names),
        }
    }
    fn table(&self) -> &NameTable {
        match self {
            Names::Indexed { names, .. } => *names,
            Names::Interning(names) => &**names,
            Names::Literal(names) => *names,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Context<'a, S> {
    pub(crate) stream: S,
    pub(crate) state: ContextState<'a>,
}
#[derive(Debug)]
pub(crate) struct ContextState<'a> {
    pub(crate) names: Names<'a>,
    /// Whether values carry their own per-kind header bytes
    pub(crate) header_mode: bool,
    /// Declared body length of the value being decoded
    pub(crate) length: i64,
    pub(crate) scope: Scope,
}

impl<R: Read> Read for Context<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
    fn read_exact(&mut self, buf: &mut [u8]) -> std::io::Result<()> {
        self.stream.read_exact(buf)
    }
}
impl<W: Write> Write for Context<'_, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
impl<R: ArchiveReader> ArchiveReader for Context<'_, R> {
    fn position(&self) -> usize {
        self.stream.position()
    }
    fn seek_to(&mut self, offset: usize) -> Result<()> {
        self.stream.seek_to(offset)
    }
    fn len(&self) -> usize {
        self.stream.len()
    }
}
impl<W: ArchiveWriter> ArchiveWriter for Context<'_, W> {
    fn position(&self) -> usize {
        self.stream.position()
    }
    fn reserve<T: Patchable>(&mut self) -> Result<Patch<T>> {
        self.stream.reserve()
    }
    fn commit<T: Patchable>(&mut self, patch: Patch<T>, value: T) {
        self.stream.commit(patch, value)
    }
}

impl<'a, S> Context<'a, S> {
    pub(crate) fn new(stream: S, names: Names<'a>) -> Self {
        Self {
            stream,
            state: ContextState {
                names,
                header_mode: true,
                length: 0,
                scope: Scope::default(),
            },
        }
    }
    /// Context over another stream sharing this context's names and state.
    pub(crate) fn nested<T>(&mut self, stream: T) -> Context<'_, T> {
        Context {
            stream,
            state: ContextState {
                names: self.state.names.reborrow(),
                header_mode: self.state.header_mode,
                length: self.state.length,
                scope: self.state.scope.clone(),
            },
        }
    }
    pub(crate) fn with_scope<F, T>(&mut self, name: &str, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        self.state.scope.push(name);
        let result = f(self);
        self.state.scope.pop();
        result
    }
    pub(crate) fn with_header_mode<F, T>(&mut self, header_mode: bool, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        let previous = std::mem::replace(&mut self.state.header_mode, header_mode);
        let result = f(self);
        self.state.header_mode = previous;
        result
    }
    pub(crate) fn with_length<F, T>(&mut self, length: i64, f: F) -> T
    where
        F: FnOnce(&mut Self) -> T,
    {
        let previous = std::mem::replace(&mut self.state.length, length);
        let result = f(self);
        self.state.length = previous;
        result
    }
    pub(crate) fn header_mode(&self) -> bool {
        self.state.header_mode
    }
    pub(crate) fn length(&self) -> i64 {
        self.state.length
    }
    pub(crate) fn path(&self) -> String {
        self.state.scope.path()
    }
    /// Whether names are stored as inline strings (save-game format)
    pub(crate) fn inline_names(&self) -> bool {
        !matches!(self.state.names, Names::Indexed { .. })
    }
    pub(crate) fn name(&self, index: i32) -> Result<&str> {
        self.state.names.table().get(index)
    }
    pub(crate) fn resolve_link(&self, index: i32) -> Result<i32> {
        match &self.state.names {
            Names::Indexed { links, .. } => links.resolve(index),
            _ => Err(Error::Other(
                "link references cannot be resolved without a link table".into(),
            )),
        }
    }
    /// The property's type string: its type name, or its own name when the type index is unset.
    pub(crate) fn type_string(&self, name: FName, type_name: FName) -> Result<&str> {
        match &self.state.names {
            Names::Indexed { names, .. } if type_name.index <= 0 => names.get(name.index),
            names => names.table().get(type_name.index),
        }
    }
    pub(crate) fn is_none_name(&self, name: FName) -> Result<bool> {
        match &self.state.names {
            Names::Indexed { names, .. } => Ok(name.index == 0 || names.get(name.index)? == "None"),
            names => Ok(names.table().get(name.index)? == "None"),
        }
    }
}

impl<R: ArchiveReader> Context<'_, R> {
    pub(crate) fn read_name(&mut self) -> Result<FName> {
        match &mut self.state.names {
            Names::Indexed { .. } => FName::read(&mut self.stream),
            Names::Interning(names) => {
                let value = self.stream.read_fstring()?;
                Ok(FName::new(names.intern_stored(value)))
            }
            Names::Literal(_) => Err(Error::Other("literal names are write-only".into())),
        }
    }
    pub(crate) fn read_name_index(&mut self) -> Result<i32> {
        match &mut self.state.names {
            Names::Indexed { .. } => Ok(self.stream.read_i32::<LE>()?),
            Names::Interning(names) => {
                let value = self.stream.read_fstring()?;
                Ok(names.intern_stored(value))
            }
            Names::Literal(_) => Err(Error::Other("literal names are write-only".into())),
        }
    }
}

impl<W: ArchiveWriter> Context<'_, W> {
    pub(crate) fn write_name(&mut self, name: FName) -> Result<()> {
        match &self.state.names {
            Names::Indexed { .. } => name.write(&mut self.stream),
            names => {
                let entry = names.table().entry(name.index)?;
                self.stream.write_fstring(&entry.value)
            }
        }
    }
    pub(crate) fn write_name_index(&mut self, index: i32) -> Result<()> {
        match &self.state.names {
            Names::Indexed { .. } => Ok(self.stream.write_i32::<LE>(index)?),
            names => {
                let entry = names.table().entry(index)?;
                self.stream.write_fstring(&entry.value)
            }
        }
    }
    /// Writes the terminator that ends a property list.
    pub(crate) fn write_none(&mut self) -> Result<()> {
        match &self.state.names {
            Names::Indexed { names, .. } => {
                let index = names
                    .find("None")
                    .ok_or_else(|| Error::MissingName("None".into()))?;
                FName::new(index).write(&mut self.stream)
            }
            _ => self.stream.write_string("None"),
        }
    }
}
