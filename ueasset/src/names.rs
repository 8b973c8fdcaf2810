use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::archive::{read_array, ArchiveReader, ArchiveWriter};
use crate::{Error, FString, Result};

/// Reference into a [`NameTable`]: the table index plus an instance number.
/// Serialized as two 32-bit integers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FName {
    pub index: i32,
    pub number: i32,
}
impl FName {
    pub fn new(index: i32) -> Self {
        Self { index, number: 0 }
    }
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            index: ar.read_i32::<LE>()?,
            number: ar.read_i32::<LE>()?,
        })
    }
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_i32::<LE>(self.index)?;
        ar.write_i32::<LE>(self.number)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameEntry {
    pub value: FString,
    pub non_case_preserving_hash: u16,
    pub case_preserving_hash: u16,
}
impl NameEntry {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self {
            value: FString::new(value),
            non_case_preserving_hash: 0,
            case_preserving_hash: 0,
        }
    }
}

/// Ordered string table. Indices handed out are stable: entries are only ever appended.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameTable(Vec<NameEntry>);
impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn entries(&self) -> &[NameEntry] {
        &self.0
    }
    pub fn entry(&self, index: i32) -> Result<&NameEntry> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.0.get(i))
            .ok_or(Error::NameIndex(index.into()))
    }
    pub fn get(&self, index: i32) -> Result<&str> {
        self.entry(index).map(|e| e.value.as_str())
    }
    pub fn find(&self, value: &str) -> Option<i32> {
        self.0.iter().position(|e| e.value == value).map(|i| i as i32)
    }
    /// Returns the index of `value`, appending it when absent. Hashes of new entries are left zero.
    pub fn intern(&mut self, value: &str) -> i32 {
        self.find(value).unwrap_or_else(|| {
            self.0.push(NameEntry::new(value));
            self.0.len() as i32 - 1
        })
    }
    /// Index of the entry stored exactly like `value`, appending it when absent.
    pub(crate) fn intern_stored(&mut self, value: FString) -> i32 {
        match self.0.iter().position(|e| e.value == value) {
            Some(i) => i as i32,
            None => self.push(NameEntry {
                value,
                non_case_preserving_hash: 0,
                case_preserving_hash: 0,
            }),
        }
    }
    pub fn push(&mut self, entry: NameEntry) -> i32 {
        self.0.push(entry);
        self.0.len() as i32 - 1
    }

    #[instrument(name = "NameTable_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A, count: usize) -> Result<Self> {
        Ok(Self(read_array(count, ar, |ar| {
            Ok(NameEntry {
                value: ar.read_fstring()?,
                non_case_preserving_hash: ar.read_u16::<LE>()?,
                case_preserving_hash: ar.read_u16::<LE>()?,
            })
        })?))
    }
    #[instrument(name = "NameTable_write", skip_all)]
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        for entry in &self.0 {
            ar.write_fstring(&entry.value)?;
            ar.write_u16::<LE>(entry.non_case_preserving_hash)?;
            ar.write_u16::<LE>(entry.case_preserving_hash)?;
        }
        Ok(())
    }
}
impl<S: AsRef<str>> FromIterator<S> for NameTable {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut table = Self::new();
        for value in iter {
            table.intern(value.as_ref());
        }
        table
    }
}

/// Import record. `name` is the name table entry the link resolves to.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub package: FName,
    pub class: FName,
    pub parent: i32,
    pub name: FName,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkTable(Vec<Link>);
impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
    pub fn links(&self) -> &[Link] {
        &self.0
    }
    pub fn push(&mut self, link: Link) -> i32 {
        self.0.push(link);
        self.0.len() as i32 - 1
    }
    /// Maps a link reference to a name index. Negative references name the entry
    /// `-(index + 1)` directly, others go through the link's own name.
    pub fn resolve(&self, index: i32) -> Result<i32> {
        if index < 0 {
            Ok(-(index + 1))
        } else {
            self.0
                .get(index as usize)
                .map(|link| link.name.index)
                .ok_or(Error::LinkIndex(index))
        }
    }

    #[instrument(name = "LinkTable_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A, count: usize) -> Result<Self> {
        Ok(Self(read_array(count, ar, |ar| {
            Ok(Link {
                package: FName::read(ar)?,
                class: FName::read(ar)?,
                parent: ar.read_i32::<LE>()?,
                name: FName::read(ar)?,
            })
        })?))
    }
    #[instrument(name = "LinkTable_write", skip_all)]
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        for link in &self.0 {
            link.package.write(ar)?;
            link.class.write(ar)?;
            ar.write_i32::<LE>(link.parent)?;
            link.name.write(ar)?;
        }
        Ok(())
    }
}
