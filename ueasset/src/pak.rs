use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::archive::{read_array, ArchiveReader, ArchiveWriter, Patch, Reader, Writer};
use crate::asset::{paired_name, AssetData, AssetHeader, HeaderSlots};
use crate::{Error, FGuid, ParseError, Result};

pub const PAK_MAGIC: u32 = 0x5A6F12E1;
/// Footer size counted back from the end of the archive
pub const FOOTER_SIZE: usize = 221;
/// Version that adds the frozen-index byte to the footer
pub const FROZEN_INDEX_VERSION: u32 = 9;
const COMPRESSION_NAME_SIZE: usize = 32;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct EntryFlags: u8 {
        const ENCRYPTED = 0x01;
        const DELETED = 0x02;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionBlock {
    pub start: i64,
    pub end: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Offset of the entry's in-data record; recomputed when written
    pub offset: i64,
    /// Stored payload size; recomputed when written
    pub size: i64,
    pub uncompressed_size: i64,
    /// Index into the footer's compression methods, 0 meaning stored
    pub compression_method: i32,
    pub hash: [u8; 20],
    /// Present only for compressed entries
    pub compression_blocks: Vec<CompressionBlock>,
    pub flags: EntryFlags,
    pub compression_block_size: u32,
}
impl Default for EntryRecord {
    fn default() -> Self {
        Self {
            offset: 0,
            size: 0,
            uncompressed_size: 0,
            compression_method: 0,
            hash: [0; 20],
            compression_blocks: vec![],
            flags: EntryFlags::empty(),
            compression_block_size: 0,
        }
    }
}
impl EntryRecord {
    /// Whether the payload is plain bytes that can be decoded
    pub fn is_stored(&self) -> bool {
        self.compression_method == 0 && !self.flags.contains(EntryFlags::ENCRYPTED)
    }
    fn encoded_len(&self) -> usize {
        let blocks = if self.compression_method != 0 {
            4 + 16 * self.compression_blocks.len()
        } else {
            0
        };
        8 + 8 + 8 + 4 + 20 + blocks + 1 + 4
    }

    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let offset = ar.read_i64::<LE>()?;
        let size = ar.read_i64::<LE>()?;
        let uncompressed_size = ar.read_i64::<LE>()?;
        let compression_method = ar.read_i32::<LE>()?;
        let mut hash = [0; 20];
        ar.read_exact(&mut hash)?;
        let compression_blocks = if compression_method != 0 {
            let count = ar.read_i32::<LE>()?;
            let count = usize::try_from(count).map_err(|_| Error::OutOfRange {
                field: "compression block count",
                value: count.into(),
            })?;
            read_array(count, ar, |ar| {
                Ok(CompressionBlock {
                    start: ar.read_i64::<LE>()?,
                    end: ar.read_i64::<LE>()?,
                })
            })?
        } else {
            vec![]
        };
        Ok(Self {
            offset,
            size,
            uncompressed_size,
            compression_method,
            hash,
            compression_blocks,
            flags: EntryFlags::from_bits_retain(ar.read_u8()?),
            compression_block_size: ar.read_u32::<LE>()?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_i64::<LE>(self.offset)?;
        ar.write_i64::<LE>(self.size)?;
        ar.write_i64::<LE>(self.uncompressed_size)?;
        self.write_rest(ar)
    }
    /// In-data copy of the record: offset 0, sizes left to the returned slots.
    fn write_prefix<A: ArchiveWriter>(&self, ar: &mut A) -> Result<(Patch<i64>, Patch<i64>)> {
        ar.write_i64::<LE>(0)?;
        let size = ar.reserve()?;
        let uncompressed_size = ar.reserve()?;
        self.write_rest(ar)?;
        Ok((size, uncompressed_size))
    }
    fn write_rest<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_i32::<LE>(self.compression_method)?;
        ar.write_all(&self.hash)?;
        if self.compression_method != 0 {
            ar.write_i32::<LE>(self.compression_blocks.len() as i32)?;
            for block in &self.compression_blocks {
                ar.write_i64::<LE>(block.start)?;
                ar.write_i64::<LE>(block.end)?;
            }
        }
        ar.write_u8(self.flags.bits())?;
        ar.write_u32::<LE>(self.compression_block_size)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntryPayload {
    /// `.uasset` entry
    Header(AssetHeader),
    /// `.uexp` entry decoded against its sibling header
    Asset(AssetData),
    /// Anything else, including `.uexp` entries without a sibling header
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PakEntry {
    pub name: String,
    pub record: EntryRecord,
    pub payload: EntryPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PakFooter {
    pub encryption_key: FGuid,
    pub encrypted_index: bool,
    pub version: u32,
    /// Hash of the index as read; not recomputed
    pub index_hash: [u8; 20],
    /// Only written for [`FROZEN_INDEX_VERSION`]
    pub frozen_index: bool,
    pub compression_methods: Vec<String>,
}
impl Default for PakFooter {
    fn default() -> Self {
        Self {
            encryption_key: FGuid::default(),
            encrypted_index: false,
            version: 8,
            index_hash: [0; 20],
            frozen_index: false,
            compression_methods: vec![],
        }
    }
}
impl PakFooter {
    /// Returns the footer with the index offset and size
    #[instrument(name = "PakFooter_read", skip_all)]
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<(Self, i64, i64)> {
        let encryption_key = FGuid::read(ar)?;
        let encrypted_index = ar.read_u8()? != 0;
        let magic = ar.read_u32::<LE>()?;
        if magic != PAK_MAGIC {
            return Err(Error::BadMagic {
                what: "pak footer",
                expected: PAK_MAGIC,
                found: magic,
            });
        }
        let version = ar.read_u32::<LE>()?;
        let index_offset = ar.read_i64::<LE>()?;
        let index_size = ar.read_i64::<LE>()?;
        let mut index_hash = [0; 20];
        ar.read_exact(&mut index_hash)?;
        let frozen_index = version == FROZEN_INDEX_VERSION && ar.read_u8()? != 0;
        let mut compression_methods = vec![];
        while ar.remaining() >= COMPRESSION_NAME_SIZE {
            let slot = ar.read_bytes(COMPRESSION_NAME_SIZE)?;
            let len = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
            compression_methods.push(String::from_utf8_lossy(&slot[..len]).into_owned());
        }
        while compression_methods.last().is_some_and(|m| m.is_empty()) {
            compression_methods.pop();
        }
        let footer = Self {
            encryption_key,
            encrypted_index,
            version,
            index_hash,
            frozen_index,
            compression_methods,
        };
        Ok((footer, index_offset, index_size))
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A, index_offset: i64, index_size: i64) -> Result<()> {
        let start = ar.position();
        self.encryption_key.write(ar)?;
        ar.write_u8(u8::from(self.encrypted_index))?;
        ar.write_u32::<LE>(PAK_MAGIC)?;
        ar.write_u32::<LE>(self.version)?;
        ar.write_i64::<LE>(index_offset)?;
        ar.write_i64::<LE>(index_size)?;
        ar.write_all(&self.index_hash)?;
        if self.version == FROZEN_INDEX_VERSION {
            ar.write_u8(u8::from(self.frozen_index))?;
        }
        for method in &self.compression_methods {
            if method.len() > COMPRESSION_NAME_SIZE
                || ar.position() - start + COMPRESSION_NAME_SIZE > FOOTER_SIZE
            {
                return Err(Error::OutOfRange {
                    field: "compression method name",
                    value: method.len() as i64,
                });
            }
            let mut slot = [0; COMPRESSION_NAME_SIZE];
            slot[..method.len()].copy_from_slice(method.as_bytes());
            ar.write_all(&slot)?;
        }
        let written = ar.position() - start;
        ar.write_all(&vec![0; FOOTER_SIZE - written])?;
        Ok(())
    }
}

/// A pak archive: mount point, entries and footer. Entry payloads are decoded
/// when they are asset halves and kept as bytes otherwise.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pak {
    pub mount_point: String,
    pub entries: Vec<PakEntry>,
    pub footer: PakFooter,
}
impl Pak {
    pub fn get(&self, name: &str) -> Option<&PakEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
    pub fn get_mut(&mut self, name: &str) -> Option<&mut PakEntry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ParseError> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes).map_err(|e| ParseError {
            offset: 0,
            error: e.into(),
        })?;
        Self::from_bytes(&bytes)
    }
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = Reader::new(bytes);
        let result = Self::read_inner(&mut reader);
        result.map_err(|error| ParseError {
            offset: reader.absolute_position(),
            error,
        })
    }
    #[instrument(name = "Pak_read", skip_all)]
    fn read_inner(reader: &mut Reader<'_>) -> Result<Self> {
        let footer_start = reader.len().checked_sub(FOOTER_SIZE).ok_or(Error::Overrun {
            offset: 0,
            needed: FOOTER_SIZE,
            end: reader.len(),
        })?;
        reader.seek_to(footer_start)?;
        let (footer, index_offset, index_size) = PakFooter::read(reader)?;
        let index_offset = usize::try_from(index_offset).map_err(|_| Error::OutOfRange {
            field: "index offset",
            value: index_offset,
        })?;
        let index_size = usize::try_from(index_size).map_err(|_| Error::OutOfRange {
            field: "index size",
            value: index_size,
        })?;
        let mut index = reader.range(index_offset, index_size)?;
        let mount_point = index.read_string()?;
        let count = index.read_i32::<LE>()?;
        let count = usize::try_from(count).map_err(|_| Error::OutOfRange {
            field: "entry count",
            value: count.into(),
        })?;
        debug!(%mount_point, count, version = footer.version, "read pak index");

        let mut entries: Vec<PakEntry> = Vec::with_capacity(count.min(index.remaining()));
        for _ in 0..count {
            let name = index.read_string()?;
            let record = EntryRecord::read(&mut index)?;
            let payload = Self::read_payload(reader, &entries, &name, &record).map_err(|e| {
                Error::Entry {
                    name: name.clone(),
                    source: Box::new(e),
                }
            })?;
            entries.push(PakEntry {
                name,
                record,
                payload,
            });
        }
        Ok(Self {
            mount_point,
            entries,
            footer,
        })
    }
    fn read_payload(
        reader: &Reader<'_>,
        entries: &[PakEntry],
        name: &str,
        record: &EntryRecord,
    ) -> Result<EntryPayload> {
        let start = usize::try_from(record.offset)
            .ok()
            .map(|offset| offset + record.encoded_len())
            .ok_or(Error::OutOfRange {
                field: "entry offset",
                value: record.offset,
            })?;
        let size = usize::try_from(record.size).map_err(|_| Error::OutOfRange {
            field: "entry size",
            value: record.size,
        })?;
        let mut payload = reader.range(start, size)?;
        if !record.is_stored() {
            return Ok(EntryPayload::Raw(payload.as_slice().to_vec()));
        }
        if name.ends_with(".uasset") {
            return Ok(EntryPayload::Header(AssetHeader::read(&mut payload)?));
        }
        if name.ends_with(".uexp") {
            let sibling = paired_name(name).and_then(|sibling| {
                entries.iter().find_map(|e| match &e.payload {
                    EntryPayload::Header(header) if e.name == sibling => Some(header),
                    _ => None,
                })
            });
            return match sibling {
                Some(header) => Ok(EntryPayload::Asset(AssetData::read(&payload, header)?)),
                None => {
                    warn!(entry = %name, "no preceding .uasset entry, keeping payload raw");
                    Ok(EntryPayload::Raw(payload.as_slice().to_vec()))
                }
            };
        }
        Ok(EntryPayload::Raw(payload.as_slice().to_vec()))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }
    /// Encodes entries in order, each as an in-data record followed by its
    /// payload, then the index and the footer.
    #[instrument(name = "Pak_write", skip_all)]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut ar = Writer::new();
        let mut pending: HashMap<&str, (HeaderSlots, &AssetHeader)> = HashMap::new();
        let mut records = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let offset = ar.position();
            let (size, uncompressed_size) = entry.record.write_prefix(&mut ar)?;
            let start = ar.position();
            match &entry.payload {
                EntryPayload::Header(header) => {
                    let slots = header.write(&mut ar)?;
                    pending.insert(entry.name.as_str(), (slots, header));
                }
                EntryPayload::Asset(data) => {
                    let (slots, header) = paired_name(&entry.name)
                        .and_then(|sibling| pending.remove(sibling.as_str()))
                        .ok_or_else(|| Error::Entry {
                            name: entry.name.clone(),
                            source: Box::new(Error::Other(
                                "asset payload without a preceding .uasset entry".into(),
                            )),
                        })?;
                    let layout = data.write(&mut ar, header, slots.size)?;
                    slots.commit_layout(&mut ar, &layout);
                }
                EntryPayload::Raw(bytes) => ar.write_all(bytes)?,
            }
            let written = (ar.position() - start) as i64;
            let uncompressed = if entry.record.is_stored() {
                written
            } else {
                entry.record.uncompressed_size
            };
            ar.commit(size, written);
            ar.commit(uncompressed_size, uncompressed);
            records.push(EntryRecord {
                offset: offset as i64,
                size: written,
                uncompressed_size: uncompressed,
                ..entry.record.clone()
            });
        }
        for (slots, header) in pending.into_values() {
            slots.commit_stored(&mut ar, header);
        }

        let index_offset = ar.position();
        ar.write_string(&self.mount_point)?;
        ar.write_i32::<LE>(self.entries.len() as i32)?;
        for (entry, record) in self.entries.iter().zip(&records) {
            ar.write_string(&entry.name)?;
            record.write(&mut ar)?;
        }
        let index_size = ar.position() - index_offset;
        self.footer
            .write(&mut ar, index_offset as i64, index_size as i64)?;
        debug!(entries = records.len(), index_offset, index_size, "wrote pak");
        Ok(ar.into_inner())
    }
}
