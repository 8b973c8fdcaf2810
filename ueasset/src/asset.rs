use std::io::{Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::archive::{read_array, ArchiveReader, ArchiveWriter, Patch, Reader, Writer};
use crate::context::{Context, Names};
use crate::names::{FName, LinkTable, NameTable};
use crate::object::CategoryObject;
use crate::{Error, FGuid, FString, ParseError, Result};

/// Magic at the start of every asset header and at the end of every payload
pub const ASSET_MAGIC: u32 = 0x9E2A83C1;
/// Bytes of each category descriptor that are carried verbatim
const CATEGORY_TAIL_SIZE: usize = 60;

fn read_count<A: ArchiveReader>(ar: &mut A, field: &'static str) -> Result<usize> {
    let value = ar.read_i32::<LE>()?;
    usize::try_from(value).map_err(|_| Error::OutOfRange {
        field,
        value: value.into(),
    })
}
fn to_offset(value: i64, field: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::OutOfRange { field, value })
}
fn relative<A: ArchiveWriter>(ar: &A, base: usize) -> i32 {
    (ar.position() - base) as i32
}

/// Swaps `.uasset` for `.uexp` and back.
pub fn paired_name(name: &str) -> Option<String> {
    if let Some(stem) = name.strip_suffix(".uasset") {
        Some(format!("{stem}.uexp"))
    } else {
        name.strip_suffix(".uexp").map(|stem| format!("{stem}.uasset"))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVersion {
    pub key: FGuid,
    pub version: i32,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Generation {
    pub category_count: i32,
    pub name_count: i32,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub changelist: u32,
    pub branch: FString,
}
impl EngineVersion {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            major: ar.read_u16::<LE>()?,
            minor: ar.read_u16::<LE>()?,
            patch: ar.read_u16::<LE>()?,
            changelist: ar.read_u32::<LE>()?,
            branch: ar.read_fstring()?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_u16::<LE>(self.major)?;
        ar.write_u16::<LE>(self.minor)?;
        ar.write_u16::<LE>(self.patch)?;
        ar.write_u32::<LE>(self.changelist)?;
        ar.write_fstring(&self.branch)?;
        Ok(())
    }
}

/// Header offset of a region the header does not model itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeaderOffset {
    /// Written as is. Zero for absent regions
    Fixed(i32),
    /// Relative to the asset registry block, rebased when the header moves
    Registry(i32),
}
impl Default for HeaderOffset {
    fn default() -> Self {
        Self::Fixed(0)
    }
}
impl HeaderOffset {
    fn new(field: &'static str, offset: i32, registry_offset: Option<i32>) -> Self {
        match registry_offset {
            Some(registry) if offset >= registry => Self::Registry(offset - registry),
            _ => {
                if offset != 0 {
                    warn!(field, offset, "header region before the asset registry is not preserved");
                }
                Self::Fixed(offset)
            }
        }
    }
    fn resolve(self, registry_start: i32) -> i32 {
        match self {
            Self::Fixed(offset) => offset,
            Self::Registry(offset) => registry_start + offset,
        }
    }
}

/// Persisted descriptor of one category (object) of the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    /// Link reference naming the object's class
    pub class_index: i32,
    pub super_index: i32,
    pub template_index: i32,
    pub outer_index: i32,
    pub object_name: FName,
    pub object_flags: u32,
    /// Byte length of the category; recomputed when written
    pub serial_size: i64,
    /// Absolute offset of the category in the combined asset; recomputed when written
    pub serial_offset: i64,
    pub tail: Vec<u8>,
}
impl Default for CategoryEntry {
    fn default() -> Self {
        Self {
            class_index: 0,
            super_index: 0,
            template_index: 0,
            outer_index: 0,
            object_name: FName::default(),
            object_flags: 0,
            serial_size: 0,
            serial_offset: 0,
            tail: vec![0; CATEGORY_TAIL_SIZE],
        }
    }
}
impl CategoryEntry {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        Ok(Self {
            class_index: ar.read_i32::<LE>()?,
            super_index: ar.read_i32::<LE>()?,
            template_index: ar.read_i32::<LE>()?,
            outer_index: ar.read_i32::<LE>()?,
            object_name: FName::read(ar)?,
            object_flags: ar.read_u32::<LE>()?,
            serial_size: ar.read_i64::<LE>()?,
            serial_offset: ar.read_i64::<LE>()?,
            tail: ar.read_bytes(CATEGORY_TAIL_SIZE)?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<CategorySlots> {
        if self.tail.len() != CATEGORY_TAIL_SIZE {
            return Err(Error::OutOfRange {
                field: "category descriptor tail",
                value: self.tail.len() as i64,
            });
        }
        ar.write_i32::<LE>(self.class_index)?;
        ar.write_i32::<LE>(self.super_index)?;
        ar.write_i32::<LE>(self.template_index)?;
        ar.write_i32::<LE>(self.outer_index)?;
        self.object_name.write(ar)?;
        ar.write_u32::<LE>(self.object_flags)?;
        let serial_size = ar.reserve()?;
        let serial_offset = ar.reserve()?;
        ar.write_all(&self.tail)?;
        Ok(CategorySlots {
            serial_size,
            serial_offset,
        })
    }
}

struct CategorySlots {
    serial_size: Patch<i64>,
    serial_offset: Patch<i64>,
}

/// Header fields that depend on the payload layout, filled in once it is written.
pub(crate) struct HeaderSlots {
    /// Byte length of the written header
    pub(crate) size: usize,
    categories: Vec<CategorySlots>,
    bulk_data_offset: Patch<i64>,
}
impl HeaderSlots {
    pub(crate) fn commit_layout<A: ArchiveWriter>(self, ar: &mut A, layout: &PayloadLayout) {
        for (slots, category) in self.categories.into_iter().zip(&layout.categories) {
            ar.commit(slots.serial_size, category.length);
            ar.commit(slots.serial_offset, category.start);
        }
        ar.commit(
            self.bulk_data_offset,
            (self.size + layout.size) as i64 - 4,
        );
    }
    /// Fills in the values recorded in `header`, for headers written without a payload.
    pub(crate) fn commit_stored<A: ArchiveWriter>(self, ar: &mut A, header: &AssetHeader) {
        for (slots, category) in self.categories.into_iter().zip(&header.categories) {
            ar.commit(slots.serial_size, category.serial_size);
            ar.commit(slots.serial_offset, category.serial_offset);
        }
        ar.commit(self.bulk_data_offset, header.bulk_data_offset);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CategoryLayout {
    pub(crate) start: i64,
    pub(crate) length: i64,
}
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PayloadLayout {
    pub(crate) categories: Vec<CategoryLayout>,
    /// Byte length of the payload including the trailing magic
    pub(crate) size: usize,
}

/// The `.uasset` half of an asset: package summary, name and link tables and
/// category descriptors. Offsets and counts are derived when written.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetHeader {
    pub legacy_file_version: i32,
    pub legacy_ue3_version: i32,
    pub file_version_ue4: i32,
    pub file_version_licensee_ue4: i32,
    pub custom_versions: Vec<CustomVersion>,
    /// As read; recomputed when written
    pub total_header_size: i32,
    pub folder_name: FString,
    pub package_flags: u32,
    pub gatherable_text_count: i32,
    pub gatherable_text_offset: HeaderOffset,
    pub searchable_names_offset: HeaderOffset,
    pub thumbnail_table_offset: HeaderOffset,
    pub guid: FGuid,
    /// The first generation's counts are synced with the tables when written
    pub generations: Vec<Generation>,
    pub saved_by: EngineVersion,
    pub compatible_with: EngineVersion,
    pub compression_flags: u32,
    pub package_source: u32,
    pub compressed_chunk_count: i32,
    pub additional_package_count: i32,
    /// As read; recomputed as the combined asset size minus four when written
    pub bulk_data_offset: i64,
    pub world_tile_info_offset: HeaderOffset,
    pub chunk_ids: Vec<i32>,
    pub preload_dependency_count: i32,
    pub preload_dependency_offset: HeaderOffset,
    pub names: NameTable,
    pub links: LinkTable,
    pub categories: Vec<CategoryEntry>,
    /// Dependency list of each category
    pub depends: Vec<Vec<i32>>,
    pub soft_package_references: Option<Vec<FString>>,
    /// Asset registry block and everything up to the end of the header, verbatim
    pub registry: Option<Vec<u8>>,
}
impl AssetHeader {
    /// Name the link reference resolves to
    pub fn link_name(&self, index: i32) -> Result<&str> {
        self.names.get(self.links.resolve(index)?)
    }

    #[instrument(name = "AssetHeader_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let magic = ar.read_u32::<LE>()?;
        if magic != ASSET_MAGIC {
            return Err(Error::BadMagic {
                what: "asset header",
                expected: ASSET_MAGIC,
                found: magic,
            });
        }
        let legacy_file_version = ar.read_i32::<LE>()?;
        let legacy_ue3_version = ar.read_i32::<LE>()?;
        let file_version_ue4 = ar.read_i32::<LE>()?;
        let file_version_licensee_ue4 = ar.read_i32::<LE>()?;
        let count = read_count(ar, "custom version count")?;
        let custom_versions = read_array(count, ar, |ar| {
            Ok(CustomVersion {
                key: FGuid::read(ar)?,
                version: ar.read_i32::<LE>()?,
            })
        })?;
        let total_header_size = ar.read_i32::<LE>()?;
        let folder_name = ar.read_fstring()?;
        let package_flags = ar.read_u32::<LE>()?;
        let name_count = read_count(ar, "name count")?;
        let name_offset = ar.read_i32::<LE>()?;
        let gatherable_text_count = ar.read_i32::<LE>()?;
        let gatherable_text_offset = ar.read_i32::<LE>()?;
        let category_count = read_count(ar, "category count")?;
        let category_offset = ar.read_i32::<LE>()?;
        let link_count = read_count(ar, "link count")?;
        let link_offset = ar.read_i32::<LE>()?;
        let depends_offset = ar.read_i32::<LE>()?;
        let soft_reference_count = read_count(ar, "soft package reference count")?;
        let soft_reference_offset = ar.read_i32::<LE>()?;
        let searchable_names_offset = ar.read_i32::<LE>()?;
        let thumbnail_table_offset = ar.read_i32::<LE>()?;
        let guid = FGuid::read(ar)?;
        let count = read_count(ar, "generation count")?;
        let generations = read_array(count, ar, |ar| {
            Ok(Generation {
                category_count: ar.read_i32::<LE>()?,
                name_count: ar.read_i32::<LE>()?,
            })
        })?;
        let saved_by = EngineVersion::read(ar)?;
        let compatible_with = EngineVersion::read(ar)?;
        let compression_flags = ar.read_u32::<LE>()?;
        let package_source = ar.read_u32::<LE>()?;
        let compressed_chunk_count = ar.read_i32::<LE>()?;
        let additional_package_count = ar.read_i32::<LE>()?;
        let registry_offset = ar.read_i32::<LE>()?;
        let bulk_data_offset = ar.read_i64::<LE>()?;
        let world_tile_info_offset = ar.read_i32::<LE>()?;
        let count = read_count(ar, "chunk id count")?;
        let chunk_ids = read_array(count, ar, |ar| Ok(ar.read_i32::<LE>()?))?;
        let preload_dependency_count = ar.read_i32::<LE>()?;
        let preload_offset = ar.read_i32::<LE>()?;

        ar.seek_to(to_offset(name_offset.into(), "name offset")?)?;
        let names = NameTable::read(ar, name_count)?;
        ar.seek_to(to_offset(link_offset.into(), "link offset")?)?;
        let links = LinkTable::read(ar, link_count)?;
        ar.seek_to(to_offset(category_offset.into(), "category offset")?)?;
        let categories = read_array(category_count, ar, CategoryEntry::read)?;
        ar.seek_to(to_offset(depends_offset.into(), "depends offset")?)?;
        let depends = read_array(category_count, ar, |ar| {
            let count = read_count(ar, "depends count")?;
            read_array(count, ar, |ar| Ok(ar.read_i32::<LE>()?))
        })?;
        let soft_package_references = if soft_reference_offset != 0 {
            ar.seek_to(to_offset(soft_reference_offset.into(), "soft package reference offset")?)?;
            Some(read_array(soft_reference_count, ar, |ar| ar.read_fstring())?)
        } else {
            None
        };
        let registry = if registry_offset > 0 {
            ar.seek_to(to_offset(registry_offset.into(), "registry offset")?)?;
            let len = (i64::from(total_header_size) - i64::from(registry_offset)).max(0);
            Some(ar.read_bytes(len as usize)?)
        } else {
            None
        };
        let registry_start = registry.is_some().then_some(registry_offset);
        let rebase = |field, value| HeaderOffset::new(field, value, registry_start);
        let gatherable_text_offset = rebase("gatherable text offset", gatherable_text_offset);
        let searchable_names_offset = rebase("searchable names offset", searchable_names_offset);
        let thumbnail_table_offset = rebase("thumbnail table offset", thumbnail_table_offset);
        let world_tile_info_offset = rebase("world tile info offset", world_tile_info_offset);
        let preload_dependency_offset = rebase("preload dependency offset", preload_offset);
        debug!(
            names = names.len(),
            links = links.len(),
            categories = categories.len(),
            total_header_size,
            "read asset header"
        );

        Ok(Self {
            legacy_file_version,
            legacy_ue3_version,
            file_version_ue4,
            file_version_licensee_ue4,
            custom_versions,
            total_header_size,
            folder_name,
            package_flags,
            gatherable_text_count,
            gatherable_text_offset,
            searchable_names_offset,
            thumbnail_table_offset,
            guid,
            generations,
            saved_by,
            compatible_with,
            compression_flags,
            package_source,
            compressed_chunk_count,
            additional_package_count,
            bulk_data_offset,
            world_tile_info_offset,
            chunk_ids,
            preload_dependency_count,
            preload_dependency_offset,
            names,
            links,
            categories,
            depends,
            soft_package_references,
            registry,
        })
    }

    /// Writes the header at the current position. Offsets are relative to that
    /// position; category sizes and offsets are left to the returned slots.
    #[instrument(name = "AssetHeader_write", skip_all)]
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<HeaderSlots> {
        if self.depends.len() != self.categories.len() {
            return Err(Error::CategoryCount {
                expected: self.categories.len(),
                found: self.depends.len(),
            });
        }
        let base = ar.position();
        ar.write_u32::<LE>(ASSET_MAGIC)?;
        ar.write_i32::<LE>(self.legacy_file_version)?;
        ar.write_i32::<LE>(self.legacy_ue3_version)?;
        ar.write_i32::<LE>(self.file_version_ue4)?;
        ar.write_i32::<LE>(self.file_version_licensee_ue4)?;
        ar.write_i32::<LE>(self.custom_versions.len() as i32)?;
        for version in &self.custom_versions {
            version.key.write(ar)?;
            ar.write_i32::<LE>(version.version)?;
        }
        let total_header_size = ar.reserve::<i32>()?;
        ar.write_fstring(&self.folder_name)?;
        ar.write_u32::<LE>(self.package_flags)?;
        ar.write_i32::<LE>(self.names.len() as i32)?;
        let name_offset = ar.reserve::<i32>()?;
        ar.write_i32::<LE>(self.gatherable_text_count)?;
        let gatherable_text_offset = ar.reserve::<i32>()?;
        ar.write_i32::<LE>(self.categories.len() as i32)?;
        let category_offset = ar.reserve::<i32>()?;
        ar.write_i32::<LE>(self.links.len() as i32)?;
        let link_offset = ar.reserve::<i32>()?;
        let depends_offset = ar.reserve::<i32>()?;
        let soft_references = self.soft_package_references.as_deref();
        ar.write_i32::<LE>(soft_references.map_or(0, |r| r.len() as i32))?;
        let soft_reference_offset = ar.reserve::<i32>()?;
        let searchable_names_offset = ar.reserve::<i32>()?;
        let thumbnail_table_offset = ar.reserve::<i32>()?;
        self.guid.write(ar)?;
        ar.write_i32::<LE>(self.generations.len() as i32)?;
        for (i, generation) in self.generations.iter().enumerate() {
            if i == 0 {
                ar.write_i32::<LE>(self.categories.len() as i32)?;
                ar.write_i32::<LE>(self.names.len() as i32)?;
            } else {
                ar.write_i32::<LE>(generation.category_count)?;
                ar.write_i32::<LE>(generation.name_count)?;
            }
        }
        self.saved_by.write(ar)?;
        self.compatible_with.write(ar)?;
        ar.write_u32::<LE>(self.compression_flags)?;
        ar.write_u32::<LE>(self.package_source)?;
        ar.write_i32::<LE>(self.compressed_chunk_count)?;
        ar.write_i32::<LE>(self.additional_package_count)?;
        let registry_offset = ar.reserve::<i32>()?;
        let bulk_data_offset = ar.reserve::<i64>()?;
        let world_tile_info_offset = ar.reserve::<i32>()?;
        ar.write_i32::<LE>(self.chunk_ids.len() as i32)?;
        for id in &self.chunk_ids {
            ar.write_i32::<LE>(*id)?;
        }
        ar.write_i32::<LE>(self.preload_dependency_count)?;
        let preload_offset = ar.reserve::<i32>()?;

        ar.commit(name_offset, relative(ar, base));
        self.names.write(ar)?;
        ar.commit(link_offset, relative(ar, base));
        self.links.write(ar)?;
        ar.commit(category_offset, relative(ar, base));
        let mut categories = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            categories.push(category.write(ar)?);
        }
        ar.commit(depends_offset, relative(ar, base));
        for list in &self.depends {
            ar.write_i32::<LE>(list.len() as i32)?;
            for index in list {
                ar.write_i32::<LE>(*index)?;
            }
        }
        match soft_references {
            Some(references) => {
                ar.commit(soft_reference_offset, relative(ar, base));
                for reference in references {
                    ar.write_fstring(reference)?;
                }
            }
            None => ar.commit(soft_reference_offset, 0),
        }
        let registry_start = match &self.registry {
            Some(registry) => {
                let start = relative(ar, base);
                ar.write_all(registry)?;
                start
            }
            None => 0,
        };
        ar.commit(registry_offset, registry_start);
        for (slot, offset) in [
            (gatherable_text_offset, self.gatherable_text_offset),
            (searchable_names_offset, self.searchable_names_offset),
            (thumbnail_table_offset, self.thumbnail_table_offset),
            (world_tile_info_offset, self.world_tile_info_offset),
            (preload_offset, self.preload_dependency_offset),
        ] {
            ar.commit(slot, offset.resolve(registry_start));
        }
        let size = ar.position() - base;
        ar.commit(total_header_size, size as i32);
        debug!(size, "wrote asset header");

        Ok(HeaderSlots {
            size,
            categories,
            bulk_data_offset,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryData {
    pub object: CategoryObject,
    /// Bytes inside the category's declared length that follow the decoded object
    pub extra: Vec<u8>,
    /// Bytes between the category's end and the next category (or the trailing magic)
    pub padding: Vec<u8>,
}

/// The `.uexp` half of an asset: one decoded object per category descriptor,
/// followed by the trailing magic.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetData {
    /// Bytes between the end of the header and the first category
    #[serde(default)]
    pub leading: Vec<u8>,
    pub categories: Vec<CategoryData>,
}
impl AssetData {
    /// Decodes the payload range. Category offsets in `header` are absolute within
    /// the combined asset, so the payload starts at `total_header_size`.
    #[instrument(name = "AssetData_read", skip_all)]
    pub(crate) fn read(ar: &Reader<'_>, header: &AssetHeader) -> Result<Self> {
        let len = ar.len() as i64;
        let footer = len - 4;
        if footer < 0 {
            return Err(Error::Overrun {
                offset: ar.absolute_position(),
                needed: 4,
                end: ar.len(),
            });
        }
        let mut tail = ar.range(footer as usize, 4)?;
        let magic = tail.read_u32::<LE>()?;
        if magic != ASSET_MAGIC {
            return Err(Error::BadMagic {
                what: "asset footer",
                expected: ASSET_MAGIC,
                found: magic,
            });
        }

        let header_size = i64::from(header.total_header_size);
        let names = Names::Indexed {
            names: &header.names,
            links: &header.links,
        };
        let mut ctx = Context::new((), names);
        let first = header
            .categories
            .first()
            .map_or(footer, |entry| entry.serial_offset - header_size);
        // a first category outside the payload is reported by the bounds check below
        let leading = if (0..=footer).contains(&first) {
            ar.range(0, first as usize)?.as_slice().to_vec()
        } else {
            vec![]
        };
        let mut categories = Vec::with_capacity(header.categories.len());
        for (index, entry) in header.categories.iter().enumerate() {
            let start = entry.serial_offset - header_size;
            let end = start + entry.serial_size;
            let next = match header.categories.get(index + 1) {
                Some(next) => next.serial_offset - header_size,
                None => footer,
            };
            if start < 0 || entry.serial_size < 0 || end > next || next > footer {
                return Err(Error::CategoryBounds {
                    index,
                    start,
                    end,
                    limit: next.min(footer),
                });
            }
            let data_table = ctx.name(ctx.resolve_link(entry.class_index)?)? == "DataTable";
            let range = ar.range(start as usize, entry.serial_size as usize)?;
            let mut sub = ctx.nested(range);
            let object = CategoryObject::read(&mut sub, data_table).map_err(|e| Error::Category {
                index,
                offset: sub.stream.absolute_position(),
                source: Box::new(e),
            })?;
            let consumed = sub.stream.position();
            let extra = range.as_slice()[consumed..].to_vec();
            let padding = ar.range(end as usize, (next - end) as usize)?.as_slice().to_vec();
            categories.push(CategoryData {
                object,
                extra,
                padding,
            });
        }
        Ok(Self {
            leading,
            categories,
        })
    }

    /// Writes the payload and reports where each category landed. `header_size`
    /// is the byte length of the header this payload belongs to.
    #[instrument(name = "AssetData_write", skip_all)]
    pub(crate) fn write<A: ArchiveWriter>(
        &self,
        ar: &mut A,
        header: &AssetHeader,
        header_size: usize,
    ) -> Result<PayloadLayout> {
        if self.categories.len() != header.categories.len() {
            return Err(Error::CategoryCount {
                expected: header.categories.len(),
                found: self.categories.len(),
            });
        }
        let origin = ar.position();
        ar.write_all(&self.leading)?;
        let mut layout = Vec::with_capacity(self.categories.len());
        for category in &self.categories {
            let start = ar.position();
            {
                let names = Names::Indexed {
                    names: &header.names,
                    links: &header.links,
                };
                let mut ctx = Context::new(&mut *ar, names);
                category.object.write(&mut ctx)?;
            }
            ar.write_all(&category.extra)?;
            layout.push(CategoryLayout {
                start: (header_size + start - origin) as i64,
                length: (ar.position() - start) as i64,
            });
            ar.write_all(&category.padding)?;
        }
        ar.write_u32::<LE>(ASSET_MAGIC)?;
        Ok(PayloadLayout {
            categories: layout,
            size: ar.position() - origin,
        })
    }
}

/// A fully decoded asset: header plus payload.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub header: AssetHeader,
    pub data: AssetData,
}
impl Asset {
    /// Reads a combined asset (`.uasset` bytes immediately followed by `.uexp` bytes)
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ParseError> {
        let mut bytes = vec![];
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| ParseError {
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
    /// Reads an asset from its `.uasset` and `.uexp` halves
    pub fn from_pair(header: &[u8], payload: &[u8]) -> Result<Self, ParseError> {
        let mut bytes = Vec::with_capacity(header.len() + payload.len());
        bytes.extend_from_slice(header);
        bytes.extend_from_slice(payload);
        Self::from_bytes(&bytes)
    }
    fn read_inner(reader: &mut Reader<'_>) -> Result<Self> {
        let header = AssetHeader::read(reader)?;
        let header_size = to_offset(header.total_header_size.into(), "total header size")?;
        let payload = reader.range(header_size, reader.len().saturating_sub(header_size))?;
        reader.seek_to(header_size)?;
        let data = AssetData::read(&payload, &header)?;
        Ok(Self { header, data })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.encode()?.0)
    }
    /// Encodes the asset and splits it into its `.uasset` and `.uexp` halves
    pub fn to_pair(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        let (mut bytes, header_size) = self.encode()?;
        let payload = bytes.split_off(header_size);
        Ok((bytes, payload))
    }
    fn encode(&self) -> Result<(Vec<u8>, usize)> {
        let mut writer = Writer::new();
        let slots = self.header.write(&mut writer)?;
        let header_size = slots.size;
        let layout = self.data.write(&mut writer, &self.header, header_size)?;
        slots.commit_layout(&mut writer, &layout);
        Ok((writer.into_inner(), header_size))
    }

    /// Name the link reference resolves to
    pub fn link_name(&self, index: i32) -> Result<&str> {
        self.header.link_name(index)
    }
}
