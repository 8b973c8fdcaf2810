use std::io::Write;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::context::Context;
use crate::names::{FName, NameTable};
use crate::{Error, FGuid, FString, Result};

fn read_optional_guid<A: ArchiveReader>(ar: &mut A) -> Result<Option<FGuid>> {
    Ok(if ar.read_u8()? > 0 {
        Some(FGuid::read(ar)?)
    } else {
        None
    })
}
fn write_optional_guid<A: ArchiveWriter>(ar: &mut A, id: Option<FGuid>) -> Result<()> {
    if let Some(id) = id {
        ar.write_u8(1)?;
        id.write(ar)?;
    } else {
        ar.write_u8(0)?;
    }
    Ok(())
}

fn checked_len(field: &'static str, value: i64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::OutOfRange { field, value })
}

/// Value kinds selected by a property's type-name string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyType {
    BoolProperty,
    Int8Property,
    Int16Property,
    IntProperty,
    Int64Property,
    UInt8Property,
    UInt16Property,
    UInt32Property,
    UInt64Property,
    FloatProperty,
    DoubleProperty,
    TextProperty,
    StrProperty,
    NameProperty,
    ObjectProperty,
    SoftObjectProperty,
    EnumProperty,
    ByteProperty,
    ArrayProperty,
    MapProperty,
    StructProperty,
    Guid,
    DateTime,
    /// Any type name not listed above; the body is kept as opaque bytes
    Unknown,
}
impl PropertyType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "BoolProperty" => Self::BoolProperty,
            "Int8Property" => Self::Int8Property,
            "Int16Property" => Self::Int16Property,
            "IntProperty" => Self::IntProperty,
            "Int64Property" => Self::Int64Property,
            "UInt8Property" => Self::UInt8Property,
            "UInt16Property" => Self::UInt16Property,
            "UInt32Property" => Self::UInt32Property,
            "UInt64Property" => Self::UInt64Property,
            "FloatProperty" => Self::FloatProperty,
            "DoubleProperty" => Self::DoubleProperty,
            "TextProperty" => Self::TextProperty,
            "StrProperty" => Self::StrProperty,
            "NameProperty" => Self::NameProperty,
            "ObjectProperty" => Self::ObjectProperty,
            "SoftObjectProperty" => Self::SoftObjectProperty,
            "EnumProperty" => Self::EnumProperty,
            "ByteProperty" => Self::ByteProperty,
            "ArrayProperty" => Self::ArrayProperty,
            "MapProperty" => Self::MapProperty,
            "StructProperty" => Self::StructProperty,
            "Guid" => Self::Guid,
            "DateTime" => Self::DateTime,
            _ => Self::Unknown,
        }
    }
    pub fn get_name(&self) -> Option<&'static str> {
        Some(match self {
            Self::BoolProperty => "BoolProperty",
            Self::Int8Property => "Int8Property",
            Self::Int16Property => "Int16Property",
            Self::IntProperty => "IntProperty",
            Self::Int64Property => "Int64Property",
            Self::UInt8Property => "UInt8Property",
            Self::UInt16Property => "UInt16Property",
            Self::UInt32Property => "UInt32Property",
            Self::UInt64Property => "UInt64Property",
            Self::FloatProperty => "FloatProperty",
            Self::DoubleProperty => "DoubleProperty",
            Self::TextProperty => "TextProperty",
            Self::StrProperty => "StrProperty",
            Self::NameProperty => "NameProperty",
            Self::ObjectProperty => "ObjectProperty",
            Self::SoftObjectProperty => "SoftObjectProperty",
            Self::EnumProperty => "EnumProperty",
            Self::ByteProperty => "ByteProperty",
            Self::ArrayProperty => "ArrayProperty",
            Self::MapProperty => "MapProperty",
            Self::StructProperty => "StructProperty",
            Self::Guid => "Guid",
            Self::DateTime => "DateTime",
            Self::Unknown => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TextHistory {
    /// Culture invariant strings (tag -1)
    None { strings: Vec<FString> },
    /// Localized string (tag 0)
    Base {
        namespace: FString,
        key: FString,
        source: FString,
    },
    /// String table entry (tag 11)
    StringTableEntry { table: FName, key: FString },
    /// Any other history tag; the rest of the body is kept verbatim
    Other { tag: i8, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub flags: i32,
    pub history: TextHistory,
}
impl Text {
    #[instrument(name = "Text_read", skip_all)]
    fn read<R: ArchiveReader>(ar: &mut Context<'_, R>) -> Result<Self> {
        let start = ar.position();
        let flags = ar.read_i32::<LE>()?;
        let tag = ar.read_i8()?;
        let history = match tag {
            -1 => {
                let count = ar.read_i32::<LE>()?;
                let count = checked_len("text string count", count.into())?;
                let mut strings = Vec::with_capacity(count.min(ar.remaining()));
                for _ in 0..count {
                    strings.push(ar.read_fstring()?);
                }
                TextHistory::None { strings }
            }
            0 => TextHistory::Base {
                namespace: ar.read_fstring()?,
                key: ar.read_fstring()?,
                source: ar.read_fstring()?,
            },
            11 => TextHistory::StringTableEntry {
                table: ar.read_name()?,
                key: ar.read_fstring()?,
            },
            tag => {
                let consumed = (ar.position() - start) as i64;
                let rest = (ar.length() - consumed).max(0);
                TextHistory::Other {
                    tag,
                    data: ar.read_bytes(rest as usize)?,
                }
            }
        };
        Ok(Self { flags, history })
    }
    fn write<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        ar.write_i32::<LE>(self.flags)?;
        match &self.history {
            TextHistory::None { strings } => {
                ar.write_i8(-1)?;
                ar.write_i32::<LE>(strings.len() as i32)?;
                for s in strings {
                    ar.write_fstring(s)?;
                }
            }
            TextHistory::Base {
                namespace,
                key,
                source,
            } => {
                ar.write_i8(0)?;
                ar.write_fstring(namespace)?;
                ar.write_fstring(key)?;
                ar.write_fstring(source)?;
            }
            TextHistory::StringTableEntry { table, key } => {
                ar.write_i8(11)?;
                ar.write_name(*table)?;
                ar.write_fstring(key)?;
            }
            TextHistory::Other { tag, data } => {
                ar.write_i8(*tag)?;
                ar.write_all(data)?;
            }
        }
        Ok(())
    }
}

/// Type and value names that save-game object references carry inline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineObject {
    pub type_name: i32,
    pub value: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    /// Link reference, see [`crate::LinkTable::resolve`]
    pub link: i32,
    pub inline: Option<InlineObject>,
}
impl ObjectRef {
    fn read<R: ArchiveReader>(ar: &mut Context<'_, R>) -> Result<Self> {
        let link = ar.read_i32::<LE>()?;
        let inline = if ar.inline_names() {
            Some(InlineObject {
                type_name: ar.read_name_index()?,
                value: ar.read_name_index()?,
            })
        } else {
            None
        };
        Ok(Self { link, inline })
    }
    fn write<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        ar.write_i32::<LE>(self.link)?;
        if ar.inline_names() {
            let inline = self.inline.ok_or_else(|| {
                Error::Other("object reference lacks the inline names of the save format".into())
            })?;
            ar.write_name_index(inline.type_name)?;
            ar.write_name_index(inline.value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftObjectRef {
    pub name: i32,
    /// 64-bit in assets, 32-bit in save games
    pub id: u64,
}
impl SoftObjectRef {
    fn read<R: ArchiveReader>(ar: &mut Context<'_, R>) -> Result<Self> {
        let name = ar.read_name_index()?;
        let id = if ar.inline_names() {
            ar.read_u32::<LE>()?.into()
        } else {
            ar.read_u64::<LE>()?
        };
        Ok(Self { name, id })
    }
    fn write<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        ar.write_name_index(self.name)?;
        if ar.inline_names() {
            let id = u32::try_from(self.id).map_err(|_| Error::OutOfRange {
                field: "soft object id",
                value: self.id as i64,
            })?;
            ar.write_u32::<LE>(id)?;
        } else {
            ar.write_u64::<LE>(self.id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumValue {
    pub enum_type: FName,
    pub value: FName,
}

/// Body of a byte property, its width chosen by the declared length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ByteData {
    /// Declared length of one byte
    Byte(u8),
    /// Declared length of eight bytes, or none at all inside containers
    Int(u64),
    /// Any other declared length
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteValue {
    pub enum_type: FName,
    pub value: ByteData,
}

/// Inner tag preceding the elements of an array of structs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayStructTag {
    pub name: FName,
    pub type_name: FName,
    pub struct_type: FName,
    pub guid: FGuid,
    pub id: Option<FGuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayBody {
    Values(Vec<PropertyValue>),
    /// Struct elements that did not decode as property lists, kept with their count
    Raw { count: i32, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub inner_type: FName,
    pub struct_tag: Option<ArrayStructTag>,
    pub body: ArrayBody,
}
impl ArrayValue {
    /// Decoded elements, unless they were kept raw
    pub fn values(&self) -> Option<&[PropertyValue]> {
        match &self.body {
            ArrayBody::Values(values) => Some(values),
            ArrayBody::Raw { .. } => None,
        }
    }

    #[instrument(name = "ArrayValue_read_body", skip_all)]
    fn read_body<R: ArchiveReader>(&mut self, ar: &mut Context<'_, R>) -> Result<()> {
        let start = ar.position();
        let raw_count = ar.read_i32::<LE>()?;
        let count = checked_len("array count", raw_count.into())?;
        let inner = PropertyType::from_name(ar.name(self.inner_type.index)?);
        if inner == PropertyType::StructProperty {
            let name = ar.read_name()?;
            let type_name = ar.read_name()?;
            // recomputed on write
            let element_length = ar.read_i64::<LE>()?;
            let tag = ArrayStructTag {
                name,
                type_name,
                struct_type: ar.read_name()?,
                guid: FGuid::read(ar)?,
                id: read_optional_guid(ar)?,
            };
            let values = ar.with_length(element_length, |ar| {
                read_inferred(ar, |ar| {
                    let mut values = Vec::with_capacity(count.min(ar.remaining()));
                    for _ in 0..count {
                        values.push(PropertyValue::read_element(
                            ar,
                            inner,
                            Some(tag.struct_type),
                            0,
                        )?);
                    }
                    Ok(values)
                })
            })?;
            self.body = match values {
                Some(values) => ArrayBody::Values(values),
                None => ArrayBody::Raw {
                    count: raw_count,
                    data: ar.read_bytes(checked_len("array element length", element_length)?)?,
                },
            };
            self.struct_tag = Some(tag);
        } else {
            let consumed = (ar.position() - start) as i64;
            let element_length = match count {
                0 => 0,
                n => (ar.length() - consumed) / n as i64,
            };
            let mut values = Vec::with_capacity(count.min(ar.remaining()));
            for _ in 0..count {
                values.push(PropertyValue::read_element(ar, inner, None, element_length)?);
            }
            self.body = ArrayBody::Values(values);
        }
        Ok(())
    }
    fn write_body<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        let count = match &self.body {
            ArrayBody::Values(values) => i32::try_from(values.len()).map_err(|_| {
                Error::OutOfRange {
                    field: "array count",
                    value: values.len() as i64,
                }
            })?,
            ArrayBody::Raw { count, .. } => *count,
        };
        ar.write_i32::<LE>(count)?;
        let length = match &self.struct_tag {
            Some(tag) => {
                ar.write_name(tag.name)?;
                ar.write_name(tag.type_name)?;
                let length = ar.reserve::<i64>()?;
                ar.write_name(tag.struct_type)?;
                tag.guid.write(ar)?;
                write_optional_guid(ar, tag.id)?;
                Some(length)
            }
            None => None,
        };
        let start = ar.position();
        match &self.body {
            ArrayBody::Values(values) => {
                for value in values {
                    value.write_element(ar)?;
                }
            }
            ArrayBody::Raw { data, .. } => ar.write_all(data)?,
        }
        if let Some(length) = length {
            ar.commit(length, (ar.position() - start) as i64);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: PropertyValue,
    pub value: PropertyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MapBody {
    Entries(Vec<MapEntry>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    pub key_type: FName,
    pub value_type: FName,
    pub body: MapBody,
}
impl MapValue {
    #[instrument(name = "MapValue_read_body", skip_all)]
    fn read_body<R: ArchiveReader>(&mut self, ar: &mut Context<'_, R>) -> Result<()> {
        let key_type = PropertyType::from_name(ar.name(self.key_type.index)?);
        let value_type = PropertyType::from_name(ar.name(self.value_type.index)?);
        let entries = read_inferred(ar, |ar| {
            let removed = ar.read_i32::<LE>()?;
            if removed != 0 {
                return Err(Error::Other(format!("map removes {removed} keys")));
            }
            let count = ar.read_i32::<LE>()?;
            let count = checked_len("map count", count.into())?;
            let mut entries = Vec::with_capacity(count.min(ar.remaining()));
            for _ in 0..count {
                entries.push(MapEntry {
                    key: PropertyValue::read_element(ar, key_type, None, 0)?,
                    value: PropertyValue::read_element(ar, value_type, None, 0)?,
                });
            }
            Ok(entries)
        })?;
        self.body = match entries {
            Some(entries) => MapBody::Entries(entries),
            None => MapBody::Raw(ar.read_bytes(checked_len("map length", ar.length())?)?),
        };
        Ok(())
    }
    fn write_body<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        match &self.body {
            MapBody::Entries(entries) => {
                ar.write_i32::<LE>(0)?;
                ar.write_i32::<LE>(entries.len() as i32)?;
                for entry in entries {
                    entry.key.write_element(ar)?;
                    entry.value.write_element(ar)?;
                }
            }
            MapBody::Raw(data) => ar.write_all(data)?,
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructItem {
    Guid(FGuid),
    DateTime(u64),
    Properties(Vec<Property>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StructBody {
    Items(Vec<StructItem>),
    Raw(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructValue {
    /// Unset for struct keys and values of maps, which are always property lists
    pub struct_type: Option<FName>,
    pub guid: FGuid,
    pub body: StructBody,
}
impl StructValue {
    pub fn new(struct_type: Option<FName>) -> Self {
        Self {
            struct_type,
            guid: FGuid::default(),
            body: StructBody::Items(vec![]),
        }
    }
    pub fn type_name<'n>(&self, names: &'n NameTable) -> Option<&'n str> {
        self.struct_type.and_then(|t| names.get(t.index).ok())
    }
    /// Properties of the first item when it is a property list
    pub fn properties(&self) -> Option<&[Property]> {
        match &self.body {
            StructBody::Items(items) => items.iter().find_map(|item| match item {
                StructItem::Properties(properties) => Some(properties.as_slice()),
                _ => None,
            }),
            StructBody::Raw(_) => None,
        }
    }

    /// Decodes a header-less struct of the given type, such as a table row.
    pub(crate) fn read_element<R: ArchiveReader>(
        ar: &mut Context<'_, R>,
        struct_type: FName,
    ) -> Result<Self> {
        let mut value = Self::new(Some(struct_type));
        ar.with_header_mode(false, |ar| ar.with_length(0, |ar| value.read_body(ar)))?;
        Ok(value)
    }
    pub(crate) fn write_element<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        ar.with_header_mode(false, |ar| self.write_body(ar))
    }

    #[instrument(name = "StructValue_read_body", skip_all)]
    fn read_body<R: ArchiveReader>(&mut self, ar: &mut Context<'_, R>) -> Result<()> {
        let kind = match self.struct_type {
            Some(t) => PropertyType::from_name(ar.name(t.index)?),
            None => PropertyType::Unknown,
        };
        let items = read_inferred(ar, |ar| {
            let length = ar.length();
            let start = ar.position();
            let mut items = vec![];
            // at least one item, further ones while the declared length is not exhausted
            loop {
                let item = ar.with_header_mode(false, |ar| -> Result<StructItem> {
                    Ok(match kind {
                        PropertyType::Guid => StructItem::Guid(FGuid::read(ar)?),
                        PropertyType::DateTime => StructItem::DateTime(ar.read_u64::<LE>()?),
                        _ => StructItem::Properties(read_properties(ar)?),
                    })
                })?;
                items.push(item);
                if (ar.position() - start) as i64 >= length {
                    break;
                }
            }
            Ok(items)
        })?;
        self.body = match items {
            Some(items) => StructBody::Items(items),
            None => StructBody::Raw(ar.read_bytes(checked_len("struct length", ar.length())?)?),
        };
        Ok(())
    }
    fn write_body<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        match &self.body {
            StructBody::Items(items) => {
                for item in items {
                    match item {
                        StructItem::Guid(guid) => guid.write(ar)?,
                        StructItem::DateTime(ticks) => ar.write_u64::<LE>(*ticks)?,
                        StructItem::Properties(properties) => write_properties(ar, properties)?,
                    }
                }
            }
            StructBody::Raw(data) => ar.write_all(data)?,
        }
        Ok(())
    }
}

/// Decodes a body whose shape is inferred rather than declared. When a declared
/// length is available and the decode fails or does not consume exactly that
/// length, the cursor is rewound and `None` is returned so the caller keeps raw bytes.
fn read_inferred<R, T, F>(ar: &mut Context<'_, R>, f: F) -> Result<Option<T>>
where
    R: ArchiveReader,
    F: FnOnce(&mut Context<'_, R>) -> Result<T>,
{
    let length = ar.length();
    if !ar.header_mode() || length <= 0 {
        return f(ar).map(Some);
    }
    let start = ar.position();
    match f(ar) {
        Ok(value) if (ar.position() - start) as i64 == length => return Ok(Some(value)),
        Ok(_) => warn!(
            path = %ar.path(),
            "decoded {} of {} bytes, keeping body raw",
            ar.position() - start,
            length
        ),
        Err(error) => warn!(path = %ar.path(), %error, "body did not decode, keeping it raw"),
    }
    ar.seek_to(start)?;
    Ok(None)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Float(f32),
    Double(f64),
    Text(Text),
    Str(FString),
    Name(FName),
    Object(ObjectRef),
    SoftObject(SoftObjectRef),
    Enum(EnumValue),
    Byte(ByteValue),
    Array(ArrayValue),
    Map(MapValue),
    Struct(StructValue),
    Guid(FGuid),
    /// 64-bit tick count
    DateTime(u64),
    /// Body of a property whose type is not known
    Unknown(Vec<u8>),
}
impl PropertyValue {
    /// Empty value of the given kind, filled in by decoding.
    pub fn empty(ty: PropertyType) -> Self {
        match ty {
            PropertyType::BoolProperty => Self::Bool(false),
            PropertyType::Int8Property => Self::Int8(0),
            PropertyType::Int16Property => Self::Int16(0),
            PropertyType::IntProperty => Self::Int(0),
            PropertyType::Int64Property => Self::Int64(0),
            PropertyType::UInt8Property => Self::UInt8(0),
            PropertyType::UInt16Property => Self::UInt16(0),
            PropertyType::UInt32Property => Self::UInt32(0),
            PropertyType::UInt64Property => Self::UInt64(0),
            PropertyType::FloatProperty => Self::Float(0.0),
            PropertyType::DoubleProperty => Self::Double(0.0),
            PropertyType::TextProperty => Self::Text(Text {
                flags: 0,
                history: TextHistory::None { strings: vec![] },
            }),
            PropertyType::StrProperty => Self::Str(FString::default()),
            PropertyType::NameProperty => Self::Name(FName::default()),
            PropertyType::ObjectProperty => Self::Object(ObjectRef {
                link: 0,
                inline: None,
            }),
            PropertyType::SoftObjectProperty => Self::SoftObject(SoftObjectRef { name: 0, id: 0 }),
            PropertyType::EnumProperty => Self::Enum(EnumValue::default()),
            PropertyType::ByteProperty => Self::Byte(ByteValue {
                enum_type: FName::default(),
                value: ByteData::Byte(0),
            }),
            PropertyType::ArrayProperty => Self::Array(ArrayValue {
                inner_type: FName::default(),
                struct_tag: None,
                body: ArrayBody::Values(vec![]),
            }),
            PropertyType::MapProperty => Self::Map(MapValue {
                key_type: FName::default(),
                value_type: FName::default(),
                body: MapBody::Entries(vec![]),
            }),
            PropertyType::StructProperty => Self::Struct(StructValue::new(None)),
            PropertyType::Guid => Self::Guid(FGuid::default()),
            PropertyType::DateTime => Self::DateTime(0),
            PropertyType::Unknown => Self::Unknown(vec![]),
        }
    }

    fn read_header<R: ArchiveReader>(&mut self, ar: &mut Context<'_, R>) -> Result<()> {
        match self {
            Self::Bool(value) => *value = ar.read_u8()? != 0,
            Self::Enum(value) => value.enum_type = ar.read_name()?,
            Self::Byte(value) => value.enum_type = ar.read_name()?,
            Self::Array(value) => value.inner_type = ar.read_name()?,
            Self::Map(value) => {
                value.key_type = ar.read_name()?;
                value.value_type = ar.read_name()?;
            }
            Self::Struct(value) => {
                value.struct_type = Some(ar.read_name()?);
                value.guid = FGuid::read(ar)?;
            }
            _ => {}
        }
        Ok(())
    }
    fn write_header<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        match self {
            Self::Bool(value) => ar.write_u8(u8::from(*value))?,
            Self::Enum(value) => ar.write_name(value.enum_type)?,
            Self::Byte(value) => ar.write_name(value.enum_type)?,
            Self::Array(value) => ar.write_name(value.inner_type)?,
            Self::Map(value) => {
                ar.write_name(value.key_type)?;
                ar.write_name(value.value_type)?;
            }
            Self::Struct(value) => {
                let struct_type = value.struct_type.ok_or_else(|| {
                    Error::Other("struct property without a struct type".into())
                })?;
                ar.write_name(struct_type)?;
                value.guid.write(ar)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn read_body<R: ArchiveReader>(&mut self, ar: &mut Context<'_, R>) -> Result<()> {
        match self {
            Self::Bool(value) => {
                if !ar.header_mode() {
                    *value = ar.read_u8()? != 0;
                }
            }
            Self::Int8(value) => *value = ar.read_i8()?,
            Self::Int16(value) => *value = ar.read_i16::<LE>()?,
            Self::Int(value) => *value = ar.read_i32::<LE>()?,
            Self::Int64(value) => *value = ar.read_i64::<LE>()?,
            Self::UInt8(value) => *value = ar.read_u8()?,
            Self::UInt16(value) => *value = ar.read_u16::<LE>()?,
            Self::UInt32(value) => *value = ar.read_u32::<LE>()?,
            Self::UInt64(value) => *value = ar.read_u64::<LE>()?,
            Self::Float(value) => *value = ar.read_f32::<LE>()?,
            Self::Double(value) => *value = ar.read_f64::<LE>()?,
            Self::Text(value) => *value = Text::read(ar)?,
            Self::Str(value) => *value = ar.read_fstring()?,
            Self::Name(value) => *value = ar.read_name()?,
            Self::Object(value) => *value = ObjectRef::read(ar)?,
            Self::SoftObject(value) => *value = SoftObjectRef::read(ar)?,
            Self::Enum(value) => value.value = ar.read_name()?,
            Self::Byte(value) => {
                value.value = match ar.length() {
                    1 => ByteData::Byte(ar.read_u8()?),
                    0 | 8 => ByteData::Int(ar.read_u64::<LE>()?),
                    length => ByteData::Raw(ar.read_bytes(checked_len("byte length", length)?)?),
                }
            }
            Self::Array(value) => value.read_body(ar)?,
            Self::Map(value) => value.read_body(ar)?,
            Self::Struct(value) => value.read_body(ar)?,
            Self::Guid(value) => *value = FGuid::read(ar)?,
            Self::DateTime(value) => *value = ar.read_u64::<LE>()?,
            Self::Unknown(value) => *value = ar.read_bytes(checked_len("length", ar.length())?)?,
        }
        Ok(())
    }
    fn write_body<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        match self {
            Self::Bool(value) => {
                if !ar.header_mode() {
                    ar.write_u8(u8::from(*value))?;
                }
            }
            Self::Int8(value) => ar.write_i8(*value)?,
            Self::Int16(value) => ar.write_i16::<LE>(*value)?,
            Self::Int(value) => ar.write_i32::<LE>(*value)?,
            Self::Int64(value) => ar.write_i64::<LE>(*value)?,
            Self::UInt8(value) => ar.write_u8(*value)?,
            Self::UInt16(value) => ar.write_u16::<LE>(*value)?,
            Self::UInt32(value) => ar.write_u32::<LE>(*value)?,
            Self::UInt64(value) => ar.write_u64::<LE>(*value)?,
            Self::Float(value) => ar.write_f32::<LE>(*value)?,
            Self::Double(value) => ar.write_f64::<LE>(*value)?,
            Self::Text(value) => value.write(ar)?,
            Self::Str(value) => ar.write_fstring(value)?,
            Self::Name(value) => ar.write_name(*value)?,
            Self::Object(value) => value.write(ar)?,
            Self::SoftObject(value) => value.write(ar)?,
            Self::Enum(value) => ar.write_name(value.value)?,
            Self::Byte(value) => match &value.value {
                ByteData::Byte(byte) => ar.write_u8(*byte)?,
                ByteData::Int(int) => ar.write_u64::<LE>(*int)?,
                ByteData::Raw(data) => ar.write_all(data)?,
            },
            Self::Array(value) => value.write_body(ar)?,
            Self::Map(value) => value.write_body(ar)?,
            Self::Struct(value) => value.write_body(ar)?,
            Self::Guid(value) => value.write(ar)?,
            Self::DateTime(value) => ar.write_u64::<LE>(*value)?,
            Self::Unknown(value) => ar.write_all(value)?,
        }
        Ok(())
    }

    /// Decodes a header-less value, as found in containers and table rows.
    pub(crate) fn read_element<R: ArchiveReader>(
        ar: &mut Context<'_, R>,
        ty: PropertyType,
        struct_type: Option<FName>,
        length: i64,
    ) -> Result<Self> {
        if matches!(ty, PropertyType::ArrayProperty | PropertyType::MapProperty) {
            return Err(Error::Other(format!(
                "{} cannot be nested directly inside a container",
                ty.get_name().unwrap_or_default()
            )));
        }
        let mut value = Self::empty(ty);
        if let Self::Struct(s) = &mut value {
            s.struct_type = struct_type;
        }
        ar.with_header_mode(false, |ar| ar.with_length(length, |ar| value.read_body(ar)))?;
        Ok(value)
    }
    pub(crate) fn write_element<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        ar.with_header_mode(false, |ar| self.write_body(ar))
    }
}

/// A tagged property. Properties consist of a name, a type name, the byte length
/// of the value body, an optional property GUID and the value itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: FName,
    pub type_name: FName,
    /// Body length as read; recomputed when written
    pub length: i64,
    pub id: Option<FGuid>,
    pub value: PropertyValue,
}
impl Property {
    pub fn new(name: FName, type_name: FName, value: PropertyValue) -> Self {
        Self {
            name,
            type_name,
            length: 0,
            id: None,
            value,
        }
    }

    #[instrument(name = "Property_read", skip_all)]
    pub(crate) fn read<R: ArchiveReader>(ar: &mut Context<'_, R>) -> Result<Option<Self>> {
        let name = ar.read_name()?;
        if ar.is_none_name(name)? {
            return Ok(None);
        }
        let type_name = ar.read_name()?;
        let length = ar.read_i64::<LE>()?;
        if length < 0 {
            return Err(Error::OutOfRange {
                field: "property length",
                value: length,
            });
        }
        let ty = {
            let type_string = ar.type_string(name, type_name)?;
            let ty = PropertyType::from_name(type_string);
            if ty == PropertyType::Unknown {
                warn!(type_name = type_string, length, "unknown property type, keeping opaque");
            }
            ty
        };
        let scope = ar.name(name.index)?.to_owned();
        ar.with_scope(&scope, |ar| {
            ar.with_header_mode(true, |ar| {
                ar.with_length(length, |ar| -> Result<Option<Property>> {
                    let mut value = PropertyValue::empty(ty);
                    value.read_header(ar)?;
                    let id = read_optional_guid(ar)?;
                    value.read_body(ar)?;
                    Ok(Some(Property {
                        name,
                        type_name,
                        length,
                        id,
                        value,
                    }))
                })
            })
        })
    }
    pub(crate) fn write<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        ar.write_name(self.name)?;
        ar.write_name(self.type_name)?;
        let length = ar.reserve::<i64>()?;
        ar.with_header_mode(true, |ar| -> Result<()> {
            self.value.write_header(ar)?;
            write_optional_guid(ar, self.id)?;
            let start = ar.position();
            self.value.write_body(ar)?;
            ar.commit(length, (ar.position() - start) as i64);
            Ok(())
        })
    }
}

/// Reads properties up to and including the `None` terminator.
pub(crate) fn read_properties<R: ArchiveReader>(ar: &mut Context<'_, R>) -> Result<Vec<Property>> {
    ar.with_header_mode(true, |ar| -> Result<Vec<Property>> {
        let mut properties = vec![];
        while let Some(property) = Property::read(ar)? {
            properties.push(property);
        }
        Ok(properties)
    })
}
pub(crate) fn write_properties<W: ArchiveWriter>(
    ar: &mut Context<'_, W>,
    properties: &[Property],
) -> Result<()> {
    for property in properties {
        property.write(ar)?;
    }
    ar.write_none()
}
