/*!
A library for reading and writing Unreal Engine 4 cooked assets byte for byte.

It decodes the `.uasset`/`.uexp` pair of an asset into a header (name table, link
table, category descriptors) and one object per category, and encodes it back into
identical bytes when nothing was edited. Size and offset fields are recomputed on
write, so edited assets stay self-consistent.

Assets are shipped inside `.pak` archives, which are read and written here as well,
together with their `.sig` checksum sidecar. The same property codec also reads GVAS
save files, where names are stored inline instead of through a name table. Harmonix
data trees (`.dtb`) embedded in song assets have a codec of their own in [`dtb`].

# Example

```no_run
use std::fs;

use ueasset::{Asset, PropertyValue};

let asset = Asset::from_pair(
    &fs::read("DT_Songs.uasset")?,
    &fs::read("DT_Songs.uexp")?,
)?;
let names = &asset.header.names;
for category in &asset.data.categories {
    if let Some(property) = category.object.base().get(names, "Title") {
        if let PropertyValue::Str(title) = &property.value {
            println!("{title}");
        }
    }
}
let (uasset, uexp) = asset.to_pair()?;
fs::write("DT_Songs.uasset", uasset)?;
fs::write("DT_Songs.uexp", uexp)?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/

mod archive;
mod context;
mod error;

pub mod asset;
pub mod dtb;
pub mod names;
pub mod object;
pub mod ogg;
pub mod pak;
pub mod property;
pub mod save;
pub mod signature;

#[cfg(test)]
mod tests;

pub use asset::{
    paired_name, Asset, AssetData, AssetHeader, CategoryData, CategoryEntry, CustomVersion,
    EngineVersion, Generation, HeaderOffset,
};
pub use dtb::{DtbArray, DtbNode, DtbTree};
pub use error::{Error, ParseError};
pub use names::{FName, Link, LinkTable, NameEntry, NameTable};
pub use object::{CategoryObject, DataTable, DataTableRow, NormalObject};
pub use ogg::{build_mogg, OggError, OggMap};
pub use pak::{EntryPayload, EntryRecord, Pak, PakEntry, PakFooter};
pub use property::{Property, PropertyType, PropertyValue, StructValue};
pub use save::SaveFile;
pub use signature::PakSignature;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{de::Visitor, Deserialize, Deserializer, Serialize, Serializer};
use tracing::instrument;

use crate::archive::{ArchiveReader, ArchiveWriter};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Character width a length-prefixed string was stored with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StringEncoding {
    /// One byte per character, read as Latin-1
    Narrow,
    /// UTF-16 code units, flagged by a negative length
    Wide,
}

/// Length-prefixed string that remembers how it was stored.
///
/// A freshly built string is written the way the engine writes one: empty strings as a
/// bare zero length, ASCII narrow and everything else wide, each with one terminator.
/// Strings read from a file keep their width and every byte from the terminator on, so
/// oddities such as a length of one holding only the terminator survive a rewrite.
#[derive(Debug, Default, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FString {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<StringEncoding>,
    /// Terminator and anything after it, when not a single terminator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing: Option<Vec<u8>>,
}

impl FString {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self {
            value: value.into(),
            encoding: None,
            trailing: None,
        }
    }

    /// Builds the string found on disk, dropping whatever matches the default form.
    pub(crate) fn stored(value: String, encoding: StringEncoding, trailing: Vec<u8>) -> Self {
        let trailing = (trailing != encoding.terminator()).then_some(trailing);
        let encoding = (value.is_empty() || Self::default_encoding(&value) != encoding)
            .then_some(encoding);
        Self {
            value,
            encoding,
            trailing,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    fn default_encoding(value: &str) -> StringEncoding {
        if value.is_ascii() {
            StringEncoding::Narrow
        } else {
            StringEncoding::Wide
        }
    }

    /// Width and trailing bytes to write, or `None` for the bare zero length.
    pub(crate) fn layout(&self) -> Option<(StringEncoding, &[u8])> {
        let encoding = match self.encoding {
            None if self.value.is_empty() && self.trailing.is_none() => return None,
            None => Self::default_encoding(&self.value),
            Some(StringEncoding::Narrow) if self.value.chars().any(|c| c as u32 > 0xff) => {
                return Some((StringEncoding::Wide, StringEncoding::Wide.terminator()));
            }
            Some(encoding) => encoding,
        };
        let trailing = self.trailing.as_deref().unwrap_or(encoding.terminator());
        Some((encoding, trailing))
    }
}

impl StringEncoding {
    fn terminator(self) -> &'static [u8] {
        match self {
            Self::Narrow => &[0],
            Self::Wide => &[0, 0],
        }
    }
}

impl From<&str> for FString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for FString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl PartialEq<str> for FString {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}

impl PartialEq<&str> for FString {
    fn eq(&self, other: &&str) -> bool {
        self.value == *other
    }
}

impl std::fmt::Display for FString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FGuid {
    a: u32,
    b: u32,
    c: u32,
    d: u32,
}

impl FGuid {
    pub fn new(a: u32, b: u32, c: u32, d: u32) -> Self {
        Self { a, b, c, d }
    }

    pub fn nil() -> Self {
        Self::default()
    }

    pub fn is_nil(&self) -> bool {
        self.a == 0 && self.b == 0 && self.c == 0 && self.d == 0
    }

    /// Parses the 32 hex digit form, with or without dashes.
    pub fn parse_str(s: &str) -> Result<Self, Error> {
        let s = s.replace('-', "");
        let mut bytes = [0; 16];
        hex::decode_to_slice(&s, &mut bytes)
            .map_err(|e| Error::Other(format!("invalid GUID {s:?}: {e}")))?;
        let word = |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        Ok(Self {
            a: word(0),
            b: word(4),
            c: word(8),
            d: word(12),
        })
    }

    fn to_be_bytes(self) -> [u8; 16] {
        let mut bytes = [0; 16];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip([self.a, self.b, self.c, self.d]) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        bytes
    }
}

impl std::fmt::Display for FGuid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode_upper(self.to_be_bytes()))
    }
}

impl std::str::FromStr for FGuid {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl Serialize for FGuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FGuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FGuidVisitor;

        impl Visitor<'_> for FGuidVisitor {
            type Value = FGuid;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a GUID string of 32 hex digits")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                FGuid::parse_str(value).map_err(E::custom)
            }
        }

        deserializer.deserialize_str(FGuidVisitor)
    }
}

impl FGuid {
    #[instrument(name = "FGuid_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader + ?Sized>(ar: &mut A) -> Result<FGuid> {
        Ok(Self {
            a: ar.read_u32::<LE>()?,
            b: ar.read_u32::<LE>()?,
            c: ar.read_u32::<LE>()?,
            d: ar.read_u32::<LE>()?,
        })
    }
    #[instrument(name = "FGuid_write", skip_all)]
    pub(crate) fn write<A: ArchiveWriter + ?Sized>(&self, ar: &mut A) -> Result<()> {
        ar.write_u32::<LE>(self.a)?;
        ar.write_u32::<LE>(self.b)?;
        ar.write_u32::<LE>(self.c)?;
        ar.write_u32::<LE>(self.d)?;
        Ok(())
    }
}
