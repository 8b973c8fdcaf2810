use std::io::Write;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::archive::{ArchiveReader, ArchiveWriter, Reader, Writer};
use crate::{Error, ParseError, Result};

/// Parenthesized array: node id, child count and an unknown 16-bit word.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtbArray {
    pub node_id: i32,
    pub unknown: u16,
    pub children: Vec<DtbNode>,
}

/// Braced or bracketed subtree: child count first, then the node id.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct DtbTree {
    pub node_id: i32,
    pub children: Vec<DtbNode>,
}

/// One node of a Harmonix data tree, tagged by a 32-bit type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DtbNode {
    Int(i32),
    Float(f32),
    /// Variable name
    Name(String),
    /// Unquoted string
    Keyword(String),
    /// Unhandled-data marker followed by four bytes
    Unhandled(i32),
    IfDef(String),
    Else(i32),
    EndIf(i32),
    Array(DtbArray),
    /// `{}` subtree, used for calls and control structures
    Command(DtbTree),
    /// Quoted string
    String(String),
    /// `[]` subtree
    Bracketed(DtbTree),
    Define(String),
    Include(String),
    Merge(String),
    IfNDef(String),
    /// Any other tag; four bytes follow
    Other { tag: u32, value: i32 },
}

// Strings are stored without a terminator, one Latin-1 byte per character.
fn read_dtb_string<A: ArchiveReader>(ar: &mut A) -> Result<String> {
    let len = ar.read_i32::<LE>()?;
    let len = usize::try_from(len).map_err(|_| Error::OutOfRange {
        field: "data tree string length",
        value: len.into(),
    })?;
    Ok(ar.read_bytes(len)?.into_iter().map(char::from).collect())
}
fn write_dtb_string<A: ArchiveWriter>(ar: &mut A, value: &str) -> Result<()> {
    let bytes = value
        .chars()
        .map(|c| {
            u8::try_from(c).map_err(|_| Error::OutOfRange {
                field: "data tree string character",
                value: i64::from(u32::from(c)),
            })
        })
        .collect::<Result<Vec<u8>>>()?;
    let len = i32::try_from(bytes.len()).map_err(|_| Error::OutOfRange {
        field: "data tree string length",
        value: bytes.len() as i64,
    })?;
    ar.write_i32::<LE>(len)?;
    ar.write_all(&bytes)?;
    Ok(())
}

fn read_children<A: ArchiveReader>(ar: &mut A, count: u16) -> Result<Vec<DtbNode>> {
    let mut children = Vec::with_capacity(usize::from(count).min(ar.remaining()));
    for _ in 0..count {
        children.push(DtbNode::read(ar)?);
    }
    Ok(children)
}
fn child_count(children: &[DtbNode]) -> Result<u16> {
    u16::try_from(children.len()).map_err(|_| Error::OutOfRange {
        field: "data tree child count",
        value: children.len() as i64,
    })
}

impl DtbArray {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let node_id = ar.read_i32::<LE>()?;
        let count = ar.read_u16::<LE>()?;
        let unknown = ar.read_u16::<LE>()?;
        Ok(Self {
            node_id,
            unknown,
            children: read_children(ar, count)?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_i32::<LE>(self.node_id)?;
        ar.write_u16::<LE>(child_count(&self.children)?)?;
        ar.write_u16::<LE>(self.unknown)?;
        for child in &self.children {
            child.write(ar)?;
        }
        Ok(())
    }
}

impl DtbTree {
    fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let count = ar.read_u16::<LE>()?;
        let node_id = ar.read_i32::<LE>()?;
        Ok(Self {
            node_id,
            children: read_children(ar, count)?,
        })
    }
    fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_u16::<LE>(child_count(&self.children)?)?;
        ar.write_i32::<LE>(self.node_id)?;
        for child in &self.children {
            child.write(ar)?;
        }
        Ok(())
    }
}

impl DtbNode {
    pub fn tag(&self) -> u32 {
        match self {
            Self::Int(_) => 0x00,
            Self::Float(_) => 0x01,
            Self::Name(_) => 0x02,
            Self::Keyword(_) => 0x05,
            Self::Unhandled(_) => 0x06,
            Self::IfDef(_) => 0x07,
            Self::Else(_) => 0x08,
            Self::EndIf(_) => 0x09,
            Self::Array(_) => 0x10,
            Self::Command(_) => 0x11,
            Self::String(_) => 0x12,
            Self::Bracketed(_) => 0x13,
            Self::Define(_) => 0x20,
            Self::Include(_) => 0x21,
            Self::Merge(_) => 0x22,
            Self::IfNDef(_) => 0x23,
            Self::Other { tag, .. } => *tag,
        }
    }

    /// Decodes a single node, which must span all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = Reader::new(bytes);
        let result = Self::read(&mut reader).and_then(|node| match reader.remaining() {
            0 => Ok(node),
            rest => Err(Error::Other(format!("{rest} bytes after the data tree"))),
        });
        result.map_err(|error| ParseError {
            offset: reader.absolute_position(),
            error,
        })
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new();
        self.write(&mut writer)?;
        Ok(writer.into_inner())
    }

    #[instrument(name = "DtbNode_read", skip_all)]
    pub(crate) fn read<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let tag = ar.read_u32::<LE>()?;
        Ok(match tag {
            0x00 => Self::Int(ar.read_i32::<LE>()?),
            0x01 => Self::Float(ar.read_f32::<LE>()?),
            0x02 => Self::Name(read_dtb_string(ar)?),
            0x05 => Self::Keyword(read_dtb_string(ar)?),
            0x06 => Self::Unhandled(ar.read_i32::<LE>()?),
            0x07 => Self::IfDef(read_dtb_string(ar)?),
            0x08 => Self::Else(ar.read_i32::<LE>()?),
            0x09 => Self::EndIf(ar.read_i32::<LE>()?),
            0x10 => Self::Array(DtbArray::read(ar)?),
            0x11 => Self::Command(DtbTree::read(ar)?),
            0x12 => Self::String(read_dtb_string(ar)?),
            0x13 => Self::Bracketed(DtbTree::read(ar)?),
            0x20 => Self::Define(read_dtb_string(ar)?),
            0x21 => Self::Include(read_dtb_string(ar)?),
            0x22 => Self::Merge(read_dtb_string(ar)?),
            0x23 => Self::IfNDef(read_dtb_string(ar)?),
            tag => Self::Other {
                tag,
                value: ar.read_i32::<LE>()?,
            },
        })
    }
    pub(crate) fn write<A: ArchiveWriter>(&self, ar: &mut A) -> Result<()> {
        ar.write_u32::<LE>(self.tag())?;
        match self {
            Self::Int(value)
            | Self::Unhandled(value)
            | Self::Else(value)
            | Self::EndIf(value)
            | Self::Other { value, .. } => ar.write_i32::<LE>(*value)?,
            Self::Float(value) => ar.write_f32::<LE>(*value)?,
            Self::Name(value)
            | Self::Keyword(value)
            | Self::IfDef(value)
            | Self::String(value)
            | Self::Define(value)
            | Self::Include(value)
            | Self::Merge(value)
            | Self::IfNDef(value) => write_dtb_string(ar, value)?,
            Self::Array(array) => array.write(ar)?,
            Self::Command(tree) | Self::Bracketed(tree) => tree.write(ar)?,
        }
        Ok(())
    }
}
