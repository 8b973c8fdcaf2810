use std::io::{Read, Write};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::archive::{ArchiveReader, ArchiveWriter, Reader, Writer};
use crate::context::{Context, Names};
use crate::names::NameTable;
use crate::property::{read_properties, write_properties, Property};
use crate::{Error, FString, ParseError, Result};

const PREFIX_SIZE: usize = 48;

/// Save-game file. Properties use the asset property codec with every name
/// stored as an inline string; `names` is the local table those strings are interned into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveFile {
    pub prefix: Vec<u8>,
    pub struct_name: FString,
    pub properties: Vec<Property>,
    /// Bytes after the property list's terminator
    pub extra: Vec<u8>,
    pub names: NameTable,
}
impl SaveFile {
    pub fn read<R: Read>(reader: &mut R) -> Result<Self, ParseError> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes).map_err(|e| ParseError {
            offset: 0,
            error: e.into(),
        })?;
        Self::from_bytes(&bytes)
    }
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut names = NameTable::new();
        let mut ctx = Context::new(Reader::new(bytes), Names::Interning(&mut names));
        let result = Self::read_inner(&mut ctx);
        let offset = ctx.stream.absolute_position();
        drop(ctx);
        match result {
            Ok((prefix, struct_name, properties, extra)) => Ok(Self {
                prefix,
                struct_name,
                properties,
                extra,
                names,
            }),
            Err(error) => Err(ParseError { offset, error }),
        }
    }
    #[instrument(name = "SaveFile_read", skip_all)]
    fn read_inner(
        ar: &mut Context<'_, Reader<'_>>,
    ) -> Result<(Vec<u8>, FString, Vec<Property>, Vec<u8>)> {
        let prefix = ar.read_bytes(PREFIX_SIZE)?;
        let struct_name = ar.read_fstring()?;
        let properties = read_properties(ar)?;
        let extra = ar.read_bytes(ar.remaining())?;
        Ok((prefix, struct_name, properties, extra))
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }
    #[instrument(name = "SaveFile_write", skip_all)]
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if self.prefix.len() != PREFIX_SIZE {
            return Err(Error::OutOfRange {
                field: "save prefix length",
                value: self.prefix.len() as i64,
            });
        }
        let mut ctx = Context::new(Writer::new(), Names::Literal(&self.names));
        ctx.write_all(&self.prefix)?;
        ctx.write_fstring(&self.struct_name)?;
        write_properties(&mut ctx, &self.properties)?;
        ctx.write_all(&self.extra)?;
        Ok(ctx.stream.into_inner())
    }
}
