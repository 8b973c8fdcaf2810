use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::archive::{ArchiveReader, ArchiveWriter};
use crate::context::Context;
use crate::names::{FName, NameTable};
use crate::property::{read_properties, write_properties, Property, PropertyValue, StructValue};
use crate::{Error, Result};

/// Property list terminated by `None`.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalObject {
    pub properties: Vec<Property>,
}
impl NormalObject {
    /// First property called `name`
    pub fn get(&self, names: &NameTable, name: &str) -> Option<&Property> {
        let index = names.find(name)?;
        self.properties.iter().find(|p| p.name.index == index)
    }
    pub fn get_mut(&mut self, names: &NameTable, name: &str) -> Option<&mut Property> {
        let index = names.find(name)?;
        self.properties.iter_mut().find(|p| p.name.index == index)
    }

    #[instrument(name = "NormalObject_read", skip_all)]
    pub(crate) fn read<R: ArchiveReader>(ar: &mut Context<'_, R>) -> Result<Self> {
        Ok(Self {
            properties: read_properties(ar)?,
        })
    }
    #[instrument(name = "NormalObject_write", skip_all)]
    pub(crate) fn write<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        write_properties(ar, &self.properties)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTableRow {
    pub name: i32,
    pub duplicate_id: i32,
    pub value: StructValue,
}

/// Normal object followed by rows typed by the struct its `RowStruct` property links to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    pub base: NormalObject,
    /// Name index of the row struct type
    pub row_struct: i32,
    pub reserved: i32,
    pub rows: Vec<DataTableRow>,
}
impl DataTable {
    /// Name index the base object's `RowStruct` object reference links to.
    fn row_struct<R>(ar: &Context<'_, R>, base: &NormalObject) -> Result<Option<i32>> {
        for property in &base.properties {
            if ar.name(property.name.index)? != "RowStruct" {
                continue;
            }
            if let PropertyValue::Object(object) = &property.value {
                return ar.resolve_link(object.link).map(Some);
            }
        }
        Ok(None)
    }

    #[instrument(name = "DataTable_read_rows", skip_all)]
    fn read_rows<R: ArchiveReader>(
        ar: &mut Context<'_, R>,
        base: NormalObject,
        row_struct: i32,
    ) -> Result<Self> {
        let reserved = ar.read_i32::<LE>()?;
        let count = ar.read_i32::<LE>()?;
        let count = usize::try_from(count).map_err(|_| Error::OutOfRange {
            field: "row count",
            value: count.into(),
        })?;
        let mut rows = Vec::with_capacity(count.min(ar.remaining()));
        for _ in 0..count {
            let name = ar.read_i32::<LE>()?;
            let duplicate_id = ar.read_i32::<LE>()?;
            let value = StructValue::read_element(ar, FName::new(row_struct))?;
            rows.push(DataTableRow {
                name,
                duplicate_id,
                value,
            });
        }
        Ok(Self {
            base,
            row_struct,
            reserved,
            rows,
        })
    }
    fn write<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        self.base.write(ar)?;
        ar.write_i32::<LE>(self.reserved)?;
        ar.write_i32::<LE>(self.rows.len() as i32)?;
        for row in &self.rows {
            ar.write_i32::<LE>(row.name)?;
            ar.write_i32::<LE>(row.duplicate_id)?;
            row.value.write_element(ar)?;
        }
        Ok(())
    }
}

/// Decoded form of a category's byte range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CategoryObject {
    Normal(NormalObject),
    DataTable(DataTable),
}
impl CategoryObject {
    pub fn base(&self) -> &NormalObject {
        match self {
            Self::Normal(object) => object,
            Self::DataTable(table) => &table.base,
        }
    }

    pub(crate) fn read<R: ArchiveReader>(ar: &mut Context<'_, R>, data_table: bool) -> Result<Self> {
        let base = NormalObject::read(ar)?;
        if !data_table {
            return Ok(Self::Normal(base));
        }
        match DataTable::row_struct(ar, &base)? {
            Some(row_struct) => Ok(Self::DataTable(DataTable::read_rows(ar, base, row_struct)?)),
            None => {
                warn!("data table has no RowStruct object reference, keeping rows as extra data");
                Ok(Self::Normal(base))
            }
        }
    }
    pub(crate) fn write<W: ArchiveWriter>(&self, ar: &mut Context<'_, W>) -> Result<()> {
        match self {
            Self::Normal(object) => object.write(ar),
            Self::DataTable(table) => table.write(ar),
        }
    }
}
