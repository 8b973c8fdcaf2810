use std::io::Write;

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::archive::{read_array, ArchiveReader, Reader};
use crate::{Error, ParseError, Result};

pub const SIGNATURE_MAGIC: u32 = 0x73832DAA;
pub const SIGNATURE_VERSION: u32 = 1;
/// Bytes of pak data covered by each chunk checksum
pub const CHUNK_SIZE: usize = 64 * 1024;
const ENCRYPTED_HASH_SIZE: usize = 512;

/// `.sig` sidecar of a pak: one CRC-32 per 64 KiB chunk of the archive.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PakSignature {
    pub version: u32,
    pub encrypted_hash: Vec<u8>,
    pub chunk_hashes: Vec<u32>,
}
impl PakSignature {
    /// Signature over the encoded bytes of a pak, with a blank encrypted hash.
    pub fn from_pak(pak: &[u8]) -> Self {
        Self {
            version: SIGNATURE_VERSION,
            encrypted_hash: vec![0; ENCRYPTED_HASH_SIZE],
            chunk_hashes: pak.chunks(CHUNK_SIZE).map(crc32fast::hash).collect(),
        }
    }
    /// Whether every chunk checksum matches `pak`
    pub fn verify(&self, pak: &[u8]) -> bool {
        self.chunk_hashes.len() == pak.chunks(CHUNK_SIZE).len()
            && pak
                .chunks(CHUNK_SIZE)
                .zip(&self.chunk_hashes)
                .all(|(chunk, &hash)| crc32fast::hash(chunk) == hash)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        let mut reader = Reader::new(bytes);
        let result = Self::read_inner(&mut reader);
        result.map_err(|error| ParseError {
            offset: reader.absolute_position(),
            error,
        })
    }
    #[instrument(name = "PakSignature_read", skip_all)]
    fn read_inner<A: ArchiveReader>(ar: &mut A) -> Result<Self> {
        let magic = ar.read_u32::<LE>()?;
        if magic != SIGNATURE_MAGIC {
            return Err(Error::BadMagic {
                what: "signature",
                expected: SIGNATURE_MAGIC,
                found: magic,
            });
        }
        let version = ar.read_u32::<LE>()?;
        let len = ar.read_i32::<LE>()?;
        let len = usize::try_from(len).map_err(|_| Error::OutOfRange {
            field: "encrypted hash length",
            value: len.into(),
        })?;
        let encrypted_hash = ar.read_bytes(len)?;
        let count = ar.read_i32::<LE>()?;
        let count = usize::try_from(count).map_err(|_| Error::OutOfRange {
            field: "chunk hash count",
            value: count.into(),
        })?;
        let chunk_hashes = read_array(count, ar, |ar| Ok(ar.read_u32::<LE>()?))?;
        Ok(Self {
            version,
            encrypted_hash,
            chunk_hashes,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LE>(SIGNATURE_MAGIC)?;
        writer.write_u32::<LE>(self.version)?;
        writer.write_i32::<LE>(self.encrypted_hash.len() as i32)?;
        writer.write_all(&self.encrypted_hash)?;
        writer.write_i32::<LE>(self.chunk_hashes.len() as i32)?;
        for hash in &self.chunk_hashes {
            writer.write_u32::<LE>(*hash)?;
        }
        Ok(())
    }
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![];
        self.write(&mut bytes)?;
        Ok(bytes)
    }
}
