//! Ogg Vorbis scanning for the `.mogg` audio container.
//!
//! Only enough of the Vorbis setup header is parsed to learn each audio packet's block
//! size, which is what the seek map needs. No audio is decoded.

use std::io::{Cursor, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

pub const MAX_PACKET_SIZE: usize = 0x8000;
pub const MAP_VERSION: u32 = 0x10;
pub const MAP_CHUNK_SIZE: u32 = 20000;
/// Byte distance between seek points recorded while scanning
pub const SEEK_INCREMENT: u32 = 0x8000;
/// Leading version word of an unencrypted mogg
pub const MOGG_VERSION: i32 = 0xA;

const CAPTURE_PATTERN: &[u8; 4] = b"OggS";
const VORBIS_ID: u64 = 0x736962726f76;
const CODEBOOK_SYNC: u64 = 0x564342;

#[derive(Debug, thiserror::Error)]
pub enum OggError {
    #[error("read error (probably EOF): {0}")]
    Read(#[from] std::io::Error),
    #[error("could not find a capture pattern (OggS) at {0}")]
    NoCapturePattern(usize),
    #[error("encountered a packet larger than 0x8000 bytes")]
    PacketTooLarge,
    #[error("codec in the ogg stream did not identify as vorbis")]
    NotVorbis,
    #[error("invalid data: {0}")]
    InvalidData(&'static str),
    #[error("invalid vorbis version {0}")]
    InvalidVersion(u32),
    #[error("invalid number of audio channels")]
    InvalidChannels,
    #[error("invalid sample rate")]
    InvalidSampleRate,
    #[error("invalid blocksize 0")]
    InvalidBlocksize0,
    #[error("invalid blocksize 1")]
    InvalidBlocksize1,
    #[error("invalid codebook format")]
    InvalidCodebook,
    #[error("invalid mode")]
    InvalidMode,
    #[error("invalid mapping")]
    InvalidMapping,
    #[error("invalid floor")]
    InvalidFloor,
    #[error("invalid residues")]
    InvalidResidues,
    #[error("framing error")]
    Framing,
}

type Result<T, E = OggError> = std::result::Result<T, E>;

fn ilog(mut value: i64) -> u32 {
    let mut bits = 0;
    while value > 0 {
        bits += 1;
        value >>= 1;
    }
    bits
}

/// LSB-first bit cursor over one packet.
struct BitReader<'a> {
    data: &'a [u8],
    cursor: usize,
}
impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }
    fn read(&mut self, count: u32) -> Result<u64> {
        if count == 0 {
            return Ok(0);
        }
        if count > 64 {
            return Err(OggError::InvalidData("bit field wider than 64 bits"));
        }
        if self.cursor + count as usize > self.data.len() * 8 {
            return Err(OggError::InvalidData("read beyond end of packet"));
        }
        let mut value = 0;
        for bit in 0..count {
            let byte = self.data[self.cursor >> 3];
            value |= u64::from((byte >> (self.cursor & 7)) & 1) << bit;
            self.cursor += 1;
        }
        Ok(value)
    }
    fn flag(&mut self) -> Result<bool> {
        Ok(self.read(1)? != 0)
    }
    fn skip(&mut self, bits: u64) -> Result<()> {
        let end = u64::try_from(self.cursor)
            .ok()
            .and_then(|c| c.checked_add(bits))
            .filter(|&end| end <= self.data.len() as u64 * 8)
            .ok_or(OggError::InvalidData("read beyond end of packet"))?;
        self.cursor = end as usize;
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
struct PageHeader {
    start: usize,
    granule_position: i64,
    segments: Vec<u8>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identification {
    pub channels: u8,
    pub sample_rate: u32,
    pub bitrate_maximum: i32,
    pub bitrate_nominal: i32,
    pub bitrate_minimum: i32,
    /// Short block size exponent
    pub blocksize_0: u8,
    /// Long block size exponent
    pub blocksize_1: u8,
}

#[derive(Debug, Clone, Copy)]
struct Mode {
    long_block: bool,
}

/// Packet-level reader of a single logical Vorbis stream.
struct VorbisStream<'a> {
    cursor: Cursor<&'a [u8]>,
    page: PageHeader,
    next_segment: usize,
    packet: Vec<u8>,
    packet_start: usize,
    id: Identification,
    modes: Vec<Mode>,
    next_sample: i64,
    last_blocksize: i64,
}
impl<'a> VorbisStream<'a> {
    /// Reads the three header packets, leaving the stream at the first audio packet.
    #[instrument(name = "VorbisStream_open", skip_all)]
    fn open(data: &'a [u8]) -> Result<Self> {
        let mut stream = Self {
            cursor: Cursor::new(data),
            page: PageHeader::default(),
            next_segment: 0,
            packet: Vec::with_capacity(MAX_PACKET_SIZE),
            packet_start: 0,
            id: Identification::default(),
            modes: vec![],
            next_sample: 0,
            last_blocksize: 0,
        };
        stream.read_packet()?;
        stream.id = read_identification(&stream.packet)?;
        stream.read_packet()?;
        if BitReader::new(&stream.packet).read(8)? != 3 {
            return Err(OggError::InvalidData("missing comment header"));
        }
        stream.read_packet()?;
        stream.modes = read_setup(&stream.packet, &stream.id)?;
        debug!(id = ?stream.id, modes = stream.modes.len(), "vorbis headers");
        Ok(stream)
    }

    fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    fn read_page(&mut self) -> Result<()> {
        let start = self.position();
        let mut capture = [0; 4];
        self.cursor.read_exact(&mut capture)?;
        if &capture != CAPTURE_PATTERN {
            return Err(OggError::NoCapturePattern(start));
        }
        let _version = self.cursor.read_u8()?;
        let _header_type = self.cursor.read_u8()?;
        let granule_position = self.cursor.read_i64::<LE>()?;
        let _serial = self.cursor.read_u32::<LE>()?;
        let _sequence = self.cursor.read_u32::<LE>()?;
        let _checksum = self.cursor.read_u32::<LE>()?;
        let count = self.cursor.read_u8()?;
        let mut segments = vec![0; count as usize];
        self.cursor.read_exact(&mut segments)?;
        self.page = PageHeader {
            start,
            granule_position,
            segments,
        };
        self.next_segment = 0;
        Ok(())
    }

    /// Reassembles the next packet from lacing values, crossing pages as needed.
    fn read_packet(&mut self) -> Result<()> {
        self.packet.clear();
        let mut first = true;
        loop {
            while self.next_segment >= self.page.segments.len() {
                self.read_page()?;
            }
            let length = self.page.segments[self.next_segment] as usize;
            self.next_segment += 1;
            if first {
                self.packet_start = self.position();
                first = false;
            }
            if self.packet.len() + length > MAX_PACKET_SIZE {
                return Err(OggError::PacketTooLarge);
            }
            let end = self.packet.len();
            self.packet.resize(end + length, 0);
            self.cursor.read_exact(&mut self.packet[end..])?;
            if length < 255 {
                return Ok(());
            }
        }
    }

    /// Advances over one audio packet, updating the sample counter.
    fn next_audio(&mut self) -> Result<()> {
        self.read_packet()?;
        if self.packet.is_empty() {
            return Ok(());
        }
        let mut bits = BitReader::new(&self.packet);
        if bits.flag()? {
            return Err(OggError::InvalidData("audio packet type bit set"));
        }
        let mode = bits.read(ilog(self.modes.len() as i64 - 1))? as usize;
        let mode = self
            .modes
            .get(mode)
            .ok_or(OggError::InvalidData("audio packet mode out of range"))?;
        let exponent = if mode.long_block {
            self.id.blocksize_1
        } else {
            self.id.blocksize_0
        };
        let blocksize = 1i64 << exponent;
        if self.last_blocksize != 0 {
            self.next_sample += (self.last_blocksize + blocksize) / 4;
        }
        self.last_blocksize = blocksize;
        Ok(())
    }
}

fn read_identification(packet: &[u8]) -> Result<Identification> {
    if packet.len() != 30 {
        return Err(OggError::NotVorbis);
    }
    let mut bits = BitReader::new(packet);
    if bits.read(8)? != 1 || bits.read(48)? != VORBIS_ID {
        return Err(OggError::NotVorbis);
    }
    let version = bits.read(32)? as u32;
    let id = Identification {
        channels: bits.read(8)? as u8,
        sample_rate: bits.read(32)? as u32,
        bitrate_maximum: bits.read(32)? as i32,
        bitrate_nominal: bits.read(32)? as i32,
        bitrate_minimum: bits.read(32)? as i32,
        blocksize_0: bits.read(4)? as u8,
        blocksize_1: bits.read(4)? as u8,
    };
    let framing = bits.flag()?;

    if version != 0 {
        return Err(OggError::InvalidVersion(version));
    }
    if id.channels == 0 {
        return Err(OggError::InvalidChannels);
    }
    if id.sample_rate == 0 {
        return Err(OggError::InvalidSampleRate);
    }
    if !(6..=13).contains(&id.blocksize_0) {
        return Err(OggError::InvalidBlocksize0);
    }
    if !(6..=13).contains(&id.blocksize_1) {
        return Err(OggError::InvalidBlocksize1);
    }
    if id.blocksize_0 > id.blocksize_1 {
        return Err(OggError::InvalidBlocksize0);
    }
    if !framing {
        return Err(OggError::Framing);
    }
    Ok(id)
}

/// Walks the setup header and returns its modes.
#[instrument(name = "vorbis_setup_read", skip_all)]
fn read_setup(packet: &[u8], id: &Identification) -> Result<Vec<Mode>> {
    let mut bits = BitReader::new(packet);
    if bits.read(8)? != 5 || bits.read(48)? != VORBIS_ID {
        return Err(OggError::InvalidData("missing setup header"));
    }

    let codebook_count = bits.read(8)? + 1;
    for _ in 0..codebook_count {
        read_codebook(&mut bits)?;
    }

    let time_count = bits.read(6)? + 1;
    for _ in 0..time_count {
        if bits.read(16)? != 0 {
            return Err(OggError::InvalidData("nonzero time domain transform"));
        }
    }

    let floor_count = bits.read(6)? + 1;
    for _ in 0..floor_count {
        read_floor(&mut bits, codebook_count)?;
    }

    let residue_count = bits.read(6)? + 1;
    for _ in 0..residue_count {
        read_residue(&mut bits)?;
    }

    let mapping_count = bits.read(6)? + 1;
    for _ in 0..mapping_count {
        read_mapping(&mut bits, id.channels, floor_count, residue_count)?;
    }

    let mode_count = bits.read(6)? + 1;
    let mut modes = Vec::with_capacity(mode_count as usize);
    for _ in 0..mode_count {
        let long_block = bits.flag()?;
        let window_type = bits.read(16)?;
        let transform_type = bits.read(16)?;
        let mapping = bits.read(8)?;
        if window_type != 0 || transform_type != 0 || mapping >= mapping_count {
            return Err(OggError::InvalidMode);
        }
        modes.push(Mode { long_block });
    }
    if !bits.flag()? {
        return Err(OggError::Framing);
    }
    Ok(modes)
}

fn read_codebook(bits: &mut BitReader<'_>) -> Result<()> {
    if bits.read(24)? != CODEBOOK_SYNC {
        return Err(OggError::InvalidCodebook);
    }
    let dimensions = bits.read(16)?;
    let entries = bits.read(24)?;
    if dimensions == 0 {
        return Err(OggError::InvalidCodebook);
    }

    let ordered = bits.flag()?;
    if !ordered {
        let sparse = bits.flag()?;
        for _ in 0..entries {
            if !sparse || bits.flag()? {
                bits.read(5)?;
            }
        }
    } else {
        let mut length = bits.read(5)? + 1;
        let mut assigned = 0;
        while assigned != entries {
            if length > 32 {
                return Err(OggError::InvalidCodebook);
            }
            assigned += bits.read(ilog((entries - assigned) as i64))?;
            if assigned > entries {
                return Err(OggError::InvalidCodebook);
            }
            length += 1;
        }
    }

    let lookup_type = bits.read(4)?;
    match lookup_type {
        0 => {}
        1 | 2 => {
            let _minimum_value = bits.read(32)?;
            let _delta_value = bits.read(32)?;
            let value_bits = bits.read(4)? + 1;
            let _sequence_p = bits.flag()?;
            let lookup_values = if lookup_type == 1 {
                lookup1_values(entries, dimensions)
            } else {
                entries * dimensions
            };
            bits.skip(lookup_values.saturating_mul(value_bits))?;
        }
        _ => return Err(OggError::InvalidCodebook),
    }
    Ok(())
}

/// Largest `r` with `r^dimensions <= entries`.
fn lookup1_values(entries: u64, dimensions: u64) -> u64 {
    let exponent = u32::try_from(dimensions).unwrap_or(u32::MAX);
    let mut values = 0u64;
    while (values + 1)
        .checked_pow(exponent)
        .is_some_and(|power| power <= entries)
    {
        values += 1;
    }
    values
}

fn read_floor(bits: &mut BitReader<'_>, codebook_count: u64) -> Result<()> {
    match bits.read(16)? {
        0 => {
            let _order = bits.read(8)?;
            let _rate = bits.read(16)?;
            let _bark_map_size = bits.read(16)?;
            let _amplitude_bits = bits.read(6)?;
            let _amplitude_offset = bits.read(8)?;
            let books = bits.read(4)? + 1;
            bits.skip(books * 8)?;
        }
        1 => {
            let partitions = bits.read(5)?;
            let mut class_list = Vec::with_capacity(partitions as usize);
            for _ in 0..partitions {
                class_list.push(bits.read(4)? as usize);
            }
            let classes = class_list.iter().max().map_or(0, |max| max + 1);
            let mut dimensions = vec![0; classes];
            for dimension in dimensions.iter_mut() {
                *dimension = bits.read(3)? + 1;
                let subclasses = bits.read(2)?;
                if subclasses != 0 && bits.read(8)? >= codebook_count {
                    return Err(OggError::InvalidFloor);
                }
                for _ in 0..1 << subclasses {
                    let book = bits.read(8)? as i64 - 1;
                    if book >= codebook_count as i64 {
                        return Err(OggError::InvalidFloor);
                    }
                }
            }
            let _multiplier = bits.read(2)?;
            let range_bits = bits.read(4)? as u32;
            let mut values = 2;
            for class in class_list {
                for _ in 0..dimensions[class] {
                    bits.read(range_bits)?;
                    values += 1;
                    if values > 64 {
                        return Err(OggError::InvalidFloor);
                    }
                }
            }
        }
        _ => return Err(OggError::InvalidFloor),
    }
    Ok(())
}

fn read_residue(bits: &mut BitReader<'_>) -> Result<()> {
    if bits.read(16)? > 2 {
        return Err(OggError::InvalidResidues);
    }
    let _begin = bits.read(24)?;
    let _end = bits.read(24)?;
    let _partition_size = bits.read(24)? + 1;
    let classifications = bits.read(6)? + 1;
    let _classbook = bits.read(8)?;
    let mut cascades = Vec::with_capacity(classifications as usize);
    for _ in 0..classifications {
        let low = bits.read(3)?;
        let high = if bits.flag()? { bits.read(5)? } else { 0 };
        cascades.push(high << 3 | low);
    }
    for cascade in cascades {
        bits.skip(u64::from(cascade.count_ones()) * 8)?;
    }
    Ok(())
}

fn read_mapping(
    bits: &mut BitReader<'_>,
    channels: u8,
    floor_count: u64,
    residue_count: u64,
) -> Result<()> {
    if bits.read(16)? != 0 {
        return Err(OggError::InvalidMapping);
    }
    let submaps = if bits.flag()? { bits.read(4)? + 1 } else { 1 };
    if bits.flag()? {
        let steps = bits.read(8)? + 1;
        let width = ilog(i64::from(channels) - 1);
        for _ in 0..steps {
            let _magnitude = bits.read(width)?;
            let _angle = bits.read(width)?;
        }
    }
    if bits.read(2)? != 0 {
        return Err(OggError::InvalidMapping);
    }
    if submaps > 1 {
        for _ in 0..channels {
            if bits.read(4)? >= submaps {
                return Err(OggError::InvalidMapping);
            }
        }
    }
    for _ in 0..submaps {
        let _time = bits.read(8)?;
        if bits.read(8)? >= floor_count || bits.read(8)? >= residue_count {
            return Err(OggError::InvalidMapping);
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OggMapEntry {
    pub bytes: u32,
    pub samples: u32,
}

/// Sample to byte offset table prepended to the Ogg data of a mogg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OggMap {
    pub version: u32,
    pub chunk_size: u32,
    pub entries: Vec<OggMapEntry>,
}
impl OggMap {
    /// Scans every audio packet of `ogg` and builds one entry per `chunk_size` samples.
    #[instrument(name = "OggMap_from_ogg", skip_all)]
    pub fn from_ogg(ogg: &[u8]) -> Result<Self> {
        let mut stream = VorbisStream::open(ogg)?;
        let mut total_samples = 0i64;
        let mut seek_table = vec![];
        let mut offset = 0usize;
        loop {
            match stream.next_audio() {
                Ok(()) => {}
                Err(OggError::Read(_)) => break,
                Err(e) => return Err(e),
            }
            total_samples = stream.page.granule_position;
            if stream.page.start >= offset
                && stream.packet_start >= offset
                && stream.packet_start >= stream.page.start
            {
                seek_table.push(stream.next_sample);
                offset += SEEK_INCREMENT as usize;
            }
        }

        let chunk_size = i64::from(MAP_CHUNK_SIZE);
        let count = (total_samples.max(0) + chunk_size - 1) / chunk_size;
        let entries = (0..count)
            .map(|i| {
                let desired = i * chunk_size;
                let mut entry = OggMapEntry {
                    bytes: 0,
                    samples: 0,
                };
                for (j, &samples) in seek_table.iter().enumerate() {
                    if samples >= desired {
                        break;
                    }
                    entry = OggMapEntry {
                        bytes: j as u32 * SEEK_INCREMENT,
                        samples: samples as u32,
                    };
                }
                entry
            })
            .collect::<Vec<_>>();
        debug!(total_samples, entries = entries.len(), "built ogg map");
        Ok(Self {
            version: MAP_VERSION,
            chunk_size: MAP_CHUNK_SIZE,
            entries,
        })
    }

    /// Encoded size in bytes
    pub fn len(&self) -> usize {
        12 + self.entries.len() * 8
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.len());
        for value in [self.version, self.chunk_size, self.entries.len() as u32] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        for entry in &self.entries {
            bytes.extend_from_slice(&entry.bytes.to_le_bytes());
            bytes.extend_from_slice(&entry.samples.to_le_bytes());
        }
        bytes
    }
}

/// Identification header of an Ogg Vorbis stream.
pub fn identify(ogg: &[u8]) -> Result<Identification> {
    Ok(VorbisStream::open(ogg)?.id)
}

/// Unencrypted mogg: version word, offset of the Ogg data, seek map, then `ogg` verbatim.
pub fn build_mogg(ogg: &[u8]) -> Result<Vec<u8>> {
    let map = OggMap::from_ogg(ogg)?;
    let mut mogg = Vec::with_capacity(8 + map.len() + ogg.len());
    mogg.write_i32::<LE>(MOGG_VERSION)?;
    mogg.write_i32::<LE>((8 + map.len()) as i32)?;
    mogg.write_all(&map.to_bytes())?;
    mogg.write_all(ogg)?;
    Ok(mogg)
}
