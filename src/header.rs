//! Container header: the fixed binary record at offset 0 of part 0 (§6,
//! component E).
//!
//! Layout is byte-exact and little-endian; see the offset table in
//! SPEC_FULL.md §6. `write` and `read` are the only entry points — callers
//! never poke at individual fields of the serialized form.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::config::{CompressionFormat, VolumeKind};
use crate::error::{PipelineError, Result};

pub const MAGIC: [u8; 8] = *b"ODIN1\0\0\0";
pub const FORMAT_VERSION: u32 = 3;

/// Fixed portion of the header, before the variable-length comment.
const FIXED_LEN: usize = 90;
const MAX_COMMENT_UNITS: u16 = 32_768;

/// Offset of the CRC-32 field, for the coordinator's seek-back-and-patch
/// step (§4.J step 8).
pub const CRC32_FIELD_OFFSET: u64 = 64;

#[derive(Debug, Clone)]
pub struct ContainerHeader {
    pub volume_kind: VolumeKind,
    pub compression: CompressionFormat,
    pub cluster_size: u32,
    pub volume_size: u64,
    pub allocated_bytes: u64,
    pub alloc_map_offset: u64,
    pub alloc_map_length: u64,
    pub data_offset: u64,
    pub crc32: u32,
    pub creation_timestamp: u64,
    pub part_count: u32,
    pub part_size: u64,
    pub comment: String,
}

impl ContainerHeader {
    /// Size of the fixed fields plus the encoded comment, i.e. the data
    /// offset when there is no allocation map.
    pub fn serialized_len(&self) -> usize {
        FIXED_LEN + self.comment.encode_utf16().count() * 2
    }

    pub fn write<W: Write + Seek>(&self, sink: &mut W) -> Result<()> {
        let comment_units: Vec<u16> = self.comment.encode_utf16().collect();
        if comment_units.len() > MAX_COMMENT_UNITS as usize {
            return Err(PipelineError::HeaderCorrupt {
                field: "comment_length",
            });
        }

        let mut buf = Vec::with_capacity(self.serialized_len());
        buf.extend_from_slice(&MAGIC);
        buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf.extend_from_slice(&self.volume_kind.to_u32().to_le_bytes());
        buf.extend_from_slice(&self.compression.to_u32().to_le_bytes());
        buf.extend_from_slice(&self.cluster_size.to_le_bytes());
        buf.extend_from_slice(&self.volume_size.to_le_bytes());
        buf.extend_from_slice(&self.allocated_bytes.to_le_bytes());
        buf.extend_from_slice(&self.alloc_map_offset.to_le_bytes());
        buf.extend_from_slice(&self.alloc_map_length.to_le_bytes());
        buf.extend_from_slice(&self.data_offset.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&self.creation_timestamp.to_le_bytes());
        buf.extend_from_slice(&self.part_count.to_le_bytes());
        buf.extend_from_slice(&self.part_size.to_le_bytes());
        buf.extend_from_slice(&(comment_units.len() as u16).to_le_bytes());
        for unit in &comment_units {
            buf.extend_from_slice(&unit.to_le_bytes());
        }
        debug_assert_eq!(buf.len(), self.serialized_len());

        sink.seek(SeekFrom::Start(0))?;
        sink.write_all(&buf)?;
        if self.data_offset as usize > buf.len() {
            let pad = self.data_offset as usize - buf.len();
            sink.write_all(&vec![0u8; pad])?;
        }
        Ok(())
    }

    /// Seeks to the CRC-32 field and overwrites it in place, leaving the
    /// stream position at the data offset (§4.J step 8).
    pub fn patch_crc32<W: Write + Seek>(sink: &mut W, crc32: u32, data_offset: u64) -> Result<()> {
        sink.seek(SeekFrom::Start(CRC32_FIELD_OFFSET))?;
        sink.write_all(&crc32.to_le_bytes())?;
        sink.seek(SeekFrom::Start(data_offset))?;
        Ok(())
    }

    pub fn read<R: Read>(source: &mut R) -> Result<Self> {
        let mut fixed = [0u8; FIXED_LEN];
        source.read_exact(&mut fixed).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                PipelineError::HeaderMagicMismatch
            } else {
                PipelineError::FileIoError(e)
            }
        })?;

        if fixed[0..8] != MAGIC {
            return Err(PipelineError::HeaderMagicMismatch);
        }
        let version = u32::from_le_bytes(fixed[8..12].try_into().unwrap());
        if version != FORMAT_VERSION {
            return Err(PipelineError::HeaderVersionUnsupported {
                found: version,
                expected: FORMAT_VERSION,
            });
        }
        let volume_kind_raw = u32::from_le_bytes(fixed[12..16].try_into().unwrap());
        let volume_kind = VolumeKind::try_from(volume_kind_raw).map_err(|_| {
            PipelineError::HeaderCorrupt {
                field: "volume_kind",
            }
        })?;
        let compression_raw = u32::from_le_bytes(fixed[16..20].try_into().unwrap());
        let compression = CompressionFormat::try_from(compression_raw).map_err(|_| {
            PipelineError::HeaderCorrupt {
                field: "compression",
            }
        })?;
        let cluster_size = u32::from_le_bytes(fixed[20..24].try_into().unwrap());
        let volume_size = u64::from_le_bytes(fixed[24..32].try_into().unwrap());
        let allocated_bytes = u64::from_le_bytes(fixed[32..40].try_into().unwrap());
        let alloc_map_offset = u64::from_le_bytes(fixed[40..48].try_into().unwrap());
        let alloc_map_length = u64::from_le_bytes(fixed[48..56].try_into().unwrap());
        let data_offset = u64::from_le_bytes(fixed[56..64].try_into().unwrap());
        let crc32 = u32::from_le_bytes(fixed[64..68].try_into().unwrap());
        let creation_timestamp = u64::from_le_bytes(fixed[68..76].try_into().unwrap());
        let part_count = u32::from_le_bytes(fixed[76..80].try_into().unwrap());
        let part_size = u64::from_le_bytes(fixed[80..88].try_into().unwrap());
        let comment_len = u16::from_le_bytes(fixed[88..90].try_into().unwrap());
        if comment_len > MAX_COMMENT_UNITS {
            return Err(PipelineError::HeaderCorrupt {
                field: "comment_length",
            });
        }

        let mut comment_bytes = vec![0u8; comment_len as usize * 2];
        source.read_exact(&mut comment_bytes)?;
        let units: Vec<u16> = comment_bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        let comment = String::from_utf16(&units).map_err(|_| PipelineError::HeaderCorrupt {
            field: "comment",
        })?;

        if alloc_map_length > 0
            && data_offset != FIXED_LEN as u64 + comment_len as u64 * 2 + alloc_map_length
        {
            return Err(PipelineError::HeaderCorrupt {
                field: "data_offset",
            });
        }

        Ok(ContainerHeader {
            volume_kind,
            compression,
            cluster_size,
            volume_size,
            allocated_bytes,
            alloc_map_offset,
            alloc_map_length,
            data_offset,
            crc32,
            creation_timestamp,
            part_count,
            part_size,
            comment,
        })
    }
}
