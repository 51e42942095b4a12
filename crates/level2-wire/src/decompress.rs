//! Per-block payload decompression.
//!
//! LDM feeds deliver the Level II stream as a sequence of compressed blocks,
//! each preceded by a 4-byte big-endian control word holding the compressed
//! length; a negative length marks the final block of the volume. Blocks of
//! 10 bytes or fewer carry no records and are skipped.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{WireError, WireResult};

/// Control word size preceding each compressed LDM block.
pub const CONTROL_WORD_SIZE: usize = 4;
/// Blocks at or below this size carry no records.
pub const MIN_BLOCK_SIZE: usize = 10;

/// Payload compression mode, from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Uncompressed,
    Bzip2,
    Zlib,
}

/// Decoded LDM control word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlWord {
    pub length: usize,
    pub last_block: bool,
}

impl ControlWord {
    pub fn parse(buf: &[u8]) -> WireResult<Self> {
        if buf.len() < CONTROL_WORD_SIZE {
            return Err(WireError::Truncated {
                needed: CONTROL_WORD_SIZE,
                offset: 0,
                available: buf.len(),
            });
        }
        let raw = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        Ok(Self {
            length: raw.unsigned_abs() as usize,
            last_block: raw < 0,
        })
    }
}

/// Decompress one physical block according to the configured mode.
pub fn decompress_block(data: &[u8], compression: Compression) -> WireResult<Vec<u8>> {
    match compression {
        Compression::Uncompressed => Ok(data.to_vec()),
        Compression::Bzip2 => {
            let mut out = Vec::with_capacity(data.len() * 40);
            bzip2::read::BzDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| WireError::Decompression(format!("bzip2: {}", e)))?;
            Ok(out)
        }
        Compression::Zlib => {
            let mut out = Vec::with_capacity(data.len() * 8);
            flate2::read::ZlibDecoder::new(data)
                .read_to_end(&mut out)
                .map_err(|e| WireError::Decompression(format!("zlib: {}", e)))?;
            Ok(out)
        }
    }
}
