//! Level II record layouts.
//!
//! Offsets follow the Archive II interface control document. Each logical
//! record is one fixed-size packet: a 12-byte CTM transmission block, a
//! 16-byte message header, then the message payload.

use chrono::{DateTime, Duration, TimeZone, Utc};
use radar_common::MessageKind;

use crate::error::{WireError, WireResult};

/// One logical record (CTM block + message header + payload).
pub const PACKET_SIZE: usize = 2432;
/// CTM transmission-integrity block preceding every message header.
pub const CTM_SIZE: usize = 12;
/// Message header size in bytes.
pub const MESSAGE_HEADER_SIZE: usize = 16;
/// Volume title record size in bytes.
pub const VOLUME_TITLE_SIZE: usize = 24;
/// Packets per physical LDM block.
pub const PACKETS_PER_LDM_BLOCK: usize = 100;

/// Plausibility window for the header length field, in bytes.
pub const MIN_MESSAGE_BYTES: usize = 50;
pub const MAX_MESSAGE_BYTES: usize = 2500;

/// Plausibility window for the modified-julian date (1990-01-01 to
/// 2100-01-01, days from 1970-01-01 where day 1 is the epoch).
const MIN_JULIAN_DATE: u16 = 7306;
const MAX_JULIAN_DATE: u16 = 47482;
const MILLISECS_PER_DAY: u32 = 86_400_000;

/// Bounds-checked big-endian reader over a record buffer.
///
/// Every "copy N bytes from offset K" in the original format goes through
/// here so a short buffer fails loudly as [`WireError::Truncated`].
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn at(buf: &'a [u8], offset: usize) -> Self {
        Self { buf, pos: offset }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn take(&mut self, n: usize) -> WireResult<&'a [u8]> {
        if self.pos + n > self.buf.len() {
            return Err(WireError::Truncated {
                needed: n,
                offset: self.pos,
                available: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> WireResult<()> {
        self.take(n).map(|_| ())
    }

    pub fn u8(&mut self) -> WireResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn be_u16(&mut self) -> WireResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn be_i16(&mut self) -> WireResult<i16> {
        let b = self.take(2)?;
        Ok(i16::from_be_bytes([b[0], b[1]]))
    }

    pub fn be_u32(&mut self) -> WireResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn be_i32(&mut self) -> WireResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn be_f32(&mut self) -> WireResult<f32> {
        let b = self.take(4)?;
        Ok(f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn bytes(&mut self, n: usize) -> WireResult<&'a [u8]> {
        self.take(n)
    }
}

/// Archive II message header (halfwords 7-14, after the CTM block).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message size in halfwords, measured from this field.
    pub message_len: u16,
    pub channel_id: u8,
    pub kind: MessageKind,
    pub seq_num: u16,
    /// Modified julian date from 1970-01-01 (day 1).
    pub julian_date: u16,
    pub millisecs_past_midnight: u32,
    pub num_segments: u16,
    pub segment_num: u16,
}

impl MessageHeader {
    /// Parse from a logical record (CTM block included).
    pub fn parse(record: &[u8]) -> WireResult<Self> {
        let mut cur = Cursor::at(record, CTM_SIZE);
        Ok(Self {
            message_len: cur.be_u16()?,
            channel_id: cur.u8()?,
            kind: MessageKind::from_type_code(cur.u8()?),
            seq_num: cur.be_u16()?,
            julian_date: cur.be_u16()?,
            millisecs_past_midnight: cur.be_u32()?,
            num_segments: cur.be_u16()?,
            segment_num: cur.be_u16()?,
        })
    }

    /// Generation time of the message.
    pub fn time(&self) -> DateTime<Utc> {
        julian_time(self.julian_date as i64, self.millisecs_past_midnight as i64)
    }

    /// True when the encoded length and time fields land inside the windows
    /// a live stream can produce. Used by the TCP resync search to decide
    /// whether a candidate byte offset is really a header.
    pub fn is_plausible(&self) -> bool {
        let msg_bytes = self.message_len as usize * 2;
        (MIN_MESSAGE_BYTES..=MAX_MESSAGE_BYTES).contains(&msg_bytes)
            && (MIN_JULIAN_DATE..=MAX_JULIAN_DATE).contains(&self.julian_date)
            && self.millisecs_past_midnight < MILLISECS_PER_DAY
    }
}

/// Volume title filetype variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleFormat {
    /// "ARCHIVE2." legacy format: every file carries radar data.
    Archive2,
    /// "AR2V00xx." format: the feed may emit metadata-only files.
    Ar2v,
}

/// 24-byte volume title record preceding a new volume's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeTitle {
    pub format: TitleFormat,
    /// Volume number parsed from the 3-char field; often blank on old feeds.
    pub volume_num: Option<u32>,
    pub julian_date: i16,
    pub millisecs_past_midnight: i32,
}

impl VolumeTitle {
    /// Probe a buffer for a title record. Returns `BadTitle` when the
    /// filetype magic does not match; the caller treats that as "no title
    /// present" rather than an error.
    pub fn parse(buf: &[u8]) -> WireResult<Self> {
        if buf.len() < VOLUME_TITLE_SIZE {
            return Err(WireError::Truncated {
                needed: VOLUME_TITLE_SIZE,
                offset: 0,
                available: buf.len(),
            });
        }

        let format = if buf.starts_with(b"ARCHIVE2") {
            TitleFormat::Archive2
        } else if buf.starts_with(b"AR2V") {
            TitleFormat::Ar2v
        } else {
            return Err(WireError::BadTitle(format!(
                "bad filetype magic {:02x?}",
                &buf[..4.min(buf.len())]
            )));
        };

        // Layout: filetype[9], vol_num[3], i16 julian date, i16 pad,
        // i32 millisecs past midnight, i32 pad.
        let volume_num = std::str::from_utf8(&buf[9..12])
            .ok()
            .and_then(|s| s.trim().parse::<u32>().ok());

        let mut cur = Cursor::at(buf, 12);
        let julian_date = cur.be_i16()?;
        cur.skip(2)?;
        let millisecs_past_midnight = cur.be_i32()?;

        Ok(Self {
            format,
            volume_num,
            julian_date,
            millisecs_past_midnight,
        })
    }

    pub fn time(&self) -> DateTime<Utc> {
        julian_time(self.julian_date as i64, self.millisecs_past_midnight as i64)
    }
}

/// Radial status codes (message type 1, halfword 21).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadialStatus {
    StartOfNewElevation,
    IntermediateRadial,
    EndOfElevation,
    BeginningOfVolumeScan,
    EndOfVolumeScan,
    Unknown(i16),
}

impl RadialStatus {
    pub fn from_code(code: i16) -> Self {
        match code {
            0 => Self::StartOfNewElevation,
            1 => Self::IntermediateRadial,
            2 => Self::EndOfElevation,
            3 => Self::BeginningOfVolumeScan,
            4 => Self::EndOfVolumeScan,
            other => Self::Unknown(other),
        }
    }
}

/// Digital radar data header (message type 1).
///
/// Azimuth and elevation are coded as (val/8)*(180/4096) degrees; gate
/// counts and spacings are meters; data pointers are byte offsets from the
/// start of the message header.
#[derive(Debug, Clone, PartialEq)]
pub struct RadialHeader {
    pub millisecs_past_midnight: i32,
    pub julian_date: i16,
    pub unambiguous_range_km: f64,
    pub azimuth_deg: f64,
    pub radial_num: i16,
    pub status: RadialStatus,
    pub elevation_deg: f64,
    pub elev_num: i16,
    pub ref_gate1_m: i16,
    pub vel_gate1_m: i16,
    pub ref_gate_width_m: i16,
    pub vel_gate_width_m: i16,
    pub ref_num_gates: i16,
    pub vel_num_gates: i16,
    pub ref_ptr: i16,
    pub vel_ptr: i16,
    pub sw_ptr: i16,
    pub velocity_resolution: i16,
    pub vcp: i16,
    pub nyquist_mps: f64,
}

/// Convert the coded 16-bit angle to degrees.
fn coded_angle_deg(val: u16) -> f64 {
    (val as f64 / 8.0) * (180.0 / 4096.0)
}

impl RadialHeader {
    /// Parse from a logical record (CTM block + message header included).
    pub fn parse(record: &[u8]) -> WireResult<Self> {
        let mut cur = Cursor::at(record, CTM_SIZE + MESSAGE_HEADER_SIZE);

        let millisecs_past_midnight = cur.be_i32()?;
        let julian_date = cur.be_i16()?;
        let unamb_range_x10 = cur.be_i16()?;
        let azimuth = cur.be_u16()?;
        let radial_num = cur.be_i16()?;
        let status = RadialStatus::from_code(cur.be_i16()?);
        let elevation = cur.be_u16()?;
        let elev_num = cur.be_i16()?;
        let ref_gate1_m = cur.be_i16()?;
        let vel_gate1_m = cur.be_i16()?;
        let ref_gate_width_m = cur.be_i16()?;
        let vel_gate_width_m = cur.be_i16()?;
        let ref_num_gates = cur.be_i16()?;
        let vel_num_gates = cur.be_i16()?;
        cur.skip(2)?; // sector number
        cur.skip(4)?; // system gain calibration constant
        let ref_ptr = cur.be_i16()?;
        let vel_ptr = cur.be_i16()?;
        let sw_ptr = cur.be_i16()?;
        let velocity_resolution = cur.be_i16()?;
        let vcp = cur.be_i16()?;
        cur.skip(8)?; // unused words 23-26
        cur.skip(6)?; // playback pointers
        let nyquist_x100 = cur.be_i16()?;

        Ok(Self {
            millisecs_past_midnight,
            julian_date,
            unambiguous_range_km: unamb_range_x10 as f64 / 10.0,
            azimuth_deg: coded_angle_deg(azimuth),
            radial_num,
            status,
            elevation_deg: coded_angle_deg(elevation),
            elev_num,
            ref_gate1_m,
            vel_gate1_m,
            ref_gate_width_m,
            vel_gate_width_m,
            ref_num_gates,
            vel_num_gates,
            ref_ptr,
            vel_ptr,
            sw_ptr,
            velocity_resolution,
            vcp,
            nyquist_mps: nyquist_x100 as f64 / 100.0,
        })
    }

    /// Collection time for this radial.
    pub fn time(&self) -> DateTime<Utc> {
        julian_time(self.julian_date as i64, self.millisecs_past_midnight as i64)
    }

    /// Gate samples for one moment, located through its data pointer.
    /// Pointers are relative to the message header start.
    pub fn moment_gates<'a>(
        &self,
        record: &'a [u8],
        ptr: i16,
        num_gates: i16,
    ) -> WireResult<&'a [u8]> {
        if ptr <= 0 || num_gates <= 0 {
            return Ok(&[]);
        }
        let start = CTM_SIZE + ptr as usize;
        let mut cur = Cursor::at(record, start);
        cur.bytes(num_gates as usize)
    }
}

/// Modified julian day (day 1 = 1970-01-01) + ms of day to UTC.
fn julian_time(julian_date: i64, millisecs: i64) -> DateTime<Utc> {
    let midnight = Utc
        .timestamp_opt((julian_date - 1) * 86_400, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    midnight + Duration::milliseconds(millisecs)
}
