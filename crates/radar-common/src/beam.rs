//! Reformatted beam state.
//!
//! Two [`RadarBeamState`] instances exist in the pipeline at any time: the
//! input side (most recently decoded) and the output side (one step behind,
//! about to be published). Both are allocated once and mutated in place so
//! the per-cycle shift stays O(1) amortized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Beam boundary flags.
///
/// Start flags come straight from the decoded radial status. End flags are
/// only ever derived one message late, by observing the *next* beam's start
/// flags while this beam still sits on the output side of the register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeamFlags {
    pub start_of_volume: bool,
    pub end_of_volume: bool,
    pub start_of_tilt: bool,
    pub end_of_tilt: bool,
    pub new_scan_type: bool,
}

impl BeamFlags {
    /// Reset to the default unset state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn any_set(&self) -> bool {
        self.start_of_volume
            || self.end_of_volume
            || self.start_of_tilt
            || self.end_of_tilt
            || self.new_scan_type
    }
}

/// Scalar radar parameters.
///
/// Several of these are sent once at startup and never resent, so the shift
/// register must never blanket-clear them; they persist until a decoded beam
/// actually changes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadarParams {
    /// Volume coverage pattern (scan type).
    pub vcp: u16,
    pub target_elevation_deg: f64,
    pub gate_count: u16,
    pub gate_spacing_m: u16,
    pub range_to_first_gate_m: i32,
    pub unambiguous_range_km: f64,
    pub nyquist_mps: f64,
    pub prf_hz: f64,
    /// Doppler velocity resolution code (2 = 0.5 m/s, 4 = 1.0 m/s).
    pub velocity_resolution: u16,
}

/// Descriptor for one moment field (name/units/scale/bias).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldParam {
    pub name: String,
    pub units: String,
    /// Physical value = raw * scale + bias.
    pub scale: f64,
    pub bias: f64,
}

impl FieldParam {
    pub fn new(name: &str, units: &str, scale: f64, bias: f64) -> Self {
        Self {
            name: name.to_string(),
            units: units.to_string(),
            scale,
            bias,
        }
    }
}

/// The reformatted representation of one beam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarBeamState {
    pub flags: BeamFlags,
    pub params: RadarParams,
    pub azimuth_deg: f64,
    pub elevation_deg: f64,
    pub time: DateTime<Utc>,
    pub volume_num: u32,
    pub tilt_num: u32,
    pub radial_num: u16,
    /// One descriptor per moment present in this beam.
    pub fields: Vec<FieldParam>,
    /// Per-gate samples, parallel to `fields`.
    pub samples: Vec<Vec<u8>>,
}

impl Default for RadarBeamState {
    fn default() -> Self {
        Self {
            flags: BeamFlags::default(),
            params: RadarParams::default(),
            azimuth_deg: 0.0,
            elevation_deg: 0.0,
            time: DateTime::<Utc>::UNIX_EPOCH,
            volume_num: 0,
            tilt_num: 0,
            radial_num: 0,
            fields: Vec::new(),
            samples: Vec::new(),
        }
    }
}
