//! Decoding one wire message into a reformatted beam.

use level2_wire::{RadialHeader, RadialStatus};
use radar_common::{
    FieldParam, MessageKind, RadarBeamState, RadarParams, RawMessage, RelayError, RelayResult,
};
use tracing::debug;

/// Speed of light, m/s, for deriving PRF from the unambiguous range.
const C_MPS: f64 = 299_792_458.0;

/// Velocity resolution code for 0.5 m/s data.
const VEL_RES_HALF: i16 = 2;

/// One decoded beam per wire message. Implementations carry whatever state
/// they need across calls (volume counting, scan-type change detection).
pub trait Reformatter {
    fn reformat(&mut self, msg: &RawMessage<'_>) -> RelayResult<RadarBeamState>;
}

/// Reformatter for Level II digital radar data (message type 1).
#[derive(Debug, Default)]
pub struct Level2Reformatter {
    last_vcp: Option<i16>,
    last_elev_num: Option<i16>,
    volume_num: u32,
}

impl Level2Reformatter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Reformatter for Level2Reformatter {
    fn reformat(&mut self, msg: &RawMessage<'_>) -> RelayResult<RadarBeamState> {
        if msg.kind != MessageKind::DigitalRadarData {
            return Err(RelayError::Decode(format!(
                "unexpected message type {}",
                msg.kind.type_code()
            )));
        }
        let hdr = RadialHeader::parse(msg.data).map_err(|e| RelayError::Decode(e.to_string()))?;

        let mut beam = RadarBeamState::default();

        // Start flags from the radial status and the transport's boundary.
        match hdr.status {
            RadialStatus::BeginningOfVolumeScan => {
                beam.flags.start_of_volume = true;
                beam.flags.start_of_tilt = true;
            }
            RadialStatus::StartOfNewElevation => {
                beam.flags.start_of_tilt = true;
            }
            RadialStatus::Unknown(code) => {
                debug!(code, "Unknown radial status");
            }
            _ => {}
        }
        if msg.volume_title_seen {
            beam.flags.start_of_volume = true;
            beam.flags.start_of_tilt = true;
        }
        // A tilt boundary can also show up as an elevation-number step when
        // the start radial itself was lost.
        if let Some(last) = self.last_elev_num {
            if hdr.elev_num != last {
                beam.flags.start_of_tilt = true;
            }
        }
        self.last_elev_num = Some(hdr.elev_num);

        if let Some(last) = self.last_vcp {
            if hdr.vcp != last {
                beam.flags.new_scan_type = true;
            }
        }
        self.last_vcp = Some(hdr.vcp);

        if beam.flags.start_of_volume {
            self.volume_num += 1;
        }

        // Moment fields present in this beam, REF/VEL/SW order.
        let vel_scale = if hdr.velocity_resolution == VEL_RES_HALF {
            (0.5, -63.5)
        } else {
            (1.0, -127.0)
        };
        let moments = [
            ("REF", "dBZ", (0.5, -32.0), hdr.ref_ptr, hdr.ref_num_gates),
            ("VEL", "m/s", vel_scale, hdr.vel_ptr, hdr.vel_num_gates),
            ("SW", "m/s", (0.5, -63.5), hdr.sw_ptr, hdr.vel_num_gates),
        ];
        for (name, units, (scale, bias), ptr, num_gates) in moments {
            let gates = hdr
                .moment_gates(msg.data, ptr, num_gates)
                .map_err(|e| RelayError::Decode(e.to_string()))?;
            if gates.is_empty() {
                continue;
            }
            beam.fields.push(FieldParam::new(name, units, scale, bias));
            beam.samples.push(gates.to_vec());
        }

        let has_ref = hdr.ref_ptr > 0 && hdr.ref_num_gates > 0;
        let (gate_count, gate_spacing_m, range_to_first_gate_m) = if has_ref {
            (hdr.ref_num_gates, hdr.ref_gate_width_m, hdr.ref_gate1_m)
        } else {
            (hdr.vel_num_gates, hdr.vel_gate_width_m, hdr.vel_gate1_m)
        };

        let unambiguous_range_m = hdr.unambiguous_range_km * 1000.0;
        let prf_hz = if unambiguous_range_m > 0.0 {
            C_MPS / (2.0 * unambiguous_range_m)
        } else {
            0.0
        };

        beam.params = RadarParams {
            vcp: hdr.vcp.max(0) as u16,
            target_elevation_deg: hdr.elevation_deg,
            gate_count: gate_count.max(0) as u16,
            gate_spacing_m: gate_spacing_m.max(0) as u16,
            range_to_first_gate_m: range_to_first_gate_m as i32,
            unambiguous_range_km: hdr.unambiguous_range_km,
            nyquist_mps: hdr.nyquist_mps,
            prf_hz,
            velocity_resolution: hdr.velocity_resolution.max(0) as u16,
        };
        beam.azimuth_deg = hdr.azimuth_deg;
        beam.elevation_deg = hdr.elevation_deg;
        beam.time = hdr.time();
        beam.volume_num = self.volume_num;
        beam.tilt_num = hdr.elev_num.max(0) as u32;
        beam.radial_num = hdr.radial_num.max(0) as u16;

        Ok(beam)
    }
}
