//! The output multiplexer.
//!
//! Decides, per published beam, which content categories go to the queue
//! and whether the write happens at all. Publication rules are applied in
//! a fixed order: leading control markers, content-mask accumulation,
//! first-rotation capture gating, the queue write itself, trailing control
//! markers, and a periodic one-line summary.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use radar_common::{RadarBeamState, RelayError, RelayResult};

use crate::queue::{BeamQueue, ContentMask, Marker};
use crate::shift::ChangeFlags;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Emit boundary flags as standalone marker messages around the beam.
    pub separate_flags: bool,
    /// Suppress sample payloads for beams whose every field carries this
    /// name (e.g. drop 1 km velocity-only beams).
    pub filter_field: Option<String>,
    /// Publish only the first full antenna rotation of each elevation.
    pub first_rotation_only: bool,
    /// Angular tolerance for detecting a completed rotation, degrees.
    pub rotation_tolerance_deg: f64,
    /// Beams still published after the rotation closes.
    pub post_rotation_beams: u32,
    /// Full parameter blocks are resent at least this often, in beams.
    pub param_republish_interval: u32,
    /// Beams between one-line summary logs. Zero disables the summary.
    pub summary_interval: u64,
    /// Sleep after each queue write, milliseconds. Zero disables.
    pub inter_beam_delay_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            separate_flags: false,
            filter_field: None,
            first_rotation_only: false,
            rotation_tolerance_deg: 3.0,
            post_rotation_beams: 2,
            param_republish_interval: 5,
            summary_interval: 100,
            inter_beam_delay_ms: 0,
        }
    }
}

/// First-rotation capture state for one elevation.
///
/// Geometry (gate count/spacing) keeps following the beam until the
/// rotation completes, then freezes; after completion a geometry change is
/// the exit test that reopens publication. Transient geometry noise during
/// the rotation is therefore absorbed rather than treated as a
/// discontinuity.
#[derive(Debug)]
struct RotationCapture {
    target_elevation_deg: f64,
    start_azimuth_deg: f64,
    gate_count: u16,
    gate_spacing_m: u16,
    /// The antenna has left the starting tolerance window at least once.
    moved: bool,
    complete: bool,
    beams_after: u32,
}

impl RotationCapture {
    fn begin(beam: &RadarBeamState) -> Self {
        Self {
            target_elevation_deg: beam.params.target_elevation_deg,
            start_azimuth_deg: beam.azimuth_deg,
            gate_count: beam.params.gate_count,
            gate_spacing_m: beam.params.gate_spacing_m,
            moved: false,
            complete: false,
            beams_after: 0,
        }
    }

    fn geometry_differs(&self, beam: &RadarBeamState) -> bool {
        beam.params.gate_count != self.gate_count
            || beam.params.gate_spacing_m != self.gate_spacing_m
    }
}

/// Compare two azimuths through the chord between their unit vectors, so
/// 359.5 and 0.5 degrees come out one degree apart rather than 359.
fn angles_close(a_deg: f64, b_deg: f64, tolerance_deg: f64) -> bool {
    let (a, b) = (a_deg.to_radians(), b_deg.to_radians());
    let chord = ((a.sin() - b.sin()).powi(2) + (a.cos() - b.cos()).powi(2)).sqrt();
    chord <= 2.0 * (tolerance_deg.to_radians() / 2.0).sin()
}

pub struct OutputMux {
    cfg: OutputConfig,
    /// Beams until the next forced parameter resend. Ticks only on actual
    /// queue writes; fires at zero.
    countdown: u32,
    rotation: Option<RotationCapture>,
    published: u64,
}

impl OutputMux {
    pub fn new(cfg: OutputConfig) -> Self {
        Self {
            cfg,
            countdown: 0,
            rotation: None,
            published: 0,
        }
    }

    /// Publish one output beam. Queue failures are fatal; everything else
    /// here is pure bookkeeping.
    pub fn publish(
        &mut self,
        beam: &RadarBeamState,
        changes: &ChangeFlags,
        fields_replaced: bool,
        queue: &mut dyn BeamQueue,
    ) -> RelayResult<()> {
        if self.cfg.separate_flags {
            if beam.flags.new_scan_type {
                write_marker(queue, Marker::NewScanType, beam)?;
            }
            if beam.flags.start_of_volume {
                write_marker(queue, Marker::StartOfVolume, beam)?;
            }
            if beam.flags.start_of_tilt {
                write_marker(queue, Marker::StartOfTilt, beam)?;
            }
        }

        let mut mask = ContentMask::default();
        if changes.output_flags_changed {
            mask.insert(ContentMask::FLAGS);
        }
        if !self.samples_filtered(beam) {
            mask.insert(ContentMask::SAMPLES);
        }
        let countdown_fired = self.countdown == 0;
        if changes.output_params_changed || countdown_fired || beam.flags.start_of_tilt {
            mask.insert(ContentMask::PARAMS);
        }
        if fields_replaced {
            mask.insert(ContentMask::FIELD_PARAMS);
        }

        let permitted = self.rotation_permits(beam);

        if permitted && !mask.is_empty() {
            queue
                .write_beam(beam, mask)
                .map_err(|e| RelayError::BadOutputStream(e.to_string()))?;
            if countdown_fired {
                self.countdown = self.cfg.param_republish_interval;
            }
            self.countdown = self.countdown.saturating_sub(1);
            self.published += 1;

            if self.cfg.inter_beam_delay_ms > 0 {
                thread::sleep(Duration::from_millis(self.cfg.inter_beam_delay_ms));
            }
            if self.cfg.summary_interval > 0 && self.published % self.cfg.summary_interval == 0 {
                info!(
                    vcp = beam.params.vcp,
                    volume = beam.volume_num,
                    tilt = beam.tilt_num,
                    elevation = beam.elevation_deg,
                    azimuth = beam.azimuth_deg,
                    gates = beam.params.gate_count,
                    gate_spacing_m = beam.params.gate_spacing_m,
                    prf = beam.params.prf_hz,
                    time = %beam.time,
                    published = self.published,
                    "Beam summary"
                );
            }
        } else {
            debug!(
                azimuth = beam.azimuth_deg,
                permitted,
                mask = mask.bits(),
                "Beam not written"
            );
        }

        if self.cfg.separate_flags {
            if beam.flags.end_of_tilt {
                write_marker(queue, Marker::EndOfTilt, beam)?;
            }
            if beam.flags.end_of_volume {
                write_marker(queue, Marker::EndOfVolume, beam)?;
            }
        }

        Ok(())
    }

    fn samples_filtered(&self, beam: &RadarBeamState) -> bool {
        match &self.cfg.filter_field {
            Some(name) => {
                !beam.fields.is_empty() && beam.fields.iter().all(|f| f.name == *name)
            }
            None => false,
        }
    }

    /// First-rotation-only gate. Always permits when the mode is off.
    fn rotation_permits(&mut self, beam: &RadarBeamState) -> bool {
        if !self.cfg.first_rotation_only {
            return true;
        }

        let restart = match &self.rotation {
            None => true,
            Some(rot) => {
                beam.params.target_elevation_deg != rot.target_elevation_deg
                    || (rot.complete && rot.geometry_differs(beam))
            }
        };
        if restart {
            debug!(
                elevation = beam.params.target_elevation_deg,
                azimuth = beam.azimuth_deg,
                "Starting rotation capture"
            );
            self.rotation = Some(RotationCapture::begin(beam));
            return true;
        }

        let tolerance = self.cfg.rotation_tolerance_deg;
        let allowance = self.cfg.post_rotation_beams;
        if let Some(rot) = self.rotation.as_mut() {
            if !rot.complete {
                // Geometry follows the beam until lock-in.
                rot.gate_count = beam.params.gate_count;
                rot.gate_spacing_m = beam.params.gate_spacing_m;

                if !angles_close(beam.azimuth_deg, rot.start_azimuth_deg, tolerance) {
                    rot.moved = true;
                } else if rot.moved {
                    rot.complete = true;
                    info!(
                        elevation = rot.target_elevation_deg,
                        azimuth = beam.azimuth_deg,
                        "Rotation complete"
                    );
                }
                return true;
            }
            rot.beams_after += 1;
            return rot.beams_after <= allowance;
        }
        true
    }
}

fn write_marker(
    queue: &mut dyn BeamQueue,
    marker: Marker,
    beam: &RadarBeamState,
) -> RelayResult<()> {
    queue
        .write_marker(marker, beam)
        .map_err(|e| RelayError::BadOutputStream(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueue, QueueError, QueueWrite};
    use radar_common::FieldParam;

    fn beam(azimuth: f64) -> RadarBeamState {
        RadarBeamState {
            azimuth_deg: azimuth,
            fields: vec![FieldParam::new("REF", "dBZ", 0.5, -32.0)],
            samples: vec![vec![1, 2, 3]],
            ..Default::default()
        }
    }

    fn quiet_cfg() -> OutputConfig {
        OutputConfig {
            summary_interval: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_angles_close_handles_wraparound() {
        assert!(angles_close(359.5, 0.5, 3.0));
        assert!(angles_close(9.0, 10.0, 3.0));
        assert!(!angles_close(90.0, 10.0, 3.0));
        assert!(!angles_close(180.0, 0.0, 3.0));
    }

    #[test]
    fn test_publish_preserves_order() {
        let mut mux = OutputMux::new(quiet_cfg());
        let mut queue = MemoryQueue::new();
        let changes = ChangeFlags::default();

        for az in [0.0, 1.0, 2.0, 3.0] {
            mux.publish(&beam(az), &changes, false, &mut queue).unwrap();
        }

        let azimuths: Vec<f64> = queue.beams().iter().map(|(_, b)| b.azimuth_deg).collect();
        assert_eq!(azimuths, vec![0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_param_republish_cadence() {
        // Twelve beams, no changes, interval 5: parameter blocks ride on
        // beams 1, 6 and 11 (1-indexed).
        let mut mux = OutputMux::new(quiet_cfg());
        let mut queue = MemoryQueue::new();
        let changes = ChangeFlags::default();

        for i in 0..12 {
            mux.publish(&beam(i as f64), &changes, false, &mut queue)
                .unwrap();
        }

        let with_params: Vec<usize> = queue
            .beams()
            .iter()
            .enumerate()
            .filter(|(_, (mask, _))| mask.contains(ContentMask::PARAMS))
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(with_params, vec![1, 6, 11]);
    }

    #[test]
    fn test_start_of_tilt_forces_params_without_resetting_cadence() {
        let mut mux = OutputMux::new(quiet_cfg());
        let mut queue = MemoryQueue::new();
        let changes = ChangeFlags::default();

        for i in 0..12 {
            let mut b = beam(i as f64);
            if i == 2 {
                b.flags.start_of_tilt = true;
            }
            mux.publish(&b, &changes, false, &mut queue).unwrap();
        }

        let with_params: Vec<usize> = queue
            .beams()
            .iter()
            .enumerate()
            .filter(|(_, (mask, _))| mask.contains(ContentMask::PARAMS))
            .map(|(i, _)| i + 1)
            .collect();
        assert_eq!(with_params, vec![1, 3, 6, 11]);
    }

    #[test]
    fn test_first_rotation_capture() {
        let cfg = OutputConfig {
            first_rotation_only: true,
            rotation_tolerance_deg: 3.0,
            post_rotation_beams: 2,
            ..quiet_cfg()
        };
        let mut mux = OutputMux::new(cfg);
        let mut queue = MemoryQueue::new();
        let changes = ChangeFlags::default();

        // One rotation starting at 10 degrees, closing at 9, then two more
        // beams allowed, then suppression.
        for az in [10.0, 90.0, 180.0, 270.0, 9.0, 11.0, 13.0, 200.0, 210.0] {
            mux.publish(&beam(az), &changes, false, &mut queue).unwrap();
        }

        let azimuths: Vec<f64> = queue.beams().iter().map(|(_, b)| b.azimuth_deg).collect();
        assert_eq!(azimuths, vec![10.0, 90.0, 180.0, 270.0, 9.0, 11.0, 13.0]);

        // A new elevation reopens publication.
        let mut next_tilt = beam(45.0);
        next_tilt.params.target_elevation_deg = 1.5;
        mux.publish(&next_tilt, &changes, false, &mut queue).unwrap();
        assert_eq!(queue.beams().len(), 8);
    }

    #[test]
    fn test_geometry_frozen_only_after_rotation_completes() {
        // Documented boundary behavior: geometry changes during the
        // rotation update the frozen values silently; only a change after
        // completion reopens publication.
        let cfg = OutputConfig {
            first_rotation_only: true,
            rotation_tolerance_deg: 3.0,
            post_rotation_beams: 0,
            ..quiet_cfg()
        };
        let mut mux = OutputMux::new(cfg);
        let mut queue = MemoryQueue::new();
        let changes = ChangeFlags::default();

        let with_gates = |az: f64, gates: u16| {
            let mut b = beam(az);
            b.params.gate_count = gates;
            b
        };

        // Geometry changes mid-rotation: still published, no restart.
        mux.publish(&with_gates(10.0, 100), &changes, false, &mut queue)
            .unwrap();
        mux.publish(&with_gates(180.0, 200), &changes, false, &mut queue)
            .unwrap();
        mux.publish(&with_gates(9.5, 200), &changes, false, &mut queue)
            .unwrap();
        assert_eq!(queue.beams().len(), 3);

        // Rotation is complete; same geometry is now suppressed.
        mux.publish(&with_gates(12.0, 200), &changes, false, &mut queue)
            .unwrap();
        assert_eq!(queue.beams().len(), 3);

        // A geometry change against the frozen values reopens publication.
        mux.publish(&with_gates(14.0, 400), &changes, false, &mut queue)
            .unwrap();
        assert_eq!(queue.beams().len(), 4);
    }

    #[test]
    fn test_field_filter_suppresses_samples() {
        let cfg = OutputConfig {
            filter_field: Some("VEL".to_string()),
            ..quiet_cfg()
        };
        let mut mux = OutputMux::new(cfg);
        let mut queue = MemoryQueue::new();
        let changes = ChangeFlags::default();

        let mut vel_only = beam(1.0);
        vel_only.fields = vec![FieldParam::new("VEL", "m/s", 0.5, -63.5)];

        // First beam: countdown fires, so params still go out, samples not.
        mux.publish(&vel_only, &changes, false, &mut queue).unwrap();
        let beams = queue.beams();
        assert_eq!(beams.len(), 1);
        assert!(beams[0].0.contains(ContentMask::PARAMS));
        assert!(!beams[0].0.contains(ContentMask::SAMPLES));

        // Second filtered beam carries nothing at all: no write.
        let mut second = beam(2.0);
        second.fields = vec![FieldParam::new("VEL", "m/s", 0.5, -63.5)];
        mux.publish(&second, &changes, false, &mut queue).unwrap();
        assert_eq!(queue.beams().len(), 1);

        // A mixed-field beam keeps its samples.
        mux.publish(&beam(3.0), &changes, false, &mut queue).unwrap();
        let beams = queue.beams();
        assert!(beams[1].0.contains(ContentMask::SAMPLES));
    }

    #[test]
    fn test_separate_flag_markers_bracket_the_beam() {
        let cfg = OutputConfig {
            separate_flags: true,
            ..quiet_cfg()
        };
        let mut mux = OutputMux::new(cfg);
        let mut queue = MemoryQueue::new();
        let changes = ChangeFlags {
            output_flags_changed: true,
            ..Default::default()
        };

        let mut b = beam(0.0);
        b.flags.start_of_volume = true;
        b.flags.start_of_tilt = true;
        b.flags.end_of_tilt = true;
        mux.publish(&b, &changes, false, &mut queue).unwrap();

        let kinds: Vec<&str> = queue
            .writes
            .iter()
            .map(|w| match w {
                QueueWrite::Marker(Marker::StartOfVolume) => "sov",
                QueueWrite::Marker(Marker::StartOfTilt) => "sot",
                QueueWrite::Marker(Marker::EndOfTilt) => "eot",
                QueueWrite::Marker(_) => "other",
                QueueWrite::Beam { .. } => "beam",
            })
            .collect();
        assert_eq!(kinds, vec!["sov", "sot", "beam", "eot"]);
    }

    #[test]
    fn test_queue_failure_is_fatal() {
        struct BrokenQueue;
        impl BeamQueue for BrokenQueue {
            fn write_beam(
                &mut self,
                _beam: &RadarBeamState,
                _mask: ContentMask,
            ) -> Result<(), QueueError> {
                Err(QueueError::Encode("queue gone".to_string()))
            }
            fn write_marker(
                &mut self,
                _marker: Marker,
                _beam: &RadarBeamState,
            ) -> Result<(), QueueError> {
                Ok(())
            }
        }

        let mut mux = OutputMux::new(quiet_cfg());
        let err = mux
            .publish(&beam(0.0), &ChangeFlags::default(), false, &mut BrokenQueue)
            .unwrap_err();
        assert!(matches!(err, RelayError::BadOutputStream(_)));
    }
}
