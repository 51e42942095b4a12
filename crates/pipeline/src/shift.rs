//! The double-buffered reformatting shift register.
//!
//! Two beam slots and one transform. The input slot holds the most recently
//! decoded beam; the output slot holds the beam about to be published, one
//! cycle behind. The transform is deliberately a single function so the
//! copy-or-clear rules stay auditable in one place:
//!
//! - the field descriptor list is replaced only when it differs, and the
//!   input list is always cleared afterward (the next decode rebuilds it);
//! - radar parameters are copied only when the change flag says so, and are
//!   never blanket-cleared (several are sent once at startup and never
//!   resent);
//! - per-beam samples and scalars are overwritten every cycle;
//! - flags are copied when changed, otherwise the output flags are reset so
//!   no boundary flag outlives its beam.

use radar_common::RadarBeamState;

/// Change tracking across the two register slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeFlags {
    pub input_params_changed: bool,
    pub output_params_changed: bool,
    pub input_flags_changed: bool,
    pub output_flags_changed: bool,
}

/// The shift register. Both slots are allocated once and mutated in place.
#[derive(Debug, Default)]
pub struct ShiftRegister {
    input: RadarBeamState,
    output: RadarBeamState,
    changes: ChangeFlags,
    /// The output slot's field list was replaced by the latest shift.
    fields_replaced: bool,
    /// The output slot holds a real beam (at least one shift has happened).
    primed: bool,
}

impl ShiftRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a freshly decoded beam in the input slot, deriving the
    /// input-side change flags in one place.
    pub fn load(&mut self, decoded: RadarBeamState) {
        self.changes.input_params_changed = decoded.params != self.input.params;
        self.changes.input_flags_changed = decoded.flags.any_set();
        self.input = decoded;
    }

    /// Derive terminal flags on the buffered output beam from the newly
    /// loaded input beam: a new start of volume/tilt means the previous
    /// beam ended one. Call between `load` and publication.
    pub fn note_terminal_flags(&mut self) {
        if self.input.flags.start_of_volume {
            self.output.flags.end_of_volume = true;
            self.changes.output_flags_changed = true;
        }
        if self.input.flags.start_of_tilt {
            self.output.flags.end_of_tilt = true;
            self.changes.output_flags_changed = true;
        }
    }

    /// The copy-or-clear transform. Cannot fail; malformed upstream input
    /// is handled one layer up by skipping the whole cycle.
    pub fn shift(&mut self) {
        // Field descriptor list: replace only on difference, always clear
        // the input side.
        self.fields_replaced = self.output.fields != self.input.fields;
        if self.fields_replaced {
            self.output.fields.clone_from(&self.input.fields);
        }
        self.input.fields.clear();

        // Parameters: copied only when flagged, never cleared.
        self.changes.output_params_changed = self.changes.input_params_changed;
        self.changes.input_params_changed = false;
        if self.changes.output_params_changed {
            self.output.params = self.input.params.clone();
        }

        // Per-beam payload: overwritten unconditionally.
        self.output.samples.clone_from(&self.input.samples);
        self.output.azimuth_deg = self.input.azimuth_deg;
        self.output.elevation_deg = self.input.elevation_deg;
        self.output.time = self.input.time;
        self.output.volume_num = self.input.volume_num;
        self.output.tilt_num = self.input.tilt_num;
        self.output.radial_num = self.input.radial_num;

        // Flags: copied when changed, reset otherwise so stale boundary
        // flags never ride along on the next beam.
        self.changes.output_flags_changed = self.changes.input_flags_changed;
        self.changes.input_flags_changed = false;
        if self.changes.output_flags_changed {
            self.output.flags = self.input.flags;
        } else {
            self.output.flags.clear();
        }
        self.input.flags.clear();

        self.primed = true;
    }

    /// At end of data there is no next beam to derive terminal flags from;
    /// mark the buffered beam as closing its tilt and volume.
    pub fn flush(&mut self) {
        self.output.flags.end_of_tilt = true;
        self.output.flags.end_of_volume = true;
        self.changes.output_flags_changed = true;
    }

    pub fn output(&self) -> &RadarBeamState {
        &self.output
    }

    pub fn changes(&self) -> &ChangeFlags {
        &self.changes
    }

    pub fn fields_replaced(&self) -> bool {
        self.fields_replaced
    }

    pub fn primed(&self) -> bool {
        self.primed
    }
}
