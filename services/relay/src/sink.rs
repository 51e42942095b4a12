//! JSON-lines beam sink.
//!
//! One JSON object per queue write, to a file or stdout. Content categories
//! excluded by the write's mask are omitted from the object entirely, so a
//! consumer sees exactly what the multiplexer decided to send.

use std::fs::File;
use std::io::{self, BufWriter, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use pipeline::{BeamQueue, ContentMask, Marker, QueueError};
use radar_common::{BeamFlags, FieldParam, RadarBeamState, RadarParams};

use crate::config::QueueConfig;

pub struct JsonLinesQueue {
    out: Box<dyn Write + Send>,
}

#[derive(Serialize)]
struct BeamLine<'a> {
    record: &'static str,
    mask: u32,
    time: DateTime<Utc>,
    volume: u32,
    tilt: u32,
    radial: u16,
    azimuth_deg: f64,
    elevation_deg: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    flags: Option<&'a BeamFlags>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a RadarParams>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [FieldParam]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    samples: Option<&'a [Vec<u8>]>,
}

#[derive(Serialize)]
struct MarkerLine {
    record: &'static str,
    marker: Marker,
    time: DateTime<Utc>,
    volume: u32,
    tilt: u32,
}

impl JsonLinesQueue {
    pub fn create(cfg: &QueueConfig) -> io::Result<Self> {
        let out: Box<dyn Write + Send> = match &cfg.path {
            Some(path) => {
                info!(path = %path.display(), "Writing beams to file");
                Box::new(BufWriter::new(File::create(path)?))
            }
            None => Box::new(io::stdout()),
        };
        Ok(Self { out })
    }

    fn write_line<T: Serialize>(&mut self, line: &T) -> Result<(), QueueError> {
        serde_json::to_writer(&mut self.out, line)
            .map_err(|e| QueueError::Encode(e.to_string()))?;
        self.out.write_all(b"\n")?;
        self.out.flush()?;
        Ok(())
    }
}

impl BeamQueue for JsonLinesQueue {
    fn write_beam(&mut self, beam: &RadarBeamState, mask: ContentMask) -> Result<(), QueueError> {
        let line = BeamLine {
            record: "beam",
            mask: mask.bits(),
            time: beam.time,
            volume: beam.volume_num,
            tilt: beam.tilt_num,
            radial: beam.radial_num,
            azimuth_deg: beam.azimuth_deg,
            elevation_deg: beam.elevation_deg,
            flags: mask.contains(ContentMask::FLAGS).then_some(&beam.flags),
            params: mask.contains(ContentMask::PARAMS).then_some(&beam.params),
            fields: mask
                .contains(ContentMask::FIELD_PARAMS)
                .then_some(beam.fields.as_slice()),
            samples: mask
                .contains(ContentMask::SAMPLES)
                .then_some(beam.samples.as_slice()),
        };
        self.write_line(&line)
    }

    fn write_marker(&mut self, marker: Marker, beam: &RadarBeamState) -> Result<(), QueueError> {
        let line = MarkerLine {
            record: "marker",
            marker,
            time: beam.time,
            volume: beam.volume_num,
            tilt: beam.tilt_num,
        };
        self.write_line(&line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_mask_controls_emitted_categories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beams.jsonl");
        let cfg = QueueConfig {
            path: Some(path.clone()),
        };

        let mut queue = JsonLinesQueue::create(&cfg).unwrap();
        let beam = RadarBeamState {
            azimuth_deg: 42.0,
            samples: vec![vec![1, 2]],
            ..Default::default()
        };

        let mut mask = ContentMask::default();
        mask.insert(ContentMask::SAMPLES);
        queue.write_beam(&beam, mask).unwrap();
        queue.write_marker(Marker::EndOfVolume, &beam).unwrap();
        drop(queue);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);

        assert_eq!(lines[0]["record"], "beam");
        assert_eq!(lines[0]["azimuth_deg"], 42.0);
        assert!(lines[0].get("samples").is_some());
        assert!(lines[0].get("params").is_none());
        assert!(lines[0].get("flags").is_none());

        assert_eq!(lines[1]["record"], "marker");
        assert_eq!(lines[1]["marker"], "end_of_volume");
    }
}
