//! Shared types exercised the way downstream crates consume them.

use radar_common::{BeamFlags, FieldParam, RadarBeamState, RelayError, TransportStatus};

#[test]
fn fatal_errors_name_their_stage() {
    let err = RelayError::bad_input("tcp://radar:10000", "sync lost");
    let text = err.to_string();
    assert!(text.contains("tcp://radar:10000"));
    assert!(text.contains("sync lost"));

    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "/dev/nst0");
    let err: RelayError = io.into();
    assert!(matches!(err, RelayError::DeviceOpen(_)));
    assert!(err.to_string().contains("/dev/nst0"));
}

#[test]
fn terminal_statuses_are_not_recoverable() {
    for status in [
        TransportStatus::Ok,
        TransportStatus::BadData,
        TransportStatus::EndOfFile,
    ] {
        assert!(status.is_recoverable());
    }
    assert!(!TransportStatus::EndOfData.is_recoverable());
    assert!(!TransportStatus::BadInputStream.is_recoverable());
}

#[test]
fn beam_state_survives_a_serialization_round() {
    let beam = RadarBeamState {
        flags: BeamFlags {
            start_of_volume: true,
            ..Default::default()
        },
        azimuth_deg: 123.4,
        fields: vec![FieldParam::new("REF", "dBZ", 0.5, -32.0)],
        samples: vec![vec![1, 2, 3]],
        ..Default::default()
    };

    let json = serde_json::to_string(&beam).unwrap();
    let back: RadarBeamState = serde_json::from_str(&json).unwrap();
    assert!(back.flags.start_of_volume);
    assert_eq!(back.azimuth_deg, 123.4);
    assert_eq!(back.fields, beam.fields);
    assert_eq!(back.samples, beam.samples);
}
