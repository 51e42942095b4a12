//! The file transport exercised through the public `Transport` interface.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use level2_wire::{Compression, CTM_SIZE, PACKET_SIZE, VOLUME_TITLE_SIZE};
use radar_common::TransportStatus;
use transport::{LdmConfig, LdmTransport, Transport};

fn packet(msg_type: u8) -> Vec<u8> {
    let mut rec = vec![0u8; PACKET_SIZE];
    let half_len = ((PACKET_SIZE - CTM_SIZE) / 2) as u16;
    rec[12..14].copy_from_slice(&half_len.to_be_bytes());
    rec[15] = msg_type;
    rec[18..20].copy_from_slice(&20_000u16.to_be_bytes());
    rec
}

fn title(vol: u32) -> Vec<u8> {
    let mut t = vec![0u8; VOLUME_TITLE_SIZE];
    t[..9].copy_from_slice(b"ARCHIVE2.");
    t[9..12].copy_from_slice(format!("{vol:03}").as_bytes());
    t[12..14].copy_from_slice(&20_000i16.to_be_bytes());
    t
}

fn write_file(path: &Path, chunks: &[&[u8]]) {
    let mut f = File::create(path).unwrap();
    for c in chunks {
        f.write_all(c).unwrap();
    }
}

#[test]
fn two_volume_archive_replays_with_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let vol_a = dir.path().join("vol_a");
    let vol_b = dir.path().join("vol_b");
    write_file(&vol_a, &[&title(1), &packet(1), &packet(1)]);
    write_file(&vol_b, &[&title(2), &packet(1)]);

    let cfg = LdmConfig::archive(vec![vol_a, vol_b], Compression::Uncompressed);
    let mut transport = LdmTransport::new(cfg);

    let (status, msg) = transport.next_message();
    assert_eq!(status, TransportStatus::Ok);
    assert!(msg.unwrap().volume_title_seen);
    assert_eq!(transport.context().volume_num, Some(1));

    assert_eq!(transport.next_message().0, TransportStatus::Ok);
    assert_eq!(transport.next_message().0, TransportStatus::EndOfFile);

    let (status, msg) = transport.next_message();
    assert_eq!(status, TransportStatus::Ok);
    assert!(msg.unwrap().volume_title_seen);
    assert_eq!(transport.context().volume_num, Some(2));

    assert_eq!(transport.next_message().0, TransportStatus::EndOfFile);
    assert_eq!(transport.next_message().0, TransportStatus::EndOfData);
}

#[test]
fn unreadable_entry_is_skipped_and_the_list_continues() {
    let dir = tempfile::tempdir().unwrap();
    let good = dir.path().join("vol");
    write_file(&good, &[&title(5), &packet(1)]);
    let missing = dir.path().join("no_such_file");

    let cfg = LdmConfig::archive(vec![missing, good], Compression::Uncompressed);
    let mut transport = LdmTransport::new(cfg);

    let (status, msg) = transport.next_message();
    assert_eq!(status, TransportStatus::Ok);
    assert!(msg.unwrap().volume_title_seen);
    assert_eq!(transport.context().volume_num, Some(5));
}
