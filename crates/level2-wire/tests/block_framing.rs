//! A physical block walked end to end through the framer.

use std::io::Read;

use level2_wire::{
    Compression, Framer, VolumeTitle, CTM_SIZE, PACKET_SIZE, VOLUME_TITLE_SIZE,
};
use radar_common::MessageKind;

fn packet(msg_type: u8, azimuth_raw: u16) -> Vec<u8> {
    let mut rec = vec![0u8; PACKET_SIZE];
    let half_len = ((PACKET_SIZE - CTM_SIZE) / 2) as u16;
    rec[12..14].copy_from_slice(&half_len.to_be_bytes());
    rec[15] = msg_type;
    rec[18..20].copy_from_slice(&20_000u16.to_be_bytes());
    rec[36..38].copy_from_slice(&azimuth_raw.to_be_bytes());
    rec
}

fn title(vol: u32) -> Vec<u8> {
    let mut t = vec![0u8; VOLUME_TITLE_SIZE];
    t[..9].copy_from_slice(b"ARCHIVE2.");
    t[9..12].copy_from_slice(format!("{vol:03}").as_bytes());
    t[12..14].copy_from_slice(&20_000i16.to_be_bytes());
    t
}

#[test]
fn block_is_sliced_filtered_and_tagged_with_the_boundary() {
    let mut framer = Framer::new(MessageKind::DigitalRadarData);
    framer.begin_source("test-blob", Compression::Uncompressed);

    let vt = VolumeTitle::parse(&title(17)).unwrap();
    framer.note_title(&vt);
    assert_eq!(framer.context().volume_num, Some(17));

    // Type-2 record between two type-1 records must be skipped silently.
    let block = [packet(1, 100), packet(2, 0), packet(1, 200)].concat();
    framer.load_block(&block).unwrap();

    let first = framer.next_record().unwrap().unwrap();
    assert_eq!(first.header.kind, MessageKind::DigitalRadarData);
    assert!(first.title_seen);
    assert_eq!(framer.record_bytes(&first).len(), PACKET_SIZE);

    let second = framer.next_record().unwrap().unwrap();
    assert!(!second.title_seen, "boundary reported once per volume");
    assert_eq!(framer.record_bytes(&second)[36..38], 200u16.to_be_bytes());

    assert!(framer.next_record().unwrap().is_none());
}

#[test]
fn bzip2_block_decompresses_before_slicing() {
    let payload = [packet(1, 10), packet(1, 20)].concat();
    let mut enc = bzip2::read::BzEncoder::new(payload.as_slice(), bzip2::Compression::best());
    let mut compressed = Vec::new();
    enc.read_to_end(&mut compressed).unwrap();

    let mut framer = Framer::new(MessageKind::DigitalRadarData);
    framer.begin_source("test-blob", Compression::Bzip2);
    framer.load_block(&compressed).unwrap();

    assert!(framer.next_record().unwrap().is_some());
    assert!(framer.next_record().unwrap().is_some());
    assert!(framer.next_record().unwrap().is_none());
}

#[test]
fn segment_chain_answers_volume_completeness() {
    let mut framer = Framer::new(MessageKind::DigitalRadarData);
    framer.begin_source("test-feed", Compression::Uncompressed);
    framer.note_title(&VolumeTitle::parse(&title(3)).unwrap());

    let ctx = framer.context_mut();
    ctx.note_segment(0);
    ctx.note_segment(1);
    assert!(!framer.context().volume_complete());

    let ctx = framer.context_mut();
    ctx.note_segment(2);
    ctx.note_final_segment(2);
    assert!(framer.context().volume_complete());
}
