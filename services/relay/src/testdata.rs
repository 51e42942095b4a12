//! Shared wire-format fixtures for service tests.

use level2_wire::{CTM_SIZE, PACKET_SIZE};

/// Inverse of the coded-angle conversion.
fn coded_angle(deg: f64) -> u16 {
    (deg * 8.0 * 4096.0 / 180.0).round() as u16
}

/// A type-1 packet with a plausible message header and a radial header
/// carrying four REF gates.
pub fn radial_packet(azimuth_deg: f64, status: i16, elev_num: i16) -> Vec<u8> {
    let mut rec = vec![0u8; PACKET_SIZE];

    // Message header.
    let half_len = ((PACKET_SIZE - CTM_SIZE) / 2) as u16;
    rec[12..14].copy_from_slice(&half_len.to_be_bytes());
    rec[15] = 1;
    rec[18..20].copy_from_slice(&20_000u16.to_be_bytes());
    rec[20..24].copy_from_slice(&43_200_000u32.to_be_bytes());

    // Radial header.
    rec[28..32].copy_from_slice(&43_200_000i32.to_be_bytes());
    rec[32..34].copy_from_slice(&20_000i16.to_be_bytes());
    rec[34..36].copy_from_slice(&1_150i16.to_be_bytes()); // 115 km unambiguous
    rec[36..38].copy_from_slice(&coded_angle(azimuth_deg).to_be_bytes());
    rec[38..40].copy_from_slice(&1i16.to_be_bytes());
    rec[40..42].copy_from_slice(&status.to_be_bytes());
    rec[42..44].copy_from_slice(&coded_angle(0.5).to_be_bytes());
    rec[44..46].copy_from_slice(&elev_num.to_be_bytes());
    rec[50..52].copy_from_slice(&1_000i16.to_be_bytes()); // REF gate width
    rec[54..56].copy_from_slice(&4i16.to_be_bytes()); // REF gate count
    rec[64..66].copy_from_slice(&88i16.to_be_bytes()); // REF data pointer
    rec[70..72].copy_from_slice(&2i16.to_be_bytes()); // velocity resolution
    rec[72..74].copy_from_slice(&11i16.to_be_bytes()); // VCP
    rec[88..90].copy_from_slice(&2_650i16.to_be_bytes()); // Nyquist x100

    // Four REF gates, located through the data pointer.
    rec[100..104].copy_from_slice(&[10, 20, 30, 40]);
    rec
}
