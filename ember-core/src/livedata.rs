//! The 126-byte live-data record streamed to the tuning application.
//!
//! The layout is position-exact across firmware versions; every consumer
//! indexes it by byte offset. Bytes not listed stay zero. Offset 3 carries
//! the sync-loss flag in bit 0 and the protection latches in bits 1-2
//! (over-rev, low oil pressure). Offset 32 is a spark bitfield of which
//! only bit 0 (has sync) is populated here, and offset 35 is the flex-fuel
//! ethanol percentage, fixed at 0 on this hardware; all keep their
//! positions for the host tool.

use crate::status::EngineSnapshot;

pub const LIVE_DATA_LEN: usize = 126;

/// Fill `out` with the current live-data record.
pub fn build(snap: &EngineSnapshot, out: &mut [u8; LIVE_DATA_LEN]) {
    out.fill(0);

    out[0] = (snap.secl & 0xFF) as u8;
    out[1] = if snap.rpm > 0 { 0x01 } else { 0x00 };
    out[2] = snap.engine;
    // Bit 0: sync loss. Bits 1-2: the protection latches.
    let sync_loss: u8 = if snap.has_sync { 0 } else { 1 };
    out[3] = sync_loss | (snap.protection << 1);

    let map10 = snap.map_kpa as u16 * 10;
    out[4..6].copy_from_slice(&map10.to_le_bytes());

    out[6] = (snap.iat_c as i16 + 40) as u8;
    out[7] = (snap.coolant_c as i16 + 40) as u8;
    out[8] = snap.bat_pct;
    out[9] = snap.battery_dv;
    out[10] = snap.o2;
    out[11] = snap.ego_pct;
    out[12] = 100; // IAT density correction, not modelled
    out[13] = snap.wue_pct;
    out[14..16].copy_from_slice(&snap.rpm.to_le_bytes());

    out[24] = (snap.advance as i16 + 40) as u8;
    out[25] = snap.tps;
    out[26..28].copy_from_slice(&snap.loops_per_sec.to_le_bytes());
    out[28..30].copy_from_slice(&snap.free_ram.to_le_bytes());

    out[32] = if snap.has_sync { 0x01 } else { 0x00 };
    out[35] = 0;
    out[41] = 100; // barometric pressure, fixed atmospheric

    out[76..78].copy_from_slice(&snap.pw1.to_le_bytes());
    out[78..80].copy_from_slice(&snap.pw2.to_le_bytes());
    out[80..82].copy_from_slice(&snap.pw3.to_le_bytes());
    // 82..84 would be a fourth channel; always zero.

    out[102] = snap.ve;
    // 104..106: vehicle speed, unsupported.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::engine;

    fn sample_snapshot() -> EngineSnapshot {
        let mut s = EngineSnapshot::new();
        s.secl = 0x1_0000 + 77;
        s.rpm = 3_456;
        s.has_sync = true;
        s.engine = engine::RUN | engine::WARMUP;
        s.map_kpa = 65;
        s.iat_c = 35;
        s.coolant_c = -10;
        s.battery_dv = 142;
        s.bat_pct = 100;
        s.o2 = 112;
        s.ego_pct = 97;
        s.wue_pct = 115;
        s.advance = -3;
        s.tps = 42;
        s.loops_per_sec = 2_345;
        s.free_ram = 1_024;
        s.pw1 = 4_168;
        s.pw2 = 4_168;
        s.pw3 = 0;
        s.ve = 67;
        s
    }

    #[test]
    fn fixed_offsets_are_bit_exact() {
        let snap = sample_snapshot();
        let mut buf = [0u8; LIVE_DATA_LEN];
        build(&snap, &mut buf);

        assert_eq!(buf[0], 77); // seconds, low byte only
        assert_eq!(buf[1], 0x01);
        assert_eq!(buf[2], engine::RUN | engine::WARMUP);
        assert_eq!(buf[3], 0); // sync good
        assert_eq!(u16::from_le_bytes([buf[4], buf[5]]), 650);
        assert_eq!(buf[6], 75); // IAT + 40
        assert_eq!(buf[7], 30); // coolant + 40
        assert_eq!(buf[9], 142);
        assert_eq!(buf[10], 112);
        assert_eq!(buf[11], 97);
        assert_eq!(buf[13], 115);
        assert_eq!(u16::from_le_bytes([buf[14], buf[15]]), 3_456);
        assert_eq!(buf[24], 37); // advance -3 + 40
        assert_eq!(buf[25], 42);
        assert_eq!(u16::from_le_bytes([buf[26], buf[27]]), 2_345);
        assert_eq!(u16::from_le_bytes([buf[28], buf[29]]), 1_024);
        assert_eq!(buf[32], 0x01);
        assert_eq!(buf[35], 0);
        assert_eq!(buf[41], 100);
        assert_eq!(u16::from_le_bytes([buf[76], buf[77]]), 4_168);
        assert_eq!(u16::from_le_bytes([buf[78], buf[79]]), 4_168);
        assert_eq!(u16::from_le_bytes([buf[80], buf[81]]), 0);
        assert_eq!(u16::from_le_bytes([buf[82], buf[83]]), 0);
        assert_eq!(buf[102], 67);
        assert_eq!(u16::from_le_bytes([buf[104], buf[105]]), 0);
    }

    #[test]
    fn protection_latches_ride_in_byte_3() {
        use crate::types::protect;
        let mut snap = sample_snapshot();
        snap.protection = protect::OVERREV;
        let mut buf = [0u8; LIVE_DATA_LEN];
        build(&snap, &mut buf);
        assert_eq!(buf[3], 0b010); // sync good, over-rev latched

        snap.protection = protect::OVERREV | protect::OILLOW;
        snap.has_sync = false;
        build(&snap, &mut buf);
        assert_eq!(buf[3], 0b111);
    }

    #[test]
    fn sync_loss_is_flagged() {
        let mut snap = sample_snapshot();
        snap.has_sync = false;
        snap.rpm = 0;
        let mut buf = [0u8; LIVE_DATA_LEN];
        build(&snap, &mut buf);
        assert_eq!(buf[1], 0x00);
        assert_eq!(buf[3], 1);
        assert_eq!(buf[32], 0x00);
    }

    #[test]
    fn unlisted_bytes_stay_zero() {
        let snap = sample_snapshot();
        let mut buf = [0xFFu8; LIVE_DATA_LEN];
        build(&snap, &mut buf);
        for &i in &[16usize, 23, 30, 31, 33, 34, 40, 42, 75, 84, 101, 103, 125] {
            assert_eq!(buf[i], 0, "offset {i} must be zero");
        }
    }
}
