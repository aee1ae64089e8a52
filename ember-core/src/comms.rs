//! Serial tuner protocol.
//!
//! Two framings share the link and the first received byte picks one:
//! printable ASCII starts a legacy single-byte command with an immediate
//! raw response, anything else starts a framed message of
//! `[len u16 BE] [payload] [crc32 BE]` with the CRC over the payload only.
//! Runs entirely in the main loop.

use crate::calibration::{page_size, Calibration};
use crate::crc::{crc32, Crc32};
use crate::hal::{Eeprom, TunerLink};
use crate::livedata::{self, LIVE_DATA_LEN};
use crate::status::EngineSnapshot;
use crate::storage;

pub const SERIAL_BUFFER_SIZE: usize = 64;
/// Length header + CRC overhead bound the payload a frame may carry.
pub const MAX_PAYLOAD: u16 = (SERIAL_BUFFER_SIZE - 6) as u16;

pub const RC_OK: u8 = 0x00;
pub const RC_BURN_OK: u8 = 0x04;
pub const RC_RANGE_ERR: u8 = 0x80;
pub const RC_CRC_ERR: u8 = 0x82;
pub const RC_UNKNOWN_ERR: u8 = 0x83;

const BLOCKING_FACTOR: u16 = 121;
const TABLE_BLOCKING_FACTOR: u16 = 64;

// Identity strings the host tool matches on.
const INTERFACE_ID: &[u8] = b"speeduino 202402";
const FIRMWARE_ID: &[u8] = b"speeduino 202207";
const PRODUCT_ID: &[u8] = b"Speeduino 2024.02.4";
const PROTOCOL_VERSION: &[u8] = b"002";

/// Receiver state machine and command dispatcher.
pub struct TunerPort {
    buf: [u8; SERIAL_BUFFER_SIZE],
    received: usize,
    modern: bool,
    expected: u16,
}

impl TunerPort {
    pub const fn new() -> Self {
        Self {
            buf: [0; SERIAL_BUFFER_SIZE],
            received: 0,
            modern: false,
            expected: 0,
        }
    }

    fn reset(&mut self) {
        self.received = 0;
        self.modern = false;
        self.expected = 0;
    }

    /// Drain the link and execute any complete command.
    pub fn service<L: TunerLink, E: Eeprom>(
        &mut self,
        link: &mut L,
        cal: &mut Calibration,
        snap: &EngineSnapshot,
        eeprom: &mut E,
    ) {
        while let Some(byte) = link.read() {
            if self.received == 0 {
                if (b'A'..=b'z').contains(&byte) {
                    self.handle_legacy(byte, link, cal, snap, eeprom);
                    continue;
                }
                self.buf[0] = byte;
                self.received = 1;
                self.modern = true;
                self.expected = 0;
                continue;
            }

            if self.received < SERIAL_BUFFER_SIZE {
                self.buf[self.received] = byte;
                self.received += 1;
            }

            if self.received == 2 {
                self.expected = u16::from_be_bytes([self.buf[0], self.buf[1]]);
                if self.expected == 0 || self.expected > MAX_PAYLOAD {
                    // Unframeable length: drop the receiver state, no reply.
                    self.reset();
                    continue;
                }
            }

            if self.modern && self.expected > 0 && self.received >= 2 + self.expected as usize + 4 {
                self.handle_modern(link, cal, snap, eeprom);
                self.reset();
            }
        }
    }

    fn handle_modern<L: TunerLink, E: Eeprom>(
        &mut self,
        link: &mut L,
        cal: &mut Calibration,
        snap: &EngineSnapshot,
        eeprom: &mut E,
    ) {
        let len = self.expected as usize;
        let payload = &self.buf[2..2 + len];
        let crc_bytes = &self.buf[2 + len..2 + len + 4];
        let received_crc = u32::from_be_bytes([
            crc_bytes[0],
            crc_bytes[1],
            crc_bytes[2],
            crc_bytes[3],
        ]);

        if received_crc != crc32(payload) {
            send_status(link, RC_CRC_ERR);
            return;
        }

        match payload[0] {
            b'A' => {
                let mut resp = [0u8; 2 + LIVE_DATA_LEN];
                resp[0] = RC_OK;
                resp[1] = 0x00;
                let mut live = [0u8; LIVE_DATA_LEN];
                livedata::build(snap, &mut live);
                resp[2..].copy_from_slice(&live);
                send_framed(link, &resp);
            }
            b'C' => send_framed(link, &[RC_OK, 0xFF]),
            b'f' => {
                let bf = BLOCKING_FACTOR.to_be_bytes();
                let tbf = TABLE_BLOCKING_FACTOR.to_be_bytes();
                send_framed(link, &[RC_OK, 2, bf[0], bf[1], tbf[0], tbf[1]]);
            }
            b'I' => send_ok_text(link, INTERFACE_ID),
            b'Q' => send_ok_text(link, FIRMWARE_ID),
            b'S' => send_ok_text(link, PRODUCT_ID),
            b'F' => send_ok_text(link, PROTOCOL_VERSION),
            b'p' => {
                if len < 7 {
                    send_status(link, RC_UNKNOWN_ERR);
                    return;
                }
                let page = payload[2];
                let offset = u16::from_le_bytes([payload[3], payload[4]]);
                let length = u16::from_le_bytes([payload[5], payload[6]]);
                stream_page_read(link, cal, page, offset, length);
            }
            b'M' => {
                if len < 7 {
                    send_status(link, RC_UNKNOWN_ERR);
                    return;
                }
                let page = payload[2];
                let offset = u16::from_le_bytes([payload[3], payload[4]]);
                let length = u16::from_le_bytes([payload[5], payload[6]]) as usize;
                if 7 + length > len {
                    send_status(link, RC_RANGE_ERR);
                    return;
                }
                let data = &payload[7..7 + length];
                match cal.write_page(page, offset, data) {
                    Ok(()) => send_status(link, RC_OK),
                    Err(_) => send_status(link, RC_RANGE_ERR),
                }
            }
            b'd' => {
                if len < 3 {
                    send_status(link, RC_UNKNOWN_ERR);
                    return;
                }
                match cal.page_crc(payload[2]) {
                    Some(crc) => {
                        // The host expects the four CRC bytes reversed.
                        let wire = crc.swap_bytes().to_le_bytes();
                        send_framed(link, &[RC_OK, wire[0], wire[1], wire[2], wire[3]]);
                    }
                    None => send_status(link, RC_RANGE_ERR),
                }
            }
            b'r' => {
                if len < 7 {
                    send_status(link, RC_UNKNOWN_ERR);
                    return;
                }
                if payload[2] != 0x30 {
                    send_status(link, RC_UNKNOWN_ERR);
                    return;
                }
                let offset = u16::from_le_bytes([payload[3], payload[4]]) as usize;
                let length = u16::from_le_bytes([payload[5], payload[6]]) as usize;
                stream_live_window(link, snap, offset, length);
            }
            b'B' | b'b' => {
                storage::save_all(eeprom, cal);
                crate::info!("calibration burned to store");
                send_framed(link, &[RC_BURN_OK]);
            }
            _ => send_status(link, RC_UNKNOWN_ERR),
        }
    }

    fn handle_legacy<L: TunerLink, E: Eeprom>(
        &mut self,
        command: u8,
        link: &mut L,
        cal: &mut Calibration,
        snap: &EngineSnapshot,
        eeprom: &mut E,
    ) {
        match command {
            b'A' => {
                let mut resp = [0u8; 1 + LIVE_DATA_LEN];
                let mut live = [0u8; LIVE_DATA_LEN];
                livedata::build(snap, &mut live);
                resp[1..].copy_from_slice(&live);
                link.write(&resp);
            }
            b'I' => link.write(INTERFACE_ID),
            b'Q' => link.write(FIRMWARE_ID),
            b'S' => link.write(PRODUCT_ID),
            b'F' => link.write(PROTOCOL_VERSION),
            b'C' => link.write(&[0x00, 0xFF]),
            b'B' | b'b' => storage::save_all(eeprom, cal),
            b'c' => link.write(&snap.loops_per_sec.to_le_bytes()),
            b'm' => link.write(&snap.free_ram.to_le_bytes()),
            b'N' => link.write(b"\r\n"),
            _ => {}
        }
    }
}

impl Default for TunerPort {
    fn default() -> Self {
        Self::new()
    }
}

/// Frame a complete payload: length, bytes, CRC.
fn send_framed(link: &mut impl TunerLink, payload: &[u8]) {
    link.write(&(payload.len() as u16).to_be_bytes());
    link.write(payload);
    link.write(&crc32(payload).to_be_bytes());
}

fn send_status(link: &mut impl TunerLink, code: u8) {
    send_framed(link, &[code]);
}

fn send_ok_text(link: &mut impl TunerLink, text: &[u8]) {
    let mut resp: heapless::Vec<u8, 32> = heapless::Vec::new();
    let _ = resp.push(RC_OK);
    let _ = resp.extend_from_slice(&text[..text.len().min(31)]);
    send_framed(link, &resp);
}

/// Page read with the length clamped to what the page still has past the
/// offset; only an unknown page is an error. Streams in small blocks with
/// a running CRC so no page-sized buffer is needed.
fn stream_page_read(
    link: &mut impl TunerLink,
    cal: &Calibration,
    page: u8,
    offset: u16,
    length: u16,
) {
    let size = page_size(page);
    if size == 0 {
        send_status(link, RC_RANGE_ERR);
        return;
    }
    let available = size.saturating_sub(offset.min(size));
    let actual = length.min(available);

    link.write(&(1 + actual).to_be_bytes());
    let mut crc = Crc32::new();
    link.write(&[RC_OK]);
    crc.update(RC_OK);

    let mut block = [0u8; 32];
    let mut pos = 0u16;
    while pos < actual {
        let n = (actual - pos).min(block.len() as u16) as usize;
        for (i, slot) in block[..n].iter_mut().enumerate() {
            *slot = cal
                .read_page_byte(page, offset + pos + i as u16)
                .unwrap_or(0);
        }
        link.write(&block[..n]);
        crc.update_slice(&block[..n]);
        pos += n as u16;
    }
    link.write(&crc.finish().to_be_bytes());
}

/// Windowed live-data read: one offset byte then the 126-byte record.
fn stream_live_window(
    link: &mut impl TunerLink,
    snap: &EngineSnapshot,
    offset: usize,
    length: usize,
) {
    let mut full = [0u8; 1 + LIVE_DATA_LEN];
    full[0] = 0x00;
    let mut live = [0u8; LIVE_DATA_LEN];
    livedata::build(snap, &mut live);
    full[1..].copy_from_slice(&live);

    let offset = offset.min(full.len());
    let length = length.min(full.len() - offset);

    link.write(&(1 + length as u16).to_be_bytes());
    let mut crc = Crc32::new();
    link.write(&[RC_OK]);
    crc.update(RC_OK);
    link.write(&full[offset..offset + length]);
    crc.update_slice(&full[offset..offset + length]);
    link.write(&crc.finish().to_be_bytes());
}
