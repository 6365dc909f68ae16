//! Advertising and scan-response payload serialization.
//!
//! The iBeacon advertising payload is a fixed-offset byte array:
//!
//! ```text
//! 0  02           flags AD length
//! 1  01           flags AD type
//! 2  06           LE general discoverable | BR/EDR not supported
//! 3  1A           manufacturer AD length (includes the type byte)
//! 4  FF           manufacturer-specific AD type
//! 5  4C 00        company identifier (fixed)
//! 7  02           beacon data type (fixed)
//! 8  15           beacon data length (fixed)
//! 9  ..24         16-byte proximity UUID
//! 25 ..26         major
//! 27 ..28         minor
//! 29              calibrated TX power, two's complement
//! ```
//!
//! Every setter overwrites exactly its byte range and leaves the rest of
//! the buffer untouched.

use crate::config::{
    ADV_MAJOR_INDEX, ADV_MINOR_INDEX, ADV_PAYLOAD_CAPACITY, ADV_TICK_US, ADV_TX_POWER_INDEX,
    ADV_UUID_INDEX, BEACON_UUID_LEN, DEVICE_NAME_LEN,
};

/// Bytes actually used by the iBeacon advertising payload.
pub const ADV_PAYLOAD_LEN: usize = 30;

/// Scan-response length: AD header plus the fixed-size name field.
pub const SCAN_RSP_LEN: usize = 2 + DEVICE_NAME_LEN;

/// Convert a milliseconds interval to the external GAP layer's 0.625 ms
/// ticks. Integer truncation; callers must use this exact conversion.
pub const fn adv_interval_ms_to_ticks(ms: u16) -> u16 {
    (ms as u32 * 1000 / ADV_TICK_US) as u16
}

/// Cached iBeacon advertising payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvPayload {
    buf: [u8; ADV_PAYLOAD_CAPACITY],
}

impl AdvPayload {
    pub fn ibeacon(uuid: &[u8; BEACON_UUID_LEN], major: [u8; 2], minor: [u8; 2], tx_power: i8) -> Self {
        let mut buf = [0u8; ADV_PAYLOAD_CAPACITY];
        buf[0] = 0x02; // flags AD length
        buf[1] = 0x01; // flags AD type
        buf[2] = 0x06; // general discoverable, BR/EDR not supported
        buf[3] = 0x1A; // manufacturer AD length including the type byte
        buf[4] = 0xFF; // manufacturer-specific AD type
        buf[5] = 0x4C; // company ID
        buf[6] = 0x00;
        buf[7] = 0x02; // beacon data type
        buf[8] = 0x15; // beacon data length
        let mut payload = Self { buf };
        payload.set_beacon_uuid(uuid);
        payload.set_major(major);
        payload.set_minor(minor);
        payload.set_tx_power(tx_power);
        payload
    }

    pub fn set_beacon_uuid(&mut self, uuid: &[u8; BEACON_UUID_LEN]) {
        self.buf[ADV_UUID_INDEX..ADV_UUID_INDEX + BEACON_UUID_LEN].copy_from_slice(uuid);
    }

    pub fn set_major(&mut self, major: [u8; 2]) {
        self.buf[ADV_MAJOR_INDEX..ADV_MAJOR_INDEX + 2].copy_from_slice(&major);
    }

    pub fn set_minor(&mut self, minor: [u8; 2]) {
        self.buf[ADV_MINOR_INDEX..ADV_MINOR_INDEX + 2].copy_from_slice(&minor);
    }

    pub fn set_tx_power(&mut self, tx_power: i8) {
        self.buf[ADV_TX_POWER_INDEX] = tx_power as u8;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..ADV_PAYLOAD_LEN]
    }
}

/// Cached scan-response payload carrying the complete local name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResponse {
    buf: [u8; SCAN_RSP_LEN],
}

impl ScanResponse {
    pub fn with_name(name: &[u8]) -> Self {
        let mut rsp = Self {
            buf: [0u8; SCAN_RSP_LEN],
        };
        rsp.buf[0] = (1 + DEVICE_NAME_LEN) as u8; // length of this data
        rsp.buf[1] = 0x09; // complete local name AD type
        rsp.set_name(name);
        rsp
    }

    /// Names longer than the field truncate to `DEVICE_NAME_LEN`;
    /// shorter ones are zero-padded.
    pub fn set_name(&mut self, name: &[u8]) {
        let field = &mut self.buf[2..];
        field.fill(0);
        let n = name.len().min(DEVICE_NAME_LEN);
        field[..n].copy_from_slice(&name[..n]);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}
