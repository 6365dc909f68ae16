//! Application-wide constants and compile-time configuration.
//!
//! All protocol constants, storage identifiers, and default device
//! parameters live here so they can be tuned in one place.

// Device identity

/// Fixed length of the device name field (persisted and advertised).
pub const DEVICE_NAME_LEN: usize = 8;

/// Factory device name, space-padded to `DEVICE_NAME_LEN`.
pub const DEFAULT_DEVICE_NAME: [u8; DEVICE_NAME_LEN] = *b"DISPEN  ";

/// iBeacon proximity UUID length.
pub const BEACON_UUID_LEN: usize = 16;

/// Factory iBeacon proximity UUID.
pub const DEFAULT_BEACON_UUID: [u8; BEACON_UUID_LEN] = [
    0x7d, 0xb8, 0x60, 0xed, 0xb6, 0x4d, 0x4b, 0xb1, //
    0x98, 0x75, 0x8f, 0x16, 0x35, 0x5a, 0x97, 0xd2,
];

/// Factory major/minor (big-endian on the air, stored as raw bytes).
pub const DEFAULT_MAJOR: [u8; 2] = [0x00, 0x07];
pub const DEFAULT_MINOR: [u8; 2] = [0x02, 0x55];

/// Calibrated TX power at 1 m, two's complement (0xC5 = -59 dBm).
pub const DEFAULT_TX_POWER: i8 = -59;

/// Factory advertising interval (milliseconds).
pub const DEFAULT_ADV_INTERVAL_MS: u16 = 500;

// Nonvolatile storage

/// Storage slot holding the `DeviceConfig` record.
pub const CONFIG_RECORD_SLOT: u8 = 0x88;

/// Storage slot holding the single-byte validity flag.
pub const CONFIG_FLAG_SLOT: u8 = 0x89;

/// Flag value meaning "record was written by this firmware".
pub const CONFIG_FLAG_SENTINEL: u8 = 0x66;

// Advertising payload (see `adv` for the serialization contract)

/// Maximum advertising / scan-response payload size.
pub const ADV_PAYLOAD_CAPACITY: usize = 31;

/// Fixed byte offsets into the advertising buffer. Index starts from 0.
pub const ADV_UUID_INDEX: usize = 9;
pub const ADV_MAJOR_INDEX: usize = 25;
pub const ADV_MINOR_INDEX: usize = 27;
pub const ADV_TX_POWER_INDEX: usize = 29;

/// The external GAP layer consumes advertising intervals in 625 us ticks.
pub const ADV_TICK_US: u32 = 625;

// Connection parameters (units of 1.25 ms / 10 ms per BLE spec)

/// Minimum connection interval (20 = 25 ms).
pub const CONN_INTERVAL_MIN: u16 = 20;

/// Maximum connection interval (30 = 37.5 ms).
pub const CONN_INTERVAL_MAX: u16 = 30;

/// Number of connection events the peripheral can skip.
pub const CONN_SLAVE_LATENCY: u16 = 0;

/// Supervision timeout (units of 10 ms, 1000 = 10 s).
pub const CONN_SUPERVISION_TIMEOUT: u16 = 1000;

// GATT services

/// 128-bit UUID base; the 16-bit suffix is placed at bytes 12..14.
pub const UUID_BASE: [u8; 12] = [
    0x41, 0xee, 0x68, 0x3a, 0x99, 0x0f, //
    0x0e, 0x72, 0x85, 0x49, 0x8d, 0xb3,
];

/// Miscellaneous service and its characteristics (16-bit custom range).
pub const MISC_SERVICE_UUID: u16 = 0xFFF0;
pub const MISC_CHAR_IDENTIFICATION_UUID: u16 = 0xFFF1;
pub const MISC_CHAR_MODE_SELECTION_UUID: u16 = 0xFFF2;
pub const MISC_CHAR_CLICK_AVAILABLE_UUID: u16 = 0xFFF3;
pub const MISC_CHAR_BOTTLE_REPLACEMENT_UUID: u16 = 0xFFF4;

/// Humidity service (128-bit, built from `UUID_BASE`).
pub const HUMIDITY_SERVICE_UUID: u16 = 0x1234;
pub const HUMIDITY_CHAR_UUID: u16 = 0x1235;

// Attribute registry sizing

/// Maximum number of registered services.
pub const MAX_SERVICES: usize = 4;

/// Maximum characteristics per service.
pub const MAX_CHARACTERISTICS: usize = 8;

/// Maximum characteristic value length (default ATT payload).
pub const MAX_CHAR_VALUE_LEN: usize = 20;

// Scheduler

/// Reload period of the periodic timer (milliseconds).
pub const PERIODIC_TIMER_MS: u32 = 1000;

/// Capacity of the queued system-message buffer.
pub const MAX_SYSTEM_MESSAGES: usize = 4;

// Flash layout (embedded build; 4 KB pages on nRF52840)

/// Flash page index where config storage starts.
pub const STORAGE_FLASH_PAGE_START: u32 = 240;

/// Number of flash pages reserved for config storage.
pub const STORAGE_FLASH_PAGE_COUNT: u32 = 4;
