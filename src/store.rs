//! Persistent device configuration.
//!
//! One fixed-size record in nonvolatile storage plus a single-byte
//! validity flag in a second slot. At boot the flag decides whether the
//! record is trustworthy: anything other than the sentinel means the
//! storage is factory-fresh or corrupted, so the defaults are written
//! back before anything reads the record slot.
//!
//! Every setter updates three things in order: the in-memory record,
//! the cached advertising buffers pushed to the GAP layer, and the
//! stored record. A storage failure is surfaced to the caller, but only
//! after the live state is updated - the device keeps running on the
//! new values and falls back to whatever storage holds on next boot.

use crate::adv::{adv_interval_ms_to_ticks, AdvPayload, ScanResponse};
use crate::config::{
    BEACON_UUID_LEN, CONFIG_FLAG_SENTINEL, CONFIG_FLAG_SLOT, CONFIG_RECORD_SLOT,
    DEFAULT_ADV_INTERVAL_MS, DEFAULT_BEACON_UUID, DEFAULT_DEVICE_NAME, DEFAULT_MAJOR,
    DEFAULT_MINOR, DEFAULT_TX_POWER, DEVICE_NAME_LEN,
};
use crate::error::Error;
use crate::gap::GapRole;

/// Serialized size of a `DeviceConfig` record.
pub const CONFIG_RECORD_LEN: usize = DEVICE_NAME_LEN + BEACON_UUID_LEN + 2 + 2 + 2 + 1 + 1;

/// External nonvolatile storage boundary, addressed by slot id.
/// Reads of a never-written slot fail rather than returning garbage.
pub trait NvStorage {
    fn read(&mut self, slot: u8, buf: &mut [u8]) -> Result<(), Error>;
    fn write(&mut self, slot: u8, bytes: &[u8]) -> Result<(), Error>;
}

/// The persisted device parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceConfig {
    /// Advertised name, space-padded to the fixed field width.
    pub name: [u8; DEVICE_NAME_LEN],
    /// iBeacon proximity UUID, as transmitted.
    pub beacon_uuid: [u8; BEACON_UUID_LEN],
    /// Major/minor as raw air-order bytes.
    pub major: [u8; 2],
    pub minor: [u8; 2],
    /// Advertising interval in milliseconds.
    pub adv_interval_ms: u16,
    /// Calibrated TX power at 1 m, two's complement dBm.
    pub tx_power: i8,
    /// Reserved; carried through the record unchanged.
    pub valid: u8,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_DEVICE_NAME,
            beacon_uuid: DEFAULT_BEACON_UUID,
            major: DEFAULT_MAJOR,
            minor: DEFAULT_MINOR,
            adv_interval_ms: DEFAULT_ADV_INTERVAL_MS,
            tx_power: DEFAULT_TX_POWER,
            valid: 0xff,
        }
    }
}

impl DeviceConfig {
    /// Serialize to the fixed record layout (interval little-endian).
    pub fn encode(&self) -> [u8; CONFIG_RECORD_LEN] {
        let mut buf = [0u8; CONFIG_RECORD_LEN];
        buf[..DEVICE_NAME_LEN].copy_from_slice(&self.name);
        let mut at = DEVICE_NAME_LEN;
        buf[at..at + BEACON_UUID_LEN].copy_from_slice(&self.beacon_uuid);
        at += BEACON_UUID_LEN;
        buf[at..at + 2].copy_from_slice(&self.major);
        at += 2;
        buf[at..at + 2].copy_from_slice(&self.minor);
        at += 2;
        buf[at..at + 2].copy_from_slice(&self.adv_interval_ms.to_le_bytes());
        at += 2;
        buf[at] = self.tx_power as u8;
        buf[at + 1] = self.valid;
        buf
    }

    pub fn decode(buf: &[u8; CONFIG_RECORD_LEN]) -> Self {
        let mut name = [0u8; DEVICE_NAME_LEN];
        name.copy_from_slice(&buf[..DEVICE_NAME_LEN]);
        let mut at = DEVICE_NAME_LEN;
        let mut beacon_uuid = [0u8; BEACON_UUID_LEN];
        beacon_uuid.copy_from_slice(&buf[at..at + BEACON_UUID_LEN]);
        at += BEACON_UUID_LEN;
        let major = [buf[at], buf[at + 1]];
        at += 2;
        let minor = [buf[at], buf[at + 1]];
        at += 2;
        let adv_interval_ms = u16::from_le_bytes([buf[at], buf[at + 1]]);
        at += 2;
        Self {
            name,
            beacon_uuid,
            major,
            minor,
            adv_interval_ms,
            tx_power: buf[at] as i8,
            valid: buf[at + 1],
        }
    }
}

/// Configuration owner: the persisted record plus the advertising
/// buffers derived from it.
pub struct ConfigStore<S: NvStorage> {
    nv: S,
    config: DeviceConfig,
    adv: AdvPayload,
    scan_rsp: ScanResponse,
}

impl<S: NvStorage> ConfigStore<S> {
    pub fn new(nv: S) -> Self {
        let config = DeviceConfig::default();
        Self {
            adv: AdvPayload::ibeacon(&config.beacon_uuid, config.major, config.minor, config.tx_power),
            scan_rsp: ScanResponse::with_name(&config.name),
            nv,
            config,
        }
    }

    /// Boot-time load. Recovers to factory defaults when the validity
    /// flag is missing or wrong, then pushes name, advertising payload,
    /// scan response, and interval to the GAP layer.
    pub fn init<G: GapRole>(&mut self, gap: &mut G) -> Result<(), Error> {
        let mut flag = [0u8; 1];
        let valid = self
            .nv
            .read(CONFIG_FLAG_SLOT, &mut flag)
            .map(|_| flag[0] == CONFIG_FLAG_SENTINEL)
            .unwrap_or(false);

        if valid {
            let mut record = [0u8; CONFIG_RECORD_LEN];
            self.nv
                .read(CONFIG_RECORD_SLOT, &mut record)
                .map_err(|_| Error::Storage)?;
            self.config = DeviceConfig::decode(&record);
            debug!("config record loaded");
        } else {
            info!("config storage invalid, writing factory defaults");
            self.config = DeviceConfig::default();
            self.nv
                .write(CONFIG_RECORD_SLOT, &self.config.encode())
                .map_err(|_| Error::Storage)?;
            self.nv
                .write(CONFIG_FLAG_SLOT, &[CONFIG_FLAG_SENTINEL])
                .map_err(|_| Error::Storage)?;
        }

        self.rebuild_buffers();
        gap.set_device_name(&self.config.name);
        gap.set_scan_rsp_data(self.scan_rsp.as_bytes());
        gap.set_adv_data(self.adv.as_bytes());
        gap.set_adv_interval(adv_interval_ms_to_ticks(self.config.adv_interval_ms));
        Ok(())
    }

    fn rebuild_buffers(&mut self) {
        self.adv = AdvPayload::ibeacon(
            &self.config.beacon_uuid,
            self.config.major,
            self.config.minor,
            self.config.tx_power,
        );
        self.scan_rsp = ScanResponse::with_name(&self.config.name);
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn adv_payload(&self) -> &AdvPayload {
        &self.adv
    }

    pub fn scan_response(&self) -> &ScanResponse {
        &self.scan_rsp
    }

    /// Rename the device. Input longer than the field truncates; shorter
    /// input is zero-padded. Takes effect on the air immediately.
    pub fn set_name<G: GapRole>(&mut self, name: &[u8], gap: &mut G) -> Result<(), Error> {
        let mut field = [0u8; DEVICE_NAME_LEN];
        let n = name.len().min(DEVICE_NAME_LEN);
        field[..n].copy_from_slice(&name[..n]);
        self.config.name = field;
        self.scan_rsp.set_name(&field);
        gap.set_device_name(&field);
        gap.set_scan_rsp_data(self.scan_rsp.as_bytes());
        self.persist()
    }

    pub fn set_beacon_uuid<G: GapRole>(&mut self, uuid: &[u8], gap: &mut G) -> Result<(), Error> {
        if uuid.len() != BEACON_UUID_LEN {
            return Err(Error::InvalidParameter);
        }
        self.config.beacon_uuid.copy_from_slice(uuid);
        self.adv.set_beacon_uuid(&self.config.beacon_uuid);
        gap.set_adv_data(self.adv.as_bytes());
        self.persist()
    }

    pub fn set_major<G: GapRole>(&mut self, major: &[u8], gap: &mut G) -> Result<(), Error> {
        if major.len() != 2 {
            return Err(Error::InvalidParameter);
        }
        self.config.major = [major[0], major[1]];
        self.adv.set_major(self.config.major);
        gap.set_adv_data(self.adv.as_bytes());
        self.persist()
    }

    pub fn set_minor<G: GapRole>(&mut self, minor: &[u8], gap: &mut G) -> Result<(), Error> {
        if minor.len() != 2 {
            return Err(Error::InvalidParameter);
        }
        self.config.minor = [minor[0], minor[1]];
        self.adv.set_minor(self.config.minor);
        gap.set_adv_data(self.adv.as_bytes());
        self.persist()
    }

    pub fn set_tx_power<G: GapRole>(&mut self, tx_power: i8, gap: &mut G) -> Result<(), Error> {
        self.config.tx_power = tx_power;
        self.adv.set_tx_power(tx_power);
        gap.set_adv_data(self.adv.as_bytes());
        self.persist()
    }

    pub fn set_adv_interval<G: GapRole>(&mut self, ms: u16, gap: &mut G) -> Result<(), Error> {
        self.config.adv_interval_ms = ms;
        gap.set_adv_interval(adv_interval_ms_to_ticks(ms));
        self.persist()
    }

    fn persist(&mut self) -> Result<(), Error> {
        self.nv
            .write(CONFIG_RECORD_SLOT, &self.config.encode())
            .map_err(|_| {
                warn!("config record write failed, running on volatile state");
                Error::Storage
            })
    }
}
