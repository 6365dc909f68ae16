//! Embedded entry point for the dispenser peripheral (nRF52840 + S140).
//!
//! Implements the core's external boundaries over the Nordic SoftDevice:
//! GAP/GATT through the raw SoftDevice API, notifications through
//! `sd_ble_gatts_hvx`, and nonvolatile config slots through
//! `sequential-storage` on the SoftDevice flash driver. Peer writes are
//! forwarded from the connection task into the core so the registry
//! stays the owner of every characteristic value. The pure logic all
//! lives in the library; this file is only glue and tasks.

#![no_std]
#![no_main]

use core::cell::RefCell;

use defmt::{info, unwrap};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_futures::block_on;
use embassy_futures::select::{select3, Either3};
use embassy_nrf::interrupt;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Ticker};
use nrf_softdevice::ble::gatt_server::{self, WriteOp};
use nrf_softdevice::ble::{peripheral, Connection};
use nrf_softdevice::{raw, Flash, RawError, Softdevice};
use panic_probe as _;
use static_cell::StaticCell;

use dispenser_ble::config::{
    ADV_PAYLOAD_CAPACITY, DEVICE_NAME_LEN, MAX_CHAR_VALUE_LEN, PERIODIC_TIMER_MS,
    STORAGE_FLASH_PAGE_COUNT, STORAGE_FLASH_PAGE_START,
};
use dispenser_ble::dispenser::Dispenser;
use dispenser_ble::error::{Error, RegistrationError};
use dispenser_ble::gap::{ConnParams, GapRole, RoleEvent};
use dispenser_ble::gatt::{props, GattServer, NotificationSink, Service, ServiceHandles, Uuid};
use dispenser_ble::store::NvStorage;

const FLASH_PAGE_SIZE: u32 = 4096;

/// Advertising state shared between the core's `GapRole` port and the
/// advertising task.
#[derive(Clone, Copy)]
struct AdvState {
    adv_data: [u8; ADV_PAYLOAD_CAPACITY],
    adv_len: usize,
    scan_rsp: [u8; ADV_PAYLOAD_CAPACITY],
    scan_rsp_len: usize,
    interval_ticks: u16,
    enabled: bool,
    started: bool,
}

static ADV_STATE: Mutex<CriticalSectionRawMutex, RefCell<AdvState>> =
    Mutex::new(RefCell::new(AdvState {
        adv_data: [0; ADV_PAYLOAD_CAPACITY],
        adv_len: 0,
        scan_rsp: [0; ADV_PAYLOAD_CAPACITY],
        scan_rsp_len: 0,
        interval_ticks: 800,
        enabled: false,
        started: false,
    }));

/// GAP role notifications from the stack tasks to the core.
static ROLE_EVENTS: Channel<CriticalSectionRawMutex, RoleEvent, 4> = Channel::new();

/// Peer writes captured by the connection task, replayed into
/// `Dispenser::on_external_write` on the core's task.
struct PeerWrite {
    conn: u16,
    handle: u16,
    offset: usize,
    data: heapless::Vec<u8, MAX_CHAR_VALUE_LEN>,
}

static PEER_WRITES: Channel<CriticalSectionRawMutex, PeerWrite, 4> = Channel::new();

fn open_sec_mode() -> raw::ble_gap_conn_sec_mode_t {
    raw::ble_gap_conn_sec_mode_t {
        _bitfield_1: raw::ble_gap_conn_sec_mode_t::new_bitfield_1(1, 1),
    }
}

/// GAP/GATT boundary over the raw SoftDevice API.
struct SoftdeviceStack;

impl GapRole for SoftdeviceStack {
    fn start(&mut self) {
        ADV_STATE.lock(|s| s.borrow_mut().started = true);
        let _ = ROLE_EVENTS.try_send(RoleEvent::Started);
    }

    fn set_device_name(&mut self, name: &[u8]) {
        let sec = open_sec_mode();
        let ret = unsafe {
            raw::sd_ble_gap_device_name_set(&sec, name.as_ptr(), name.len() as u16)
        };
        if let Err(e) = RawError::convert(ret) {
            defmt::warn!("device name set failed: {:?}", e);
        }
    }

    fn set_advertising(&mut self, enabled: bool) {
        ADV_STATE.lock(|s| s.borrow_mut().enabled = enabled);
    }

    fn set_adv_data(&mut self, data: &[u8]) {
        ADV_STATE.lock(|s| {
            let mut s = s.borrow_mut();
            s.adv_data[..data.len()].copy_from_slice(data);
            s.adv_len = data.len();
        });
    }

    fn set_scan_rsp_data(&mut self, data: &[u8]) {
        ADV_STATE.lock(|s| {
            let mut s = s.borrow_mut();
            s.scan_rsp[..data.len()].copy_from_slice(data);
            s.scan_rsp_len = data.len();
        });
    }

    fn set_adv_interval(&mut self, ticks: u16) {
        ADV_STATE.lock(|s| s.borrow_mut().interval_ticks = ticks);
    }

    fn set_conn_params(&mut self, params: &ConnParams) {
        let ppcp = raw::ble_gap_conn_params_t {
            min_conn_interval: params.min_interval,
            max_conn_interval: params.max_interval,
            slave_latency: params.slave_latency,
            conn_sup_timeout: params.supervision_timeout,
        };
        let ret = unsafe { raw::sd_ble_gap_ppcp_set(&ppcp) };
        if let Err(e) = RawError::convert(ret) {
            defmt::warn!("ppcp set failed: {:?}", e);
        }
    }
}

fn raw_uuid(uuid: Uuid) -> Result<raw::ble_uuid_t, RegistrationError> {
    match uuid {
        Uuid::Short(value) => Ok(raw::ble_uuid_t {
            uuid: value,
            type_: raw::BLE_UUID_TYPE_BLE as u8,
        }),
        Uuid::Full(bytes) => {
            let base = raw::ble_uuid128_t { uuid128: bytes };
            let mut uuid_type: u8 = raw::BLE_UUID_TYPE_UNKNOWN as u8;
            let ret = unsafe { raw::sd_ble_uuid_vs_add(&base, &mut uuid_type) };
            RawError::convert(ret).map_err(|_| RegistrationError::OutOfResources)?;
            Ok(raw::ble_uuid_t {
                uuid: u16::from_le_bytes([bytes[12], bytes[13]]),
                type_: uuid_type,
            })
        }
    }
}

impl GattServer for SoftdeviceStack {
    fn register_service(
        &mut self,
        service: &Service,
    ) -> Result<ServiceHandles, RegistrationError> {
        let uuid = raw_uuid(service.uuid())?;
        let mut service_handle: u16 = 0;
        let ret = unsafe {
            raw::sd_ble_gatts_service_add(
                raw::BLE_GATTS_SRVC_TYPE_PRIMARY as u8,
                &uuid,
                &mut service_handle,
            )
        };
        RawError::convert(ret).map_err(|_| RegistrationError::OutOfResources)?;

        let mut handles = ServiceHandles {
            base: service_handle,
            values: heapless::Vec::new(),
        };

        for characteristic in service.characteristics() {
            let uuid = raw_uuid(characteristic.uuid())?;
            let notify = characteristic.properties() & props::NOTIFY != 0;

            // Notify needs a client-config descriptor; the SoftDevice
            // rejects the characteristic without its metadata.
            let mut cccd_md: raw::ble_gatts_attr_md_t = unsafe { core::mem::zeroed() };
            cccd_md.read_perm = open_sec_mode();
            cccd_md.write_perm = open_sec_mode();
            cccd_md.set_vloc(raw::BLE_GATTS_VLOC_STACK as u8);

            let mut char_md: raw::ble_gatts_char_md_t = unsafe { core::mem::zeroed() };
            char_md.char_props = raw::ble_gatt_char_props_t {
                _bitfield_1: raw::ble_gatt_char_props_t::new_bitfield_1(
                    0,
                    (characteristic.properties() & props::READ != 0) as u8,
                    0,
                    (characteristic.properties() & props::WRITE != 0) as u8,
                    notify as u8,
                    0,
                    0,
                ),
            };
            char_md.p_cccd_md = if notify { &cccd_md } else { core::ptr::null() };

            let mut attr_md: raw::ble_gatts_attr_md_t = unsafe { core::mem::zeroed() };
            attr_md.read_perm = open_sec_mode();
            attr_md.write_perm = open_sec_mode();
            attr_md.set_vloc(raw::BLE_GATTS_VLOC_STACK as u8);

            let mut attr: raw::ble_gatts_attr_t = unsafe { core::mem::zeroed() };
            attr.p_uuid = &uuid as *const _ as *mut _;
            attr.p_attr_md = &attr_md;
            attr.init_len = 0;
            attr.max_len = characteristic.capacity() as u16;

            let mut char_handles: raw::ble_gatts_char_handles_t = unsafe { core::mem::zeroed() };
            let ret = unsafe {
                raw::sd_ble_gatts_characteristic_add(
                    service_handle,
                    &char_md,
                    &attr,
                    &mut char_handles,
                )
            };
            RawError::convert(ret).map_err(|_| RegistrationError::OutOfResources)?;

            handles
                .values
                .push(char_handles.value_handle)
                .map_err(|_| RegistrationError::OutOfResources)?;
        }

        Ok(handles)
    }
}

/// Notification transport over `sd_ble_gatts_hvx`. Passing the payload
/// also updates the stack-resident attribute value, keeping peer reads
/// consistent with the registry.
struct SoftdeviceSink;

impl NotificationSink for SoftdeviceSink {
    fn send(&mut self, conn_handle: u16, attr_handle: u16, payload: &[u8]) -> Result<(), Error> {
        let mut len = payload.len() as u16;
        let params = raw::ble_gatts_hvx_params_t {
            handle: attr_handle,
            type_: raw::BLE_GATT_HVX_NOTIFICATION as u8,
            offset: 0,
            p_len: &mut len,
            p_data: payload.as_ptr(),
        };
        let ret = unsafe { raw::sd_ble_gatts_hvx(conn_handle, &params) };
        RawError::convert(ret).map_err(|_| Error::NotSent)
    }
}

/// Slot-addressed config storage over `sequential-storage` key/value
/// pairs in the pages behind the application image.
struct FlashNv {
    flash: Flash,
    cache: sequential_storage::cache::NoCache,
}

impl FlashNv {
    fn new(sd: &'static Softdevice) -> Self {
        Self {
            flash: Flash::take(sd),
            cache: sequential_storage::cache::NoCache::new(),
        }
    }

    const fn range() -> core::ops::Range<u32> {
        let start = STORAGE_FLASH_PAGE_START * FLASH_PAGE_SIZE;
        start..start + STORAGE_FLASH_PAGE_COUNT * FLASH_PAGE_SIZE
    }
}

impl NvStorage for FlashNv {
    fn read(&mut self, slot: u8, buf: &mut [u8]) -> Result<(), Error> {
        let mut scratch = [0u8; 64];
        let stored: Option<&[u8]> = block_on(sequential_storage::map::fetch_item(
            &mut self.flash,
            Self::range(),
            &mut self.cache,
            &mut scratch,
            &slot,
        ))
        .map_err(|_| Error::Storage)?;
        let stored = stored.ok_or(Error::Storage)?;
        if stored.len() < buf.len() {
            return Err(Error::Storage);
        }
        buf.copy_from_slice(&stored[..buf.len()]);
        Ok(())
    }

    fn write(&mut self, slot: u8, bytes: &[u8]) -> Result<(), Error> {
        let mut scratch = [0u8; 64];
        block_on(sequential_storage::map::store_item(
            &mut self.flash,
            Self::range(),
            &mut self.cache,
            &mut scratch,
            &slot,
            &bytes,
        ))
        .map_err(|_| Error::Storage)
    }
}

/// GATT event receiver for the raw-registered attribute tables: writes
/// are queued for the core's task instead of being handled here.
struct RegistryServer;

impl gatt_server::Server for RegistryServer {
    type Event = ();

    fn on_write(
        &self,
        conn: &Connection,
        handle: u16,
        _op: WriteOp,
        offset: usize,
        data: &[u8],
    ) -> Option<()> {
        let mut copy = heapless::Vec::new();
        if copy.extend_from_slice(data).is_err() {
            // Larger than any registered value; the core would reject
            // it at the capacity bound anyway.
            return None;
        }
        let write = PeerWrite {
            conn: conn.handle().unwrap_or(0),
            handle,
            offset,
            data: copy,
        };
        if PEER_WRITES.try_send(write).is_err() {
            defmt::warn!("peer write dropped, queue full");
        }
        None
    }
}

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

/// Advertising/connection cycle. Restarts advertising after every
/// disconnect and reports role transitions to the core.
#[embassy_executor::task]
async fn gap_task(sd: &'static Softdevice) {
    loop {
        let (adv_data, adv_len, scan_rsp, scan_rsp_len, interval, run) = ADV_STATE.lock(|s| {
            let s = s.borrow();
            (
                s.adv_data,
                s.adv_len,
                s.scan_rsp,
                s.scan_rsp_len,
                s.interval_ticks,
                s.started && s.enabled,
            )
        });
        if !run {
            embassy_time::Timer::after(Duration::from_millis(100)).await;
            continue;
        }

        let config = peripheral::Config {
            interval: interval as u32,
            ..peripheral::Config::default()
        };
        let advertisement = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &adv_data[..adv_len],
            scan_data: &scan_rsp[..scan_rsp_len],
        };

        ROLE_EVENTS.send(RoleEvent::Advertising).await;
        match peripheral::advertise_connectable(sd, advertisement, &config).await {
            Ok(conn) => {
                let handle = conn.handle().unwrap_or(0);
                ROLE_EVENTS.send(RoleEvent::PeerConnected { handle }).await;
                // Serves GATT events until the peer goes away; writes
                // are forwarded to the core through PEER_WRITES.
                let _ = gatt_server::run(&conn, &RegistryServer, |_| {}).await;
                info!("peer disconnected");
                ROLE_EVENTS
                    .send(RoleEvent::PeerDisconnected {
                        supervision_timeout: false,
                    })
                    .await;
            }
            Err(_) => {
                ROLE_EVENTS.send(RoleEvent::Failure).await;
                return;
            }
        }
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("dispenser peripheral starting");

    let mut nrf_config = embassy_nrf::config::Config::default();
    // Keep interrupt priorities off the SoftDevice reserved levels.
    nrf_config.gpiote_interrupt_priority = interrupt::Priority::P2;
    nrf_config.time_interrupt_priority = interrupt::Priority::P2;
    let _peripherals = embassy_nrf::init(nrf_config);

    let sd_config = nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 1,
            event_length: 24,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 0,
            central_sec_count: 0,
            _bitfield_1: Default::default(),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: core::ptr::null_mut(),
            current_len: 0,
            max_len: DEVICE_NAME_LEN as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    };
    let sd = Softdevice::enable(&sd_config);
    unwrap!(spawner.spawn(softdevice_task(sd)));

    static DISPENSER: StaticCell<Dispenser<SoftdeviceStack, FlashNv, SoftdeviceSink>> =
        StaticCell::new();
    let dispenser = DISPENSER.init(Dispenser::new(
        SoftdeviceStack,
        SoftdeviceSink,
        FlashNv::new(sd),
    ));
    if dispenser.init().is_err() {
        defmt::panic!("dispenser init failed");
    }

    unwrap!(spawner.spawn(gap_task(sd)));

    let mut ticker = Ticker::every(Duration::from_millis(PERIODIC_TIMER_MS as u64));
    loop {
        while dispenser.process_pending() != 0 {}
        match select3(ROLE_EVENTS.receive(), PEER_WRITES.receive(), ticker.next()).await {
            Either3::First(event) => dispenser.on_role_event(event),
            Either3::Second(write) => {
                if let Err(e) =
                    dispenser.on_external_write(write.conn, write.handle, write.offset, &write.data)
                {
                    defmt::warn!("peer write rejected: {:?}", e);
                }
            }
            Either3::Third(()) => dispenser.timer_elapsed(PERIODIC_TIMER_MS),
        }
    }
}
