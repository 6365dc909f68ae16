//! Concrete service tables for the dispenser peripheral.
//!
//! Two services: a miscellaneous control service on 16-bit UUIDs in
//! the custom `0xFFFx` range, and a humidity service on 128-bit UUIDs
//! built from the vendor base. Declaration order below is the wire
//! order, so it fixes every value handle at registration.

use crate::config::{
    HUMIDITY_CHAR_UUID, HUMIDITY_SERVICE_UUID, MISC_CHAR_BOTTLE_REPLACEMENT_UUID,
    MISC_CHAR_CLICK_AVAILABLE_UUID, MISC_CHAR_IDENTIFICATION_UUID, MISC_CHAR_MODE_SELECTION_UUID,
    MISC_SERVICE_UUID,
};
use crate::gatt::{permit, props, Characteristic, Service, Uuid};

fn misc_characteristic(uuid: u16, capacity: usize) -> Characteristic {
    Characteristic::new(
        Uuid::short(uuid),
        props::READ | props::WRITE | props::NOTIFY,
        permit::READ | permit::WRITE,
        capacity,
    )
}

/// Miscellaneous control service: identification, mode selection,
/// clicks-available counter, and bottle-replacement signal.
pub fn misc_service() -> Service {
    let mut service = Service::new(Uuid::short(MISC_SERVICE_UUID));
    // Capacity checked: four characteristics fit any registry sizing.
    let _ = service.push(misc_characteristic(MISC_CHAR_IDENTIFICATION_UUID, 4));
    let _ = service.push(misc_characteristic(MISC_CHAR_MODE_SELECTION_UUID, 1));
    let _ = service.push(misc_characteristic(MISC_CHAR_CLICK_AVAILABLE_UUID, 4));
    let _ = service.push(misc_characteristic(MISC_CHAR_BOTTLE_REPLACEMENT_UUID, 4));
    service
}

/// Humidity service: a single read/notify measurement characteristic
/// with extended properties declared.
pub fn humidity_service() -> Service {
    let mut service = Service::new(Uuid::from_base(HUMIDITY_SERVICE_UUID));
    let _ = service.push(Characteristic::new(
        Uuid::from_base(HUMIDITY_CHAR_UUID),
        props::READ | props::NOTIFY | props::EXTENDED,
        permit::READ,
        4,
    ));
    service
}
