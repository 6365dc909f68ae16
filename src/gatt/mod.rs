//! Generic attribute/characteristic model.
//!
//! A `Service` is an ordered set of `Characteristic`s under one UUID.
//! Order is the wire declaration order: the external server lays a
//! service out as {service declaration, then per characteristic
//! {declaration, value, optional descriptors}} and reports the handle
//! it assigned to each value attribute. Once a service is registered
//! the order - and therefore every handle - is fixed for the
//! registry's lifetime.

pub mod notify;
pub mod registry;

pub use notify::{NotificationDispatcher, NotificationSink};
pub use registry::{AttributeRegistry, GattServer, ServiceHandles};

use heapless::Vec;

use crate::config::{MAX_CHARACTERISTICS, MAX_CHAR_VALUE_LEN, UUID_BASE};
use crate::error::Error;

/// Characteristic property flags (standard GATT values).
pub mod props {
    pub const READ: u8 = 0x02;
    pub const WRITE: u8 = 0x08;
    pub const NOTIFY: u8 = 0x10;
    pub const EXTENDED: u8 = 0x80;
}

/// Attribute permission flags.
pub mod permit {
    pub const READ: u8 = 0x01;
    pub const WRITE: u8 = 0x02;
    pub const AUTHOR_READ: u8 = 0x04;
    pub const AUTHOR_WRITE: u8 = 0x08;
}

/// 16- or 128-bit attribute identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Uuid {
    Short(u16),
    Full([u8; 16]),
}

impl Uuid {
    /// 16-bit UUID from the custom `0xFFFx` range.
    pub const fn short(value: u16) -> Self {
        Uuid::Short(value)
    }

    /// 128-bit UUID from the fixed base plus a 16-bit suffix at
    /// bytes 12..14 (little-endian), trailing bytes zero.
    pub const fn from_base(suffix: u16) -> Self {
        let mut bytes = [0u8; 16];
        let mut i = 0;
        while i < UUID_BASE.len() {
            bytes[i] = UUID_BASE[i];
            i += 1;
        }
        bytes[12] = (suffix & 0xff) as u8;
        bytes[13] = (suffix >> 8) as u8;
        Uuid::Full(bytes)
    }
}

/// A single characteristic: identity, access flags, and its value buffer.
///
/// The registry exclusively owns the buffer; readers get borrowed views.
#[derive(Debug, Clone)]
pub struct Characteristic {
    uuid: Uuid,
    properties: u8,
    permissions: u8,
    value: Vec<u8, MAX_CHAR_VALUE_LEN>,
    capacity: usize,
    handle: Option<u16>,
    dirty: bool,
}

impl Characteristic {
    /// Capacity is fixed at construction and never resized.
    pub fn new(uuid: Uuid, properties: u8, permissions: u8, capacity: usize) -> Self {
        let capacity = capacity.min(MAX_CHAR_VALUE_LEN);
        Self {
            uuid,
            properties,
            permissions,
            value: Vec::new(),
            capacity,
            handle: None,
            dirty: false,
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn properties(&self) -> u8 {
        self.properties
    }

    pub fn permissions(&self) -> u8 {
        self.permissions
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// External handle of the value attribute, once registered.
    pub fn handle(&self) -> Option<u16> {
        self.handle
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn set_handle(&mut self, handle: u16) {
        self.handle = Some(handle);
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn clear_dirty(&mut self) -> bool {
        core::mem::replace(&mut self.dirty, false)
    }

    /// Replace the stored value with `min(len, capacity)` bytes of `bytes`.
    pub(crate) fn store(&mut self, bytes: &[u8]) {
        let n = bytes.len().min(self.capacity);
        self.value.clear();
        // Length was just clamped to capacity <= MAX_CHAR_VALUE_LEN.
        let _ = self.value.extend_from_slice(&bytes[..n]);
    }

    /// Write `bytes` at `offset`, bounded by capacity. The value grows
    /// to cover the written range; any gap below `offset` is zero-filled.
    pub(crate) fn store_at(&mut self, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        if offset > self.capacity {
            return Err(Error::InvalidParameter);
        }
        let end = (offset + bytes.len()).min(self.capacity);
        while self.value.len() < end {
            let _ = self.value.push(0);
        }
        let n = end.saturating_sub(offset);
        self.value[offset..end].copy_from_slice(&bytes[..n]);
        Ok(())
    }
}

/// An ordered collection of characteristics under one service UUID.
#[derive(Debug, Clone)]
pub struct Service {
    uuid: Uuid,
    characteristics: Vec<Characteristic, MAX_CHARACTERISTICS>,
}

impl Service {
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Append a characteristic. Declaration order is final once the
    /// service is registered.
    pub fn push(&mut self, characteristic: Characteristic) -> Result<(), Error> {
        self.characteristics
            .push(characteristic)
            .map_err(|_| Error::InvalidParameter)
    }

    pub fn characteristics(&self) -> &[Characteristic] {
        &self.characteristics
    }

    pub(crate) fn characteristics_mut(&mut self) -> &mut [Characteristic] {
        &mut self.characteristics
    }

    pub fn characteristic(&self, uuid: Uuid) -> Option<&Characteristic> {
        self.characteristics.iter().find(|c| c.uuid() == uuid)
    }

    pub(crate) fn characteristic_mut(&mut self, uuid: Uuid) -> Option<&mut Characteristic> {
        self.characteristics.iter_mut().find(|c| c.uuid() == uuid)
    }

    /// Attribute count as declared on the wire: one service declaration
    /// plus a {declaration, value} pair per characteristic.
    pub fn attribute_count(&self) -> usize {
        1 + 2 * self.characteristics.len()
    }
}
