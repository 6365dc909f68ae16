//! Service/characteristic registry and read/write dispatch.
//!
//! Owns every registered service and its value buffers. The external
//! GATT server drives `on_external_read`/`on_external_write` when a
//! peer accesses an attribute; the application reads and writes values
//! through `value`/`set_value`. Side effects are confined to the
//! addressed characteristic's buffer.

use heapless::Vec;

use crate::config::{MAX_CHARACTERISTICS, MAX_SERVICES};
use crate::error::{Error, RegistrationError};
use crate::gatt::{permit, Characteristic, Service, Uuid};

/// Handle set reported by the external server for one registered
/// service: the service declaration handle plus the value-attribute
/// handle of each characteristic, in declaration order. Servers are
/// free to interleave descriptor attributes, so value handles need not
/// be contiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandles {
    pub base: u16,
    pub values: Vec<u16, MAX_CHARACTERISTICS>,
}

/// External GATT server boundary: accepts a service's attribute table
/// and allocates handles for it.
pub trait GattServer {
    /// Submit a service table. On success reports the allocated
    /// handles; one value handle per characteristic is required.
    fn register_service(&mut self, service: &Service)
        -> Result<ServiceHandles, RegistrationError>;
}

/// Authorization hook consulted for attributes flagged AuthorizeRead /
/// AuthorizeWrite. Absent means such access is always denied.
pub type Authorizer = fn(conn_handle: u16, characteristic: &Characteristic, write: bool) -> bool;

/// In-memory service table with UUID- and handle-based dispatch.
pub struct AttributeRegistry {
    services: Vec<Service, MAX_SERVICES>,
    authorizer: Option<Authorizer>,
}

impl AttributeRegistry {
    pub const fn new() -> Self {
        Self {
            services: Vec::new(),
            authorizer: None,
        }
    }

    pub fn set_authorizer(&mut self, authorizer: Authorizer) {
        self.authorizer = Some(authorizer);
    }

    /// Submit `service` to the external server and retain it. Handles
    /// become externally fixed on success and are never reassigned.
    pub fn register<G: GattServer>(
        &mut self,
        mut service: Service,
        server: &mut G,
    ) -> Result<u16, Error> {
        if self.services.iter().any(|s| s.uuid() == service.uuid()) {
            return Err(RegistrationError::DuplicateUuid.into());
        }
        if self.services.is_full() {
            return Err(RegistrationError::OutOfResources.into());
        }

        let handles = server.register_service(&service)?;
        if handles.values.len() != service.characteristics().len() {
            return Err(RegistrationError::Rejected.into());
        }
        for (characteristic, handle) in service
            .characteristics_mut()
            .iter_mut()
            .zip(handles.values.iter())
        {
            characteristic.set_handle(*handle);
        }

        debug!("registered service at handle base {}", handles.base);
        // Capacity was checked above.
        let _ = self.services.push(service);
        Ok(handles.base)
    }

    pub fn service(&self, uuid: Uuid) -> Option<&Service> {
        self.services.iter().find(|s| s.uuid() == uuid)
    }

    fn characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<&Characteristic, Error> {
        self.service(service)
            .and_then(|s| s.characteristic(characteristic))
            .ok_or(Error::InvalidParameter)
    }

    fn characteristic_mut(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<&mut Characteristic, Error> {
        self.services
            .iter_mut()
            .find(|s| s.uuid() == service)
            .and_then(|s| s.characteristic_mut(characteristic))
            .ok_or(Error::InvalidParameter)
    }

    fn characteristic_by_handle(&self, handle: u16) -> Option<&Characteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics().iter())
            .find(|c| c.handle() == Some(handle))
    }

    fn characteristic_by_handle_mut(&mut self, handle: u16) -> Option<&mut Characteristic> {
        self.services
            .iter_mut()
            .flat_map(|s| s.characteristics_mut().iter_mut())
            .find(|c| c.handle() == Some(handle))
    }

    /// Copy `min(len, capacity)` bytes into the characteristic's buffer.
    pub fn set_value(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), Error> {
        self.characteristic_mut(service, characteristic)?.store(bytes);
        Ok(())
    }

    /// Read-only view of the current value.
    pub fn value(&self, service: Uuid, characteristic: Uuid) -> Result<&[u8], Error> {
        Ok(self.characteristic(service, characteristic)?.value())
    }

    /// External handle of a characteristic's value attribute.
    /// Fails if the service was never registered.
    pub fn handle_of(&self, service: Uuid, characteristic: Uuid) -> Result<u16, Error> {
        self.characteristic(service, characteristic)?
            .handle()
            .ok_or(Error::InvalidParameter)
    }

    /// Collect-and-clear the dirty flag left behind by an external write.
    pub fn take_dirty(&mut self, service: Uuid, characteristic: Uuid) -> Result<bool, Error> {
        Ok(self.characteristic_mut(service, characteristic)?.clear_dirty())
    }

    /// Peer read callback: authorization first, then up to `max_len`
    /// bytes starting at `offset` from the stored value.
    pub fn on_external_read(
        &self,
        conn_handle: u16,
        handle: u16,
        offset: usize,
        max_len: usize,
    ) -> Result<&[u8], Error> {
        let characteristic = self
            .characteristic_by_handle(handle)
            .ok_or(Error::InvalidParameter)?;

        if characteristic.permissions() & permit::AUTHOR_READ != 0
            && !self.is_authorized(conn_handle, characteristic, false)
        {
            return Err(Error::InsufficientAuthorization);
        }

        let value = characteristic.value();
        if offset > value.len() {
            return Err(Error::InvalidParameter);
        }
        let end = (offset + max_len).min(value.len());
        Ok(&value[offset..end])
    }

    /// Peer write callback: authorization first, then store `bytes` at
    /// `offset` (bounded by capacity) and mark the value dirty so a
    /// downstream consumer can pick up the change.
    pub fn on_external_write(
        &mut self,
        conn_handle: u16,
        handle: u16,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), Error> {
        let authorizer = self.authorizer;
        let characteristic = self
            .characteristic_by_handle_mut(handle)
            .ok_or(Error::InvalidParameter)?;

        if characteristic.permissions() & permit::AUTHOR_WRITE != 0
            && !authorizer.is_some_and(|a| a(conn_handle, characteristic, true))
        {
            return Err(Error::InsufficientAuthorization);
        }

        characteristic.store_at(offset, bytes)?;
        characteristic.mark_dirty();
        Ok(())
    }

    fn is_authorized(&self, conn_handle: u16, characteristic: &Characteristic, write: bool) -> bool {
        self.authorizer
            .is_some_and(|a| a(conn_handle, characteristic, write))
    }
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
