//! Characteristic value-change notifications.
//!
//! Fire-and-forget: a failed send is reported once and dropped. No
//! acknowledgment tracking exists for notifications, so there is
//! nothing to retry against.

use crate::error::Error;
use crate::gatt::{AttributeRegistry, Uuid};

/// External notification transport (the vendor stack's `GATT_Notification`
/// equivalent). Rejects the send when there is no usable connection or the
/// peer has not enabled notifications.
pub trait NotificationSink {
    fn send(&mut self, conn_handle: u16, attr_handle: u16, payload: &[u8]) -> Result<(), Error>;
}

/// Resolves characteristics to their registered handles and pushes
/// value-change notifications through a `NotificationSink`.
pub struct NotificationDispatcher {
    on_sent: Option<fn()>,
}

impl NotificationDispatcher {
    pub const fn new() -> Self {
        Self { on_sent: None }
    }

    /// Completion callback invoked after each successful send.
    pub fn set_sent_callback(&mut self, callback: fn()) {
        self.on_sent = Some(callback);
    }

    /// Send `payload` as a notification for the given characteristic over
    /// `conn_handle`. Returns the attribute handle the notification was
    /// addressed to.
    pub fn notify<S: NotificationSink>(
        &self,
        registry: &AttributeRegistry,
        sink: &mut S,
        service: Uuid,
        characteristic: Uuid,
        conn_handle: u16,
        payload: &[u8],
    ) -> Result<u16, Error> {
        let handle = registry.handle_of(service, characteristic)?;
        sink.send(conn_handle, handle, payload)
            .map_err(|_| Error::NotSent)?;
        if let Some(callback) = self.on_sent {
            callback();
        }
        Ok(handle)
    }

    /// Notify with the characteristic's currently stored value. The value
    /// buffer stays owned by the registry; the sink only borrows it for
    /// the duration of the send.
    pub fn notify_current<S: NotificationSink>(
        &self,
        registry: &AttributeRegistry,
        sink: &mut S,
        service: Uuid,
        characteristic: Uuid,
        conn_handle: u16,
    ) -> Result<u16, Error> {
        let payload = registry.value(service, characteristic)?;
        self.notify(registry, sink, service, characteristic, conn_handle, payload)
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
