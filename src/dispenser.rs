//! Top-level peripheral application.
//!
//! `Dispenser` wires the configuration store, attribute registry,
//! role state machine, and event scheduler to the three external
//! boundaries (GAP/GATT stack, notification transport, nonvolatile
//! storage). The external runtime drives it with three entry points:
//! `on_role_event` for stack notifications, `timer_elapsed` for the
//! clock, and `process_pending` for the event loop.

use heapless::Deque;

use crate::config::{DEVICE_NAME_LEN, MAX_SYSTEM_MESSAGES, PERIODIC_TIMER_MS};
use crate::error::Error;
use crate::gap::{ConnParams, GapRole, RoleEvent, RoleState, RoleStateMachine};
use crate::gatt::{
    AttributeRegistry, GattServer, NotificationDispatcher, NotificationSink, Uuid,
};
use crate::scheduler::{Event, EventScheduler, ReloadTimer};
use crate::services::{humidity_service, misc_service};
use crate::store::{ConfigStore, DeviceConfig, NvStorage};

/// Inter-task messages delivered through the system message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SystemMessage {
    /// The controller finished executing an HCI command.
    HciCommandComplete { opcode: u16 },
}

/// The peripheral core, generic over its external boundaries.
pub struct Dispenser<G, S, N>
where
    G: GapRole + GattServer,
    S: NvStorage,
    N: NotificationSink,
{
    stack: G,
    sink: N,
    store: ConfigStore<S>,
    registry: AttributeRegistry,
    dispatcher: NotificationDispatcher,
    role: RoleStateMachine,
    scheduler: EventScheduler,
    timer: ReloadTimer,
    messages: Deque<SystemMessage, MAX_SYSTEM_MESSAGES>,
    periodic: Option<fn(&mut Self)>,
    pending_notify: Option<(Uuid, Uuid)>,
}

impl<G, S, N> Dispenser<G, S, N>
where
    G: GapRole + GattServer,
    S: NvStorage,
    N: NotificationSink,
{
    pub fn new(stack: G, sink: N, nv: S) -> Self {
        Self {
            stack,
            sink,
            store: ConfigStore::new(nv),
            registry: AttributeRegistry::new(),
            dispatcher: NotificationDispatcher::new(),
            role: RoleStateMachine::new(),
            scheduler: EventScheduler::new(),
            timer: ReloadTimer::new(PERIODIC_TIMER_MS),
            messages: Deque::new(),
            periodic: None,
            pending_notify: None,
        }
    }

    /// One-time start-up: load (or recover) the persisted configuration,
    /// push connection parameters, register the service tables, and
    /// schedule the deferred device start.
    pub fn init(&mut self) -> Result<(), Error> {
        self.store.init(&mut self.stack)?;
        self.stack.set_conn_params(&ConnParams::default());

        self.registry.register(misc_service(), &mut self.stack)?;
        self.registry.register(humidity_service(), &mut self.stack)?;

        self.timer.start();
        self.scheduler.post(Event::StartDevice);
        info!("dispenser initialized");
        Ok(())
    }

    /// Handler invoked on each periodic timer expiry.
    pub fn set_periodic_handler(&mut self, handler: fn(&mut Self)) {
        self.periodic = Some(handler);
    }

    /// Run one scheduler step: handles at most one pending event class
    /// and returns the still-pending mask so the runtime knows whether
    /// to call again before sleeping.
    pub fn process_pending(&mut self) -> u16 {
        match self.scheduler.next() {
            Some(Event::SystemMessage) => {
                if let Some(message) = self.messages.pop_front() {
                    self.handle_message(message);
                }
                if !self.messages.is_empty() {
                    self.scheduler.post(Event::SystemMessage);
                }
            }
            Some(Event::StartDevice) => {
                debug!("starting gap role");
                self.stack.start();
            }
            Some(Event::Connected) => {
                info!("peer connected");
            }
            Some(Event::NotifyRequested) => {
                if let Some((service, characteristic)) = self.pending_notify.take() {
                    if let Err(e) = self.notify_stored(service, characteristic) {
                        warn!("notification dropped: {:?}", e);
                    }
                }
            }
            Some(Event::PeriodicTick) => {
                if let Some(handler) = self.periodic {
                    handler(self);
                }
            }
            None => {}
        }
        self.scheduler.pending()
    }

    fn handle_message(&mut self, message: SystemMessage) {
        match message {
            SystemMessage::HciCommandComplete { opcode } => {
                trace!("hci command complete, opcode {}", opcode);
            }
        }
    }

    /// Queue a system message for the event loop. Overflow drops the
    /// newest message; the queue is sized for the runtime's burst depth.
    pub fn post_message(&mut self, message: SystemMessage) {
        if self.messages.push_back(message).is_err() {
            warn!("system message queue full");
            return;
        }
        self.scheduler.post(Event::SystemMessage);
    }

    /// Inbound GAP role notification from the stack.
    pub fn on_role_event(&mut self, event: RoleEvent) {
        let name = self.store.config().name;
        if let Some(raised) = self.role.handle_event(event, &name, &mut self.stack) {
            self.scheduler.post(raised);
        }
    }

    /// Account for elapsed wall time; posts one tick event when the
    /// reload period expired (coalesced if the runtime fell behind).
    pub fn timer_elapsed(&mut self, ms: u32) {
        if self.timer.advance(ms) > 0 {
            self.scheduler.post(Event::PeriodicTick);
        }
    }

    /// Ask for a deferred notification of the characteristic's stored
    /// value; sent on the next `process_pending` pass.
    pub fn request_notify(&mut self, service: Uuid, characteristic: Uuid) {
        self.pending_notify = Some((service, characteristic));
        self.scheduler.post(Event::NotifyRequested);
    }

    /// Store `payload` and notify it immediately over the active
    /// connection. Fails with `NotSent` when no peer is connected.
    pub fn notify(
        &mut self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<u16, Error> {
        let conn = self.role.connection_handle().ok_or(Error::NotSent)?;
        self.registry.set_value(service, characteristic, payload)?;
        self.dispatcher.notify(
            &self.registry,
            &mut self.sink,
            service,
            characteristic,
            conn,
            payload,
        )
    }

    fn notify_stored(&mut self, service: Uuid, characteristic: Uuid) -> Result<u16, Error> {
        let conn = self.role.connection_handle().ok_or(Error::NotSent)?;
        self.dispatcher
            .notify_current(&self.registry, &mut self.sink, service, characteristic, conn)
    }

    // Configuration pass-throughs; each updates the air state and persists.

    pub fn set_name(&mut self, name: &[u8]) -> Result<(), Error> {
        self.store.set_name(name, &mut self.stack)
    }

    pub fn set_beacon_uuid(&mut self, uuid: &[u8]) -> Result<(), Error> {
        self.store.set_beacon_uuid(uuid, &mut self.stack)
    }

    pub fn set_major(&mut self, major: &[u8]) -> Result<(), Error> {
        self.store.set_major(major, &mut self.stack)
    }

    pub fn set_minor(&mut self, minor: &[u8]) -> Result<(), Error> {
        self.store.set_minor(minor, &mut self.stack)
    }

    pub fn set_tx_power(&mut self, tx_power: i8) -> Result<(), Error> {
        self.store.set_tx_power(tx_power, &mut self.stack)
    }

    pub fn set_adv_interval(&mut self, ms: u16) -> Result<(), Error> {
        self.store.set_adv_interval(ms, &mut self.stack)
    }

    // Peer attribute access, forwarded by the stack glue.

    pub fn on_external_read(
        &self,
        conn_handle: u16,
        handle: u16,
        offset: usize,
        max_len: usize,
    ) -> Result<&[u8], Error> {
        self.registry.on_external_read(conn_handle, handle, offset, max_len)
    }

    pub fn on_external_write(
        &mut self,
        conn_handle: u16,
        handle: u16,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), Error> {
        self.registry.on_external_write(conn_handle, handle, offset, bytes)
    }

    // Introspection, mainly for the stack glue and tests.

    pub fn config(&self) -> &DeviceConfig {
        self.store.config()
    }

    pub fn state(&self) -> RoleState {
        self.role.state()
    }

    pub fn connection_handle(&self) -> Option<u16> {
        self.role.connection_handle()
    }

    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut AttributeRegistry {
        &mut self.registry
    }

    pub fn pending_events(&self) -> u16 {
        self.scheduler.pending()
    }

    pub fn adv_payload(&self) -> &[u8] {
        self.store.adv_payload().as_bytes()
    }

    pub fn scan_rsp_payload(&self) -> &[u8] {
        self.store.scan_response().as_bytes()
    }
}
