//! GAP-role connection state machine.
//!
//! The external GAP layer reports role changes asynchronously; this
//! module tracks them and captures the active connection handle. The
//! machine is tolerant of spurious notifications: an event that is not
//! valid for the current state is ignored, never fatal. `Error` is
//! terminal for the session - recovery requires a device restart.

use crate::config::{
    CONN_INTERVAL_MAX, CONN_INTERVAL_MIN, CONN_SLAVE_LATENCY, CONN_SUPERVISION_TIMEOUT,
    DEVICE_NAME_LEN,
};
use crate::scheduler::Event;

/// Connection parameter set pushed to the external GAP layer
/// (intervals in 1.25 ms units, timeout in 10 ms units).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnParams {
    pub min_interval: u16,
    pub max_interval: u16,
    pub slave_latency: u16,
    pub supervision_timeout: u16,
}

impl Default for ConnParams {
    fn default() -> Self {
        Self {
            min_interval: CONN_INTERVAL_MIN,
            max_interval: CONN_INTERVAL_MAX,
            slave_latency: CONN_SLAVE_LATENCY,
            supervision_timeout: CONN_SUPERVISION_TIMEOUT,
        }
    }
}

/// External GAP boundary. The implementation talks to the vendor
/// stack; the core only pushes parameters and payloads outward.
pub trait GapRole {
    /// Begin role operation; the stack answers with `RoleEvent::Started`.
    fn start(&mut self);
    fn set_device_name(&mut self, name: &[u8]);
    fn set_advertising(&mut self, enabled: bool);
    fn set_adv_data(&mut self, data: &[u8]);
    fn set_scan_rsp_data(&mut self, data: &[u8]);
    /// Advertising interval in 0.625 ms ticks (see `adv_interval_ms_to_ticks`).
    fn set_adv_interval(&mut self, ticks: u16);
    fn set_conn_params(&mut self, params: &ConnParams);
}

/// GAP role states as reported over the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoleState {
    Init,
    Started,
    Advertising,
    Connected,
    ConnectedAdvertising,
    Waiting,
    WaitingAfterTimeout,
    Error,
}

/// Inbound notifications from the external GAP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RoleEvent {
    /// Role start-up completed.
    Started,
    /// Advertising is on the air.
    Advertising,
    /// A peer connected on the given handle.
    PeerConnected { handle: u16 },
    /// The peer went away; `supervision_timeout` distinguishes a link
    /// loss from an orderly disconnect.
    PeerDisconnected { supervision_timeout: bool },
    /// Unrecoverable stack failure.
    Failure,
}

/// Per-connection bookkeeping. Created at boot with no handle; the
/// handle is captured on connect and cleared on disconnect.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectionContext {
    handle: Option<u16>,
}

impl ConnectionContext {
    pub fn handle(&self) -> Option<u16> {
        self.handle
    }
}

/// Tracks GAP role transitions and the active connection context.
pub struct RoleStateMachine {
    state: RoleState,
    context: ConnectionContext,
}

impl RoleStateMachine {
    pub const fn new() -> Self {
        Self {
            state: RoleState::Init,
            context: ConnectionContext { handle: None },
        }
    }

    pub fn state(&self) -> RoleState {
        self.state
    }

    pub fn connection_handle(&self) -> Option<u16> {
        self.context.handle()
    }

    /// Apply an inbound GAP notification. Returns a scheduler event to
    /// post when the transition raises one. `device_name` is pushed to
    /// the GAP layer on entering `Started`.
    pub fn handle_event<G: GapRole>(
        &mut self,
        event: RoleEvent,
        device_name: &[u8; DEVICE_NAME_LEN],
        gap: &mut G,
    ) -> Option<Event> {
        use RoleState::*;

        if self.state == Error {
            return None;
        }
        if let RoleEvent::Failure = event {
            warn!("gap role failure, session terminal");
            self.state = Error;
            return None;
        }

        let raised = match (self.state, event) {
            (Init, RoleEvent::Started) => {
                gap.set_device_name(device_name);
                gap.set_advertising(true);
                self.state = Started;
                None
            }
            (Started, RoleEvent::Advertising) => {
                self.state = Advertising;
                None
            }
            (Advertising, RoleEvent::PeerConnected { handle }) => {
                self.context.handle = Some(handle);
                self.state = Connected;
                Some(Event::Connected)
            }
            (Connected, RoleEvent::Advertising) => {
                self.state = ConnectedAdvertising;
                None
            }
            (
                Connected | ConnectedAdvertising,
                RoleEvent::PeerDisconnected {
                    supervision_timeout,
                },
            ) => {
                self.context.handle = None;
                self.state = if supervision_timeout {
                    WaitingAfterTimeout
                } else {
                    Waiting
                };
                None
            }
            (Waiting | WaitingAfterTimeout, RoleEvent::Advertising) => {
                self.state = Advertising;
                None
            }
            // Spurious notification for this state; ignore.
            (state, event) => {
                trace!("ignored gap event {:?} in {:?}", event, state);
                None
            }
        };

        raised
    }
}

impl Default for RoleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
