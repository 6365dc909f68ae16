//! Cooperative event scheduler.
//!
//! One pending-event bitmask per logical task. Posting ORs a bit in
//! (idempotent); processing takes at most one event class per
//! invocation in fixed priority order and clears only that bit. Any
//! remaining bits are left set for the next invocation by the external
//! runtime - there is no cancellation, so a posted event is eventually
//! handled.

/// Events dispatched by the peripheral task, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// A queued message from the external stack awaits delivery.
    SystemMessage,
    /// Delayed profile start-up requested at init.
    StartDevice,
    /// A peer connection was established.
    Connected,
    /// A characteristic notification was requested.
    NotifyRequested,
    /// The reload timer fired.
    PeriodicTick,
}

impl Event {
    /// Fixed dispatch order: system messages drain first, the periodic
    /// tick yields to everything else.
    pub const PRIORITY: [Event; 5] = [
        Event::SystemMessage,
        Event::StartDevice,
        Event::Connected,
        Event::NotifyRequested,
        Event::PeriodicTick,
    ];

    pub const fn bit(self) -> u16 {
        match self {
            Event::SystemMessage => 0x8000,
            Event::StartDevice => 0x0001,
            Event::Connected => 0x0010,
            Event::NotifyRequested => 0x0004,
            Event::PeriodicTick => 0x0002,
        }
    }
}

/// Pending-event set for a single task.
pub struct EventScheduler {
    pending: u16,
}

impl EventScheduler {
    pub const fn new() -> Self {
        Self { pending: 0 }
    }

    /// Mark an event pending. Posting an already-pending event is a
    /// no-op; it will still be handled exactly once.
    pub fn post(&mut self, event: Event) {
        self.pending |= event.bit();
    }

    pub fn pending(&self) -> u16 {
        self.pending
    }

    pub fn has_pending(&self) -> bool {
        self.pending != 0
    }

    pub fn is_pending(&self, event: Event) -> bool {
        self.pending & event.bit() != 0
    }

    /// Take the highest-priority pending event, clearing its bit.
    pub fn next(&mut self) -> Option<Event> {
        for event in Event::PRIORITY {
            if self.pending & event.bit() != 0 {
                self.pending &= !event.bit();
                return Some(event);
            }
        }
        None
    }
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Free-running reload timer driven by the external runtime's clock.
/// Started once at device start-up; each expiry of the reload period
/// is reported as one firing.
pub struct ReloadTimer {
    period_ms: u32,
    elapsed_ms: u32,
    running: bool,
}

impl ReloadTimer {
    pub const fn new(period_ms: u32) -> Self {
        Self {
            period_ms,
            elapsed_ms: 0,
            running: false,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.elapsed_ms = 0;
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.elapsed_ms = 0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Account for `ms` elapsed milliseconds; returns how many reload
    /// periods expired.
    pub fn advance(&mut self, ms: u32) -> u32 {
        if !self.running || self.period_ms == 0 {
            return 0;
        }
        self.elapsed_ms += ms;
        let fired = self.elapsed_ms / self.period_ms;
        self.elapsed_ms %= self.period_ms;
        fired
    }
}
