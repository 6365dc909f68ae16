//! Unified error type for the peripheral core.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Every fallible operation returns a status; nothing in this crate
//! retries automatically.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Unknown service/characteristic identifier, or a malformed argument.
    InvalidParameter,

    /// Permission-gated attribute access was denied.
    InsufficientAuthorization,

    /// The external GATT server rejected a service table.
    Registration(RegistrationError),

    /// A notification could not be delivered over the active connection.
    NotSent,

    /// Nonvolatile storage read/write failed.
    Storage,
}

/// Reasons the external GATT server can refuse a service table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistrationError {
    /// A service with the same UUID is already registered.
    DuplicateUuid,
    /// No room left in the attribute table.
    OutOfResources,
    /// Server rejected the table for another reason.
    Rejected,
}

impl From<RegistrationError> for Error {
    fn from(e: RegistrationError) -> Self {
        Error::Registration(e)
    }
}
