//! Clock Port - Source of the current time.

use crate::domain::foundation::Timestamp;

/// Port for reading the current time, so tests can pin it.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}
