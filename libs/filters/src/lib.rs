//! Duplicate, delta, period, and timestamp-correction transforms (§4.5).
//! All four share an invariant: an orphaned observation clears its state and
//! is dropped; an `UNAVAILABLE` observation clears its state and forwards.

pub mod delta;
pub mod duplicate;
pub mod error;
pub mod period;
pub mod timestamp_corrector;

pub use delta::DeltaFilter;
pub use duplicate::DuplicateFilter;
pub use error::FilterError;
pub use period::PeriodFilter;
pub use timestamp_corrector::TimestampCorrector;
