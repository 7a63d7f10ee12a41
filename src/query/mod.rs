//! Observable queries.
//!
//! [`Database::observe`](crate::Database::observe) and
//! [`Database::observe_raw`](crate::Database::observe_raw) return a
//! [`QueryObservable`]. Each subscription to it yields [`LazyQuery`] values:
//! one immediately, then one per relevant trigger. A lazy query is a bound
//! read, not a result; the listener decides when to run it.

mod lazy;
mod observe;

#[cfg(test)]
mod tests;

pub use lazy::{LazyQuery, QueryBinding};
pub use observe::{QueryObservable, QueryStreamExt, QuerySubscription};
