//! Time abstractions
//!
//! - **[`clock`]**: real and mock clocks so TTL logic can be tested without
//!   sleeping
//!
//! ## Usage
//!
//! ```rust
//! use std::time::Duration;
//!
//! use cipherstore_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let before = clock.now();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.now() - before, Duration::from_secs(5));
//! ```

pub mod clock;

pub use clock::{Clock, MockClock, SystemClock};
