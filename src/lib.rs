//! StarMap
//!
//! Explore a link graph as a field of stars: the current page sits at the
//! center with its strongest neighbors close by and weaker ones further
//! out, and travelling to a neighbor flies the camera to a new cluster
//! while the old one fades into a ghost trail.
//!
//! - [`starmap_core`]: the sans-IO navigator (history, layout, travel state
//!   machine)
//! - [`starmap_provider`]: where neighbor sets come from
//! - this crate: configuration, frame clocks and the async [`Session`] that
//!   ties the two together

pub mod clock;
pub mod config;
pub mod session;

pub use clock::{FixedStepClock, FrameClock, IntervalClock};
pub use config::{ConfigError, ProviderKind, StarmapConfig};
pub use session::{Session, SessionError, SessionHandle};
