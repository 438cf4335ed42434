//! StarMap navigation core
//!
//! Sans-IO engine behind the StarMap explorer: it owns browsing history,
//! lays out neighbor "stars" around a center, and runs the travel state
//! machine that moves the user from one center to the next.
//!
//! # Architecture
//!
//! ```text
//! UI command ──► Navigator ──► Directive::Fetch ──► (driver calls provider)
//!                    ▲                                     │
//!                    │        on_fetched(result) ◄─────────┘
//!                    │              │
//!                    │              ▼
//!                    │      Directive::Animate ──► driver ticks frames
//!                    │              │
//!                    └── tick(dt) ──┘ ──► commit ──► NavEvent outbox
//! ```
//!
//! Nothing in this crate performs I/O or awaits. The [`Navigator`] hands its
//! driver [`Directive`]s and is fed results back, so every transition is
//! unit-testable with plain function calls.

pub mod cache;
pub mod effect;
pub mod event;
pub mod fault;
pub mod hash;
pub mod history;
pub mod layout;
pub mod state;
pub mod trail;
pub mod transition;
pub mod travel;
pub mod types;

pub use cache::BoundedCache;
pub use effect::EffectSet;
pub use event::{NavEvent, Notice, NoticeLevel};
pub use fault::NavFault;
pub use hash::{direction_from_title, seeded_hash};
pub use history::{Breadcrumb, History, HistoryUpdate};
pub use layout::{
    build_cluster_layout, opacity_from_rank, position_for_neighbor, ClusterLayout, LayoutParams,
    NodeKind, NodePlacement, ReturnNeighbor,
};
pub use state::{NavAction, NavSnapshot, NavigationState};
pub use trail::{ClusterPlacement, ClusterRegistry};
pub use transition::{ease_in_out_cubic, Transition, TransitionFrame, TransitionParams};
pub use travel::{
    Directive, Navigator, NavigatorConfig, ReturnPolicy, TransitionPlan, TravelId, TravelKind,
    TravelRequest,
};
pub use types::{CenterInfo, LinkMode, NeighborSet, PageMeta, Vec3};

// =============================================================================
// TUNABLE DEFAULTS
// =============================================================================

/// Radius of the strongest neighbor's shell.
pub const R_MIN: f32 = 8.0;

/// Radius of the weakest neighbor's shell.
pub const R_MAX: f32 = 40.0;

/// Distance between a center and the next center placed from it.
pub const SEGMENT_DISTANCE: f32 = 40.0;

/// Ghosted clusters retained in trail mode.
pub const MAX_GHOSTS: usize = 5;

/// Neighbors laid out per cluster.
pub const MAX_NEIGHBORS: usize = 20;

/// Default travel animation length.
pub const DEFAULT_TRANSITION_MS: u64 = 1400;

/// Fraction of the transition before the cross-fade begins.
pub const DEFAULT_FADE_START: f32 = 0.3;

/// Opacity of the weakest-ranked neighbor.
pub const MIN_OPACITY: f32 = 0.25;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_radii_are_ordered() {
        assert!(R_MIN > 0.0);
        assert!(R_MIN < R_MAX);
    }

    #[test]
    fn fade_start_is_a_fraction() {
        assert!((0.0..1.0).contains(&DEFAULT_FADE_START));
    }
}
