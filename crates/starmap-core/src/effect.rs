//! Effect flags reported with every committed travel.
//!
//! A commit can change several things at once; the presentation layer checks
//! which flags are set and refreshes only what changed.

use bitflags::bitflags;

bitflags! {
    /// Set of effects produced by a committed travel, refresh or toggle.
    ///
    /// # Example
    ///
    /// ```
    /// use starmap_core::EffectSet;
    ///
    /// let effects = EffectSet::CENTER_CHANGED | EffectSet::HISTORY_CHANGED;
    /// assert!(effects.needs_breadcrumb_refresh());
    /// ```
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EffectSet: u16 {
        const NONE = 0;

        // =====================================================================
        // NAVIGATION STATE
        // =====================================================================

        /// Current center changed.
        const CENTER_CHANGED = 1 << 0;

        /// History entries or cursor changed.
        const HISTORY_CHANGED = 1 << 1;

        /// Forward branch was cut before appending.
        const FORWARD_TRUNCATED = 1 << 2;

        /// A title was added to the visited set.
        const VISITED_CHANGED = 1 << 3;

        // =====================================================================
        // SCENE
        // =====================================================================

        /// A new cluster was placed.
        const CLUSTER_BUILT = 1 << 4;

        /// The outgoing cluster was dimmed and kept as a ghost.
        const CLUSTER_GHOSTED = 1 << 5;

        /// The oldest ghost was evicted from the trail.
        const GHOST_EVICTED = 1 << 6;

        /// The outgoing cluster was discarded.
        const CLUSTER_DISCARDED = 1 << 7;

        /// A revisited trail cluster was re-anchored at its old position.
        const REANCHORED = 1 << 8;

        /// All clusters were dropped (fresh search).
        const SCENE_RESET = 1 << 9;

        /// Camera target moved.
        const CAMERA_CHANGED = 1 << 10;

        // =====================================================================
        // QUEUE
        // =====================================================================

        /// A pending navigation action was replayed after the commit.
        const PENDING_REPLAYED = 1 << 11;
    }
}

impl Default for EffectSet {
    fn default() -> Self {
        EffectSet::NONE
    }
}

impl EffectSet {
    pub fn needs_breadcrumb_refresh(&self) -> bool {
        self.intersects(EffectSet::HISTORY_CHANGED | EffectSet::CENTER_CHANGED)
    }

    pub fn scene_changed(&self) -> bool {
        self.intersects(
            EffectSet::CLUSTER_BUILT
                | EffectSet::CLUSTER_GHOSTED
                | EffectSet::GHOST_EVICTED
                | EffectSet::CLUSTER_DISCARDED
                | EffectSet::SCENE_RESET,
        )
    }
}
