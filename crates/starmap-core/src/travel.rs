//! Travel state machine.
//!
//! The [`Navigator`] owns the [`NavigationState`] and the placed clusters and
//! is the only thing that mutates them. It never performs I/O: commands
//! return a [`Directive`] telling the driver what to do next (fetch a
//! neighbor set, animate a transition, nothing), and the driver feeds
//! results back through [`Navigator::on_fetched`] and [`Navigator::tick`].
//!
//! ```text
//!            request_travel                on_fetched(Ok)
//!   Idle ───────────────────► Fetching ─────────────────► Animating
//!    ▲                           │                            │
//!    │       on_fetched(Err)     │          tick → t >= 1     │
//!    ├───────────────────────────┘                            │
//!    └─────────────── commit, replay pending ◄────────────────┘
//! ```
//!
//! Requests arriving while a travel is in flight are captured as the single
//! pending action (last writer wins) and replayed after the commit or abort.

use crate::effect::EffectSet;
use crate::event::{NavEvent, Notice};
use crate::fault::NavFault;
use crate::hash::direction_from_title;
use crate::history::HistoryUpdate;
use crate::layout::{build_cluster_layout, LayoutParams, ReturnNeighbor};
use crate::state::{NavAction, NavSnapshot, NavigationState};
use crate::trail::{ClusterPlacement, ClusterRegistry};
use crate::transition::{Transition, TransitionParams};
use crate::types::{LinkMode, NeighborSet, Vec3};
use crate::MAX_GHOSTS;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

// =============================================================================
// CONFIG
// =============================================================================

/// When a cluster gets a return neighbor pointing at the previous center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnPolicy {
    #[default]
    Always,
    /// Only while trail mode is on.
    TrailOnly,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigatorConfig {
    pub layout: LayoutParams,
    pub transition: TransitionParams,
    pub max_ghosts: usize,
    pub trail_enabled: bool,
    pub return_policy: ReturnPolicy,
}

impl Default for NavigatorConfig {
    fn default() -> Self {
        Self {
            layout: LayoutParams::default(),
            transition: TransitionParams::default(),
            max_ghosts: MAX_GHOSTS,
            trail_enabled: true,
            return_policy: ReturnPolicy::default(),
        }
    }
}

// =============================================================================
// DIRECTIVES
// =============================================================================

/// Identifies one travel attempt; results for any other id are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TravelId(pub u64);

impl fmt::Display for TravelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelKind {
    /// Fresh session root: resets history, visited and the scene on commit.
    Root,
    /// Animated move to another center.
    Step { history: HistoryUpdate },
    /// Re-fetch the current center (link mode changed).
    Refresh,
}

/// Neighbor set the driver must fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TravelRequest {
    pub id: TravelId,
    pub title: String,
    pub mode: LinkMode,
    pub kind: TravelKind,
}

/// Everything the presentation layer needs to animate one travel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransitionPlan {
    pub travel: TravelId,
    /// Cluster fading out; `None` only if the previous center had no cluster.
    pub outgoing: Option<String>,
    pub incoming: ClusterPlacement,
    pub camera_start: Vec3,
    pub camera_end: Vec3,
    pub duration_ms: u64,
}

/// What the driver should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// Nothing to do.
    Idle,
    /// Captured as pending (or deferred) behind the travel in flight.
    Queued,
    Fetch(TravelRequest),
    /// Start ticking the clock; [`Navigator::tick`] commits at `t >= 1`.
    Animate(Box<TransitionPlan>),
}

impl Directive {
    /// True when the command started or queued something.
    pub fn accepted(&self) -> bool {
        !matches!(self, Directive::Idle)
    }
}

// =============================================================================
// NAVIGATOR
// =============================================================================

#[derive(Debug)]
struct InFlight {
    request: TravelRequest,
    /// Direction from the current center used if the target has no stored
    /// position.
    direction: Vec3,
}

#[derive(Debug)]
struct Animation {
    plan: TransitionPlan,
    transition: Transition,
    set: NeighborSet,
    history: HistoryUpdate,
    from: String,
    reanchored: bool,
}

#[derive(Debug, Default)]
enum Phase {
    #[default]
    Idle,
    Fetching(InFlight),
    Animating(Box<Animation>),
}

#[derive(Debug)]
pub struct Navigator {
    config: NavigatorConfig,
    state: NavigationState,
    clusters: ClusterRegistry,
    phase: Phase,
    /// Neighbor set behind the current cluster, kept for in-place rebuilds.
    current_set: Option<NeighborSet>,
    /// Center the current cluster was entered from. Whether it is shown as
    /// a return node depends on the return policy.
    current_return: Option<String>,
    camera_target: Vec3,
    refresh_after: bool,
    /// Rebuild the incoming cluster once the running animation commits.
    rebuild_after: bool,
    next_id: u64,
    events: Vec<NavEvent>,
}

impl Navigator {
    pub fn new(config: NavigatorConfig) -> Self {
        Self {
            state: NavigationState::new(config.trail_enabled),
            clusters: ClusterRegistry::new(config.max_ghosts),
            config,
            phase: Phase::Idle,
            current_set: None,
            current_return: None,
            camera_target: Vec3::ZERO,
            refresh_after: false,
            rebuild_after: false,
            next_id: 1,
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &NavigatorConfig {
        &self.config
    }

    pub fn state(&self) -> &NavigationState {
        &self.state
    }

    pub fn clusters(&self) -> &ClusterRegistry {
        &self.clusters
    }

    pub fn current_set(&self) -> Option<&NeighborSet> {
        self.current_set.as_ref()
    }

    pub fn current_cluster(&self) -> Option<&ClusterPlacement> {
        self.state
            .current_center()
            .and_then(|c| self.clusters.get(c))
    }

    pub fn camera_target(&self) -> Vec3 {
        self.camera_target
    }

    pub fn is_busy(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    /// The fetch the driver should be running, if any.
    pub fn in_flight(&self) -> Option<&TravelRequest> {
        match &self.phase {
            Phase::Fetching(f) => Some(&f.request),
            _ => None,
        }
    }

    /// World positions of the placed history entries, for the trail line.
    pub fn trail_points(&self) -> Vec<Vec3> {
        if !self.state.trail_enabled {
            return Vec::new();
        }
        self.clusters.trail_points(self.state.history.entries())
    }

    /// Take all events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<NavEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> NavSnapshot {
        let mut visited: Vec<String> = self.state.visited.iter().cloned().collect();
        visited.sort();
        NavSnapshot {
            current_center: self.state.current_center.clone(),
            history: self.state.history.entries().to_vec(),
            history_index: self.state.history.index(),
            breadcrumbs: self.state.history.breadcrumbs(),
            visited,
            is_animating: self.state.is_animating,
            pending_nav: self.state.pending_nav.clone(),
            show_backlinks: self.state.show_backlinks,
            trail_enabled: self.state.trail_enabled,
            neighbors: self
                .current_cluster()
                .map(|c| c.layout.neighbor_titles())
                .unwrap_or_default(),
            chain_prev: self.state.history.chain_prev().map(str::to_string),
            ghosts: self.clusters.ghosts().map(str::to_string).collect(),
        }
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Begin a new session rooted at `title`.
    ///
    /// History, visited and the scene are reset only when the root fetch
    /// succeeds; a failed search leaves the previous session intact.
    pub fn start_fresh_search(&mut self, title: &str) -> Result<Directive, NavFault> {
        let title = valid_title(title)?;
        if self.is_busy() {
            return Err(NavFault::Busy);
        }
        info!(title = %title, "Starting fresh search");
        Ok(self.begin(title, LinkMode::Outlinks, TravelKind::Root, Vec3::ZERO))
    }

    /// Travel to `title`, appending it to history (cutting any forward
    /// branch) when `add_to_history` is set, or overwriting the entry at the
    /// cursor otherwise.
    pub fn travel_to_neighbor(
        &mut self,
        title: &str,
        add_to_history: bool,
    ) -> Result<Directive, NavFault> {
        let title = valid_title(title)?;
        if self.is_busy() {
            return Ok(self.capture(NavAction::TravelTo {
                title,
                add_to_history,
            }));
        }
        let Some(center) = self.state.current_center.as_deref() else {
            return Err(NavFault::NoCenter);
        };
        if center == title {
            return Ok(Directive::Idle);
        }

        let update = if add_to_history {
            HistoryUpdate::Push
        } else {
            match self.state.history.cursor() {
                Some(i) => HistoryUpdate::ReplaceAt(i),
                None => HistoryUpdate::Push,
            }
        };
        Ok(self.begin_step(title, update))
    }

    pub fn go_back_one(&mut self) -> Directive {
        if self.is_busy() {
            return self.capture(NavAction::StepBack);
        }
        match self.state.history.prev_entry() {
            Some((index, title)) => {
                let title = title.to_string();
                self.begin_step(title, HistoryUpdate::ReplaceAt(index))
            }
            None => Directive::Idle,
        }
    }

    pub fn go_forward_one(&mut self) -> Directive {
        if self.is_busy() {
            return self.capture(NavAction::StepForward);
        }
        match self.state.history.next_entry() {
            Some((index, title)) => {
                let title = title.to_string();
                self.begin_step(title, HistoryUpdate::ReplaceAt(index))
            }
            None => Directive::Idle,
        }
    }

    /// Travel to the history entry at `index`, moving the cursor there on
    /// commit. The range is checked when the jump runs, so a jump captured
    /// as pending is validated against the history at replay time.
    pub fn jump_to_breadcrumb(&mut self, index: usize) -> Result<Directive, NavFault> {
        if self.is_busy() {
            return Ok(self.capture(NavAction::JumpTo { index }));
        }
        let len = self.state.history.len();
        let title = self
            .state
            .history
            .get(index)
            .ok_or(NavFault::HistoryIndexOutOfRange { index, len })?
            .to_string();
        if self.state.history.cursor() == Some(index) {
            return Ok(Directive::Idle);
        }
        Ok(self.begin_step(title, HistoryUpdate::ReplaceAt(index)))
    }

    /// Run `action` now, or capture it as the pending action if a travel is
    /// in flight.
    pub fn queue_nav(&mut self, action: NavAction) -> Result<Directive, NavFault> {
        if self.is_busy() {
            return Ok(self.capture(action));
        }
        self.dispatch(action)
    }

    pub fn dispatch(&mut self, action: NavAction) -> Result<Directive, NavFault> {
        match action {
            NavAction::StepBack => {
                if !self.is_busy() && self.state.history.prev_entry().is_none() {
                    return Err(NavFault::NoHistoryEntry);
                }
                Ok(self.go_back_one())
            }
            NavAction::StepForward => {
                if !self.is_busy() && self.state.history.next_entry().is_none() {
                    return Err(NavFault::NoHistoryEntry);
                }
                Ok(self.go_forward_one())
            }
            NavAction::JumpTo { index } => self.jump_to_breadcrumb(index),
            NavAction::TravelTo {
                title,
                add_to_history,
            } => self.travel_to_neighbor(&title, add_to_history),
        }
    }

    /// Switch between outlinks and backlinks. The current center is
    /// re-fetched in the new mode, after the travel in flight if any.
    pub fn set_show_backlinks(&mut self, show: bool) -> Directive {
        if self.state.show_backlinks == show {
            return Directive::Idle;
        }
        self.state.show_backlinks = show;
        let Some(center) = self.state.current_center.clone() else {
            return Directive::Idle;
        };
        if self.is_busy() {
            self.refresh_after = true;
            return Directive::Queued;
        }
        self.begin_refresh(center)
    }

    /// Turn the ghost trail on or off. Turning it off removes every cluster
    /// except the current one (and the incoming one during an animation).
    ///
    /// Under [`ReturnPolicy::TrailOnly`] the current cluster is rebuilt so its
    /// return node follows the new mode. During an animation the incoming
    /// cluster is rebuilt when it commits instead.
    pub fn set_trail_mode(&mut self, enabled: bool) -> EffectSet {
        if self.state.trail_enabled == enabled {
            return EffectSet::NONE;
        }
        self.state.trail_enabled = enabled;
        info!(enabled, "Trail mode changed");

        let mut effects = EffectSet::NONE;
        if !enabled {
            let mut keep: Vec<&str> = Vec::new();
            if let Some(c) = self.state.current_center.as_deref() {
                keep.push(c);
            }
            if let Phase::Animating(anim) = &self.phase {
                keep.push(anim.plan.incoming.title.as_str());
            }
            let removed = self.clusters.retain_only(&keep);
            if !removed.is_empty() {
                effects |= EffectSet::CLUSTER_DISCARDED;
            }
            for title in removed {
                self.events.push(NavEvent::ClusterRemoved { title });
            }
        }

        if self.config.return_policy == ReturnPolicy::TrailOnly {
            if matches!(self.phase, Phase::Animating(_)) {
                self.rebuild_after = true;
            } else if let Some(set) = self.current_set.clone() {
                self.rebuild_current(set);
                effects |= EffectSet::CLUSTER_BUILT;
            }
        }
        effects
    }

    // =========================================================================
    // DRIVER HOOKS
    // =========================================================================

    /// Feed the result of a [`Directive::Fetch`] back in.
    ///
    /// A failed fetch aborts the travel without touching history or the
    /// current center and emits one error notice. Either way the pending
    /// action, if any, is replayed and its directive returned.
    pub fn on_fetched<E: fmt::Display>(
        &mut self,
        id: TravelId,
        result: Result<NeighborSet, E>,
    ) -> Result<Directive, NavFault> {
        let inflight = match std::mem::take(&mut self.phase) {
            Phase::Fetching(f) if f.request.id == id => f,
            other => {
                self.phase = other;
                return Err(NavFault::StaleTravel(id.0));
            }
        };

        let set = match result {
            Ok(set) => set,
            Err(e) => {
                let fault = NavFault::Provider(e.to_string());
                warn!(travel = %id, title = %inflight.request.title, error = %fault, "Neighbor fetch failed");
                self.state.is_animating = false;
                self.events.push(NavEvent::Notice(Notice::error(format!(
                    "Could not load \"{}\": {}",
                    inflight.request.title, fault
                ))));
                return Ok(self.after_settle());
            }
        };

        debug!(
            travel = %id,
            requested = %inflight.request.title,
            canonical = %set.center.title,
            neighbors = set.neighbors.len(),
            "Neighbor set fetched"
        );

        match inflight.request.kind {
            TravelKind::Root => {
                self.commit_root(set);
                Ok(self.after_settle())
            }
            TravelKind::Refresh => {
                self.commit_refresh(set);
                Ok(self.after_settle())
            }
            TravelKind::Step { history } => {
                if self.state.current_center.as_deref() == Some(set.center.title.as_str()) {
                    self.commit_in_place(set, history);
                    return Ok(self.after_settle());
                }
                Ok(self.start_animation(id, inflight.direction, set, history))
            }
        }
    }

    /// Advance the running transition by `dt`.
    ///
    /// Returns `None` while the animation continues (or when nothing is
    /// animating) and `Some(next)` once the travel has committed, where
    /// `next` is the directive of the replayed pending action.
    pub fn tick(&mut self, dt: Duration) -> Option<Directive> {
        let Phase::Animating(anim) = &mut self.phase else {
            return None;
        };
        let frame = anim.transition.advance(dt);
        self.camera_target = frame.camera_target;
        self.events.push(NavEvent::Frame(frame));
        if !frame.done {
            return None;
        }
        if let Phase::Animating(anim) = std::mem::take(&mut self.phase) {
            self.commit_step(*anim);
        }
        Some(self.after_settle())
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    fn next_travel_id(&mut self) -> TravelId {
        let id = TravelId(self.next_id);
        self.next_id += 1;
        id
    }

    fn capture(&mut self, action: NavAction) -> Directive {
        if let Some(old) = &self.state.pending_nav {
            debug!(?old, new = ?action, "Overwriting pending navigation");
        }
        self.state.pending_nav = Some(action);
        Directive::Queued
    }

    fn begin(&mut self, title: String, mode: LinkMode, kind: TravelKind, direction: Vec3) -> Directive {
        let request = TravelRequest {
            id: self.next_travel_id(),
            title: title.clone(),
            mode,
            kind,
        };
        debug!(travel = %request.id, title = %title, mode = %mode, kind = ?kind, "Travel requested");
        self.state.is_animating = true;
        self.phase = Phase::Fetching(InFlight {
            request: request.clone(),
            direction,
        });
        self.events.push(NavEvent::Loading { title });
        Directive::Fetch(request)
    }

    fn begin_step(&mut self, title: String, update: HistoryUpdate) -> Directive {
        let direction = self.provisional_direction(&title);
        let mode = self.state.link_mode();
        self.begin(title, mode, TravelKind::Step { history: update }, direction)
    }

    fn begin_refresh(&mut self, center: String) -> Directive {
        let mode = self.state.link_mode();
        self.begin(center, mode, TravelKind::Refresh, Vec3::ZERO)
    }

    /// Stored trail position, then the target's node in the current cluster,
    /// then the title hash.
    fn provisional_direction(&self, title: &str) -> Vec3 {
        let origin = self.current_position();
        if self.state.trail_enabled {
            if let Some(dir) = self
                .clusters
                .position_of(title)
                .and_then(|p| (p - origin).normalized())
            {
                return dir;
            }
        }
        self.current_cluster()
            .and_then(|c| c.layout.node(title))
            .and_then(|n| n.position.normalized())
            .unwrap_or_else(|| direction_from_title(title))
    }

    fn current_position(&self) -> Vec3 {
        self.current_cluster()
            .map(|c| c.world_position)
            .unwrap_or(self.camera_target)
    }

    fn return_for(&self, previous: Option<String>) -> Option<String> {
        match self.config.return_policy {
            ReturnPolicy::Always => previous,
            ReturnPolicy::TrailOnly if self.state.trail_enabled => previous,
            ReturnPolicy::TrailOnly | ReturnPolicy::Never => None,
        }
    }

    fn layout_at(&self, set: &NeighborSet, world: Vec3, return_to: Option<&str>) -> ClusterPlacement {
        let ret = return_to.map(|title| ReturnNeighbor {
            title,
            offset: self.clusters.position_of(title).map(|p| p - world),
        });
        let layout = build_cluster_layout(&self.config.layout, set, ret, &self.state.visited);
        ClusterPlacement::new(world, layout)
    }

    fn start_animation(
        &mut self,
        id: TravelId,
        direction: Vec3,
        set: NeighborSet,
        history: HistoryUpdate,
    ) -> Directive {
        let from = self.state.current_center.clone().unwrap_or_default();
        let origin = self.current_position();
        let canonical = set.center.title.clone();

        let stored = if self.state.trail_enabled {
            self.clusters.position_of(&canonical)
        } else {
            None
        };
        let reanchored = stored.is_some();
        let world = match stored {
            Some(pos) => {
                debug!(title = %canonical, position = %pos, "Re-anchoring at trail position");
                self.clusters.retire(&canonical);
                self.events.push(NavEvent::ClusterRemoved {
                    title: canonical.clone(),
                });
                pos
            }
            None => origin + direction * self.config.layout.segment_distance,
        };

        let return_to = self.return_for(Some(from.clone()));
        let incoming = self.layout_at(&set, world, return_to.as_deref());
        self.clusters.insert(incoming.clone());

        let plan = TransitionPlan {
            travel: id,
            outgoing: self.clusters.contains(&from).then(|| from.clone()),
            incoming,
            camera_start: self.camera_target,
            camera_end: world,
            duration_ms: self.config.transition.duration_ms,
        };
        let transition = Transition::new(&self.config.transition, plan.camera_start, plan.camera_end);
        self.events
            .push(NavEvent::TransitionStarted(Box::new(plan.clone())));
        self.phase = Phase::Animating(Box::new(Animation {
            plan: plan.clone(),
            transition,
            set,
            history,
            from,
            reanchored,
        }));
        Directive::Animate(Box::new(plan))
    }

    fn apply_history(&mut self, update: HistoryUpdate, title: &str) -> EffectSet {
        let mut effects = EffectSet::HISTORY_CHANGED;
        match self.state.history.apply(update, title) {
            Ok(true) => effects |= EffectSet::FORWARD_TRUNCATED,
            Ok(false) => {}
            Err(fault) => {
                warn!(error = %fault, title = %title, "History update out of range, appending");
                self.state.history.push(title);
            }
        }
        effects
    }

    fn mark_visited(&mut self, title: &str) -> EffectSet {
        if self.state.visited.insert(title.to_string()) {
            EffectSet::VISITED_CHANGED
        } else {
            EffectSet::NONE
        }
    }

    fn settle(&mut self, center: String, mut effects: EffectSet) {
        self.state.is_animating = false;
        if self.state.pending_nav.is_some() {
            effects |= EffectSet::PENDING_REPLAYED;
        }
        info!(center = %center, history_index = self.state.history.index(), ?effects, "Travel committed");
        self.events.push(NavEvent::Committed { center, effects });
    }

    fn commit_step(&mut self, anim: Animation) {
        let Animation {
            plan,
            set,
            history,
            from,
            reanchored,
            ..
        } = anim;
        let canonical = plan.incoming.title.clone();
        let previous = (!from.is_empty()).then(|| from.clone());

        let mut effects = EffectSet::CENTER_CHANGED | EffectSet::CLUSTER_BUILT | EffectSet::CAMERA_CHANGED;
        effects |= self.apply_history(history, &canonical);
        self.state.current_center = Some(canonical.clone());
        effects |= self.mark_visited(&canonical);
        if reanchored {
            effects |= EffectSet::REANCHORED;
        }

        if self.clusters.contains(&from) {
            if self.state.trail_enabled {
                let evicted = self.clusters.ghost(&from);
                effects |= EffectSet::CLUSTER_GHOSTED;
                self.events.push(NavEvent::ClusterGhosted { title: from });
                for title in evicted {
                    effects |= EffectSet::GHOST_EVICTED;
                    self.events.push(NavEvent::ClusterRemoved { title });
                }
            } else {
                self.clusters.retire(&from);
                effects |= EffectSet::CLUSTER_DISCARDED;
                self.events.push(NavEvent::ClusterRemoved { title: from.clone() });
            }
        }

        self.camera_target = plan.camera_end;
        self.current_return = previous;
        if std::mem::take(&mut self.rebuild_after) {
            self.rebuild_current(set);
            effects |= EffectSet::CLUSTER_BUILT;
        } else {
            self.current_set = Some(set);
        }
        self.settle(canonical, effects);
    }

    fn commit_root(&mut self, set: NeighborSet) {
        let canonical = set.center.title.clone();
        self.clusters.clear();
        self.events.push(NavEvent::SceneReset);

        self.state.history.clear();
        self.state.history.push(canonical.clone());
        self.state.visited.clear();
        self.state.visited.insert(canonical.clone());
        self.state.current_center = Some(canonical.clone());
        self.state.show_backlinks = false;
        self.refresh_after = false;
        self.rebuild_after = false;

        let placement = self.layout_at(&set, Vec3::ZERO, None);
        self.clusters.insert(placement.clone());
        self.events.push(NavEvent::ClusterBuilt(Box::new(placement)));
        self.camera_target = Vec3::ZERO;
        self.current_return = None;
        self.current_set = Some(set);

        let effects = EffectSet::SCENE_RESET
            | EffectSet::CENTER_CHANGED
            | EffectSet::HISTORY_CHANGED
            | EffectSet::VISITED_CHANGED
            | EffectSet::CLUSTER_BUILT
            | EffectSet::CAMERA_CHANGED;
        self.settle(canonical, effects);
    }

    fn commit_refresh(&mut self, set: NeighborSet) {
        let canonical = set.center.title.clone();
        let mut effects = EffectSet::CLUSTER_BUILT;
        if self.state.current_center.as_deref() != Some(canonical.as_str()) {
            if let Some(cursor) = self.state.history.cursor() {
                effects |= self.apply_history(HistoryUpdate::ReplaceAt(cursor), &canonical);
            }
            effects |= EffectSet::CENTER_CHANGED;
        }
        self.rebuild_current(set);
        self.settle(canonical, effects);
    }

    /// A step whose target resolved to the current center: rebuild in place,
    /// no animation. Jumps still move the cursor; appends are dropped.
    fn commit_in_place(&mut self, set: NeighborSet, history: HistoryUpdate) {
        let canonical = set.center.title.clone();
        let mut effects = EffectSet::CLUSTER_BUILT;
        if let HistoryUpdate::ReplaceAt(_) = history {
            effects |= self.apply_history(history, &canonical);
        }
        self.rebuild_current(set);
        self.settle(canonical, effects);
    }

    /// Replace the current cluster with a fresh layout of `set` at the same
    /// world position.
    fn rebuild_current(&mut self, set: NeighborSet) {
        let world = self.current_position();
        if let Some(old) = self.state.current_center.take() {
            self.clusters.retire(&old);
        }
        let canonical = set.center.title.clone();
        self.state.current_center = Some(canonical.clone());
        self.state.visited.insert(canonical);

        let return_to = self.return_for(self.current_return.clone());
        let placement = self.layout_at(&set, world, return_to.as_deref());
        self.clusters.insert(placement.clone());
        self.events
            .push(NavEvent::ClusterRebuilt(Box::new(placement)));
        self.current_set = Some(set);
    }

    /// Replay the pending action, or the deferred refresh, once idle.
    fn after_settle(&mut self) -> Directive {
        if let Some(action) = self.state.pending_nav.take() {
            self.refresh_after = false;
            debug!(?action, "Replaying pending navigation");
            return match self.dispatch(action) {
                Ok(d) => d,
                Err(fault) => {
                    warn!(error = %fault, "Pending navigation rejected");
                    self.events
                        .push(NavEvent::Notice(Notice::error(fault.to_string())));
                    Directive::Idle
                }
            };
        }
        if std::mem::take(&mut self.refresh_after) {
            if let Some(center) = self.state.current_center.clone() {
                return self.begin_refresh(center);
            }
        }
        Directive::Idle
    }
}

fn valid_title(title: &str) -> Result<String, NavFault> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(NavFault::InvalidTitle(title.to_string()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::NodeKind;
    use crate::types::CenterInfo;
    use pretty_assertions::assert_eq;

    fn set_for(title: &str) -> NeighborSet {
        NeighborSet::new(
            CenterInfo::titled(title),
            (0..4).map(|i| format!("{title}/{i}")).collect(),
            LinkMode::Outlinks,
        )
    }

    /// Run a directive to completion with a provider that always succeeds.
    fn drive(nav: &mut Navigator, mut d: Directive) {
        loop {
            d = match d {
                Directive::Fetch(req) => nav
                    .on_fetched(req.id, Ok::<_, String>(set_for(&req.title)))
                    .unwrap(),
                Directive::Animate(_) => loop {
                    if let Some(next) = nav.tick(Duration::from_millis(500)) {
                        break next;
                    }
                },
                Directive::Idle | Directive::Queued => return,
            };
        }
    }

    fn rooted(title: &str) -> Navigator {
        rooted_with(title, ReturnPolicy::default())
    }

    fn rooted_with(title: &str, return_policy: ReturnPolicy) -> Navigator {
        let mut nav = Navigator::new(NavigatorConfig {
            return_policy,
            ..NavigatorConfig::default()
        });
        let d = nav.start_fresh_search(title).unwrap();
        drive(&mut nav, d);
        nav.drain_events();
        nav
    }

    fn go(nav: &mut Navigator, title: &str) {
        let d = nav.travel_to_neighbor(title, true).unwrap();
        drive(nav, d);
    }

    #[test]
    fn seed_to_x_scenario() {
        let mut nav = rooted("Seed");
        go(&mut nav, "X");

        let snap = nav.snapshot();
        assert_eq!(snap.history, vec!["Seed".to_string(), "X".to_string()]);
        assert_eq!(snap.history_index, 1);
        assert!(snap.visited.contains(&"Seed".to_string()));
        assert!(snap.visited.contains(&"X".to_string()));
        assert!(!snap.is_animating);
        assert_eq!(snap.current_center.as_deref(), Some("X"));
    }

    #[test]
    fn travel_requires_a_center() {
        let mut nav = Navigator::new(NavigatorConfig::default());
        assert_eq!(nav.travel_to_neighbor("X", true), Err(NavFault::NoCenter));
        assert_eq!(
            nav.start_fresh_search("   "),
            Err(NavFault::InvalidTitle("   ".into()))
        );
    }

    #[test]
    fn fetch_failure_leaves_state_untouched() {
        let mut nav = rooted("Seed");
        go(&mut nav, "X");
        let before = nav.snapshot();

        let Directive::Fetch(req) = nav.travel_to_neighbor("Y", true).unwrap() else {
            panic!("expected fetch");
        };
        assert!(nav.state().is_animating());
        let next = nav.on_fetched(req.id, Err("503")).unwrap();
        assert_eq!(next, Directive::Idle);

        let after = nav.snapshot();
        assert_eq!(after, before);
        let notices: Vec<_> = nav
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                NavEvent::Notice(n) => Some(n.message),
                _ => None,
            })
            .collect();
        assert_eq!(
            notices,
            vec![format!("Could not load \"Y\": {}", NavFault::Provider("503".into()))]
        );
    }

    #[test]
    fn second_travel_is_captured_not_run() {
        let mut nav = rooted("Seed");
        let Directive::Fetch(req) = nav.travel_to_neighbor("X", true).unwrap() else {
            panic!("expected fetch");
        };

        assert_eq!(nav.travel_to_neighbor("Y", true).unwrap(), Directive::Queued);
        assert_eq!(nav.go_back_one(), Directive::Queued);
        assert_eq!(nav.state().current_center(), Some("Seed"));
        assert_eq!(nav.state().pending_nav(), Some(&NavAction::StepBack));

        let d = nav.on_fetched(req.id, Ok::<_, String>(set_for("X"))).unwrap();
        drive(&mut nav, d);

        // X committed, then the pending step back returned to Seed.
        let snap = nav.snapshot();
        assert_eq!(snap.current_center.as_deref(), Some("Seed"));
        assert_eq!(snap.history, vec!["Seed".to_string(), "X".to_string()]);
        assert_eq!(snap.history_index, 0);
        assert!(snap.pending_nav.is_none());
    }

    #[test]
    fn forward_branch_is_cut() {
        let mut nav = rooted("A");
        go(&mut nav, "B");
        go(&mut nav, "C");
        let d = nav.go_back_one();
        drive(&mut nav, d);
        let d = nav.go_back_one();
        drive(&mut nav, d);
        assert_eq!(nav.snapshot().history_index, 0);

        go(&mut nav, "D");
        let snap = nav.snapshot();
        assert_eq!(snap.history, vec!["A".to_string(), "D".to_string()]);
        assert_eq!(snap.history_index, 1);
    }

    #[test]
    fn step_is_not_committed_until_fetched() {
        let mut nav = rooted("A");
        go(&mut nav, "B");
        go(&mut nav, "C");

        assert!(nav.go_back_one().accepted());
        let snap = nav.snapshot();
        assert_eq!(snap.history_index, 2);
        assert!(snap.is_animating);

        assert_eq!(nav.jump_to_breadcrumb(0).unwrap(), Directive::Queued);
        assert_eq!(
            nav.state().pending_nav(),
            Some(&NavAction::JumpTo { index: 0 })
        );
    }

    #[test]
    fn jump_to_breadcrumb_moves_cursor() {
        let mut nav = rooted("A");
        go(&mut nav, "B");
        go(&mut nav, "C");

        let d = nav.jump_to_breadcrumb(0).unwrap();
        drive(&mut nav, d);
        let snap = nav.snapshot();
        assert_eq!(snap.history.len(), 3);
        assert_eq!(snap.history_index, 0);
        assert_eq!(snap.current_center.as_deref(), Some("A"));
        assert!(snap.can_go_forward());

        assert_eq!(nav.jump_to_breadcrumb(0).unwrap(), Directive::Idle);
        assert_eq!(
            nav.jump_to_breadcrumb(9),
            Err(NavFault::HistoryIndexOutOfRange { index: 9, len: 3 })
        );

        let d = nav.go_forward_one();
        drive(&mut nav, d);
        assert_eq!(nav.snapshot().current_center.as_deref(), Some("B"));
    }

    #[test]
    fn go_back_at_root_is_rejected() {
        let mut nav = rooted("A");
        assert!(!nav.go_back_one().accepted());
        assert!(!nav.go_forward_one().accepted());
    }

    #[test]
    fn queued_step_past_either_end_is_a_fault() {
        let mut nav = rooted("A");
        assert_eq!(nav.queue_nav(NavAction::StepBack), Err(NavFault::NoHistoryEntry));
        assert_eq!(nav.queue_nav(NavAction::StepForward), Err(NavFault::NoHistoryEntry));
    }

    #[test]
    fn replayed_step_past_the_end_emits_a_notice() {
        let mut nav = rooted("A");
        let Directive::Fetch(req) = nav.travel_to_neighbor("B", true).unwrap() else {
            panic!("expected fetch");
        };
        assert_eq!(nav.go_forward_one(), Directive::Queued);
        let d = nav.on_fetched(req.id, Ok::<_, String>(set_for("B"))).unwrap();
        drive(&mut nav, d);

        let errors: Vec<_> = nav
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                NavEvent::Notice(n) => Some(n.message),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![NavFault::NoHistoryEntry.to_string()]);
        assert_eq!(nav.snapshot().current_center.as_deref(), Some("B"));
    }

    #[test]
    fn travelling_to_the_previous_entry_appends() {
        let mut nav = rooted("A");
        go(&mut nav, "B");
        go(&mut nav, "A");

        let snap = nav.snapshot();
        assert_eq!(
            snap.history,
            vec!["A".to_string(), "B".to_string(), "A".to_string()]
        );
        assert_eq!(snap.history_index, 2);
        assert_eq!(snap.chain_prev.as_deref(), Some("B"));

        go(&mut nav, "C");
        go(&mut nav, "A");
        assert_eq!(nav.snapshot().history.len(), 5);
        assert_eq!(nav.snapshot().history_index, 4);
    }

    #[test]
    fn return_neighbor_points_back() {
        let mut nav = rooted("A");
        go(&mut nav, "B");
        let cluster = nav.current_cluster().unwrap();
        let ret = cluster.layout.return_node().unwrap();
        assert_eq!(ret.title, "A");
        assert_eq!(ret.kind, NodeKind::Return);
        // The return node sits where A's cluster actually is.
        assert_eq!(
            cluster.world_position_of("A"),
            nav.clusters().position_of("A")
        );
    }

    #[test]
    fn never_policy_has_no_return_node() {
        let mut nav = rooted_with("A", ReturnPolicy::Never);
        go(&mut nav, "B");
        let cluster = nav.current_cluster().unwrap();
        assert!(cluster.layout.return_node().is_none());
        assert!(cluster.layout.node("A").is_none());

        // Toggling the trail does not bring it back.
        nav.set_trail_mode(false);
        nav.set_trail_mode(true);
        assert!(nav.current_cluster().unwrap().layout.return_node().is_none());
    }

    #[test]
    fn trail_only_return_node_follows_trail_mode() {
        let mut nav = rooted_with("A", ReturnPolicy::TrailOnly);
        go(&mut nav, "B");
        assert_eq!(
            nav.current_cluster().unwrap().layout.return_node().map(|n| n.title.as_str()),
            Some("A")
        );

        let effects = nav.set_trail_mode(false);
        assert!(effects.contains(EffectSet::CLUSTER_BUILT));
        assert!(nav.current_cluster().unwrap().layout.return_node().is_none());
        let rebuilt = nav
            .drain_events()
            .into_iter()
            .any(|e| matches!(e, NavEvent::ClusterRebuilt(c) if c.title == "B"));
        assert!(rebuilt);

        go(&mut nav, "C");
        assert!(nav.current_cluster().unwrap().layout.return_node().is_none());

        nav.set_trail_mode(true);
        assert_eq!(
            nav.current_cluster().unwrap().layout.return_node().map(|n| n.title.as_str()),
            Some("B")
        );
    }

    #[test]
    fn trail_only_toggle_during_animation_rebuilds_on_commit() {
        let mut nav = rooted_with("A", ReturnPolicy::TrailOnly);
        let Directive::Fetch(req) = nav.travel_to_neighbor("B", true).unwrap() else {
            panic!("expected fetch");
        };
        let Directive::Animate(plan) = nav.on_fetched(req.id, Ok::<_, String>(set_for("B"))).unwrap() else {
            panic!("expected animation");
        };
        assert!(plan.incoming.layout.return_node().is_some());

        // Nothing to discard or rebuild while B is still animating in.
        assert_eq!(nav.set_trail_mode(false), EffectSet::NONE);
        assert!(nav.clusters().get("B").unwrap().layout.return_node().is_some());
        drive(&mut nav, Directive::Animate(plan));

        assert_eq!(nav.state().current_center(), Some("B"));
        assert!(nav.current_cluster().unwrap().layout.return_node().is_none());
        let rebuilt = nav
            .drain_events()
            .into_iter()
            .any(|e| matches!(e, NavEvent::ClusterRebuilt(c) if c.title == "B"));
        assert!(rebuilt);
    }

    #[test]
    fn trail_only_toggle_during_fetch_rebuilds_now() {
        let mut nav = rooted_with("A", ReturnPolicy::TrailOnly);
        go(&mut nav, "B");
        let Directive::Fetch(req) = nav.travel_to_neighbor("C", true).unwrap() else {
            panic!("expected fetch");
        };
        nav.set_trail_mode(false);
        assert!(nav.current_cluster().unwrap().layout.return_node().is_none());

        let d = nav.on_fetched(req.id, Ok::<_, String>(set_for("C"))).unwrap();
        drive(&mut nav, d);
        assert!(nav.current_cluster().unwrap().layout.return_node().is_none());
    }

    #[test]
    fn trail_ghosts_are_bounded() {
        let mut nav = rooted("T0");
        for i in 1..=8 {
            go(&mut nav, &format!("T{i}"));
        }
        let snap = nav.snapshot();
        assert_eq!(snap.ghosts.len(), MAX_GHOSTS);
        assert_eq!(snap.ghosts.first().map(String::as_str), Some("T3"));
        assert_eq!(nav.clusters().len(), MAX_GHOSTS + 1);
        assert!(nav.clusters().position_of("T0").is_none());
    }

    #[test]
    fn revisit_reanchors_at_trail_position() {
        let mut nav = rooted("A");
        go(&mut nav, "B");
        go(&mut nav, "C");
        let b_pos = nav.clusters().position_of("B").unwrap();

        let d = nav.jump_to_breadcrumb(1).unwrap();
        drive(&mut nav, d);
        assert_eq!(nav.clusters().position_of("B"), Some(b_pos));
        assert_eq!(nav.camera_target(), b_pos);

        let reanchored = nav.drain_events().into_iter().any(|e| {
            matches!(e, NavEvent::Committed { effects, .. } if effects.contains(EffectSet::REANCHORED))
        });
        assert!(reanchored);
    }

    #[test]
    fn trail_off_discards_outgoing() {
        let mut nav = rooted("A");
        go(&mut nav, "B");
        assert_eq!(nav.clusters().len(), 2);

        let effects = nav.set_trail_mode(false);
        assert!(effects.contains(EffectSet::CLUSTER_DISCARDED));
        assert_eq!(nav.clusters().len(), 1);
        assert!(nav.snapshot().ghosts.is_empty());

        go(&mut nav, "C");
        assert_eq!(nav.clusters().len(), 1);
        assert!(nav.trail_points().is_empty());
    }

    #[test]
    fn backlinks_toggle_refreshes_current() {
        let mut nav = rooted("A");
        let Directive::Fetch(req) = nav.set_show_backlinks(true) else {
            panic!("expected refresh fetch");
        };
        assert_eq!(req.kind, TravelKind::Refresh);
        assert_eq!(req.mode, LinkMode::Backlinks);
        assert_eq!(nav.set_show_backlinks(true), Directive::Idle);

        nav.on_fetched(req.id, Ok::<_, String>(set_for("A"))).unwrap();
        let snap = nav.snapshot();
        assert!(snap.show_backlinks);
        assert_eq!(snap.history, vec!["A".to_string()]);
        assert!(!snap.is_animating);
    }

    #[test]
    fn backlinks_toggle_while_busy_refreshes_after() {
        let mut nav = rooted("A");
        let Directive::Fetch(req) = nav.travel_to_neighbor("B", true).unwrap() else {
            panic!("expected fetch");
        };
        assert_eq!(nav.set_show_backlinks(true), Directive::Queued);
        let d = nav.on_fetched(req.id, Ok::<_, String>(set_for("B"))).unwrap();
        let Directive::Animate(_) = d else {
            panic!("expected animation");
        };
        let next = loop {
            if let Some(n) = nav.tick(Duration::from_millis(700)) {
                break n;
            }
        };
        let Directive::Fetch(refresh) = next else {
            panic!("expected deferred refresh");
        };
        assert_eq!(refresh.title, "B");
        assert_eq!(refresh.mode, LinkMode::Backlinks);
    }

    #[test]
    fn stale_results_are_rejected() {
        let mut nav = rooted("A");
        let Directive::Fetch(req) = nav.travel_to_neighbor("B", true).unwrap() else {
            panic!("expected fetch");
        };
        let bogus = TravelId(req.id.0 + 100);
        assert_eq!(
            nav.on_fetched(bogus, Ok::<_, String>(set_for("B"))),
            Err(NavFault::StaleTravel(bogus.0))
        );
        assert!(nav.in_flight().is_some());
    }

    #[test]
    fn fresh_search_resets_on_success_only() {
        let mut nav = rooted("A");
        go(&mut nav, "B");

        let Directive::Fetch(req) = nav.start_fresh_search("Z").unwrap() else {
            panic!("expected fetch");
        };
        assert_eq!(nav.start_fresh_search("Q"), Err(NavFault::Busy));
        nav.on_fetched(req.id, Err("offline")).unwrap();
        assert_eq!(nav.snapshot().history.len(), 2);

        let d = nav.start_fresh_search("Z").unwrap();
        drive(&mut nav, d);
        let snap = nav.snapshot();
        assert_eq!(snap.history, vec!["Z".to_string()]);
        assert_eq!(snap.visited, vec!["Z".to_string()]);
        assert_eq!(nav.clusters().len(), 1);
    }

    #[test]
    fn canonical_redirect_to_current_rebuilds_in_place() {
        let mut nav = rooted("A");
        let Directive::Fetch(req) = nav.travel_to_neighbor("Alias of A", true).unwrap() else {
            panic!("expected fetch");
        };
        let d = nav.on_fetched(req.id, Ok::<_, String>(set_for("A"))).unwrap();
        assert_eq!(d, Directive::Idle);
        let snap = nav.snapshot();
        assert_eq!(snap.current_center.as_deref(), Some("A"));
        assert_eq!(snap.history, vec!["A".to_string()]);
        assert!(!snap.is_animating);
        assert_eq!(nav.clusters().len(), 1);
    }

    #[test]
    fn frames_interpolate_camera() {
        let mut nav = rooted("A");
        let Directive::Fetch(req) = nav.travel_to_neighbor("B", true).unwrap() else {
            panic!("expected fetch");
        };
        let Directive::Animate(plan) = nav.on_fetched(req.id, Ok::<_, String>(set_for("B"))).unwrap() else {
            panic!("expected animation");
        };
        assert_eq!(plan.camera_start, Vec3::ZERO);
        assert!((plan.camera_end.length() - nav.config().layout.segment_distance).abs() < 1e-3);

        assert!(nav.tick(Duration::from_millis(100)).is_none());
        assert!(nav.state().is_animating());
        assert_eq!(nav.state().current_center(), Some("A"));
    }
}
