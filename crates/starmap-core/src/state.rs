//! Canonical navigation state.
//!
//! Owned exclusively by the [`Navigator`](crate::Navigator); everything
//! outside the core reads it through [`NavSnapshot`].

use crate::history::{Breadcrumb, History};
use crate::types::LinkMode;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Navigation request that can be captured while a travel is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavAction {
    StepBack,
    StepForward,
    JumpTo { index: usize },
    TravelTo { title: String, add_to_history: bool },
}

#[derive(Debug, Clone)]
pub struct NavigationState {
    pub(crate) current_center: Option<String>,
    pub(crate) history: History,
    pub(crate) visited: HashSet<String>,
    pub(crate) is_animating: bool,
    pub(crate) pending_nav: Option<NavAction>,
    pub(crate) show_backlinks: bool,
    pub(crate) trail_enabled: bool,
}

impl NavigationState {
    pub fn new(trail_enabled: bool) -> Self {
        Self {
            current_center: None,
            history: History::new(),
            visited: HashSet::new(),
            is_animating: false,
            pending_nav: None,
            show_backlinks: false,
            trail_enabled,
        }
    }

    pub fn current_center(&self) -> Option<&str> {
        self.current_center.as_deref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn visited(&self) -> &HashSet<String> {
        &self.visited
    }

    pub fn is_visited(&self, title: &str) -> bool {
        self.visited.contains(title)
    }

    pub fn is_animating(&self) -> bool {
        self.is_animating
    }

    pub fn pending_nav(&self) -> Option<&NavAction> {
        self.pending_nav.as_ref()
    }

    pub fn show_backlinks(&self) -> bool {
        self.show_backlinks
    }

    pub fn trail_enabled(&self) -> bool {
        self.trail_enabled
    }

    pub fn link_mode(&self) -> LinkMode {
        LinkMode::from_backlinks(self.show_backlinks)
    }
}

/// Read-only copy of the navigation state for UI consumers.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavSnapshot {
    pub current_center: Option<String>,
    pub history: Vec<String>,
    pub history_index: isize,
    pub breadcrumbs: Vec<Breadcrumb>,
    /// Sorted for stable output.
    pub visited: Vec<String>,
    pub is_animating: bool,
    pub pending_nav: Option<NavAction>,
    pub show_backlinks: bool,
    pub trail_enabled: bool,
    /// Neighbors of the current cluster in rank order.
    pub neighbors: Vec<String>,
    pub chain_prev: Option<String>,
    /// Ghost titles, oldest first.
    pub ghosts: Vec<String>,
}

impl NavSnapshot {
    pub fn is_settled(&self) -> bool {
        !self.is_animating && self.pending_nav.is_none()
    }

    pub fn can_go_back(&self) -> bool {
        self.history_index > 0
    }

    pub fn can_go_forward(&self) -> bool {
        self.history_index >= 0 && (self.history_index as usize) + 1 < self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_is_empty() {
        let state = NavigationState::new(true);
        assert!(state.current_center().is_none());
        assert_eq!(state.history().index(), -1);
        assert!(!state.is_animating());
        assert_eq!(state.link_mode(), LinkMode::Outlinks);
    }

    #[test]
    fn snapshot_navigation_flags() {
        let snap = NavSnapshot {
            history: vec!["A".into(), "B".into(), "C".into()],
            history_index: 1,
            ..NavSnapshot::default()
        };
        assert!(snap.can_go_back());
        assert!(snap.can_go_forward());
        assert!(snap.is_settled());

        let empty = NavSnapshot {
            history_index: -1,
            ..NavSnapshot::default()
        };
        assert!(!empty.can_go_back());
        assert!(!empty.can_go_forward());
    }
}
