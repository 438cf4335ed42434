//! Events published by the navigator for the presentation layer.

use crate::effect::EffectSet;
use crate::trail::ClusterPlacement;
use crate::transition::TransitionFrame;
use crate::travel::TransitionPlan;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Transient user-visible message (toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone)]
pub enum NavEvent {
    /// A fetch for `title` started (loading indicator).
    Loading { title: String },

    /// All clusters dropped ahead of a fresh session root.
    SceneReset,

    /// A session root cluster was placed.
    ClusterBuilt(Box<ClusterPlacement>),

    /// An existing cluster was laid out again in place (link mode toggle,
    /// trail toggle, or a travel that resolved to the current center).
    ClusterRebuilt(Box<ClusterPlacement>),

    /// A travel animation is starting.
    TransitionStarted(Box<TransitionPlan>),

    /// One interpolated animation frame.
    Frame(TransitionFrame),

    /// Outgoing cluster dimmed and kept in the trail.
    ClusterGhosted { title: String },

    /// Cluster removed from the scene.
    ClusterRemoved { title: String },

    /// A travel, root search or refresh finished.
    Committed { center: String, effects: EffectSet },

    Notice(Notice),
}
