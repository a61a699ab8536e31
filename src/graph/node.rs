use glam::Vec3;

use crate::graph::NodeKey;
use crate::mixer::MixerState;

/// Authored description of a leaf animation.
///
/// The engine never samples the clip; it only tracks the clip's playback
/// time and forwards weight and speed to the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipNode {
    pub name: String,
    /// Authored length in seconds.
    pub length: f32,
    pub looping: bool,
    /// Authored root-motion velocity. Read only; never extracted.
    pub average_velocity: Vec3,
}

impl ClipNode {
    #[must_use]
    pub fn new(name: impl Into<String>, length: f32) -> Self {
        Self {
            name: name.into(),
            length,
            looping: false,
            average_velocity: Vec3::ZERO,
        }
    }

    #[must_use]
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    #[must_use]
    pub fn with_average_velocity(mut self, velocity: Vec3) -> Self {
        self.average_velocity = velocity;
        self
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Clip(ClipNode),
    Mixer(Box<MixerState>),
}

/// A single unit of playback inside a [`PlaybackGraph`].
///
/// # Hierarchy
///
/// - `parent`: owning mixer, `None` for detached / root nodes
/// - `index`: slot among the parent's children, only meaningful while attached
///
/// Prefer the graph-level API for anything that touches the hierarchy; the
/// accessors here are read-only views of hot per-frame data.
///
/// [`PlaybackGraph`]: crate::graph::PlaybackGraph
#[derive(Debug, Clone)]
pub struct PlaybackNode {
    // === Core Hierarchy ===
    pub(crate) parent: Option<NodeKey>,
    pub(crate) index: usize,

    // === Playback State ===
    pub(crate) weight: f32,
    pub(crate) speed: f32,
    /// Speed imposed by the synchronization pass, replacing the authored speed.
    pub(crate) sync_speed: Option<f32>,
    pub(crate) time: f64,
    pub(crate) playing: bool,

    pub(crate) kind: NodeKind,
}

impl PlaybackNode {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            parent: None,
            index: 0,
            weight: 1.0,
            speed: 1.0,
            sync_speed: None,
            time: 0.0,
            playing: true,
            kind,
        }
    }

    /// Raw weight, before scaling by any ancestor.
    #[inline]
    #[must_use]
    pub fn weight(&self) -> f32 {
        self.weight
    }

    /// Authored speed.
    #[inline]
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Speed the backend actually plays this node at.
    #[must_use]
    pub fn effective_speed(&self) -> f32 {
        if let Some(speed) = self.sync_speed {
            return speed;
        }
        match &self.kind {
            NodeKind::Mixer(mixer) => self.speed * mixer.speed_scale,
            NodeKind::Clip(_) => self.speed,
        }
    }

    #[inline]
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether the synchronization pass currently overrides this node's speed.
    #[inline]
    #[must_use]
    pub fn is_speed_overridden(&self) -> bool {
        self.sync_speed.is_some()
    }

    #[inline]
    #[must_use]
    pub fn is_mixer(&self) -> bool {
        matches!(self.kind, NodeKind::Mixer(_))
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    #[must_use]
    pub fn clip(&self) -> Option<&ClipNode> {
        match &self.kind {
            NodeKind::Clip(clip) => Some(clip),
            NodeKind::Mixer(_) => None,
        }
    }

    #[inline]
    #[must_use]
    pub fn mixer(&self) -> Option<&MixerState> {
        match &self.kind {
            NodeKind::Mixer(mixer) => Some(mixer),
            NodeKind::Clip(_) => None,
        }
    }

    #[inline]
    pub(crate) fn mixer_mut(&mut self) -> Option<&mut MixerState> {
        match &mut self.kind {
            NodeKind::Mixer(mixer) => Some(mixer),
            NodeKind::Clip(_) => None,
        }
    }

    /// Whether this node itself reports looping. For mixers this is bubbled
    /// up from the children.
    #[must_use]
    pub fn is_looping(&self) -> bool {
        match &self.kind {
            NodeKind::Clip(clip) => clip.looping,
            NodeKind::Mixer(mixer) => mixer.looping_children > 0,
        }
    }
}
