//! Playback Graph
//!
//! The [`PlaybackGraph`] is the arena that owns every clip and mixer node.
//! Nodes are addressed by [`NodeId`], which pairs a slot-map key with the id
//! of the graph that created it, so a handle from one graph is rejected by
//! another instead of silently aliasing an unrelated node.
//!
//! # Frame Driver
//!
//! Each frame the host calls:
//!
//! 1. [`PlaybackGraph::pre_evaluate`]: recompute dirty mixer weights, then
//!    resolve synchronization speeds.
//! 2. The external backend samples and blends using the weights and speeds
//!    it has been sent.
//! 3. [`PlaybackGraph::advance`]: move node times forward.
//!
//! [`PlaybackGraph::update`] runs steps 1 and 3 back to back for hosts that
//! sample afterwards.

pub mod backend;
pub mod node;

pub use backend::{NullBackend, PlaybackBackend};
pub use node::{ClipNode, NodeKind, PlaybackNode};

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

use crate::errors::{BlendError, Result};
use crate::mixer::{MixerKind, MixerState};
use crate::settings::BlendSettings;

new_key_type! {
    pub struct NodeKey;
}

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(1);

/// Identifies one [`PlaybackGraph`] instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u32);

/// Handle to a node, valid only for the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    graph: GraphId,
    key: NodeKey,
}

impl NodeId {
    #[inline]
    #[must_use]
    pub fn graph(self) -> GraphId {
        self.graph
    }

    #[inline]
    #[must_use]
    pub fn key(self) -> NodeKey {
        self.key
    }
}

/// Arena of playback nodes plus the backend they are mirrored into.
pub struct PlaybackGraph {
    id: GraphId,
    pub(crate) nodes: SlotMap<NodeKey, PlaybackNode>,
    pub(crate) settings: BlendSettings,
    pub(crate) backend: Box<dyn PlaybackBackend>,
}

impl fmt::Debug for PlaybackGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackGraph")
            .field("id", &self.id)
            .field("nodes", &self.nodes.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Default for PlaybackGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(BlendSettings::default())
    }

    #[must_use]
    pub fn with_settings(settings: BlendSettings) -> Self {
        Self {
            id: GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed)),
            nodes: SlotMap::with_key(),
            settings,
            backend: Box::new(NullBackend),
        }
    }

    /// Installs the backend that receives structural and per-frame changes.
    #[must_use]
    pub fn with_backend(mut self, backend: impl PlaybackBackend + 'static) -> Self {
        self.backend = Box::new(backend);
        self
    }

    #[inline]
    #[must_use]
    pub fn graph_id(&self) -> GraphId {
        self.id
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &BlendSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `node` belongs to this graph and has not been destroyed.
    #[must_use]
    pub fn contains(&self, node: NodeId) -> bool {
        node.graph == self.id && self.nodes.contains_key(node.key)
    }

    pub fn node(&self, node: NodeId) -> Result<&PlaybackNode> {
        let key = self.key(node)?;
        Ok(&self.nodes[key])
    }

    // ========================================================================
    // Handles
    // ========================================================================

    pub(crate) fn key(&self, node: NodeId) -> Result<NodeKey> {
        if node.graph != self.id {
            return Err(BlendError::ForeignGraph(node));
        }
        if !self.nodes.contains_key(node.key) {
            return Err(BlendError::NodeNotFound(node));
        }
        Ok(node.key)
    }

    pub(crate) fn id(&self, key: NodeKey) -> NodeId {
        NodeId { graph: self.id, key }
    }

    pub(crate) fn mixer_key(&self, node: NodeId) -> Result<NodeKey> {
        let key = self.key(node)?;
        if self.nodes[key].is_mixer() {
            Ok(key)
        } else {
            Err(BlendError::NotAMixer(node))
        }
    }

    // ========================================================================
    // Creation & Destruction
    // ========================================================================

    /// Adds a detached clip node.
    pub fn create_clip(&mut self, clip: ClipNode) -> Result<NodeId> {
        if !clip.length.is_finite() {
            return Err(BlendError::NonFiniteValue { what: "clip length" });
        }
        if !clip.average_velocity.is_finite() {
            return Err(BlendError::NonFiniteValue {
                what: "clip average velocity",
            });
        }
        log::debug!("Creating clip '{}' ({}s)", clip.name, clip.length);
        let key = self.nodes.insert(PlaybackNode::new(NodeKind::Clip(clip)));
        Ok(self.id(key))
    }

    /// Adds a detached mixer with no child slots allocated yet.
    pub fn create_mixer(&mut self, kind: MixerKind) -> NodeId {
        self.create_mixer_with_capacity(kind, 0)
    }

    pub fn create_mixer_with_capacity(&mut self, kind: MixerKind, capacity: usize) -> NodeId {
        let state = MixerState::new(kind, capacity);
        let key = self
            .nodes
            .insert(PlaybackNode::new(NodeKind::Mixer(Box::new(state))));
        log::debug!("Creating {kind:?} mixer with capacity {capacity}");
        self.id(key)
    }

    /// Destroys `node` and everything beneath it, children first.
    pub fn destroy(&mut self, node: NodeId) -> Result<()> {
        let key = self.key(node)?;
        self.detach_key(key);

        let mut order = self.subtree(key);
        order.reverse();
        for key in order {
            if self.nodes.remove(key).is_some() {
                let id = self.id(key);
                log::trace!("Destroy {id:?}");
                self.backend.destroy(id);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    pub fn parent(&self, node: NodeId) -> Result<Option<NodeId>> {
        let key = self.key(node)?;
        Ok(self.nodes[key].parent.map(|parent| self.id(parent)))
    }

    /// Slot of `node` among its parent's children, `None` when detached.
    pub fn index(&self, node: NodeId) -> Result<Option<usize>> {
        let key = self.key(node)?;
        let node = &self.nodes[key];
        Ok(node.parent.map(|_| node.index))
    }

    /// Moves `node` under `parent` at `index`, or detaches it with `None`.
    ///
    /// See [`PlaybackGraph::set_child`] for how `index` is interpreted.
    pub fn set_parent(&mut self, node: NodeId, parent: Option<NodeId>, index: usize) -> Result<()> {
        let key = self.key(node)?;
        match parent {
            Some(parent) => {
                let parent_key = self.mixer_key(parent)?;
                self.attach_at(parent_key, key, index).map(|_| ())
            }
            None => {
                self.detach_key(key);
                Ok(())
            }
        }
    }

    /// Detaches `node` from its parent. Does nothing for a detached node.
    pub fn detach(&mut self, node: NodeId) -> Result<()> {
        self.set_parent(node, None, 0)
    }

    /// Whether `ancestor` is `node` itself or lies on its parent chain.
    pub(crate) fn is_ancestor(&self, ancestor: NodeKey, node: NodeKey) -> bool {
        let mut current = Some(node);
        while let Some(key) = current {
            if key == ancestor {
                return true;
            }
            current = self.nodes.get(key).and_then(|n| n.parent);
        }
        false
    }

    /// `root` followed by every descendant in depth-first pre-order.
    pub(crate) fn subtree(&self, root: NodeKey) -> Vec<NodeKey> {
        let mut order = Vec::new();
        let mut stack: SmallVec<[NodeKey; 16]> = SmallVec::new();
        stack.push(root);
        while let Some(key) = stack.pop() {
            order.push(key);
            if let Some(state) = self.nodes.get(key).and_then(PlaybackNode::mixer) {
                stack.extend(state.children.iter().rev().copied());
            }
        }
        order
    }

    // ========================================================================
    // Node Properties
    // ========================================================================

    pub fn weight(&self, node: NodeId) -> Result<f32> {
        Ok(self.node(node)?.weight)
    }

    /// Sets the raw weight of `node`.
    ///
    /// Under a parametric mixer the value is overwritten at the next weight
    /// recompute.
    pub fn set_weight(&mut self, node: NodeId, weight: f32) -> Result<()> {
        let key = self.key(node)?;
        if !weight.is_finite() {
            return Err(BlendError::NonFiniteValue { what: "weight" });
        }
        let node = &mut self.nodes[key];
        node.weight = weight;
        if let Some(parent) = node.parent {
            let index = node.index;
            let parent_id = self.id(parent);
            self.backend.set_input_weight(parent_id, index, weight);
        }
        Ok(())
    }

    pub fn speed(&self, node: NodeId) -> Result<f32> {
        Ok(self.node(node)?.speed)
    }

    pub fn set_speed(&mut self, node: NodeId, speed: f32) -> Result<()> {
        let key = self.key(node)?;
        if !speed.is_finite() {
            return Err(BlendError::NonFiniteValue { what: "speed" });
        }
        self.nodes[key].speed = speed;
        self.push_speed(key);
        Ok(())
    }

    /// Speed sent to the backend: authored speed times any extrapolation
    /// scale, or the synchronization override.
    pub fn effective_speed(&self, node: NodeId) -> Result<f32> {
        Ok(self.node(node)?.effective_speed())
    }

    pub(crate) fn push_speed(&mut self, key: NodeKey) {
        let speed = self.nodes[key].effective_speed();
        let id = self.id(key);
        self.backend.set_speed(id, speed);
    }

    /// Raw playback time in seconds. For a mixer this is its aggregate
    /// normalized time scaled by its aggregate length.
    pub fn time(&self, node: NodeId) -> Result<f64> {
        let key = self.key(node)?;
        let node = &self.nodes[key];
        if node.is_mixer() {
            let length = f64::from(self.length_of(key));
            Ok(f64::from(self.normalized_time_of(key)) * length)
        } else {
            Ok(node.time)
        }
    }

    /// Sets the raw time. On a mixer this sets the matching normalized time
    /// on every child; a mixer without length is left unchanged.
    pub fn set_time(&mut self, node: NodeId, time: f64) -> Result<()> {
        let key = self.key(node)?;
        if !time.is_finite() {
            return Err(BlendError::NonFiniteValue { what: "time" });
        }
        if self.nodes[key].is_mixer() {
            let length = self.length_of(key);
            if length > 0.0 {
                self.set_normalized_time_key(key, (time / f64::from(length)) as f32);
            }
        } else {
            self.nodes[key].time = time;
        }
        Ok(())
    }

    /// `time / length`, or 0 for a node without length.
    pub fn normalized_time(&self, node: NodeId) -> Result<f32> {
        let key = self.key(node)?;
        Ok(self.normalized_time_of(key))
    }

    pub fn set_normalized_time(&mut self, node: NodeId, normalized_time: f32) -> Result<()> {
        let key = self.key(node)?;
        if !normalized_time.is_finite() {
            return Err(BlendError::NonFiniteValue {
                what: "normalized time",
            });
        }
        self.set_normalized_time_key(key, normalized_time);
        Ok(())
    }

    fn set_normalized_time_key(&mut self, root: NodeKey, normalized_time: f32) {
        for key in self.subtree(root) {
            let node = &mut self.nodes[key];
            if let Some(length) = node.clip().map(|clip| clip.length) {
                node.time = f64::from(normalized_time) * f64::from(length);
            }
        }
    }

    /// Authored length for a clip, weighted average of the children for a
    /// mixer.
    pub fn length(&self, node: NodeId) -> Result<f32> {
        let key = self.key(node)?;
        Ok(self.length_of(key))
    }

    pub fn is_looping(&self, node: NodeId) -> Result<bool> {
        Ok(self.node(node)?.is_looping())
    }

    /// Sets the authored looping flag of a clip and propagates the change to
    /// the looping counts of its ancestors.
    pub fn set_looping(&mut self, node: NodeId, looping: bool) -> Result<()> {
        let key = self.key(node)?;
        let entry = &mut self.nodes[key];
        let NodeKind::Clip(clip) = &mut entry.kind else {
            return Err(BlendError::NotAClip(node));
        };
        if clip.looping == looping {
            return Ok(());
        }
        clip.looping = looping;
        if let Some(parent) = entry.parent {
            self.adjust_looping(parent, if looping { 1 } else { -1 });
        }
        Ok(())
    }

    pub fn is_playing(&self, node: NodeId) -> Result<bool> {
        Ok(self.node(node)?.playing)
    }

    /// Sets the playing state of `node` and everything beneath it.
    pub fn set_playing(&mut self, node: NodeId, playing: bool) -> Result<()> {
        let key = self.key(node)?;
        for key in self.subtree(key) {
            self.nodes[key].playing = playing;
        }
        Ok(())
    }

    // ========================================================================
    // Frame Driver
    // ========================================================================

    fn check_delta_time(delta_time: f32) -> Result<()> {
        if delta_time.is_finite() && delta_time >= 0.0 {
            Ok(())
        } else {
            Err(BlendError::InvalidDeltaTime(delta_time))
        }
    }

    /// Recomputes dirty weights of every mixer, then runs the
    /// synchronization pass of every set.
    ///
    /// A mixer that fails keeps its previous weights and the pass carries on
    /// with the rest of the graph. The first failure is returned afterwards.
    pub fn pre_evaluate(&mut self, delta_time: f32) -> Result<()> {
        Self::check_delta_time(delta_time)?;

        let mixers: Vec<NodeKey> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.is_mixer())
            .map(|(key, _)| key)
            .collect();

        let mut first_error = None;
        for &key in &mixers {
            if let Err(err) = self.recompute_weights_if_dirty(key) {
                log::error!("Failed to resolve weights of {:?}: {err}", self.id(key));
                first_error.get_or_insert(err);
            }
        }
        for &key in &mixers {
            let has_set = self
                .nodes
                .get(key)
                .and_then(PlaybackNode::mixer)
                .is_some_and(|state| !state.synchronized.is_empty());
            if has_set && let Err(err) = self.apply_synchronization(key, delta_time) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Advances the time of every playing clip by `delta_time` scaled by the
    /// effective speeds along its parent chain.
    pub fn advance(&mut self, delta_time: f32) -> Result<()> {
        Self::check_delta_time(delta_time)?;

        let mut stack: Vec<(NodeKey, f32)> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(key, _)| (key, delta_time))
            .collect();

        while let Some((key, parent_delta)) = stack.pop() {
            let node = &mut self.nodes[key];
            if !node.playing {
                continue;
            }
            let local_delta = parent_delta * node.effective_speed();
            match &node.kind {
                NodeKind::Clip(_) => node.time += f64::from(local_delta),
                NodeKind::Mixer(state) => {
                    stack.extend(state.children.iter().map(|&child| (child, local_delta)));
                }
            }
        }
        Ok(())
    }

    /// [`pre_evaluate`](Self::pre_evaluate) followed by
    /// [`advance`](Self::advance).
    ///
    /// Times still advance when a mixer fails to resolve. The failure is
    /// returned once the frame is done.
    pub fn update(&mut self, delta_time: f32) -> Result<()> {
        Self::check_delta_time(delta_time)?;
        let resolved = self.pre_evaluate(delta_time);
        self.advance(delta_time)?;
        resolved
    }
}
