//! Mixer Nodes
//!
//! A mixer owns an ordered array of child nodes and combines them by weight.
//! Children occupy dense slots: `children[i]` always reports `index == i`,
//! and the backend connection for slot `i` always points at that child.
//!
//! # Child Array
//!
//! - Appending grows the capacity by doubling (at least to
//!   [`BlendSettings::default_child_capacity`]).
//! - Removing shifts every later child down one slot and reconnects it in the
//!   backend at its new index.
//! - Replacing releases the old occupant and connects the new one in place.
//!
//! # Aggregates
//!
//! Length, time and average velocity of a mixer are weighted averages over
//! its children. When the synchronized children carry enough weight they are
//! used on their own, so a mixer reports the cycle its synchronized members
//! are locked to.
//!
//! [`BlendSettings::default_child_capacity`]: crate::settings::BlendSettings::default_child_capacity

pub mod cartesian;
pub mod directional;
pub mod linear;
pub mod parametric;
pub mod sync;

use glam::Vec3;
use smallvec::SmallVec;

use crate::errors::{BlendError, Result};
use crate::graph::{NodeId, NodeKey, PlaybackGraph};
use crate::mixer::parametric::Blend;

/// Blend space of a mixer, chosen when the mixer is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixerKind {
    /// Child weights are set directly with [`PlaybackGraph::set_weight`].
    #[default]
    Manual,
    /// 1D thresholds.
    Linear {
        /// Scale the mixer's speed when the parameter exceeds the highest
        /// threshold.
        extrapolate_speed: bool,
    },
    /// 2D thresholds, Gradient Band Interpolation.
    Cartesian,
    /// 2D thresholds, Gradient Band Interpolation in polar space.
    Directional,
}

/// Mixer-specific state of a [`PlaybackNode`](crate::graph::PlaybackNode).
#[derive(Debug, Clone)]
pub struct MixerState {
    pub(crate) children: Vec<NodeKey>,
    pub(crate) capacity: usize,
    /// Members of the synchronization set. Only populated on the outermost
    /// mixer of a chain.
    pub(crate) synchronized: SmallVec<[NodeKey; 4]>,
    pub(crate) looping_children: usize,
    pub(crate) blend: Blend,
    /// Speed multiplier produced by the last weight recompute.
    pub(crate) speed_scale: f32,
}

impl MixerState {
    pub(crate) fn new(kind: MixerKind, capacity: usize) -> Self {
        let mut blend = Blend::from_kind(kind);
        if let Some(parametric) = blend.parametric_mut() {
            parametric.resize(capacity);
        }
        Self {
            children: Vec::with_capacity(capacity),
            capacity,
            synchronized: SmallVec::new(),
            looping_children: 0,
            blend,
            speed_scale: 1.0,
        }
    }

    #[inline]
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of children currently reporting `is_looping`.
    #[inline]
    #[must_use]
    pub fn looping_children(&self) -> usize {
        self.looping_children
    }

    #[inline]
    #[must_use]
    pub fn blend(&self) -> &Blend {
        &self.blend
    }

    #[inline]
    #[must_use]
    pub fn speed_scale(&self) -> f32 {
        self.speed_scale
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        if capacity > self.children.capacity() {
            self.children.reserve_exact(capacity - self.children.len());
        }
        if let Some(parametric) = self.blend.parametric_mut() {
            parametric.resize(capacity);
        }
    }

    fn mark_dirty(&mut self) {
        if let Some(parametric) = self.blend.parametric_mut() {
            parametric.mark_dirty();
        }
    }
}

// ============================================================================
// Child Array
// ============================================================================

impl PlaybackGraph {
    /// Appends `child` to `mixer` and returns its slot.
    ///
    /// A child owned by another mixer is detached from it first. The child
    /// takes on the mixer's playing state.
    pub fn add_child(&mut self, mixer: NodeId, child: NodeId) -> Result<usize> {
        let mixer_key = self.mixer_key(mixer)?;
        let child_key = self.key(child)?;
        let count = self.count_after_detach(mixer_key, child_key);
        self.attach_at(mixer_key, child_key, count)
    }

    /// Removes `child` from `mixer`.
    ///
    /// If `child` belongs to a different mixer it is detached from that one
    /// instead and a warning is logged.
    pub fn remove_child(&mut self, mixer: NodeId, child: NodeId) -> Result<()> {
        let mixer_key = self.mixer_key(mixer)?;
        let child_key = self.key(child)?;
        match self.nodes[child_key].parent {
            Some(parent) if parent == mixer_key => {}
            Some(parent) => {
                log::warn!(
                    "remove_child: {child:?} is not a child of {mixer:?}; detaching it from {:?} instead",
                    self.id(parent)
                );
            }
            None => {
                log::warn!("remove_child: {child:?} is not attached to any mixer");
                return Ok(());
            }
        }
        self.detach_key(child_key);
        Ok(())
    }

    /// Removes the child in slot `index` and returns it.
    pub fn remove_child_at(&mut self, mixer: NodeId, index: usize) -> Result<NodeId> {
        let mixer_key = self.mixer_key(mixer)?;
        let count = self.nodes[mixer_key].mixer().map_or(0, MixerState::child_count);
        if index >= count {
            return Err(BlendError::IndexOutOfRange { index, count });
        }
        let removed = self.remove_at(mixer_key, index);
        Ok(self.id(removed))
    }

    /// Puts `child` into slot `index` of `mixer`.
    ///
    /// `index == child_count` appends; a lower index replaces the current
    /// occupant, which is detached. If `child` is already attached it is
    /// detached first, and `index` refers to the slots left after that.
    ///
    /// On a parametric mixer a child moved within the same mixer takes its
    /// threshold along, unless it lands on a slot that already has one.
    pub fn set_child(&mut self, mixer: NodeId, index: usize, child: NodeId) -> Result<()> {
        let mixer_key = self.mixer_key(mixer)?;
        let child_key = self.key(child)?;
        self.attach_at(mixer_key, child_key, index).map(|_| ())
    }

    /// Child in slot `index`.
    pub fn child(&self, mixer: NodeId, index: usize) -> Result<NodeId> {
        let key = self.mixer_key(mixer)?;
        let children = &self.mixer_state(key).children;
        children
            .get(index)
            .map(|&child| self.id(child))
            .ok_or(BlendError::IndexOutOfRange {
                index,
                count: children.len(),
            })
    }

    pub fn child_count(&self, mixer: NodeId) -> Result<usize> {
        let key = self.mixer_key(mixer)?;
        Ok(self.mixer_state(key).child_count())
    }

    pub fn child_capacity(&self, mixer: NodeId) -> Result<usize> {
        let key = self.mixer_key(mixer)?;
        Ok(self.mixer_state(key).capacity)
    }

    /// Sets the number of child slots, including threshold storage.
    pub fn set_child_capacity(&mut self, mixer: NodeId, capacity: usize) -> Result<()> {
        let key = self.mixer_key(mixer)?;
        let state = self.mixer_state_mut(key);
        let count = state.child_count();
        if capacity < count {
            return Err(BlendError::CapacityBelowCount { capacity, count });
        }
        if capacity < 2 {
            log::warn!(
                "Mixer {mixer:?} capacity set to {capacity}; a mixer with fewer than two children only passes its input through"
            );
        }
        state.set_capacity(capacity);
        Ok(())
    }

    /// Children in slot order.
    pub fn children(&self, mixer: NodeId) -> Result<impl Iterator<Item = NodeId> + '_> {
        let key = self.mixer_key(mixer)?;
        Ok(self.mixer_state(key).children.iter().map(move |&child| self.id(child)))
    }

    // ========================================================================
    // Internal Structure Edits
    // ========================================================================

    pub(crate) fn mixer_state(&self, key: NodeKey) -> &MixerState {
        self.nodes[key]
            .mixer()
            .unwrap_or_else(|| unreachable!("mixer_key only yields mixers"))
    }

    pub(crate) fn mixer_state_mut(&mut self, key: NodeKey) -> &mut MixerState {
        self.nodes[key]
            .mixer_mut()
            .unwrap_or_else(|| unreachable!("mixer_key only yields mixers"))
    }

    /// Child count `mixer` would have once `child` left its current parent.
    pub(crate) fn count_after_detach(&self, mixer: NodeKey, child: NodeKey) -> usize {
        let count = self.mixer_state(mixer).child_count();
        if self.nodes[child].parent == Some(mixer) {
            count - 1
        } else {
            count
        }
    }

    /// Attaches `child` under `mixer` at `index`, detaching it from any
    /// previous parent. Returns the slot it ends up in.
    pub(crate) fn attach_at(&mut self, mixer: NodeKey, child: NodeKey, index: usize) -> Result<usize> {
        let parent_id = self.id(mixer);
        let child_id = self.id(child);

        if mixer == child || self.is_ancestor(child, mixer) {
            return Err(BlendError::CycleDetected {
                child: child_id,
                parent: parent_id,
            });
        }

        let node = &self.nodes[child];
        if node.parent == Some(mixer) && node.index == index {
            return Ok(index);
        }

        let count = self.count_after_detach(mixer, child);
        if index > count {
            return Err(BlendError::IndexOutOfRange { index, count });
        }

        // A child moving within its own mixer keeps its threshold.
        let carried = if node.parent == Some(mixer) {
            let from = node.index;
            self.mixer_state(mixer)
                .blend
                .parametric()
                .and_then(|parametric| parametric.assigned_threshold(from))
        } else {
            None
        };

        self.detach_key(child);

        if index == count {
            let default_capacity = self.settings.default_child_capacity;
            let state = self.mixer_state_mut(mixer);
            if count >= state.capacity {
                let grown = (state.capacity * 2).max(default_capacity).max(count + 1);
                log::debug!("Mixer {parent_id:?} capacity {} -> {grown}", state.capacity);
                state.set_capacity(grown);
            }
            state.children.push(child);
        } else {
            let previous = self.mixer_state(mixer).children[index];
            self.release_child(mixer, previous);
            self.backend.disconnect(parent_id, index);
            self.mixer_state_mut(mixer).children[index] = child;
        }

        let parent_playing = self.nodes[mixer].playing;
        let node = &mut self.nodes[child];
        node.parent = Some(mixer);
        node.index = index;
        node.playing = parent_playing;
        let looping = node.is_looping();

        let state = self.mixer_state_mut(mixer);
        state.mark_dirty();
        if let (Some(threshold), Some(parametric)) = (carried, state.blend.parametric_mut())
            && parametric.assigned_threshold(index).is_none()
        {
            // Already validated when it was first assigned.
            let _ = parametric.set_threshold(index, threshold);
        }

        if looping {
            self.adjust_looping(mixer, 1);
        }
        self.connect_child(mixer, child, index);
        self.adopt_synchronized(child);
        Ok(index)
    }

    /// Detaches `child` from its parent, if it has one.
    pub(crate) fn detach_key(&mut self, child: NodeKey) {
        let Some(node) = self.nodes.get(child) else {
            return;
        };
        if let Some(parent) = node.parent {
            let index = node.index;
            self.remove_at(parent, index);
        }
    }

    /// Removes slot `index` of `mixer`, shifting later children down.
    pub(crate) fn remove_at(&mut self, mixer: NodeKey, index: usize) -> NodeKey {
        let mixer_id = self.id(mixer);
        let state = self.mixer_state_mut(mixer);
        let old_count = state.children.len();
        let removed = state.children.remove(index);
        if let Some(parametric) = state.blend.parametric_mut() {
            parametric.remove_threshold(index, old_count);
        }
        state.mark_dirty();

        self.release_child(mixer, removed);

        self.backend.disconnect(mixer_id, index);
        for slot in index..old_count - 1 {
            let moved = self.mixer_state(mixer).children[slot];
            self.nodes[moved].index = slot;
            self.backend.disconnect(mixer_id, slot + 1);
            self.connect_child(mixer, moved, slot);
        }

        let remaining = old_count - 1;
        if remaining < 2 {
            log::warn!("Mixer {mixer_id:?} has {remaining} children left; blending needs at least 2");
        }

        log::debug!("Removed {:?} from slot {index} of {mixer_id:?}", self.id(removed));
        removed
    }

    /// Clears the parent link of a child that has already left the array:
    /// looping count, synchronization membership and speed override.
    fn release_child(&mut self, mixer: NodeKey, child: NodeKey) {
        let owner = self.sync_owner(mixer);
        self.prune_synchronized(owner, child);

        let node = &mut self.nodes[child];
        node.parent = None;
        node.index = 0;
        if node.is_looping() {
            self.adjust_looping(mixer, -1);
        }
    }

    fn connect_child(&mut self, mixer: NodeKey, child: NodeKey, index: usize) {
        let parent_id = self.id(mixer);
        let child_id = self.id(child);
        let weight = self.nodes[child].weight;
        log::trace!("Connect {child_id:?} -> {parent_id:?}[{index}]");
        self.backend.connect(parent_id, child_id, index);
        self.backend.set_input_weight(parent_id, index, weight);
    }

    /// Applies a change in the number of looping children and bubbles it up
    /// while ancestors flip between looping and not looping.
    pub(crate) fn adjust_looping(&mut self, mixer: NodeKey, delta: isize) {
        let mut current = mixer;
        let mut delta = delta;
        loop {
            let node = &mut self.nodes[current];
            let was_looping = node.is_looping();
            if let Some(state) = node.mixer_mut() {
                state.looping_children = state.looping_children.saturating_add_signed(delta);
            }
            let now_looping = node.is_looping();
            if was_looping == now_looping {
                return;
            }
            let Some(parent) = node.parent else {
                return;
            };
            delta = if now_looping { 1 } else { -1 };
            current = parent;
        }
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// Children of `mixer` with their weights, restricted to synchronized
    /// children when those carry at least the minimum synchronize weight.
    pub(crate) fn weighted_members(&self, mixer: NodeKey) -> SmallVec<[(NodeKey, f32); 8]> {
        let state = self.mixer_state(mixer);
        let all: SmallVec<[(NodeKey, f32); 8]> = state
            .children
            .iter()
            .map(|&child| (child, self.nodes[child].weight))
            .collect();

        let owner = self.sync_owner(mixer);
        let synchronized = &self.mixer_state(owner).synchronized;
        if synchronized.is_empty() {
            return all;
        }
        let subset: SmallVec<[(NodeKey, f32); 8]> = all
            .iter()
            .copied()
            .filter(|(child, _)| synchronized.contains(child))
            .collect();
        let subset_weight: f32 = subset.iter().map(|(_, w)| w).sum();
        if !subset.is_empty() && subset_weight >= self.settings.min_synchronize_weight {
            subset
        } else {
            all
        }
    }

    pub(crate) fn length_of(&self, key: NodeKey) -> f32 {
        match self.nodes[key].clip() {
            Some(clip) => clip.length,
            None => self.weighted_average(key, |graph, child| graph.length_of(child)),
        }
    }

    pub(crate) fn normalized_time_of(&self, key: NodeKey) -> f32 {
        let node = &self.nodes[key];
        match node.clip() {
            Some(clip) if clip.length > 0.0 => (node.time / f64::from(clip.length)) as f32,
            Some(_) => 0.0,
            None => self.weighted_average(key, |graph, child| graph.normalized_time_of(child)),
        }
    }

    pub(crate) fn velocity_of(&self, key: NodeKey) -> Vec3 {
        if let Some(clip) = self.nodes[key].clip() {
            return clip.average_velocity;
        }
        let members = self.weighted_members(key);
        let total: f32 = members.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Vec3::ZERO;
        }
        members
            .iter()
            .map(|&(child, weight)| self.velocity_of(child) * weight)
            .sum::<Vec3>()
            / total
    }

    fn weighted_average(&self, mixer: NodeKey, value: impl Fn(&Self, NodeKey) -> f32) -> f32 {
        let members = self.weighted_members(mixer);
        let total: f32 = members.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return 0.0;
        }
        members
            .iter()
            .map(|&(child, weight)| value(self, child) * weight)
            .sum::<f32>()
            / total
    }

    /// Weighted average of the authored root-motion velocity of the mixer's
    /// children. Clips report their own velocity.
    pub fn average_velocity(&self, node: NodeId) -> Result<Vec3> {
        let key = self.key(node)?;
        Ok(self.velocity_of(key))
    }
}
