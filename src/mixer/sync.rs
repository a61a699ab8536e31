//! Time Synchronization
//!
//! Children of different lengths drift out of phase when they play at their
//! authored speeds: a 1s walk and a 2s run blended together put their feet
//! down at different times. Synchronized children are instead driven towards
//! a shared normalized time every frame by overriding their speeds.
//!
//! The set lives on the outermost mixer of a chain, so that children of
//! nested mixers can be locked to each other. Attaching a mixer that has its
//! own set under another mixer merges its set into the new outermost one.
//!
//! # Per-frame pass
//!
//! For every member with a non-zero length:
//!
//! ```text
//! w       = own weight × weights of ancestors below the owner
//! target  = (Σ w·t_norm + dt · Σ w·speed/length) / Σ w
//! speed'  = (target - t_norm) · length / (dt · chain speed)
//! ```
//!
//! If `Σ w` falls below the minimum synchronize weight every member counts
//! equally.

use smallvec::SmallVec;

use crate::errors::{BlendError, Result};
use crate::graph::{NodeId, NodeKey, PlaybackGraph};

/// Per-member data gathered before the speed overrides are written.
struct Member {
    key: NodeKey,
    weight: f32,
    length: f32,
    normalized_time: f32,
    /// Product of the effective speeds of every ancestor, owner included.
    chain_speed: f32,
    /// Authored speed times chain speed.
    speed: f32,
}

impl PlaybackGraph {
    /// Adds `node` to the synchronization set of its outermost mixer.
    ///
    /// Mixers are never members themselves: synchronizing a mixer adds every
    /// clip beneath it instead. A detached mixer holds the set itself.
    pub fn synchronize(&mut self, node: NodeId) -> Result<()> {
        let key = self.key(node)?;
        if self.nodes[key].parent.is_none() && !self.nodes[key].is_mixer() {
            return Err(BlendError::NotAttached(node));
        }
        let owner = self.sync_owner(key);
        let clips: SmallVec<[NodeKey; 8]> = self
            .subtree(key)
            .into_iter()
            .filter(|&k| !self.nodes[k].is_mixer())
            .collect();

        let set = &mut self.mixer_state_mut(owner).synchronized;
        for clip in clips {
            if !set.contains(&clip) {
                set.push(clip);
            }
        }
        log::debug!("Synchronized {node:?} under {:?}", self.id(owner));
        Ok(())
    }

    /// Removes `node` (or every clip beneath a mixer) from synchronization
    /// and restores its authored speed.
    pub fn dont_synchronize(&mut self, node: NodeId) -> Result<()> {
        let key = self.key(node)?;
        let owner = self.sync_owner(key);
        if self.nodes[owner].is_mixer() {
            self.prune_synchronized(owner, key);
        }
        Ok(())
    }

    pub fn is_synchronized(&self, node: NodeId) -> Result<bool> {
        let key = self.key(node)?;
        let owner = self.sync_owner(key);
        Ok(self.nodes[owner]
            .mixer()
            .is_some_and(|state| state.synchronized.contains(&key)))
    }

    /// Synchronized nodes at or beneath `mixer`.
    pub fn synchronized_nodes(&self, mixer: NodeId) -> Result<Vec<NodeId>> {
        let key = self.mixer_key(mixer)?;
        let owner = self.sync_owner(key);
        Ok(self
            .mixer_state(owner)
            .synchronized
            .iter()
            .filter(|&&member| self.is_ancestor(key, member))
            .map(|&member| self.id(member))
            .collect())
    }

    /// The outermost ancestor of `key`, or `key` itself when detached.
    pub(crate) fn sync_owner(&self, key: NodeKey) -> NodeKey {
        let mut current = key;
        while let Some(parent) = self.nodes[current].parent {
            current = parent;
        }
        current
    }

    /// Drops `root` and everything beneath it from `owner`'s set.
    pub(crate) fn prune_synchronized(&mut self, owner: NodeKey, root: NodeKey) {
        let Some(state) = self.nodes[owner].mixer() else {
            return;
        };
        if state.synchronized.is_empty() {
            return;
        }
        let pruned: SmallVec<[NodeKey; 8]> = state
            .synchronized
            .iter()
            .copied()
            .filter(|&member| self.is_ancestor(root, member))
            .collect();
        if pruned.is_empty() {
            return;
        }
        self.mixer_state_mut(owner)
            .synchronized
            .retain(|member| !pruned.contains(member));
        for member in pruned {
            self.clear_sync_speed(member);
        }
    }

    /// Moves the set held by a freshly attached mixer into its new owner.
    pub(crate) fn adopt_synchronized(&mut self, child: NodeKey) {
        let Some(state) = self.nodes[child].mixer_mut() else {
            return;
        };
        if state.synchronized.is_empty() {
            return;
        }
        let moved = std::mem::take(&mut state.synchronized);
        let owner = self.sync_owner(child);
        let set = &mut self.mixer_state_mut(owner).synchronized;
        for member in moved {
            if !set.contains(&member) {
                set.push(member);
            }
        }
        log::debug!(
            "Merged synchronization set of {:?} into {:?}",
            self.id(child),
            self.id(owner)
        );
    }

    pub(crate) fn clear_sync_speed(&mut self, key: NodeKey) {
        if self.nodes[key].sync_speed.take().is_some() {
            self.push_speed(key);
        }
    }

    /// Weight of `key` relative to `owner`: its own weight times the weights
    /// of every ancestor strictly below the owner.
    fn relative_weight(&self, key: NodeKey, owner: NodeKey) -> f32 {
        let mut weight = self.nodes[key].weight;
        let mut current = self.nodes[key].parent;
        while let Some(parent) = current {
            if parent == owner {
                break;
            }
            weight *= self.nodes[parent].weight;
            current = self.nodes[parent].parent;
        }
        weight
    }

    fn chain_speed(&self, key: NodeKey) -> f32 {
        let mut speed = 1.0;
        let mut current = self.nodes[key].parent;
        while let Some(parent) = current {
            speed *= self.nodes[parent].effective_speed();
            current = self.nodes[parent].parent;
        }
        speed
    }

    fn chain_playing(&self, key: NodeKey) -> bool {
        let mut current = Some(key);
        while let Some(node) = current {
            if !self.nodes[node].playing {
                return false;
            }
            current = self.nodes[node].parent;
        }
        true
    }

    /// Runs the synchronization pass for the set held by `owner`.
    pub(crate) fn apply_synchronization(&mut self, owner: NodeKey, delta_time: f32) -> Result<()> {
        let members: SmallVec<[NodeKey; 8]> = self.mixer_state(owner).synchronized.iter().copied().collect();
        if members.len() < 2 {
            for member in members {
                self.clear_sync_speed(member);
            }
            return Ok(());
        }
        if delta_time == 0.0 || !self.nodes[owner].playing || self.nodes[owner].weight == 0.0 {
            return Ok(());
        }

        let mut active: SmallVec<[Member; 8]> = SmallVec::new();
        for key in members {
            let length = self.length_of(key);
            let chain_speed = self.chain_speed(key);
            if length <= 0.0 || chain_speed == 0.0 || !self.chain_playing(key) {
                self.clear_sync_speed(key);
                continue;
            }
            active.push(Member {
                key,
                weight: self.relative_weight(key, owner),
                length,
                normalized_time: self.normalized_time_of(key),
                chain_speed,
                speed: self.nodes[key].speed * chain_speed,
            });
        }
        if active.is_empty() {
            return Ok(());
        }

        let mut total_weight: f32 = active.iter().map(|m| m.weight).sum();
        if total_weight < self.settings.min_synchronize_weight {
            for member in &mut active {
                member.weight = 1.0;
            }
            total_weight = active.len() as f32;
        }

        let weighted_time: f32 = active.iter().map(|m| m.weight * m.normalized_time).sum();
        let weighted_speed: f32 = active.iter().map(|m| m.weight * m.speed / m.length).sum();
        let target = (weighted_time + delta_time * weighted_speed) / total_weight;

        let owner_id = self.id(owner);
        if !target.is_finite() {
            let detail = format!(
                "target normalized time is {target} (total weight {total_weight}, weighted time {weighted_time}, weighted speed {weighted_speed})"
            );
            log::error!("Synchronization of {owner_id:?} diverged: {detail}");
            return Err(BlendError::SynchronizationDiverged {
                mixer: owner_id,
                detail,
            });
        }

        for member in &active {
            let speed = (target - member.normalized_time) * member.length
                / (delta_time * member.chain_speed);
            if !speed.is_finite() {
                let detail = format!("speed of {:?} is {speed}", self.id(member.key));
                log::error!("Synchronization of {owner_id:?} diverged: {detail}");
                return Err(BlendError::SynchronizationDiverged {
                    mixer: owner_id,
                    detail,
                });
            }
            self.nodes[member.key].sync_speed = Some(speed);
            self.push_speed(member.key);
        }

        log::trace!(
            "Synchronized {} members of {owner_id:?} to normalized time {target}",
            active.len()
        );
        Ok(())
    }
}
