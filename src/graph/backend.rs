//! Playback Backend Boundary
//!
//! The blend engine decides weights and speeds; actually sampling and mixing
//! poses happens in an external playback graph. [`PlaybackBackend`] is the
//! narrow surface through which the engine keeps that graph in step.
//!
//! Every call is made synchronously from the thread that mutates the
//! [`PlaybackGraph`](crate::graph::PlaybackGraph).

use crate::graph::NodeId;

/// Receiver of structural and per-frame changes from the blend engine.
pub trait PlaybackBackend {
    /// `child` now occupies input slot `index` of `parent`.
    fn connect(&mut self, parent: NodeId, child: NodeId, index: usize);

    /// Input slot `index` of `parent` no longer has a child.
    fn disconnect(&mut self, parent: NodeId, index: usize);

    /// Blend weight of input slot `index` of `parent`.
    fn set_input_weight(&mut self, parent: NodeId, index: usize, weight: f32);

    /// Effective playback speed of `node`.
    fn set_speed(&mut self, node: NodeId, speed: f32);

    /// `node` has been destroyed; release its native slot.
    fn destroy(&mut self, node: NodeId);
}

/// Backend that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl PlaybackBackend for NullBackend {
    fn connect(&mut self, _parent: NodeId, _child: NodeId, _index: usize) {}
    fn disconnect(&mut self, _parent: NodeId, _index: usize) {}
    fn set_input_weight(&mut self, _parent: NodeId, _index: usize, _weight: f32) {}
    fn set_speed(&mut self, _node: NodeId, _speed: f32) {}
    fn destroy(&mut self, _node: NodeId) {}
}
