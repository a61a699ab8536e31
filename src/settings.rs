//! Blend Settings
//!
//! Tunable constants shared by every mixer in a [`PlaybackGraph`].
//!
//! The defaults below are tuned values that authored content depends on.
//!
//! ```rust,ignore
//! use myth_blend::{BlendSettings, PlaybackGraph};
//!
//! let graph = PlaybackGraph::with_settings(BlendSettings {
//!     default_child_capacity: 16,
//!     ..Default::default()
//! });
//! ```
//!
//! [`PlaybackGraph`]: crate::graph::PlaybackGraph

/// Capacity a mixer allocates for its children on first growth.
pub const DEFAULT_CHILD_CAPACITY: usize = 8;

/// Gradient band weights below this value are snapped to exactly zero to
/// avoid near-zero flicker between frames.
pub const WEIGHT_EPSILON: f32 = 0.01;

/// A synchronization set whose total weight falls below this value is
/// averaged without weighting.
pub const MIN_SYNCHRONIZE_WEIGHT: f32 = 0.01;

/// Angle deviations count double relative to normalized radial distance in
/// directional blending.
pub const DIRECTIONAL_ANGLE_FACTOR: f32 = 2.0;

/// Per-graph blending configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendSettings {
    /// Minimum capacity a mixer grows to.
    pub default_child_capacity: usize,
    /// See [`WEIGHT_EPSILON`].
    pub weight_epsilon: f32,
    /// See [`MIN_SYNCHRONIZE_WEIGHT`].
    pub min_synchronize_weight: f32,
    /// See [`DIRECTIONAL_ANGLE_FACTOR`].
    pub directional_angle_factor: f32,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            default_child_capacity: DEFAULT_CHILD_CAPACITY,
            weight_epsilon: WEIGHT_EPSILON,
            min_synchronize_weight: MIN_SYNCHRONIZE_WEIGHT,
            directional_angle_factor: DIRECTIONAL_ANGLE_FACTOR,
        }
    }
}
