//! Error Types
//!
//! This module defines the error types used throughout the blend engine.
//!
//! # Overview
//!
//! The main error type [`BlendError`] covers every failure mode of the engine:
//! - Input validation (non-finite values, out of range indices)
//! - Node handle and ownership errors
//! - Threshold configuration errors detected at recompute time
//! - Internal consistency failures in the synchronization pass
//!
//! Recoverable misuse (for example removing a node from a mixer that does not
//! own it) is not an error: it is logged and redirected.
//!
//! # Usage
//!
//! All fallible APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, BlendError>`.
//!
//! ```rust,ignore
//! use myth_blend::errors::Result;
//!
//! fn drive(graph: &mut PlaybackGraph, dt: f32) -> Result<()> {
//!     graph.update(dt)
//! }
//! ```

use thiserror::Error;

use crate::graph::NodeId;

/// The main error type for the blend engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BlendError {
    // ========================================================================
    // Input Validation Errors
    // ========================================================================
    /// A parameter, threshold, weight or speed was NaN or infinite.
    #[error("Non-finite value rejected for {what}")]
    NonFiniteValue {
        /// Which input was rejected
        what: &'static str,
    },

    /// A child index outside the valid range.
    #[error("Index out of range: {index} (count: {count})")]
    IndexOutOfRange {
        /// The invalid index
        index: usize,
        /// Number of valid slots
        count: usize,
    },

    /// A scalar was given to a 2D mixer or a vector to a 1D mixer.
    #[error("Parameter kind mismatch: mixer expects {expected}")]
    ParameterKindMismatch {
        /// The kind the mixer works with
        expected: &'static str,
    },

    /// The frame delta was negative or non-finite.
    #[error("Invalid delta time: {0}")]
    InvalidDeltaTime(f32),

    /// Requested child capacity is smaller than the current child count.
    #[error("Capacity {capacity} is below the current child count {count}")]
    CapacityBelowCount {
        /// Requested capacity
        capacity: usize,
        /// Current child count
        count: usize,
    },

    // ========================================================================
    // Handle & Ownership Errors
    // ========================================================================
    /// The node was destroyed or never existed.
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// The node belongs to a different graph instance.
    #[error("Node {0:?} belongs to a different graph")]
    ForeignGraph(NodeId),

    /// The operation requires a mixer node.
    #[error("Node {0:?} is not a mixer")]
    NotAMixer(NodeId),

    /// The operation requires a clip node.
    #[error("Node {0:?} is not a clip")]
    NotAClip(NodeId),

    /// The operation requires a mixer with a parameter space.
    #[error("Mixer {0:?} has no parameter space")]
    NotParametric(NodeId),

    /// The node must be attached to a mixer for this operation.
    #[error("Node {0:?} is not attached to a mixer")]
    NotAttached(NodeId),

    /// Attaching would make a node its own ancestor.
    #[error("Attaching {child:?} under {parent:?} would create a cycle")]
    CycleDetected {
        /// The node being attached
        child: NodeId,
        /// The requested parent
        parent: NodeId,
    },

    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Linear thresholds are not strictly increasing.
    #[error("Thresholds must be strictly increasing: index {index} ({value}) does not exceed the previous threshold ({previous})")]
    UnsortedThresholds {
        /// Index of the first offending threshold
        index: usize,
        /// Its value
        value: f32,
        /// The value before it
        previous: f32,
    },

    /// Two children of a 2D mixer share the same threshold.
    #[error("Children {first} and {second} share the threshold ({x}, {y})")]
    DuplicateThreshold {
        /// First child index
        first: usize,
        /// Second child index
        second: usize,
        /// Shared threshold x
        x: f32,
        /// Shared threshold y
        y: f32,
    },

    // ========================================================================
    // Internal Consistency Errors
    // ========================================================================
    /// The synchronization pass produced NaN or infinity.
    #[error("Synchronization of mixer {mixer:?} diverged: {detail}")]
    SynchronizationDiverged {
        /// The mixer that owns the synchronization set
        mixer: NodeId,
        /// Which quantity became non-finite
        detail: String,
    },
}

/// Alias for `Result<T, BlendError>`.
pub type Result<T> = std::result::Result<T, BlendError>;
