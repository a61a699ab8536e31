#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::float_cmp)]

//! Weighted animation blend trees.
//!
//! A [`PlaybackGraph`] holds clip and mixer nodes. Parametric mixers place
//! each child at a threshold in a 1D or 2D space and derive child weights
//! from a live parameter; the weights, speeds and connections are mirrored
//! into an external [`PlaybackBackend`] that does the actual pose blending.

pub mod errors;
pub mod graph;
pub mod mixer;
pub mod settings;

pub use errors::{BlendError, Result};
pub use graph::{ClipNode, GraphId, NodeId, NodeKey, NodeKind, NullBackend, PlaybackBackend, PlaybackGraph, PlaybackNode};
pub use mixer::parametric::{Blend, BlendParameter, BlendValue, Interpolator, Parametric};
pub use mixer::cartesian::CartesianInterpolator;
pub use mixer::directional::DirectionalInterpolator;
pub use mixer::linear::LinearInterpolator;
pub use mixer::{MixerKind, MixerState};
pub use settings::BlendSettings;
