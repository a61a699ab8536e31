//! Parameter Spaces
//!
//! A parametric mixer positions each child at a threshold in a 1D or 2D
//! space and derives child weights from a single live parameter.
//!
//! # Weight Scheduling
//!
//! Weights are resolved lazily. Any change to the parameter, a threshold, the
//! child array or the capacity only marks the mixer dirty; the weights are
//! recomputed once, when the frame driver calls
//! [`PlaybackGraph::pre_evaluate`] (or explicitly via
//! [`PlaybackGraph::resolve_weights`]). Setting the parameter several times
//! in a frame therefore costs a single recompute.

use glam::Vec2;
use smallvec::{SmallVec, smallvec};

use crate::errors::{BlendError, Result};
use crate::graph::{NodeId, NodeKey, PlaybackGraph, PlaybackNode};
use crate::mixer::cartesian::CartesianInterpolator;
use crate::mixer::directional::DirectionalInterpolator;
use crate::mixer::linear::LinearInterpolator;
use crate::mixer::MixerKind;
use crate::settings::BlendSettings;

/// A parameter or threshold value of either dimensionality.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BlendParameter {
    Scalar(f32),
    Vector(Vec2),
}

impl From<f32> for BlendParameter {
    fn from(value: f32) -> Self {
        BlendParameter::Scalar(value)
    }
}

impl From<Vec2> for BlendParameter {
    fn from(value: Vec2) -> Self {
        BlendParameter::Vector(value)
    }
}

impl BlendParameter {
    #[must_use]
    pub fn as_scalar(self) -> Option<f32> {
        match self {
            BlendParameter::Scalar(v) => Some(v),
            BlendParameter::Vector(_) => None,
        }
    }

    #[must_use]
    pub fn as_vector(self) -> Option<Vec2> {
        match self {
            BlendParameter::Vector(v) => Some(v),
            BlendParameter::Scalar(_) => None,
        }
    }
}

/// Value types a parameter space can be built over. Only finite values are
/// ever stored.
pub trait BlendValue: Copy + PartialEq + Default + std::fmt::Debug + 'static {
    /// Human readable name used in error messages.
    const KIND: &'static str;

    fn is_finite(self) -> bool;
    fn from_parameter(value: BlendParameter) -> Option<Self>;
    fn into_parameter(self) -> BlendParameter;
}

impl BlendValue for f32 {
    const KIND: &'static str = "a scalar";

    fn is_finite(self) -> bool {
        f32::is_finite(self)
    }

    fn from_parameter(value: BlendParameter) -> Option<Self> {
        value.as_scalar()
    }

    fn into_parameter(self) -> BlendParameter {
        BlendParameter::Scalar(self)
    }
}

impl BlendValue for Vec2 {
    const KIND: &'static str = "a 2D vector";

    fn is_finite(self) -> bool {
        Vec2::is_finite(self)
    }

    fn from_parameter(value: BlendParameter) -> Option<Self> {
        value.as_vector()
    }

    fn into_parameter(self) -> BlendParameter {
        BlendParameter::Vector(self)
    }
}

/// A weight computation strategy over a set of thresholds.
pub trait Interpolator: std::fmt::Debug {
    type Value: BlendValue;

    /// Called whenever any threshold changes so cached factors can be rebuilt.
    fn thresholds_changed(&mut self) {}

    /// Writes one weight per threshold into `weights`.
    ///
    /// `thresholds.len() == weights.len()` always holds.
    fn compute_weights(
        &mut self,
        thresholds: &[Self::Value],
        parameter: Self::Value,
        settings: &BlendSettings,
        weights: &mut [f32],
    ) -> Result<()>;

    /// Multiplier applied to the mixer's own speed after the last compute.
    fn speed_scale(&self) -> f32 {
        1.0
    }
}

/// Parameter, thresholds and dirty state of one parametric mixer.
#[derive(Debug, Clone)]
pub struct Parametric<I: Interpolator> {
    parameter: I::Value,
    /// Index aligned with the children; `len() == capacity >= child count`.
    thresholds: Vec<I::Value>,
    /// Tracks which slots have been given a threshold since they were created.
    assigned: Vec<bool>,
    weights_dirty: bool,
    interpolator: I,
}

impl<I: Interpolator> Parametric<I> {
    pub(crate) fn new(interpolator: I) -> Self {
        Self {
            parameter: I::Value::default(),
            thresholds: Vec::new(),
            assigned: Vec::new(),
            weights_dirty: true,
            interpolator,
        }
    }

    #[inline]
    #[must_use]
    pub fn parameter(&self) -> I::Value {
        self.parameter
    }

    #[inline]
    #[must_use]
    pub fn thresholds(&self) -> &[I::Value] {
        &self.thresholds
    }

    #[inline]
    #[must_use]
    pub fn interpolator(&self) -> &I {
        &self.interpolator
    }

    #[inline]
    #[must_use]
    pub fn weights_dirty(&self) -> bool {
        self.weights_dirty
    }

    fn convert(value: BlendParameter, what: &'static str) -> Result<I::Value> {
        let value = I::Value::from_parameter(value).ok_or(BlendError::ParameterKindMismatch {
            expected: I::Value::KIND,
        })?;
        if !value.is_finite() {
            return Err(BlendError::NonFiniteValue { what });
        }
        Ok(value)
    }
}

/// Type-erased view of a [`Parametric`], used by the graph to drive any of
/// the closed set of blend spaces through one interface.
pub(crate) trait ParametricAccess {
    fn parameter(&self) -> BlendParameter;
    /// Returns whether the stored value changed.
    fn set_parameter(&mut self, value: BlendParameter) -> Result<bool>;
    fn validate_threshold(&self, value: BlendParameter) -> Result<()>;
    fn threshold(&self, index: usize) -> Option<BlendParameter>;
    /// The threshold of slot `index`, only if one was ever given to it.
    fn assigned_threshold(&self, index: usize) -> Option<BlendParameter>;
    fn set_threshold(&mut self, index: usize, value: BlendParameter) -> Result<()>;
    fn resize(&mut self, capacity: usize);
    /// Removes slot `index` from the first `count` slots, shifting the rest down.
    fn remove_threshold(&mut self, index: usize, count: usize);
    fn weights_dirty(&self) -> bool;
    fn mark_dirty(&mut self);
    fn recompute(&mut self, settings: &BlendSettings, weights: &mut [f32]) -> Result<()>;
    fn speed_scale(&self) -> f32;
}

impl<I: Interpolator> ParametricAccess for Parametric<I> {
    fn parameter(&self) -> BlendParameter {
        self.parameter.into_parameter()
    }

    fn set_parameter(&mut self, value: BlendParameter) -> Result<bool> {
        let value = Self::convert(value, "parameter")?;
        if value == self.parameter {
            return Ok(false);
        }
        self.parameter = value;
        self.weights_dirty = true;
        Ok(true)
    }

    fn validate_threshold(&self, value: BlendParameter) -> Result<()> {
        Self::convert(value, "threshold").map(|_| ())
    }

    fn threshold(&self, index: usize) -> Option<BlendParameter> {
        self.thresholds.get(index).map(|t| t.into_parameter())
    }

    fn assigned_threshold(&self, index: usize) -> Option<BlendParameter> {
        self.assigned
            .get(index)
            .copied()
            .unwrap_or(false)
            .then(|| self.thresholds[index].into_parameter())
    }

    fn set_threshold(&mut self, index: usize, value: BlendParameter) -> Result<()> {
        let value = Self::convert(value, "threshold")?;
        let count = self.thresholds.len();
        let slot = self
            .thresholds
            .get_mut(index)
            .ok_or(BlendError::IndexOutOfRange { index, count })?;
        self.assigned[index] = true;
        if *slot == value {
            return Ok(());
        }
        *slot = value;
        self.interpolator.thresholds_changed();
        self.weights_dirty = true;
        Ok(())
    }

    fn resize(&mut self, capacity: usize) {
        self.thresholds.resize(capacity, I::Value::default());
        self.assigned.resize(capacity, false);
        self.interpolator.thresholds_changed();
        self.weights_dirty = true;
    }

    fn remove_threshold(&mut self, index: usize, count: usize) {
        if index >= count || count > self.thresholds.len() {
            return;
        }
        self.thresholds[index..count].rotate_left(1);
        self.assigned[index..count].rotate_left(1);
        self.thresholds[count - 1] = I::Value::default();
        self.assigned[count - 1] = false;
        self.interpolator.thresholds_changed();
        self.weights_dirty = true;
    }

    fn weights_dirty(&self) -> bool {
        self.weights_dirty
    }

    fn mark_dirty(&mut self) {
        self.interpolator.thresholds_changed();
        self.weights_dirty = true;
    }

    fn recompute(&mut self, settings: &BlendSettings, weights: &mut [f32]) -> Result<()> {
        let count = weights.len();
        debug_assert!(
            self.assigned[..count].iter().all(|&a| a),
            "weights computed before every child was given a threshold"
        );
        self.interpolator
            .compute_weights(&self.thresholds[..count], self.parameter, settings, weights)?;
        self.weights_dirty = false;
        Ok(())
    }

    fn speed_scale(&self) -> f32 {
        self.interpolator.speed_scale()
    }
}

/// The blend space of a mixer. Fixed at construction.
#[derive(Debug, Clone)]
pub enum Blend {
    /// Child weights are set directly by the caller.
    Manual,
    Linear(Parametric<LinearInterpolator>),
    Cartesian(Parametric<CartesianInterpolator>),
    Directional(Parametric<DirectionalInterpolator>),
}

impl Blend {
    pub(crate) fn from_kind(kind: MixerKind) -> Self {
        match kind {
            MixerKind::Manual => Blend::Manual,
            MixerKind::Linear { extrapolate_speed } => {
                Blend::Linear(Parametric::new(LinearInterpolator::new(extrapolate_speed)))
            }
            MixerKind::Cartesian => Blend::Cartesian(Parametric::new(CartesianInterpolator::default())),
            MixerKind::Directional => {
                Blend::Directional(Parametric::new(DirectionalInterpolator::default()))
            }
        }
    }

    pub(crate) fn parametric(&self) -> Option<&dyn ParametricAccess> {
        match self {
            Blend::Manual => None,
            Blend::Linear(p) => Some(p),
            Blend::Cartesian(p) => Some(p),
            Blend::Directional(p) => Some(p),
        }
    }

    pub(crate) fn parametric_mut(&mut self) -> Option<&mut dyn ParametricAccess> {
        match self {
            Blend::Manual => None,
            Blend::Linear(p) => Some(p),
            Blend::Cartesian(p) => Some(p),
            Blend::Directional(p) => Some(p),
        }
    }
}

/// Scales `weights` so they sum to one. When every weight is zero the child
/// at `fallback()` takes the full weight instead.
pub(crate) fn normalize_weights(weights: &mut [f32], total: f32, fallback: impl FnOnce() -> usize) {
    if weights.is_empty() {
        return;
    }
    if total <= 0.0 {
        let nearest = fallback();
        weights.fill(0.0);
        weights[nearest] = 1.0;
        return;
    }
    if total == 1.0 {
        return;
    }
    let inverse = 1.0 / total;
    for weight in weights.iter_mut() {
        *weight *= inverse;
    }
}

// ============================================================================
// Graph API
// ============================================================================

impl PlaybackGraph {
    fn parametric(&self, id: NodeId) -> Result<&dyn ParametricAccess> {
        let key = self.mixer_key(id)?;
        self.nodes[key]
            .mixer()
            .and_then(|mixer| mixer.blend.parametric())
            .ok_or(BlendError::NotParametric(id))
    }

    fn parametric_mut(&mut self, id: NodeId) -> Result<&mut dyn ParametricAccess> {
        let key = self.mixer_key(id)?;
        self.nodes[key]
            .mixer_mut()
            .and_then(|mixer| mixer.blend.parametric_mut())
            .ok_or(BlendError::NotParametric(id))
    }

    /// Current parameter of a parametric mixer.
    pub fn parameter(&self, mixer: NodeId) -> Result<BlendParameter> {
        Ok(self.parametric(mixer)?.parameter())
    }

    /// Sets the parameter of a parametric mixer.
    ///
    /// Non-finite values and values of the wrong dimensionality are rejected
    /// and leave the mixer untouched. Setting the current value again does
    /// not dirty the weights.
    pub fn set_parameter(&mut self, mixer: NodeId, value: impl Into<BlendParameter>) -> Result<()> {
        if self.parametric_mut(mixer)?.set_parameter(value.into())? {
            log::trace!("Mixer {mixer:?} parameter changed, weights dirty");
        }
        Ok(())
    }

    /// Threshold of the child at `index`.
    pub fn threshold(&self, mixer: NodeId, index: usize) -> Result<BlendParameter> {
        let count = self.child_count(mixer)?;
        if index >= count {
            return Err(BlendError::IndexOutOfRange { index, count });
        }
        self.parametric(mixer)?
            .threshold(index)
            .ok_or(BlendError::IndexOutOfRange { index, count })
    }

    /// Assigns the threshold of the child at `index`.
    pub fn set_threshold(
        &mut self,
        mixer: NodeId,
        index: usize,
        value: impl Into<BlendParameter>,
    ) -> Result<()> {
        let count = self.child_count(mixer)?;
        if index >= count {
            return Err(BlendError::IndexOutOfRange { index, count });
        }
        self.parametric_mut(mixer)?.set_threshold(index, value.into())
    }

    /// Assigns the thresholds of the first children in order.
    ///
    /// Every value is validated before any is stored, so a rejected call
    /// leaves all thresholds unchanged.
    pub fn set_thresholds<T: Into<BlendParameter>>(
        &mut self,
        mixer: NodeId,
        values: impl IntoIterator<Item = T>,
    ) -> Result<()> {
        let values: SmallVec<[BlendParameter; 8]> = values.into_iter().map(Into::into).collect();
        let count = self.child_count(mixer)?;
        if values.len() > count {
            return Err(BlendError::IndexOutOfRange {
                index: values.len() - 1,
                count,
            });
        }
        let parametric = self.parametric_mut(mixer)?;
        for &value in &values {
            parametric.validate_threshold(value)?;
        }
        for (index, value) in values.into_iter().enumerate() {
            parametric.set_threshold(index, value)?;
        }
        Ok(())
    }

    /// Appends `child` to a parametric mixer and assigns its threshold.
    ///
    /// The threshold is validated first; on rejection the child is not added.
    pub fn add_child_with_threshold(
        &mut self,
        mixer: NodeId,
        child: NodeId,
        threshold: impl Into<BlendParameter>,
    ) -> Result<usize> {
        let threshold = threshold.into();
        self.parametric(mixer)?.validate_threshold(threshold)?;
        let index = self.add_child(mixer, child)?;
        self.parametric_mut(mixer)?.set_threshold(index, threshold)?;
        Ok(index)
    }

    /// Whether the mixer's weights are waiting to be recomputed.
    pub fn weights_dirty(&self, mixer: NodeId) -> Result<bool> {
        Ok(self.parametric(mixer)?.weights_dirty())
    }

    /// Recomputes the mixer's child weights now if they are dirty.
    pub fn resolve_weights(&mut self, mixer: NodeId) -> Result<()> {
        let key = self.mixer_key(mixer)?;
        self.recompute_weights_if_dirty(key)
    }

    pub(crate) fn recompute_weights_if_dirty(&mut self, key: NodeKey) -> Result<()> {
        let settings = self.settings;
        let Some(mixer) = self.nodes.get_mut(key).and_then(PlaybackNode::mixer_mut) else {
            return Ok(());
        };
        let count = mixer.children.len();
        let Some(parametric) = mixer.blend.parametric_mut() else {
            return Ok(());
        };
        if !parametric.weights_dirty() {
            return Ok(());
        }

        let mut weights: SmallVec<[f32; 8]> = smallvec![0.0; count];
        parametric.recompute(&settings, &mut weights)?;
        let speed_scale = parametric.speed_scale();

        let scale_changed = mixer.speed_scale != speed_scale;
        mixer.speed_scale = speed_scale;
        let children: SmallVec<[NodeKey; 8]> = mixer.children.iter().copied().collect();

        let mixer_id = self.id(key);
        for (index, (&child, &weight)) in children.iter().zip(weights.iter()).enumerate() {
            if let Some(node) = self.nodes.get_mut(child) {
                node.weight = weight;
            }
            self.backend.set_input_weight(mixer_id, index, weight);
        }
        if scale_changed {
            self.push_speed(key);
        }
        Ok(())
    }
}
