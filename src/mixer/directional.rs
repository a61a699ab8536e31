use glam::Vec2;

use crate::errors::{BlendError, Result};
use crate::mixer::cartesian::nearest_threshold;
use crate::mixer::parametric::{Interpolator, normalize_weights};
use crate::settings::BlendSettings;

/// Gradient Band Interpolation in polar space.
///
/// Thresholds and the parameter are treated as directions: the band between
/// two children is measured as `(magnitude difference / average magnitude,
/// signed angle × angle factor)`. This keeps e.g. "walk forward" and
/// "run forward" blending along their shared direction instead of through
/// the origin.
#[derive(Debug, Clone, Default)]
pub struct DirectionalInterpolator {
    /// Row-major `count × count`; the diagonal is unused.
    factors: Vec<Vec2>,
    magnitudes: Vec<f32>,
    count: usize,
    factors_dirty: bool,
}

/// Signed angle from `a` to `b` in radians. Zero if either is the origin.
#[must_use]
pub fn signed_angle(a: Vec2, b: Vec2) -> f32 {
    if a == Vec2::ZERO || b == Vec2::ZERO {
        return 0.0;
    }
    a.perp_dot(b).atan2(a.dot(b))
}

impl DirectionalInterpolator {
    /// Cached polar factor for the pair `(i, j)`, if it has been computed.
    #[must_use]
    pub fn factor(&self, i: usize, j: usize) -> Option<Vec2> {
        if i == j || i >= self.count || j >= self.count || self.factors_dirty {
            return None;
        }
        self.factors.get(i * self.count + j).copied()
    }

    fn rebuild_factors(&mut self, thresholds: &[Vec2], angle_factor: f32) -> Result<()> {
        let count = thresholds.len();
        self.magnitudes.clear();
        self.magnitudes.extend(thresholds.iter().map(|t| t.length()));
        self.factors.clear();
        self.factors.resize(count * count, Vec2::ZERO);
        self.count = count;

        for i in 0..count {
            let magnitude_i = self.magnitudes[i];
            for j in (i + 1)..count {
                let duplicate = BlendError::DuplicateThreshold {
                    first: i,
                    second: j,
                    x: thresholds[i].x,
                    y: thresholds[i].y,
                };
                if thresholds[i] == thresholds[j] {
                    self.factors_dirty = true;
                    return Err(duplicate);
                }

                let magnitude_j = self.magnitudes[j];
                let average_magnitude = (magnitude_i + magnitude_j) * 0.5;
                let mut factor = Vec2::new(
                    (magnitude_j - magnitude_i) / average_magnitude,
                    signed_angle(thresholds[i], thresholds[j]) * angle_factor,
                );

                let length_squared = factor.length_squared();
                if length_squared == 0.0 || !length_squared.is_finite() {
                    self.factors_dirty = true;
                    return Err(duplicate);
                }
                factor /= length_squared;

                self.factors[i * count + j] = factor;
                self.factors[j * count + i] = -factor;
            }
        }

        self.factors_dirty = false;
        log::trace!("Rebuilt directional blend factors for {count} thresholds");
        Ok(())
    }
}

impl Interpolator for DirectionalInterpolator {
    type Value = Vec2;

    fn thresholds_changed(&mut self) {
        self.factors_dirty = true;
    }

    fn compute_weights(
        &mut self,
        thresholds: &[Vec2],
        parameter: Vec2,
        settings: &BlendSettings,
        weights: &mut [f32],
    ) -> Result<()> {
        let count = weights.len();
        if self.factors_dirty || self.count != count {
            self.rebuild_factors(thresholds, settings.directional_angle_factor)?;
        }
        if count == 0 {
            return Ok(());
        }

        let parameter_magnitude = parameter.length();
        let mut total = 0.0;
        for i in 0..count {
            let magnitude_i = self.magnitudes[i];
            let magnitude_to_parameter = parameter_magnitude - magnitude_i;
            let angle_to_parameter =
                signed_angle(thresholds[i], parameter) * settings.directional_angle_factor;

            let mut weight = 1.0_f32;
            for j in 0..count {
                if j == i {
                    continue;
                }
                let average_magnitude = (magnitude_i + self.magnitudes[j]) * 0.5;
                let polar = Vec2::new(magnitude_to_parameter / average_magnitude, angle_to_parameter);
                let candidate = 1.0 - polar.dot(self.factors[i * count + j]);
                if candidate < weight {
                    weight = candidate;
                }
            }

            if weight < settings.weight_epsilon {
                weight = 0.0;
            }
            weights[i] = weight;
            total += weight;
        }

        normalize_weights(weights, total, || nearest_threshold(thresholds, parameter));
        Ok(())
    }
}
