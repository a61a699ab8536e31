use glam::Vec2;

use crate::errors::{BlendError, Result};
use crate::mixer::parametric::{Interpolator, normalize_weights};
use crate::settings::BlendSettings;

/// Gradient Band Interpolation over 2D thresholds.
///
/// For every ordered pair of children `(i, j)` a factor
/// `(t_j - t_i) / |t_j - t_i|²` is cached. The factors depend only on the
/// thresholds, so they are rebuilt when a threshold changes rather than on
/// every parameter change.
#[derive(Debug, Clone, Default)]
pub struct CartesianInterpolator {
    /// Row-major `count × count`; the diagonal is unused.
    factors: Vec<Vec2>,
    count: usize,
    factors_dirty: bool,
}

impl CartesianInterpolator {
    /// Cached factor for the pair `(i, j)`, if it has been computed.
    #[must_use]
    pub fn factor(&self, i: usize, j: usize) -> Option<Vec2> {
        if i == j || i >= self.count || j >= self.count || self.factors_dirty {
            return None;
        }
        self.factors.get(i * self.count + j).copied()
    }

    #[must_use]
    pub fn factors_dirty(&self) -> bool {
        self.factors_dirty
    }

    fn rebuild_factors(&mut self, thresholds: &[Vec2]) -> Result<()> {
        let count = thresholds.len();
        self.factors.clear();
        self.factors.resize(count * count, Vec2::ZERO);
        self.count = count;

        for i in 0..count {
            for j in (i + 1)..count {
                let difference = thresholds[j] - thresholds[i];
                let length_squared = difference.length_squared();
                if length_squared == 0.0 {
                    self.factors_dirty = true;
                    return Err(BlendError::DuplicateThreshold {
                        first: i,
                        second: j,
                        x: thresholds[i].x,
                        y: thresholds[i].y,
                    });
                }
                let factor = difference / length_squared;
                self.factors[i * count + j] = factor;
                self.factors[j * count + i] = -factor;
            }
        }

        self.factors_dirty = false;
        log::trace!("Rebuilt cartesian blend factors for {count} thresholds");
        Ok(())
    }
}

pub(crate) fn nearest_threshold(thresholds: &[Vec2], parameter: Vec2) -> usize {
    thresholds
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.distance_squared(parameter)
                .total_cmp(&b.distance_squared(parameter))
        })
        .map_or(0, |(index, _)| index)
}

impl Interpolator for CartesianInterpolator {
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
            self.rebuild_factors(thresholds)?;
        }
        if count == 0 {
            return Ok(());
        }

        let mut total = 0.0;
        for i in 0..count {
            let from_threshold = parameter - thresholds[i];
            let row = &self.factors[i * count..(i + 1) * count];

            let mut weight = 1.0_f32;
            for (j, factor) in row.iter().enumerate() {
                if j == i {
                    continue;
                }
                let candidate = 1.0 - from_threshold.dot(*factor);
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
