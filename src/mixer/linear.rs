use crate::errors::{BlendError, Result};
use crate::mixer::parametric::Interpolator;
use crate::settings::BlendSettings;

/// 1D blending between the two children whose thresholds bracket the
/// parameter.
///
/// Thresholds must be strictly increasing. The order is only checked when
/// weights are recomputed, so thresholds may be out of order while a batch of
/// edits is in progress.
#[derive(Debug, Clone)]
pub struct LinearInterpolator {
    extrapolate_speed: bool,
    speed_scale: f32,
}

impl LinearInterpolator {
    #[must_use]
    pub fn new(extrapolate_speed: bool) -> Self {
        Self {
            extrapolate_speed,
            speed_scale: 1.0,
        }
    }

    /// Whether a parameter above the highest threshold speeds the mixer up
    /// instead of only clamping.
    #[inline]
    #[must_use]
    pub fn extrapolate_speed(&self) -> bool {
        self.extrapolate_speed
    }
}

impl Default for LinearInterpolator {
    fn default() -> Self {
        Self::new(false)
    }
}

fn check_sorted(thresholds: &[f32]) -> Result<()> {
    for (index, pair) in thresholds.windows(2).enumerate() {
        if pair[1] <= pair[0] {
            return Err(BlendError::UnsortedThresholds {
                index: index + 1,
                value: pair[1],
                previous: pair[0],
            });
        }
    }
    Ok(())
}

impl Interpolator for LinearInterpolator {
    type Value = f32;

    fn compute_weights(
        &mut self,
        thresholds: &[f32],
        parameter: f32,
        _settings: &BlendSettings,
        weights: &mut [f32],
    ) -> Result<()> {
        self.speed_scale = 1.0;
        let count = weights.len();
        if count == 0 {
            return Ok(());
        }
        check_sorted(thresholds)?;

        weights.fill(0.0);
        if count == 1 {
            weights[0] = 1.0;
            return Ok(());
        }

        let lowest = thresholds[0];
        if parameter <= lowest {
            weights[0] = 1.0;
            return Ok(());
        }

        let highest = thresholds[count - 1];
        if parameter >= highest {
            weights[count - 1] = 1.0;
            if self.extrapolate_speed && highest > 0.0 {
                self.speed_scale = parameter / highest;
            }
            return Ok(());
        }

        // First threshold strictly above the parameter; in 1..count here.
        let high = thresholds.partition_point(|&t| t <= parameter);
        let low = high - 1;
        let t = (parameter - thresholds[low]) / (thresholds[high] - thresholds[low]);
        weights[low] = 1.0 - t;
        weights[high] = t;
        Ok(())
    }

    fn speed_scale(&self) -> f32 {
        self.speed_scale
    }
}
