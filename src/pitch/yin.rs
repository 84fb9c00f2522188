// YIN fundamental-frequency estimator
//
// Difference function -> cumulative mean normalized difference (CMND) ->
// first dip under the threshold -> parabolic refinement of the lag.

/// Outcome of one YIN search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YinResult {
    /// Refined period in samples (fractional)
    pub period: f32,
    /// 1 - CMND at the chosen lag; close to 1 for a clean periodic signal
    pub clarity: f32,
}

/// Fewest samples any lag is compared over
pub const MIN_COMPARISON: usize = 512;

/// Searchable lag range `[sample_rate / max_freq, sample_rate / min_freq]`
///
/// The upper lag is capped so every lag is still compared over
/// [`MIN_COMPARISON`] samples. Returns `None` when nothing is searchable.
pub fn lag_range(
    sample_rate: f32,
    min_frequency: f32,
    max_frequency: f32,
    window_len: usize,
) -> Option<(usize, usize)> {
    if sample_rate <= 0.0 || min_frequency <= 0.0 || max_frequency <= min_frequency {
        return None;
    }
    let tau_min = ((sample_rate / max_frequency).floor() as usize).max(2);
    let tau_max = ((sample_rate / min_frequency).ceil() as usize)
        .min(window_len.saturating_sub(MIN_COMPARISON));
    if tau_max <= tau_min + 1 {
        return None;
    }
    Some((tau_min, tau_max))
}

/// YIN detector with a reusable scratch buffer
#[derive(Debug, Default)]
pub struct Yin {
    cmnd: Vec<f32>,
}

impl Yin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimate the period of `signal`
    ///
    /// # Arguments
    /// * `tau_min`, `tau_max` - Lag search range, see [`lag_range`]
    /// * `threshold` - CMND value a lag must drop below to count as the period
    pub fn detect(
        &mut self,
        signal: &[f32],
        tau_min: usize,
        tau_max: usize,
        threshold: f32,
    ) -> Option<YinResult> {
        if tau_max >= signal.len() || tau_min < 1 || tau_min >= tau_max {
            return None;
        }
        // Same comparison window for every lag
        let window = signal.len() - tau_max;

        self.cmnd.clear();
        self.cmnd.resize(tau_max + 1, 1.0);

        // Difference function, normalized on the fly by its running mean
        let mut running_sum = 0.0f64;
        for tau in 1..=tau_max {
            let diff: f64 = signal[..window]
                .iter()
                .zip(&signal[tau..tau + window])
                .map(|(&a, &b)| {
                    let delta = (a - b) as f64;
                    delta * delta
                })
                .sum();
            running_sum += diff;
            self.cmnd[tau] = if running_sum > 0.0 {
                (diff * tau as f64 / running_sum) as f32
            } else {
                1.0
            };
        }

        // First dip under the threshold, followed to its bottom
        let mut tau = tau_min;
        let mut found = None;
        while tau <= tau_max {
            if self.cmnd[tau] < threshold {
                while tau < tau_max && self.cmnd[tau + 1] < self.cmnd[tau] {
                    tau += 1;
                }
                found = Some(tau);
                break;
            }
            tau += 1;
        }
        let tau = found?;

        let period = if tau > 1 && tau < tau_max {
            let y1 = self.cmnd[tau - 1];
            let y2 = self.cmnd[tau];
            let y3 = self.cmnd[tau + 1];
            let denominator = y1 - 2.0 * y2 + y3;
            if denominator.abs() > f32::EPSILON {
                let shift = ((y1 - y3) / (2.0 * denominator)).clamp(-1.0, 1.0);
                tau as f32 + shift
            } else {
                tau as f32
            }
        } else {
            tau as f32
        };

        Some(YinResult {
            period,
            clarity: (1.0 - self.cmnd[tau]).clamp(0.0, 1.0),
        })
    }
}
