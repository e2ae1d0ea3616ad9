//! I/O density estimation
//!
//! The per-sample disk busy time is smoothed with an Epanechnikov-weighted moving sum.
//! Bursts of activity are then found between local extrema of the smoothed curve

use trace_format::DiskSample;

pub const DEFAULT_WINDOW: usize = 11;
const MIN_WINDOW: usize = 3;

/// Windows tried, largest first, when there are too few samples
const FALLBACK_WINDOWS: [usize; 3] = [9, 5, 3];

/// Pick the smoothing window for `n_samples` samples
///
/// The window is odd and at least 3; it shrinks (9, 5, 3) when there are fewer samples than it spans
pub fn effective_window(requested: usize, n_samples: usize) -> usize {
    let requested = match requested.max(MIN_WINDOW) {
        w if w % 2 == 0 => w - 1,
        w => w,
    };
    if n_samples >= requested {
        return requested;
    }

    FALLBACK_WINDOWS
        .into_iter()
        .filter(|&w| w <= requested)
        .find(|&w| w <= n_samples)
        .unwrap_or(MIN_WINDOW)
}

/// Kernel weights for an odd window
pub fn epanechnikov_weights(window: usize) -> Vec<f64> {
    let edge = (window / 2) as i64;
    let d = (edge + 1) as f64;
    (-edge..=edge)
        .map(|k| {
            let u = k as f64 / d;
            let u = u / (u + 1.0);
            0.75 * (1.0 - u * u)
        })
        .collect()
}

/// Smoothed density and its first difference, indexed like the samples
#[derive(Debug, Clone, PartialEq)]
pub struct DensityCurve {
    window: usize,
    density: Vec<f64>,
    delta: Vec<f64>,
}

impl DensityCurve {
    pub fn new(samples: &[DiskSample], requested_window: usize) -> Self {
        let window = effective_window(requested_window, samples.len());
        let io = samples.iter().map(|s| s.delta_io).collect::<Vec<_>>();
        Self::from_io(&io, window)
    }

    /// Smooth raw per-period busy times with the given (odd) window
    pub fn from_io(io: &[f64], window: usize) -> Self {
        let weights = epanechnikov_weights(window);
        let edge = window / 2;
        let n = io.len();

        // out-of-range neighbours are skipped, never padded
        let density = (0..n)
            .map(|t| {
                let lo = t.saturating_sub(edge);
                let hi = (t + edge).min(n.saturating_sub(1));
                (lo..=hi)
                    .map(|idx| io[idx] * weights[idx + edge - t])
                    .sum::<f64>()
            })
            .collect::<Vec<_>>();

        let delta = (0..n)
            .map(|t| if t == 0 { 0.0 } else { density[t] - density[t - 1] })
            .collect();

        DensityCurve {
            window,
            density,
            delta,
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.density.len()
    }

    pub fn is_empty(&self) -> bool {
        self.density.is_empty()
    }

    pub fn density(&self) -> &[f64] {
        &self.density
    }

    pub fn delta(&self) -> &[f64] {
        &self.delta
    }

    /// Strictly above both neighbours; never true at either end
    pub fn is_local_max(&self, t: usize) -> bool {
        t > 0
            && t + 1 < self.len()
            && self.density[t] > self.density[t - 1]
            && self.density[t] > self.density[t + 1]
    }

    /// Strictly below both neighbours; never true at either end
    pub fn is_local_min(&self, t: usize) -> bool {
        t > 0
            && t + 1 < self.len()
            && self.density[t] < self.density[t - 1]
            && self.density[t] < self.density[t + 1]
    }

    /// Sum of the differences over `(start, end]`, accumulated left to right
    pub fn delta_sum(&self, start: usize, end: usize) -> f64 {
        let end = end.min(self.len().saturating_sub(1));
        (start + 1..=end).fold(0.0, |acc, t| acc + self.delta[t])
    }
}
