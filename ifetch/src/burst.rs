//! Burst intervals: spans from a local minimum to a local maximum of the density curve

use crate::density::DensityCurve;

/// How a burst was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstKind {
    /// Scanned from a local minimum to the next local maximum; scored over `[start, end]`
    Scan,

    /// Global minimum to global maximum, used when the scan finds nothing; scored over `(start, end]`
    GlobalSpan,
}

/// A ramp-up of disk activity, as indices into the density curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BurstInterval {
    /// Index of the minimum
    pub start: usize,

    /// Index of the maximum
    pub end: usize,

    /// Sum of the density differences over `delta_range()`
    pub score: f64,

    pub kind: BurstKind,
}

impl BurstInterval {
    /// Indices whose differences make up the score
    pub fn delta_range(&self) -> std::ops::Range<usize> {
        match self.kind {
            BurstKind::Scan => self.start..self.end + 1,
            BurstKind::GlobalSpan => self.start + 1..self.end + 1,
        }
    }
}

/// Find every minimum-to-maximum span that grows net activity
///
/// The drop into the minimum counts against the span, so a shallow rise out of a deep fall is
/// not a burst
///
/// If there is none, the span from the global minimum to the global maximum is used instead
/// (provided the minimum comes first)
pub fn find_bursts(curve: &DensityCurve) -> Vec<BurstInterval> {
    let n = curve.len();
    let delta = curve.delta();
    let mut bursts = Vec::new();

    let mut open: Option<(usize, f64)> = None;
    for t in 1..n.saturating_sub(1) {
        if curve.is_local_min(t) {
            open = Some((t, delta[t]));
        } else if let Some((_, sum)) = open.as_mut() {
            *sum += delta[t];
        }

        if curve.is_local_max(t) {
            if let Some((start, score)) = open.take() {
                if score > 0.0 {
                    bursts.push(BurstInterval {
                        start,
                        end: t,
                        score,
                        kind: BurstKind::Scan,
                    });
                }
            }
        }
    }

    if bursts.is_empty() && n >= 2 {
        if let Some(burst) = global_span(curve) {
            bursts.push(burst);
        }
    }

    bursts
}

fn global_span(curve: &DensityCurve) -> Option<BurstInterval> {
    let density = curve.density();
    let mut min = 0;
    let mut max = 0;
    for (t, &v) in density.iter().enumerate() {
        if v < density[min] {
            min = t;
        }
        if v > density[max] {
            max = t;
        }
    }

    (min < max).then(|| BurstInterval {
        start: min,
        end: max,
        score: curve.delta_sum(min, max),
        kind: BurstKind::GlobalSpan,
    })
}

/// Highest score first (stable), keeping at most `k`
pub fn rank(mut bursts: Vec<BurstInterval>, k: usize) -> Vec<BurstInterval> {
    bursts.sort_by(|a, b| b.score.total_cmp(&a.score));
    bursts.truncate(k);
    bursts
}
