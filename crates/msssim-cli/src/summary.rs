/// Aggregated statistics over a set of scores.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub(crate) struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population variance
    pub var: f64,
    pub stddev: f64,
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
}

impl Stats {
    /// `None` when there is nothing to summarize.
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_unstable_by(|a, b| a.total_cmp(b));
        let mean = sorted.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
        Some(Self {
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean,
            var,
            stddev: var.sqrt(),
            p5: percentile_of_sorted(&sorted, 5.0),
            p50: percentile_of_sorted(&sorted, 50.0),
            p95: percentile_of_sorted(&sorted, 95.0),
        })
    }
}

// Linear interpolation between the closest ranks. `sorted` must be sorted and non-empty.
fn percentile_of_sorted(sorted: &[f64], pct: f64) -> f64 {
    let last = sorted.len() - 1;
    if last == 0 || pct >= 100.0 {
        return sorted[last];
    }
    let rank = (pct.max(0.0) / 100.0) * last as f64;
    let lo = rank.floor() as usize;
    let d = rank - lo as f64;
    sorted[lo] + (sorted[lo + 1] - sorted[lo]) * d
}
