use crate::config::QualityBands;
use crate::model::{BandCount, DistanceStats, QualityBand, ThresholdCount};

/// Linear-interpolated quantile over ascending `sorted`, `q` in [0, 1].
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = pos.floor() as usize;
            let hi = pos.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
        }
    }
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|d| d.is_finite()).collect();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Summary statistics over match distances. `None` when there are no matches.
pub fn distance_stats(distances: &[f64]) -> Option<DistanceStats> {
    let sorted = sorted_copy(distances);
    let n = sorted.len();
    if n == 0 {
        return None;
    }

    let mean = sorted.iter().sum::<f64>() / n as f64;
    let std = if n > 1 {
        let var = sorted.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
        Some(var.sqrt())
    } else {
        None
    };

    let median = quantile(&sorted, 0.5);
    let deviations = sorted_copy(&sorted.iter().map(|d| (d - median).abs()).collect::<Vec<_>>());
    let (p25, p75) = (quantile(&sorted, 0.25), quantile(&sorted, 0.75));

    Some(DistanceStats {
        count: n,
        min_m: sorted[0],
        p10_m: quantile(&sorted, 0.10),
        p25_m: p25,
        median_m: median,
        p75_m: p75,
        p90_m: quantile(&sorted, 0.90),
        max_m: sorted[n - 1],
        mean_m: mean,
        std_m: std,
        mad_m: quantile(&deviations, 0.5),
        iqr_m: p75 - p25,
    })
}

/// Cumulative "within N meters" counts. Percentages are of `distances.len()`.
pub fn threshold_counts(distances: &[f64], thresholds: &[f64]) -> Vec<ThresholdCount> {
    let total = distances.len();
    thresholds
        .iter()
        .map(|&t| {
            let count = distances.iter().filter(|d| **d <= t).count();
            ThresholdCount {
                within_m: t,
                count,
                pct: pct(count, total),
            }
        })
        .collect()
}

pub fn classify_band(distance_m: f64, bands: &QualityBands) -> QualityBand {
    if distance_m < bands.excellent_below_m {
        QualityBand::Excellent
    } else if distance_m < bands.good_below_m {
        QualityBand::Good
    } else if distance_m <= bands.fair_up_to_m {
        QualityBand::Fair
    } else {
        QualityBand::Poor
    }
}

/// Counts for every band, in band order, including empty ones.
pub fn band_counts(distances: &[f64], bands: &QualityBands) -> Vec<BandCount> {
    let total = distances.len();
    [QualityBand::Excellent, QualityBand::Good, QualityBand::Fair, QualityBand::Poor]
        .into_iter()
        .map(|band| {
            let count = distances.iter().filter(|d| classify_band(**d, bands) == band).count();
            BandCount {
                band,
                count,
                pct: pct(count, total),
            }
        })
        .collect()
}

pub fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}
