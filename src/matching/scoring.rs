use crate::config::MatchOptions;
use crate::geometry;
use crate::store::LineFeature;

/// Weights of the fit terms, in the order length ratio, direction,
/// positional deviation, hausdorff.
const FIT_WEIGHTS: [f64; 4] = [2.0, 1.0, 4.0, 2.0];
const FIT_DIVISOR: f64 = 9.0;

/// Geometric comparison of one reference/candidate pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMetrics {
    /// Longer length over shorter length, at least 1.
    pub length_ratio: f64,
    /// Orientation-free difference of the start to end directions.
    pub direction_diff: f64,
    pub positional_deviation: f64,
    pub hausdorff_approx: f64,
    pub mean_length: f64,
}

pub fn line_direction(feature: &LineFeature) -> Option<f64> {
    feature.direction.or_else(|| geometry::direction(feature.coords()))
}

/// Orientation-free direction difference; lines without a direction (closed
/// loops) are treated as agreeing.
pub fn direction_diff(a: &LineFeature, b: &LineFeature) -> f64 {
    match (line_direction(a), line_direction(b)) {
        (Some(a), Some(b)) => geometry::orientation_free_diff(a, b),
        _ => 0.0,
    }
}

pub fn length_ratio(a: f64, b: f64) -> f64 {
    let (short, long) = if a < b { (a, b) } else { (b, a) };
    if short <= 0.0 { f64::INFINITY } else { long / short }
}

/// Mean of the two directional mean sampled distances. Symmetric in its arguments.
pub fn positional_deviation(a: &[geo_types::Coord<f64>], b: &[geo_types::Coord<f64>], interval: f64) -> f64 {
    let there = geometry::mean_sampled_distance(a, b, interval);
    let back = geometry::mean_sampled_distance(b, a, interval);
    (there + back) / 2.0
}

pub fn measure(reference: &LineFeature, candidate: &LineFeature, options: &MatchOptions) -> PairMetrics {
    let ref_len = reference.length();
    let cand_len = candidate.length();
    PairMetrics {
        length_ratio: length_ratio(ref_len, cand_len),
        direction_diff: direction_diff(reference, candidate),
        positional_deviation: positional_deviation(
            reference.coords(),
            candidate.coords(),
            options.posdev_sample_interval,
        ),
        hausdorff_approx: geometry::sampled_hausdorff(
            reference.coords(),
            candidate.coords(),
            options.hausdorff_sample_interval,
        ),
        mean_length: (ref_len + cand_len) / 2.0,
    }
}

/// Whether a scored pair stays in the running.
pub fn passes_filters(m: &PairMetrics, options: &MatchOptions) -> bool {
    if m.length_ratio > options.max_length_ratio {
        return false;
    }
    if m.positional_deviation / m.mean_length > options.max_posdev_to_length + options.min_posdev_to_length {
        return false;
    }
    if m.direction_diff > options.max_azimuth_diff {
        return false;
    }
    m.positional_deviation <= options.max_abs_posdev
}

/// Weighted, normalised sum of the pair metrics. Lower is better.
pub fn fit(m: &PairMetrics, options: &MatchOptions) -> f64 {
    let [w_len, w_dir, w_pos, w_haus] = FIT_WEIGHTS;
    (w_len * m.length_ratio
        + w_dir * m.direction_diff / options.max_azimuth_diff
        + w_pos * m.positional_deviation / (m.mean_length * options.max_posdev_to_length)
        + w_haus * m.hausdorff_approx)
        / FIT_DIVISOR
}
