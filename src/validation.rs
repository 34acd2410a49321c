use crate::error::{DeviationError, Result};
use crate::progress::Dataset;
use crate::store::{LineCollection, LineFeature};
use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo_types::{Coord, Line};
use log::debug;

/// True when a polyline crosses or touches itself away from shared vertices of
/// consecutive segments, or when consecutive segments run back over each other.
/// The shared end point of a closed loop is allowed.
pub fn is_self_intersecting(coords: &[Coord<f64>]) -> bool {
    let mut vertices = coords.to_vec();
    vertices.dedup();
    let segments: Vec<Line<f64>> = vertices.windows(2).map(|w| Line::new(w[0], w[1])).collect();
    let n = segments.len();
    let closed = n > 2 && vertices.first() == vertices.last();
    for i in 0..n {
        for j in (i + 1)..n {
            let Some(hit) = line_intersection(segments[i], segments[j]) else {
                continue;
            };
            let adjacent = j == i + 1 || (closed && i == 0 && j == n - 1);
            match hit {
                LineIntersection::Collinear { .. } => return true,
                LineIntersection::SinglePoint { .. } if !adjacent => return true,
                LineIntersection::SinglePoint { .. } => {}
            }
        }
    }
    false
}

/// Reason a single feature is unusable, if any.
pub fn feature_problem(feature: &LineFeature) -> Option<String> {
    let coords = feature.coords();
    if coords.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
        return Some(format!("feature {} has non-finite coordinates", feature.id));
    }
    let first = coords.first()?;
    if coords.iter().all(|c| c == first) {
        return Some(format!("feature {} has fewer than two distinct vertices", feature.id));
    }
    if is_self_intersecting(coords) {
        return Some(format!("feature {} is not simple, it crosses or overlaps itself", feature.id));
    }
    None
}

/// Reject a network that the pipeline cannot work with: empty input, non-finite
/// coordinates, lines without two distinct vertices and non-simple lines.
pub fn validate_network(dataset: Dataset, lines: &LineCollection) -> Result<()> {
    if lines.is_empty() {
        return Err(DeviationError::invalid_input(dataset.to_string(), "no line features"));
    }
    for feature in lines.iter() {
        if feature.coords().is_empty() {
            return Err(DeviationError::invalid_input(
                dataset.to_string(),
                format!("feature {} has an empty geometry", feature.id),
            ));
        }
        if let Some(problem) = feature_problem(feature) {
            return Err(DeviationError::invalid_input(dataset.to_string(), problem));
        }
    }
    debug!("{} dataset: {} features passed validation", dataset, lines.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Attributes, FeatureId};
    use geo_types::LineString;

    fn collection(coords: Vec<(f64, f64)>) -> LineCollection {
        LineCollection::new(vec![LineFeature::new(
            FeatureId(1),
            LineString::from(coords),
            Attributes::new(),
        )])
    }

    #[test]
    fn test_valid_network_passes() {
        assert!(validate_network(Dataset::Reference, &collection(vec![(0.0, 0.0), (1.0, 1.0)])).is_ok());
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(validate_network(Dataset::Reference, &LineCollection::default()).is_err());
        assert!(validate_network(Dataset::Candidate, &collection(vec![(1.0, 1.0), (1.0, 1.0)])).is_err());
        assert!(validate_network(Dataset::Candidate, &collection(vec![(0.0, f64::NAN), (1.0, 1.0)])).is_err());
        let err = validate_network(Dataset::Candidate, &collection(vec![])).unwrap_err();
        assert!(err.to_string().contains("candidate"));

        let bowtie = vec![(0.0, 0.0), (2.0, 2.0), (2.0, 0.0), (0.0, 2.0)];
        let err = validate_network(Dataset::Reference, &collection(bowtie)).unwrap_err();
        assert!(err.to_string().contains("feature 1"));
        assert!(err.to_string().contains("not simple"));
    }

    #[test]
    fn test_simplicity() {
        let c = |pts: &[(f64, f64)]| -> Vec<Coord<f64>> { pts.iter().map(|&(x, y)| Coord { x, y }).collect() };
        assert!(!is_self_intersecting(&c(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)])));
        assert!(!is_self_intersecting(&c(&[(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (1.0, 1.0)])));
        assert!(!is_self_intersecting(&c(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)])));
        // runs back over its previous segment
        assert!(is_self_intersecting(&c(&[(0.0, 0.0), (2.0, 0.0), (1.0, 0.0)])));
        // touches its own start away from a loop closure
        assert!(is_self_intersecting(&c(&[(0.0, 0.0), (2.0, 0.0), (2.0, 1.0), (1.0, 0.0)])));
        assert!(validate_network(Dataset::Candidate, &collection(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)])).is_ok());
    }
}
