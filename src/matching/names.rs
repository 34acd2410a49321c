use crate::store::{FeatureId, Relation};

/// Relation kind whose names are compared with reference names.
pub const ROAD_ROUTE: &str = "road";

/// Edit distance between two names.
pub fn name_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Name of the road relation a candidate source feature belongs to. When the
/// feature is part of several, the relation with the lowest id wins.
pub fn road_relation_name(relations: &[Relation], source: FeatureId) -> Option<&str> {
    relations
        .iter()
        .filter(|r| r.route.as_deref() == Some(ROAD_ROUTE))
        .filter(|r| r.members.contains(&source))
        .filter_map(|r| {
            let name = r.name.as_deref()?;
            (!name.is_empty()).then_some((r.id, name))
        })
        .min_by_key(|(id, _)| *id)
        .map(|(_, name)| name)
}
