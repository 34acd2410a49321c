//! Harmonization of two line networks.
//!
//! Both networks are cleaned and presplit on their own, then junctions are
//! matched across them. Junction points left unmatched on one side become
//! cutpoints on the other, so that after resegmentation both networks are
//! split at the same places wherever they agree.

pub mod cleaner;
pub mod cutpoints;
pub mod junction_matcher;
pub mod junctions;
pub mod resegment;
pub mod splitter;

pub use cleaner::{CleanReport, clean_network};
pub use cutpoints::{Cutpoint, generate_cutpoints};
pub use junction_matcher::{JunctionMatch, JunctionOffset, junction_deviation_lines, match_junctions};
pub use junctions::{Junction, JunctionId, JunctionPoint, JunctionPointId, JunctionSet, build_junctions};
pub use resegment::resegment;
pub use splitter::split_at_intersections;
