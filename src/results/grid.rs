use crate::geometry;
use crate::store::{LineCollection, LineFeature};
use geo_types::Coord;
use rstar::AABB;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::DeviationSegment;

/// One square cell of an aggregation grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub column: i32,
    pub row: i32,
    pub min: Coord<f64>,
    pub max: Coord<f64>,
    pub value: f64,
}

/// Square cells anchored at the lower left corner of the reference extent.
/// Only cells overlapping that extent exist.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    origin: Coord<f64>,
    cell_size: f64,
    columns: i32,
    rows: i32,
}

impl Grid {
    /// `None` when the extent needs more columns or rows than an `i32` cell
    /// key can address.
    pub fn over(extent: &AABB<[f64; 2]>, cell_size: f64) -> Option<Self> {
        let [min_x, min_y] = extent.lower();
        let [max_x, max_y] = extent.upper();
        let count = |span: f64| {
            let cells = (span / cell_size).ceil().max(1.0);
            (cells.is_finite() && cells <= f64::from(i32::MAX)).then_some(cells as i32)
        };
        Some(Self {
            origin: Coord { x: min_x, y: min_y },
            cell_size,
            columns: count(max_x - min_x)?,
            rows: count(max_y - min_y)?,
        })
    }

    /// Grid over the bounding box of a line collection, `None` when it is empty
    /// or too large for the cell size.
    pub fn for_lines(lines: &LineCollection, cell_size: f64) -> Option<Self> {
        let coords: Vec<Coord<f64>> = lines.iter().flat_map(|f| f.coords().iter().copied()).collect();
        if coords.is_empty() {
            return None;
        }
        Self::over(&geometry::envelope(&coords), cell_size)
    }

    /// Cell index of a point, clamped to one cell outside the grid on each side.
    fn cell_of(&self, x: f64, y: f64) -> (i32, i32) {
        let index = |offset: f64, count: i32| {
            (offset / self.cell_size)
                .floor()
                .clamp(-1.0, f64::from(count)) as i32
        };
        (index(x - self.origin.x, self.columns), index(y - self.origin.y, self.rows))
    }

    fn bounds(&self, column: i32, row: i32) -> (Coord<f64>, Coord<f64>) {
        let min = Coord {
            x: self.origin.x + column as f64 * self.cell_size,
            y: self.origin.y + row as f64 * self.cell_size,
        };
        let max = Coord {
            x: min.x + self.cell_size,
            y: min.y + self.cell_size,
        };
        (min, max)
    }

    fn cell(&self, column: i32, row: i32, value: f64) -> GridCell {
        let (min, max) = self.bounds(column, row);
        GridCell {
            column,
            row,
            min,
            max,
            value,
        }
    }

    /// Cells a segment touches, with the length of the segment inside each.
    fn segment_cells(&self, a: Coord<f64>, b: Coord<f64>) -> Vec<((i32, i32), f64)> {
        let (c0, r0) = self.cell_of(a.x.min(b.x), a.y.min(b.y));
        let (c1, r1) = self.cell_of(a.x.max(b.x), a.y.max(b.y));
        let mut out = Vec::new();
        for column in c0.max(0)..=c1.min(self.columns - 1) {
            for row in r0.max(0)..=r1.min(self.rows - 1) {
                let (min, max) = self.bounds(column, row);
                if let Some((p, q)) = clip_segment(a, b, min, max) {
                    out.push(((column, row), geometry::distance(p, q)));
                }
            }
        }
        out
    }

    /// Total line length per touched cell.
    fn lengths(&self, lines: &LineCollection, keep: impl Fn(&LineFeature) -> bool) -> BTreeMap<(i32, i32), f64> {
        let mut per_cell = BTreeMap::new();
        for feature in lines.iter().filter(|f| keep(f)) {
            for w in feature.coords().windows(2) {
                for (key, len) in self.segment_cells(w[0], w[1]) {
                    *per_cell.entry(key).or_insert(0.0) += len;
                }
            }
        }
        per_cell
    }
}

/// Liang-Barsky clipping of a segment against an axis-aligned box. Touching
/// the box boundary counts as intersecting.
pub fn clip_segment(a: Coord<f64>, b: Coord<f64>, min: Coord<f64>, max: Coord<f64>) -> Option<(Coord<f64>, Coord<f64>)> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;

    for (p, q) in [
        (-dx, a.x - min.x),
        (dx, max.x - a.x),
        (-dy, a.y - min.y),
        (dy, max.y - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let t = q / p;
        if p < 0.0 {
            if t > t1 {
                return None;
            }
            t0 = t0.max(t);
        } else {
            if t < t0 {
                return None;
            }
            t1 = t1.min(t);
        }
    }

    let at = |t: f64| Coord {
        x: a.x + t * dx,
        y: a.y + t * dy,
    };
    Some((at(t0), at(t1)))
}

/// Largest deviation vector length per cell.
pub fn max_deviation_grid(grid: &Grid, vectors: &[DeviationSegment]) -> Vec<GridCell> {
    let mut per_cell: BTreeMap<(i32, i32), f64> = BTreeMap::new();
    for v in vectors {
        for (key, _) in grid.segment_cells(v.start, v.end) {
            let entry = per_cell.entry(key).or_insert(v.length);
            *entry = entry.max(v.length);
        }
    }
    per_cell
        .into_iter()
        .map(|((c, r), value)| grid.cell(c, r, value))
        .collect()
}

/// Share of reference length per cell that belongs to matched segments.
pub fn matching_rate_grid(
    grid: &Grid,
    reference: &LineCollection,
    is_matched: impl Fn(&LineFeature) -> bool,
) -> Vec<GridCell> {
    let total = grid.lengths(reference, |_| true);
    let matched = grid.lengths(reference, is_matched);
    total
        .into_iter()
        .filter(|(_, len)| *len > 0.0)
        .map(|(key, len)| {
            let m = matched.get(&key).copied().unwrap_or(0.0);
            grid.cell(key.0, key.1, m / len)
        })
        .collect()
}

/// Reference length over candidate length per cell, where both are present.
pub fn completeness_grid(grid: &Grid, reference: &LineCollection, candidate: &LineCollection) -> Vec<GridCell> {
    let ref_len = grid.lengths(reference, |_| true);
    let cand_len = grid.lengths(candidate, |_| true);
    ref_len
        .into_iter()
        .filter_map(|(key, r)| {
            let c = *cand_len.get(&key)?;
            (r > 0.0 && c > 0.0).then(|| grid.cell(key.0, key.1, r / c))
        })
        .collect()
}
