//! Grid spacing estimation and neighbourhood windows.

use planeseg_types::{Cloud, Point};

fn xy_distance(a: &Point, b: &Point) -> f32 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Estimate the XY distance spanned by one grid cell.
///
/// Tries, in order: the first finite pair of mirrored rows in one column,
/// the first finite pair of mirrored columns in one row, then the first
/// finite right or down neighbour. Returns `0.0` when no pair exists.
///
/// # Example
///
/// ```
/// use planeseg_types::{Cloud, Point};
/// use planeseg_normals::grid::cell_distance;
///
/// let cloud = Cloud::from_fn(10, 10, |c, r| Point::new(c as f32 * 0.05, r as f32 * 0.05, 1.0));
/// assert!((cell_distance(&cloud) - 0.05).abs() < 1e-5);
/// ```
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn cell_distance(cloud: &Cloud) -> f32 {
    let (cols, rows) = (cloud.width, cloud.height);
    if !cloud.has_valid_size() {
        return 0.0;
    }
    let at = |col: usize, row: usize| &cloud.points[cloud.index(col, row)];

    for up in 0..rows / 2 {
        let down = rows - up - 1;
        for col in 0..cols {
            let (a, b) = (at(col, up), at(col, down));
            if a.is_finite() && b.is_finite() {
                return xy_distance(a, b) / (down - up) as f32;
            }
        }
    }

    for row in 0..rows {
        for left in 0..cols / 2 {
            let right = cols - left - 1;
            let (a, b) = (at(left, row), at(right, row));
            if a.is_finite() && b.is_finite() {
                return xy_distance(a, b) / (right - left) as f32;
            }
        }
    }

    for row in 0..rows {
        for col in 0..cols {
            let p = at(col, row);
            if !p.is_finite() {
                continue;
            }
            if col + 1 < cols && at(col + 1, row).is_finite() {
                return xy_distance(p, at(col + 1, row));
            }
            if row + 1 < rows && at(col, row + 1).is_finite() {
                return xy_distance(p, at(col, row + 1));
            }
        }
    }

    0.0
}

/// Window radius, in cells, covering `search_radius`.
///
/// Always at least one. A zero or non-finite cell distance also yields one.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn neighbor_levels(search_radius: f32, cell_distance: f32) -> usize {
    if !cell_distance.is_finite() || cell_distance <= 0.0 {
        return 1;
    }
    let levels = (search_radius / cell_distance).floor();
    // Cap far beyond any practical grid so the cast cannot wrap.
    levels.clamp(1.0, 65_535.0) as usize
}

/// Call `f` with the row-major index of every cell inside the circular
/// window of radius `levels` around `(col, row)`, clamped to the grid.
///
/// Cells are visited row by row, left to right.
pub fn for_each_in_window(
    width: usize,
    height: usize,
    col: usize,
    row: usize,
    levels: usize,
    mut f: impl FnMut(usize),
) {
    let r2 = levels * levels;
    let y0 = row.saturating_sub(levels);
    let y1 = (row + levels).min(height.saturating_sub(1));
    let x0 = col.saturating_sub(levels);
    let x1 = (col + levels).min(width.saturating_sub(1));
    for y in y0..=y1 {
        let dy = y.abs_diff(row);
        for x in x0..=x1 {
            let dx = x.abs_diff(col);
            if dx * dx + dy * dy <= r2 {
                f(y * width + x);
            }
        }
    }
}
