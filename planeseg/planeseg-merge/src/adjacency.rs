//! Region adjacency from a rasterized id map.

use hashbrown::HashSet;

use planeseg_types::NormalRegion;

/// Neighbour sets of `regions`, indexed like the input.
///
/// Regions are painted into an id raster covering their joint extent; two
/// regions are neighbours when a cell of one is directly right of or below a
/// cell of the other. Corner contact alone does not make neighbours.
#[must_use]
pub fn region_neighbors(regions: &[NormalRegion]) -> Vec<HashSet<usize>> {
    let width = regions.iter().map(|r| r.rect.right()).max().unwrap_or(0);
    let height = regions.iter().map(|r| r.rect.bottom()).max().unwrap_or(0);

    // 0 marks cells not covered by any region.
    let mut ids = vec![0usize; width * height];
    for (index, region) in regions.iter().enumerate() {
        let rect = region.rect;
        for row in rect.y..rect.bottom() {
            ids[row * width + rect.x..row * width + rect.right()].fill(index + 1);
        }
    }

    let mut neighbors = vec![HashSet::new(); regions.len()];
    let mut link = |a: usize, b: usize| {
        if a != 0 && b != 0 && a != b {
            neighbors[a - 1].insert(b - 1);
            neighbors[b - 1].insert(a - 1);
        }
    };
    for row in 0..height {
        for col in 0..width {
            let a = ids[row * width + col];
            if col + 1 < width {
                link(a, ids[row * width + col + 1]);
            }
            if row + 1 < height {
                link(a, ids[(row + 1) * width + col]);
            }
        }
    }
    neighbors
}
