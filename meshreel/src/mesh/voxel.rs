/// Voxels on the 3-D Bresenham line from `from` to `to`, both included.
///
/// The axis with the largest extent drives the walk (x before y before z on ties), so the
/// line has `max(|dx|, |dy|, |dz|) + 1` voxels and consecutive voxels touch at least at a
/// corner.
pub fn voxel_line(from: [u32; 3], to: [u32; 3]) -> Vec<[u32; 3]> {
    let start = from.map(i64::from);
    let end = to.map(i64::from);
    let delta = [0, 1, 2].map(|a| (end[a] - start[a]).abs());
    let step = [0, 1, 2].map(|a| if end[a] > start[a] { 1 } else { -1 });

    let major = if delta[0] >= delta[1] && delta[0] >= delta[2] {
        0
    } else if delta[1] >= delta[2] {
        1
    } else {
        2
    };
    let (a1, a2) = match major {
        0 => (1, 2),
        1 => (0, 2),
        _ => (0, 1),
    };

    let d0 = delta[major];
    let mut p1 = 2 * delta[a1] - d0;
    let mut p2 = 2 * delta[a2] - d0;
    let mut cursor = start;
    let mut line = Vec::with_capacity(d0 as usize + 1);
    line.push(cursor);
    for _ in 0..d0 {
        cursor[major] += step[major];
        if p1 >= 0 {
            cursor[a1] += step[a1];
            p1 -= 2 * d0;
        }
        if p2 >= 0 {
            cursor[a2] += step[a2];
            p2 -= 2 * d0;
        }
        p1 += 2 * delta[a1];
        p2 += 2 * delta[a2];
        line.push(cursor);
    }

    // Every voxel lies inside the box spanned by the endpoints, so it fits in u32.
    line.into_iter()
        .map(|v| v.map(|c| c as u32))
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/mesh/voxel.rs"]
mod tests;
