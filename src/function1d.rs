// Function (1-D) interpolation (§4.10): a monotone-segment fill over a
// Function's X/Y embedded axes. Grounded in
// `original_source/core/entity/Function.py`'s `monotone_interpolated`,
// reworked around the simpler two-pass description in §4.10 rather than
// the original's `numpy` masked-array machinery.

/// Densify `values` over `indices`' index space by the monotone-segment
/// fill algorithm: keep only the maximal non-decreasing run of indices as
/// anchors, drop each anchor's value at its rounded position, and fill
/// gaps between anchors by linear interpolation seeded from the
/// preceding anchor's value, keeping only the trailing `d-1` samples.
pub fn monotone_interpolated(indices: &[f64], values: &[f64]) -> Vec<f64> {
    debug_assert_eq!(indices.len(), values.len());

    let mut anchors: Vec<(i64, f64)> = Vec::new();
    let mut high_water = f64::NEG_INFINITY;
    for (idx, &val) in indices.iter().zip(values) {
        if *idx >= high_water {
            high_water = *idx;
            anchors.push((idx.round() as i64, val));
        }
    }

    let mut out = vec![0.0; values.len()];
    for &(pos, val) in &anchors {
        if pos >= 0 && (pos as usize) < out.len() {
            out[pos as usize] = val;
        }
    }

    for pair in anchors.windows(2) {
        let (pos_a, val_a) = pair[0];
        let (pos_b, val_b) = pair[1];
        let d = pos_b - pos_a;
        if d > 1 {
            for k in 1..d {
                let t = k as f64 / d as f64;
                out[(pos_a + k) as usize] = val_a + (val_b - val_a) * t;
            }
        }
    }

    out
}
