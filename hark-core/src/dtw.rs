//! Dynamic time warping over feature-vector sequences.
//!
//! ## Algorithm
//!
//! 1. Local cost `C[i][j]` is the Euclidean distance between `a[i]` and
//!    `b[j]`.
//! 2. Accumulated cost `D[i][j] = C[i][j] + min(D[i-1][j], D[i][j-1],
//!    D[i-1][j-1])`, with `D[0][0] = C[0][0]` and the first row and column
//!    accumulated along their single feasible edge.
//! 3. The distance is the corner `D[|a|-1][|b|-1]`.
//!
//! The full matrix is evaluated, no warping-window constraint is applied.
//! Only the scalar distance is needed downstream, so the matrix is kept as a
//! rolling pair of rows: O(|a|·|b|) time, O(|b|) space.

/// Elastic alignment distance between two sequences of equal-dimension
/// feature vectors.
///
/// Both sequences must be non-empty; an empty side has no alignment and the
/// result is `f32::INFINITY`.
pub fn distance(a: &[Vec<f32>], b: &[Vec<f32>]) -> f32 {
    if a.is_empty() || b.is_empty() {
        return f32::INFINITY;
    }

    let mut prev = vec![0.0f32; b.len()];
    let mut curr = vec![0.0f32; b.len()];

    prev[0] = euclidean(&a[0], &b[0]);
    for j in 1..b.len() {
        prev[j] = prev[j - 1] + euclidean(&a[0], &b[j]);
    }

    for i in 1..a.len() {
        curr[0] = prev[0] + euclidean(&a[i], &b[0]);
        for j in 1..b.len() {
            let cheapest = prev[j - 1].min(prev[j]).min(curr[j - 1]);
            curr[j] = cheapest + euclidean(&a[i], &b[j]);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len() - 1]
}

fn euclidean(x: &[f32], y: &[f32]) -> f32 {
    debug_assert_eq!(x.len(), y.len(), "feature dimensions must match");
    x.iter()
        .zip(y)
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f32>()
        .sqrt()
}
