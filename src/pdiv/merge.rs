//! Merge engine: one reduction step for one rank.
//!
//! Two neighbouring segments `U` (ranks `start..=middle`) and `D` (ranks
//! `middle+1..=end`) are joined through the bridge `Bu = A[last(U), first(D)]`,
//! `Bl = A[first(D), last(U)]`. The inverse of the joined segment follows
//! from the segment inverses by a rank-`2b` Woodbury update that only
//! involves the corners of `G_U` and `G_D` at the bridge:
//!
//! ```text
//! J = inv([[I, -DUL·Bl], [-ULR·Bu, I]])      ULR = G_U(last, last), DUL = G_D(first, first)
//!
//! i, j in U:  G = G_U + G_U(i, uL)·Bu·J12·G_U(uL, j)
//! i, j in D:  G = G_D + G_D(i, dF)·Bl·J21·G_D(dF, j)
//! i in U, j in D:  G = -G_U(i, uL)·Bu·J11·G_D(dF, j)
//! i in D, j in U:  G = -G_D(i, dF)·Bl·J22·G_U(uL, j)
//! ```
//!
//! Each rank rewrites these identities in terms of its own maps, so every
//! rank of the group needs only the six boundary blocks and the bridge.

use std::cmp::Ordering;

use log::debug;

use crate::core::block::{Block, Corners, from_quadrants, hstack, identity, negated, product, sub_block, vstack};
use crate::core::traits::Scalar;
use crate::error::{PdivError, Result};
use crate::parallel::{Comm, Tag};
use crate::partition::Bridge;
use crate::pdiv::maps::{CrossMap, MapSet, MatrixMap};
use crate::pdiv::reduction::{MergeGroup, MergeRole};
use crate::pdiv::unpack;
use crate::solver::direct_lu::invert;

/// Blocks computed by the middle rank of a group.
#[derive(Debug, Clone)]
pub struct UpperBoundary<T> {
    /// `G_U(first(U), last(U))`
    pub uur: Block<T>,
    /// `G_U(last(U), first(U))`
    pub ull: Block<T>,
    /// `G_U(last(U), last(U))`
    pub ulr: Block<T>,
}

/// Blocks computed by the rank right after the middle.
#[derive(Debug, Clone)]
pub struct LowerBoundary<T> {
    /// `G_D(first(D), first(D))`
    pub dul: Block<T>,
    /// `G_D(first(D), last(D))`
    pub dur: Block<T>,
    /// `G_D(last(D), first(D))`
    pub dll: Block<T>,
}

#[derive(Debug, Clone)]
pub struct JFactor<T> {
    pub j11: Block<T>,
    pub j12: Block<T>,
    pub j21: Block<T>,
    pub j22: Block<T>,
}

/// Everything a rank needs to apply one merge to its maps.
#[derive(Debug, Clone)]
pub struct MergeBoundary<T> {
    pub upper: UpperBoundary<T>,
    pub lower: LowerBoundary<T>,
    pub bridge: Bridge<T>,
    pub j: JFactor<T>,
}

pub fn upper_boundary<T: Scalar>(m: &MatrixMap<T>, g: &Corners<T>) -> UpperBoundary<T> {
    let phi = m.correction();
    UpperBoundary {
        uur: &(&m[0] * &g.fl) + &(&m[1] * &g.ll),
        ull: &(&g.lf * &m[4]) + &(&g.ll * &m[5]),
        ulr: &g.ll + &product(&hstack(&g.lf, &g.ll), &[&phi, &vstack(&g.fl, &g.ll)]),
    }
}

pub fn lower_boundary<T: Scalar>(m: &MatrixMap<T>, g: &Corners<T>) -> LowerBoundary<T> {
    let phi = m.correction();
    LowerBoundary {
        dul: &g.ff + &product(&hstack(&g.ff, &g.fl), &[&phi, &vstack(&g.ff, &g.lf)]),
        dur: &(&g.ff * &m[2]) + &(&g.fl * &m[3]),
        dll: &(&m[6] * &g.ff) + &(&m[7] * &g.lf),
    }
}

pub fn j_factor<T: Scalar>(
    dul: &Block<T>,
    ulr: &Block<T>,
    bridge: &Bridge<T>,
    tolerance: f64,
    rank: usize,
    step: usize,
) -> Result<JFactor<T>> {
    let b = dul.nrows();
    let eye = identity::<T>(b);
    let system = from_quadrants(
        &eye,
        &negated(&(dul * &bridge.lower)),
        &negated(&(ulr * &bridge.upper)),
        &eye,
    );
    let j = invert(&system, tolerance).ok_or(PdivError::Singular { what: "J factor", rank, step })?;
    Ok(JFactor {
        j11: sub_block(&j, 0, 0, b, b),
        j12: sub_block(&j, 0, b, b, b),
        j21: sub_block(&j, b, 0, b, b),
        j22: sub_block(&j, b, b, b, b),
    })
}

/// `[a; b]·k·[c d]`
fn outer<T: Scalar>(a: &Block<T>, b: &Block<T>, k: &[&Block<T>], c: &Block<T>, d: &Block<T>) -> Block<T> {
    let mut chain: Vec<&Block<T>> = k.to_vec();
    let right = hstack(c, d);
    chain.push(&right);
    product(&vstack(a, b), &chain)
}

/// Cross map update of a rank whose successor `next` is in the same group.
/// `own` and `next` are both pre-update matrix maps.
pub fn update_cross_map<T: Scalar>(
    cross: &mut CrossMap<T>,
    position: Ordering,
    own: &MatrixMap<T>,
    next: &MatrixMap<T>,
    mb: &MergeBoundary<T>,
) {
    let (bu, bl, j) = (&mb.bridge.upper, &mb.bridge.lower, &mb.j);
    let (x, y) = match position {
        Ordering::Less => (
            outer(&own[2], &own[3], &[bu, &j.j12], &next[6], &next[7]),
            outer(&next[2], &next[3], &[bu, &j.j12], &own[6], &own[7]),
        ),
        Ordering::Equal => (
            negated(&outer(&own[2], &own[3], &[bu, &j.j11], &next[0], &next[1])),
            negated(&outer(&next[4], &next[5], &[bl, &j.j22], &own[6], &own[7])),
        ),
        Ordering::Greater => (
            outer(&own[4], &own[5], &[bl, &j.j21], &next[0], &next[1]),
            outer(&next[4], &next[5], &[bl, &j.j21], &own[0], &own[1]),
        ),
    };
    cross.add_upper(&x);
    cross.add_lower(&y);
}

/// New matrix map after the merge, computed entirely from the old one.
pub fn update_matrix_map<T: Scalar>(m: &MatrixMap<T>, upper_half: bool, mb: &MergeBoundary<T>) -> MatrixMap<T> {
    let (bu, bl, j) = (&mb.bridge.upper, &mb.bridge.lower, &mb.j);
    let (up, low) = (&mb.upper, &mb.lower);
    let mut next = m.clone();
    if upper_half {
        next[0] = &m[0] + &product(&up.uur, &[bu, &j.j12, &m[6]]);
        next[1] = &m[1] + &product(&up.uur, &[bu, &j.j12, &m[7]]);
        next[2] = negated(&product(&m[2], &[bu, &j.j11, &low.dur]));
        next[3] = negated(&product(&m[3], &[bu, &j.j11, &low.dur]));
        next[4] = &m[4] + &product(&m[2], &[bu, &j.j12, &up.ull]);
        next[5] = &m[5] + &product(&m[3], &[bu, &j.j12, &up.ull]);
        next[6] = negated(&product(&low.dll, &[bl, &j.j22, &m[6]]));
        next[7] = negated(&product(&low.dll, &[bl, &j.j22, &m[7]]));
        next.add_correction(&outer(&m[2], &m[3], &[bu, &j.j12], &m[6], &m[7]));
    } else {
        next[0] = negated(&product(&up.uur, &[bu, &j.j11, &m[0]]));
        next[1] = negated(&product(&up.uur, &[bu, &j.j11, &m[1]]));
        next[2] = &m[2] + &product(&m[4], &[bl, &j.j21, &low.dur]);
        next[3] = &m[3] + &product(&m[5], &[bl, &j.j21, &low.dur]);
        next[4] = negated(&product(&m[4], &[bl, &j.j22, &up.ull]));
        next[5] = negated(&product(&m[5], &[bl, &j.j22, &up.ull]));
        next[6] = &m[6] + &product(&low.dll, &[bl, &j.j21, &m[0]]);
        next[7] = &m[7] + &product(&low.dll, &[bl, &j.j21, &m[1]]);
        next.add_correction(&outer(&m[4], &m[5], &[bl, &j.j21], &m[0], &m[1]));
    }
    next
}

/// Runs this rank's part of merging `group` at `step` and updates `maps`.
///
/// `corners` are the corners of the rank's local inverse; `bridge` is the
/// rank's own bridge (`None` on the last rank).
pub fn merge_step<C: Comm>(
    comm: &C,
    group: MergeGroup,
    step: usize,
    corners: &Corners<C::Scalar>,
    bridge: Option<&Bridge<C::Scalar>>,
    maps: &mut MapSet<C::Scalar>,
    tolerance: f64,
) -> Result<()> {
    let rank = comm.rank();
    let role = group.role(rank);
    debug!(
        "step {step}: rank {rank} in [{}, {}] around {} ({role:?})",
        group.start, group.end, group.middle
    );

    let (upper, bridge) = if role.contains(MergeRole::PRODUCES_UPPER) {
        let bridge = bridge
            .ok_or_else(|| PdivError::Runtime(format!("rank {rank} owns no bridge but is a merge middle")))?
            .clone();
        let upper = upper_boundary(&maps.matrix, corners);
        let blocks = [
            upper.uur.clone(),
            upper.ull.clone(),
            upper.ulr.clone(),
            bridge.upper.clone(),
            bridge.lower.clone(),
        ];
        comm.send_to_all(group.ranks(), Tag::UpperBoundary, &blocks)?;
        (upper, bridge)
    } else {
        let blocks = comm.recv(group.middle, Tag::UpperBoundary)?;
        let [uur, ull, ulr, bu, bl] = unpack(blocks, Tag::UpperBoundary, rank)?;
        (UpperBoundary { uur, ull, ulr }, Bridge { upper: bu, lower: bl })
    };

    let lower = if role.contains(MergeRole::PRODUCES_LOWER) {
        let lower = lower_boundary(&maps.matrix, corners);
        let blocks = [lower.dul.clone(), lower.dur.clone(), lower.dll.clone()];
        comm.send_to_all(group.ranks(), Tag::LowerBoundary, &blocks)?;
        lower
    } else {
        let blocks = comm.recv(group.middle + 1, Tag::LowerBoundary)?;
        let [dul, dur, dll] = unpack(blocks, Tag::LowerBoundary, rank)?;
        LowerBoundary { dul, dur, dll }
    };

    if role.contains(MergeRole::HAS_PREDECESSOR) {
        comm.send(rank - 1, Tag::MatrixMapSnapshot, maps.matrix.blocks().to_vec())?;
    }
    let next_map = if role.contains(MergeRole::HAS_SUCCESSOR) {
        let blocks = comm.recv(rank + 1, Tag::MatrixMapSnapshot)?;
        Some(MatrixMap::from_blocks(blocks, corners.ff.nrows())?)
    } else {
        None
    };

    let j = j_factor(&lower.dul, &upper.ulr, &bridge, tolerance, rank, step)?;
    let mb = MergeBoundary { upper, lower, bridge, j };

    if let Some(next_map) = &next_map {
        update_cross_map(&mut maps.cross, rank.cmp(&group.middle), &maps.matrix, next_map, &mb);
    }
    maps.matrix = update_matrix_map(&maps.matrix, role.contains(MergeRole::UPPER_HALF), &mb);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::max_abs_diff;
    use crate::pdiv::maps::initialize_maps;
    use faer::Mat;

    fn scalar(v: f64) -> Block<f64> {
        Mat::from_fn(1, 1, |_, _| v)
    }

    fn total(m: &Block<f64>) -> f64 {
        (0..m.nrows()).flat_map(|i| (0..m.ncols()).map(move |j| (i, j))).map(|(i, j)| m[(i, j)]).sum()
    }

    /// Two 1×1 partitions: A = [[a, bu], [bl, d]].
    fn two_by_two() -> (f64, f64, f64, f64) {
        (4.0, 1.0, 2.0, 5.0)
    }

    #[test]
    fn j_factor_of_scalar_bridge() {
        let (a, bu, bl, d) = two_by_two();
        let bridge = Bridge { upper: scalar(bu), lower: scalar(bl) };
        let j = j_factor(&scalar(1.0 / d), &scalar(1.0 / a), &bridge, 1e-12, 0, 1).unwrap();
        // inv([[1, -bl/d], [-bu/a, 1]]) = 1/(1 - bu·bl/(a·d)) · [[1, bl/d], [bu/a, 1]]
        let s = 1.0 / (1.0 - bu * bl / (a * d));
        approx::assert_abs_diff_eq!(j.j11[(0, 0)], s, epsilon = 1e-14);
        approx::assert_abs_diff_eq!(j.j12[(0, 0)], s * bl / d, epsilon = 1e-14);
        approx::assert_abs_diff_eq!(j.j21[(0, 0)], s * bu / a, epsilon = 1e-14);
        approx::assert_abs_diff_eq!(j.j22[(0, 0)], s, epsilon = 1e-14);
    }

    #[test]
    fn singular_j_factor_is_reported() {
        // DUL·Bl·ULR·Bu = 1 makes the J system singular.
        let bridge = Bridge { upper: scalar(1.0), lower: scalar(1.0) };
        let err = j_factor(&scalar(1.0), &scalar(1.0), &bridge, 1e-8, 2, 3).unwrap_err();
        assert!(matches!(err, PdivError::Singular { what: "J factor", rank: 2, step: 3 }));
    }

    #[test]
    fn merged_maps_reproduce_two_block_inverse() {
        let (a, bu, bl, d) = two_by_two();
        let full = Mat::from_fn(2, 2, |i, j| [[a, bu], [bl, d]][i][j]);
        let inverse = invert(&full, 1e-12).unwrap();

        let g0 = Corners::extract(&scalar(1.0 / a), 1);
        let g1 = Corners::extract(&scalar(1.0 / d), 1);
        let mut maps0 = initialize_maps::<f64>(1);
        let mut maps1 = initialize_maps::<f64>(1);
        let bridge = Bridge { upper: scalar(bu), lower: scalar(bl) };

        let upper = upper_boundary(&maps0.matrix, &g0);
        let lower = lower_boundary(&maps1.matrix, &g1);
        let j = j_factor(&lower.dul, &upper.ulr, &bridge, 1e-12, 0, 1).unwrap();
        let mb = MergeBoundary { upper, lower, bridge, j };

        update_cross_map(&mut maps0.cross, Ordering::Equal, &maps0.matrix, &maps1.matrix, &mb);
        maps0.matrix = update_matrix_map(&maps0.matrix, true, &mb);
        maps1.matrix = update_matrix_map(&maps1.matrix, false, &mb);

        // with F = L every quadrant of a map multiplies the same block
        let g00 = 1.0 / a + total(&maps0.matrix.correction()) / (a * a);
        let g11 = 1.0 / d + total(&maps1.matrix.correction()) / (d * d);
        approx::assert_abs_diff_eq!(g00, inverse[(0, 0)], epsilon = 1e-14);
        approx::assert_abs_diff_eq!(g11, inverse[(1, 1)], epsilon = 1e-14);

        approx::assert_abs_diff_eq!(total(&maps0.cross.upper()) / (a * d), inverse[(0, 1)], epsilon = 1e-14);
        approx::assert_abs_diff_eq!(total(&maps0.cross.lower()) / (a * d), inverse[(1, 0)], epsilon = 1e-14);

        // the merged segment spans both blocks
        let first_row = (maps1.matrix[0][(0, 0)] + maps1.matrix[1][(0, 0)]) / d;
        let last_row = (maps0.matrix[6][(0, 0)] + maps0.matrix[7][(0, 0)]) / a;
        approx::assert_abs_diff_eq!(first_row, inverse[(0, 1)], epsilon = 1e-14);
        approx::assert_abs_diff_eq!(last_row, inverse[(1, 0)], epsilon = 1e-14);
        // the last rank of the group keeps its cross map
        assert_eq!(max_abs_diff(&maps1.cross.upper(), &Mat::zeros(2, 2)), 0.0);
    }
}
