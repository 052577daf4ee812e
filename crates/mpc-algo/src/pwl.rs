//! Piecewise-linear approximation diagnostics.
//!
//! The solver builds its own piecewise-linear models of function
//! constraints; this module reproduces that construction (uniform
//! breakpoints over a finite interval) purely to quantify approximation
//! error, e.g. to check that a finer resolution actually tightens the
//! model.

use mpc_solver_common::{FuncKind, Resolution};

/// Number of segments a resolution produces over `[lb, ub]`. At least 1.
pub fn segment_count(lb: f64, ub: f64, resolution: Resolution) -> u32 {
    match resolution {
        Resolution::Pieces(n) => n.max(1),
        Resolution::PieceLength(len) => {
            if len <= 0.0 {
                return 1;
            }
            ((ub - lb) / len).ceil().max(1.0) as u32
        }
    }
}

/// Uniform breakpoints `(x, h(x))` over a finite interval.
pub fn breakpoints(kind: FuncKind, lb: f64, ub: f64, resolution: Resolution) -> Vec<(f64, f64)> {
    debug_assert!(lb.is_finite() && ub.is_finite() && lb <= ub);
    let n = segment_count(lb, ub, resolution);
    (0..=n)
        .map(|i| {
            let x = lb + (ub - lb) * i as f64 / n as f64;
            (x, kind.eval(x))
        })
        .collect()
}

/// Evaluate the interpolant at `x`, clamping outside the breakpoint range.
pub fn interpolate(points: &[(f64, f64)], x: f64) -> f64 {
    match points {
        [] => f64::NAN,
        [(_, y)] => *y,
        _ => {
            let first = points[0];
            let last = points[points.len() - 1];
            if x <= first.0 {
                return first.1;
            }
            if x >= last.0 {
                return last.1;
            }
            let i = points.partition_point(|&(px, _)| px <= x);
            let (x0, y0) = points[i - 1];
            let (x1, y1) = points[i];
            y0 + (y1 - y0) * (x - x0) / (x1 - x0)
        }
    }
}

/// Largest gap between `h` and its interpolant over `[lb, ub]`, sampled at
/// `samples_per_segment` interior points per segment.
pub fn max_residual(
    kind: FuncKind,
    lb: f64,
    ub: f64,
    resolution: Resolution,
    samples_per_segment: u32,
) -> f64 {
    if !lb.is_finite() || !ub.is_finite() || lb >= ub {
        return f64::INFINITY;
    }
    let points = breakpoints(kind, lb, ub, resolution);
    let n = segment_count(lb, ub, resolution);
    let total = n * samples_per_segment.max(1);
    let mut max = 0.0f64;
    for i in 0..=total {
        let x = lb + (ub - lb) * i as f64 / total as f64;
        max = max.max((kind.eval(x) - interpolate(&points, x)).abs());
    }
    max
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interpolant_is_exact_at_breakpoints() {
        let points = breakpoints(FuncKind::Exp, 0.0, 2.0, Resolution::Pieces(4));
        for &(x, y) in &points {
            assert!((interpolate(&points, x) - y).abs() < 1e-12);
        }
    }

    #[test]
    fn more_pieces_tighten_the_approximation() {
        // Nested uniform grids, so the finer residual cannot be larger.
        let coarse = max_residual(FuncKind::Sqrt, 0.0, 4.0, Resolution::Pieces(4), 16);
        let fine = max_residual(FuncKind::Sqrt, 0.0, 4.0, Resolution::Pieces(40), 16);
        assert!(fine < coarse, "fine {} vs coarse {}", fine, coarse);
    }

    #[test]
    fn shorter_pieces_tighten_the_approximation() {
        let coarse = max_residual(FuncKind::Sin, 0.0, 3.0, Resolution::PieceLength(0.5), 16);
        let fine = max_residual(FuncKind::Sin, 0.0, 3.0, Resolution::PieceLength(0.05), 16);
        assert!(fine < coarse, "fine {} vs coarse {}", fine, coarse);
    }

    #[test]
    fn piece_length_rounds_up_to_whole_segments()  {
        assert_eq!(segment_count(0.0, 1.0, Resolution::PieceLength(0.3)), 4);
        assert_eq!(segment_count(0.0, 1.0, Resolution::Pieces(7)), 7);
        assert_eq!(segment_count(0.0, 1.0, Resolution::Pieces(0)), 1);
    }

    #[test]
    fn infinite_domain_has_infinite_residual() {
        let r = max_residual(
            FuncKind::Exp,
            0.0,
            f64::INFINITY,
            Resolution::Pieces(10),
            4,
        );
        assert_eq!(r, f64::INFINITY);
    }
}
