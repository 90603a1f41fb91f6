//! Minimal relative orientation from five calibrated correspondences.
//!
//! This follows the action matrix formulation from Stewenius, Engels and Nister,
//! "Recent developments on direct relative orientation" (2006):
//!
//! 1. The five epipolar constraints leave a four dimensional null space, so
//!    `E = x X + y Y + z Z + W`.
//! 2. Substituting into `det(E) = 0` and `2 E E^T E - tr(E E^T) E = 0` yields ten cubic
//!    equations in `x, y, z`.
//! 3. Gauss-Jordan elimination on the cubic monomials gives the action matrix for
//!    multiplication by `x`, whose real eigenvalues and eigenvectors are the solutions.
//!
//! Up to ten essential matrices are returned.

#![no_std]

#[cfg(test)]
extern crate std;

use arrayvec::ArrayVec;
use float_ord::FloatOrd;
use vo_core::{
    nalgebra::{
        dimension::{U10, U20, U4, U5, U9},
        ComplexField, Matrix3, OMatrix, OVector,
    },
    sample_consensus::Estimator,
    FeatureMatch,
};
use vo_pinhole::{EssentialMatrix, NormalizedKeyPoint};

/// Exponents of `(x, y, z)` for every monomial of degree three or less.
///
/// The ten cubic monomials come first so they can be eliminated, then the ten
/// monomials that span the quotient ring.
#[rustfmt::skip]
const MONOMIALS: [[u8; 3]; 20] = [
    [3, 0, 0], [2, 1, 0], [1, 2, 0], [0, 3, 0], [2, 0, 1],
    [1, 1, 1], [0, 2, 1], [1, 0, 2], [0, 1, 2], [0, 0, 3],
    [2, 0, 0], [1, 1, 0], [0, 2, 0], [1, 0, 1], [0, 1, 1],
    [0, 0, 2], [1, 0, 0], [0, 1, 0], [0, 0, 1], [0, 0, 0],
];

const MONO_X: usize = 16;
const MONO_Y: usize = 17;
const MONO_Z: usize = 18;
const MONO_1: usize = 19;

/// Cubic monomials that become other cubic monomials when a basis monomial is multiplied by `x`.
///
/// Basis monomials `xx, xy, yy, xz, yz, zz` times `x` are `xxx, xxy, xyy, xxz, xyz, xzz`.
const ACTION_CUBIC_ROWS: [usize; 6] = [0, 1, 2, 4, 5, 7];

/// Pairs of `(action row, basis column)` where `x` times the basis monomial of the row is
/// itself a basis monomial: `x * x = xx`, `x * y = xy`, `x * z = xz`, `x * 1 = x`.
const ACTION_SHIFTS: [(usize, usize); 4] = [(6, 0), (7, 1), (8, 3), (9, 6)];

/// An eigenvalue is treated as real if its imaginary part is below this (relative) tolerance.
const IMAGINARY_TOLERANCE: f64 = 1e-10;

type Polynomial = OVector<f64, U20>;
type Nullspace = OMatrix<f64, U9, U4>;
type Constraints = OMatrix<f64, U10, U20>;
type Action = OMatrix<f64, U10, U10>;

fn monomial_index(exponents: [u8; 3]) -> Option<usize> {
    MONOMIALS.iter().position(|&m| m == exponents)
}

/// Multiplies two polynomials whose product has degree three or less.
fn multiply(a: &Polynomial, b: &Polynomial) -> Polynomial {
    let mut product = Polynomial::zeros();
    for (ia, &ca) in a.iter().enumerate().filter(|&(_, &c)| c != 0.0) {
        for (ib, &cb) in b.iter().enumerate().filter(|&(_, &c)| c != 0.0) {
            let [ax, ay, az] = MONOMIALS[ia];
            let [bx, by, bz] = MONOMIALS[ib];
            if let Some(ix) = monomial_index([ax + bx, ay + by, az + bz]) {
                product[ix] += ca * cb;
            }
        }
    }
    product
}

/// Each row is the epipolar constraint `b^T E a = 0` of one match, flattened row-major over `E`.
fn epipolar_constraints(matches: &[FeatureMatch<NormalizedKeyPoint>; 5]) -> OMatrix<f64, U5, U9> {
    let mut out = OMatrix::<f64, U5, U9>::zeros();
    for (mut row, &FeatureMatch(a, b)) in out.row_iter_mut().zip(matches) {
        let a = a.homogeneous();
        let b = b.homogeneous();
        for i in 0..3 {
            for j in 0..3 {
                row[3 * i + j] = b[i] * a[j];
            }
        }
    }
    out
}

/// The four vectors spanning the null space of the epipolar constraints.
///
/// These are the eigenvectors of `A^T A` with the four smallest eigenvalues.
fn nullspace(matches: &[FeatureMatch<NormalizedKeyPoint>; 5]) -> Option<Nullspace> {
    let constraints = epipolar_constraints(matches);
    let normal = constraints.transpose() * constraints;
    let eigen = normal.try_symmetric_eigen(1e-12, 1000)?;
    let mut order = [0, 1, 2, 3, 4, 5, 6, 7, 8];
    order.sort_unstable_by_key(|&ix| FloatOrd(eigen.eigenvalues[ix]));
    let mut basis = Nullspace::zeros();
    for (&ix, mut column) in order.iter().zip(basis.column_iter_mut()) {
        column.copy_from(&eigen.eigenvectors.column(ix));
    }
    Some(basis)
}

/// The ten cubic constraints on `(x, y, z)`.
fn polynomial_constraints(basis: &Nullspace) -> Constraints {
    // Every entry of E as a polynomial of degree one.
    let e: [[Polynomial; 3]; 3] = core::array::from_fn(|i| {
        core::array::from_fn(|j| {
            let row = basis.row(3 * i + j);
            let mut p = Polynomial::zeros();
            p[MONO_X] = row[0];
            p[MONO_Y] = row[1];
            p[MONO_Z] = row[2];
            p[MONO_1] = row[3];
            p
        })
    });

    let mut out = Constraints::zeros();

    // det(E) = 0
    let minor = |r0: usize, c0: usize, r1: usize, c1: usize| {
        multiply(&e[r0][c0], &e[r1][c1]) - multiply(&e[r0][c1], &e[r1][c0])
    };
    let det = multiply(&minor(1, 1, 2, 2), &e[0][0]) - multiply(&minor(1, 0, 2, 2), &e[0][1])
        + multiply(&minor(1, 0, 2, 1), &e[0][2]);
    out.row_mut(0).copy_from(&det.transpose());

    // E E^T - tr(E E^T) / 2, which times E must vanish.
    let mut eet = [[Polynomial::zeros(); 3]; 3];
    for i in 0..3 {
        for j in i..3 {
            eet[i][j] = (0..3).fold(Polynomial::zeros(), |acc, k| {
                acc + multiply(&e[i][k], &e[j][k])
            });
            eet[j][i] = eet[i][j];
        }
    }
    let half_trace = (eet[0][0] + eet[1][1] + eet[2][2]) * 0.5;
    for (i, row) in eet.iter_mut().enumerate() {
        row[i] -= half_trace;
    }

    for i in 0..3 {
        for j in 0..3 {
            let entry = (0..3).fold(Polynomial::zeros(), |acc, k| {
                acc + multiply(&eet[i][k], &e[k][j])
            });
            out.row_mut(1 + 3 * i + j).copy_from(&entry.transpose());
        }
    }

    out
}

/// Builds the action matrix of multiplication by `x` on the basis
/// `xx, xy, yy, xz, yz, zz, x, y, z, 1`.
fn action_matrix(constraints: &Constraints) -> Option<Action> {
    let cubic = constraints.fixed_columns::<10>(0).into_owned();
    let rest = constraints.fixed_columns::<10>(10).into_owned();
    // After elimination, cubic monomial i = -(reduced row i) . basis.
    let reduced = cubic.full_piv_lu().solve(&rest)?;
    let mut action = Action::zeros();
    for (row, &cubic_row) in ACTION_CUBIC_ROWS.iter().enumerate() {
        action.row_mut(row).copy_from(&(-reduced.row(cubic_row)));
    }
    for &(row, column) in &ACTION_SHIFTS {
        action[(row, column)] = 1.0;
    }
    Some(action)
}

/// The eigenvector of `action` for a known real eigenvalue, taken as the right singular
/// vector of `action - lambda I` with the smallest singular value.
fn eigenvector(action: &Action, lambda: f64) -> Option<OVector<f64, U10>> {
    let shifted = action - Action::from_diagonal_element(lambda);
    let svd = shifted.try_svd(false, true, 1e-12, 1000)?;
    let v_t = svd.v_t?;
    let (ix, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by_key(|&(_, &s)| FloatOrd(s))?;
    Some(v_t.row(ix).transpose())
}

fn solve(matches: &[FeatureMatch<NormalizedKeyPoint>; 5]) -> ArrayVec<EssentialMatrix, 10> {
    let mut solutions = ArrayVec::new();
    let basis = match nullspace(matches) {
        Some(basis) => basis,
        None => return solutions,
    };
    let action = match action_matrix(&polynomial_constraints(&basis)) {
        Some(action) => action,
        None => return solutions,
    };
    for lambda in action.complex_eigenvalues().iter() {
        if lambda.im.abs() > IMAGINARY_TOLERANCE * (1.0 + lambda.re.abs()) {
            continue;
        }
        let vector = match eigenvector(&action, lambda.re) {
            Some(vector) => vector,
            None => continue,
        };
        let w = vector[9];
        if w == 0.0 {
            continue;
        }
        let (x, y, z) = (vector[6] / w, vector[7] / w, vector[8] / w);
        let flat = basis.column(0) * x + basis.column(1) * y + basis.column(2) * z + basis.column(3);
        if flat.iter().all(|n| n.is_finite()) && !solutions.is_full() {
            solutions.push(EssentialMatrix(Matrix3::from_row_slice(flat.as_slice())));
        }
    }
    solutions
}

/// Implements the five-point algorithm from the paper "Recent developments on direct relative orientation".
///
/// Matches are `FeatureMatch(a, b)` where every returned essential matrix satisfies `b^T E a = 0`.
#[derive(Copy, Clone, Debug, Default)]
pub struct FivePoint;

impl FivePoint {
    pub fn new() -> Self {
        Self
    }

    /// Computes every essential matrix consistent with the first five matches.
    ///
    /// Returns `None` if fewer than five matches are supplied.
    pub fn from_matches<I>(&self, data: I) -> Option<ArrayVec<EssentialMatrix, 10>>
    where
        I: Iterator<Item = FeatureMatch<NormalizedKeyPoint>>,
    {
        let matches: ArrayVec<FeatureMatch<NormalizedKeyPoint>, 5> = data.take(5).collect();
        let matches = matches.into_inner().ok()?;
        Some(solve(&matches))
    }
}

impl Estimator<FeatureMatch<NormalizedKeyPoint>> for FivePoint {
    type Model = EssentialMatrix;
    type ModelIter = ArrayVec<EssentialMatrix, 10>;
    const MIN_SAMPLES: usize = 5;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = FeatureMatch<NormalizedKeyPoint>> + Clone,
    {
        self.from_matches(data).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(p: &Polynomial, x: f64, y: f64, z: f64) -> f64 {
        MONOMIALS
            .iter()
            .zip(p.iter())
            .map(|(&[ex, ey, ez], &c)| {
                c * x.powi(ex as i32) * y.powi(ey as i32) * z.powi(ez as i32)
            })
            .sum()
    }

    fn linear(x: f64, y: f64, z: f64, w: f64) -> Polynomial {
        let mut p = Polynomial::zeros();
        p[MONO_X] = x;
        p[MONO_Y] = y;
        p[MONO_Z] = z;
        p[MONO_1] = w;
        p
    }

    #[test]
    fn monomials_are_unique() {
        for (ix, &m) in MONOMIALS.iter().enumerate() {
            assert_eq!(monomial_index(m), Some(ix));
            assert!(m.iter().sum::<u8>() <= 3);
        }
    }

    #[test]
    fn multiply_matches_evaluation() {
        let p1 = linear(0.1, 0.8, 0.3, 0.2);
        let p2 = linear(0.5, 0.45, 0.82, 0.15);
        let p3 = linear(-0.7, 0.2, 0.05, 1.1);
        let quadratic = multiply(&p1, &p2);
        let cubic = multiply(&quadratic, &p3);
        for z in -4..4 {
            for y in -4..4 {
                for x in -4..4 {
                    let (x, y, z) = (x as f64, y as f64, z as f64);
                    let a = evaluate(&p1, x, y, z);
                    let b = evaluate(&p2, x, y, z);
                    let c = evaluate(&p3, x, y, z);
                    assert!((evaluate(&quadratic, x, y, z) - a * b).abs() < 1e-9);
                    assert!((evaluate(&cubic, x, y, z) - a * b * c).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn action_matrix_shifts_basis() {
        // With no cubic coupling, the shift rows are all that remain.
        let mut constraints = Constraints::zeros();
        for i in 0..10 {
            constraints[(i, i)] = 1.0;
        }
        let action = action_matrix(&constraints).unwrap();
        for &(row, column) in &ACTION_SHIFTS {
            assert_eq!(action[(row, column)], 1.0);
        }
        assert_eq!(action.iter().filter(|&&n| n != 0.0).count(), 4);
    }

    #[test]
    fn too_few_matches() {
        let m = FeatureMatch(
            NormalizedKeyPoint(vo_core::nalgebra::Point2::new(0.1, 0.2)),
            NormalizedKeyPoint(vo_core::nalgebra::Point2::new(0.1, 0.25)),
        );
        assert!(FivePoint::new()
            .from_matches(core::iter::repeat(m).take(4))
            .is_none());
        assert!(FivePoint::new()
            .estimate(core::iter::repeat(m).take(4))
            .is_empty());
    }
}
