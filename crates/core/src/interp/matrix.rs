//! Affine matrix algebra in the row-vector convention.
//!
//! A matrix `(a, b, c, d, e, f)` stands for `[a b 0; c d 0; e f 1]` and maps
//! `(x, y)` to `(a·x + c·y + e, b·x + d·y + f)`.

/// A 6-element affine transformation matrix (a, b, c, d, e, f).
pub type Matrix = (f64, f64, f64, f64, f64, f64);

/// A point (x, y).
pub type Point = (f64, f64);

/// Identity transformation matrix.
pub const MATRIX_IDENTITY: Matrix = (1.0, 0.0, 0.0, 1.0, 0.0, 0.0);

/// Compose `m1 ∘ m2`: the result applies `m1` first, then `m2`.
///
/// `cm` with operand `m` sets `CTM := apply_matrix(m, CTM)`.
pub fn apply_matrix(m1: Matrix, m2: Matrix) -> Matrix {
    let (a1, b1, c1, d1, e1, f1) = m1;
    let (a2, b2, c2, d2, e2, f2) = m2;
    (
        a1.mul_add(a2, b1 * c2),
        a1.mul_add(b2, b1 * d2),
        c1.mul_add(a2, d1 * c2),
        c1.mul_add(b2, d1 * d2),
        e1.mul_add(a2, f1 * c2) + e2,
        e1.mul_add(b2, f1 * d2) + f2,
    )
}

/// Translate `m` by `v` inside its own coordinate system.
pub fn translate_matrix(m: Matrix, v: Point) -> Matrix {
    let (a, b, c, d, e, f) = m;
    let (x, y) = v;
    (a, b, c, d, x.mul_add(a, y * c) + e, x.mul_add(b, y * d) + f)
}

/// Apply `m` to a point.
pub fn apply_matrix_pt(m: Matrix, v: Point) -> Point {
    let (a, b, c, d, e, f) = m;
    let (x, y) = v;
    (a.mul_add(x, c * y) + e, b.mul_add(x, d * y) + f)
}

pub const fn translation(x: f64, y: f64) -> Matrix {
    (1.0, 0.0, 0.0, 1.0, x, y)
}

pub const fn scaling(sx: f64, sy: f64) -> Matrix {
    (sx, 0.0, 0.0, sy, 0.0, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Matrix, b: Matrix) -> bool {
        let a = [a.0, a.1, a.2, a.3, a.4, a.5];
        let b = [b.0, b.1, b.2, b.3, b.4, b.5];
        a.iter().zip(&b).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    /// Plain 3x3 product of the row-vector forms.
    fn mul3(m1: Matrix, m2: Matrix) -> Matrix {
        let full = |m: Matrix| [[m.0, m.1, 0.0], [m.2, m.3, 0.0], [m.4, m.5, 1.0]];
        let (x, y) = (full(m1), full(m2));
        let mut r = [[0.0; 3]; 3];
        for i in 0..3 {
            for j in 0..3 {
                r[i][j] = (0..3).map(|k| x[i][k] * y[k][j]).sum();
            }
        }
        (r[0][0], r[0][1], r[1][0], r[1][1], r[2][0], r[2][1])
    }

    #[test]
    fn composition_order_matters() {
        let t = translation(10.0, 5.0);
        let s = scaling(2.0, 3.0);
        let translate_then_scale = apply_matrix(t, s);
        let scale_then_translate = apply_matrix(s, t);
        assert!(close(translate_then_scale, (2.0, 0.0, 0.0, 3.0, 20.0, 15.0)));
        assert!(close(scale_then_translate, (2.0, 0.0, 0.0, 3.0, 10.0, 5.0)));
        assert!(close(translate_then_scale, mul3(t, s)));
        assert!(close(scale_then_translate, mul3(s, t)));
        assert_eq!(apply_matrix_pt(translate_then_scale, (1.0, 1.0)), (22.0, 18.0));
    }

    #[test]
    fn composition_is_associative() {
        let a = (0.0, 1.0, -1.0, 0.0, 3.0, 4.0);
        let b = scaling(2.0, 0.5);
        let c = translation(-7.0, 1.5);
        assert!(close(
            apply_matrix(apply_matrix(a, b), c),
            apply_matrix(a, apply_matrix(b, c))
        ));
    }

    #[test]
    fn translate_in_own_space() {
        let m = scaling(2.0, 2.0);
        assert!(close(translate_matrix(m, (3.0, 1.0)), (2.0, 0.0, 0.0, 2.0, 6.0, 2.0)));
        assert!(close(
            translate_matrix(m, (3.0, 1.0)),
            apply_matrix(translation(3.0, 1.0), m)
        ));
    }
}
