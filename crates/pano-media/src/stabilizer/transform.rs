//! 2D affine transforms in homogeneous form.

/// A 2D affine transform in homogeneous 3×3 form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform(pub [[f64; 3]; 3]);

impl Default for AffineTransform {
    fn default() -> Self {
        Self::identity()
    }
}

impl AffineTransform {
    pub fn identity() -> Self {
        Self([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
    }

    /// `[[a, b, c], [d, e, f]]` as in `u = a·x + b·y + c`, `v = d·x + e·y + f`.
    pub fn from_rows(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self([[a, b, c], [d, e, f], [0.0, 0.0, 1.0]])
    }

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::from_rows(1.0, 0.0, tx, 0.0, 1.0, ty)
    }

    /// `self · other`: apply `other` first.
    pub fn compose(&self, other: &AffineTransform) -> AffineTransform {
        let mut out = [[0.0; 3]; 3];
        for (i, row) in out.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = (0..3).map(|k| self.0[i][k] * other.0[k][j]).sum();
            }
        }
        AffineTransform(out)
    }

    pub fn inverse(&self) -> Option<AffineTransform> {
        let [[a, b, c], [d, e, f], _] = self.0;
        let det = a * e - b * d;
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        let (ia, ib, id, ie) = (e / det, -b / det, -d / det, a / det);
        Some(Self::from_rows(
            ia,
            ib,
            -(ia * c + ib * f),
            id,
            ie,
            -(id * c + ie * f),
        ))
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let m = &self.0;
        (
            m[0][0] * x + m[0][1] * y + m[0][2],
            m[1][0] * x + m[1][1] * y + m[1][2],
        )
    }

    pub fn approx_eq(&self, other: &AffineTransform, tolerance: f64) -> bool {
        self.0
            .iter()
            .flatten()
            .zip(other.0.iter().flatten())
            .all(|(a, b)| (a - b).abs() <= tolerance)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().flatten().all(|v| v.is_finite())
    }
}
