//! Graphics-state helpers shared by the text and path walkers.

use super::backend::{get_number_from_value, PdfValue};

/// Affine transform `[a, b, c, d, e, f]` in PDF row-vector convention.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix(pub [f32; 6]);

impl Matrix {
    pub const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    /// Read six numeric operands (as used by `cm` and `Tm`).
    pub fn from_operands(operands: &[PdfValue]) -> Option<Matrix> {
        if operands.len() < 6 {
            return None;
        }
        let vals: Vec<f32> = operands
            .iter()
            .take(6)
            .filter_map(get_number_from_value)
            .collect();
        (vals.len() == 6).then(|| Matrix([vals[0], vals[1], vals[2], vals[3], vals[4], vals[5]]))
    }

    /// `self × other`: apply `self` first, then `other`.
    pub fn then(&self, other: &Matrix) -> Matrix {
        let [a, b, c, d, e, f] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a * a2 + b * c2,
            a * b2 + b * d2,
            c * a2 + d * c2,
            c * b2 + d * d2,
            e * a2 + f * c2 + e2,
            e * b2 + f * d2 + f2,
        ])
    }

    pub fn apply(&self, x: f32, y: f32) -> (f32, f32) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    /// Vertical scale factor, used to size text drawn under this transform.
    pub fn vertical_scale(&self) -> f32 {
        (self.0[2].powi(2) + self.0[3].powi(2)).sqrt()
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix::IDENTITY
    }
}

/// Current transformation matrix with `q`/`Q` save and restore.
#[derive(Debug, Clone, Default)]
pub struct CtmStack {
    current: Matrix,
    saved: Vec<Matrix>,
}

impl CtmStack {
    pub fn current(&self) -> Matrix {
        self.current
    }

    /// Handle `q`, `Q`, and `cm`.  Returns `true` when the operator was one
    /// of them.
    pub fn handle(&mut self, operator: &str, operands: &[PdfValue]) -> bool {
        match operator {
            "q" => self.saved.push(self.current),
            "Q" => {
                // Unbalanced Q is tolerated.
                if let Some(m) = self.saved.pop() {
                    self.current = m;
                }
            }
            "cm" => {
                if let Some(m) = Matrix::from_operands(operands) {
                    self.current = m.then(&self.current);
                }
            }
            _ => return false,
        }
        true
    }
}
