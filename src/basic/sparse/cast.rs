use nalgebra::Complex;
use nalgebra_sparse::CscMatrix;

pub(crate) trait Cast<T> {
    type Mat;

    /// Returns a copy of the matrix with the entries lifted to `T`.
    fn cast(&self) -> Self::Mat;
}

impl Cast<Complex<f64>> for CscMatrix<f64> {
    type Mat = CscMatrix<Complex<f64>>;

    fn cast(&self) -> Self::Mat {
        // SAFETY: the pattern is copied unchanged and the value count matches it.
        unsafe {
            CscMatrix::try_from_pattern_and_values(
                self.pattern().clone(),
                self.values().iter().map(|x| Complex::new(*x, 0.0)).collect(),
            )
            .unwrap_unchecked()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    #[test]
    fn test_cast_keeps_pattern() {
        let mut a = CooMatrix::new(3, 2);
        a.push(0, 1, 2.0);
        a.push(2, 0, -1.5);
        let a = CscMatrix::from(&a);
        let c = a.cast();
        assert_eq!(c.pattern(), a.pattern());
        assert_eq!(c.values(), &[Complex::new(-1.5, 0.0), Complex::new(2.0, 0.0)]);
    }
}
