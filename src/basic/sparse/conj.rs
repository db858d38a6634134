use nalgebra::Complex;
use nalgebra_sparse::CscMatrix;

/// Trait for computing the conjugate of a matrix.
pub(crate) trait Conjugate {
    type Mat;

    /// Returns the conjugate of the matrix.
    fn conjugate(&self) -> Self::Mat;

    /// Computes the conjugate of the matrix in-place.
    fn conjugate_mut(&mut self);
}

impl Conjugate for CscMatrix<Complex<f64>> {
    type Mat = CscMatrix<Complex<f64>>;

    fn conjugate(&self) -> Self::Mat {
        let mut out = self.clone();
        out.conjugate_mut();
        out
    }

    fn conjugate_mut(&mut self) {
        self.values_mut().iter_mut().for_each(|v| *v = v.conj());
    }
}

/// Trait for extracting the real and imaginary parts of a matrix.
pub(crate) trait RealImage {
    type Mat;

    /// Returns the real and imaginary parts of the matrix.
    fn real_imag(&self) -> (Self::Mat, Self::Mat);

    /// Returns the real part of the matrix.
    fn real(&self) -> Self::Mat;

    /// Returns the imaginary part of the matrix.
    fn imag(&self) -> Self::Mat;
}

#[inline]
fn map_values(mat: &CscMatrix<Complex<f64>>, f: impl Fn(&Complex<f64>) -> f64) -> CscMatrix<f64> {
    let values = mat.values().iter().map(f).collect();
    // SAFETY: same pattern, one value per stored entry.
    unsafe { CscMatrix::try_from_pattern_and_values(mat.pattern().clone(), values).unwrap_unchecked() }
}

impl RealImage for CscMatrix<Complex<f64>> {
    type Mat = CscMatrix<f64>;

    fn real(&self) -> Self::Mat {
        map_values(self, |e| e.re)
    }

    fn imag(&self) -> Self::Mat {
        map_values(self, |e| e.im)
    }

    fn real_imag(&self) -> (Self::Mat, Self::Mat) {
        (self.real(), self.imag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;
    use nalgebra_sparse::CooMatrix;

    fn sample(sign: f64) -> CscMatrix<Complex<f64>> {
        let mut a = CooMatrix::new(6, 6);
        a.push(0, 0, Complex::new(1.0, -1.0 * sign));
        a.push(2, 1, Complex::new(3.0, 1.0 * sign));
        a.push(3, 3, Complex::new(5.0, -2.0 * sign));
        a.push(4, 4, Complex::new(4.0, 2.0 * sign));
        a.push(5, 5, Complex::new(6.0, -2.2 * sign));
        (&a).into()
    }

    /// Tests the conjugate operation.
    #[test]
    fn test_conj() {
        let a = sample(1.0);
        let b = sample(-1.0);
        println!("conj(a)={}", DMatrix::from(&a.conjugate()));
        assert!(a.conjugate() == b, "matrices do not match!")
    }

    /// Tests the in-place conjugate operation.
    #[test]
    fn test_conj_mut() {
        let mut a = sample(1.0);
        a.conjugate_mut();
        assert!(a == sample(-1.0), "matrices do not match!")
    }

    #[test]
    fn test_real_imag() {
        let a = sample(1.0);
        let (re, im) = a.real_imag();
        assert_eq!(re.values(), &[1.0, 3.0, 5.0, 4.0, 6.0]);
        assert_eq!(im.values(), &[-1.0, 1.0, -2.0, 2.0, -2.2]);
        assert_eq!(re.pattern(), a.pattern());
    }
}
