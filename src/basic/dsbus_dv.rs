use crate::basic::sparse::{conj::Conjugate, slice::diag_csc};
use nalgebra::*;
use nalgebra_sparse::{CooMatrix, CscMatrix};

/// Computes the partial derivatives of the bus power injections with respect to
/// voltage magnitudes and angles.
///
/// # Arguments
///
/// * `Ybus` - The nodal admittance matrix.
/// * `v` - The complex bus voltages.
/// * `Vnorm` - The bus voltages scaled to unit magnitude.
///
/// # Returns
///
/// `(dS_dVm, dS_dVa)`, both `n x n`.
///
/// # Notes
///
/// * The formulas are those of MatPower:
///  R. D. Zimmerman, "AC Power Flows, Generalized OPF Costs and
///  their Derivatives using Complex Matrix Notation", MATPOWER
///  Technical Note 2, February 2010.
#[allow(non_snake_case)]
pub fn dSbus_dV(
    Ybus: &CscMatrix<Complex<f64>>,
    v: &DVector<Complex<f64>>,
    Vnorm: &DVector<Complex<f64>>,
) -> (CscMatrix<Complex<f64>>, CscMatrix<Complex<f64>>) {
    let ibus = Ybus * v;
    let diagVnorm = diag_csc(Vnorm.as_slice());
    let diagV = diag_csc(v.as_slice());
    let diagIbus = diag_csc(ibus.as_slice());

    let dS_dVm = &diagV * (Ybus * &diagVnorm).conjugate() + diagIbus.conjugate() * &diagVnorm;
    let dS_dVa = &diagV * (diagIbus - Ybus * &diagV).conjugate() * Complex::<f64>::i();
    (dS_dVm, dS_dVa)
}

/// Sensitivity of the primitives of one branch to its tap module.
#[derive(Debug, Clone, Copy)]
pub struct TapSensitivity {
    pub from: usize,
    pub to: usize,
    pub dyff: Complex<f64>,
    pub dyft: Complex<f64>,
    pub dytf: Complex<f64>,
}

/// Derivatives of the bus power injections with respect to the tap modules of
/// the controlling branches, one column per branch.
#[allow(non_snake_case)]
pub fn dSbus_dm(v: &DVector<Complex<f64>>, taps: &[TapSensitivity]) -> CscMatrix<Complex<f64>> {
    let mut coo = CooMatrix::new(v.len(), taps.len());
    for (c, t) in taps.iter().enumerate() {
        let (vf, vt) = (v[t.from], v[t.to]);
        coo.push(t.from, c, vf * (t.dyff * vf + t.dyft * vt).conj());
        coo.push(t.to, c, vt * (t.dytf * vf).conj());
    }
    CscMatrix::from(&coo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra_sparse::CooMatrix;

    fn ybus() -> CscMatrix<Complex<f64>> {
        let y = Complex::new(1.0, -10.0);
        let ysh = Complex::new(0.0, 0.05);
        let mut coo = CooMatrix::new(3, 3);
        for (f, t) in [(0, 1), (1, 2), (0, 2)] {
            coo.push(f, f, y + ysh);
            coo.push(t, t, y + ysh);
            coo.push(f, t, -y);
            coo.push(t, f, -y);
        }
        CscMatrix::from(&coo)
    }

    fn sbus(y: &CscMatrix<Complex<f64>>, v: &DVector<Complex<f64>>) -> DVector<Complex<f64>> {
        v.component_mul(&(y * v).conjugate())
    }

    /// Compares the analytic derivatives with central finite differences.
    #[test]
    fn test_dsbus_dv_finite_difference() {
        let y = ybus();
        let vm = [1.02, 0.97, 0.99];
        let va = [0.0, -0.05, 0.03];
        let polar = |vm: &[f64], va: &[f64]| {
            DVector::from_iterator(3, vm.iter().zip(va).map(|(m, a)| Complex::from_polar(*m, *a)))
        };
        let v = polar(&vm, &va);
        let vnorm = v.map(|e| e / e.norm());
        let (ds_dvm, ds_dva) = dSbus_dV(&y, &v, &vnorm);
        let ds_dvm = DMatrix::from(&ds_dvm);
        let ds_dva = DMatrix::from(&ds_dva);
        let h = 1e-7;
        for j in 0..3 {
            let (mut up, mut dn) = (vm, vm);
            up[j] += h;
            dn[j] -= h;
            let num = (sbus(&y, &polar(&up, &va)) - sbus(&y, &polar(&dn, &va))) / Complex::new(2.0 * h, 0.0);
            for i in 0..3 {
                assert!((num[i] - ds_dvm[(i, j)]).norm() < 1e-6, "dVm mismatch at ({i},{j})");
            }
            let (mut up, mut dn) = (va, va);
            up[j] += h;
            dn[j] -= h;
            let num = (sbus(&y, &polar(&vm, &up)) - sbus(&y, &polar(&vm, &dn))) / Complex::new(2.0 * h, 0.0);
            for i in 0..3 {
                assert!((num[i] - ds_dva[(i, j)]).norm() < 1e-6, "dVa mismatch at ({i},{j})");
            }
        }
    }
}
