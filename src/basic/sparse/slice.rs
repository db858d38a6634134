use nalgebra::{ClosedAddAssign as ClosedAdd, Scalar};
use nalgebra_sparse::{CooMatrix, CscMatrix, pattern::SparsityPattern};
use num_traits::Zero;

/// Extracts `mat[rows, cols]` for arbitrary (not necessarily contiguous) index sets.
///
/// The result has `rows.len()` rows and `cols.len()` columns, ordered as the
/// index slices are. Indices must be unique and in range.
pub fn select_csc<T: Scalar + Zero + ClosedAdd + std::ops::AddAssign>(
    mat: &CscMatrix<T>,
    rows: &[usize],
    cols: &[usize],
) -> CscMatrix<T> {
    let mut row_pos = vec![usize::MAX; mat.nrows()];
    for (new, &old) in rows.iter().enumerate() {
        row_pos[old] = new;
    }
    let mut coo = CooMatrix::new(rows.len(), cols.len());
    for (new_col, &col) in cols.iter().enumerate() {
        let lane = mat.col(col);
        for (&r, v) in lane.row_indices().iter().zip(lane.values()) {
            let pos = row_pos[r];
            if pos != usize::MAX {
                coo.push(pos, new_col, v.clone());
            }
        }
    }
    CscMatrix::from(&coo)
}

/// Diagonal matrix with an explicit entry for every position, zeros included.
pub fn diag_csc<T: Scalar>(values: &[T]) -> CscMatrix<T> {
    let n = values.len();
    let offsets = (0..=n).collect();
    let indices = (0..n).collect();
    // SAFETY: one sorted index per column, all in range.
    unsafe {
        let pattern = SparsityPattern::from_offset_and_indices_unchecked(n, n, offsets, indices);
        CscMatrix::try_from_pattern_and_values(pattern, values.to_vec()).unwrap_unchecked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::DMatrix;

    #[test]
    fn test_select() {
        let dense = DMatrix::from_row_slice(
            4,
            4,
            &[
                1.0, 0.0, 2.0, 0.0, //
                0.0, 3.0, 0.0, 4.0, //
                5.0, 0.0, 6.0, 0.0, //
                0.0, 7.0, 0.0, 8.0,
            ],
        );
        let sp = CscMatrix::from(&dense);
        let sub = select_csc(&sp, &[2, 0], &[0, 2, 3]);
        let expected = DMatrix::from_row_slice(2, 3, &[5.0, 6.0, 0.0, 1.0, 2.0, 0.0]);
        assert_eq!(DMatrix::from(&sub), expected);

        let empty = select_csc(&sp, &[], &[1, 2]);
        assert_eq!((empty.nrows(), empty.ncols(), empty.nnz()), (0, 2, 0));
    }

    #[test]
    fn test_diag() {
        let d = diag_csc(&[1.0, 0.0, -2.0]);
        assert_eq!(d.nnz(), 3);
        assert_eq!(
            DMatrix::from(&d),
            DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![1.0, 0.0, -2.0]))
        );
    }
}
