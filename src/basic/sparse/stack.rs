use nalgebra_sparse::{CscMatrix, pattern::SparsityPattern};

/// Concatenates matrices with equal row counts side by side.
pub fn csc_hstack<T: Clone>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let nrows = matrices[0].nrows();
    let ncols: usize = matrices.iter().map(|m| m.ncols()).sum();
    let nnz: usize = matrices.iter().map(|m| m.nnz()).sum();

    let mut data: Vec<T> = Vec::with_capacity(nnz);
    let mut indices: Vec<usize> = Vec::with_capacity(nnz);
    let mut indptr: Vec<usize> = Vec::with_capacity(ncols + 1);
    for mat in matrices {
        assert_eq!(mat.nrows(), nrows, "All matrices must have the same number of rows");
        let offset = data.len();
        let col_offsets = mat.col_offsets();
        indptr.extend(col_offsets[..mat.ncols()].iter().map(|x| x + offset));
        indices.extend_from_slice(mat.row_indices());
        data.extend_from_slice(mat.values());
    }
    indptr.push(nnz);
    // SAFETY: every block is a valid CSC matrix with `nrows` rows, so the
    // shifted offsets stay monotone and the row indices stay sorted per column.
    unsafe {
        let pattern = SparsityPattern::from_offset_and_indices_unchecked(ncols, nrows, indptr, indices);
        CscMatrix::try_from_pattern_and_values(pattern, data).unwrap_unchecked()
    }
}

/// Stacks matrices with equal column counts on top of each other.
pub fn csc_vstack<T: Clone>(matrices: &[&CscMatrix<T>]) -> CscMatrix<T> {
    let ncols = matrices[0].ncols();
    let nrows: usize = matrices.iter().map(|m| m.nrows()).sum();
    let nnz: usize = matrices.iter().map(|m| m.nnz()).sum();
    for mat in matrices {
        assert_eq!(mat.ncols(), ncols, "All matrices must have the same number of cols");
    }

    let mut data: Vec<T> = Vec::with_capacity(nnz);
    let mut indices: Vec<usize> = Vec::with_capacity(nnz);
    let mut indptr: Vec<usize> = vec![0; ncols + 1];
    for j in 0..ncols {
        let mut row_offset = 0;
        for mat in matrices {
            let (start, end) = (mat.col_offsets()[j], mat.col_offsets()[j + 1]);
            data.extend_from_slice(&mat.values()[start..end]);
            indices.extend(mat.row_indices()[start..end].iter().map(|r| r + row_offset));
            row_offset += mat.nrows();
        }
        indptr[j + 1] = data.len();
    }
    // SAFETY: blocks are visited top to bottom, so row indices stay sorted.
    unsafe {
        let pattern = SparsityPattern::from_offset_and_indices_unchecked(ncols, nrows, indptr, indices);
        CscMatrix::try_from_pattern_and_values(pattern, data).unwrap_unchecked()
    }
}

/// Assembles a block matrix from rows of blocks.
pub fn csc_block<T: Clone>(blocks: &[&[&CscMatrix<T>]]) -> CscMatrix<T> {
    let rows: Vec<CscMatrix<T>> = blocks.iter().map(|row| csc_hstack(row)).collect();
    let refs: Vec<&CscMatrix<T>> = rows.iter().collect();
    csc_vstack(&refs)
}
