use crate::error::{LaeError, Result};

/// Transpose a list of rows: `dst[j][i] = src[i][j]`.
///
/// What was column j of `src` becomes row j of the result. The input must be
/// rectangular; a ragged row is rejected instead of silently truncated.
///
/// # Example
///
/// ```
/// use lae::matrix::transpose::transpose_rows;
///
/// let src = vec![vec![1.0, 2.0, 3.0],   // 2×3 matrix
///                vec![4.0, 5.0, 6.0]];
///
/// let dst = transpose_rows(&src).unwrap();
///
/// assert_eq!(dst, vec![vec![1.0, 4.0],   // 3×2 matrix
///                      vec![2.0, 5.0],
///                      vec![3.0, 6.0]]);
/// ```
pub fn transpose_rows<R: AsRef<[f64]>>(src: &[R]) -> Result<Vec<Vec<f64>>> {
    let Some(first) = src.first() else {
        return Ok(Vec::new());
    };
    let cols = first.as_ref().len();
    let rows = src.len();

    let mut dst = vec![vec![0.0; rows]; cols];
    for (i, row) in src.iter().enumerate() {
        let row = row.as_ref();
        if row.len() != cols {
            return Err(LaeError::DimensionMismatch(format!(
                "row {} has {} elements, expected {}",
                i,
                row.len(),
                cols
            )));
        }
        for (j, &value) in row.iter().enumerate() {
            dst[j][i] = value;
        }
    }
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transpose_empty() {
        let src: Vec<Vec<f64>> = Vec::new();
        assert!(transpose_rows(&src).unwrap().is_empty());
    }

    #[test]
    fn test_transpose_single_column() {
        let src = vec![vec![1.0], vec![2.0], vec![3.0]];
        assert_eq!(transpose_rows(&src).unwrap(), vec![vec![1.0, 2.0, 3.0]]);
    }

    #[test]
    fn test_transpose_rejects_ragged() {
        let src = vec![vec![1.0, 2.0], vec![3.0]];
        assert!(matches!(
            transpose_rows(&src),
            Err(LaeError::DimensionMismatch(_))
        ));
    }
}
