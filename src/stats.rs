use anyhow::{Result, bail};
use ndarray::{Array2, Array3, Axis, Zip};
use serde::{Deserialize, Serialize};

/// A 2D matrix of values paired with a per-cell validity mask.
///
/// A mask entry of `true` marks the cell invalid; invalid cells carry no
/// numeric meaning and are skipped by every reduction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedMatrix {
    data: Array2<f64>,
    mask: Array2<bool>,
}

impl MaskedMatrix {
    /// Create a new masked matrix from a value matrix and a mask of the same shape.
    pub fn new(data: Array2<f64>, mask: Array2<bool>) -> Result<Self> {
        if data.dim() != mask.dim() {
            bail!(
                "data shape {:?} does not match mask shape {:?}",
                data.dim(),
                mask.dim()
            );
        }
        Ok(Self { data, mask })
    }

    pub fn dim(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Get the value at a cell, or `None` if the cell is invalid.
    pub fn get(&self, i_row: usize, i_col: usize) -> Option<f64> {
        if self.mask[[i_row, i_col]] {
            None
        } else {
            Some(self.data[[i_row, i_col]])
        }
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    /// Number of valid cells.
    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&masked| !masked).count()
    }

    /// Apply `f` to every value, keeping the mask unchanged.
    pub fn map<F: Fn(f64) -> f64>(&self, f: F) -> Self {
        Self {
            data: self.data.mapv(&f),
            mask: self.mask.clone(),
        }
    }

    /// Combine two matrices elementwise; a cell is invalid in the result if it
    /// is invalid in either operand.
    pub fn zip_map<F: Fn(f64, f64) -> f64>(&self, other: &Self, f: F) -> Self {
        debug_assert_eq!(self.dim(), other.dim());
        let data = Zip::from(&self.data)
            .and(&other.data)
            .map_collect(|&a, &b| f(a, b));
        let mask = Zip::from(&self.mask)
            .and(&other.mask)
            .map_collect(|&a, &b| a || b);
        Self { data, mask }
    }
}

/// Elementwise `sqrt(a^2 + b^2 + ...)` over several matrices, with a cell
/// invalid in the result if it is invalid in any operand.
pub fn quadrature(parts: &[&MaskedMatrix]) -> Result<MaskedMatrix> {
    let Some(first) = parts.first() else {
        bail!("quadrature requires at least one matrix");
    };
    let dim = first.dim();

    let mut data = Array2::<f64>::zeros(dim);
    let mut mask = Array2::<bool>::from_elem(dim, false);
    for part in parts {
        if part.dim() != dim {
            bail!("matrix shape {:?} does not match shape {:?}", part.dim(), dim);
        }
        Zip::from(&mut data)
            .and(&part.data)
            .for_each(|acc, &val| *acc += val * val);
        Zip::from(&mut mask)
            .and(&part.mask)
            .for_each(|acc, &masked| *acc = *acc || masked);
    }
    data.mapv_inplace(f64::sqrt);

    Ok(MaskedMatrix { data, mask })
}

/// A stack of same-shaped masked matrices along a third (sample) axis.
///
/// Reductions run along the sample axis and skip invalid entries.
#[derive(Debug, Clone)]
pub struct MaskedStack {
    data: Array3<f64>,
    mask: Array3<bool>,
}

impl MaskedStack {
    /// Stack the given layers along a new sample axis.
    pub fn from_layers(layers: &[&MaskedMatrix]) -> Result<Self> {
        let Some(first) = layers.first() else {
            bail!("stack requires at least one layer");
        };
        let (n_rows, n_cols) = first.dim();
        let depth = layers.len();

        let mut data = Array3::<f64>::zeros((n_rows, n_cols, depth));
        let mut mask = Array3::<bool>::from_elem((n_rows, n_cols, depth), true);
        for (i_layer, layer) in layers.iter().enumerate() {
            if layer.dim() != (n_rows, n_cols) {
                bail!(
                    "layer {i_layer} shape {:?} does not match shape {:?}",
                    layer.dim(),
                    (n_rows, n_cols)
                );
            }
            data.index_axis_mut(Axis(2), i_layer).assign(&layer.data);
            mask.index_axis_mut(Axis(2), i_layer).assign(&layer.mask);
        }

        Ok(Self { data, mask })
    }

    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    /// Number of valid entries per cell along the sample axis.
    pub fn count(&self) -> Array2<usize> {
        self.mask
            .map_axis(Axis(2), |lane| lane.iter().filter(|&&masked| !masked).count())
    }

    /// Mean along the sample axis over valid entries only, with the given
    /// output mask imposed. The divisor is the per-cell valid count; cells
    /// with no valid entries are always masked in the result.
    pub fn mean_where(&self, out_mask: &Array2<bool>) -> MaskedMatrix {
        let (n_rows, n_cols, depth) = self.data.dim();
        let mut data = Array2::<f64>::zeros((n_rows, n_cols));
        let mut mask = out_mask.clone();

        for i_row in 0..n_rows {
            for i_col in 0..n_cols {
                let mut sum = 0.0;
                let mut n_valid = 0_usize;
                for i_layer in 0..depth {
                    if !self.mask[[i_row, i_col, i_layer]] {
                        sum += self.data[[i_row, i_col, i_layer]];
                        n_valid += 1;
                    }
                }
                if n_valid == 0 {
                    mask[[i_row, i_col]] = true;
                } else {
                    data[[i_row, i_col]] = sum / n_valid as f64;
                }
            }
        }

        MaskedMatrix { data, mask }
    }

    /// Subtract a per-cell value from every layer; an entry is invalid in the
    /// result if it is invalid in the stack or the subtrahend cell is invalid.
    pub fn subtract(&self, means: &MaskedMatrix) -> MaskedStack {
        let (n_rows, n_cols, depth) = self.data.dim();
        debug_assert_eq!(means.dim(), (n_rows, n_cols));
        let mut out = self.clone();

        for i_row in 0..n_rows {
            for i_col in 0..n_cols {
                let mean_masked = means.mask[[i_row, i_col]];
                for i_layer in 0..depth {
                    out.data[[i_row, i_col, i_layer]] -= means.data[[i_row, i_col]];
                    out.mask[[i_row, i_col, i_layer]] |= mean_masked;
                }
            }
        }

        out
    }

    /// Absolute value of every entry, keeping the mask unchanged.
    pub fn abs(&self) -> MaskedStack {
        Self {
            data: self.data.mapv(f64::abs),
            mask: self.mask.clone(),
        }
    }

    /// Elementwise product of two stacks; an entry is invalid in the result if
    /// it is invalid in either operand.
    pub fn product(&self, other: &MaskedStack) -> MaskedStack {
        debug_assert_eq!(self.dim(), other.dim());
        let data = &self.data * &other.data;
        let mask = Zip::from(&self.mask)
            .and(&other.mask)
            .map_collect(|&a, &b| a || b);
        Self { data, mask }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn matrix(data: Array2<f64>, mask: Array2<bool>) -> MaskedMatrix {
        MaskedMatrix::new(data, mask).unwrap()
    }

    fn unmasked(data: Array2<f64>) -> MaskedMatrix {
        let mask = Array2::from_elem(data.dim(), false);
        matrix(data, mask)
    }

    #[test]
    fn new_rejects_shape_mismatch() {
        let data = Array2::<f64>::zeros((2, 2));
        let mask = Array2::<bool>::from_elem((2, 3), false);
        assert!(MaskedMatrix::new(data, mask).is_err());
    }

    #[test]
    fn get_hides_invalid_cells() {
        let m = matrix(array![[1.0, 2.0]], array![[false, true]]);
        assert_eq!(m.get(0, 0), Some(1.0));
        assert_eq!(m.get(0, 1), None);
        assert_eq!(m.valid_count(), 1);
    }

    #[test]
    fn zip_map_unions_masks() {
        let a = matrix(array![[1.0, 2.0]], array![[false, true]]);
        let b = matrix(array![[3.0, 4.0]], array![[false, false]]);
        let sum = a.zip_map(&b, |x, y| x + y);
        assert_eq!(sum.get(0, 0), Some(4.0));
        assert_eq!(sum.get(0, 1), None);
    }

    #[test]
    fn quadrature_of_pythagorean_triple() {
        let a = unmasked(array![[3.0]]);
        let b = unmasked(array![[4.0]]);
        let q = quadrature(&[&a, &b]).unwrap();
        assert_eq!(q.get(0, 0), Some(5.0));
    }

    #[test]
    fn quadrature_unions_masks() {
        let a = matrix(array![[3.0]], array![[true]]);
        let b = unmasked(array![[4.0]]);
        let q = quadrature(&[&a, &b]).unwrap();
        assert_eq!(q.get(0, 0), None);
    }

    #[test]
    fn count_skips_invalid_entries() {
        let a = matrix(array![[1.0]], array![[false]]);
        let b = matrix(array![[2.0]], array![[true]]);
        let c = matrix(array![[3.0]], array![[false]]);
        let stack = MaskedStack::from_layers(&[&a, &b, &c]).unwrap();
        assert_eq!(stack.count()[[0, 0]], 2);
    }

    #[test]
    fn mean_divides_by_valid_count() {
        let a = matrix(array![[1.0]], array![[false]]);
        let b = matrix(array![[9.0]], array![[true]]);
        let c = matrix(array![[3.0]], array![[false]]);
        let stack = MaskedStack::from_layers(&[&a, &b, &c]).unwrap();
        let out_mask = Array2::from_elem((1, 1), false);
        let mean = stack.mean_where(&out_mask);
        assert_eq!(mean.get(0, 0), Some(2.0));
    }

    #[test]
    fn mean_of_no_valid_entries_is_masked() {
        let a = matrix(array![[1.0]], array![[true]]);
        let stack = MaskedStack::from_layers(&[&a]).unwrap();
        let out_mask = Array2::from_elem((1, 1), false);
        let mean = stack.mean_where(&out_mask);
        assert_eq!(mean.get(0, 0), None);
    }

    #[test]
    fn subtract_propagates_both_masks() {
        let a = matrix(array![[1.0, 5.0]], array![[false, true]]);
        let stack = MaskedStack::from_layers(&[&a]).unwrap();
        let means = matrix(array![[1.0, 1.0]], array![[true, false]]);
        let fluc = stack.subtract(&means);
        assert_eq!(fluc.count()[[0, 0]], 0);
        assert_eq!(fluc.count()[[0, 1]], 0);
    }

    #[test]
    fn product_unions_entry_masks() {
        let a = matrix(array![[2.0]], array![[false]]);
        let b = matrix(array![[2.0]], array![[true]]);
        let stack_a = MaskedStack::from_layers(&[&a]).unwrap();
        let stack_b = MaskedStack::from_layers(&[&b]).unwrap();
        assert_eq!(stack_a.product(&stack_b).count()[[0, 0]], 0);
    }

    #[test]
    fn from_layers_rejects_mismatched_shapes() {
        let a = unmasked(Array2::zeros((2, 2)));
        let b = unmasked(Array2::zeros((3, 2)));
        assert!(MaskedStack::from_layers(&[&a, &b]).is_err());
    }

    #[test]
    fn from_layers_rejects_empty_input() {
        assert!(MaskedStack::from_layers(&[]).is_err());
    }
}
