use crate::stats::MaskedMatrix;
use anyhow::{Context, Result, bail};
use ndarray::{Array1, Array2};
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

/// One instantaneous velocity field snapshot on a rectilinear grid.
///
/// Grid shape is `(y_set.len(), x_set.len())`; rows follow the y axis and
/// columns the x axis. The three component matrices share the grid shape and
/// carry a per-cell validity mask.
#[derive(Debug, Clone)]
pub struct Sample {
    x_set: Array1<f64>,
    y_set: Array1<f64>,
    u: MaskedMatrix,
    v: MaskedMatrix,
    w: MaskedMatrix,
}

impl Sample {
    /// Create a sample from already materialized axes and component matrices.
    pub fn from_parts(
        x_set: Array1<f64>,
        y_set: Array1<f64>,
        u: MaskedMatrix,
        v: MaskedMatrix,
        w: MaskedMatrix,
    ) -> Result<Self> {
        let dims = (y_set.len(), x_set.len());
        for (name, matrix) in [("U", &u), ("V", &v), ("W", &w)] {
            if matrix.dim() != dims {
                bail!(
                    "{name} matrix shape {:?} does not match grid shape {:?}",
                    matrix.dim(),
                    dims
                );
            }
        }
        Ok(Self { x_set, y_set, u, v, w })
    }

    /// Load a sample from a v3d velocity table file.
    pub fn from_v3d<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let reader = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        Self::parse_v3d(BufReader::new(reader)).with_context(|| format!("failed to parse {file:?}"))
    }

    /// Parse a v3d velocity table: optional header lines followed by
    /// comma-separated `x, y, u, v, w, chc` records. A `chc` below 1 marks the
    /// vector invalid; grid cells absent from the table are also invalid.
    pub fn parse_v3d<R: BufRead>(reader: R) -> Result<Self> {
        let mut records = Vec::new();
        for (i_line, line) in reader.lines().enumerate() {
            let line = line.context("failed to read from source")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if records.is_empty() && starts_with_column_name(line) {
                continue;
            }
            let mut record = parse_record(line)
                .with_context(|| format!("invalid record on line {}", i_line + 1))?;
            // -0.0 and 0.0 name the same grid coordinate
            record[0] = normalize_zero(record[0]);
            record[1] = normalize_zero(record[1]);
            records.push(record);
        }
        if records.is_empty() {
            bail!("no velocity records found");
        }

        let x_vals = axis_values(records.iter().map(|rec| rec[0]));
        let y_vals = axis_values(records.iter().map(|rec| rec[1]));
        let dims = (y_vals.len(), x_vals.len());

        let mut u_data = Array2::<f64>::zeros(dims);
        let mut v_data = Array2::<f64>::zeros(dims);
        let mut w_data = Array2::<f64>::zeros(dims);
        let mut mask = Array2::<bool>::from_elem(dims, true);
        for &[x, y, u, v, w, chc] in &records {
            let i_row = axis_index(&y_vals, y);
            let i_col = axis_index(&x_vals, x);
            u_data[[i_row, i_col]] = u;
            v_data[[i_row, i_col]] = v;
            w_data[[i_row, i_col]] = w;
            mask[[i_row, i_col]] = chc < 1.0;
        }

        Self::from_parts(
            Array1::from_vec(x_vals),
            Array1::from_vec(y_vals),
            MaskedMatrix::new(u_data, mask.clone())?,
            MaskedMatrix::new(v_data, mask.clone())?,
            MaskedMatrix::new(w_data, mask)?,
        )
    }

    pub fn x_set(&self) -> &Array1<f64> {
        &self.x_set
    }

    pub fn y_set(&self) -> &Array1<f64> {
        &self.y_set
    }

    /// Grid shape as (rows, cols).
    pub fn dims(&self) -> (usize, usize) {
        (self.y_set.len(), self.x_set.len())
    }

    /// Coordinate meshes (x_mesh, y_mesh), each of full grid shape.
    pub fn meshgrid(&self) -> (Array2<f64>, Array2<f64>) {
        let dims = self.dims();
        let x_mesh = Array2::from_shape_fn(dims, |(_, i_col)| self.x_set[i_col]);
        let y_mesh = Array2::from_shape_fn(dims, |(i_row, _)| self.y_set[i_row]);
        (x_mesh, y_mesh)
    }

    pub fn u(&self) -> &MaskedMatrix {
        &self.u
    }

    pub fn v(&self) -> &MaskedMatrix {
        &self.v
    }

    pub fn w(&self) -> &MaskedMatrix {
        &self.w
    }
}

fn starts_with_column_name(line: &str) -> bool {
    line.split(',')
        .next()
        .is_some_and(|token| token.trim().parse::<f64>().is_err())
}

fn parse_record(line: &str) -> Result<[f64; 6]> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        bail!("expected 6 comma-separated fields, found {}", fields.len());
    }
    let mut record = [0.0; 6];
    for (value, field) in record.iter_mut().zip(&fields) {
        *value = field
            .parse()
            .with_context(|| format!("failed to parse number {field:?}"))?;
    }
    Ok(record)
}

fn normalize_zero(value: f64) -> f64 {
    if value == 0.0 { 0.0 } else { value }
}

fn axis_values(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut values: Vec<f64> = values.collect();
    values.sort_by(f64::total_cmp);
    // dedup under the same ordering used by axis_index
    values.dedup_by(|a, b| a.total_cmp(b).is_eq());
    values
}

fn axis_index(axis: &[f64], value: f64) -> usize {
    // value is always one of the entries that produced the axis
    axis.partition_point(|&entry| entry.total_cmp(&value).is_lt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FULL_GRID: &str = "\
X mm, Y mm, U m/s, V m/s, W m/s, CHC
0.0, 0.0, 1.0, 2.0, 3.0, 1
1.0, 0.0, 4.0, 5.0, 6.0, 1
0.0, 1.0, 7.0, 8.0, 9.0, -1
1.0, 1.0, 10.0, 11.0, 12.0, 1
";

    #[test]
    fn parses_grid_and_components() {
        let sample = Sample::parse_v3d(Cursor::new(FULL_GRID)).unwrap();
        assert_eq!(sample.dims(), (2, 2));
        assert_eq!(sample.x_set().to_vec(), vec![0.0, 1.0]);
        assert_eq!(sample.y_set().to_vec(), vec![0.0, 1.0]);
        assert_eq!(sample.u().get(0, 0), Some(1.0));
        assert_eq!(sample.v().get(0, 1), Some(5.0));
        assert_eq!(sample.w().get(1, 1), Some(12.0));
    }

    #[test]
    fn low_chc_masks_all_components() {
        let sample = Sample::parse_v3d(Cursor::new(FULL_GRID)).unwrap();
        assert_eq!(sample.u().get(1, 0), None);
        assert_eq!(sample.v().get(1, 0), None);
        assert_eq!(sample.w().get(1, 0), None);
    }

    #[test]
    fn absent_cells_are_masked() {
        let table = "\
0.0, 0.0, 1.0, 2.0, 3.0, 1
1.0, 0.0, 4.0, 5.0, 6.0, 1
1.0, 1.0, 10.0, 11.0, 12.0, 1
";
        let sample = Sample::parse_v3d(Cursor::new(table)).unwrap();
        assert_eq!(sample.dims(), (2, 2));
        assert_eq!(sample.u().get(1, 0), None);
        assert_eq!(sample.u().get(1, 1), Some(10.0));
    }

    #[test]
    fn header_line_is_optional() {
        let table = "0.0, 0.0, 1.0, 2.0, 3.0, 1\n";
        let sample = Sample::parse_v3d(Cursor::new(table)).unwrap();
        assert_eq!(sample.dims(), (1, 1));
        assert_eq!(sample.u().get(0, 0), Some(1.0));
    }

    #[test]
    fn negative_zero_matches_positive_zero_coordinate() {
        let table = "\
-0.0, 0.0, 1.0, 2.0, 3.0, 1
0.0, -0.0, 4.0, 5.0, 6.0, 1
";
        let sample = Sample::parse_v3d(Cursor::new(table)).unwrap();
        assert_eq!(sample.dims(), (1, 1));
        assert_eq!(sample.u().get(0, 0), Some(4.0));
    }

    #[test]
    fn negative_zero_shares_an_axis_entry_with_other_coordinates() {
        let table = "\
-0.0, 0.0, 1.0, 2.0, 3.0, 1
1.0, 0.0, 4.0, 5.0, 6.0, 1
";
        let sample = Sample::parse_v3d(Cursor::new(table)).unwrap();
        assert_eq!(sample.dims(), (1, 2));
        assert_eq!(sample.x_set().to_vec(), vec![0.0, 1.0]);
        assert_eq!(sample.u().get(0, 0), Some(1.0));
        assert_eq!(sample.u().get(0, 1), Some(4.0));
    }

    #[test]
    fn malformed_record_is_fatal() {
        let table = "0.0, 0.0, 1.0, 2.0, 3.0, 1\n0.0, 1.0, oops, 2.0, 3.0, 1\n";
        assert!(Sample::parse_v3d(Cursor::new(table)).is_err());
    }

    #[test]
    fn empty_table_is_fatal() {
        let table = "X mm, Y mm, U m/s, V m/s, W m/s, CHC\n";
        assert!(Sample::parse_v3d(Cursor::new(table)).is_err());
    }

    #[test]
    fn from_parts_rejects_shape_mismatch() {
        let x_set = Array1::from_vec(vec![0.0, 1.0]);
        let y_set = Array1::from_vec(vec![0.0]);
        let good = MaskedMatrix::new(
            Array2::zeros((1, 2)),
            Array2::from_elem((1, 2), false),
        )
        .unwrap();
        let bad = MaskedMatrix::new(
            Array2::zeros((2, 2)),
            Array2::from_elem((2, 2), false),
        )
        .unwrap();
        assert!(Sample::from_parts(x_set, y_set, good.clone(), good, bad).is_err());
    }

    #[test]
    fn meshgrid_matches_axes() {
        let sample = Sample::parse_v3d(Cursor::new(FULL_GRID)).unwrap();
        let (x_mesh, y_mesh) = sample.meshgrid();
        assert_eq!(x_mesh[[0, 1]], 1.0);
        assert_eq!(x_mesh[[1, 1]], 1.0);
        assert_eq!(y_mesh[[1, 0]], 1.0);
        assert_eq!(y_mesh[[1, 1]], 1.0);
    }
}
