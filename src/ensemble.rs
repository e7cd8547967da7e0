use crate::error::EnsembleError;
use crate::field::{FieldKey, FieldSet};
use crate::sample::Sample;
use crate::stats::{MaskedMatrix, MaskedStack, quadrature};
use anyhow::{Context, Result};
use ndarray::{Array1, Array2};
use std::{path::PathBuf, time::Instant};

/// Ensemble aggregator over velocity field snapshots sharing one grid.
///
/// The first ingested sample establishes the authoritative grid; every later
/// sample must match its shape. Statistics are recomputed wholesale from the
/// retained sample set, so re-aggregation with a different `min_points` fully
/// replaces the derived field set.
pub struct Ensemble {
    name_tag: String,
    min_points: usize,
    // free stream velocity, reserved for normalization; unused by the statistics
    velocity_fs: Option<f64>,
    samples: Vec<Sample>,
    fields: Option<FieldSet>,
}

impl Ensemble {
    pub const DEFAULT_MIN_POINTS: usize = 20;

    /// Create an empty ensemble. Not usable until samples are ingested.
    pub fn new(name_tag: &str, min_points: usize, velocity_fs: Option<f64>) -> Self {
        Self {
            name_tag: name_tag.to_owned(),
            min_points,
            velocity_fs,
            samples: Vec::new(),
            fields: None,
        }
    }

    /// Load every file, validate grid consistency, and aggregate.
    ///
    /// Loader failures and grid mismatches are fatal to the whole ingestion;
    /// no partial ensemble is retained.
    pub fn ingest_paths(&mut self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Err(EnsembleError::EmptySourceList.into());
        }
        let start = Instant::now();

        let mut samples = Vec::with_capacity(paths.len());
        for path in paths {
            let sample =
                Sample::from_v3d(path).with_context(|| format!("failed to load {path:?}"))?;
            samples.push(sample);
        }
        log::info!(
            "loaded {} files in {:.3} s",
            paths.len(),
            start.elapsed().as_secs_f64()
        );

        self.ingest_samples(samples)
    }

    /// Ingest already loaded samples, validate grid consistency, and aggregate.
    pub fn ingest_samples(&mut self, samples: Vec<Sample>) -> Result<()> {
        let Some(first) = samples.first() else {
            return Err(EnsembleError::EmptySourceList.into());
        };

        let expected = first.dims();
        for (index, sample) in samples.iter().enumerate().skip(1) {
            let found = sample.dims();
            if found != expected {
                return Err(EnsembleError::DimensionMismatch {
                    index,
                    expected,
                    found,
                }
                .into());
            }
        }

        self.samples = samples;
        self.compute_statistics(None)
    }

    /// Recompute the derived field set from the retained samples.
    ///
    /// Separates the sample history at every cell into an ensemble mean and a
    /// fluctuation component, then reduces the fluctuations into absolute
    /// means, second moments, Reynolds stresses, and the triple correlation.
    /// The valid-sample count comes from the U stack and its threshold mask
    /// (`count <= min_points` is masked) applies to every output field.
    pub fn compute_statistics(&mut self, min_points: Option<usize>) -> Result<()> {
        if let Some(min_points) = min_points {
            self.min_points = min_points;
        }
        if self.samples.is_empty() {
            return Err(EnsembleError::EmptySourceList.into());
        }
        log::info!("taking statistics with min_points = {}", self.min_points);

        let u_layers: Vec<&MaskedMatrix> = self.samples.iter().map(Sample::u).collect();
        let v_layers: Vec<&MaskedMatrix> = self.samples.iter().map(Sample::v).collect();
        let w_layers: Vec<&MaskedMatrix> = self.samples.iter().map(Sample::w).collect();
        let u_stack = MaskedStack::from_layers(&u_layers).context("failed to stack U layers")?;
        let v_stack = MaskedStack::from_layers(&v_layers).context("failed to stack V layers")?;
        let w_stack = MaskedStack::from_layers(&w_layers).context("failed to stack W layers")?;

        // cells with no more than min_points valid samples are masked everywhere
        let min_points = self.min_points;
        let valid_count = u_stack.count();
        let mask = valid_count.mapv(|n_valid| n_valid <= min_points);
        let count = MaskedMatrix::new(valid_count.mapv(|n_valid| n_valid as f64), mask.clone())?;

        let mean_u = u_stack.mean_where(&mask);
        let mean_v = v_stack.mean_where(&mask);
        let mean_w = w_stack.mean_where(&mask);

        let speed = quadrature(&[&mean_u, &mean_v, &mean_w])?;
        let in_plane_speed = quadrature(&[&mean_u, &mean_v])?;

        // fluctuation stacks: raw value minus the cell's ensemble mean
        let fluc_u_stack = u_stack.subtract(&mean_u);
        let fluc_v_stack = v_stack.subtract(&mean_v);
        let fluc_w_stack = w_stack.subtract(&mean_w);

        let fluc_u = fluc_u_stack.abs().mean_where(&mask);
        let fluc_v = fluc_v_stack.abs().mean_where(&mask);
        let fluc_w = fluc_w_stack.abs().mean_where(&mask);

        // population second moments (divisor is the valid count)
        let energy_uu = fluc_u_stack.product(&fluc_u_stack).mean_where(&mask);
        let energy_vv = fluc_v_stack.product(&fluc_v_stack).mean_where(&mask);
        let energy_ww = fluc_w_stack.product(&fluc_w_stack).mean_where(&mask);
        let total_energy = energy_uu
            .zip_map(&energy_vv, |a, b| a + b)
            .zip_map(&energy_ww, |a, b| a + b)
            .map(|energy| energy / 2.0);

        let stress_uv = fluc_u_stack.product(&fluc_v_stack).mean_where(&mask);
        let stress_uw = fluc_u_stack.product(&fluc_w_stack).mean_where(&mask);
        let stress_vw = fluc_v_stack.product(&fluc_w_stack).mean_where(&mask);
        let triple_corr = fluc_u_stack
            .product(&fluc_v_stack)
            .product(&fluc_w_stack)
            .mean_where(&mask);

        self.fields = Some(FieldSet {
            mean_u,
            mean_v,
            mean_w,
            in_plane_speed,
            speed,
            fluc_u,
            fluc_v,
            fluc_w,
            energy_uu,
            energy_vv,
            energy_ww,
            total_energy,
            stress_uv,
            stress_uw,
            stress_vw,
            triple_corr,
            count,
        });
        Ok(())
    }

    /// Read a derived field by key, accepting reversed spellings ("vu" for
    /// "uv"). `None` for unknown keys or before aggregation.
    ///
    /// Coordinate structures are not string-keyed: use [`Ensemble::x_set`],
    /// [`Ensemble::y_set`], and [`Ensemble::meshgrid`] for the grid axes and
    /// the x/y coordinate meshes.
    pub fn field(&self, key: &str) -> Option<&MaskedMatrix> {
        let key = FieldKey::parse(key)?;
        self.fields.as_ref().map(|fields| fields.get(key))
    }

    /// Overwrite a derived field by key, accepting reversed spellings.
    pub fn set_field(&mut self, key: &str, matrix: MaskedMatrix) -> Result<(), EnsembleError> {
        let parsed =
            FieldKey::parse(key).ok_or_else(|| EnsembleError::InvalidFieldKey(key.to_owned()))?;
        let fields = self.fields.as_mut().ok_or(EnsembleError::NoComputedFields)?;
        *fields.get_mut(parsed) = matrix;
        Ok(())
    }

    pub fn fields(&self) -> Option<&FieldSet> {
        self.fields.as_ref()
    }

    pub fn name_tag(&self) -> &str {
        &self.name_tag
    }

    pub fn min_points(&self) -> usize {
        self.min_points
    }

    /// Free stream velocity, stored for future normalization.
    pub fn velocity_fs(&self) -> Option<f64> {
        self.velocity_fs
    }

    pub fn n_samples(&self) -> usize {
        self.samples.len()
    }

    /// Grid shape (rows, cols) inherited from the first sample.
    pub fn dims(&self) -> Option<(usize, usize)> {
        self.samples.first().map(Sample::dims)
    }

    pub fn x_set(&self) -> Option<&Array1<f64>> {
        self.samples.first().map(Sample::x_set)
    }

    pub fn y_set(&self) -> Option<&Array1<f64>> {
        self.samples.first().map(Sample::y_set)
    }

    pub fn meshgrid(&self) -> Option<(Array2<f64>, Array2<f64>)> {
        self.samples.first().map(Sample::meshgrid)
    }
}
