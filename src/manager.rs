use crate::config::Config;
use crate::ensemble::Ensemble;
use anyhow::{Context, Result};
use glob::glob;
use rmp_serde::encode;
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

/// Drives one data set directory: discovers the v3d snapshot files, runs the
/// ensemble aggregation, and writes the derived field set to a results file.
pub struct Manager {
    data_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();

        let cfg =
            Config::from_file(data_dir.join("config.toml")).context("failed to construct cfg")?;
        log::info!("{cfg:#?}");

        Ok(Self { data_dir, cfg })
    }

    pub fn average_ensemble(&self, min_points: Option<usize>) -> Result<()> {
        let paths = self.find_v3d_files().context("failed to find v3d files")?;

        let mut ensemble = Ensemble::new(
            &self.cfg.name_tag,
            min_points.unwrap_or(self.cfg.min_points),
            self.cfg.velocity_fs,
        );
        ensemble
            .ingest_paths(&paths)
            .context("failed to aggregate v3d files")?;

        log::info!(
            "averaged ensemble {:?}: {} samples on grid {:?}",
            ensemble.name_tag(),
            ensemble.n_samples(),
            ensemble.dims()
        );
        if let Some(count) = ensemble.field("num") {
            log::info!(
                "{} of {} cells passed the minimum point threshold",
                count.valid_count(),
                count.dim().0 * count.dim().1
            );
        }

        let fields = ensemble
            .fields()
            .context("ensemble has no computed fields")?;

        let results_file = self.results_file();
        let file = File::create(&results_file)
            .with_context(|| format!("failed to create {results_file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, fields).context("failed to serialize results")?;
        log::info!("wrote {results_file:?}");

        Ok(())
    }

    pub fn clean_results(&self) -> Result<()> {
        let results_file = self.results_file();
        if results_file.exists() {
            fs::remove_file(&results_file)
                .with_context(|| format!("failed to remove {results_file:?}"))?;
            log::info!("removed {results_file:?}");
        }
        Ok(())
    }

    fn find_v3d_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.data_dir.join("*.v3d");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let mut paths: Vec<PathBuf> = glob(pattern)
            .context("failed to glob v3d files")?
            .filter_map(Result::ok)
            .collect();
        paths.sort();
        Ok(paths)
    }

    fn results_file(&self) -> PathBuf {
        self.data_dir.join("results.msgpack")
    }
}
