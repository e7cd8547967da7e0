use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Data set configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Unique name tag for this data set.
    pub name_tag: String,

    /// Minimum number of valid samples for a grid cell statistic to be
    /// considered valid. The more points the better, especially for
    /// turbulence values.
    #[serde(default = "default_min_points")]
    pub min_points: usize,

    /// Free stream velocity. Stored for future normalization; unused by the
    /// current statistics.
    #[serde(default)]
    pub velocity_fs: Option<f64>,
}

fn default_min_points() -> usize {
    crate::ensemble::Ensemble::DEFAULT_MIN_POINTS
}

impl Config {
    /// Load a [`Config`] from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.name_tag.is_empty() {
            bail!("name tag must not be empty");
        }
        check_num(self.min_points, 1..100_000).context("invalid minimum point count")?;
        if let Some(velocity_fs) = self.velocity_fs {
            check_num(velocity_fs, 0.0..f64::INFINITY).context("invalid free stream velocity")?;
        }
        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
