// Run configuration for the example and experiment modes. Defaults can be
// overridden from the environment (`SDS_DATASET_DIR`, `SDS_RESULTS_PATH`,
// `SDS_SEED`, `SDS_WORKERS`); the CLI applies its own flags on top.

use crate::pipeline::PipelineConfig;
use std::path::PathBuf;

pub const DEFAULT_DATASET_DIR: &str = "./datasets";
pub const DEFAULT_RESULTS_PATH: &str = "results/standard_sds_results.json";

#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    /// Directory holding the four IDX files.
    pub dataset_dir: PathBuf,
    /// Where the experiment writes its JSON results log.
    pub results_path: PathBuf,
    /// Cap on records decoded from each file. `None` reads everything.
    pub max_items: Option<usize>,
    /// Seed for every random draw. `None` lets the caller pick one.
    pub seed: Option<u64>,
    /// Size of the classification worker pool.
    pub workers: usize,
    pub pipeline: PipelineConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from(DEFAULT_DATASET_DIR),
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
            max_items: None,
            seed: None,
            workers: num_cpus::get(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `SDS_*` overrides from `lookup`. Empty or unparsable values are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).filter(|value| !value.is_empty());

        if let Some(dir) = var("SDS_DATASET_DIR") {
            self.dataset_dir = PathBuf::from(dir);
        }
        if let Some(path) = var("SDS_RESULTS_PATH") {
            self.results_path = PathBuf::from(path);
        }
        if let Some(seed) = var("SDS_SEED").and_then(|s| s.parse().ok()) {
            self.seed = Some(seed);
        }
        if let Some(workers) = var("SDS_WORKERS").and_then(|s| s.parse().ok()) {
            self.workers = workers;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let config = ExperimentConfig::default();
        assert_eq!(config.dataset_dir, PathBuf::from("./datasets"));
        assert_eq!(config.results_path, PathBuf::from("results/standard_sds_results.json"));
        assert_eq!(config.max_items, None);
        assert!(config.workers >= 1);
        assert_eq!(config.pipeline, PipelineConfig::default());
    }

    #[test]
    fn environment_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("SDS_DATASET_DIR", "/data/digits"),
            ("SDS_SEED", "42"),
            ("SDS_WORKERS", "not-a-number"),
            ("SDS_RESULTS_PATH", ""),
        ]
        .into_iter()
        .collect();

        let config = ExperimentConfig::default()
            .with_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.dataset_dir, PathBuf::from("/data/digits"));
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.workers, num_cpus::get());
        assert_eq!(config.results_path, PathBuf::from(DEFAULT_RESULTS_PATH));
    }
}
