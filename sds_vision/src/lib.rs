// THEORY:
// This file is the entry point for the `sds_vision` library crate. It classifies
// handwritten digits by Stochastic Diffusion Search: a swarm of agents hunts through
// the training pictures for the one that agrees with an unseen picture on the most
// pairwise brightness comparisons.
//
// The public surface is layered the same way the code is:
// - `core_modules`: the building blocks (`Image`, `MicrotestSpace`, the IDX
//   `dataset` decoder, the SDS `swarm`, and PNG export helpers).
// - `pipeline`: one classification, and the single-shot example run.
// - `parallel_pipeline`: the full-dataset experiment over a tokio worker pool.
// - `results`, `config`, `error`: the results log, run configuration, and error
//   types shared by all of the above.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod results;

pub use config::ExperimentConfig;
pub use core_modules::image::{Image, ImageBuilder, Position};
pub use core_modules::microtest::{Microtest, MicrotestSpace, Microtests, relation};
pub use error::{DatasetError, ExperimentError, SwarmError, VisionError};
pub use parallel_pipeline::{ExperimentReport, ParallelExperiment};
pub use pipeline::{Classification, ClassificationPipeline, PipelineConfig};
