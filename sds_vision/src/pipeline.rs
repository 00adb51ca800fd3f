// THEORY:
// The `pipeline` module is the top-level API for classifying a single picture. It
// wires the layers together: the reference picture becomes a `MicrotestSpace`, the
// training pictures become the hypothesis pool, and a fresh `Swarm` running standard
// SDS searches for the training picture that agrees with the reference on the most
// pairwise brightness tests. The label of the largest cluster's hypothesis is the
// guess.
//
// It also hosts the single-shot "example" run: load a small slice of both splits,
// pick one test picture at random, classify it, and log the outcome.

use crate::config::ExperimentConfig;
use crate::core_modules::dataset::Dataset;
use crate::core_modules::image::{Image, Label};
use crate::core_modules::microtest::MicrotestSpace;
use crate::core_modules::swarm::{SdsConfig, StandardSds, Swarm};
use crate::error::ExperimentError;
use crate::results::ResultRow;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

pub const DEFAULT_AGENT_COUNT: usize = 200;
pub const DEFAULT_MAX_ITERATIONS: usize = 200;
pub const EXAMPLE_MAX_ITEMS: usize = 100;

/// Tunables for one classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Number of SDS agents in the swarm.
    pub agent_count: usize,
    /// Fixed number of synchronous SDS iterations.
    pub max_iterations: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            agent_count: DEFAULT_AGENT_COUNT,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// The outcome of classifying one reference picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub reference_index: Option<usize>,
    pub true_label: Option<Label>,
    /// Dataset index of the winning hypothesis.
    pub guessed_index: Option<usize>,
    pub guessed_label: Option<Label>,
    pub is_correct: bool,
    /// Number of agents backing the guess.
    pub cluster_size: usize,
}

impl Classification {
    pub fn to_row(&self, sequence_num: usize) -> ResultRow {
        ResultRow(
            sequence_num,
            self.reference_index,
            self.true_label,
            self.guessed_index,
            self.guessed_label,
            self.is_correct,
        )
    }
}

/// Classifies pictures by standard SDS against a hypothesis pool.
#[derive(Debug, Clone, Default)]
pub struct ClassificationPipeline {
    config: PipelineConfig,
}

impl ClassificationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn classify<R: Rng + ?Sized>(
        &self,
        reference: &Image,
        hypotheses: &[Image],
        rng: &mut R,
    ) -> Result<Classification, ExperimentError> {
        let microtests = MicrotestSpace::new(reference.clone());
        let mut swarm = Swarm::new(self.config.agent_count);

        StandardSds::new(
            hypotheses,
            &microtests,
            SdsConfig {
                max_iterations: self.config.max_iterations,
            },
        )
        .run(&mut swarm, rng)?;

        let cluster = swarm.largest_cluster().ok_or(ExperimentError::NoCluster)?;
        let guess = &hypotheses[cluster.hypothesis];
        let true_label = reference.label();

        Ok(Classification {
            reference_index: reference.index(),
            true_label,
            guessed_index: guess.index(),
            guessed_label: guess.label(),
            is_correct: true_label.is_some() && guess.label() == true_label,
            cluster_size: cluster.size,
        })
    }
}

/// The picture chosen by an example run and how it was classified.
#[derive(Debug, Clone)]
pub struct ExampleOutcome {
    pub reference: Image,
    pub classification: Classification,
}

/// Picks one test picture at random and classifies it against `hypotheses`.
pub fn run_example_on<R: Rng + ?Sized>(
    test_pictures: &[Image],
    hypotheses: &[Image],
    pipeline: &ClassificationPipeline,
    rng: &mut R,
) -> Result<ExampleOutcome, ExperimentError> {
    let reference = test_pictures
        .choose(rng)
        .ok_or(ExperimentError::NoTestPictures)?
        .clone();

    info!("Selected this picture\n{}", reference);
    info!(
        "Doing standard SDS with {} agents for {} iterations.",
        pipeline.config().agent_count,
        pipeline.config().max_iterations
    );

    let classification = pipeline.classify(&reference, hypotheses, rng)?;

    info!(
        "Guess: {}, Correct: {}",
        classification
            .guessed_label
            .map_or_else(|| "None".to_string(), |label| label.to_string()),
        classification.is_correct
    );

    Ok(ExampleOutcome {
        reference,
        classification,
    })
}

/// Loads up to `EXAMPLE_MAX_ITEMS` pictures from each split and runs one example.
pub fn run_example<R: Rng + ?Sized>(
    config: &ExperimentConfig,
    rng: &mut R,
) -> Result<ExampleOutcome, ExperimentError> {
    let max_items = Some(config.max_items.unwrap_or(EXAMPLE_MAX_ITEMS));
    let test_pictures = Dataset::testing(&config.dataset_dir).load(max_items)?;
    let hypotheses = Dataset::training(&config.dataset_dir).load(max_items)?;

    run_example_on(
        &test_pictures,
        &hypotheses,
        &ClassificationPipeline::new(config.pipeline),
        rng,
    )
}
