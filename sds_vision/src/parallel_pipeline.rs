// THEORY:
// The `parallel_pipeline` module runs the full-dataset experiment: every test picture
// is classified against the entire training set. Each classification is independent,
// so the work is spread over a pool of tokio workers fed round-robin by a single
// dispatcher, and results come back through oneshot channels. The experiment reads
// them as an ordered stream, so each picture is logged as soon as it and every
// picture before it are done.
//
// Reproducibility does not depend on scheduling. Every classification seeds its own
// `StdRng` from the run seed and its sequence number, so a parallel run produces the
// same rows as a sequential run with the same seed, whatever order the workers finish
// in. The SDS work itself is CPU-bound and runs on the blocking thread pool.

use crate::config::ExperimentConfig;
use crate::core_modules::dataset::Dataset;
use crate::core_modules::image::Image;
use crate::error::ExperimentError;
use crate::pipeline::{Classification, ClassificationPipeline};
use crate::results::{ResultRow, write_results};
use futures::stream::{self, Stream, StreamExt};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

type ClassificationResult = Result<Classification, ExperimentError>;

/// The random source for classification number `sequence_num` of a run.
pub fn task_rng(seed: u64, sequence_num: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (sequence_num as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

pub struct ClassifyTask {
    pub sequence_num: usize,
    pub reference: Image,
    pub result_sender: oneshot::Sender<ClassificationResult>,
}

pub struct WorkerPool {
    task_sender: mpsc::UnboundedSender<ClassifyTask>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(
        worker_count: usize,
        pipeline: ClassificationPipeline,
        hypotheses: Arc<Vec<Image>>,
        seed: u64,
    ) -> Self {
        let worker_count = worker_count.max(1);
        let (task_sender, mut task_receiver) = mpsc::unbounded_channel::<ClassifyTask>();
        let mut workers = Vec::with_capacity(worker_count);

        let (worker_senders, worker_receivers): (Vec<_>, Vec<_>) = (0..worker_count)
            .map(|_| mpsc::unbounded_channel::<ClassifyTask>())
            .unzip();

        // Spawn dispatcher
        tokio::spawn(async move {
            let mut worker_idx = 0;
            while let Some(task) = task_receiver.recv().await {
                let _ = worker_senders[worker_idx].send(task);
                worker_idx = (worker_idx + 1) % worker_count;
            }
        });

        // Spawn workers
        for mut worker_receiver in worker_receivers {
            let pipeline = pipeline.clone();
            let hypotheses = Arc::clone(&hypotheses);

            let worker = tokio::spawn(async move {
                while let Some(task) = worker_receiver.recv().await {
                    let ClassifyTask {
                        sequence_num,
                        reference,
                        result_sender,
                    } = task;
                    let pipeline = pipeline.clone();
                    let hypotheses = Arc::clone(&hypotheses);

                    let result = tokio::task::spawn_blocking(move || {
                        let mut rng = task_rng(seed, sequence_num);
                        pipeline.classify(&reference, &hypotheses, &mut rng)
                    })
                    .await
                    .unwrap_or_else(|_| Err(ExperimentError::Worker("classification task panicked")));

                    let _ = result_sender.send(result);
                }
            });

            workers.push(worker);
        }

        Self {
            task_sender,
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub async fn classify(&self, sequence_num: usize, reference: Image) -> ClassificationResult {
        let (result_sender, result_receiver) = oneshot::channel();

        let task = ClassifyTask {
            sequence_num,
            reference,
            result_sender,
        };

        self.task_sender
            .send(task)
            .map_err(|_| ExperimentError::Worker("failed to send task to worker pool"))?;

        result_receiver
            .await
            .map_err(|_| ExperimentError::Worker("failed to receive result from worker"))?
    }
}

/// Summary of a completed experiment.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub rows: Vec<ResultRow>,
    pub correct: usize,
    pub elapsed: Duration,
}

impl ExperimentReport {
    pub fn total(&self) -> usize {
        self.rows.len()
    }

    /// Percentage of correct guesses, 0 for an empty run.
    pub fn accuracy(&self) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        self.correct as f64 * 100.0 / self.rows.len() as f64
    }
}

pub struct ParallelExperiment {
    config: ExperimentConfig,
}

impl ParallelExperiment {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Loads both splits from the configured directory, classifies every test
    /// picture, and writes the results log.
    pub async fn run(&self, seed: u64) -> Result<ExperimentReport, ExperimentError> {
        let dataset_dir = self.config.dataset_dir.clone();
        let max_items = self.config.max_items;
        let (test_pictures, hypotheses) = tokio::task::spawn_blocking(move || {
            let test_pictures = Dataset::testing(&dataset_dir).load(max_items)?;
            let hypotheses = Dataset::training(&dataset_dir).load(max_items)?;
            Ok::<_, ExperimentError>((test_pictures, hypotheses))
        })
        .await
        .map_err(|_| ExperimentError::Worker("dataset loading panicked"))??;

        let report = self.run_on(test_pictures, hypotheses, seed).await?;
        write_results(&self.config.results_path, &report.rows)?;
        info!(path = %self.config.results_path.display(), "wrote results");
        Ok(report)
    }

    /// Classifies every picture in `test_pictures` against `hypotheses`.
    pub async fn run_on(
        &self,
        test_pictures: Vec<Image>,
        hypotheses: Vec<Image>,
        seed: u64,
    ) -> Result<ExperimentReport, ExperimentError> {
        if test_pictures.is_empty() {
            return Err(ExperimentError::NoTestPictures);
        }

        let start = Instant::now();
        let pool = WorkerPool::new(
            self.config.workers,
            ClassificationPipeline::new(self.config.pipeline),
            Arc::new(hypotheses),
            seed,
        );
        info!(
            workers = pool.worker_count(),
            pictures = test_pictures.len(),
            seed,
            "starting experiment"
        );

        let mut results = std::pin::pin!(classifications(&pool, test_pictures));
        let mut rows = Vec::new();
        let mut correct = 0;
        while let Some((num, result)) = results.next().await {
            let classification = result?;
            correct += usize::from(classification.is_correct);

            info!(
                "Num {:5}, Input image {:>5}, Expected label {}, Guessed image {:>5}, Guessed num {}. Correct: {:5}, Accuracy {:3.0}%",
                num,
                or_none(classification.reference_index),
                or_none(classification.true_label),
                or_none(classification.guessed_index),
                or_none(classification.guessed_label),
                classification.is_correct,
                (correct * 100) as f64 / (num + 1) as f64,
            );
            rows.push(classification.to_row(num));
        }

        let report = ExperimentReport {
            rows,
            correct,
            elapsed: start.elapsed(),
        };

        if report.correct == 0 {
            warn!("no picture was classified correctly");
        }
        info!(
            "Got {} out of {} correct. {:3.0}%",
            report.correct,
            report.total(),
            report.accuracy()
        );
        info!("Did {} in {:?}", report.total(), report.elapsed);

        Ok(report)
    }
}

/// Classifies `pictures` on `pool`, yielding results in picture order as soon as
/// each one is ready. At most twice the pool size is in flight at once.
pub fn classifications(
    pool: &WorkerPool,
    pictures: Vec<Image>,
) -> impl Stream<Item = (usize, ClassificationResult)> + '_ {
    let in_flight = pool.worker_count() * 2;
    stream::iter(pictures.into_iter().enumerate())
        .map(move |(num, picture)| async move { (num, pool.classify(num, picture).await) })
        .buffered(in_flight)
}

fn or_none<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "None".to_string(), |v| v.to_string())
}
