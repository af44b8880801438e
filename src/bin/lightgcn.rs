//! Train and evaluate LightGCN from the command line.
//!
//! # Usage
//!
//! ```bash
//! # Train with defaults, overriding a few hyperparameters
//! lightgcn train --train train.txt --test test.txt --embedding-dim 64 --num-layers 3
//!
//! # Train from a JSON configuration and write the report
//! lightgcn train --train train.txt --test test.txt --config config.json -o report.json
//!
//! # Random hyperparameter search
//! lightgcn search --train train.txt --test test.txt --trials 20 -o search.json
//! ```
extern crate lightgcn;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use serde_derive::{Deserialize, Serialize};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lightgcn::data::Interactions;
use lightgcn::datasets::load_train_test;
use lightgcn::models::lightgcn::{FitReport, Hyperparameters};

#[derive(Parser)]
#[command(name = "lightgcn")]
#[command(about = "Graph collaborative filtering for implicit feedback", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model and report validation metrics
    Train {
        /// Training interactions, one user per line
        #[arg(long)]
        train: PathBuf,

        /// Held-out interactions, one user per line
        #[arg(long)]
        test: PathBuf,

        /// JSON hyperparameter file; missing fields use defaults
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Where to write the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Embedding dimension
        #[arg(long)]
        embedding_dim: Option<usize>,

        /// Number of propagation layers
        #[arg(long)]
        num_layers: Option<usize>,

        /// Learning rate
        #[arg(long)]
        learning_rate: Option<f32>,

        /// Minibatch size
        #[arg(long)]
        batch_size: Option<usize>,

        /// Maximum number of epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Early-stopping patience
        #[arg(long)]
        patience: Option<usize>,

        /// Evaluation cutoff
        #[arg(short = 'k', long)]
        eval_k: Option<usize>,

        /// L2 penalty on layer-0 embeddings
        #[arg(long)]
        reg_lambda: Option<f32>,

        /// Random seed
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Random hyperparameter search
    Search {
        /// Training interactions, one user per line
        #[arg(long)]
        train: PathBuf,

        /// Held-out interactions, one user per line
        #[arg(long)]
        test: PathBuf,

        /// Number of configurations to try
        #[arg(long, default_value_t = 10)]
        trials: usize,

        /// Maximum epochs per trial
        #[arg(long, default_value_t = 200)]
        epochs: usize,

        /// Seed for drawing configurations
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Where to accumulate JSON results
        #[arg(short, long, default_value = "lightgcn_results.json")]
        output: PathBuf,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct Run {
    hyperparameters: Hyperparameters,
    report: FitReport,
    elapsed: Duration,
}

impl Run {
    fn best_recall(&self) -> f32 {
        self.report.best.map(|metrics| metrics.recall).unwrap_or(0.0)
    }
}

fn fit(
    train: &Interactions,
    test: &Interactions,
    hyper: Hyperparameters,
) -> Result<Run, failure::Error> {
    let start = Instant::now();
    let mut model = hyper.clone().build(train)?;
    let report = model.fit(&test.to_compressed())?;

    Ok(Run {
        hyperparameters: hyper,
        report,
        elapsed: start.elapsed(),
    })
}

/// Previous search results, or none if `path` does not exist yet.
fn read_results(path: &Path) -> Result<Vec<Run>, failure::Error> {
    match File::open(path) {
        Ok(file) => Ok(serde_json::from_reader(file)?),
        Err(ref err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(err) => Err(err.into()),
    }
}

fn main() -> Result<(), failure::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            train,
            test,
            config,
            output,
            embedding_dim,
            num_layers,
            learning_rate,
            batch_size,
            epochs,
            patience,
            eval_k,
            reg_lambda,
            seed,
        } => {
            let mut hyper: Hyperparameters = match config {
                Some(path) => serde_json::from_reader(File::open(path)?)?,
                None => Hyperparameters::default(),
            };

            if let Some(value) = embedding_dim {
                hyper = hyper.embedding_dim(value);
            }
            if let Some(value) = num_layers {
                hyper = hyper.num_layers(value);
            }
            if let Some(value) = learning_rate {
                hyper = hyper.learning_rate(value);
            }
            if let Some(value) = batch_size {
                hyper = hyper.batch_size(value);
            }
            if let Some(value) = epochs {
                hyper = hyper.num_epochs(value);
            }
            if let Some(value) = patience {
                hyper = hyper.patience(value);
            }
            if let Some(value) = eval_k {
                hyper = hyper.eval_k(value);
            }
            if let Some(value) = reg_lambda {
                hyper = hyper.reg_lambda(value);
            }
            if let Some(value) = seed {
                hyper = hyper.seed(value);
            }
            hyper.validate()?;

            let (train, test) = load_train_test(train, test)?;
            let run = fit(&train, &test, hyper)?;

            info!(
                epochs = run.report.epochs,
                best_epoch = ?run.report.best_epoch,
                stopped_early = run.report.stopped_early,
                elapsed = ?run.elapsed,
                "Training finished"
            );
            println!("{}", serde_json::to_string_pretty(&run.report.best)?);

            if let Some(path) = output {
                serde_json::to_writer_pretty(File::create(path)?, &run)?;
            }
        }
        Commands::Search {
            train,
            test,
            trials,
            epochs,
            seed,
            output,
        } => {
            let (train, test) = load_train_test(train, test)?;
            let mut rng = XorShiftRng::seed_from_u64(seed);
            let mut results = read_results(&output)?;

            for trial in 0..trials {
                let hyper = Hyperparameters::random(&mut rng).num_epochs(epochs);
                info!(trial, hyperparameters = ?hyper, "Starting trial");

                let run = fit(&train, &test, hyper)?;
                info!(trial, recall = run.best_recall(), "Finished trial");

                results.push(run);
                results.sort_by(|a, b| a.best_recall().total_cmp(&b.best_recall()));

                if let Some(best) = results.last() {
                    info!(
                        recall = best.best_recall(),
                        hyperparameters = ?best.hyperparameters,
                        "Best result so far"
                    );
                }

                serde_json::to_writer_pretty(File::create(&output)?, &results)?;
            }
        }
    }

    Ok(())
}
