//! Ensemble CLI Application
//!
//! Trains ensembles on a synthetic market stream and runs the online
//! adaptation loop against a regime change.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crypto_ensemble::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "crypto_ensemble")]
#[command(about = "Ensemble learning with online adaptation for crypto market prediction")]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train one ensemble and report hold-out metrics
    Train {
        /// Override the configured strategy (bagging, boosting, stacking)
        #[arg(short, long)]
        strategy: Option<Strategy>,

        /// Number of synthetic samples
        #[arg(short = 'n', long, default_value = "1000")]
        samples: usize,

        /// Features per sample
        #[arg(short, long, default_value = "6")]
        features: usize,

        /// Fraction of samples held out for evaluation
        #[arg(long, default_value = "0.2")]
        test_ratio: f64,

        /// Standard deviation of the target noise
        #[arg(long, default_value = "0.05")]
        noise: f64,

        /// Stream seed
        #[arg(long, default_value = "7")]
        seed: u64,
    },

    /// Stream samples through the online controller and print its stats
    Stream {
        /// Samples used for the initial fit
        #[arg(short, long, default_value = "500")]
        warmup: usize,

        /// Streamed samples after warmup
        #[arg(short = 'n', long, default_value = "1500")]
        steps: usize,

        /// Flip the market regime after this many streamed samples
        #[arg(long, default_value = "800")]
        flip_at: usize,

        /// Features per sample
        #[arg(short, long, default_value = "6")]
        features: usize,

        /// Standard deviation of the target noise
        #[arg(long, default_value = "0.05")]
        noise: f64,

        /// Stream seed
        #[arg(long, default_value = "7")]
        seed: u64,
    },

    /// Write the default configuration
    InitConfig {
        /// Output path
        #[arg(short, long, default_value = "ensemble.toml")]
        output: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(AppConfig::default()),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Train {
            strategy,
            samples,
            features,
            test_ratio,
            noise,
            seed,
        } => {
            let mut ensemble_config = config.ensemble.clone();
            if let Some(strategy) = strategy {
                ensemble_config = ensemble_config.with_strategy(strategy);
            }

            let mut market = SyntheticMarket::new(features, seed).with_noise(noise);
            let data = market.dataset(samples)?;
            let n_test = ((samples as f64) * test_ratio.clamp(0.0, 0.9)).round() as usize;
            let n_train = samples.saturating_sub(n_test).max(1);
            let train_idx: Vec<usize> = (0..n_train).collect();
            let test_idx: Vec<usize> = (n_train..samples).collect();
            let (train, test) = (data.subset(&train_idx), data.subset(&test_idx));

            info!(
                "Training {} ensemble on {} samples ({} held out)",
                ensemble_config.strategy,
                train.n_samples(),
                test.n_samples()
            );
            let factory = LearnerFactory::new(config.learners.clone());
            let ensemble = Ensemble::new(ensemble_config, &factory)?;
            ensemble.train(&train)?;

            let eval_set = if test.n_samples() > 0 { &test } else { &train };
            let metrics = ensemble.evaluate(eval_set)?;
            info!("MSE: {:.6}", metrics.mse);
            info!("RMSE: {:.6}", metrics.rmse);
            info!("MAE: {:.6}", metrics.mae);
            info!("R2: {:.4}", metrics.r2);
            info!(
                "Direction Accuracy: {:.2}%",
                metrics.directional_accuracy * 100.0
            );
            info!("Weights: {:?}", ensemble.weights());

            for (name, importance) in ensemble.feature_importance_ranking() {
                info!("  {:<8} {:.4}", name, importance);
            }
        }

        Commands::Stream {
            warmup,
            steps,
            flip_at,
            features,
            noise,
            seed,
        } => {
            let mut market = SyntheticMarket::new(features, seed)
                .with_noise(noise)
                .with_regime_flip(warmup + flip_at);
            let warmup_data = market.dataset(warmup)?;

            let factory = LearnerFactory::new(config.learners.clone());
            let ensemble = Arc::new(Ensemble::new(config.ensemble.clone(), &factory)?);
            ensemble.train(&warmup_data)?;
            info!(
                "Warmup fit on {} samples, streaming {} more (regime flip after {})",
                warmup, steps, flip_at
            );

            let online = OnlineLearningConfig {
                enabled: true,
                ..config.online.clone()
            };
            let controller = OnlineAdaptationController::with_config(ensemble, online)?;

            let mut updates = 0;
            for sample in market.by_ref().take(steps) {
                if controller.add_sample(sample.features, sample.target)? {
                    updates += 1;
                }
            }
            info!("Stream finished: {} online updates", updates);

            let stats = controller.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        Commands::InitConfig { output } => {
            AppConfig::default().save(&output)?;
            info!("Wrote default configuration to {}", output.display());
        }
    }

    Ok(())
}
