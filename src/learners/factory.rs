//! Builds base learners from declarative config

use super::{
    BaseLearner, DecisionTreeRegressor, LinearConfig, LinearRegression, LstmConfig,
    LstmRegressor, NeuralNetConfig, NeuralNetwork, TransformerConfig, TransformerRegressor,
    TreeConfig,
};
use crate::error::{EnsembleError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Concrete learner families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    DecisionTree,
    LinearRegression,
    NeuralNetwork,
    Lstm,
    Transformer,
}

impl LearnerKind {
    pub const ALL: [LearnerKind; 5] = [
        LearnerKind::DecisionTree,
        LearnerKind::LinearRegression,
        LearnerKind::NeuralNetwork,
        LearnerKind::Lstm,
        LearnerKind::Transformer,
    ];

    /// Name reported by learners of this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            LearnerKind::DecisionTree => "decision_tree",
            LearnerKind::LinearRegression => "linear_regression",
            LearnerKind::NeuralNetwork => "neural_network",
            LearnerKind::Lstm => "lstm",
            LearnerKind::Transformer => "transformer",
        }
    }
}

impl fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LearnerKind {
    type Err = EnsembleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "decision_tree" | "tree" | "random_forest" => Ok(LearnerKind::DecisionTree),
            "linear_regression" | "linear" => Ok(LearnerKind::LinearRegression),
            "neural_network" | "nn" | "mlp" => Ok(LearnerKind::NeuralNetwork),
            "lstm" => Ok(LearnerKind::Lstm),
            "transformer" => Ok(LearnerKind::Transformer),
            other => Err(EnsembleError::Configuration(format!(
                "unknown learner type '{}'",
                other
            ))),
        }
    }
}

/// Hyperparameters for every learner family
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerParams {
    pub tree: TreeConfig,
    pub linear: LinearConfig,
    pub neural_network: NeuralNetConfig,
    pub lstm: LstmConfig,
    pub transformer: TransformerConfig,
}

impl LearnerParams {
    /// Validate the parameters of one family
    pub fn validate_kind(&self, kind: LearnerKind) -> Result<()> {
        match kind {
            LearnerKind::DecisionTree => self.tree.validate(),
            LearnerKind::LinearRegression => self.linear.validate(),
            LearnerKind::NeuralNetwork => self.neural_network.validate(),
            LearnerKind::Lstm => self.lstm.validate(),
            LearnerKind::Transformer => self.transformer.validate(),
        }
    }
}

/// Creates learner instances; each call returns a fresh, untrained learner
#[derive(Debug, Clone, Default)]
pub struct LearnerFactory {
    params: LearnerParams,
}

impl LearnerFactory {
    pub fn new(params: LearnerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &LearnerParams {
        &self.params
    }

    /// Build one learner of `kind`, seeded with `seed`
    pub fn build(&self, kind: LearnerKind, seed: u64) -> Result<Box<dyn BaseLearner>> {
        self.params.validate_kind(kind)?;
        debug!("Building {} learner (seed {})", kind, seed);

        let learner: Box<dyn BaseLearner> = match kind {
            LearnerKind::DecisionTree => Box::new(DecisionTreeRegressor::new(TreeConfig {
                seed,
                ..self.params.tree.clone()
            })),
            LearnerKind::LinearRegression => {
                Box::new(LinearRegression::new(self.params.linear.clone()))
            }
            LearnerKind::NeuralNetwork => Box::new(NeuralNetwork::new(NeuralNetConfig {
                seed,
                ..self.params.neural_network.clone()
            })),
            LearnerKind::Lstm => Box::new(LstmRegressor::new(LstmConfig {
                seed,
                ..self.params.lstm.clone()
            })),
            LearnerKind::Transformer => Box::new(TransformerRegressor::new(TransformerConfig {
                seed,
                ..self.params.transformer.clone()
            })),
        };
        Ok(learner)
    }

    /// Build `count` learners cycling through `kinds`; slot `i` gets `seed + i`
    pub fn build_many(
        &self,
        kinds: &[LearnerKind],
        count: usize,
        seed: u64,
    ) -> Result<Vec<(LearnerKind, Box<dyn BaseLearner>)>> {
        if kinds.is_empty() {
            return Err(EnsembleError::EmptyData(
                "no base learner types configured".to_string(),
            ));
        }
        (0..count)
            .map(|i| {
                let kind = kinds[i % kinds.len()];
                self.build(kind, seed.wrapping_add(i as u64))
                    .map(|learner| (kind, learner))
            })
            .collect()
    }
}
