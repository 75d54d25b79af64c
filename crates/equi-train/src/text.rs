//! Bag-of-words softmax classifier for symptom descriptions.
//!
//! Documents are tokenized into lowercase words, truncated to `max_length`
//! tokens and mapped onto a vocabulary of the most frequent training tokens.
//! Each document becomes an L2-normalized term-frequency vector; a softmax
//! regression over those vectors is trained with mini-batch SGD.
//!
//! Training keeps a per-epoch history of train / evaluation loss, stops early
//! once evaluation loss has not improved for `early_stopping_patience`
//! epochs, and restores the weights of the best epoch.

use crate::error::{Result, TrainingError};
use equi_audit::EpochLog;
use once_cell::sync::Lazy;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("Invalid regex: word"));

/// Split `text` into lowercase word tokens, keeping at most `max_length`.
pub fn tokenize(text: &str, max_length: usize) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .take(max_length)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Training settings of a [`TextClassifier`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextClassifierParams {
    pub max_length: usize,
    pub vocabulary_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub early_stopping_patience: usize,
    pub seed: u64,
}

type SparseVector = Vec<(usize, f64)>;

/// Multi-class softmax regression over bag-of-words features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextClassifier {
    params: TextClassifierParams,
    vocabulary: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
    /// `weights[class][token]`.
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl TextClassifier {
    pub fn new(params: TextClassifierParams) -> Self {
        Self {
            params,
            vocabulary: Vec::new(),
            index: HashMap::new(),
            weights: Vec::new(),
            bias: Vec::new(),
        }
    }

    pub fn params(&self) -> &TextClassifierParams {
        &self.params
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn num_classes(&self) -> usize {
        self.bias.len()
    }

    fn build_vocabulary(&mut self, docs: &[String]) {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for doc in docs {
            for token in tokenize(doc, self.params.max_length) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(self.params.vocabulary_size);

        self.vocabulary = ranked.into_iter().map(|(token, _)| token).collect();
        self.rebuild_index();
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .vocabulary
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();
    }

    fn vectorize(&self, doc: &str) -> SparseVector {
        let mut counts: HashMap<usize, f64> = HashMap::new();
        for token in tokenize(doc, self.params.max_length) {
            if let Some(&i) = self.index.get(&token) {
                *counts.entry(i).or_insert(0.0) += 1.0;
            }
        }
        let norm = counts.values().map(|c| c * c).sum::<f64>().sqrt();
        let mut vector: SparseVector = counts
            .into_iter()
            .map(|(i, c)| (i, if norm > 0.0 { c / norm } else { 0.0 }))
            .collect();
        vector.sort_unstable_by_key(|(i, _)| *i);
        vector
    }

    fn softmax(&self, x: &SparseVector) -> Vec<f64> {
        let logits: Vec<f64> = self
            .weights
            .iter()
            .zip(&self.bias)
            .map(|(w, b)| b + x.iter().map(|&(i, v)| w[i] * v).sum::<f64>())
            .collect();
        let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let exp: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
        let total: f64 = exp.iter().sum();
        exp.into_iter().map(|e| e / total).collect()
    }

    fn mean_loss(&self, xs: &[SparseVector], ys: &[usize]) -> f64 {
        if xs.is_empty() {
            return 0.0;
        }
        let total: f64 = xs
            .iter()
            .zip(ys)
            .map(|(x, &y)| -self.softmax(x)[y].max(1e-15).ln())
            .sum();
        total / xs.len() as f64
    }

    /// Train on `train_*`, tracking loss on `eval_*` for early stopping.
    ///
    /// Labels are class indices below `num_classes`. Returns the per-epoch
    /// history; the best epoch's weights are kept.
    pub fn fit(
        &mut self,
        train_docs: &[String],
        train_labels: &[usize],
        eval_docs: &[String],
        eval_labels: &[usize],
        num_classes: usize,
    ) -> Result<Vec<EpochLog>> {
        if train_docs.is_empty() || train_docs.len() != train_labels.len() {
            return Err(TrainingError::TrainingFailed(format!(
                "text classifier: expected matching non-empty inputs, got {} documents and {} labels",
                train_docs.len(),
                train_labels.len()
            )));
        }
        if eval_docs.len() != eval_labels.len() {
            return Err(TrainingError::TrainingFailed(
                "text classifier: evaluation documents and labels differ in length".to_string(),
            ));
        }
        if let Some(bad) = train_labels.iter().chain(eval_labels).find(|&&y| y >= num_classes) {
            return Err(TrainingError::TrainingFailed(format!(
                "text classifier: label {} out of range for {} classes",
                bad, num_classes
            )));
        }

        self.build_vocabulary(train_docs);
        if self.vocabulary.is_empty() {
            return Err(TrainingError::InvalidData(
                "training documents contain no word tokens".to_string(),
            ));
        }
        debug!("Vocabulary size: {}", self.vocabulary.len());

        let v = self.vocabulary.len();
        self.weights = vec![vec![0.0; v]; num_classes];
        self.bias = vec![0.0; num_classes];

        let train_x: Vec<SparseVector> = train_docs.iter().map(|d| self.vectorize(d)).collect();
        let eval_x: Vec<SparseVector> = eval_docs.iter().map(|d| self.vectorize(d)).collect();
        let (eval_x, eval_y) = if eval_x.is_empty() {
            (&train_x, train_labels)
        } else {
            (&eval_x, eval_labels)
        };

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut order: Vec<usize> = (0..train_x.len()).collect();
        let mut history = Vec::new();
        let mut best: Option<(f64, Vec<Vec<f64>>, Vec<f64>)> = None;
        let mut epochs_without_improvement = 0;
        let batch_size = self.params.batch_size.max(1);

        for epoch in 1..=self.params.epochs {
            order.shuffle(&mut rng);
            for batch in order.chunks(batch_size) {
                self.sgd_step(&train_x, train_labels, batch);
            }

            let log = EpochLog {
                epoch,
                train_loss: self.mean_loss(&train_x, train_labels),
                eval_loss: self.mean_loss(eval_x, eval_y),
            };
            debug!(
                "Epoch {}: train_loss={:.4} eval_loss={:.4}",
                log.epoch, log.train_loss, log.eval_loss
            );

            let improved = best.as_ref().is_none_or(|(loss, _, _)| log.eval_loss < *loss);
            if improved {
                best = Some((log.eval_loss, self.weights.clone(), self.bias.clone()));
                epochs_without_improvement = 0;
            } else {
                epochs_without_improvement += 1;
            }
            history.push(log);

            if epochs_without_improvement >= self.params.early_stopping_patience {
                info!(
                    "Early stopping after epoch {} ({} epochs without improvement)",
                    epoch, epochs_without_improvement
                );
                break;
            }
        }

        if let Some((loss, weights, bias)) = best {
            debug!("Restoring best weights (eval_loss={:.4})", loss);
            self.weights = weights;
            self.bias = bias;
        }
        Ok(history)
    }

    fn sgd_step(&mut self, xs: &[SparseVector], ys: &[usize], batch: &[usize]) {
        let k = self.bias.len();
        let scale = self.params.learning_rate / batch.len() as f64;
        let mut grad_bias = vec![0.0; k];
        let mut grad_weights: Vec<HashMap<usize, f64>> = vec![HashMap::new(); k];

        for &i in batch {
            let probs = self.softmax(&xs[i]);
            for (class, p) in probs.iter().enumerate() {
                let delta = p - if class == ys[i] { 1.0 } else { 0.0 };
                grad_bias[class] += delta;
                for &(token, value) in &xs[i] {
                    *grad_weights[class].entry(token).or_insert(0.0) += delta * value;
                }
            }
        }

        for class in 0..k {
            self.bias[class] -= scale * grad_bias[class];
            for (&token, g) in &grad_weights[class] {
                self.weights[class][token] -= scale * g;
            }
        }
    }

    /// Class probabilities for each document.
    pub fn predict_proba(&self, docs: &[String]) -> Result<Vec<Vec<f64>>> {
        if self.weights.is_empty() {
            return Err(TrainingError::TrainingFailed(
                "text classifier: model is not fitted".to_string(),
            ));
        }
        Ok(docs.iter().map(|d| self.softmax(&self.vectorize(d))).collect())
    }

    /// Most probable class index for each document (lowest index on ties).
    pub fn predict(&self, docs: &[String]) -> Result<Vec<usize>> {
        Ok(self
            .predict_proba(docs)?
            .into_iter()
            .map(|probs| {
                probs
                    .iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
                    .0
            })
            .collect())
    }

    /// Restore a classifier from its serialized form.
    pub fn from_artifact(value: serde_json::Value) -> Result<Self> {
        let mut model: Self = serde_json::from_value(value)?;
        model.rebuild_index();
        Ok(model)
    }
}
