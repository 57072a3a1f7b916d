//! Streaming quantile estimation
//!
//! Two interchangeable estimators back the alert threshold: the P² marker
//! algorithm (Jain & Chlamtac, 1985) with O(1) memory and O(1) updates, and
//! an exact estimator over a bounded window of recent scores. Multi-quantile
//! operation keeps one estimator per requested quantile.

use std::collections::VecDeque;

use crate::error::{EngineError, Result};

/// P² estimator for a single target quantile
#[derive(Debug, Clone)]
pub struct P2Quantile {
    q: f64,
    heights: [f64; 5],
    positions: [f64; 5],
    desired: [f64; 5],
    increments: [f64; 5],
    bootstrap: Vec<f64>,
    initialized: bool,
    samples: u64,
}

impl P2Quantile {
    /// `q` must lie in (0, 1)
    pub fn new(q: f64) -> Result<Self> {
        if !(q > 0.0 && q < 1.0) {
            return Err(EngineError::Config(format!(
                "quantile must be in (0, 1), got {q}"
            )));
        }
        Ok(Self {
            q,
            heights: [0.0; 5],
            positions: [0.0, 1.0, 2.0, 3.0, 4.0],
            desired: [0.0, 2.0 * q, 4.0 * q, 2.0 + 2.0 * q, 4.0],
            increments: [0.0, q / 2.0, q, (1.0 + q) / 2.0, 1.0],
            bootstrap: Vec::with_capacity(5),
            initialized: false,
            samples: 0,
        })
    }

    pub fn quantile(&self) -> f64 {
        self.q
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Observe one sample
    pub fn update(&mut self, x: f64) {
        self.samples += 1;
        if !self.initialized {
            self.bootstrap.push(x);
            if self.bootstrap.len() == 5 {
                self.bootstrap
                    .sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                for (h, s) in self.heights.iter_mut().zip(&self.bootstrap) {
                    *h = *s;
                }
                self.initialized = true;
            }
            return;
        }

        let h = &mut self.heights;
        let n = &mut self.positions;

        // Locate the cell, extending the extremes when x falls outside
        let k = if x < h[0] {
            h[0] = x;
            0
        } else if x >= h[4] {
            h[4] = x;
            3
        } else {
            let mut k = 0;
            while k < 3 && x >= h[k + 1] {
                k += 1;
            }
            k
        };

        for i in (k + 1)..5 {
            n[i] += 1.0;
        }
        for i in 0..5 {
            self.desired[i] += self.increments[i];
        }

        // Nudge interior markers toward their desired positions
        for i in 1..4 {
            let delta = self.desired[i] - n[i];
            if (delta >= 1.0 && n[i + 1] - n[i] > 1.0) || (delta <= -1.0 && n[i - 1] - n[i] < -1.0)
            {
                let sign = if delta > 0.0 { 1.0 } else { -1.0 };
                let parabolic = Self::parabolic(h, n, i, sign);
                if h[i - 1] < parabolic && parabolic < h[i + 1] {
                    h[i] = parabolic;
                } else {
                    h[i] = Self::linear(h, n, i, sign);
                }
                n[i] += sign;
            }
        }
    }

    /// Current estimate; exact interpolation until five samples are seen
    pub fn estimate(&self) -> Option<f64> {
        if self.initialized {
            return Some(self.heights[2]);
        }
        interpolated_quantile(&self.bootstrap, self.q)
    }

    fn parabolic(h: &[f64; 5], n: &[f64; 5], i: usize, d: f64) -> f64 {
        let (n0, n1, n2) = (n[i - 1], n[i], n[i + 1]);
        let (h0, h1, h2) = (h[i - 1], h[i], h[i + 1]);
        h1 + d / (n2 - n0)
            * ((n1 - n0 + d) * (h2 - h1) / (n2 - n1) + (n2 - n1 - d) * (h1 - h0) / (n1 - n0))
    }

    fn linear(h: &[f64; 5], n: &[f64; 5], i: usize, d: f64) -> f64 {
        let j = if d > 0.0 { i + 1 } else { i - 1 };
        h[i] + d * (h[j] - h[i]) / (n[j] - n[i])
    }
}

/// Exact quantile over the last `window` samples
#[derive(Debug, Clone)]
pub struct RollingQuantile {
    q: f64,
    window: usize,
    scores: VecDeque<f64>,
    samples: u64,
}

impl RollingQuantile {
    pub fn new(q: f64, window: usize) -> Result<Self> {
        if !(q > 0.0 && q < 1.0) {
            return Err(EngineError::Config(format!(
                "quantile must be in (0, 1), got {q}"
            )));
        }
        if window == 0 {
            return Err(EngineError::Config("window must be positive".to_string()));
        }
        Ok(Self {
            q,
            window,
            scores: VecDeque::with_capacity(window),
            samples: 0,
        })
    }

    pub fn quantile(&self) -> f64 {
        self.q
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn update(&mut self, x: f64) {
        self.samples += 1;
        if self.scores.len() == self.window {
            self.scores.pop_front();
        }
        self.scores.push_back(x);
    }

    pub fn estimate(&self) -> Option<f64> {
        let mut data: Vec<f64> = self.scores.iter().copied().collect();
        data.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        interpolated_quantile(&data, self.q)
    }
}

/// Linear-interpolated empirical quantile of a sorted-or-small sample set
fn interpolated_quantile(samples: &[f64], q: f64) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let mut data: Vec<f64> = samples.to_vec();
    data.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if data.len() == 1 {
        return Some(data[0]);
    }
    let position = q * (data.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = (lower + 1).min(data.len() - 1);
    let fraction = position - lower as f64;
    Some(data[lower] + (data[upper] - data[lower]) * fraction)
}

/// One estimator per registered quantile; the highest drives the threshold
#[derive(Debug)]
pub enum Estimator {
    P2(P2Quantile),
    Window(RollingQuantile),
}

impl Estimator {
    pub fn quantile(&self) -> f64 {
        match self {
            Estimator::P2(e) => e.quantile(),
            Estimator::Window(e) => e.quantile(),
        }
    }

    pub fn update(&mut self, x: f64) {
        match self {
            Estimator::P2(e) => e.update(x),
            Estimator::Window(e) => e.update(x),
        }
    }

    pub fn estimate(&self) -> Option<f64> {
        match self {
            Estimator::P2(e) => e.estimate(),
            Estimator::Window(e) => e.estimate(),
        }
    }
}

/// A bank of estimators fed the same novelty stream
#[derive(Debug, Default)]
pub struct QuantileBank {
    estimators: Vec<Estimator>,
    samples: u64,
}

impl QuantileBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an estimator; duplicate quantiles are rejected
    pub fn register(&mut self, estimator: Estimator) -> Result<()> {
        let q = estimator.quantile();
        if self.estimators.iter().any(|e| e.quantile() == q) {
            return Err(EngineError::Config(format!(
                "quantile {q} is already registered"
            )));
        }
        self.estimators.push(estimator);
        self.estimators
            .sort_by(|a, b| a.quantile().partial_cmp(&b.quantile()).unwrap_or(std::cmp::Ordering::Equal));
        Ok(())
    }

    pub fn update(&mut self, x: f64) {
        self.samples += 1;
        for estimator in &mut self.estimators {
            estimator.update(x);
        }
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    /// Estimate for one registered quantile
    pub fn estimate(&self, q: f64) -> Result<Option<f64>> {
        self.estimators
            .iter()
            .find(|e| e.quantile() == q)
            .map(Estimator::estimate)
            .ok_or_else(|| EngineError::Config(format!("quantile {q} is not registered")))
    }

    /// All estimates, ascending by quantile
    pub fn estimates(&self) -> Vec<(f64, Option<f64>)> {
        self.estimators
            .iter()
            .map(|e| (e.quantile(), e.estimate()))
            .collect()
    }

    /// The alert threshold: estimate of the highest registered quantile
    pub fn threshold(&self) -> Option<f64> {
        self.estimators.last().and_then(Estimator::estimate)
    }
}
