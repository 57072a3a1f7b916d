//! Lognova - streaming novelty detection for unstructured logs
//!
//! The core is an online information-theoretic model: lines are masked into
//! structural templates, tokenized, and scored by smoothed self-information
//! under decayed frequency counts. A constant-memory quantile estimator
//! tracks the live novelty distribution to provide an adaptive alert
//! threshold, and a small recall buffer supplies similar recent lines as
//! context for each alert.
//!
//! ```
//! use lognova::config::EngineConfig;
//! use lognova::engine::Engine;
//!
//! let mut engine = Engine::new(EngineConfig::default()).unwrap();
//! for _ in 0..100 {
//!     engine.observe("INFO user=42 action=login ok");
//! }
//! let score = engine.score("ERROR payment declined code=402");
//! assert!(score.novelty > 0.5);
//! ```

pub mod alert;
pub mod canonical;
pub mod cli;
pub mod config;
pub mod csv_output;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod neighbors;
pub mod parser;
pub mod quantile;
pub mod score;
pub mod snapshot;
pub mod tail;
pub mod tokenize;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::EngineError;
pub use score::LineScore;
