//! CLI argument parsing for lognova

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "lognova")]
#[command(version)]
#[command(about = "Surface rare, high-signal log lines in real time", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Model flags shared by every scoring subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Append token bigrams to the unigram stream
    #[arg(long = "with-bigrams")]
    pub with_bigrams: bool,

    /// Override weight for the token surprisal component
    #[arg(long = "w-token", value_name = "W")]
    pub w_token: Option<f64>,

    /// Override weight for the template surprisal component
    #[arg(long = "w-template", value_name = "W")]
    pub w_template: Option<f64>,

    /// Override weight for the severity bonus component
    #[arg(long = "w-level", value_name = "W")]
    pub w_level: Option<f64>,

    /// Per-line decay multiplier (e.g. 0.9999)
    #[arg(long, value_name = "D")]
    pub decay: Option<f64>,

    /// Resume model state from this JSON snapshot
    #[arg(long = "state-in", value_name = "FILE")]
    pub state_in: Option<PathBuf>,

    /// Persist model state to this JSON snapshot
    #[arg(long = "state-out", value_name = "FILE")]
    pub state_out: Option<PathBuf>,
}

/// Tuned defaults for common log shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Profile {
    /// Web/access logs: steady templates, bursty errors
    Web,
    /// Kubernetes events and controller chatter
    K8s,
    /// Authentication and audit trails
    Auth,
}

/// Quick sensitivity presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Investigative triage (quantile 0.992)
    Triage,
    /// Page-worthy only (quantile 0.995)
    Page,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Rank a log file by novelty
    Rank {
        /// Log file to score
        file: PathBuf,

        /// Write CSV to this path instead of printing
        #[arg(long, value_name = "FILE")]
        out: Option<PathBuf>,

        /// Write the full JSON result array to this path
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,

        /// How many lines to print
        #[arg(long, default_value = "20")]
        top: usize,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Follow a log file and print only high-novelty lines with context
    Tail {
        /// Log file to follow
        file: PathBuf,

        /// Target novelty quantile; repeat for multi-quantile mode
        #[arg(long, value_name = "Q")]
        quantile: Vec<f64>,

        /// Use an exact rolling window of this many scores instead of P²
        #[arg(long, value_name = "N")]
        window: Option<usize>,

        /// Lines to observe before emitting alerts
        #[arg(long = "burn-in", value_name = "N")]
        burn_in: Option<u64>,

        /// Apply tuned defaults for a common log profile
        #[arg(long, value_enum)]
        profile: Option<Profile>,

        /// Quick sensitivity preset
        #[arg(long, value_enum)]
        mode: Option<Mode>,

        /// Bypass quantiles: alert when the raw score exceeds this value
        #[arg(long, value_name = "SCORE")]
        threshold: Option<f64>,

        /// Skip alerts when the same template fired recently
        #[arg(long = "dedupe-template")]
        dedupe_template: bool,

        /// Append one JSON object per alert to this file
        #[arg(long, value_name = "FILE")]
        jsonl: Option<PathBuf>,

        /// Score the whole existing file before following new lines
        #[arg(long = "from-start")]
        from_start: bool,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Explain why a single line scores the way it does
    Explain {
        /// File used to prime the frequency model
        file: PathBuf,

        /// The log line to explain (quote it)
        #[arg(long)]
        line: String,

        /// How many tokens to list in the explanation
        #[arg(long = "top-tokens", default_value = "10")]
        top_tokens: usize,

        /// Write the JSON explanation to this path
        #[arg(long, value_name = "FILE")]
        json: Option<PathBuf>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Show the most common canonical templates in a file
    Cluster {
        /// Log file to summarize
        file: PathBuf,

        /// How many templates to print
        #[arg(long, default_value = "30")]
        top: usize,
    },
}
