use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

use lognova::alert::{AlertRecord, JsonlSink};
use lognova::cli::{Cli, Command, Mode, ModelArgs, Profile};
use lognova::config::{EngineConfig, EstimatorKind};
use lognova::csv_output::{RankCsv, RankRow};
use lognova::engine::Engine;
use lognova::parser::{LineParser, ParsedLine};
use lognova::score::LineScore;
use lognova::snapshot::Snapshot;
use lognova::tail::LogFollower;

const TAIL_DEFAULT_QUANTILE: f64 = 0.992;
const TAIL_DEFAULT_WINDOW: usize = 1_000;
const TAIL_DEFAULT_BURN_IN: u64 = 500;
const MIN_WINDOW: usize = 10;
const QUANTILE_FLOOR: f64 = 0.5;
const QUANTILE_CEIL: f64 = 0.9995;
const POLL_INTERVAL: Duration = Duration::from_millis(250);
/// While tailing, persist state every this many lines when --state-out is set
const SNAPSHOT_EVERY: u64 = 5_000;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Rank {
            file,
            out,
            json,
            top,
            model,
        } => cmd_rank(&file, out.as_deref(), json.as_deref(), top, &model),
        Command::Tail {
            file,
            quantile,
            window,
            burn_in,
            profile,
            mode,
            threshold,
            dedupe_template,
            jsonl,
            from_start,
            model,
        } => cmd_tail(TailOptions {
            file,
            quantiles: quantile,
            window,
            burn_in,
            profile,
            mode,
            threshold,
            dedupe_template,
            jsonl,
            from_start,
            model,
        }),
        Command::Explain {
            file,
            line,
            top_tokens,
            json,
            model,
        } => cmd_explain(&file, &line, top_tokens, json.as_deref(), &model),
        Command::Cluster { file, top } => cmd_cluster(&file, top),
    }
}

/// Build an engine from CLI flags, resuming from --state-in when possible.
/// An unreadable state file warns and starts fresh; it never aborts the run.
fn build_engine(
    model: &ModelArgs,
    estimator: EstimatorKind,
    window: usize,
    burn_in: u64,
) -> Result<Engine> {
    let mut cfg = EngineConfig::default();
    cfg.with_bigrams = model.with_bigrams;
    if let Some(decay) = model.decay {
        cfg.decay = decay;
    }
    if let Some(w) = model.w_token {
        cfg.w_token = w;
    }
    if let Some(w) = model.w_template {
        cfg.w_template = w;
    }
    if let Some(w) = model.w_level {
        cfg.w_level = w;
    }
    cfg.estimator = estimator;
    cfg.window = window;
    cfg.burn_in = burn_in;

    if let Some(path) = &model.state_in {
        match Snapshot::read(path) {
            Ok(snap) => match Engine::from_snapshot_with(snap, cfg.clone()) {
                Ok(engine) => return Ok(engine),
                Err(err) => warn!(path = %path.display(), %err, "snapshot rejected; starting fresh"),
            },
            Err(err) => warn!(path = %path.display(), %err, "could not read snapshot; starting fresh"),
        }
    }
    Ok(Engine::new(cfg)?)
}

fn maybe_save(engine: &Engine, path: Option<&PathBuf>) -> Result<()> {
    if let Some(path) = path {
        engine
            .snapshot_save(path)
            .with_context(|| format!("writing state snapshot to {}", path.display()))?;
        println!("Wrote state snapshot to {}", path.display());
    }
    Ok(())
}

fn cmd_rank(
    file: &Path,
    out: Option<&Path>,
    json: Option<&Path>,
    top: usize,
    model: &ModelArgs,
) -> Result<()> {
    let mut engine = build_engine(model, EstimatorKind::P2, TAIL_DEFAULT_WINDOW, TAIL_DEFAULT_BURN_IN)?;
    let parser = LineParser::new();
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("opening {}", file.display()))?,
    );

    let mut rows: Vec<(ParsedLine, LineScore)> = Vec::new();
    for line in reader.lines() {
        let raw = line?;
        let parsed = parser.parse(&raw);
        let score = engine.score_and_observe(&parsed.message);
        rows.push((parsed, score));
    }
    rows.sort_by(|a, b| {
        b.1.novelty
            .partial_cmp(&a.1.novelty)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    if let Some(json_path) = json {
        let records: Vec<AlertRecord> = rows
            .iter()
            .map(|(parsed, score)| {
                AlertRecord::assemble(
                    score,
                    &parsed.message,
                    parsed.timestamp.clone(),
                    parsed.level.as_deref(),
                    None,
                    None,
                    None,
                    Vec::new(),
                )
            })
            .collect();
        fs::write(json_path, serde_json::to_string_pretty(&records)?)?;
        println!("Wrote JSON {} ({} objects)", json_path.display(), records.len());
    }

    if let Some(out_path) = out {
        let mut csv = RankCsv::new();
        for (parsed, score) in &rows {
            csv.add_row(RankRow {
                timestamp: parsed.timestamp.clone(),
                level: parsed.level.clone(),
                novelty: score.novelty,
                score: score.raw_score,
                token_info: score.token_info_bits,
                template_info: score.template_info_bits,
                template: score.template.clone(),
                line: parsed.message.clone(),
            });
        }
        fs::write(out_path, csv.to_csv())?;
        println!("Wrote {} ({} lines)", out_path.display(), csv.len());
    } else {
        for (parsed, score) in rows.iter().take(top) {
            println!(
                "{} [{}] novelty={:.3} score={:.3}  {}",
                parsed.timestamp.as_deref().unwrap_or("-"),
                parsed.level.as_deref().unwrap_or("-"),
                score.novelty,
                score.raw_score,
                parsed.message
            );
        }
    }

    maybe_save(&engine, model.state_out.as_ref())
}

struct TailOptions {
    file: PathBuf,
    quantiles: Vec<f64>,
    window: Option<usize>,
    burn_in: Option<u64>,
    profile: Option<Profile>,
    mode: Option<Mode>,
    threshold: Option<f64>,
    dedupe_template: bool,
    jsonl: Option<PathBuf>,
    from_start: bool,
    model: ModelArgs,
}

struct TailSettings {
    quantiles: Vec<f64>,
    estimator: EstimatorKind,
    window: usize,
    dedupe_window: u64,
    burn_in: u64,
}

fn profile_defaults(profile: Profile) -> (f64, usize, u64) {
    match profile {
        Profile::Web => (0.992, 1_200, 400),
        Profile::K8s => (0.995, 900, 350),
        Profile::Auth => (0.994, 1_100, 500),
    }
}

/// Resolve presets against explicit flags; explicit flags always win
fn resolve_tail_settings(opts: &TailOptions) -> TailSettings {
    let (mut quantile, mut window, mut burn_in) =
        (TAIL_DEFAULT_QUANTILE, TAIL_DEFAULT_WINDOW, TAIL_DEFAULT_BURN_IN);
    if let Some(profile) = opts.profile {
        (quantile, window, burn_in) = profile_defaults(profile);
    }
    if let Some(mode) = opts.mode {
        quantile = match mode {
            Mode::Triage => 0.992,
            Mode::Page => 0.995,
        };
    }

    let mut quantiles: Vec<f64> = if opts.quantiles.is_empty() {
        vec![quantile]
    } else {
        opts.quantiles.clone()
    };
    for q in &mut quantiles {
        *q = q.clamp(QUANTILE_FLOOR, QUANTILE_CEIL);
    }
    quantiles.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    quantiles.dedup();

    let estimator = if opts.window.is_some() {
        EstimatorKind::Window
    } else {
        EstimatorKind::P2
    };
    if let Some(w) = opts.window {
        window = w.max(MIN_WINDOW);
    }
    if let Some(b) = opts.burn_in {
        burn_in = b;
    }

    TailSettings {
        quantiles,
        estimator,
        window,
        dedupe_window: window as u64,
        burn_in,
    }
}

fn cmd_tail(opts: TailOptions) -> Result<()> {
    let settings = resolve_tail_settings(&opts);
    let mut engine = build_engine(
        &opts.model,
        settings.estimator,
        settings.window,
        settings.burn_in,
    )?;
    for &q in &settings.quantiles {
        engine.register_quantile(q)?;
    }
    let alert_quantile = settings.quantiles.last().copied();
    let topk = engine.config().neighbor_topk;

    let parser = LineParser::new();
    let mut follower = LogFollower::open(&opts.file, !opts.from_start)
        .with_context(|| format!("opening {}", opts.file.display()))?;
    let mut sink = match &opts.jsonl {
        Some(path) => match JsonlSink::open(path) {
            Ok(sink) => Some(sink),
            Err(err) => {
                warn!(path = %path.display(), %err, "could not open JSONL sink");
                None
            }
        },
        None => None,
    };

    let mut template_last_seen: HashMap<String, u64> = HashMap::new();
    let mut line_idx: u64 = 0;

    loop {
        let lines = follower.drain()?;
        if lines.is_empty() {
            std::thread::sleep(POLL_INTERVAL);
            continue;
        }
        for raw in lines {
            line_idx += 1;
            let parsed = parser.parse(&raw);
            let score = engine.score_and_observe(&parsed.message);

            let mut threshold_value = None;
            let mut should_alert = false;
            if let Some(manual) = opts.threshold {
                threshold_value = Some(manual);
                should_alert = score.raw_score >= manual;
            } else if engine.alert_ready() {
                if let Some(t) = engine.threshold() {
                    threshold_value = Some(t);
                    should_alert = score.novelty >= t;
                }
            }

            let previous = template_last_seen.insert(score.template.clone(), line_idx);
            if should_alert && opts.dedupe_template {
                if let Some(prev) = previous {
                    if line_idx - prev < settings.dedupe_window {
                        should_alert = false;
                    }
                }
            }

            if should_alert {
                let neighbors = engine.context_neighbors(&score.tokens, topk);
                let estimates = multi_quantile_estimates(&engine, settings.quantiles.len());
                render_alert(&parsed, &score, threshold_value, alert_quantile, &neighbors, opts.threshold.is_some());
                if let Some(sink) = sink.as_mut() {
                    let record = AlertRecord::assemble(
                        &score,
                        &parsed.message,
                        Some(alert_timestamp(&parsed)),
                        parsed.level.as_deref(),
                        threshold_value,
                        if opts.threshold.is_some() { None } else { alert_quantile },
                        estimates,
                        neighbors,
                    );
                    if let Err(err) = sink.emit(&record) {
                        warn!(%err, "failed to write JSONL alert");
                    }
                }
            }

            if let Some(path) = &opts.model.state_out {
                if line_idx % SNAPSHOT_EVERY == 0 {
                    if let Err(err) = engine.snapshot_save(path) {
                        warn!(path = %path.display(), %err, "periodic snapshot failed");
                    }
                }
            }
        }
    }
}

/// Use the parsed timestamp when the line carried one, otherwise stamp now
fn alert_timestamp(parsed: &ParsedLine) -> String {
    parsed
        .timestamp
        .clone()
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

fn multi_quantile_estimates(engine: &Engine, registered: usize) -> Option<BTreeMap<String, f64>> {
    if registered < 2 {
        return None;
    }
    let map: BTreeMap<String, f64> = engine
        .quantile_estimates()
        .into_iter()
        .filter_map(|(q, estimate)| estimate.map(|e| (format!("{q}"), e)))
        .collect();
    Some(map)
}

fn render_alert(
    parsed: &ParsedLine,
    score: &LineScore,
    threshold: Option<f64>,
    quantile: Option<f64>,
    neighbors: &[lognova::neighbors::Neighbor],
    manual: bool,
) {
    let mut header = format!(
        "{} [{}] novelty={:.3}",
        parsed.timestamp.as_deref().unwrap_or("-"),
        parsed.level.as_deref().unwrap_or(score.level.as_str()),
        score.novelty
    );
    if let Some(t) = threshold {
        if manual {
            header.push_str(&format!(" (score≥{t:.3})"));
        } else if let Some(q) = quantile {
            header.push_str(&format!(" (q{q:.3}≥{t:.3})"));
        }
    }
    header.push_str(&format!(" score={:.3}  {}", score.raw_score, parsed.message));

    let mut context = String::new();
    for neighbor in neighbors {
        context.push_str(&format!(
            "\n   \u{21b3} neighbor (sim={:.2}): {}",
            neighbor.similarity, neighbor.line
        ));
    }
    println!(
        "{header}{context}\n   template={} p\u{2248}{:.5}",
        score.template, score.template_probability
    );
}

fn cmd_explain(
    file: &Path,
    line: &str,
    top_tokens: usize,
    json: Option<&Path>,
    model: &ModelArgs,
) -> Result<()> {
    let mut engine = build_engine(model, EstimatorKind::P2, TAIL_DEFAULT_WINDOW, TAIL_DEFAULT_BURN_IN)?;
    let parser = LineParser::new();
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("opening {}", file.display()))?,
    );
    for raw in reader.lines() {
        let parsed = parser.parse(&raw?);
        engine.observe(&parsed.message);
    }

    let parsed = parser.parse(line);
    let score = engine.score(&parsed.message);

    if let Some(json_path) = json {
        let cfg = engine.config();
        let contributors: Vec<_> = score.token_contributors.iter().take(top_tokens).collect();
        let obj = serde_json::json!({
            "novelty": score.novelty,
            "score": score.raw_score,
            "token_info_bits": score.token_info_bits,
            "template_info_bits": score.template_info_bits,
            "level_bonus": score.level_bonus,
            "weights": {
                "w_token": cfg.w_token,
                "w_template": cfg.w_template,
                "w_level": cfg.w_level,
            },
            "template": score.template,
            "template_probability": score.template_probability,
            "token_contributors": contributors,
            "line": parsed.message,
        });
        fs::write(json_path, serde_json::to_string_pretty(&obj)?)?;
        println!("Wrote JSON explanation to {}", json_path.display());
    } else {
        println!("Line: {}", parsed.message);
        println!(
            "Score: {:.3} (novelty={:.3}, token_info={:.3}, template_info={:.3}, level_bonus={:.2})",
            score.raw_score,
            score.novelty,
            score.token_info_bits,
            score.template_info_bits,
            score.level_bonus
        );
        let cfg = engine.config();
        println!(
            "Weights: w_token={} w_template={} w_level={}",
            cfg.w_token, cfg.w_template, cfg.w_level
        );
        if score.token_contributors.is_empty() {
            println!("No tokens to report (line was empty after masking).");
        } else {
            println!("Top tokens by surprisal:");
            for contribution in score.token_contributors.iter().take(top_tokens) {
                println!(
                    "   {:<20} bits={:.2} freq={:.2} p\u{2248}{:.5}",
                    contribution.token,
                    contribution.bits,
                    contribution.effective_count,
                    contribution.probability
                );
            }
        }
        println!(
            "Template: {} (p\u{2248}{:.5})",
            score.template, score.template_probability
        );
    }

    maybe_save(&engine, model.state_out.as_ref())
}

fn cmd_cluster(file: &Path, top: usize) -> Result<()> {
    let engine = Engine::new(EngineConfig::default())?;
    let parser = LineParser::new();
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("opening {}", file.display()))?,
    );
    let mut counts: HashMap<String, u64> = HashMap::new();
    for raw in reader.lines() {
        let parsed = parser.parse(&raw?);
        *counts.entry(engine.template_of(&parsed.message)).or_insert(0) += 1;
    }
    let mut sorted: Vec<(String, u64)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (template, count) in sorted.into_iter().take(top) {
        println!("{count:6}  {template}");
    }
    Ok(())
}
