use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pulse_lib::{
    baseline::{BaselineAnalyzer, DeviationResult},
    config::{load_config, AnalysisConfig, DetectorKind},
    fatigue::{estimate, forest::FEATURE_NAMES, RandomForest},
    intervals::{clean_intervals_with_report, CleaningReport},
    io::{history as history_io, samples as samples_io, text as text_io},
    metrics::{hrv_time, DailyRecord},
    pipeline::analyze_session,
    signal::{RRSeries, TimeSeries},
    synthetic::synthetic_history,
};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    io::{self, Read},
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "pulse",
    version,
    about = "Optical pulse HRV analysis, baselines and fatigue estimates"
)]
struct Cli {
    /// Log filter for stderr (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    /// TOML file with analysis settings; flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DetectorArg {
    #[value(name = "adaptive-trough")]
    AdaptiveTrough,
    #[value(name = "matched-filter")]
    MatchedFilter,
    #[value(name = "dropoff")]
    Dropoff,
}

impl From<DetectorArg> for DetectorKind {
    fn from(arg: DetectorArg) -> Self {
        match arg {
            DetectorArg::AdaptiveTrough => DetectorKind::AdaptiveTrough,
            DetectorArg::MatchedFilter => DetectorKind::MatchedFilter,
            DetectorArg::Dropoff => DetectorKind::Dropoff,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run conditioning, beat detection, cleaning and HRV over a `timestamp_ms,value` CSV (stdin or --input)
    Analyze {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Sampling rate; inferred from the timestamps when omitted
        #[arg(long)]
        fs: Option<f64>,
        #[arg(long)]
        detector: Option<DetectorArg>,
        /// Append the session as a daily record to this history file
        #[arg(long)]
        append_to: Option<PathBuf>,
        /// Fatigue label (1-5) stored with the appended record; 0 leaves it unconfirmed
        #[arg(long, default_value_t = 0)]
        fatigue_level: u8,
    },
    /// Time-domain HRV from newline-delimited R-R intervals (ms)
    HrvTime {
        #[arg(long)]
        input: Option<PathBuf>,
        /// Run artifact rejection first
        #[arg(long)]
        clean: bool,
    },
    /// Artifact rejection over newline-delimited R-R intervals (ms)
    CleanRr {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        min_rr_ms: Option<i64>,
        #[arg(long)]
        max_rr_ms: Option<i64>,
        #[arg(long)]
        neighbor_tolerance: Option<f64>,
    },
    /// Compare one measurement against the rolling baseline of a history file
    Baseline {
        #[arg(long)]
        history: PathBuf,
        #[arg(long)]
        sdnn: f64,
        #[arg(long)]
        rmssd: f64,
        #[arg(long)]
        pnn50: f64,
        #[arg(long)]
        days: Option<usize>,
    },
    /// Nearest-centroid fatigue label, range and confidence for an RMSSD value
    PredictFatigue {
        #[arg(long)]
        history: PathBuf,
        #[arg(long)]
        rmssd: f64,
        #[arg(long)]
        recent_days: Option<usize>,
        #[arg(long)]
        tolerance: Option<f64>,
    },
    /// Train (or load) the tree ensemble and predict a continuous fatigue level
    Forest {
        /// Labelled history to train on
        #[arg(long, required_unless_present = "load")]
        history: Option<PathBuf>,
        /// Previously saved forest; skips training
        #[arg(long, conflicts_with = "history")]
        load: Option<PathBuf>,
        #[arg(long)]
        save: Option<PathBuf>,
        #[arg(long)]
        sdnn: f64,
        #[arg(long)]
        rmssd: f64,
        #[arg(long)]
        pnn50: f64,
        #[arg(long)]
        trees: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Generate a seeded synthetic day history (JSON or CSV by extension; stdout JSON otherwise)
    SimulateHistory {
        #[arg(long, default_value_t = 60)]
        days: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&cli.log_level))
        .init();
    let mut cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => AnalysisConfig::default(),
    };
    match cli.command {
        Commands::Analyze {
            input,
            fs,
            detector,
            append_to,
            fatigue_level,
        } => {
            if let Some(detector) = detector {
                cfg.detector = detector.into();
            }
            cmd_analyze(
                &cfg,
                input.as_deref(),
                fs,
                append_to.as_deref(),
                fatigue_level,
            )?
        }
        Commands::HrvTime { input, clean } => cmd_hrv_time(&cfg, input.as_deref(), clean)?,
        Commands::CleanRr {
            input,
            min_rr_ms,
            max_rr_ms,
            neighbor_tolerance,
        } => {
            let c = &mut cfg.cleaning;
            c.min_rr_ms = min_rr_ms.unwrap_or(c.min_rr_ms);
            c.max_rr_ms = max_rr_ms.unwrap_or(c.max_rr_ms);
            c.neighbor_tolerance = neighbor_tolerance.unwrap_or(c.neighbor_tolerance);
            cmd_clean_rr(&cfg, input.as_deref())?
        }
        Commands::Baseline {
            history,
            sdnn,
            rmssd,
            pnn50,
            days,
        } => {
            cfg.baseline.baseline_days = days.unwrap_or(cfg.baseline.baseline_days);
            cmd_baseline(&cfg, &history, sdnn, rmssd, pnn50)?
        }
        Commands::PredictFatigue {
            history,
            rmssd,
            recent_days,
            tolerance,
        } => {
            let f = &mut cfg.fatigue;
            f.recent_days = recent_days.unwrap_or(f.recent_days);
            f.range_tolerance = tolerance.unwrap_or(f.range_tolerance);
            cmd_predict_fatigue(&cfg, &history, rmssd)?
        }
        Commands::Forest {
            history,
            load,
            save,
            sdnn,
            rmssd,
            pnn50,
            trees,
            seed,
        } => {
            cfg.forest.num_trees = trees.unwrap_or(cfg.forest.num_trees);
            cfg.forest.seed = seed.unwrap_or(cfg.forest.seed);
            cmd_forest(
                &cfg,
                history.as_deref(),
                load.as_deref(),
                save.as_deref(),
                [sdnn, rmssd, pnn50],
            )?
        }
        Commands::SimulateHistory { days, seed, output } => {
            cmd_simulate_history(days, seed, output.as_deref())?
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let js = serde_json::to_string(value)?;
    println!("{}", js);
    Ok(())
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
    }
}

fn rr_series_from_input(input: Option<&Path>) -> Result<RRSeries> {
    let rr = text_io::parse_rr_series(&read_input(input)?)?;
    Ok(RRSeries::new(rr))
}

fn cmd_analyze(
    cfg: &AnalysisConfig,
    input: Option<&Path>,
    fs: Option<f64>,
    append_to: Option<&Path>,
    fatigue_level: u8,
) -> Result<()> {
    cfg.validate()?;
    let points = match input {
        Some(path) => samples_io::read_samples(path)?,
        None => samples_io::parse_samples(io::stdin().lock())?,
    };
    let fs = match fs {
        Some(fs) => fs,
        None => samples_io::estimate_rate(&points)
            .ok_or_else(|| anyhow!("cannot infer the sampling rate; pass --fs"))?,
    };
    if !(fs.is_finite() && fs > 0.0) {
        anyhow::bail!("sampling rate must be positive, got {fs}");
    }
    let start_ms = points[0].timestamp_ms;
    let ts = TimeSeries::new(fs, points);
    let result = analyze_session(&ts, cfg);

    if let Some(path) = append_to {
        if fatigue_level > 5 {
            anyhow::bail!("fatigue level must be 0 (unconfirmed) or 1-5, got {fatigue_level}");
        }
        let mut history = if path.exists() {
            history_io::read_history(path)?
        } else {
            Vec::new()
        };
        history.push(DailyRecord::from_metrics(&result.hrv, start_ms, fatigue_level));
        history_io::write_history(path, &history)?;
        log::info!("appended session to {} ({} days)", path.display(), history.len());
    }
    print_json(&result)
}

fn cmd_hrv_time(cfg: &AnalysisConfig, input: Option<&Path>, clean: bool) -> Result<()> {
    let mut rr = rr_series_from_input(input)?;
    if clean {
        rr = clean_intervals_with_report(&rr, &cfg.cleaning).0;
    }
    print_json(&hrv_time(&rr))
}

#[derive(Serialize)]
struct CleanOutput {
    rr: Vec<i64>,
    report: CleaningReport,
}

fn cmd_clean_rr(cfg: &AnalysisConfig, input: Option<&Path>) -> Result<()> {
    cfg.validate()?;
    let rr = rr_series_from_input(input)?;
    let (clean, report) = clean_intervals_with_report(&rr, &cfg.cleaning);
    print_json(&CleanOutput {
        rr: clean.rr,
        report,
    })
}

#[derive(Serialize)]
struct BaselineOutput {
    deviation: DeviationResult,
    percentile: f64,
    high_risk: bool,
    info: String,
}

fn cmd_baseline(cfg: &AnalysisConfig, history: &Path, sdnn: f64, rmssd: f64, pnn50: f64) -> Result<()> {
    cfg.validate()?;
    let records = history_io::read_history(history)?;
    let mut analyzer = BaselineAnalyzer::new(cfg.baseline);
    analyzer
        .update_baseline(&records)
        .with_context(|| format!("building baseline from {}", history.display()))?;
    print_json(&BaselineOutput {
        deviation: analyzer.analyze_deviation(sdnn, rmssd, pnn50)?,
        percentile: analyzer.percentile_rank(sdnn, rmssd, pnn50)?,
        high_risk: analyzer.is_high_fatigue_risk(sdnn, rmssd, pnn50)?,
        info: analyzer.baseline_info(),
    })
}

fn cmd_predict_fatigue(cfg: &AnalysisConfig, history: &Path, rmssd: f64) -> Result<()> {
    cfg.validate()?;
    let records = history_io::read_history(history)?;
    print_json(&estimate(&records, rmssd, &cfg.fatigue))
}

#[derive(Serialize)]
struct ForestOutput {
    trained_on: Option<usize>,
    num_trees: usize,
    prediction: Option<f64>,
    importance: BTreeMap<&'static str, f64>,
}

fn cmd_forest(
    cfg: &AnalysisConfig,
    history: Option<&Path>,
    load: Option<&Path>,
    save: Option<&Path>,
    features: [f64; 3],
) -> Result<()> {
    cfg.validate()?;
    let (forest, trained_on) = match (load, history) {
        (Some(path), _) => (RandomForest::load(path)?, None),
        (None, Some(path)) => {
            let records = history_io::read_history(path)?;
            let mut forest = RandomForest::new(cfg.forest);
            let used = forest.train(&records);
            (forest, Some(used))
        }
        (None, None) => anyhow::bail!("pass --history to train or --load a saved forest"),
    };
    if let Some(path) = save {
        forest.save(path)?;
    }
    let importance = FEATURE_NAMES
        .iter()
        .copied()
        .zip(forest.feature_importance())
        .collect();
    print_json(&ForestOutput {
        trained_on,
        num_trees: forest.num_trees(),
        prediction: forest.predict(features),
        importance,
    })
}

fn cmd_simulate_history(days: usize, seed: u64, output: Option<&Path>) -> Result<()> {
    let history = synthetic_history(days, seed);
    match output {
        Some(path) => history_io::write_history(path, &history),
        None => print_json(&history),
    }
}
