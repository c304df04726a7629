//! Probe0 CLI
//!
//! Usage:
//!   probe0 --simulate                      # Seeded session on the virtual clock
//!   probe0 --realtime                      # Same session paced by the wall clock
//!   probe0 --score results/x/trials.json   # Score a saved trial list
//!   probe0 --validate --config test.toml   # Check config and stimulus list
//!   probe0 --serve                         # HTTP API server
//!   probe0 --simulate --json               # JSON lines output

use clap::Parser;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use probe0::core::{
    builtin_stimuli, load_stimuli, run_server, session_id, validate_stimuli, Clock, EventLog, FileSink,
    ProbeError, RespondentProfile, Result, ScoringEngine, SessionState, SimulatedRespondent,
    StageOrchestrator, TestConfig, VirtualClock, WallClock,
};
use probe0::types::{Band, Framing, ScoredDataset, StimulusSpec, TrialOutput, TrialResult, Verdict};
use probe0::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "probe0",
    version = VERSION,
    about = "Probe0 - masked-probe reaction test engine",
    long_about = "Probe0 presents masked word probes on a logical clock, classifies\n\
                  every key press, re-presents missed stimuli, and scores the trial\n\
                  log into recognition and significance tables.\n\n\
                  Modes:\n  \
                  --simulate   Seeded simulated respondent, virtual clock (default)\n  \
                  --realtime   Simulated respondent paced by the wall clock\n  \
                  --score      Score a saved trials.json\n  \
                  --validate   Check configuration and stimulus list\n  \
                  --serve      HTTP API server mode\n\n\
                  Stages:\n  \
                  adaptation, adaptation_repeat, preparation, calibration,\n  \
                  calibration_repeat, reference, reference_repeat, main, main_repeat"
)]
struct Args {
    /// Run a simulated session on the virtual clock
    #[arg(long)]
    simulate: bool,

    /// Run a simulated session in real time
    #[arg(long)]
    realtime: bool,

    /// Score a trials.json file
    #[arg(long, value_name = "TRIALS")]
    score: Option<PathBuf>,

    /// Validate configuration and stimuli, then exit
    #[arg(long)]
    validate: bool,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long, default_value = "127.0.0.1:3000")]
    addr: String,

    /// Test configuration (.toml or .json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stimulus list, one `value,category` per line
    #[arg(long)]
    stimuli: Option<PathBuf>,

    /// Seed for block shuffling and the simulated respondent
    #[arg(long)]
    seed: Option<u64>,

    /// Respondent number used in the session id
    #[arg(long, default_value_t = 1)]
    respondent: u32,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Directory for session folders (default: ./results)
    #[arg(long, default_value = "./results")]
    results_dir: PathBuf,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "probe0=info".into()))
        .with_writer(std::io::stderr)
        .init();

    if args.no_color {
        colored::control::set_override(false);
    }

    let outcome = if args.serve {
        run_serve(&args).await
    } else if args.validate {
        run_validate(&args)
    } else if let Some(ref path) = args.score {
        run_score(path, &args)
    } else if args.realtime && !args.simulate {
        run_session(WallClock::new(), &args)
    } else {
        run_session(VirtualClock::new(), &args)
    };

    if let Err(e) = outcome {
        error!("{}", e);
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<TestConfig> {
    match args.config {
        Some(ref path) => TestConfig::load(path),
        None => Ok(TestConfig::default()),
    }
}

fn load_stimulus_list(args: &Args, config: &TestConfig) -> Result<Vec<StimulusSpec>> {
    match args.stimuli {
        Some(ref path) => load_stimuli(path),
        None => Ok(builtin_stimuli(&config.lang)),
    }
}

/// Config and stimulus list, both validated
fn prepare(args: &Args) -> Result<(TestConfig, Vec<StimulusSpec>)> {
    let config = load_config(args)?;
    let check = config.validate();
    if !check.is_valid() {
        return Err(ProbeError::Validation(check));
    }
    let stimuli = load_stimulus_list(args, &config)?;
    let check = validate_stimuli(&stimuli);
    if !check.is_valid() {
        return Err(ProbeError::Validation(check));
    }
    Ok((config, stimuli))
}

fn run_validate(args: &Args) -> Result<()> {
    let (config, stimuli) = prepare(args)?;
    if args.json {
        println!(
            "{}",
            serde_json::json!({ "valid": true, "lang": config.lang, "stimuli": stimuli.len() })
        );
    } else {
        println!(
            "{} config ok (lang={}), {} stimuli",
            "✓".green(),
            config.lang,
            stimuli.len()
        );
    }
    Ok(())
}

/// Run one session end to end and write the session folder
fn run_session<C: Clock>(clock: C, args: &Args) -> Result<()> {
    let (config, stimuli) = prepare(args)?;
    let seed = args.seed.unwrap_or_else(|| chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0) as u64);
    let started = chrono::Utc::now();
    let id = session_id(args.respondent, started);

    let dir = args.results_dir.join(&id);
    fs::create_dir_all(&dir)?;
    let sink = FileSink::open(dir.join(format!("log-{}.txt", id)))?;
    let log = EventLog::with_sink(started, Box::new(sink));
    let session = SessionState::new(id.clone(), config, stimuli, log, seed);
    info!(session = %id, seed, "session created");

    if !args.json {
        print_header(&id, seed);
    }

    let json = args.json;
    let no_color = args.no_color;
    let respondent = SimulatedRespondent::with_profile(seed.wrapping_add(1), RespondentProfile::default());
    let mut session = StageOrchestrator::new(clock, respondent, session)
        .with_observer(Box::new(move |output: &TrialOutput| {
            if json {
                if let Ok(line) = serde_json::to_string(output) {
                    println!("{}", line);
                }
            } else if no_color {
                println!("{}", output.to_parseable_string());
            } else {
                println!("{}", output.to_terminal_string());
            }
        }))
        .run();

    let end = session.ended_ms.unwrap_or(0);
    let dataset = ScoringEngine::new().score_session(&mut session, end);
    write_json(&dir.join("trials.json"), &session.results)?;
    write_json(&dir.join("report.json"), &dataset)?;

    for line in session.log.diagnostics() {
        eprintln!("{} {}", "log:".yellow(), line);
    }

    if json {
        println!("{}", serde_json::to_string(&dataset)?);
    } else {
        print_dataset(&dataset);
        println!();
        println!("Session folder: {}", dir.display());
    }
    Ok(())
}

fn run_score(path: &Path, args: &Args) -> Result<()> {
    let text = fs::read_to_string(path)?;
    let results: Vec<TrialResult> = serde_json::from_str(&text)?;
    let engine = ScoringEngine::new();
    let dataset = engine.score(&results);
    for warning in engine.warnings(&dataset) {
        warn!("{}", warning);
    }
    if args.json {
        println!("{}", serde_json::to_string_pretty(&dataset)?);
    } else {
        print_dataset(&dataset);
    }
    Ok(())
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn print_header(id: &str, seed: u64) {
    println!("{}", "========================================".bold());
    println!("{}", format!("  Probe0 v{} - {}", VERSION, id).bold());
    println!("  seed {}", seed);
    println!("{}", "========================================".bold());
    println!();
}

fn band_colored(band: Band, label: &str) -> colored::ColoredString {
    match band {
        Band::High => label.red().bold(),
        Band::Probable => label.yellow(),
        Band::Weak => label.cyan(),
        Band::None => label.dimmed(),
    }
}

fn verdict_colored(verdict: Verdict) -> colored::ColoredString {
    let text = format!("{:?}", verdict).to_lowercase();
    match verdict {
        Verdict::Ready | Verdict::Stable => text.green(),
        Verdict::Unstable => text.red(),
    }
}

/// Human-readable report on stdout
fn print_dataset(dataset: &ScoredDataset) {
    println!();
    println!("{}", "Respondent state".bold());
    let r = &dataset.respondent;
    println!(
        "  adaptation: mean={:.0}ms cv={:.1}% miss={:.1}% -> {}",
        r.adaptation.mean,
        r.adaptation.cv,
        r.adaptation.miss_pct,
        verdict_colored(r.adaptation.verdict)
    );
    println!(
        "  main:       mean={:.0}ms cv={:.1}% miss={:.1}% -> {}",
        r.main.mean,
        r.main.cv,
        r.main.miss_pct,
        verdict_colored(r.main.verdict)
    );
    if r.fatigue {
        println!("  {}", "possible fatigue: cv grew by more than 25%".yellow());
    }

    println!();
    println!("{}", "Categories".bold());
    for c in &dataset.categories {
        let p = &c.profile;
        println!(
            "  {:<10} n={:<4} miss={:>5.1}% mean={:>6.0}ms effect={:>+6.1}% z={:>+5.2} p={:.3}",
            c.category.as_str(), p.trials, p.miss_pct, p.reaction.mean, p.vs_neutral.effect, p.vs_neutral.z, p.vs_neutral.p
        );
    }

    for table in dataset.tables.iter().filter(|t| t.framing == Framing::Recognition) {
        println!();
        println!("{}", format!("{:?} ({:?})", table.scale, table.framing).bold());
        for row in &table.rows {
            let params: Vec<String> = row.params.iter().map(|p| format!("{}={:.2}", p.name, p.value)).collect();
            println!(
                "  {:<16} {:>6.1}  {}  [{}]",
                row.stimulus,
                row.score,
                band_colored(row.band, &row.label),
                params.join(", ")
            );
        }
    }

    if !dataset.unreliable.is_empty() {
        println!();
        println!("{} {}", "Unreliable:".yellow(), dataset.unreliable.join(", "));
    }
    println!();
    println!("{}", "Conclusions".bold());
    println!("  high:     {}", dataset.conclusions.high.join(", "));
    println!("  probable: {}", dataset.conclusions.probable.join(", "));
    println!("  digest:   {}", dataset.log_digest.dimmed());
}

/// Run HTTP API server
async fn run_serve(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let check = config.validate();
    if !check.is_valid() {
        return Err(ProbeError::Validation(check));
    }
    println!();
    println!("{}", format!("  Probe0 API Server v{}", VERSION).bold());
    println!();
    if let Err(e) = run_server(&args.addr, config).await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }
    Ok(())
}
