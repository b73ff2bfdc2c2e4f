//! Operator surface for the information-overload experiment.
//!
//! Hosts embed the CLI through [`run_cli`]; scripted trials can also be driven
//! directly with [`run_session_script`].

use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use overload_experiment_core::{
    export_json, pairwise_rank_agreement, present_artifacts, top_choice_matches, ActionOutcome,
    Catalog, Clock, DisplayedArtifact, Experiment, ExperimentMode, ManualClock, Move, Scenario,
    SystemClock, TaskType, TimerQueue, TlxDimension, EXPORT_FILE_NAME,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "oxp")]
#[command(about = "Information overload experiment CLI")]
pub struct Cli {
    /// JSON scenario catalog replacing the built-in one.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Seed for notice cadence and text selection.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Scenarios {
        #[command(subcommand)]
        command: ScenariosCommand,
    },
    Present(PresentArgs),
    Score(ScoreArgs),
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ScenariosCommand {
    List(ListArgs),
    Show(ShowArgs),
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(long)]
    scenario: String,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct PresentArgs {
    #[arg(long, default_value = "S1")]
    scenario: String,
    #[arg(long, value_enum, default_value_t = ModeArg::Baseline)]
    mode: ModeArg,
    /// Adaptive reveal cursor; ignored by modes without adaptive reveal.
    #[arg(long, default_value_t = 0)]
    cursor: usize,
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    #[arg(long)]
    scenario: String,
    /// Comma-separated decision ids, best first.
    #[arg(long, value_delimiter = ',', required = true)]
    ranking: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    Run(SessionRunArgs),
}

#[derive(Debug, Args)]
pub struct SessionRunArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::Baseline)]
    mode: ModeArg,
    #[arg(long, value_enum, default_value_t = TaskArg::Single)]
    task: TaskArg,
    #[arg(long)]
    scenario: Option<String>,
    /// File with one session command per line; stdin when omitted.
    #[arg(long)]
    script: Option<PathBuf>,
    /// Directory receiving the results export.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Only `wait` advances time; otherwise wall-clock time also passes.
    #[arg(long)]
    frozen_clock: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ModeArg {
    Baseline,
    Filtered,
    Adaptive,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TaskArg {
    Single,
    Ranking,
}

impl From<ModeArg> for ExperimentMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Baseline => Self::Baseline,
            ModeArg::Filtered => Self::Filtered,
            ModeArg::Adaptive => Self::Adaptive,
        }
    }
}

impl From<TaskArg> for TaskType {
    fn from(value: TaskArg) -> Self {
        match value {
            TaskArg::Single => Self::Single,
            TaskArg::Ranking => Self::Ranking,
        }
    }
}

/// Options for a scripted trial run.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub mode: ExperimentMode,
    pub task: TaskType,
    pub scenario: Option<String>,
    pub output: Option<PathBuf>,
    pub seed: Option<u64>,
    pub frozen_clock: bool,
}

/// Executes the parsed top-level CLI command graph.
///
/// # Errors
/// Returns an error when the catalog cannot be loaded, arguments are invalid,
/// or a session script contains an unknown command.
pub fn run_cli(cli: Cli) -> Result<()> {
    let catalog = load_catalog(cli.catalog.as_deref())?;
    match cli.command {
        Command::Scenarios { command } => run_scenarios(command, &catalog),
        Command::Present(args) => run_present(&args, &catalog),
        Command::Score(args) => run_score(&args, &catalog),
        Command::Session { command } => match command {
            SessionCommand::Run(args) => {
                let options = SessionOptions {
                    mode: args.mode.into(),
                    task: args.task.into(),
                    scenario: args.scenario,
                    output: args.output,
                    seed: cli.seed,
                    frozen_clock: args.frozen_clock,
                };
                let stdout = std::io::stdout();
                let mut out = stdout.lock();
                match args.script {
                    Some(path) => {
                        let body = fs::read_to_string(&path).with_context(|| {
                            format!("failed to read session script {}", path.display())
                        })?;
                        run_session_script(catalog, &options, body.as_bytes(), &mut out)
                    }
                    None => {
                        let stdin = std::io::stdin();
                        run_session_script(catalog, &options, stdin.lock(), &mut out)
                    }
                }
            }
        },
    }
}

/// Loads the catalog override at `path`, or the built-in catalog.
///
/// # Errors
/// Returns an error when the file cannot be read or fails catalog validation.
pub fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("failed to read catalog {}", path.display()))?;
            Catalog::from_json_str(&raw).map_err(|err| anyhow!("{}: {err}", path.display()))
        }
        None => Catalog::builtin().map_err(|err| anyhow!("built-in catalog: {err}")),
    }
}

fn run_scenarios(command: ScenariosCommand, catalog: &Catalog) -> Result<()> {
    match command {
        ScenariosCommand::List(args) => {
            if args.json {
                let summaries = catalog
                    .scenarios
                    .iter()
                    .map(ScenarioSummary::from)
                    .collect::<Vec<_>>();
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print_scenario_table(&catalog.scenarios);
            }
            Ok(())
        }
        ScenariosCommand::Show(args) => {
            let scenario = catalog.scenario(&args.scenario)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(scenario)?);
            } else {
                print_scenario_detail(scenario);
            }
            Ok(())
        }
    }
}

fn run_present(args: &PresentArgs, catalog: &Catalog) -> Result<()> {
    let scenario = catalog.scenario(&args.scenario)?;
    let mode = ExperimentMode::from(args.mode);
    let policy = mode.policy();
    let artifacts = present_artifacts(scenario, &policy, args.cursor)
        .into_iter()
        .map(|artifact| DisplayedArtifact::new(artifact, &policy, false))
        .collect::<Vec<_>>();

    if args.json {
        let payload = PresentJson {
            scenario: &scenario.id,
            mode,
            cursor: policy.adaptive_reveal.then_some(args.cursor),
            artifacts: &artifacts,
        };
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print_presentation_table(mode, &artifacts);
    }
    Ok(())
}

fn run_score(args: &ScoreArgs, catalog: &Catalog) -> Result<()> {
    let scenario = catalog.scenario(&args.scenario)?;
    let ranking = args
        .ranking
        .iter()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .collect::<Vec<_>>();

    let payload = ScoreJson {
        scenario: &scenario.id,
        ranking: &ranking,
        ideal_ranking: &scenario.ideal_ranking,
        rank_score_pct: pairwise_rank_agreement(&scenario.ideal_ranking, &ranking),
        top_choice_correct: top_choice_matches(&scenario.ideal_ranking, &ranking),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

/// Runs a session script against a fresh experiment, writing one JSON line
/// per executed command to `out`.
///
/// # Errors
/// Returns an error on I/O failure or when a line is not a valid session command.
pub fn run_session_script<R: BufRead, W: Write>(
    catalog: Catalog,
    options: &SessionOptions,
    input: R,
    out: &mut W,
) -> Result<()> {
    let wall = SystemClock;
    let clock = ManualClock::new(wall.now());
    let rng = options
        .seed
        .map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let mut experiment = Experiment::with_parts(catalog, clock.clone(), TimerQueue::new(), rng)?;

    if let Some(scenario) = options.scenario.as_deref() {
        if !experiment.select_scenario(scenario).is_applied() {
            bail!("unknown scenario id {scenario}");
        }
    }
    // Initial selections are configuration, not participant clicks.
    if experiment.mode() != options.mode || experiment.task() != options.task {
        experiment.set_mode(options.mode);
        experiment.set_task(options.task);
        experiment.reset();
    }

    let wall_start = wall.now();
    let mut simulated = time::Duration::ZERO;

    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let line = line.with_context(|| format!("failed to read script line {line_number}"))?;
        let Some(command) = ScriptCommand::parse(&line)
            .with_context(|| format!("script line {line_number}: {}", line.trim()))?
        else {
            continue;
        };

        if let ScriptCommand::Wait { seconds } = command {
            simulated += time::Duration::seconds_f64(seconds);
        }
        let now = if options.frozen_clock {
            wall_start + simulated
        } else {
            wall.now() + simulated
        };
        clock.set(now);
        let delivered = experiment.poll_timers();

        let outcome = match &command {
            ScriptCommand::Start => experiment.start(),
            ScriptCommand::Reset => experiment.reset(),
            ScriptCommand::Mode(mode) => experiment.set_mode(*mode),
            ScriptCommand::Task(task) => experiment.set_task(*task),
            ScriptCommand::Scenario(id) => experiment.select_scenario(id),
            ScriptCommand::Open(id) => experiment.toggle_artifact(id),
            ScriptCommand::Choose(id) => experiment.choose(id),
            ScriptCommand::Up(id) => experiment.move_entry(id, Move::Up),
            ScriptCommand::Down(id) => experiment.move_entry(id, Move::Down),
            ScriptCommand::Submit => experiment.submit_ranking(),
            ScriptCommand::More => experiment.reveal_more(),
            ScriptCommand::Less => experiment.reveal_less(),
            ScriptCommand::RatingOpen => experiment.open_rating_panel(),
            ScriptCommand::RatingClose => experiment.close_rating_panel(),
            ScriptCommand::Rate { dimension, value } => experiment.set_rating(*dimension, *value),
            ScriptCommand::Save => experiment.save_rating()?,
            ScriptCommand::Wait { .. } => ActionOutcome::Applied,
            ScriptCommand::Status => {
                writeln!(out, "{}", serde_json::to_string(&experiment.view())?)?;
                continue;
            }
            ScriptCommand::Results => {
                let records = experiment.results().records();
                writeln!(out, "{}", serde_json::to_string(records)?)?;
                continue;
            }
            ScriptCommand::Export => {
                let body = experiment.export()?;
                let path = write_export(options.output.as_deref(), &body)?;
                let payload = ExportJson {
                    line: line_number,
                    exported: path.display().to_string(),
                    records: experiment.results().len(),
                    clicks: experiment.session().clicks(),
                };
                writeln!(out, "{}", serde_json::to_string(&payload)?)?;
                continue;
            }
        };

        let report = StepReport::new(line_number, line.trim(), &outcome, delivered, &experiment);
        writeln!(out, "{}", serde_json::to_string(&report)?)?;
    }

    if let Some(dir) = options.output.as_deref() {
        let body = export_json(experiment.results().records())?;
        let path = write_export(Some(dir), &body)?;
        info!(path = %path.display(), records = experiment.results().len(), "results exported");
    }
    Ok(())
}

fn write_export(dir: Option<&Path>, body: &str) -> Result<PathBuf> {
    let dir = dir.unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;
    let path = dir.join(EXPORT_FILE_NAME);
    fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[derive(Debug, Clone, PartialEq)]
enum ScriptCommand {
    Start,
    Reset,
    Mode(ExperimentMode),
    Task(TaskType),
    Scenario(String),
    Open(String),
    Choose(String),
    Up(String),
    Down(String),
    Submit,
    More,
    Less,
    RatingOpen,
    RatingClose,
    Rate { dimension: TlxDimension, value: u8 },
    Save,
    Wait { seconds: f64 },
    Export,
    Status,
    Results,
}

impl ScriptCommand {
    /// Parses one script line. Blank lines and `#` comments yield `None`.
    fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let words = line.split_whitespace().collect::<Vec<_>>();
        let command = match words.as_slice() {
            ["start"] => Self::Start,
            ["reset"] => Self::Reset,
            ["mode", mode] => Self::Mode(
                ExperimentMode::parse(mode).ok_or_else(|| anyhow!("unknown mode {mode}"))?,
            ),
            ["task", task] => {
                Self::Task(TaskType::parse(task).ok_or_else(|| anyhow!("unknown task {task}"))?)
            }
            ["scenario", id] => Self::Scenario((*id).to_string()),
            ["open", id] => Self::Open((*id).to_string()),
            ["choose", id] => Self::Choose((*id).to_string()),
            ["up", id] => Self::Up((*id).to_string()),
            ["down", id] => Self::Down((*id).to_string()),
            ["submit"] => Self::Submit,
            ["more"] => Self::More,
            ["less"] => Self::Less,
            ["rating", "open"] => Self::RatingOpen,
            ["rating", "close"] => Self::RatingClose,
            ["rate", dimension, value] => Self::Rate {
                dimension: TlxDimension::parse(dimension)
                    .ok_or_else(|| anyhow!("unknown workload dimension {dimension}"))?,
                value: value
                    .parse::<u8>()
                    .with_context(|| format!("rating must be an integer in 0..=20: {value}"))?,
            },
            ["save"] => Self::Save,
            ["wait", seconds] => {
                let seconds = seconds
                    .parse::<f64>()
                    .with_context(|| format!("wait needs seconds: {seconds}"))?;
                if !seconds.is_finite() || seconds < 0.0 {
                    bail!("wait needs a non-negative number of seconds");
                }
                Self::Wait { seconds }
            }
            ["export"] => Self::Export,
            ["status"] => Self::Status,
            ["results"] => Self::Results,
            _ => bail!("unknown session command"),
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Serialize)]
struct StepReport<'a> {
    line: usize,
    command: &'a str,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    phase: &'static str,
    clicks: u32,
    notices_delivered: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    notice: Option<&'a str>,
}

impl<'a> StepReport<'a> {
    fn new(
        line: usize,
        command: &'a str,
        outcome: &ActionOutcome,
        notices_delivered: usize,
        experiment: &'a Experiment<ManualClock, TimerQueue>,
    ) -> Self {
        let (label, code, reason) = match outcome {
            ActionOutcome::Applied => ("applied", None, None),
            ActionOutcome::Rejected { reason } => {
                ("rejected", Some(reason.code()), Some(reason.to_string()))
            }
        };
        Self {
            line,
            command,
            outcome: label,
            code,
            reason,
            phase: experiment.session().phase().as_str(),
            clicks: experiment.session().clicks(),
            notices_delivered,
            notice: experiment.current_notice(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportJson {
    line: usize,
    exported: String,
    records: usize,
    clicks: u32,
}

#[derive(Debug, Serialize)]
struct ScenarioSummary<'a> {
    id: &'a str,
    title: &'a str,
    artifacts: usize,
    decisions: usize,
    must_open_ids: &'a [String],
    ideal_ranking: &'a [String],
}

impl<'a> From<&'a Scenario> for ScenarioSummary<'a> {
    fn from(scenario: &'a Scenario) -> Self {
        Self {
            id: &scenario.id,
            title: &scenario.title,
            artifacts: scenario.artifacts.len(),
            decisions: scenario.decisions.len(),
            must_open_ids: &scenario.must_open_ids,
            ideal_ranking: &scenario.ideal_ranking,
        }
    }
}

#[derive(Debug, Serialize)]
struct PresentJson<'a> {
    scenario: &'a str,
    mode: ExperimentMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<usize>,
    artifacts: &'a [DisplayedArtifact],
}

#[derive(Debug, Serialize)]
struct ScoreJson<'a> {
    scenario: &'a str,
    ranking: &'a [String],
    ideal_ranking: &'a [String],
    rank_score_pct: Option<u8>,
    top_choice_correct: bool,
}

fn print_scenario_table(scenarios: &[Scenario]) {
    println!(
        "{:<6} {:<9} {:<9} {:<12} title",
        "id", "artifacts", "decisions", "must_open"
    );
    println!("{}", "-".repeat(80));
    for scenario in scenarios {
        println!(
            "{:<6} {:<9} {:<9} {:<12} {}",
            scenario.id,
            scenario.artifacts.len(),
            scenario.decisions.len(),
            scenario.must_open_ids.join(","),
            scenario.title
        );
    }
}

fn print_scenario_detail(scenario: &Scenario) {
    println!("{} {}", scenario.id, scenario.title);
    println!("{}", scenario.background);
    println!();
    println!("{:<6} {:<4} {:<8} {:<6} title", "id", "", "priority", "time");
    println!("{}", "-".repeat(80));
    for artifact in &scenario.artifacts {
        println!(
            "{:<6} {:<4} {:<8} {:<6} {}",
            artifact.id,
            artifact.kind.glyph(),
            artifact.priority.as_str(),
            artifact.time.as_deref().unwrap_or("-"),
            artifact.title
        );
    }
    println!();
    for decision in &scenario.decisions {
        println!("[{}] {}", decision.id, decision.label);
    }
    println!();
    println!("ideal ranking: {}", scenario.ideal_ranking.join(" > "));
    println!("must open: {}", scenario.must_open_ids.join(", "));
}

fn print_presentation_table(mode: ExperimentMode, artifacts: &[DisplayedArtifact]) {
    println!("mode: {} ({})", mode.as_str(), mode.display_name());
    println!(
        "{:<8} {:<4} {:<8} {:<6} {:<10} title",
        "id", "", "priority", "decoy", "collapsed"
    );
    println!("{}", "-".repeat(90));
    for artifact in artifacts {
        println!(
            "{:<8} {:<4} {:<8} {:<6} {:<10} {}",
            artifact.id,
            artifact.glyph,
            artifact.priority.as_str(),
            if artifact.decoy { "yes" } else { "no" },
            if artifact.collapsed { "yes" } else { "no" },
            artifact.title
        );
    }
}
