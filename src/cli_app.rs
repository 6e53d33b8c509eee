//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use spot_test_orchestrator::cluster::{CliClusterAdapter, ClusterAdapter, capture_snapshot};
use spot_test_orchestrator::core::config::Config;
use spot_test_orchestrator::core::env_file::{EnvOverlay, load_env_file};
use spot_test_orchestrator::core::errors::StoError;
use spot_test_orchestrator::core::signals::ShutdownSignal;
use spot_test_orchestrator::logger::jsonl::JsonlConfig;
use spot_test_orchestrator::logger::{ActivityLoggerHandle, spawn_logger};
use spot_test_orchestrator::model::{
    ClusterSnapshot, Framework, RemediationAction, TestReport, TestStatus,
};
use spot_test_orchestrator::monitor::EvictionMonitor;
use spot_test_orchestrator::orchestrator::RunController;
use spot_test_orchestrator::report::{ReportFormat, regenerate};

/// Spot Test Orchestrator: disruptive spot-node test runs with eviction monitoring.
#[derive(Debug, Parser)]
#[command(
    name = "sto",
    author,
    version,
    about = "Spot Test Orchestrator - run spot-node test suites against a live cluster",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Quiet mode (errors and results only).
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run the full test orchestration: preflight, suites, remediation, reports.
    Run(RunArgs),
    /// Regenerate HTML/Markdown reports from a stored JSON report.
    Report(ReportArgs),
    /// Run remediation only (ghost instances, stuck nodes).
    Remediate,
    /// Monitor eviction rate continuously (Ctrl+C to stop).
    Monitor(MonitorArgs),
    /// Print a point-in-time cluster snapshot.
    Snapshot,
    /// Cordon, uncordon, or drain a single node.
    Node(NodeArgs),
    /// View and validate configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    /// Skip the remediation phase.
    #[arg(long)]
    no_remediate: bool,
    /// Skip the Terratest suite.
    #[arg(long)]
    skip_terratest: bool,
    /// Skip the Bash suite.
    #[arg(long)]
    skip_bash: bool,
    /// Skip the Python suite.
    #[arg(long)]
    skip_python: bool,
}

#[derive(Debug, Clone, Args)]
struct ReportArgs {
    /// Stored JSON report.
    #[arg(value_name = "JSON_FILE")]
    json_file: PathBuf,
    /// Formats to rebuild (default: html and markdown).
    #[arg(long = "format", value_name = "FORMAT", value_parser = parse_report_format)]
    formats: Vec<ReportFormat>,
}

#[derive(Debug, Clone, Args)]
struct MonitorArgs {
    /// Window length and poll interval in seconds.
    #[arg(long, default_value_t = 60, value_name = "SECONDS")]
    interval: u64,
    /// Stop after this many windows instead of running until interrupted.
    #[arg(long, value_name = "N")]
    windows: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct NodeArgs {
    #[command(subcommand)]
    command: NodeCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum NodeCommand {
    /// Mark a node unschedulable.
    Cordon { node: String },
    /// Mark a node schedulable again.
    Uncordon { node: String },
    /// Evict all pods from a node and cordon it.
    Drain {
        node: String,
        /// Drain timeout in seconds.
        #[arg(long, default_value_t = 300, value_name = "SECONDS")]
        timeout: u64,
    },
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<StoError> for CliError {
    fn from(value: StoError) -> Self {
        match value {
            StoError::InvalidConfig { .. }
            | StoError::MissingConfig { .. }
            | StoError::ConfigParse { .. } => Self::User(value.to_string()),
            other => Self::Runtime(other.to_string()),
        }
    }
}

/// Dispatch CLI commands. Returns the process exit code on success.
pub fn run(cli: &Cli) -> Result<i32, CliError> {
    if cli.no_color {
        control::set_override(false);
    }
    let mode = output_mode(cli);

    match &cli.command {
        Command::Run(args) => run_tests(cli, mode, args),
        Command::Report(args) => run_report(mode, args),
        Command::Remediate => run_remediate(cli, mode),
        Command::Monitor(args) => run_monitor(cli, mode, args),
        Command::Snapshot => run_snapshot(cli, mode),
        Command::Node(args) => run_node(cli, mode, args),
        Command::Config(args) => run_config(cli, mode, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(0)
        }
    }
}

// ──────────────────── shared setup ────────────────────

/// Effective config, `.env` overlay, and a command-line cluster adapter.
fn load_context(cli: &Cli) -> Result<(Config, EnvOverlay, Arc<dyn ClusterAdapter>), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let env = match &config.cluster.env_file {
        Some(path) => load_env_file(path)?,
        None => EnvOverlay::new(),
    };
    let adapter: Arc<dyn ClusterAdapter> =
        Arc::new(CliClusterAdapter::new(&config.cluster, env.clone()));
    Ok((config, env, adapter))
}

fn start_logger(config: &Config) -> Option<(ActivityLoggerHandle, std::thread::JoinHandle<()>)> {
    if !config.logging.enabled {
        return None;
    }
    match spawn_logger(JsonlConfig::from(&config.logging)) {
        Ok(pair) => Some(pair),
        Err(e) => {
            eprintln!("[STO-LOG] activity logger unavailable: {e}");
            None
        }
    }
}

fn stop_logger(logger: Option<(ActivityLoggerHandle, std::thread::JoinHandle<()>)>) {
    if let Some((handle, join)) = logger {
        handle.shutdown();
        drop(handle);
        let _ = join.join();
    }
}

// ──────────────────── run ────────────────────

fn apply_run_args(config: &mut Config, args: &RunArgs) {
    if args.no_remediate {
        config.remediation.enabled = false;
    }
    for (skip, framework) in [
        (args.skip_terratest, Framework::Terratest),
        (args.skip_bash, Framework::Bash),
        (args.skip_python, Framework::Python),
    ] {
        if skip {
            config.test_suites.get_mut(framework).enabled = false;
        }
    }
}

fn run_tests(cli: &Cli, mode: OutputMode, args: &RunArgs) -> Result<i32, CliError> {
    let (mut config, env, adapter) = load_context(cli)?;
    apply_run_args(&mut config, args);

    let logger = start_logger(&config);
    let mut controller = RunController::new(config, adapter, env).quiet(cli.quiet);
    if let Some((handle, _)) = &logger {
        controller = controller.with_logger(handle.clone());
    }
    let report = controller.run();
    drop(controller);
    stop_logger(logger);

    match mode {
        OutputMode::Human => print_report_summary(&report),
        OutputMode::Json => {
            let payload = json!({
                "command": "run",
                "run_id": report.run_id,
                "cluster": report.cluster_name,
                "total": report.total_tests(),
                "passed": report.passed(),
                "failed": report.failed(),
                "skipped": report.skipped(),
                "pass_rate": report.pass_rate(),
                "eviction_rate_per_hour": report.eviction_rate_per_hour,
                "remediation_actions": report.remediation_actions.len(),
                "aborted": report.abort_reason,
                "exit_code": report.exit_code(),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(report.exit_code())
}

fn print_report_summary(report: &TestReport) {
    println!();
    println!("{}", "Test Run Summary".bold());
    println!("  Run ID:   {}", report.run_id);
    println!("  Cluster:  {}", report.cluster_name);
    if let Some(reason) = &report.abort_reason {
        println!("  {} {reason}", "Aborted:".red().bold());
    }
    println!(
        "  Total: {}  {}  {}  {}",
        report.total_tests(),
        format!("Passed: {}", report.passed()).green(),
        format!("Failed: {}", report.failed()).red(),
        format!("Skipped: {}", report.skipped()).yellow()
    );
    println!("  Pass rate: {:.1}%", report.pass_rate());
    println!(
        "  Evictions: {} ({:.2}/hr)",
        report.eviction_events.len(),
        report.eviction_rate_per_hour
    );
    println!(
        "  Remediations: {} ({} succeeded)",
        report.remediation_actions.len(),
        report.remediation_successes()
    );
    for failure in report.top_failures() {
        println!(
            "  {} {} {}",
            status_label(failure.status),
            failure.test_id,
            failure
                .error_message
                .as_deref()
                .and_then(|m| m.lines().next())
                .unwrap_or_default()
        );
    }
}

fn status_label(status: TestStatus) -> colored::ColoredString {
    match status {
        TestStatus::Pass => "PASS".green(),
        TestStatus::Fail => "FAIL".red(),
        TestStatus::Skip => "SKIP".yellow(),
    }
}

// ──────────────────── report ────────────────────

fn parse_report_format(raw: &str) -> Result<ReportFormat, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "json" => Ok(ReportFormat::Json),
        "html" => Ok(ReportFormat::Html),
        "markdown" | "md" => Ok(ReportFormat::Markdown),
        other => Err(format!("unknown report format {other:?} (json, html, markdown)")),
    }
}

fn run_report(mode: OutputMode, args: &ReportArgs) -> Result<i32, CliError> {
    if !args.json_file.exists() {
        return Err(CliError::User(format!(
            "report not found: {}",
            args.json_file.display()
        )));
    }
    let formats = if args.formats.is_empty() {
        vec![ReportFormat::Html, ReportFormat::Markdown]
    } else {
        args.formats.clone()
    };

    let outcomes = regenerate(&args.json_file, &formats)?;
    let mut failures = 0;
    let mut written = Vec::new();
    for outcome in outcomes {
        match outcome.result {
            Ok(path) => {
                if mode == OutputMode::Human {
                    println!("Generated {} report: {}", outcome.format, path.display());
                }
                written.push(json!({"format": outcome.format.as_str(), "path": path.to_string_lossy()}));
            }
            Err(e) => {
                failures += 1;
                eprintln!("[STO-REPORT] {} report failed: {e}", outcome.format);
                written.push(json!({"format": outcome.format.as_str(), "error": e.to_string()}));
            }
        }
    }
    if mode == OutputMode::Json {
        write_json_line(&json!({"command": "report", "reports": written}))?;
    }
    Ok(i32::from(failures > 0))
}

// ──────────────────── remediate ────────────────────

fn run_remediate(cli: &Cli, mode: OutputMode) -> Result<i32, CliError> {
    let (config, env, adapter) = load_context(cli)?;
    let logger = start_logger(&config);
    let mut controller = RunController::new(config, adapter, env).quiet(cli.quiet);
    if let Some((handle, _)) = &logger {
        controller = controller.with_logger(handle.clone());
    }
    let result = controller.run_remediation_only();
    drop(controller);
    stop_logger(logger);
    let actions = result?;

    match mode {
        OutputMode::Human => print_actions(&actions),
        OutputMode::Json => {
            let payload = json!({
                "command": "remediate",
                "actions": serde_json::to_value(&actions)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(i32::from(actions.iter().any(|a| !a.success)))
}

fn print_actions(actions: &[RemediationAction]) {
    if actions.is_empty() {
        println!("Nothing to remediate.");
        return;
    }
    for action in actions {
        let marker = if action.success {
            "ok".green()
        } else {
            "failed".red()
        };
        println!(
            "{:<8} {:<22} {:<32} {}",
            marker,
            action.action_type.as_str(),
            action.target,
            action.details
        );
    }
}

// ──────────────────── monitor ────────────────────

fn run_monitor(cli: &Cli, mode: OutputMode, args: &MonitorArgs) -> Result<i32, CliError> {
    if args.interval == 0 {
        return Err(CliError::User("--interval must be > 0".to_string()));
    }
    let (_config, _env, adapter) = load_context(cli)?;
    adapter.current_context()?;

    let window = Duration::from_secs(args.interval);
    let signal = ShutdownSignal::install();
    if mode == OutputMode::Human && !cli.quiet {
        println!(
            "Monitoring spot evictions (polling every {}s)...",
            args.interval
        );
        println!("Press Ctrl+C to stop\n");
    }

    let mut completed = 0_u32;
    loop {
        let monitor = EvictionMonitor::start(Arc::clone(&adapter), window)?;
        let interrupted = signal.sleep(window);
        let summary = monitor.stop();
        completed += 1;

        match mode {
            OutputMode::Human => println!(
                "Eviction rate: {:.1}/hour ({} events)",
                summary.rate_per_hour,
                summary.events.len()
            ),
            OutputMode::Json => {
                let payload = json!({
                    "command": "monitor",
                    "window": completed,
                    "elapsed_seconds": summary.elapsed.as_secs_f64(),
                    "rate_per_hour": summary.rate_per_hour,
                    "events": serde_json::to_value(&summary.events)?,
                });
                write_json_line(&payload)?;
            }
        }

        if interrupted || args.windows.is_some_and(|n| completed >= n) {
            break;
        }
    }
    if mode == OutputMode::Human && !cli.quiet {
        println!("Stopping monitor...");
    }
    Ok(0)
}

// ──────────────────── snapshot / node ────────────────────

fn run_snapshot(cli: &Cli, mode: OutputMode) -> Result<i32, CliError> {
    let (_config, _env, adapter) = load_context(cli)?;
    let context = adapter.current_context()?;
    let snapshot = capture_snapshot(adapter.as_ref(), chrono::Utc::now());
    match mode {
        OutputMode::Human => print_snapshot(&context, &snapshot),
        OutputMode::Json => {
            let payload = json!({
                "command": "snapshot",
                "context": context,
                "snapshot": serde_json::to_value(&snapshot)?,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(0)
}

fn print_snapshot(context: &str, snapshot: &ClusterSnapshot) {
    println!("{} {context}", "Cluster:".bold());
    println!(
        "  Nodes: {} ({} ready, {} spot)",
        snapshot.total_nodes, snapshot.ready_nodes, snapshot.spot_nodes
    );
    println!(
        "  Pods:  {} ({} pending)",
        snapshot.total_pods, snapshot.pending_pods
    );
    for (pool, count) in &snapshot.node_pool_counts {
        println!("  Pool {pool}: {count}");
    }
}

fn run_node(cli: &Cli, mode: OutputMode, args: &NodeArgs) -> Result<i32, CliError> {
    let (_config, _env, adapter) = load_context(cli)?;
    let (verb, node, result) = match &args.command {
        NodeCommand::Cordon { node } => ("cordon", node, adapter.cordon(node)),
        NodeCommand::Uncordon { node } => ("uncordon", node, adapter.uncordon(node)),
        NodeCommand::Drain { node, timeout } => (
            "drain",
            node,
            adapter.drain(node, Duration::from_secs(*timeout)),
        ),
    };
    let success = result.is_ok();
    match mode {
        OutputMode::Human => match &result {
            Ok(()) => println!("{} {verb} {node}", "ok".green()),
            Err(e) => eprintln!("{} {verb} {node}: {e}", "failed".red()),
        },
        OutputMode::Json => {
            let payload = json!({
                "command": format!("node {verb}"),
                "node": node,
                "success": success,
                "error": result.as_ref().err().map(ToString::to_string),
            });
            write_json_line(&payload)?;
        }
    }
    Ok(i32::from(!success))
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, mode: OutputMode, args: &ConfigArgs) -> Result<i32, CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();
            match mode {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(0)
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;
            match mode {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(0)
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                match mode {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Enabled suites: {:?}", config.enabled_suites());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(0)
            }
            Err(e) => {
                match mode {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── output ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("STO_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
