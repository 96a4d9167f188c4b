//! Command-line interface for revgate.

use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};

use crate::agents;
use crate::config::{CliOverrides, CONFIG_TEMPLATE};
use crate::finding::Severity;
use crate::logging;
use crate::profile;
use crate::report::{self, RenderOptions};
use crate::review::{ReviewRequest, Reviewer};
use crate::runner::Cancellation;
use crate::scope::{ScopeResolver, ScopeSpec};

/// Exit codes.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_ERROR: i32 = 2;
pub const EXIT_CANCELLED: i32 = 3;

/// Multi-agent code review gate.
///
/// Revgate fans a change set out to a set of domain review agents (security,
/// performance, testing, ...), merges what they report into one deduplicated,
/// severity-ranked list, and exits non-zero when anything crosses the
/// configured fail threshold.
#[derive(Parser)]
#[command(name = "revgate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Review a scope with the selected agents
    Review(ReviewArgs),
    /// List registered agents and which ones this project would run
    Agents(AgentsArgs),
    /// Write a commented starter config file
    Init(InitArgs),
    /// Run a single agent: `revgate <agent-id> [SCOPE] ...`
    #[command(external_subcommand)]
    Shortcut(Vec<String>),
}

#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
    Sarif,
}

/// Arguments for the review command.
#[derive(Args, Debug, Clone)]
pub struct ReviewArgs {
    /// Empty = changed files, `full` = whole project, otherwise a path or glob
    pub scope: Option<String>,

    /// Comma-separated agent ids; replaces auto-detection
    #[arg(long, value_delimiter = ',')]
    pub pick: Option<Vec<String>>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
    pub format: OutputFormat,

    /// Config file (default: discover in the project root)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Project root
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Base ref for the changed-files scope
    #[arg(long)]
    pub base: Option<String>,

    /// Report findings at or above this severity
    #[arg(short, long)]
    pub threshold: Option<Severity>,

    /// Exit 1 when a reported finding is at or above this severity
    #[arg(long)]
    pub fail_on: Option<Severity>,

    /// Per-agent timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Maximum agents running at once
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// List each dropped finding with its reason
    #[arg(long)]
    pub show_dropped: bool,

    /// Timestamp to stamp into the report (e.g. `$(date -u +%FT%TZ)`)
    #[arg(long)]
    pub rendered_at: Option<String>,
}

/// Argument layout of `revgate <agent-id> ...`.
#[derive(Parser, Debug)]
struct ShortcutCli {
    #[command(flatten)]
    log: LogArgs,

    #[command(flatten)]
    review: ReviewArgs,
}

/// Arguments for the agents command.
#[derive(Args, Debug, Clone)]
pub struct AgentsArgs {
    /// Project root
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Config file (default: discover in the project root)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the init command.
#[derive(Args, Debug, Clone)]
pub struct InitArgs {
    /// Output file path
    #[arg(short, long, default_value = ".revgate.yaml")]
    pub output: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

/// Dispatch a parsed command line. Returns the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let result = match cli.command {
        Commands::Review(args) => {
            init_logging(&cli.log);
            run_review(&args, args.pick.clone()).await
        }
        Commands::Agents(args) => {
            init_logging(&cli.log);
            run_agents(&args)
        }
        Commands::Init(args) => {
            init_logging(&cli.log);
            run_init(&args)
        }
        Commands::Shortcut(raw) => run_shortcut(&cli.log, raw).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_ERROR
        }
    }
}

fn init_logging(log: &LogArgs) {
    logging::init_tracing(log.log_json, logging::level_for_verbosity(log.verbose));
}

/// `revgate <agent-id> ...` is `revgate review --pick <agent-id> ...`.
async fn run_shortcut(global: &LogArgs, raw: Vec<String>) -> anyhow::Result<i32> {
    let Some((agent_id, rest)) = raw.split_first() else {
        anyhow::bail!("missing command");
    };

    let registry = agents::AgentRegistry::builtin();
    if registry.get(agent_id).is_none() {
        eprintln!("Error: unknown command or agent {:?}", agent_id);
        eprintln!("Agents: {}", registry.ids().join(", "));
        eprintln!("Run 'revgate --help' for commands");
        return Ok(EXIT_ERROR);
    }

    let parsed = match ShortcutCli::try_parse_from(
        std::iter::once(format!("revgate {}", agent_id)).chain(rest.iter().cloned()),
    ) {
        Ok(parsed) => parsed,
        Err(e) => {
            // Help and version requests land here too.
            let code = if e.use_stderr() { EXIT_ERROR } else { EXIT_SUCCESS };
            let _ = e.print();
            return Ok(code);
        }
    };

    if parsed.review.pick.is_some() {
        eprintln!("Error: --pick cannot be combined with the {} shortcut", agent_id);
        return Ok(EXIT_ERROR);
    }

    init_logging(&LogArgs {
        verbose: global.verbose.max(parsed.log.verbose),
        log_json: global.log_json || parsed.log.log_json,
    });
    run_review(&parsed.review, Some(vec![agent_id.clone()])).await
}

fn canonical_root(root: &Path) -> Option<PathBuf> {
    match root.canonicalize() {
        Ok(p) => Some(p),
        Err(e) => {
            eprintln!("Error: cannot access root {}: {}", root.display(), e);
            None
        }
    }
}

/// Run the review command.
pub async fn run_review(args: &ReviewArgs, pick: Option<Vec<String>>) -> anyhow::Result<i32> {
    let Some(root) = canonical_root(&args.root) else {
        return Ok(EXIT_ERROR);
    };

    let request = ReviewRequest {
        scope: ScopeSpec::parse(args.scope.as_deref(), args.base.clone()),
        pick,
        config_file: args.config.clone(),
        overrides: CliOverrides {
            severity_threshold: args.threshold,
            fail_on: args.fail_on,
            timeout_secs: args.timeout,
            max_concurrency: args.jobs,
        },
    };

    let reviewer = Reviewer::new(&root).with_progress(args.format == OutputFormat::Pretty);

    let (handle, cancel) = Cancellation::new();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling review");
            handle.cancel();
        }
    });
    let result = reviewer.review(&request, cancel).await;
    watcher.abort();

    let run = match result {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(e.exit_code());
        }
    };

    let opts = RenderOptions {
        rendered_at: args.rendered_at.as_deref(),
        show_dropped: args.show_dropped,
    };
    match args.format {
        OutputFormat::Json => println!("{}", report::render_json(&run, opts)?),
        OutputFormat::Sarif => println!("{}", report::render_sarif(&run, opts)?),
        OutputFormat::Pretty => print!("{}", report::render_pretty(&run, opts)?),
    }

    Ok(run.exit_code)
}

/// Run the agents command.
pub fn run_agents(args: &AgentsArgs) -> anyhow::Result<i32> {
    let Some(root) = canonical_root(&args.root) else {
        return Ok(EXIT_ERROR);
    };

    let reviewer = Reviewer::new(&root);
    let config = match reviewer.load_config(args.config.clone(), &CliOverrides::default()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(e.exit_code());
        }
    };

    let files = match ScopeResolver::new(&config).resolve(&ScopeSpec::Full) {
        Ok(scope) => scope.files,
        Err(e) => {
            tracing::debug!(error = %e, "profiling without files");
            Vec::new()
        }
    };
    let profile = profile::profile(&files, config.project_type.as_deref());
    let selected = match agents::select(reviewer.registry(), &profile, &config, None) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Ok(e.exit_code());
        }
    };

    let languages: Vec<&str> = profile.languages.iter().map(String::as_str).collect();
    println!(
        "  {} {}",
        "Languages:".dimmed(),
        if languages.is_empty() {
            "none detected".to_string()
        } else {
            languages.join(", ")
        }
    );
    println!();
    println!(
        "  {:<16}{:<10}{:<10}{}",
        "AGENT".bold(),
        "DEFAULT".bold(),
        "RUNS".bold(),
        "DESCRIPTION".bold()
    );

    for d in reviewer.registry().descriptors() {
        let default = if d.default_enabled { "on" } else { "off" };
        let runs = if selected.contains(&d.id) {
            "yes".green()
        } else if config.is_disabled(d.id) {
            "disabled".red()
        } else {
            "no".dimmed()
        };
        println!("  {:<16}{:<10}{:<10}{}", d.id, default, runs, d.description);
    }

    Ok(EXIT_SUCCESS)
}

/// Run the init command.
pub fn run_init(args: &InitArgs) -> anyhow::Result<i32> {
    if args.output.exists() && !args.force {
        eprintln!("Error: file already exists: {}", args.output.display());
        eprintln!("Use --force to overwrite or --output to pick another path");
        return Ok(EXIT_ERROR);
    }

    if let Some(parent) = args.output.parent() {
        if !parent.as_os_str().is_empty() && parent != Path::new(".") {
            if let Err(e) = std::fs::create_dir_all(parent) {
                eprintln!("Error: failed to create directory: {}", e);
                return Ok(EXIT_ERROR);
            }
        }
    }

    if let Err(e) = std::fs::write(&args.output, CONFIG_TEMPLATE) {
        eprintln!("Error: failed to write config: {}", e);
        return Ok(EXIT_ERROR);
    }

    println!("Created {}", args.output.display());
    println!();
    println!("Next steps:");
    println!("  1. Edit {} to fit your project", args.output.display());
    println!("  2. Run: revgate review full");

    Ok(EXIT_SUCCESS)
}
