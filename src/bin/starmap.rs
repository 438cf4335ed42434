//! StarMap command line
//!
//! # Usage
//!
//! ```bash
//! # Interactive explorer starting at a page
//! starmap explore --start "Rust (programming language)"
//!
//! # Explore a local neighbor dataset instead of Wikipedia
//! starmap --dataset data/words.json explore --start king
//!
//! # Lay out one cluster and print it as JSON
//! starmap layout "Graph theory" --format json
//!
//! # Title completions
//! starmap suggest "Grap"
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use starmap::{FixedStepClock, FrameClock, IntervalClock, ProviderKind, Session, SessionHandle, StarmapConfig};
use starmap_core::{
    build_cluster_layout, EffectSet, LinkMode, NavEvent, NavSnapshot, NodeKind, NoticeLevel,
};
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "starmap")]
#[command(version)]
#[command(about = "Explore a link graph as a field of stars")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (YAML)
    #[arg(long, global = true, env = "STARMAP_CONFIG")]
    config: Option<PathBuf>,

    /// Use a local JSON neighbor dataset instead of the configured provider
    #[arg(long, global = true, env = "STARMAP_DATASET")]
    dataset: Option<PathBuf>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive explorer
    Explore {
        /// Page to start from
        #[arg(short, long)]
        start: Option<String>,

        /// Skip animation timing (frames advance instantly)
        #[arg(long)]
        instant: bool,
    },

    /// Fetch one neighbor set and print its layout
    Layout {
        title: String,

        /// Lay out pages linking here instead of outgoing links
        #[arg(long)]
        backlinks: bool,

        #[arg(long, short = 'o', default_value = "pretty", value_enum)]
        format: OutputFormat,
    },

    /// Title completions for a prefix
    Suggest {
        prefix: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "starmap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => StarmapConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StarmapConfig::load()?,
    };
    if let Some(dataset) = cli.dataset {
        config.provider.kind = ProviderKind::Local;
        config.provider.dataset_path = Some(dataset);
    }
    config.validate()?;

    match cli.command {
        Commands::Explore { start, instant } => cmd_explore(&config, start, instant).await,
        Commands::Layout {
            title,
            backlinks,
            format,
        } => cmd_layout(&config, &title, backlinks, format).await,
        Commands::Suggest { prefix, limit } => cmd_suggest(&config, &prefix, limit).await,
    }
}

// =============================================================================
// LAYOUT / SUGGEST
// =============================================================================

async fn cmd_layout(
    config: &StarmapConfig,
    title: &str,
    backlinks: bool,
    format: OutputFormat,
) -> Result<()> {
    let provider = config.build_provider()?;
    let mode = LinkMode::from_backlinks(backlinks);
    let set = provider.fetch_neighbor_set(title, mode).await?;
    let layout = build_cluster_layout(&config.layout, &set, None, &HashSet::new());

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&layout)?),
        OutputFormat::Pretty => {
            println!("{} ({})", layout.center.bold(), mode);
            for node in &layout.nodes {
                if node.kind == NodeKind::Center {
                    continue;
                }
                let p = node.position;
                println!(
                    "  {:>3}  {:<40} r={:>5.1}  ({:>6.1}, {:>6.1}, {:>6.1})  a={:.2}",
                    node.rank,
                    node.title,
                    p.length(),
                    p.x,
                    p.y,
                    p.z,
                    node.opacity
                );
            }
        }
    }
    Ok(())
}

async fn cmd_suggest(config: &StarmapConfig, prefix: &str, limit: usize) -> Result<()> {
    let provider = config.build_provider()?;
    for title in provider.suggest(prefix, limit).await {
        println!("{title}");
    }
    Ok(())
}

// =============================================================================
// EXPLORE
// =============================================================================

const HELP: &str = "\
commands:
  search <title>     start over at <title>
  <n> | to <title>   travel to neighbor n (or by title)
  swap <title>       travel without adding to history
  back | fwd         step through history
  jump <i>           jump to breadcrumb i
  backlinks on|off   show pages linking here
  trail on|off       keep ghost clusters
  ls                 neighbors of the current center
  crumbs             breadcrumbs
  info [title]       page summary
  suggest <prefix>   title completions
  quit";

async fn cmd_explore(config: &StarmapConfig, start: Option<String>, instant: bool) -> Result<()> {
    let provider = config.build_provider()?;
    let clock: Box<dyn FrameClock> = if instant {
        Box::new(FixedStepClock::new(Duration::from_millis(
            config.transition.duration_ms.max(1),
        )))
    } else {
        Box::new(IntervalClock::new(config.transition.frame_interval()))
    };
    let handle = Session::spawn(config.navigator_config(), provider, clock);
    tokio::spawn(print_events(handle.subscribe(), handle.watch()));

    if let Some(title) = start {
        search(&handle, &title).await?;
    }

    let mut rl = DefaultEditor::new()?;
    println!("{}", "StarMap - type 'help' for commands".dimmed());
    loop {
        let prompt = prompt_for(&handle.snapshot());
        let line = match tokio::task::block_in_place(|| rl.readline(&prompt)) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(line);

        match execute(&handle, line).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("{} {:#}", "!".red().bold(), e),
        }
    }

    handle.shutdown().await;
    Ok(())
}

fn prompt_for(snapshot: &NavSnapshot) -> String {
    match &snapshot.current_center {
        Some(center) => format!("{} > ", center),
        None => "> ".to_string(),
    }
}

async fn search(handle: &SessionHandle, title: &str) -> Result<()> {
    handle.start_fresh_search(title).await?;
    let snapshot = handle.wait_until_idle().await?;
    print_neighbors(&snapshot);
    Ok(())
}

/// Run one REPL line. `Ok(false)` ends the loop.
async fn execute(handle: &SessionHandle, line: &str) -> Result<bool> {
    let (cmd, arg) = match line.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, arg.trim()),
        None => (line, ""),
    };

    let moved = match cmd {
        "quit" | "exit" | "q" => return Ok(false),
        "help" | "?" => {
            println!("{HELP}");
            false
        }
        "search" | "go" => {
            require(arg, "search <title>")?;
            handle.start_fresh_search(arg).await?
        }
        "to" => {
            require(arg, "to <title>")?;
            handle.follow_neighbor(arg).await?
        }
        "swap" => {
            require(arg, "swap <title>")?;
            handle.travel_to_neighbor(arg, false).await?
        }
        "back" | "b" => {
            let moved = handle.go_back_one().await?;
            if !moved {
                println!("{}", "already at the start".dimmed());
            }
            moved
        }
        "fwd" | "forward" | "f" => {
            let moved = handle.go_forward_one().await?;
            if !moved {
                println!("{}", "already at the end".dimmed());
            }
            moved
        }
        "jump" => {
            let index: usize = arg.parse().context("jump <index>")?;
            handle.jump_to_breadcrumb(index).await?
        }
        "backlinks" => handle.set_show_backlinks(on_off(arg)?).await?,
        "trail" => {
            let effects = handle.set_trail_mode(on_off(arg)?).await?;
            println!("{}", format!("trail {} ({:?})", arg, effects).dimmed());
            false
        }
        "ls" => {
            print_neighbors(&handle.snapshot());
            false
        }
        "crumbs" => {
            print_breadcrumbs(&handle.snapshot());
            false
        }
        "info" => {
            let snapshot = handle.snapshot();
            let title = if arg.is_empty() {
                snapshot.current_center.as_deref().unwrap_or_default()
            } else {
                arg
            };
            require(title, "info <title>")?;
            let summary = handle.summary(title).await;
            println!("{}", summary.title.bold());
            if summary.extract.is_empty() {
                println!("{}", "(no summary)".dimmed());
            } else {
                println!("{}", summary.extract);
            }
            false
        }
        "suggest" => {
            require(arg, "suggest <prefix>")?;
            for title in handle.suggest(arg, 10).await {
                println!("  {title}");
            }
            false
        }
        other => match other.parse::<usize>() {
            Ok(n) => {
                let snapshot = handle.snapshot();
                let Some(title) = n.checked_sub(1).and_then(|i| snapshot.neighbors.get(i)) else {
                    bail!("no neighbor {n}");
                };
                handle.follow_neighbor(title.clone()).await?
            }
            Err(_) => bail!("unknown command '{other}' (try 'help')"),
        },
    };

    if moved {
        let snapshot = handle.wait_until_idle().await?;
        print_neighbors(&snapshot);
    }
    Ok(true)
}

fn require(arg: &str, usage: &str) -> Result<()> {
    if arg.is_empty() {
        bail!("usage: {usage}");
    }
    Ok(())
}

fn on_off(arg: &str) -> Result<bool> {
    match arg {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => bail!("expected on|off"),
    }
}

fn print_neighbors(snapshot: &NavSnapshot) {
    let Some(center) = &snapshot.current_center else {
        println!("{}", "no center yet - try 'search <title>'".dimmed());
        return;
    };
    let mode = if snapshot.show_backlinks { "backlinks" } else { "links" };
    println!("{} {}", center.bold().yellow(), format!("({mode})").dimmed());
    for (i, title) in snapshot.neighbors.iter().enumerate() {
        let visited = snapshot.visited.binary_search(title).is_ok();
        let label = if visited {
            title.dimmed().to_string()
        } else {
            title.to_string()
        };
        println!("  {:>2}. {}", i + 1, label);
    }
    if let Some(prev) = &snapshot.chain_prev {
        println!("  {}  {}", "<-".cyan(), prev.cyan());
    }
}

fn print_breadcrumbs(snapshot: &NavSnapshot) {
    for crumb in &snapshot.breadcrumbs {
        let marker = if crumb.active { "*" } else { " " };
        println!("  {} {:>2} {}", marker.green(), crumb.index, crumb.title);
    }
}

async fn print_events(
    mut events: broadcast::Receiver<NavEvent>,
    snapshots: watch::Receiver<NavSnapshot>,
) {
    loop {
        match events.recv().await {
            Ok(NavEvent::Committed { effects, .. }) => {
                if let Some(line) = after_commit(effects, &snapshots.borrow()) {
                    println!("{}", line.dimmed());
                }
            }
            Ok(event) => print_event(&event),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &NavEvent) {
    match event {
        NavEvent::Loading { title } => println!("{} {}", "..".dimmed(), title.dimmed()),
        NavEvent::TransitionStarted(plan) => println!(
            "{} {} {}",
            "~>".cyan(),
            plan.incoming.title.cyan(),
            format!("({} ms)", plan.duration_ms).dimmed()
        ),
        NavEvent::ClusterGhosted { title } => println!("{} {}", "ghost".dimmed(), title.dimmed()),
        NavEvent::Notice(notice) => match notice.level {
            NoticeLevel::Error => println!("{} {}", "!".red().bold(), notice.message.red()),
            NoticeLevel::Info => println!("{} {}", "i".blue(), notice.message),
        },
        NavEvent::SceneReset
        | NavEvent::ClusterBuilt(_)
        | NavEvent::ClusterRebuilt(_)
        | NavEvent::Frame(_)
        | NavEvent::ClusterRemoved { .. }
        | NavEvent::Committed { .. } => {}
    }
}

/// Status line printed once a travel commits.
fn after_commit(effects: EffectSet, snapshot: &NavSnapshot) -> Option<String> {
    if effects.needs_breadcrumb_refresh() {
        Some(crumb_trail(snapshot))
    } else if effects.scene_changed() {
        Some(format!("scene: {} ghost(s)", snapshot.ghosts.len()))
    } else {
        None
    }
}

fn crumb_trail(snapshot: &NavSnapshot) -> String {
    snapshot
        .breadcrumbs
        .iter()
        .map(|crumb| {
            if crumb.active {
                format!("[{}]", crumb.title)
            } else {
                crumb.title.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" > ")
}
