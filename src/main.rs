//! Appforge CLI — apply saved AI responses to a local project directory
//! and manage build plans, streaming NDJSON progress events to stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use std::path::PathBuf;

use appforge::planner::create_plan;
use appforge::ticket::{BuildMode, BuildPlan};
use appforge::{
    apply_response, parse_response, DirSandbox, EngineConfig, Sandbox, SandboxSession,
};

#[derive(Parser)]
#[command(name = "appforge", about = "Build orchestration engine for AI-generated app projects")]
struct Cli {
    /// Optional engine config (YAML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a saved AI response and apply it to a project directory.
    Apply {
        /// File containing the raw model response text.
        #[arg(long)]
        response: PathBuf,
        /// Project root to write into.
        #[arg(long)]
        root: PathBuf,
        /// Only print what was parsed; write nothing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Resolve draft tickets (JSON array) into a build plan file.
    Plan {
        /// Draft ticket descriptors, JSON.
        #[arg(long)]
        tickets: PathBuf,
        /// Where to write the resolved plan.
        #[arg(long)]
        out: PathBuf,
        /// Build tickets only on explicit request.
        #[arg(long)]
        manual: bool,
    },
    /// Show plan status and the next buildable ticket.
    Status {
        /// Plan file written by `plan`.
        #[arg(long)]
        plan: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::load(path).context("loading engine config")?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Apply { response, root, dry_run } => {
            let text = std::fs::read_to_string(&response)
                .with_context(|| format!("reading {}", response.display()))?;
            let parsed = parse_response(&text);
            if parsed.files.is_empty() && parsed.commands.is_empty() {
                bail!("no files or commands recovered from the response");
            }
            if dry_run {
                println!("{}", serde_json::to_string_pretty(&parsed)?);
                return Ok(());
            }

            std::fs::create_dir_all(&root)?;
            let sandbox = DirSandbox::new(&root, config.template_target);
            let info = sandbox
                .sandbox_info()
                .context("project root is not usable as a sandbox")?;
            let mut session = SandboxSession::new(&info, &config);

            let stream = apply_response(&sandbox, &mut session, &parsed);
            futures::pin_mut!(stream);
            while let Some(event) = stream.next().await {
                println!("{}", event.to_ndjson_line());
            }
        }
        Commands::Plan { tickets, out, manual } => {
            let text = std::fs::read_to_string(&tickets)
                .with_context(|| format!("reading {}", tickets.display()))?;
            let drafts = serde_json::from_str(&text).context("parsing draft tickets")?;
            let mode = if manual { BuildMode::Manual } else { BuildMode::Auto };
            let plan = create_plan(drafts, mode)?;
            for warning in &plan.warnings {
                eprintln!("warning: {}", warning);
            }
            plan.save(&out)?;
            println!(
                "plan written to {} ({} tickets)",
                out.display(),
                plan.tickets.len()
            );
        }
        Commands::Status { plan } => {
            let plan = BuildPlan::load(&plan)?;
            println!("progress: {}%", plan.progress_percent());
            match plan.next_buildable() {
                Some(ticket) => println!("next buildable: {} ({})", ticket.id, ticket.title),
                None => {
                    let stuck = plan.diagnose_stuck();
                    if stuck.is_empty() {
                        println!("next buildable: none (plan finished or building)");
                    } else {
                        println!("plan is stuck:");
                        for item in stuck {
                            println!(
                                "  {} ({}) waiting on {}",
                                item.id,
                                item.title,
                                item.waiting_on.join(", ")
                            );
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
