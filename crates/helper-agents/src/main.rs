//! Parenting helper CLI
//!
//! ```bash
//! # Which persona would answer this?
//! helper-agents route --text "분유 수유량이 궁금해요"
//!
//! # Interactive chat with automatic persona routing
//! helper-agents chat --age-months 4 --backend anthropic --export chat.json
//!
//! # Diagnose a bad answer with one model, or a whole panel
//! helper-agents debug --persona parenting_expert_v1 --input "..." --output "..."
//! helper-agents debate --persona parenting_expert_v1 --input "..." --output "..." \
//!     --backends openai anthropic gemini
//!
//! # Propose a revised persona file (written to <target>.proposed)
//! helper-agents propose --goal "더 간결하게" --target prompts/parenting_expert_v1.yaml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use coordination::chat::{ChatSession, PersonaSelection};
use coordination::conversation::{ConversationStore, InMemoryConversationStore};
use coordination::debate::{DebateRequest, PanelOrchestrator};
use coordination::dispatch::{BackendId, BackendRegistry};
use coordination::persona::{FsPersonaStore, PersonaId, PersonaStore};
use coordination::router::{IntentRouter, RoutingSignal};
use coordination::tuning::propose_revision;
use helper_agents::config::AppConfig;
use helper_agents::render::{render_report, render_verdict};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file overriding environment defaults (templates, timeouts, models)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the persona the router picks for a message
    Route {
        #[arg(long)]
        text: String,
        /// Recent user messages, newline separated
        #[arg(long, default_value = "")]
        history: String,
        /// Persona chosen on the previous turn
        #[arg(long)]
        previous: Option<String>,
    },
    /// Interactive chat on stdin (empty line or EOF to quit)
    Chat {
        #[arg(long, default_value_t = 3)]
        age_months: u32,
        #[arg(long)]
        backend: Option<BackendId>,
        /// Fixed persona; disables automatic routing
        #[arg(long)]
        persona: Option<String>,
        /// Write the conversation as JSON here when the session ends
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Diagnose one bad output with a single backend
    Debug {
        #[arg(long)]
        persona: String,
        #[arg(long)]
        input: String,
        #[arg(long)]
        output: String,
        #[arg(long)]
        backend: Option<BackendId>,
    },
    /// Panel diagnosis plus cross-examination of the first backend's verdict
    Debate {
        #[arg(long)]
        persona: String,
        #[arg(long)]
        input: String,
        #[arg(long)]
        output: String,
        /// Panel seats in order; the first is the baseline
        #[arg(long, num_args = 1.., required = true)]
        backends: Vec<BackendId>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
    },
    /// Ask a backend to rewrite a persona file toward a goal
    Propose {
        #[arg(long)]
        goal: String,
        #[arg(long)]
        target: PathBuf,
        #[arg(long)]
        backend: Option<BackendId>,
    },
    /// List personas in the prompts directory
    Personas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref())?;
    info!(prompts = %config.prompts_dir.display(), "helper starting");

    match args.command {
        Command::Route {
            text,
            history,
            previous,
        } => {
            let router = IntentRouter::with_config(config.router.clone());
            let decision = router.route(
                RoutingSignal::new(text)
                    .with_history(history)
                    .with_previous(previous.map(PersonaId::new)),
            );
            info!(summary = %decision.summary(), "routed");
            println!("{}", decision.persona);
        }
        Command::Chat {
            age_months,
            backend,
            persona,
            export,
        } => {
            let backend = backend.unwrap_or(config.default_backend);
            let dispatch = require_backend(&config, backend)?;
            let conversations = Arc::new(InMemoryConversationStore::new());
            let conversation = conversations.create("").await?;
            let selection = match persona {
                Some(id) => PersonaSelection::Manual(PersonaId::new(id)),
                None => PersonaSelection::Auto,
            };
            let mut session = ChatSession::new(
                IntentRouter::with_config(config.router.clone()),
                Arc::new(FsPersonaStore::new(&config.prompts_dir)),
                Arc::new(dispatch),
                backend,
            )
            .with_age_months(age_months)
            .with_selection(selection)
            .attach(conversations.clone(), conversation.clone())
            .await?;
            run_chat(&mut session).await?;

            if let Some(path) = export {
                let json = conversations.export(&conversation).await?;
                tokio::fs::write(&path, json)
                    .await
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!(conversation = %conversation, path = %path.display(), "conversation exported");
            }
        }
        Command::Debug {
            persona,
            input,
            output,
            backend,
        } => {
            let backend = backend.unwrap_or(config.default_backend);
            let orchestrator = orchestrator(&config, require_backend(&config, backend)?);
            let verdict = orchestrator
                .diagnose(&PersonaId::new(persona), &input, &output, backend)
                .await
                .context("Diagnosis failed")?;
            println!("{}", render_verdict(&verdict));
        }
        Command::Debate {
            persona,
            input,
            output,
            backends,
            format,
        } => {
            let registry = config.build_registry()?;
            for backend in &backends {
                if !registry.is_registered(*backend) {
                    warn!(backend = %backend, "panelist has no API key; its slots will be failure markers");
                }
            }
            let orchestrator = orchestrator(&config, registry);
            let request = DebateRequest::new(persona, input, output, backends);

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let report = orchestrator
                .run_debate_with_cancel(request, cancel)
                .await
                .context("Debate failed")?;
            match format {
                ReportFormat::Markdown => println!("{}", render_report(&report)),
                ReportFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to encode report")?
                ),
            }
        }
        Command::Propose {
            goal,
            target,
            backend,
        } => {
            let backend = backend.unwrap_or(config.default_backend);
            let dispatch = require_backend(&config, backend)?;
            let original = tokio::fs::read_to_string(&target)
                .await
                .with_context(|| format!("Failed to read {}", target.display()))?;
            let proposed =
                propose_revision(&dispatch, &config.templates, backend, &goal, &original)
                    .await
                    .context("Revision request failed")?;

            let mut out = target.clone().into_os_string();
            out.push(".proposed");
            let out = PathBuf::from(out);
            tokio::fs::write(&out, proposed)
                .await
                .with_context(|| format!("Failed to write {}", out.display()))?;
            info!(path = %out.display(), "proposal written");
            println!("{}", out.display());
        }
        Command::Personas => {
            let store = FsPersonaStore::new(&config.prompts_dir);
            for persona in store.list().await? {
                println!("{}\t{}", persona.id, persona.name);
            }
        }
    }

    Ok(())
}

/// Registry for a single-backend command; a missing key is a configuration error.
fn require_backend(config: &AppConfig, backend: BackendId) -> Result<BackendRegistry> {
    let registry = config.build_registry()?;
    if !registry.is_registered(backend) {
        bail!("backend {backend} is not configured (set its API key)");
    }
    Ok(registry)
}

fn orchestrator(config: &AppConfig, registry: BackendRegistry) -> PanelOrchestrator {
    PanelOrchestrator::new(
        Arc::new(registry),
        Arc::new(FsPersonaStore::new(&config.prompts_dir)),
    )
    .with_templates(config.templates.clone())
    .with_config(config.panel_config())
}

async fn run_chat(session: &mut ChatSession) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("[아기 {}개월] 메시지를 입력하세요 (빈 줄로 종료)", session.age_months());

    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        match session.send(line).await {
            Ok(reply) => {
                eprintln!("({})", reply.persona);
                println!("{}\n", reply.text);
            }
            Err(e) => {
                warn!(error = %e, "chat turn failed");
                eprintln!("오류: {e}");
            }
        }
    }
    Ok(())
}
