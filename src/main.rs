use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use flexpilot::agent_workflow::{AgentWorkflow, WorkflowOutcome};
use flexpilot::chat::PanelChat;
use flexpilot::checkpoint::CheckpointStore;
use flexpilot::cli::{Cli, Command, HistoryAction};
use flexpilot::editing_session::{AutoApprove, ConfirmChange, EditingRequest, EditingSession};
use flexpilot::llm::LanguageModel;
use flexpilot::prompt_builder::ChatTurn;
use flexpilot::session_history::{HistoryFilter, JsonFileStore, SessionHistoryManager};
use flexpilot::tool_registry::ToolRegistry;
use flexpilot::tools::ToolContext;
use flexpilot::ui::{
    ConsoleSink, TerminalConfirm, ask_yes_no, display_user_message, format_tool_entry,
};
use flexpilot::web::WebSearch;
use flexpilot::workspace::{LocalWorkspace, Workspace, to_uri};
use flexpilot::{Config, client, config, diff, patch};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Cancels the returned token on Ctrl+C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n{}", style("Cancelling...").yellow());
            child.cancel();
        }
    });
    token
}

/// Everything a request needs, wired from the config.
struct Services {
    model: Arc<dyn LanguageModel>,
    workspace: Arc<dyn Workspace>,
    ctx: ToolContext,
    registry: Arc<ToolRegistry>,
    checkpoints: Arc<CheckpointStore>,
    history: Arc<SessionHistoryManager>,
    web_search: Option<Arc<WebSearch>>,
}

impl Services {
    fn new(config: &Config, workspace: Arc<dyn Workspace>) -> Result<Self> {
        let model: Arc<dyn LanguageModel> = Arc::new(client::initialize_model(config)?);
        let web_search = match WebSearch::from_config(&config.web_search) {
            Ok(web_search) => Some(Arc::new(web_search.with_model(model.clone()))),
            Err(e) => {
                tracing::debug!(error = %e, "web search disabled");
                None
            }
        };

        let mut ctx = ToolContext::new(workspace.clone())
            .with_allowed_command_prefixes(config.allowed_command_prefixes.clone());
        if let Some(web_search) = &web_search {
            ctx = ctx.with_web_search(web_search.clone());
        }

        Ok(Self {
            model,
            checkpoints: Arc::new(CheckpointStore::new(workspace.clone())),
            workspace,
            ctx,
            registry: Arc::new(ToolRegistry::with_builtin_tools()?),
            history: open_history()?,
            web_search,
        })
    }
}

fn open_history() -> Result<Arc<SessionHistoryManager>> {
    let store = JsonFileStore::in_data_dir()?;
    Ok(Arc::new(SessionHistoryManager::new(Box::new(store))?))
}

async fn run_edit(config: &Config, services: Services, root: &Path, prompt: &str, files: &[PathBuf]) -> Result<()> {
    let confirm: Arc<dyn ConfirmChange> = if config.auto_apply_edits {
        Arc::new(AutoApprove)
    } else {
        Arc::new(TerminalConfirm)
    };
    let working_set = files.iter().map(|file| to_uri(&root.join(file))).collect();
    let session = EditingSession::new(
        services.model,
        services.registry,
        services.ctx,
        services.checkpoints,
        confirm,
    )
    .with_history(services.history)
    .with_max_tool_rounds(config.max_tool_rounds);

    display_user_message(prompt);
    let request = EditingRequest::new(prompt).with_working_set(working_set);
    let outcome = session.handle(&request, &ConsoleSink, &cancel_on_ctrl_c()).await;
    println!();
    if let Some(error) = outcome.error {
        anyhow::bail!(error);
    }
    for uri in &outcome.modified_files {
        println!("{}", style(format!("modified: {uri}")).green());
    }
    Ok(())
}

async fn run_chat(services: Services, prompt: &str) -> Result<()> {
    let mut chat = PanelChat::new(services.model, services.workspace).with_history(services.history);
    if let Some(web_search) = services.web_search {
        chat = chat.with_web_search(web_search);
    }

    display_user_message(prompt);
    let outcome = chat.respond(&[], prompt, &ConsoleSink, &cancel_on_ctrl_c()).await;
    println!();
    if let Some(error) = outcome.error {
        anyhow::bail!(error);
    }

    let turn = ChatTurn::new(outcome.request, outcome.response);
    if let Some(title) = chat.provide_title(&turn).await {
        println!("{} {}", style("title:").dim(), title);
    }
    if let Some(question) = chat.provide_followup(&[], &turn).await {
        println!("{} {}", style("follow-up:").dim(), question);
    }
    Ok(())
}

async fn run_agent(services: Services, prompt: &str) -> Result<()> {
    let checkpoints = services.checkpoints.clone();
    let workflow = AgentWorkflow::new(services.registry, services.ctx, services.checkpoints);

    display_user_message(prompt);
    let outcome = workflow.run(prompt, &ConsoleSink, &cancel_on_ctrl_c()).await;
    println!();
    match &outcome {
        WorkflowOutcome::Done(steps) => {
            println!("{}", style(format!("Completed {} step(s)", steps.len())).green());
        }
        WorkflowOutcome::Cancelled(steps) => {
            println!(
                "{}",
                style(format!("Operation cancelled after {} step(s)", steps.len())).yellow()
            );
        }
        WorkflowOutcome::Failed { message, .. } => {
            eprintln!("{}", style(message).red());
        }
    }

    for path in checkpoints.pending() {
        let keep = ask_yes_no(&format!("Keep agent changes to {}?", path.display())).await?;
        if !keep && checkpoints.restore(&path).await? {
            println!("{}", style(format!("Checkpoint restored for {}", path.display())).yellow());
        }
        checkpoints.clear(&path)?;
    }
    Ok(())
}

fn run_patch(root: &Path, file: &Path, blocks: Option<&Path>) -> Result<()> {
    let path = root.join(file);
    let content = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let blocks = match blocks {
        Some(source) if source != Path::new("-") => std::fs::read_to_string(root.join(source))
            .with_context(|| format!("Failed to read {}", source.display()))?,
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };

    let outcome = patch::apply_blocks(&content, &blocks);
    if outcome.is_noop() {
        println!("{}", style(format!("No matching blocks found in {}", path.display())).yellow());
        return Ok(());
    }
    println!("{}", diff::render_diff(&content, &outcome.content));
    std::fs::write(&path, &outcome.content)?;
    println!(
        "{}",
        style(format!(
            "Applied {} search/replace block(s) to {} ({} skipped)",
            outcome.applied,
            path.display(),
            outcome.skipped
        ))
        .green()
    );
    Ok(())
}

fn print_tools() -> Result<()> {
    let registry = ToolRegistry::with_builtin_tools()?;
    for tool in registry.tools() {
        println!("{}", format_tool_entry(tool));
    }
    println!("{}", style(format!("{} tools", registry.len())).dim());
    Ok(())
}

fn run_history(action: HistoryAction) -> Result<()> {
    let history = open_history()?;
    match action {
        HistoryAction::List { kind } => {
            if history.is_empty() {
                println!("{}", style("No sessions recorded").dim());
                return Ok(());
            }
            let filter = HistoryFilter {
                kind,
                ..HistoryFilter::default()
            };
            let entries = history.list(&filter);
            for entry in &entries {
                let when = chrono::DateTime::from_timestamp_millis(entry.timestamp)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{} {} {:?} {}",
                    style(&entry.id).dim(),
                    when,
                    entry.kind,
                    entry.request.lines().next().unwrap_or_default()
                );
                for file in &entry.modified_files {
                    println!("    {}", style(file).green());
                }
            }
            println!(
                "{}",
                style(format!("{} of {} session(s)", entries.len(), history.len())).dim()
            );
        }
        HistoryAction::Show { id } => match history.get(&id) {
            Some(entry) => {
                println!("[{}]", style("user").blue());
                println!("{}", entry.request);
                println!("[{}]", style("assistant").magenta());
                println!("{}", entry.response);
            }
            None => println!("{}", style(format!("No session {id}")).yellow()),
        },
        HistoryAction::Remove { id } => {
            if history.remove(&id)? {
                println!("Removed {id}");
            } else {
                println!("{}", style(format!("No session {id}")).yellow());
            }
        }
        HistoryAction::Clear => {
            history.clear()?;
            println!("History cleared");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let root = match &cli.workspace {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    match cli.command {
        Command::Tools => print_tools(),
        Command::History { action } => run_history(action),
        Command::Patch { file, blocks } => run_patch(&root, &file, blocks.as_deref()),
        command => {
            let mut config = config::load_or_create()?;
            if let Some(model) = cli.model {
                config.model = model;
            }
            tracing::info!(backend = ?config.backend, model = %config.model, "starting");

            let workspace: Arc<dyn Workspace> = Arc::new(
                LocalWorkspace::new(&root)
                    .with_ignored_paths(config.ignored_paths.clone())
                    .with_diagnostics_command(config.diagnostics_command.clone()),
            );
            let services = Services::new(&config, workspace)?;
            match command {
                Command::Edit { prompt, files } => run_edit(&config, services, &root, &prompt, &files).await,
                Command::Chat { prompt } => run_chat(services, &prompt).await,
                Command::Agent { prompt } => run_agent(services, &prompt).await,
                Command::Tools | Command::History { .. } | Command::Patch { .. } => Ok(()),
            }
        }
    }
}
