use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use langcore::HighlightMode;
use litecode::{
    Config, Document, EngineEvent, OutputSink, RunDispatch, RunId, Session, SessionState,
};
use live_preview::PreviewServer;
use log::LevelFilter;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

#[derive(Parser)]
#[command(name = "litecode", version, about = "Run, debug, preview and inspect source files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a file with its language's runner
    Run {
        file: PathBuf,
        /// Wall-clock limit in seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Print the breakpoint walk-through for a file
    Debug {
        file: PathBuf,
        /// 1-based line numbers
        #[arg(long = "break", value_name = "LINE")]
        breakpoints: Vec<usize>,
    },
    /// Serve a directory for live preview until interrupted
    Serve {
        dir: PathBuf,
        #[arg(long)]
        port: Option<u16>,
        /// Document whose URL is printed
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Search every file under a folder for a literal term
    Find {
        term: String,
        #[arg(long)]
        root: Option<PathBuf>,
    },
    /// List a folder recursively
    Tree { root: Option<PathBuf> },
    /// Print the highlight spans of a file
    Highlight {
        file: PathBuf,
        /// Independent overlapping passes instead of the tokenizer
        #[arg(long)]
        layered: bool,
    },
    /// Fold at a 1-based line and print the displayed text
    Fold { file: PathBuf, line: usize },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut logger = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        logger.filter_level(LevelFilter::Info);
        logger.filter_module("litecode", LevelFilter::Debug);
    }
    logger.init();

    let cli = Cli::parse();
    let mut config = Config::load().await?;

    if let Command::Run {
        timeout: Some(secs), ..
    } = &cli.command
    {
        config.execution.timeout_secs = *secs;
        config.validate()?;
    }

    let state_path = SessionState::default_path();
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let registry = config.load_registry().await;
    let (mut session, mut events) = Session::new(config, registry, cwd.clone());

    let outcome = execute(&mut session, &mut events, cli.command, &cwd).await;

    let mut keep_going = |_: &Document| true;
    if let Err(e) = session.shutdown(&mut keep_going, state_path.as_deref()).await {
        log::warn!("Failed to close session cleanly: {}", e);
    }
    outcome
}

async fn execute(
    session: &mut Session,
    events: &mut mpsc::UnboundedReceiver<EngineEvent>,
    command: Command,
    cwd: &Path,
) -> Result<()> {
    match command {
        Command::Run { file, .. } => {
            let id = session.open(&file)?;
            let dispatch = session.run(id).await?;
            let sink = follow(events, dispatch.run()).await;
            print!("{}", sink.text());
            if let RunDispatch::Preview { .. } = dispatch {
                tokio::signal::ctrl_c()
                    .await
                    .context("Failed to listen for Ctrl-C")?;
            }
            match sink.last_outcome() {
                Some(outcome) if outcome.is_success() => Ok(()),
                _ => anyhow::bail!("{} did not run successfully", file.display()),
            }
        }
        Command::Debug { file, breakpoints } => {
            let id = session.open(&file)?;
            for line in breakpoints.into_iter().filter(|l| *l > 0) {
                session.toggle_breakpoint(id, line - 1)?;
            }
            let run = session.debug(id)?;
            let sink = follow(events, run).await;
            print!("{}", sink.text());
            Ok(())
        }
        Command::Find { term, root } => {
            if let Some(root) = root {
                session.open_folder(&root)?;
            }
            println!("{}", session.find_in_files(&term));
            Ok(())
        }
        Command::Tree { root } => {
            session.open_folder(root.as_deref().unwrap_or(cwd))?;
            for entry in session.tree()? {
                let marker = if entry.is_dir { "/" } else { "" };
                println!(
                    "{}{}{}",
                    "  ".repeat(entry.depth.saturating_sub(1)),
                    entry.name(),
                    marker
                );
            }
            Ok(())
        }
        Command::Highlight { file, layered } => {
            let id = session.open(&file)?;
            let mode = if layered {
                HighlightMode::Layered
            } else {
                HighlightMode::Tokenized
            };
            let text = session.documents().get(id)?.text();
            for span in session.highlight(id, mode)? {
                println!(
                    "{}..{}\t{}\t{:?}",
                    span.start,
                    span.end,
                    span.tag,
                    span.text(&text)
                );
            }
            Ok(())
        }
        Command::Fold { file, line } => {
            let id = session.open(&file)?;
            let change = session.toggle_fold(id, line.saturating_sub(1))?;
            log::debug!("Fold at line {}: {:?}", line, change);
            println!("{}", session.documents().displayed_text(id)?);
            Ok(())
        }
        Command::Serve { dir, port, file } => {
            let port = port.unwrap_or(session.config().preview.port);
            serve(&dir, port, file.as_deref()).await
        }
    }
}

/// Apply engine events until `run` finishes.
async fn follow(events: &mut mpsc::UnboundedReceiver<EngineEvent>, run: RunId) -> OutputSink {
    let mut sink = OutputSink::new();
    while let Some(event) = events.recv().await {
        let finished = matches!(&event, EngineEvent::RunFinished { run: r, .. } if *r == run);
        sink.apply(event);
        if finished {
            break;
        }
    }
    sink
}

async fn serve(dir: &Path, port: u16, file: Option<&Path>) -> Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Cannot serve {}", dir.display()))?;
    let file = file.map(|f| dir.join(f));

    let mut server = PreviewServer::new();
    let url = server.start(&dir, port, file.as_deref()).await?;
    println!("Live server running at {}", url);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    server.stop().await;
    Ok(())
}
