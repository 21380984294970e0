use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use lab_notebook_lib::analysis::{format_confidence, AnalysisView};
use lab_notebook_lib::delta::diff;
use lab_notebook_lib::models::{BlockKind, SaveOutcome};
use lab_notebook_lib::report::build_readable_report;
use lab_notebook_lib::settings::{load_settings, update_settings};
use lab_notebook_lib::{default_data_dir, init_tracing, open_notebook, open_persistence};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "lab-notebook")]
#[command(about = "Inspect and sync a lab notebook stored on disk")]
struct Args {
    /// Directory holding the notebook store and logs
    #[arg(long, env = "LAB_NOTEBOOK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Title, timestamps and sync state
    Status,
    /// Current snapshot as JSON
    Snapshot,
    /// Page regions in render order
    Tree,
    /// Readable summary of the whole notebook
    Report,
    SetTitle {
        title: String,
    },
    /// Replace the document markup
    SetDocument {
        html: String,
    },
    AddBlock {
        #[arg(value_parser = parse_kind)]
        kind: BlockKind,
    },
    RemoveBlock {
        #[arg(value_parser = parse_kind)]
        kind: BlockKind,
        id: String,
    },
    /// Store a block payload given as JSON
    SetPayload {
        #[arg(value_parser = parse_kind)]
        kind: BlockKind,
        id: String,
        payload: String,
    },
    /// Send the notebook to the save endpoint
    Save,
    /// Run the analysis and print the result summary
    Analyze,
    /// Delete every notebook key
    Reset,
    /// Print settings, or deep-merge a JSON patch into them
    Settings {
        patch: Option<String>,
    },
}

fn parse_kind(value: &str) -> Result<BlockKind, String> {
    BlockKind::parse(value).ok_or_else(|| format!("unknown block kind '{value}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
    init_tracing(&data_dir)?;

    if let Command::Settings { patch } = &args.command {
        let persistence = open_persistence(&data_dir)?;
        let settings = match patch {
            Some(patch) => {
                let patch: serde_json::Value = serde_json::from_str(patch).context("settings patch is not valid json")?;
                update_settings(&persistence, patch)?
            }
            None => load_settings(&persistence),
        };
        println!("{}", serde_json::to_string_pretty(&settings)?);
        return Ok(());
    }

    let notebook = open_notebook(&data_dir)?;
    match args.command {
        Command::Status => {
            let status = serde_json::json!({
                "metadata": notebook.metadata(),
                "sync": notebook.sync_status(),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Snapshot => {
            println!("{}", serde_json::to_string_pretty(&notebook.snapshot())?);
        }
        Command::Tree => {
            println!("{}", serde_json::to_string_pretty(&notebook.render_tree())?);
        }
        Command::Report => {
            let snapshot = notebook.snapshot();
            println!("{}", build_readable_report(&diff(&snapshot, None), &snapshot, Utc::now()));
        }
        Command::SetTitle { title } => notebook.set_title(title),
        Command::SetDocument { html } => {
            notebook.update_document(html);
            notebook.flush();
        }
        Command::AddBlock { kind } => println!("{}", notebook.add_block(kind)),
        Command::RemoveBlock { kind, id } => {
            if !notebook.remove_block(kind, &id) {
                anyhow::bail!("no {} block with id {}", kind.as_str(), id);
            }
        }
        Command::SetPayload { kind, id, payload } => {
            let payload: serde_json::Value = serde_json::from_str(&payload).context("payload is not valid json")?;
            notebook.save_block_payload(kind, &id, payload)?;
        }
        Command::Save => match notebook.save().await? {
            SaveOutcome::Synced { saved_at, .. } => println!("saved at {}", saved_at.to_rfc3339()),
            SaveOutcome::NoChanges => println!("no changes to save"),
            SaveOutcome::AlreadySyncing => println!("a save is already in progress"),
        },
        Command::Analyze => {
            let outcome = notebook.analyze()?;
            tracing::info!(?outcome, "analysis triggered");
            let mut view = AnalysisView::new();
            view.activate(notebook.analysis_provider().as_ref(), &CancellationToken::new())
                .await;
            match (&view.analysis, &view.error) {
                (_, Some(error)) => anyhow::bail!("{error}"),
                (Some(analysis), None) => {
                    println!(
                        "{} (confidence {})",
                        analysis.breakthrough_summary.as_deref().unwrap_or("No summary"),
                        format_confidence(analysis.confidence)
                    );
                    for step in &analysis.next_steps {
                        println!("- {step}");
                    }
                }
                (None, None) => println!("no analysis available"),
            }
        }
        Command::Reset => notebook.reset(),
        Command::Settings { .. } => {}
    }
    Ok(())
}
