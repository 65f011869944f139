//! Command-line driver: parses a batch request, runs it through the
//! orchestrator, and streams progress snapshots to stderr.

use anyhow::{bail, Context, Result};
use porter_core::{
    DeleteOptions, EngineConfig, Orchestrator, ProcessEvent, ProcessSnapshot, TransferMode,
};
use std::path::PathBuf;

const USAGE: &str = "\
Usage:
  file_porter copy <SOURCE>... <DEST_DIR>
  file_porter move <SOURCE>... <DEST_DIR>
  file_porter delete [--trash | --permanent] <TARGET>...
";

enum Request {
    Paste {
        mode: TransferMode,
        sources: Vec<PathBuf>,
        destination: PathBuf,
    },
    Delete {
        use_trash: bool,
        targets: Vec<PathBuf>,
    },
}

pub fn run(config: EngineConfig) -> Result<()> {
    let request = parse_args(std::env::args().skip(1).collect())?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(async {
        let orchestrator = porter_core::init(config);
        execute(&orchestrator, request).await
    })
}

fn parse_args(args: Vec<String>) -> Result<Request> {
    let Some((command, rest)) = args.split_first() else {
        bail!("{}", USAGE);
    };

    match command.as_str() {
        "copy" | "move" => {
            let Some((destination, sources)) = rest.split_last() else {
                bail!("{}", USAGE);
            };
            if sources.is_empty() {
                bail!("{}", USAGE);
            }
            let mode = if command == "copy" {
                TransferMode::Copy
            } else {
                TransferMode::Move
            };
            let destination = PathBuf::from(destination);
            let sources = sources.iter().map(PathBuf::from).collect();
            Ok(Request::Paste {
                mode,
                sources,
                destination,
            })
        }
        "delete" => {
            let mut use_trash = true;
            let mut targets = Vec::new();
            for arg in rest {
                match arg.as_str() {
                    "--trash" => use_trash = true,
                    "--permanent" => use_trash = false,
                    _ => targets.push(PathBuf::from(arg)),
                }
            }
            if targets.is_empty() {
                bail!("{}", USAGE);
            }
            Ok(Request::Delete { use_trash, targets })
        }
        _ => bail!("{}", USAGE),
    }
}

async fn execute(orchestrator: &Orchestrator, request: Request) -> Result<()> {
    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                ProcessEvent::Progress(snapshot) => print_progress(&snapshot),
                ProcessEvent::Finished(_) => break,
                _ => {}
            }
        }
    });

    let id = match request {
        Request::Paste {
            mode,
            sources,
            destination,
        } => orchestrator.paste_files(sources, destination, mode).await?,
        Request::Delete { use_trash, targets } => {
            // The command line is the confirmation dialog here.
            orchestrator.schedule_delete(targets, DeleteOptions::pre_authorized(use_trash))
        }
    };

    let snapshot = orchestrator.wait(&id).await?;
    printer.abort();
    print_final(&snapshot)
}

fn print_progress(snapshot: &ProcessSnapshot) {
    if let ProcessSnapshot::Paste(paste) = snapshot {
        let percent = if paste.total_bytes > 0 {
            paste.processed_bytes * 100 / paste.total_bytes
        } else {
            0
        };
        eprintln!(
            "{}% ({} / {} bytes, {} ms)",
            percent, paste.processed_bytes, paste.total_bytes, paste.elapsed_ms
        );
    }
}

fn print_final(snapshot: &ProcessSnapshot) -> Result<()> {
    match snapshot {
        ProcessSnapshot::Paste(paste) => match paste.error {
            None => {
                eprintln!(
                    "Done: {} bytes in {} ms",
                    paste.processed_bytes, paste.elapsed_ms
                );
                Ok(())
            }
            Some(ref error) => bail!("{}", error),
        },
        ProcessSnapshot::Delete(delete) => match delete.error {
            None => {
                eprintln!("Deleted {} target(s)", delete.target_names.len());
                Ok(())
            }
            Some(ref error) => bail!("{}", error),
        },
    }
}
