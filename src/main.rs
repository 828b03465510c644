use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};

use reader_companion::query::{EndpointConfig, QueryService};
use reader_companion::session::{AskError, Session, SessionUpdate};
use reader_companion::settings::load_settings;
use reader_companion::viewer::{ViewerCommand, ViewerEvent};

#[derive(Parser, Debug)]
#[command(name = "reader-companion")]
struct Args {
    /// PDF document to open
    #[arg(long)]
    file: PathBuf,

    /// Path to the browser-hosted PDF viewer (launched by the host shell)
    #[arg(long)]
    viewer: Option<PathBuf>,

    /// Settings file (YAML or JSON)
    #[arg(long)]
    settings: PathBuf,
}

fn main() -> Result<()> {
    WriteLogger::init(
        LevelFilter::Debug,
        Config::default(),
        File::create("reader-companion.log")?,
    )?;

    let args = Args::parse();
    info!("starting reader companion for {:?}", args.file);

    let settings = load_settings(&args.settings)?;
    let endpoint = EndpointConfig::from_settings(&settings)?;

    let document = open_document(&args.file)?;
    let page_count = document.page_count();
    if let Some(title) = document.title() {
        println!("Opened \"{title}\" ({page_count} pages)");
    } else {
        println!("Opened {:?} ({page_count} pages)", args.file);
    }

    if let Some(viewer) = &args.viewer {
        // Rendering is the embedded viewer's job; we only note where it is
        let url = format!("file:///{}?file={}", viewer.display(), args.file.display());
        info!("viewer url: {url}");
    }

    let query = QueryService::new(endpoint, settings.first_byte_timeout());
    let mut session = Session::new(document, &settings, query);
    session.handle_viewer_event(ViewerEvent::DocumentOpened { page_count });

    println!("Type a question, \":page N\" to move, \":quit\" to exit.");
    repl(&mut session)
}

#[cfg(feature = "pdf")]
fn open_document(path: &PathBuf) -> Result<reader_companion::document::LoadedDocument> {
    use anyhow::Context;
    reader_companion::document::open_document(path)
        .with_context(|| format!("failed to open {path:?}"))
}

#[cfg(not(feature = "pdf"))]
fn open_document(_path: &PathBuf) -> Result<reader_companion::document::LoadedDocument> {
    anyhow::bail!("this build has no PDF support; rebuild with the `pdf` feature")
}

fn repl(session: &mut Session) -> Result<()> {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let input = line.trim();

        if input.is_empty() {
            continue;
        }
        if input == ":quit" || input == ":q" {
            break;
        }
        if let Some(page) = input.strip_prefix(":page ") {
            match page.trim().parse::<usize>() {
                Ok(n) if n >= 1 => {
                    // With no live viewer attached, the command is logged and
                    // the navigation echo applied directly
                    info!("viewer command: {:?}", ViewerCommand::ScrollToPage(n - 1));
                    session.handle_viewer_event(ViewerEvent::Navigated {
                        page: n - 1,
                        selection: None,
                    });
                    println!("(now at page {n})");
                }
                _ => println!("usage: :page N (1-based)"),
            }
            continue;
        }

        match session.ask(input) {
            Ok(_) => stream_answer(session)?,
            Err(err @ AskError::Assemble(_)) => println!("{err}"),
            Err(err @ AskError::NoFocus) => println!("{err}"),
            Err(err) => {
                error!("ask failed: {err}");
                println!("error: {err}");
            }
        }
    }

    info!("shutting down");
    Ok(())
}

fn stream_answer(session: &mut Session) -> Result<()> {
    loop {
        for update in session.poll_updates() {
            match update {
                SessionUpdate::AnswerChunk(text) => {
                    print!("{text}");
                    io::stdout().flush()?;
                }
                SessionUpdate::AnswerComplete => {
                    println!();
                    return Ok(());
                }
                SessionUpdate::QueryFailed(message) => {
                    println!("error: {message}");
                    return Ok(());
                }
            }
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
