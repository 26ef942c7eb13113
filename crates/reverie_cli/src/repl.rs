//! Interactive terminal session.
//!
//! Line editing runs on its own thread; each line is handed to the async
//! side, which acknowledges it once the reply is printed so the next prompt
//! never lands in the middle of a streamed answer. Accepted thoughts are
//! printed as they arrive.

use crate::commands::{self, Command, HELP};
use anyhow::Result;
use reverie_reasoning::{Mind, ThoughtEvent};
use rustyline::error::ReadlineError;
use rustyline::{DefaultEditor, ExternalPrinter};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};

const PROMPT: &str = "you> ";

type SharedPrinter = Arc<Mutex<Box<dyn ExternalPrinter + Send>>>;

/// Prints above the active prompt when the terminal supports it, plain
/// stdout otherwise.
#[derive(Clone)]
struct Output {
    printer: Option<SharedPrinter>,
}

impl Output {
    fn line(&self, text: String) {
        if let Some(printer) = &self.printer {
            if let Ok(mut p) = printer.lock() {
                match p.print(text.clone()) {
                    Ok(()) => return,
                    Err(e) => tracing::debug!("External printer failed: {}", e),
                }
            }
        }
        println!("{}", text);
    }
}

pub async fn run(mind: Arc<Mind>, history: Option<PathBuf>) -> Result<()> {
    let (line_tx, mut line_rx) = mpsc::channel::<Option<String>>(1);
    let (ack_tx, ack_rx) = std_mpsc::channel::<()>();
    let (printer_tx, printer_rx) = oneshot::channel();
    let reader = std::thread::spawn(move || read_lines(line_tx, ack_rx, printer_tx, history));

    let output = Output {
        printer: printer_rx.await.ok().flatten(),
    };
    let feed = tokio::spawn(print_thoughts(mind.subscribe(), output.clone()));

    println!("Type a message to chat, /help for commands.");
    let mut interrupted = false;
    loop {
        let line = tokio::select! {
            line = line_rx.recv() => line.flatten(),
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                None
            }
        };
        let Some(line) = line else {
            break;
        };

        if !dispatch(&mind, &output, commands::parse(&line)).await {
            break;
        }
        if ack_tx.send(()).is_err() {
            break;
        }
    }

    feed.abort();
    drop(ack_tx);
    drop(line_rx);
    // After a quit the reader is only waiting for its ack; let it save the
    // history. On Ctrl-C it may still be blocked on stdin.
    if !interrupted {
        let _ = tokio::task::spawn_blocking(move || reader.join()).await;
    }
    Ok(())
}

/// Returns false when the session should end.
async fn dispatch(mind: &Mind, out: &Output, command: Command) -> bool {
    match command {
        Command::Empty => {}
        Command::Quit => return false,
        Command::Help => println!("{}", HELP),
        Command::Chat(text) => chat(mind, &text).await,
        Command::New => {
            mind.new_conversation().await;
            println!("Started a new conversation.");
        }
        Command::Pause => {
            if mind.pause() {
                println!("Thought loop paused.");
            } else {
                println!("Thought loop is not running.");
            }
        }
        Command::Resume => {
            if mind.resume() {
                println!("Thought loop resumed.");
            } else {
                println!("Thought loop is not paused.");
            }
        }
        Command::Thoughts(n) => match mind.recent_thoughts(n).await {
            Ok(thoughts) if thoughts.is_empty() => println!("No thoughts yet."),
            Ok(thoughts) => thoughts
                .iter()
                .for_each(|t| println!("{}", commands::format_record(t))),
            Err(e) => report(out, e),
        },
        Command::Search(query) => match mind.memories(Some(&query), commands::DEFAULT_LISTING).await {
            Ok(hits) if hits.is_empty() => println!("Nothing matches '{}'.", query),
            Ok(hits) => hits
                .iter()
                .for_each(|r| println!("{}", commands::format_record(r))),
            Err(e) => report(out, e),
        },
        Command::Status => match mind.status().await {
            Ok(status) => println!("{}", commands::format_status(&status)),
            Err(e) => report(out, e),
        },
        Command::Usage(hint) => println!("Usage: {}", hint),
        Command::Unknown(name) => println!("Unknown command /{}. Try /help.", name),
    }
    true
}

async fn chat(mind: &Mind, text: &str) {
    let mut fragments = match mind.chat_stream(text).await {
        Ok(rx) => rx,
        Err(e) => {
            println!("{}", e);
            return;
        }
    };
    let mut stdout = std::io::stdout();
    print!("reverie> ");
    while let Some(fragment) = fragments.recv().await {
        print!("{}", fragment);
        let _ = stdout.flush();
    }
    println!();
}

fn report(out: &Output, e: anyhow::Error) {
    tracing::error!("{:#}", e);
    out.line(format!("error: {:#}", e));
}

async fn print_thoughts(mut feed: broadcast::Receiver<ThoughtEvent>, out: Output) {
    loop {
        match feed.recv().await {
            Ok(event) => out.line(commands::format_thought(&event)),
            Err(RecvError::Lagged(skipped)) => tracing::warn!("Thought feed lagged, skipped {}", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Blocking line reader. Sends `None` on end of input.
fn read_lines(
    lines: mpsc::Sender<Option<String>>,
    acks: std_mpsc::Receiver<()>,
    printer: oneshot::Sender<Option<SharedPrinter>>,
    history: Option<PathBuf>,
) {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            tracing::error!("Terminal unavailable: {}", e);
            let _ = printer.send(None);
            let _ = lines.blocking_send(None);
            return;
        }
    };

    let external = editor
        .create_external_printer()
        .ok()
        .map(|p| Arc::new(Mutex::new(Box::new(p) as Box<dyn ExternalPrinter + Send>)));
    let _ = printer.send(external);

    if let Some(path) = &history {
        if let Err(e) = editor.load_history(path) {
            tracing::debug!("No history loaded from {}: {}", path.display(), e);
        }
    }

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = editor.add_history_entry(line.as_str());
                }
                if lines.blocking_send(Some(line)).is_err() || acks.recv().is_err() {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                let _ = lines.blocking_send(None);
                break;
            }
            Err(e) => {
                tracing::error!("Input error: {}", e);
                let _ = lines.blocking_send(None);
                break;
            }
        }
    }

    if let Some(path) = &history {
        if let Err(e) = editor.save_history(path) {
            tracing::debug!("Failed to save history to {}: {}", path.display(), e);
        }
    }
}
