// Copyright 2025 Fernando Borretti
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod command;

use std::fs::read_to_string;
use std::io::BufRead;
use std::io::BufReader;
use std::io::Write;
use std::io::stdin;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use leitner_core::ErrorReport;
use leitner_core::Fallible;
use leitner_core::SessionConfig;
use leitner_core::SessionController;
use leitner_core::fail;
use serde_json::Value;
use serde_json::json;
use tokio::select;
use tokio::signal;
use tokio::sync::mpsc;

use crate::cmd::drill::command::DrillCommand;
use crate::deck::Deck;

/// Drills a deck from stdin until `quit`, end of input, or Ctrl+C, then
/// shuts the session down and prints the analytics totals.
pub async fn drill_deck(deck: &Path, config: Option<&Path>) -> Fallible<()> {
    let config = match config {
        Some(path) => {
            if !path.exists() {
                return fail(format!("config file {} does not exist.", path.display()));
            }
            SessionConfig::from_toml(&read_to_string(path)?)?
        }
        None => SessionConfig::default(),
    };
    let store = Deck::load(deck)?.into_store();
    let controller = SessionController::new(Arc::new(store.clone()), Arc::new(store.clone()), config);
    log::debug!("Loaded deck {}", deck.display());

    let mut output = std::io::stdout();
    select! {
        result = run(&controller, spawn_line_reader(BufReader::new(stdin())), &mut output) => result?,
        _ = signal::ctrl_c() => {
            log::debug!("Received Ctrl+C, shutting down gracefully");
        },
    }

    controller.shutdown().await;
    writeln!(output, "{}", json!({ "analytics": store.totals() }))?;
    Ok(())
}

/// Reads lines on a plain thread. The thread is not owned by the runtime,
/// so a read still blocked on input does not hold up shutdown. The channel
/// closes at end of input or on a read error.
fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::warn!("Failed to read input: {e}");
                    break;
                }
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Reads one command per line and writes one JSON reply per line. Blank
/// lines and `#` comments are skipped. A command that cannot run is
/// answered with `{"rejected": ...}` and the loop carries on.
pub async fn run<W: Write>(
    controller: &SessionController,
    mut input: mpsc::Receiver<String>,
    output: &mut W,
) -> Fallible<()> {
    while let Some(line) = input.recv().await {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let reply = match DrillCommand::parse(line) {
            Ok(DrillCommand::Quit) => break,
            Ok(command) => match execute(controller, command).await {
                Ok(reply) => reply,
                Err(e) => rejected(&e),
            },
            Err(e) => rejected(&e),
        };
        writeln!(output, "{reply}")?;
        output.flush()?;
    }
    Ok(())
}

fn rejected(e: &ErrorReport) -> Value {
    log::debug!("Rejected command: {}", e.message());
    json!({ "rejected": e.message() })
}

async fn execute(controller: &SessionController, command: DrillCommand) -> Fallible<Value> {
    let reply = match command {
        DrillCommand::Start => {
            controller.start_learning().await?;
            json!({ "view": controller.view(), "folders": controller.folders() })
        }
        DrillCommand::Folders => json!({ "folders": controller.folders() }),
        DrillCommand::Folder(id) => {
            let Some(folder) = controller.folders().into_iter().find(|f| f.id == id) else {
                return fail(format!("no folder with id {id}."));
            };
            controller.select_folder(folder).await?;
            json!({ "view": controller.view() })
        }
        DrillCommand::Box(level) => {
            controller.select_box(level)?;
            json!({ "view": controller.view() })
        }
        DrillCommand::Learn => {
            controller.start_box_learning()?;
            json!({ "view": controller.view(), "cards": controller.learning_cards() })
        }
        DrillCommand::Cards => json!({ "cards": controller.learning_cards() }),
        DrillCommand::Answer { card, correct } => {
            let outcome = controller.evaluate_card(card, correct).await?;
            json!({ "outcome": outcome, "view": controller.view() })
        }
        DrillCommand::Back => {
            controller.go_back().await?;
            json!({ "view": controller.view() })
        }
        DrillCommand::ToFolders => {
            controller.go_back_to_folders().await?;
            json!({ "view": controller.view(), "folders": controller.folders() })
        }
        DrillCommand::Reset => {
            controller.reset_learning().await;
            json!({ "view": controller.view() })
        }
        DrillCommand::Refresh => {
            controller.invalidate_cache().await;
            json!({ "view": controller.view() })
        }
        DrillCommand::Retry => {
            let outcome = controller.retry_last_operation().await;
            json!({ "outcome": outcome, "view": controller.view() })
        }
        DrillCommand::Dismiss => {
            controller.dismiss_error();
            json!({ "view": controller.view() })
        }
        DrillCommand::State => json!({ "view": controller.view() }),
        DrillCommand::Quit => return fail("quit is handled by the command loop."),
    };
    Ok(reply)
}
