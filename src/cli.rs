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

use std::path::PathBuf;

use clap::Parser;
use leitner_core::Fallible;

use crate::cmd::check::check_deck;
use crate::cmd::drill::drill_deck;

#[derive(Parser)]
#[command(version, about, long_about = None)]
enum Command {
    /// Drill a deck. Commands are read from stdin, one per line, and the
    /// session state is printed as JSON after each.
    Drill {
        /// Path to the deck file.
        deck: PathBuf,
        /// Path to a TOML file with session settings. By default, the built-in timings are used.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Check a deck and print its box counts.
    Check {
        /// Path to the deck file.
        deck: PathBuf,
    },
}

pub async fn entrypoint() -> Fallible<()> {
    let cli: Command = Command::parse();
    match cli {
        Command::Drill { deck, config } => drill_deck(&deck, config.as_deref()).await,
        Command::Check { deck } => check_deck(&deck),
    }
}
