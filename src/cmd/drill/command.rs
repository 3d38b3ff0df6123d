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

use leitner_core::CardId;
use leitner_core::Fallible;
use leitner_core::FolderId;
use leitner_core::Level;
use leitner_core::fail;

/// One line of drill input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DrillCommand {
    Start,
    Folders,
    Folder(FolderId),
    Box(Level),
    Learn,
    Cards,
    Answer { card: CardId, correct: bool },
    Back,
    ToFolders,
    Reset,
    Refresh,
    Retry,
    Dismiss,
    State,
    Quit,
}

impl DrillCommand {
    pub fn parse(line: &str) -> Fallible<Self> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return fail("empty command.");
        };
        let argument = words.next();
        if words.next().is_some() {
            return fail(format!("too many arguments to '{name}'."));
        }
        let command = match (name, argument) {
            ("start", None) => DrillCommand::Start,
            ("folders", None) => DrillCommand::Folders,
            ("folder", Some(id)) => DrillCommand::Folder(FolderId(parse_number(id)?)),
            ("box", Some(level)) => {
                let level = u8::try_from(parse_number(level)?)
                    .map_err(|_| leitner_core::ErrorReport::new("level out of range."))?;
                DrillCommand::Box(Level::try_from(level)?)
            }
            ("learn", None) => DrillCommand::Learn,
            ("cards", None) => DrillCommand::Cards,
            ("correct", Some(id)) => DrillCommand::Answer {
                card: CardId(parse_number(id)?),
                correct: true,
            },
            ("wrong", Some(id)) => DrillCommand::Answer {
                card: CardId(parse_number(id)?),
                correct: false,
            },
            ("back", None) => DrillCommand::Back,
            ("to-folders", None) => DrillCommand::ToFolders,
            ("reset", None) => DrillCommand::Reset,
            ("refresh", None) => DrillCommand::Refresh,
            ("retry", None) => DrillCommand::Retry,
            ("dismiss", None) => DrillCommand::Dismiss,
            ("state", None) => DrillCommand::State,
            ("quit", None) | ("exit", None) => DrillCommand::Quit,
            (
                "folder" | "box" | "correct" | "wrong",
                None,
            ) => return fail(format!("'{name}' needs an argument.")),
            (_, Some(_)) if is_known(name) => {
                return fail(format!("'{name}' takes no arguments."));
            }
            _ => return fail(format!("unknown command: '{name}'.")),
        };
        Ok(command)
    }
}

fn is_known(name: &str) -> bool {
    matches!(
        name,
        "start"
            | "folders"
            | "learn"
            | "cards"
            | "back"
            | "to-folders"
            | "reset"
            | "refresh"
            | "retry"
            | "dismiss"
            | "state"
            | "quit"
            | "exit"
    )
}

fn parse_number(s: &str) -> Fallible<u64> {
    s.parse()
        .map_err(|_| leitner_core::ErrorReport::new(format!("not a number: '{s}'.")))
}
