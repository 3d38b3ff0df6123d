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

//! Deck files: the folders and cards a drill session starts from.
//!
//! ```toml
//! [[folders]]
//! id = 1
//! name = "Spanish"
//!
//! [[folders.cards]]
//! id = 1
//! question = "hola"
//! answer = "hello"
//! level = 0
//! ```

use std::collections::HashSet;
use std::fs::read_to_string;
use std::path::Path;

use leitner_core::Card;
use leitner_core::CardId;
use leitner_core::Fallible;
use leitner_core::Folder;
use leitner_core::FolderId;
use leitner_core::Level;
use leitner_core::MemoryStore;
use leitner_core::fail;
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Deck {
    #[serde(default)]
    pub folders: Vec<DeckFolder>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeckFolder {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub cards: Vec<DeckCard>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeckCard {
    pub id: u64,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub level: Level,
}

impl Deck {
    pub fn load(path: &Path) -> Fallible<Self> {
        if !path.exists() {
            return fail(format!("deck file {} does not exist.", path.display()));
        }
        let source = read_to_string(path)?;
        Self::parse(&source)
    }

    pub fn parse(source: &str) -> Fallible<Self> {
        let deck: Deck = toml::from_str(source)?;
        deck.validate()?;
        Ok(deck)
    }

    /// Folder ids and card ids must be unique across the whole deck.
    fn validate(&self) -> Fallible<()> {
        let mut folder_ids = HashSet::new();
        let mut card_ids = HashSet::new();
        for folder in &self.folders {
            if !folder_ids.insert(folder.id) {
                return fail(format!("duplicate folder id: {}", folder.id));
            }
            for card in &folder.cards {
                if !card_ids.insert(card.id) {
                    return fail(format!("duplicate card id: {}", card.id));
                }
            }
        }
        Ok(())
    }

    pub fn folder_cards(folder: &DeckFolder) -> Vec<Card> {
        folder
            .cards
            .iter()
            .map(|card| Card {
                id: CardId(card.id),
                folder_id: FolderId(folder.id),
                question: card.question.clone(),
                answer: card.answer.clone(),
                current_learning_level: card.level,
            })
            .collect()
    }

    /// Seeds an in-memory Card Store with this deck.
    pub fn into_store(self) -> MemoryStore {
        let store = MemoryStore::new();
        for folder in &self.folders {
            let cards = Self::folder_cards(folder);
            store.add_folder(
                Folder {
                    id: FolderId(folder.id),
                    name: folder.name.clone(),
                },
                cards,
            );
        }
        store
    }
}
