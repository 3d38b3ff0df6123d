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

use std::path::Path;

use leitner_core::Fallible;
use leitner_core::scheduler::box_summary;
use leitner_core::scheduler::is_mastered;

use crate::deck::Deck;

pub fn check_deck(path: &Path) -> Fallible<()> {
    let deck = Deck::load(path)?;
    for line in report(&deck) {
        println!("{line}");
    }
    Ok(())
}

/// One line per folder: its box counts, then whether it is mastered.
fn report(deck: &Deck) -> Vec<String> {
    deck.folders
        .iter()
        .map(|folder| {
            let cards = Deck::folder_cards(folder);
            let summary = box_summary(&cards);
            let boxes = summary
                .boxes
                .iter()
                .map(|b| format!("{}:{}", b.level, b.count))
                .collect::<Vec<_>>()
                .join(" ");
            let status = if is_mastered(&cards) { " (mastered)" } else { "" };
            format!(
                "{} [{}] {} mastered={}{}",
                folder.id, folder.name, boxes, summary.mastered_count, status
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::tests::DECK;

    #[test]
    fn test_report() -> Fallible<()> {
        let deck = Deck::parse(DECK)?;
        assert_eq!(
            report(&deck),
            vec![
                "1 [Spanish] 0:1 1:0 2:0 3:0 mastered=1".to_string(),
                "2 [Empty] 0:0 1:0 2:0 3:0 mastered=0".to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_check_missing_deck() {
        let err = check_deck(Path::new("./derpherp.toml")).err().unwrap();
        assert_eq!(
            err.to_string(),
            "error: deck file ./derpherp.toml does not exist."
        );
    }
}
