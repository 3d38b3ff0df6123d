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

//! Leitner box transitions. Everything here is pure: callers pass in a
//! card snapshot and persist the result themselves.

use crate::types::boxes::BoxCount;
use crate::types::boxes::BoxSummary;
use crate::types::card::Card;
use crate::types::level::Level;

/// The level a card moves to after an answer. Correct answers move one
/// box up, wrong answers one box down; both ends are absorbing.
pub fn evaluate(card: &Card, correct: bool) -> Level {
    if correct {
        card.level().promote()
    } else {
        card.level().demote()
    }
}

/// A folder is mastered when it has cards and all of them are in the
/// mastered tier.
pub fn is_mastered(cards: &[Card]) -> bool {
    !cards.is_empty() && cards.iter().all(|card| card.level().is_mastered())
}

/// Full folder restart: every card goes back to the first box.
pub fn reset_all_to_zero(cards: &[Card]) -> Vec<Card> {
    cards.iter().map(|card| card.with_level(Level::ZERO)).collect()
}

/// Moves mastered cards back into the last visible box so they re-enter
/// the review cycle.
pub fn reset_mastered_to_last_visible(cards: &[Card]) -> Vec<Card> {
    cards
        .iter()
        .map(|card| {
            if card.level().is_mastered() {
                card.with_level(Level::LAST_VISIBLE)
            } else {
                card.clone()
            }
        })
        .collect()
}

pub fn box_summary(cards: &[Card]) -> BoxSummary {
    let boxes = Level::VISIBLE.map(|level| BoxCount {
        level,
        count: cards.iter().filter(|c| c.level() == level).count(),
    });
    let mastered_count = cards.iter().filter(|c| c.level().is_mastered()).count();
    BoxSummary {
        boxes,
        mastered_count,
    }
}

/// The cards in a given box, in cache order.
pub fn cards_in_box(cards: &[Card], level: Level) -> Vec<Card> {
    cards
        .iter()
        .filter(|card| card.level() == level)
        .cloned()
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::card::CardId;
    use crate::types::card::FolderId;

    pub(crate) fn card(id: u64, level: u8) -> Card {
        Card {
            id: CardId(id),
            folder_id: FolderId(1),
            question: format!("question {id}"),
            answer: format!("answer {id}"),
            current_learning_level: Level::try_from(level).unwrap(),
        }
    }

    #[test]
    fn test_levels_stay_in_range() {
        // A fixed pseudo-random answer sequence from every starting level.
        for start in 0..=4 {
            let mut c = card(1, start);
            let mut bits: u32 = 0x9e37_79b9 ^ start as u32;
            for _ in 0..200 {
                bits = bits.rotate_left(5) ^ 0x5bd1_e995;
                let level = evaluate(&c, bits & 1 == 1);
                assert!(level.value() <= 4);
                c = c.with_level(level);
            }
        }
    }

    #[test]
    fn test_round_trip_away_from_boundaries() {
        for start in 1..=3 {
            let c = card(1, start);
            let up = c.with_level(evaluate(&c, true));
            assert_eq!(evaluate(&up, false), c.level());
        }
    }

    #[test]
    fn test_absorbing_boundaries() {
        assert_eq!(evaluate(&card(1, 0), false), Level::ZERO);
        assert_eq!(evaluate(&card(1, 4), true), Level::MASTERED);
    }

    #[test]
    fn test_is_mastered() {
        assert!(!is_mastered(&[]));
        assert!(is_mastered(&[card(1, 4), card(2, 4)]));
        assert!(!is_mastered(&[card(1, 4), card(2, 3)]));
    }

    #[test]
    fn test_evaluate_scenario() {
        let cards = vec![card(1, 0), card(2, 1), card(3, 2)];
        let new_level = evaluate(&cards[2], true);
        let cards: Vec<Card> = cards
            .iter()
            .map(|c| {
                if c.id == CardId(3) {
                    c.with_level(new_level)
                } else {
                    c.clone()
                }
            })
            .collect();
        let levels: Vec<u8> = cards.iter().map(|c| c.level().value()).collect();
        assert_eq!(levels, vec![0, 1, 3]);
        let summary = box_summary(&cards);
        let counts: Vec<(u8, usize)> = summary
            .boxes
            .iter()
            .map(|b| (b.level.value(), b.count))
            .collect();
        assert_eq!(counts, vec![(0, 1), (1, 1), (2, 0), (3, 1)]);
        assert_eq!(summary.mastered_count, 0);
    }

    #[test]
    fn test_reset_all_to_zero_is_idempotent() {
        let cards = vec![card(1, 4), card(2, 2), card(3, 0)];
        let once = reset_all_to_zero(&cards);
        let twice = reset_all_to_zero(&once);
        assert_eq!(once, twice);
        assert!(once.iter().all(|c| c.level() == Level::ZERO));
    }

    #[test]
    fn test_reset_mastered_to_last_visible() {
        let cards = vec![card(1, 4), card(2, 1), card(3, 4)];
        let levels: Vec<u8> = reset_mastered_to_last_visible(&cards)
            .iter()
            .map(|c| c.level().value())
            .collect();
        assert_eq!(levels, vec![3, 1, 3]);
    }

    #[test]
    fn test_mastered_cards_are_not_a_box() {
        let cards = vec![card(1, 4), card(2, 4), card(3, 0)];
        let summary = box_summary(&cards);
        assert_eq!(summary.mastered_count, 2);
        assert_eq!(summary.count(Level::ZERO), 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(cards_in_box(&cards, Level::ZERO).len(), 1);
    }
}
