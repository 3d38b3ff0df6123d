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

use serde::Deserialize;
use serde::Serialize;

use crate::types::level::Level;

/// The number of cards in one visible box.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxCount {
    pub level: Level,
    pub count: usize,
}

/// Box counts for a folder. Boxes are virtual: they are recomputed from
/// the cached card list every time it changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxSummary {
    pub boxes: [BoxCount; 4],
    pub mastered_count: usize,
}

impl BoxSummary {
    pub fn count(&self, level: Level) -> usize {
        if level.is_mastered() {
            self.mastered_count
        } else {
            self.boxes[level.value() as usize].count
        }
    }

    pub fn total(&self) -> usize {
        self.boxes.iter().map(|b| b.count).sum::<usize>() + self.mastered_count
    }
}

impl Default for BoxSummary {
    fn default() -> Self {
        Self {
            boxes: Level::VISIBLE.map(|level| BoxCount { level, count: 0 }),
            mastered_count: 0,
        }
    }
}
