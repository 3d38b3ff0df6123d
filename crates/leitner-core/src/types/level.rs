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

use std::fmt::Display;
use std::fmt::Formatter;

use serde::Deserialize;
use serde::Serialize;

use crate::error::ErrorReport;

/// A card's confidence tier. Levels 0 through 3 are the visible boxes;
/// level 4 is the mastered tier, which is never shown as a box.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Level(u8);

impl Level {
    pub const ZERO: Level = Level(0);

    /// The highest level that still appears as a selectable box.
    pub const LAST_VISIBLE: Level = Level(3);

    pub const MASTERED: Level = Level(4);

    /// The visible boxes, in order.
    pub const VISIBLE: [Level; 4] = [Level(0), Level(1), Level(2), Level(3)];

    pub fn value(self) -> u8 {
        self.0
    }

    /// One level up, saturating at the mastered tier.
    pub fn promote(self) -> Self {
        Self((self.0 + 1).min(Self::MASTERED.0))
    }

    /// One level down, saturating at zero.
    pub fn demote(self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    pub fn is_mastered(self) -> bool {
        self == Self::MASTERED
    }

    pub fn is_visible(self) -> bool {
        self <= Self::LAST_VISIBLE
    }
}

impl TryFrom<u8> for Level {
    type Error = ErrorReport;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value <= Self::MASTERED.0 {
            Ok(Level(value))
        } else {
            Err(ErrorReport::new(format!(
                "invalid learning level: {value} (expected 0 to 4)"
            )))
        }
    }
}

impl From<Level> for u8 {
    fn from(level: Level) -> u8 {
        level.0
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fallible;

    #[test]
    fn test_try_from() -> Fallible<()> {
        for n in 0..=4 {
            assert_eq!(Level::try_from(n)?.value(), n);
        }
        assert!(Level::try_from(5).is_err());
        assert!(Level::try_from(255).is_err());
        Ok(())
    }

    #[test]
    fn test_saturation() {
        assert_eq!(Level::MASTERED.promote(), Level::MASTERED);
        assert_eq!(Level::ZERO.demote(), Level::ZERO);
        assert_eq!(Level::LAST_VISIBLE.promote(), Level::MASTERED);
    }

    #[test]
    fn test_deserialize_rejects_out_of_range() {
        let level: Level = serde_json::from_str("3").unwrap();
        assert_eq!(level, Level::LAST_VISIBLE);
        assert!(serde_json::from_str::<Level>("7").is_err());
    }

    #[test]
    fn test_visibility() {
        assert!(Level::VISIBLE.iter().all(|l| l.is_visible()));
        assert!(!Level::MASTERED.is_visible());
        assert!(Level::MASTERED.is_mastered());
    }
}
