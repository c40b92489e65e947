//! Light levels — the ordered table used for quantized brightness stepping.

use crate::light::{DEFAULT_COLOR_TEMP, LightState, MAX_BRIGHTNESS};

/// One step of the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightLevel {
    pub brightness: u16,
    pub color_temp: u16,
}

impl LightLevel {
    /// The powered-on state this level describes.
    #[must_use]
    pub fn state(&self) -> LightState {
        LightState::on(self.brightness, self.color_temp)
    }
}

/// Immutable, ascending table of levels, from dim-warm to bright-cool.
///
/// Index 0 is the lowest level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightLevels {
    levels: Vec<LightLevel>,
}

impl Default for LightLevels {
    fn default() -> Self {
        Self {
            levels: vec![
                LightLevel {
                    brightness: 25,
                    color_temp: 454,
                },
                LightLevel {
                    brightness: 127,
                    color_temp: 400,
                },
                LightLevel {
                    brightness: MAX_BRIGHTNESS,
                    color_temp: DEFAULT_COLOR_TEMP,
                },
                LightLevel {
                    brightness: MAX_BRIGHTNESS,
                    color_temp: 250,
                },
            ],
        }
    }
}

impl LightLevels {
    /// Build a table from levels sorted from lowest to highest.
    ///
    /// Returns `None` for an empty table.
    #[must_use]
    pub fn new(levels: Vec<LightLevel>) -> Option<Self> {
        if levels.is_empty() {
            return None;
        }
        Some(Self { levels })
    }

    /// Level at `index`, clamped to the top level.
    #[must_use]
    pub fn level(&self, index: usize) -> LightLevel {
        self.levels[index.min(self.top())]
    }

    /// Index of the highest level.
    #[must_use]
    pub fn top(&self) -> usize {
        self.levels.len() - 1
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// The level a light currently sits on.
    ///
    /// Walks the table upwards and returns the first level whose brightness is
    /// not exceeded. Levels sharing their brightness with the next entry are
    /// told apart by colour temperature: a state cooler than the level (lower
    /// mired value) belongs further up. Anything beyond every bound falls back
    /// to the top level.
    #[must_use]
    pub fn level_of(&self, state: &LightState) -> usize {
        self.levels
            .iter()
            .zip(self.levels.iter().skip(1).map(Some).chain([None]))
            .position(|(level, next)| {
                if state.brightness > level.brightness {
                    return false;
                }
                match next {
                    Some(next) if next.brightness == level.brightness => {
                        state.color_temp >= level.color_temp
                    }
                    _ => true,
                }
            })
            .unwrap_or_else(|| self.top())
    }
}
