//! Per-line typing progress and keystroke matching.

use crate::normalize::NormalizedLine;

/// A key press as seen by the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keystroke {
    Char(char),
    Backspace,
}

impl Keystroke {
    /// The character to compare, if the key is typeable: ASCII letters
    /// (folded to lowercase), digits and space.
    #[must_use]
    pub fn typed_char(self) -> Option<char> {
        match self {
            Self::Char(c) if c.is_ascii_alphanumeric() || c == ' ' => {
                Some(c.to_ascii_lowercase())
            }
            _ => None,
        }
    }

    /// Whether the game reacts to this key at all.
    #[must_use]
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Backspace) || self.typed_char().is_some()
    }
}

/// What a keystroke did to the current line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeystrokeOutcome {
    /// Key is not part of the game alphabet, or there was nothing to erase.
    Ignored,
    /// A character was appended.
    Typed { correct: bool, completed: bool },
    /// The last character was removed.
    Erased { was_correct: bool },
    /// The line takes no typing; the key only moves the game past it.
    Skipped,
}

/// What the player has typed on the current line.
///
/// `per_char_correct` always has one entry per typed character.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypingProgress {
    typed_text: String,
    per_char_correct: Vec<bool>,
}

impl TypingProgress {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn typed_text(&self) -> &str {
        &self.typed_text
    }

    #[must_use]
    pub fn per_char_correct(&self) -> &[bool] {
        &self.per_char_correct
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.per_char_correct.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.per_char_correct.is_empty()
    }

    #[must_use]
    pub fn correct_count(&self) -> usize {
        self.per_char_correct.iter().filter(|&&ok| ok).count()
    }

    pub fn clear(&mut self) {
        self.typed_text.clear();
        self.per_char_correct.clear();
    }

    /// Apply one keystroke against `line`.
    ///
    /// Completion is reported but not acted on; the caller advances the line
    /// and clears this progress.
    pub fn apply(&mut self, key: Keystroke, line: &NormalizedLine) -> KeystrokeOutcome {
        if !key.is_accepted() {
            return KeystrokeOutcome::Ignored;
        }
        if !line.is_typeable() {
            return KeystrokeOutcome::Skipped;
        }

        match key {
            Keystroke::Backspace => match self.per_char_correct.pop() {
                Some(was_correct) => {
                    self.typed_text.pop();
                    KeystrokeOutcome::Erased { was_correct }
                }
                None => KeystrokeOutcome::Ignored,
            },
            Keystroke::Char(_) => {
                let Some(c) = key.typed_char() else {
                    return KeystrokeOutcome::Ignored;
                };
                let index = self.len();
                if index >= line.len() {
                    return KeystrokeOutcome::Ignored;
                }

                let correct = line.expected_char(index) == Some(c);
                self.typed_text.push(c);
                self.per_char_correct.push(correct);

                KeystrokeOutcome::Typed {
                    correct,
                    completed: self.len() == line.len(),
                }
            }
        }
    }
}

/// End-of-game accuracy as a percentage: `score / (total_lines * points_per_line)`.
///
/// This is a deliberately coarse heuristic kept for parity with the
/// established score screen; it is not per-character accuracy. Returns 0 when
/// the denominator is 0.
#[must_use]
pub fn accuracy_percent(score: u32, total_lines: usize, points_per_line: u32) -> f64 {
    let lines = u32::try_from(total_lines).map_or(f64::from(u32::MAX), f64::from);
    let denominator = lines * f64::from(points_per_line);
    if denominator <= 0.0 {
        return 0.0;
    }
    f64::from(score) / denominator * 100.0
}

/// Share of typed characters that were correct, as a percentage.
#[must_use]
pub fn char_accuracy_percent(correct: u32, typed: u32) -> f64 {
    if typed == 0 {
        return 0.0;
    }
    f64::from(correct) / f64::from(typed) * 100.0
}
