//! Canonical form of lyric text used for typing comparison.

/// Glyphs that, on their own, mark an instrumental passage.
pub const MUSICAL_NOTES: [char; 4] = ['♪', '♫', '♬', '♩'];

/// The marker emitted by the lyrics service for instrumental breaks.
pub const MUSICAL_NOTE: &str = "♪";

/// Lyric text reduced to what the player is expected to type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedLine {
    text: String,
    is_non_lyric_marker: bool,
}

impl NormalizedLine {
    /// The canonical text. Lowercase ASCII letters, digits and single spaces,
    /// except for marker lines which hold the marker glyph verbatim.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn is_non_lyric_marker(&self) -> bool {
        self.is_non_lyric_marker
    }

    /// Number of characters the player has to type to complete the line.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.is_non_lyric_marker {
            0
        } else {
            self.text.len()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the line takes keystrokes at all. Markers and lines that
    /// normalize to nothing (e.g. only a parenthetical) are skipped.
    #[must_use]
    pub fn is_typeable(&self) -> bool {
        !self.is_empty()
    }

    /// The character expected at `index`, if the line is that long.
    #[must_use]
    pub fn expected_char(&self, index: usize) -> Option<char> {
        if self.is_non_lyric_marker {
            return None;
        }
        // Non-marker text is pure ASCII, so byte and char indices agree.
        self.text.as_bytes().get(index).map(|&b| char::from(b))
    }
}

/// Map raw lyric text to its canonical, comparable form.
///
/// Parenthetical spans are removed, everything except ASCII letters, digits
/// and whitespace is dropped, whitespace runs collapse to one space, and the
/// result is lowercased and trimmed. A line that is exactly one musical-note
/// glyph is returned verbatim as a non-lyric marker.
///
/// ```
/// use typify_core::normalize::normalize;
///
/// assert_eq!(normalize("Hello (oh yeah) World!").text(), "hello world");
/// assert!(normalize(" ♪ ").is_non_lyric_marker());
/// ```
#[must_use]
pub fn normalize(raw: &str) -> NormalizedLine {
    let trimmed = raw.trim();

    let mut chars = trimmed.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if MUSICAL_NOTES.contains(&c) {
            return NormalizedLine {
                text: trimmed.to_string(),
                is_non_lyric_marker: true,
            };
        }
    }

    let mut text = String::with_capacity(trimmed.len());
    let mut pending_space = false;

    for c in strip_parentheticals(trimmed).chars() {
        if c.is_whitespace() {
            pending_space = !text.is_empty();
        } else if c.is_ascii_alphanumeric() {
            if pending_space {
                text.push(' ');
                pending_space = false;
            }
            text.push(c.to_ascii_lowercase());
        }
    }

    NormalizedLine {
        text,
        is_non_lyric_marker: false,
    }
}

/// Remove every `(` ... `)` span, non-nested: a span ends at the first `)`.
/// An unclosed `(` is kept and later dropped as punctuation.
fn strip_parentheticals(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(open) = rest.find('(') {
        match rest[open..].find(')') {
            Some(close) => {
                output.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_parenthetical_and_punctuation() {
        assert_eq!(normalize("Hello (oh yeah) World!").text(), "hello world");
    }

    #[test]
    fn test_lowercases_and_trims() {
        assert_eq!(normalize("  Don't STOP me now  ").text(), "dont stop me now");
    }

    #[test]
    fn test_multiple_parentheticals() {
        assert_eq!(normalize("(Ooh) baby (baby) love").text(), "baby love");
    }

    #[test]
    fn test_parenthetical_only_line_is_empty() {
        let line = normalize("(Instrumental)");
        assert_eq!(line.text(), "");
        assert!(!line.is_non_lyric_marker());
        assert!(!line.is_typeable());
    }

    #[test]
    fn test_unclosed_parenthesis_keeps_text() {
        assert_eq!(normalize("wait (for it").text(), "wait for it");
    }

    #[test]
    fn test_non_ascii_letters_are_dropped() {
        assert_eq!(normalize("Café del Mar").text(), "caf del mar");
        assert_eq!(normalize("你好 world").text(), "world");
    }

    #[test]
    fn test_whitespace_collapses() {
        assert_eq!(normalize("one\t two   three").text(), "one two three");
        assert_eq!(normalize("a - b").text(), "a b");
    }

    #[test]
    fn test_musical_note_marker() {
        let line = normalize("♪");
        assert!(line.is_non_lyric_marker());
        assert_eq!(line.text(), MUSICAL_NOTE);
        assert!(!line.is_typeable());
        assert_eq!(line.len(), 0);
        assert_eq!(line.expected_char(0), None);
    }

    #[test]
    fn test_marker_with_surrounding_whitespace() {
        let line = normalize("  ♫ ");
        assert!(line.is_non_lyric_marker());
        assert_eq!(line.text(), "♫");
    }

    #[test]
    fn test_note_inside_lyrics_is_not_marker() {
        let line = normalize("♪ la la ♪");
        assert!(!line.is_non_lyric_marker());
        assert_eq!(line.text(), "la la");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "Hello (oh yeah) World!",
            "  Don't STOP me now  ",
            "♪",
            "(Instrumental)",
            "one\t two   three",
            "Café del Mar",
            "",
            "123 go!",
        ];
        for input in inputs {
            let once = normalize(input);
            let twice = normalize(once.text());
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_expected_char() {
        let line = normalize("Hi you");
        assert_eq!(line.len(), 6);
        assert_eq!(line.expected_char(0), Some('h'));
        assert_eq!(line.expected_char(2), Some(' '));
        assert_eq!(line.expected_char(6), None);
    }
}
