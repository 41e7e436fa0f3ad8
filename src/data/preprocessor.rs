// ============================================================
// Layer 4 — Sentence Preprocessor
// ============================================================
// Cleans one corpus line before it is tokenised.
//
// Corpus files scraped from subtitles and talk transcripts
// often carry:
//   - Non-breaking spaces (U+00A0)
//   - Zero-width spaces (U+200B) and byte order marks
//   - Tabs and stray control characters
//   - Runs of several spaces
//
// Tokens are split on whitespace downstream, so any of these
// would either create empty tokens or glue two words together.
// Each sentence is a single line, so unlike a document cleaner
// there are no paragraph breaks to preserve: every kind of
// whitespace collapses into a single ASCII space.

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean a single sentence.
    pub fn clean(&self, line: &str) -> String {
        let normalised: String = line
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect();

        // split_whitespace skips leading, trailing and repeated spaces
        normalised.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_multiple_spaces() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("ein   kleiner  hund"), "ein kleiner hund");
    }

    #[test]
    fn test_trims_edges() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("  hallo welt \t"), "hallo welt");
    }

    #[test]
    fn test_removes_control_and_invisible_chars() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("hallo\x01welt\u{00A0}da\u{FEFF}"), "hallo welt da");
    }

    #[test]
    fn test_keeps_bpe_markers() {
        let p = Preprocessor::new();
        assert_eq!(p.clean("wir sprech@@ en"), "wir sprech@@ en");
    }

    #[test]
    fn test_empty_string() {
        let p = Preprocessor::new();
        assert_eq!(p.clean(""), "");
    }
}
