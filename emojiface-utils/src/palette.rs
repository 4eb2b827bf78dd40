//! Emoji palette parsing.
//!
//! A palette is an ordered list of single-grapheme symbols. Users usually type it
//! as one free-form string, so composite emoji (skin tones, ZWJ families, flags)
//! must be kept together rather than split per `char`.

use unicode_segmentation::UnicodeSegmentation;

/// Built-in palette used when the configured one is empty.
pub const DEFAULT_PALETTE: [&str; 8] = ["😂", "😎", "😆", "😋", "🫡", "😊", "😜", "🤠"];

/// Owned copy of [`DEFAULT_PALETTE`].
pub fn default_palette() -> Vec<String> {
    DEFAULT_PALETTE.iter().map(|s| (*s).to_string()).collect()
}

/// Split free-form text into palette symbols (extended grapheme clusters).
///
/// Whitespace clusters are dropped so `"😂 😎"` and `"😂😎"` yield the same palette.
pub fn split_symbols(text: &str) -> Vec<String> {
    text.graphemes(true)
        .filter(|g| !g.chars().all(char::is_whitespace))
        .map(str::to_string)
        .collect()
}

/// Return `symbols` without blank entries, or the default palette when nothing remains.
pub fn resolve_palette(symbols: &[String]) -> Vec<String> {
    let cleaned: Vec<String> = symbols
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if cleaned.is_empty() {
        default_palette()
    } else {
        cleaned
    }
}
