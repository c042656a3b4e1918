//! Terminal-style display width helpers.
//!
//! Text handed to a measurement host may carry ANSI styling; the escapes are
//! stripped before the width is computed so intrinsic sizes stay stable.

/// Remove ANSI escape sequences from `text`.
pub fn strip_escapes(text: &str) -> String {
    let clean = strip_ansi_escapes::strip(text);
    String::from_utf8_lossy(&clean).into_owned()
}

/// Compute the display width of a string after stripping ANSI escapes.
pub fn display_width(text: &str) -> usize {
    unicode_width::UnicodeWidthStr::width(strip_escapes(text).as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ansi_sequences_do_not_count() {
        assert_eq!(display_width("\u{1b}[31mred\u{1b}[0m"), 3);
    }

    #[test]
    fn wide_glyphs_take_two_cells() {
        assert_eq!(display_width("日本"), 4);
    }
}
