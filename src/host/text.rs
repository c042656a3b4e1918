//! Natural size of a block of text laid out on a character grid.
//!
//! One line of text is one unit tall and each column is one unit wide, the
//! same grid the display-width helpers count in.

use unicode_width::UnicodeWidthChar;

use crate::geometry::Size;
use crate::sizing::MeasureSpec;
use crate::width::{display_width, strip_escapes};

/// Measure `text` under a pair of measurement requests, wrapping greedily on
/// whitespace when the width request carries a limit.
pub fn measure_text(text: &str, width: MeasureSpec, height: MeasureSpec) -> Size {
    let lines = wrap(text, width.limit());
    let natural_width = lines.iter().map(|line| display_width(line)).max().unwrap_or(0);
    Size::new(
        width.resolve(to_i32(natural_width)),
        height.resolve(to_i32(lines.len())),
    )
}

/// Split `text` into display lines no wider than `limit` columns.
pub fn wrap(text: &str, limit: Option<i32>) -> Vec<String> {
    let clean = strip_escapes(text);
    let limit = match limit {
        Some(limit) if limit > 0 => limit as usize,
        _ => return clean.lines().map(str::to_string).collect(),
    };

    let mut lines = Vec::new();
    for paragraph in clean.lines() {
        let mut current = String::new();
        let mut used = 0usize;
        for word in paragraph.split_whitespace() {
            let width = display_width(word);
            if used > 0 && used + 1 + width <= limit {
                current.push(' ');
                current.push_str(word);
                used += 1 + width;
                continue;
            }
            if used > 0 {
                lines.push(std::mem::take(&mut current));
                used = 0;
            }
            if width <= limit {
                current.push_str(word);
                used = width;
                continue;
            }
            for ch in word.chars() {
                let cells = ch.width().unwrap_or(0);
                if used + cells > limit && used > 0 {
                    lines.push(std::mem::take(&mut current));
                    used = 0;
                }
                current.push(ch);
                used += cells;
            }
        }
        lines.push(current);
    }
    lines
}

fn to_i32(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unbounded_text_keeps_its_lines() {
        let size = measure_text(
            "hello world\nhi",
            MeasureSpec::unspecified(),
            MeasureSpec::unspecified(),
        );
        assert_eq!(size, Size::new(11, 2));
    }

    #[test]
    fn at_most_width_wraps_on_words() {
        assert_eq!(wrap("the quick brown fox", Some(10)), vec!["the quick", "brown fox"]);
        let size = measure_text(
            "the quick brown fox",
            MeasureSpec::at_most(10),
            MeasureSpec::unspecified(),
        );
        assert_eq!(size, Size::new(9, 2));
    }

    #[test]
    fn exact_width_reports_the_request() {
        let size = measure_text("abc", MeasureSpec::exact(8), MeasureSpec::at_most(5));
        assert_eq!(size, Size::new(8, 1));
    }

    #[test]
    fn long_words_break_by_cell() {
        assert_eq!(wrap("abcdefgh", Some(3)), vec!["abc", "def", "gh"]);
    }

    #[test]
    fn escapes_do_not_widen_text() {
        let size = measure_text(
            "\u{1b}[1mbold\u{1b}[0m",
            MeasureSpec::unspecified(),
            MeasureSpec::unspecified(),
        );
        assert_eq!(size, Size::new(4, 1));
    }
}
