use crate::geometry::Size;

use super::spec::{MeasureMode, MeasureSpec};

/// Interim size reported while no solved model is active, derived from a
/// width/height aspect ratio. No solver is involved.
pub fn placeholder_size(width: MeasureSpec, height: MeasureSpec, ratio: f64) -> Size {
    let width_by_ratio = (f64::from(height.size) * ratio) as i32;
    let height_by_ratio = (f64::from(width.size) / ratio) as i32;

    let resolved_width = match width.mode {
        MeasureMode::AtMost if height.is_exact() => width_by_ratio.min(width.size),
        MeasureMode::AtMost | MeasureMode::Exact => width.size,
        MeasureMode::Unspecified => width_by_ratio,
    };
    let resolved_height = match height.mode {
        MeasureMode::AtMost if width.is_exact() => height_by_ratio.min(height.size),
        MeasureMode::AtMost | MeasureMode::Exact => height.size,
        MeasureMode::Unspecified => height_by_ratio,
    };
    Size::new(resolved_width, resolved_height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unspecified_width_follows_exact_height() {
        let size = placeholder_size(MeasureSpec::unspecified(), MeasureSpec::exact(100), 2.0);
        assert_eq!(size, Size::new(200, 100));
    }

    #[test]
    fn at_most_width_takes_the_smaller_candidate() {
        let narrow = placeholder_size(MeasureSpec::at_most(150), MeasureSpec::exact(100), 2.0);
        assert_eq!(narrow.width, 150);
        let wide = placeholder_size(MeasureSpec::at_most(500), MeasureSpec::exact(100), 2.0);
        assert_eq!(wide.width, 200);
    }

    #[test]
    fn height_mirrors_width_rules() {
        let size = placeholder_size(MeasureSpec::exact(300), MeasureSpec::at_most(400), 2.0);
        assert_eq!(size, Size::new(300, 150));
        let size = placeholder_size(MeasureSpec::exact(300), MeasureSpec::unspecified(), 3.0);
        assert_eq!(size, Size::new(300, 100));
    }

    #[test]
    fn at_most_without_exact_partner_keeps_the_bound() {
        let size = placeholder_size(MeasureSpec::at_most(120), MeasureSpec::at_most(80), 1.0);
        assert_eq!(size, Size::new(120, 80));
    }
}
