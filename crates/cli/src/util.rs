use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use matchlens_evidence::Align;

/// Terminal columns taken by `s`; wide characters count twice.
pub(crate) fn display_width(s: &str) -> usize {
    UnicodeWidthStr::width(s)
}

/// Cell text cut to `width` columns, ending in `~` when anything was
/// dropped. Returns the text with its width.
pub(crate) fn clip(s: &str, width: usize) -> (String, usize) {
    let full = display_width(s);
    if full <= width {
        return (s.to_string(), full);
    }
    if width == 0 {
        return (String::new(), 0);
    }

    let mut kept = String::new();
    let mut used = 0;
    for ch in s.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w >= width {
            break;
        }
        kept.push(ch);
        used += w;
    }
    kept.push('~');
    (kept, used + 1)
}

/// Spaces to put (before, after) text of `text_width` columns so it fills
/// `width` columns with the given alignment.
pub(crate) fn padding(text_width: usize, width: usize, align: Align) -> (usize, usize) {
    let free = width.saturating_sub(text_width);
    match align {
        Align::Left => (0, free),
        Align::Right => (free, 0),
        Align::Center => (free / 2, free - free / 2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_characters_count_twice() {
        assert_eq!(display_width("SMITH"), 5);
        assert_eq!(display_width("\u{738b}\u{5c0f}\u{660e}"), 6);
        assert_eq!(display_width(""), 0);
    }

    #[test]
    fn short_text_is_untouched() {
        assert_eq!(clip("CUSTOMERS", 9), ("CUSTOMERS".to_string(), 9));
        assert_eq!(clip("W-7", 20), ("W-7".to_string(), 3));
    }

    #[test]
    fn long_text_ends_in_marker() {
        assert_eq!(clip("ACME HOLDINGS", 8), ("ACME HO~".to_string(), 8));
        assert_eq!(clip("ab", 1), ("~".to_string(), 1));
        assert_eq!(clip("ab", 0), (String::new(), 0));
    }

    #[test]
    fn wide_character_is_not_split() {
        // three double-width characters into five columns
        let (text, width) = clip("\u{738b}\u{5c0f}\u{660e}", 5);
        assert_eq!(text, "\u{738b}\u{5c0f}~");
        assert_eq!(width, 5);
    }

    #[test]
    fn padding_by_alignment() {
        assert_eq!(padding(3, 8, Align::Left), (0, 5));
        assert_eq!(padding(3, 8, Align::Right), (5, 0));
        assert_eq!(padding(3, 8, Align::Center), (2, 3));
        assert_eq!(padding(9, 8, Align::Center), (0, 0));
    }
}
