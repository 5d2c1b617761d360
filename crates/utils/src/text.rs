//! Small string helpers used when previewing model output.

/// Return at most `max_chars` characters of `text`, never splitting a UTF-8 code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Like [`truncate_chars`], but appends an ellipsis when something was cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let cut = truncate_chars(text, max_chars);
    if cut.len() < text.len() {
        format!("{}...", cut.trim_end())
    } else {
        cut.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_chars("camisa", 10), "camisa");
    }

    #[test]
    fn test_truncate_respects_multibyte_chars() {
        assert_eq!(truncate_chars("añil oscuro", 3), "añi");
    }

    #[test]
    fn test_preview_adds_ellipsis_only_when_cut() {
        assert_eq!(preview("abc", 3), "abc");
        assert_eq!(preview("abcdef", 3), "abc...");
    }
}
