use time::{OffsetDateTime, format_description::FormatItem, macros::format_description};

/// Number of characters shown when a post or comment is referenced inline.
pub const PREVIEW_CHARACTERS: usize = 15;
pub const GROUP_TITLE_MAX_CHARS: usize = 200;

pub const HUMAN_DATETIME_FORMAT: &[FormatItem<'static>] = format_description!(
    "[day padding:none] [month repr:long] [year] [hour]:[minute]"
);

pub fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARACTERS).collect()
}

pub fn format_human_datetime(value: OffsetDateTime) -> String {
    value.format(HUMAN_DATETIME_FORMAT).unwrap_or_default()
}

/// Trim submitted text, rejecting input that is blank after trimming.
pub fn normalize_text(input: &str) -> Option<String> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn preview_counts_characters_not_bytes() {
        assert_eq!(preview("Тестовый пост длиннее пятнадцати"), "Тестовый пост д");
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn human_datetime_is_readable() {
        let value = datetime!(2024-03-05 09:07 UTC);
        assert_eq!(format_human_datetime(value), "5 March 2024 09:07");
    }

    #[test]
    fn normalize_text_rejects_blank_input() {
        assert_eq!(normalize_text("   \n"), None);
        assert_eq!(normalize_text("  hello "), Some("hello".to_string()));
    }
}
