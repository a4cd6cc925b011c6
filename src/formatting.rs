use chrono::{DateTime, Datelike, Duration, Local, NaiveDateTime, TimeZone};
use unicode_width::UnicodeWidthChar;

use crate::model::{Chat, Message};

const PREVIEW_MAX_CHARS: usize = 50;

/// Parses the timestamp shapes the server emits: RFC 3339, SQLite-style with an
/// offset, or naive (taken as local time).
pub fn parse_timestamp(timestamp: &str) -> Option<DateTime<Local>> {
    let timestamp = timestamp.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp) {
        return Some(dt.with_timezone(&Local));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%d %H:%M:%S%z"] {
        if let Ok(dt) = DateTime::parse_from_str(timestamp, fmt) {
            return Some(dt.with_timezone(&Local));
        }
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(timestamp, fmt) {
            return Local.from_local_datetime(&naive).earliest();
        }
    }
    None
}

/// Short relative label: time today, "Yesterday", month and day this year,
/// full date otherwise. Unparseable input yields an empty string.
pub fn format_time(timestamp: &str, now: DateTime<Local>) -> String {
    let Some(datetime) = parse_timestamp(timestamp) else {
        return String::new();
    };

    let date = datetime.date_naive();
    let today = now.date_naive();
    if date == today {
        datetime.format("%H:%M").to_string()
    } else if Some(date) == today.checked_sub_signed(Duration::days(1)) {
        "Yesterday".to_string()
    } else if date.year() == today.year() {
        datetime.format("%b %-d").to_string()
    } else {
        datetime.format("%b %-d, %Y").to_string()
    }
}

/// Sidebar preview for a chat.
pub fn chat_preview(chat: &Chat) -> String {
    let mut preview = match non_empty(chat.media_type.as_deref()) {
        Some(media) => format!("📎 {}", media),
        None => non_empty(chat.last_message.as_deref())
            .unwrap_or("No messages yet")
            .to_string(),
    };
    if chat.last_is_from_me {
        preview = format!("You: {}", preview);
    }
    truncate_chars(&preview, PREVIEW_MAX_CHARS)
}

/// Cuts to `max` characters, appending "..." when anything was dropped.
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push_str("...");
    out
}

/// Cuts to a display width, ending in "…" when clipped.
pub fn truncate_to_width(text: &str, width: usize) -> String {
    let total: usize = text.chars().map(|c| c.width().unwrap_or(0)).sum();
    if total <= width {
        return text.to_string();
    }
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push('…');
    out
}

/// Empty strings count as absent, the way the server leaves them on text messages.
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub fn media_line(message: &Message) -> Option<String> {
    let media = non_empty(message.media_type.as_deref())?;
    Some(format!(
        "📎 {}: {}",
        media,
        non_empty(message.filename.as_deref()).unwrap_or("file")
    ))
}

/// Wrap text to fit within a given width, with indent for continuation lines
pub fn wrap_text(text: &str, indent: usize, width: usize) -> Vec<String> {
    if width <= indent {
        return text.split('\n').map(String::from).collect();
    }
    let content_width = width - indent;
    let pad = " ".repeat(indent);
    let mut lines: Vec<String> = Vec::new();

    let push = |lines: &mut Vec<String>, line: String| {
        if lines.is_empty() {
            lines.push(line);
        } else {
            lines.push(format!("{}{}", pad, line));
        }
    };

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split(' ') {
            let chars: Vec<char> = word.chars().collect();
            if chars.len() > content_width {
                if !current.is_empty() {
                    push(&mut lines, std::mem::take(&mut current));
                }
                for chunk in chars.chunks(content_width) {
                    push(&mut lines, chunk.iter().collect());
                }
                continue;
            }
            let candidate_len = if current.is_empty() {
                chars.len()
            } else {
                current.chars().count() + 1 + chars.len()
            };
            if candidate_len <= content_width {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
            } else {
                push(&mut lines, std::mem::replace(&mut current, word.to_string()));
            }
        }
        if !current.is_empty() || paragraph.is_empty() {
            push(&mut lines, current);
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(last: Option<&str>, media: Option<&str>, from_me: bool) -> Chat {
        Chat {
            jid: "1@s.whatsapp.net".to_string(),
            name: "Alice".to_string(),
            is_group: false,
            last_message: last.map(String::from),
            last_message_time: None,
            last_is_from_me: from_me,
            media_type: media.map(String::from),
        }
    }

    fn local(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, h, min, 0).single().unwrap()
    }

    #[test]
    fn test_chat_preview_variants() {
        assert_eq!(chat_preview(&chat(None, None, false)), "No messages yet");
        assert_eq!(chat_preview(&chat(Some(""), None, false)), "No messages yet");
        assert_eq!(chat_preview(&chat(Some("hey"), None, true)), "You: hey");
        assert_eq!(chat_preview(&chat(Some("caption"), Some("image"), false)), "📎 image");
    }

    #[test]
    fn test_chat_preview_truncates() {
        let long = "a".repeat(80);
        let preview = chat_preview(&chat(Some(&long), None, false));
        assert_eq!(preview, format!("{}...", "a".repeat(50)));
    }

    #[test]
    fn test_parse_timestamp_shapes() {
        assert!(parse_timestamp("2024-05-01T12:30:00Z").is_some());
        assert!(parse_timestamp("2024-05-01 12:30:00+02:00").is_some());
        assert!(parse_timestamp("2024-05-01 12:30:00").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }

    #[test]
    fn test_format_time_buckets() {
        let now = local(2030, 6, 15, 18, 0);
        assert_eq!(format_time("2030-06-15 09:05:00", now), "09:05");
        assert_eq!(format_time("2030-06-14 23:00:00", now), "Yesterday");
        assert_eq!(format_time("2030-02-03 10:00:00", now), "Feb 3");
        assert_eq!(format_time("2028-12-25 10:00:00", now), "Dec 25, 2028");
        assert_eq!(format_time("", now), "");
    }

    #[test]
    fn test_media_line() {
        let mut msg = Message::provisional("temp-1".into(), "a", "x", chrono::Utc::now());
        assert!(media_line(&msg).is_none());
        msg.media_type = Some("document".into());
        assert_eq!(media_line(&msg).unwrap(), "📎 document: file");
        msg.filename = Some("report.pdf".into());
        assert_eq!(media_line(&msg).unwrap(), "📎 document: report.pdf");
    }

    #[test]
    fn test_empty_media_fields_count_as_absent() {
        let mut msg = Message::provisional("temp-1".into(), "a", "x", chrono::Utc::now());
        msg.media_type = Some(String::new());
        msg.filename = Some(String::new());
        assert!(media_line(&msg).is_none());

        msg.media_type = Some("image".into());
        assert_eq!(media_line(&msg).unwrap(), "📎 image: file");

        assert_eq!(chat_preview(&chat(Some("hey"), Some(""), false)), "hey");
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("short", 10), "short");
        let out = truncate_to_width("a fairly long chat name", 10);
        assert_eq!(out, "a fairly …");
    }

    #[test]
    fn test_wrap_text() {
        let text = "This is a longer text that should be wrapped at word boundaries properly";
        let lines = wrap_text(text, 2, 20);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.chars().count() <= 20, "Line too long: {}", line);
        }
        assert!(lines[1].starts_with("  "));
    }

    #[test]
    fn test_wrap_text_splits_long_words() {
        let lines = wrap_text(&"x".repeat(25), 0, 10);
        assert_eq!(lines, vec!["x".repeat(10), "x".repeat(10), "x".repeat(5)]);
    }
}
