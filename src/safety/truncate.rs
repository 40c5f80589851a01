//! Log truncation that keeps prefix and suffix and respects UTF-8 boundaries.

/// Shorten `content` to roughly `max_bytes` for a log line.
pub fn truncate_for_log(content: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }

    if max_bytes == 0 {
        return format!("... [{} bytes truncated] ...", content.len());
    }

    let half = max_bytes / 2;
    let mut prefix_end = 0;
    for (idx, c) in content.char_indices() {
        let char_end = idx + c.len_utf8();
        if char_end > half {
            break;
        }
        prefix_end = char_end;
    }

    let suffix_target = content.len().saturating_sub(half);
    let mut suffix_start = content.len();
    for (idx, _) in content.char_indices().rev() {
        if idx < suffix_target {
            break;
        }
        suffix_start = idx;
    }
    suffix_start = suffix_start.max(prefix_end);

    let prefix = &content[..prefix_end];
    let suffix = &content[suffix_start..];
    let truncated = content.len() - (prefix.len() + suffix.len());
    format!("{} ... [{} bytes truncated] ... {}", prefix, truncated, suffix)
}
