use reqwest::Url;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Get current timestamp in milliseconds
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Render a duration as "1m 05s" / "42s" / "850ms"
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Longest list rendered in one reply.
pub const MAX_LISTED_ITEMS: usize = 30;
const MAX_ITEM_CHARS: usize = 160;

// Append "- item" lines, keeping the first MAX_LISTED_ITEMS and counting the rest
pub fn push_list<I, S>(text: &mut String, items: I)
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hidden = 0;
    for (idx, item) in items.into_iter().enumerate() {
        if idx >= MAX_LISTED_ITEMS {
            hidden += 1;
            continue;
        }
        let item = item.as_ref();
        text.push_str("\n- ");
        match item.char_indices().nth(MAX_ITEM_CHARS) {
            Some((cut, _)) => {
                text.push_str(&item[..cut]);
                text.push_str("...");
            }
            None => text.push_str(item),
        }
    }
    if hidden > 0 {
        text.push_str(&format!("\n... and {} more", hidden));
    }
}

// Reduce a host or URL to its lowercase ASCII (punycode) hostname
pub fn normalize_host(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    // "panel.example.com:8443" parses with a bogus scheme and no host
    let parsed = match Url::parse(trimmed) {
        Ok(url) if url.host_str().is_some() => url,
        _ if trimmed.contains("://") => return None,
        _ => Url::parse(&format!("http://{}", trimmed)).ok()?,
    };

    let host = parsed.host_str()?.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
