use sha2::{Digest, Sha256};

const MAX_NAME_LEN: usize = 120;

/// `grok_video_{id}`, or `grok_video_{short_hash(url)}` when the id is unknown.
pub fn video_basename(video_id: Option<&str>, video_url: &str) -> String {
    let id = video_id
        .map(sanitize_component)
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| short_hash(video_url));
    format!("grok_video_{id}")
}

/// Makes a consumer-supplied filename safe to create inside the output dir.
///
/// Directory components are dropped and reserved characters replaced.
pub fn sanitize_filename(input: &str) -> String {
    let last = input.rsplit(['/', '\\']).next().unwrap_or(input);
    let mut name = sanitize_component(last);
    if name.is_empty() {
        name = "download".to_string();
    }
    if is_reserved_windows_name(name.split('.').next().unwrap_or(&name)) {
        name.insert(0, '_');
    }
    name
}

fn sanitize_component(input: &str) -> String {
    let mut compacted = String::with_capacity(input.len());
    let mut prev_underscore = false;
    for c in input.chars() {
        let c = if is_forbidden(c) { '_' } else { c };
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }
    let mut trimmed = compacted.trim_matches(&['_', ' ', '.'][..]).to_string();
    if trimmed.len() > MAX_NAME_LEN {
        let mut end = MAX_NAME_LEN;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        trimmed.truncate(end);
    }
    trimmed
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
