const MAX_SLUG_LEN: usize = 80;

#[must_use]
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    // Output is ASCII, so byte truncation is safe.
    out.truncate(MAX_SLUG_LEN);
    out
}

#[must_use]
pub fn listing_slug(title: &str, id: &str) -> String {
    format!("{}-{id}", slugify(title))
}

#[must_use]
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escapes user text for an HTML email body and keeps its line breaks.
#[must_use]
pub fn html_multiline(input: &str) -> String {
    escape_html(input).replace("\r\n", "\n").replace('\n', "<br/>")
}
