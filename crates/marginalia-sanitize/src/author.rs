//! Author name sanitizer.
//!
//! Strict unicode-aware whitelist: letters, digits, spaces, and a small
//! set of name punctuation. Anything that could trigger markdown, HTML,
//! or YAML is dropped. An empty result means the caller should reject the
//! submission.

/// What was changed or removed while sanitizing an author name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuthorNameReport {
    pub changed: bool,
    pub removed_nul_bytes: bool,
    pub removed_control_chars: usize,
    pub removed_disallowed_chars: usize,
    pub collapsed_whitespace: bool,
    pub trimmed: bool,
    /// Input was exactly "---" (a YAML frontmatter breaker) after trimming.
    pub rejected_frontmatter: bool,
}

fn allowed_punct(c: char) -> bool {
    matches!(c, '.' | ',' | '-' | '\'' | '’' | '_')
}

/// Sanitize an author name, truncating to `max_code_points` when non-zero.
/// Length is counted in code points, not bytes.
pub fn sanitize_author_name(input: &str, max_code_points: usize) -> (String, AuthorNameReport) {
    let mut rep = AuthorNameReport::default();
    let original = input;

    // Fold newlines/tabs into spaces so whitespace collapse handles them.
    let mut input = input
        .replace("\r\n", " ")
        .replace(['\r', '\n', '\t'], " ");

    if input.contains('\0') {
        rep.removed_nul_bytes = true;
        input = input.replace('\0', "");
    }

    let trimmed = input.trim();
    if trimmed != input {
        rep.trimmed = true;
    }
    let input = trimmed;

    // Reject a pure frontmatter breaker outright.
    if input == "---" {
        rep.rejected_frontmatter = true;
        rep.changed = !original.is_empty();
        return (String::new(), rep);
    }

    let mut out = String::with_capacity(input.len());
    let mut last_was_space = false;

    for c in input.chars() {
        if c.is_control() {
            rep.removed_control_chars += 1;
            continue;
        }
        if c.is_whitespace() {
            if !last_was_space && !out.is_empty() {
                out.push(' ');
            } else {
                rep.collapsed_whitespace = true;
            }
            last_was_space = true;
            continue;
        }
        last_was_space = false;

        if c.is_alphabetic() || c.is_numeric() || allowed_punct(c) {
            out.push(c);
        } else {
            rep.removed_disallowed_chars += 1;
        }
    }

    let mut out = out.trim_end().to_string();

    if max_code_points > 0 && out.chars().count() > max_code_points {
        out = out.chars().take(max_code_points).collect();
        out = out.trim_end().to_string();
    }

    if out != original {
        rep.changed = true;
    }
    (out, rep)
}
