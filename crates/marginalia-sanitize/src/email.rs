//! Email validation.
//!
//! Accepts a plain addr-spec only — no display names, quoting, comments,
//! whitespace, or control characters. The local part is restricted to
//! unquoted atext plus dots; the domain to dot-separated LDH labels.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EmailRejection {
    #[error("email is empty")]
    Empty,
    #[error("email contains whitespace")]
    Whitespace,
    #[error("email contains control characters")]
    ControlChars,
    #[error("email must not contain angle brackets")]
    AngleBrackets,
    #[error("email must not contain quotes")]
    Quotes,
    #[error("email too long")]
    TooLong,
    #[error("invalid email address")]
    BadFormat,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EmailReport {
    pub changed: bool,
    pub trimmed: bool,
    pub lowercased: bool,
}

/// Validate and normalize an email address (trim + lowercase).
/// `max_len` is enforced in bytes after normalization; 254 is the
/// recommended limit.
pub fn sanitize_email(input: &str, max_len: usize) -> Result<(String, EmailReport), EmailRejection> {
    let mut rep = EmailReport::default();
    let original = input;

    let mut value = input.trim().to_string();
    if value != original {
        rep.trimmed = true;
    }
    value = value.replace('\0', "");

    if value.is_empty() {
        return Err(EmailRejection::Empty);
    }
    for c in value.chars() {
        if c.is_control() {
            return Err(EmailRejection::ControlChars);
        }
        if c.is_whitespace() {
            return Err(EmailRejection::Whitespace);
        }
    }
    if value.contains(['<', '>']) {
        return Err(EmailRejection::AngleBrackets);
    }
    if value.contains(['"', '\'']) {
        return Err(EmailRejection::Quotes);
    }

    let lower = value.to_lowercase();
    if lower != value {
        rep.lowercased = true;
        value = lower;
    }

    if max_len > 0 && value.len() > max_len {
        return Err(EmailRejection::TooLong);
    }

    if !is_plain_addr_spec(&value) {
        return Err(EmailRejection::BadFormat);
    }

    rep.changed = value != original;
    Ok((value, rep))
}

/// atext per RFC 5322, minus the quote characters rejected above.
fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '*' | '+' | '-' | '/' | '=' | '?' | '^' | '_' | '`'
                | '{' | '|' | '}' | '~'
        )
}

fn is_plain_addr_spec(s: &str) -> bool {
    let mut parts = s.splitn(2, '@');
    let (Some(local), Some(domain)) = (parts.next(), parts.next()) else {
        return false;
    };
    // A second '@' means the domain side is malformed.
    if domain.contains('@') {
        return false;
    }

    // Local part: dot-atom, 1..=64 bytes.
    if local.is_empty() || local.len() > 64 {
        return false;
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return false;
    }
    if !local.chars().all(|c| is_atext(c) || c == '.') {
        return false;
    }

    // Domain: dot-separated LDH labels, 1..=255 bytes.
    if domain.is_empty() || domain.len() > 255 {
        return false;
    }
    domain.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_addresses() {
        for addr in [
            "a@x.org",
            "first.last@example.co.uk",
            "user+tag@example.org",
            "weird!#$%@example.org",
        ] {
            assert!(sanitize_email(addr, 254).is_ok(), "{addr}");
        }
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        let (out, rep) = sanitize_email("  Ada@Example.ORG ", 254).unwrap();
        assert_eq!(out, "ada@example.org");
        assert!(rep.trimmed);
        assert!(rep.lowercased);
        assert!(rep.changed);
    }

    #[test]
    fn display_names_rejected() {
        assert_eq!(
            sanitize_email("Ada <ada@example.org>", 254).unwrap_err(),
            EmailRejection::Whitespace
        );
        assert_eq!(
            sanitize_email("<ada@example.org>", 254).unwrap_err(),
            EmailRejection::AngleBrackets
        );
        assert_eq!(
            sanitize_email("\"ada\"@example.org", 254).unwrap_err(),
            EmailRejection::Quotes
        );
    }

    #[test]
    fn structural_garbage_rejected() {
        for addr in [
            "plainaddress",
            "@example.org",
            "a@",
            "a@@example.org",
            "a@b@c",
            ".ada@example.org",
            "ada.@example.org",
            "a..b@example.org",
            "a@-bad.org",
            "a@bad-.org",
            "a@ex ample.org",
        ] {
            assert!(sanitize_email(addr, 254).is_err(), "{addr}");
        }
    }

    #[test]
    fn length_boundary() {
        // 254 bytes exactly: accepted; one more: rejected.
        let local = "a".repeat(64);
        let label = "b".repeat(63);
        let domain = format!("{label}.{label}.{}", "c".repeat(61));
        let addr = format!("{local}@{domain}");
        assert_eq!(addr.len(), 254);
        assert!(sanitize_email(&addr, 254).is_ok());

        let too_long = format!("{local}@{domain}x");
        assert_eq!(sanitize_email(&too_long, 254).unwrap_err(), EmailRejection::TooLong);
    }

    #[test]
    fn empty_is_its_own_rejection() {
        assert_eq!(sanitize_email("   ", 254).unwrap_err(), EmailRejection::Empty);
    }
}
