//! Moderation mail builder.
//!
//! Pure function: given the sanitized submission and the two signed
//! decision links, produce the subject and plain-text body sent to the
//! site's admin recipients. Only the sanitized body ever appears in the
//! mail, together with a short factual report of what sanitization
//! removed.

use chrono::DateTime;
use marginalia_sanitize::CommentBodyReport;

/// Everything needed to compose the moderation mail.
#[derive(Debug, Clone)]
pub struct ModerationMailInput<'a> {
    pub site_key: &'a str,
    pub post_path: &'a str,
    pub entry_id: Option<&'a str>,
    pub parent_id: Option<&'a str>,
    pub comment_id: &'a str,
    pub author: &'a str,
    pub author_url: Option<&'a str>,
    pub email: &'a str,
    pub client_ip: Option<&'a str>,
    pub created_at: i64,
    pub sanitized_body: &'a str,
    pub report: &'a CommentBodyReport,
    pub approve_url: &'a str,
    pub reject_url: &'a str,
}

/// Build (subject, body) for the admin moderation mail.
pub fn build_moderation_mail(input: &ModerationMailInput<'_>) -> (String, String) {
    let subject = format!("[marginalia] New comment pending ({})", input.site_key);

    let mut body = String::with_capacity(512 + input.sanitized_body.len());
    body.push_str("New comment pending\n\n");
    body.push_str(&format!("Site: {}\n", input.site_key));
    body.push_str(&format!("Comment ID: {}\n", input.comment_id));
    if let Some(ts) = DateTime::from_timestamp(input.created_at, 0) {
        body.push_str(&format!("Created at: {}\n", ts.to_rfc3339()));
    }
    body.push_str(&format!("Post path: {}\n", input.post_path));
    if let Some(entry_id) = input.entry_id.map(str::trim).filter(|s| !s.is_empty()) {
        body.push_str(&format!("Entry ID: {entry_id}\n"));
    }
    if let Some(parent_id) = input.parent_id.map(str::trim).filter(|s| !s.is_empty()) {
        body.push_str(&format!("Parent ID: {parent_id}\n"));
    }

    body.push('\n');
    body.push_str(&format!("Author: {}\n", input.author));
    body.push_str(&format!("Email: {}\n\n", input.email));
    body.push_str(&format!("Client IP: {}\n\n", input.client_ip.unwrap_or("")));
    body.push_str(&format!("URL: {}\n\n", input.author_url.unwrap_or("")));

    body.push_str("Body (sanitized):\n");
    body.push_str(input.sanitized_body);
    if !input.sanitized_body.ends_with('\n') {
        body.push('\n');
    }
    body.push('\n');

    let rep = input.report;
    body.push_str("Notes:\n");
    body.push_str(&format!("- Sanitizer changed output: {}\n", rep.changed));
    if rep.dropped_frontmatter_breaks > 0 {
        body.push_str(&format!(
            "- Dropped standalone '---' lines: {}\n",
            rep.dropped_frontmatter_breaks
        ));
    }
    if rep.removed_nul_bytes {
        body.push_str("- Removed NUL bytes\n");
    }
    if rep.html_tokens() > 0 {
        body.push_str(&format!(
            "- HTML tokens removed: tags={}, comments={}, doctypes={}\n",
            rep.html_tags, rep.html_comments, rep.html_doctypes
        ));
    }
    if rep.markdown_links > 0 {
        body.push_str(&format!("- Markdown links degraded: {}\n", rep.markdown_links));
    }
    if rep.markdown_images > 0 {
        body.push_str(&format!("- Markdown images degraded: {}\n", rep.markdown_images));
    }
    body.push('\n');

    body.push_str("Approve:\n");
    body.push_str(input.approve_url);
    body.push_str("\n\n");
    body.push_str("Reject:\n");
    body.push_str(input.reject_url);
    body.push('\n');

    (subject, body)
}
