//! marginalia-sanitize — ingress sanitizers.
//!
//! Pure functions applied to untrusted submission fields before anything
//! is persisted or mailed. Each sanitizer returns the normalized value
//! plus a report of what was removed, so the moderation mail can tell the
//! admin what the original looked like without ever carrying raw input.

mod author;
mod body;
mod email;
mod url;

pub use author::{sanitize_author_name, AuthorNameReport};
pub use body::{sanitize_comment_body, CommentBodyReport};
pub use email::{sanitize_email, EmailRejection, EmailReport};
pub use url::{sanitize_author_url, AuthorUrlReport, UrlRejection};
