//! Comment body sanitizer.
//!
//! Allowed formatting: bold, italic, inline code, blockquotes. Links,
//! images, and raw HTML are degraded to their text content. The pipeline
//! is: normalize newlines → drop YAML frontmatter breaker lines → strip
//! HTML markup → re-render the markdown AST keeping only allowlisted
//! constructs, escaping everything that could re-introduce markup.

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

/// What was detected or changed while sanitizing a comment body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommentBodyReport {
    pub changed: bool,
    /// Standalone "---" lines removed.
    pub dropped_frontmatter_breaks: usize,
    pub removed_nul_bytes: bool,
    pub html_tags: usize,
    pub html_comments: usize,
    pub html_doctypes: usize,
    /// Markdown links degraded to their link text.
    pub markdown_links: usize,
    /// Markdown images degraded to their alt text.
    pub markdown_images: usize,
}

impl CommentBodyReport {
    pub fn html_tokens(&self) -> usize {
        self.html_tags + self.html_comments + self.html_doctypes
    }
}

/// Sanitize a comment body. The output always ends with exactly one
/// trailing newline.
pub fn sanitize_comment_body(input: &str) -> (String, CommentBodyReport) {
    let mut rep = CommentBodyReport::default();
    let original = input;

    let mut text = input.replace("\r\n", "\n").replace('\r', "\n");

    // Drop standalone frontmatter breaker lines so a body can never
    // terminate the YAML block it is embedded under.
    let mut kept = Vec::new();
    for line in text.split('\n') {
        if line.trim() == "---" {
            rep.dropped_frontmatter_breaks += 1;
        } else {
            kept.push(line);
        }
    }
    text = kept.join("\n");

    if text.contains('\0') {
        rep.removed_nul_bytes = true;
        text = text.replace('\0', "");
    }

    let plain = strip_html(&text, &mut rep);
    let mut out = render_allowed_markdown(&plain, &mut rep);

    out.truncate(out.trim_end_matches('\n').len());
    out.push('\n');

    if out != original {
        rep.changed = true;
    }
    (out, rep)
}

/// Remove HTML tags, comments, and doctype/processing tokens, keeping the
/// surrounding text. A lone '<' that does not open a token is kept as-is.
fn strip_html(input: &str, rep: &mut CommentBodyReport) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(idx) = rest.find('<') {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx..];

        if let Some(stripped) = tail.strip_prefix("<!--") {
            match stripped.find("-->") {
                Some(end) => {
                    rep.html_comments += 1;
                    rest = &stripped[end + 3..];
                }
                None => {
                    // Unterminated comment: keep literally.
                    out.push_str(tail);
                    return out;
                }
            }
        } else if tail.starts_with("<!") || tail.starts_with("<?") {
            match tail.find('>') {
                Some(end) => {
                    rep.html_doctypes += 1;
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(tail);
                    return out;
                }
            }
        } else if tail[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/')
        {
            match tail.find('>') {
                Some(end) => {
                    rep.html_tags += 1;
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push_str(tail);
                    return out;
                }
            }
        } else {
            out.push('<');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Block containers tracked on the render stack.
enum Container {
    Paragraph,
    Blockquote,
    /// Disallowed block construct whose text content is kept.
    Degraded,
}

fn render_allowed_markdown(source: &str, rep: &mut CommentBodyReport) -> String {
    let mut frames: Vec<String> = vec![String::new()];
    let mut containers: Vec<Container> = Vec::new();
    let mut code_block_depth = 0usize;

    for event in Parser::new(source) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Paragraph => {
                    containers.push(Container::Paragraph);
                    frames.push(String::new());
                }
                Tag::BlockQuote(_) => {
                    containers.push(Container::Blockquote);
                    frames.push(String::new());
                }
                Tag::CodeBlock(_) => code_block_depth += 1,
                Tag::Emphasis => push_inline(&mut frames, "*"),
                Tag::Strong => push_inline(&mut frames, "**"),
                Tag::Link { .. } => rep.markdown_links += 1,
                Tag::Image { .. } => rep.markdown_images += 1,
                Tag::Heading { .. }
                | Tag::List(_)
                | Tag::Item
                | Tag::Table(_)
                | Tag::TableHead
                | Tag::TableRow
                | Tag::TableCell
                | Tag::FootnoteDefinition(_)
                | Tag::HtmlBlock => {
                    containers.push(Container::Degraded);
                    frames.push(String::new());
                }
                _ => {}
            },
            Event::End(tag_end) => match tag_end {
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::List(_)
                | TagEnd::Item
                | TagEnd::Table
                | TagEnd::TableHead
                | TagEnd::TableRow
                | TagEnd::TableCell
                | TagEnd::FootnoteDefinition
                | TagEnd::HtmlBlock
                | TagEnd::BlockQuote(_) => close_container(&mut frames, &mut containers),
                TagEnd::CodeBlock => code_block_depth = code_block_depth.saturating_sub(1),
                TagEnd::Emphasis => push_inline(&mut frames, "*"),
                TagEnd::Strong => push_inline(&mut frames, "**"),
                _ => {}
            },
            Event::Text(t) => {
                if code_block_depth == 0 {
                    let escaped = escape_text(&t);
                    push_inline(&mut frames, &escaped);
                }
            }
            Event::Code(code) => {
                let rendered = render_code_span(&code);
                push_inline(&mut frames, &rendered);
            }
            Event::SoftBreak | Event::HardBreak => push_inline(&mut frames, "\n"),
            Event::Html(_) | Event::InlineHtml(_) => rep.html_tags += 1,
            // Rules, footnote refs, task markers, math: dropped.
            _ => {}
        }
    }

    // Close any unbalanced containers.
    while frames.len() > 1 {
        close_container(&mut frames, &mut containers);
    }

    frames.pop().unwrap_or_default()
}

/// Pop the innermost container, format it, and append it to the parent
/// frame. The root frame is never popped.
fn close_container(frames: &mut Vec<String>, containers: &mut Vec<Container>) {
    if frames.len() <= 1 {
        containers.pop();
        return;
    }
    let frame = frames.pop().unwrap_or_default();
    let block = match containers.pop() {
        Some(Container::Blockquote) => quote_block(&frame),
        _ => paragraph_block(&frame),
    };
    push_block(frames, &block);
}

fn push_inline(frames: &mut [String], s: &str) {
    if let Some(top) = frames.last_mut() {
        top.push_str(s);
    }
}

/// Append a finished block to the enclosing frame, blank-line separated.
fn push_block(frames: &mut [String], block: &str) {
    if block.is_empty() {
        return;
    }
    if let Some(top) = frames.last_mut() {
        if !top.is_empty() {
            top.push('\n');
        }
        top.push_str(block);
    }
}

fn paragraph_block(content: &str) -> String {
    let content = content.trim_end_matches([' ', '\t', '\n']);
    if content.is_empty() {
        return String::new();
    }
    format!("{content}\n")
}

fn quote_block(content: &str) -> String {
    let content = content.trim_end_matches('\n');
    if content.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(content.len() + 16);
    for line in content.split('\n') {
        if line.trim().is_empty() {
            out.push_str(">\n");
        } else {
            out.push_str("> ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

fn render_code_span(code: &str) -> String {
    let code = code.replace("\r\n", "\n").replace('\r', "\n");
    let delim = if code.contains("``") {
        "```"
    } else if code.contains('`') {
        "``"
    } else {
        "`"
    };
    format!("{delim}{code}{delim}")
}

/// Escape characters that could re-introduce markdown or HTML structure.
fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '*' | '_' | '[' | ']' | '(' | ')' | '!' | '`' | '<' | '>' => {
                out.push('\\');
                out.push(c);
            }
            '\0' => {}
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_gains_single_trailing_newline() {
        let (out, rep) = sanitize_comment_body("Hello world");
        assert_eq!(out, "Hello world\n");
        assert!(rep.changed);
        assert_eq!(rep.html_tokens(), 0);
    }

    #[test]
    fn bold_italic_and_code_preserved() {
        let (out, _) = sanitize_comment_body("Some **bold**, *italic* and `code` here");
        assert_eq!(out, "Some **bold**, *italic* and `code` here\n");
    }

    #[test]
    fn blockquote_preserved() {
        let (out, _) = sanitize_comment_body("> quoted line\n> second line");
        assert_eq!(out, "> quoted line\n> second line\n");
    }

    #[test]
    fn links_degrade_to_text() {
        let (out, rep) = sanitize_comment_body("see [my site](https://evil.example) please");
        assert_eq!(out, "see my site please\n");
        assert_eq!(rep.markdown_links, 1);
    }

    #[test]
    fn images_degrade_to_alt_text() {
        let (out, rep) = sanitize_comment_body("![alt text](https://evil.example/x.png)");
        assert_eq!(out, "alt text\n");
        assert_eq!(rep.markdown_images, 1);
    }

    #[test]
    fn html_tags_stripped_text_kept() {
        let (out, rep) = sanitize_comment_body("a <b>bold</b> word");
        assert_eq!(out, "a bold word\n");
        assert_eq!(rep.html_tags, 2);
    }

    #[test]
    fn html_comments_and_doctypes_counted() {
        let (out, rep) = sanitize_comment_body("x <!-- hidden --> y <!DOCTYPE html> z");
        assert_eq!(rep.html_comments, 1);
        assert_eq!(rep.html_doctypes, 1);
        assert!(out.contains('x') && out.contains('y') && out.contains('z'));
    }

    #[test]
    fn frontmatter_breakers_dropped() {
        let (out, rep) = sanitize_comment_body("before\n---\nafter");
        assert_eq!(rep.dropped_frontmatter_breaks, 1);
        assert!(!out.contains("---"));
        assert!(out.contains("before") && out.contains("after"));
    }

    #[test]
    fn crlf_normalized_single_trailing_newline() {
        let (out, _) = sanitize_comment_body("line one\r\nline two\r\n\r\n\r\n");
        assert!(!out.contains('\r'));
        assert!(out.ends_with("line two\n"));
        assert!(!out.ends_with("\n\n"));
    }

    #[test]
    fn raw_angle_brackets_escaped_in_text() {
        // "1 < 2" has no tag structure, so '<' survives but escaped.
        let (out, _) = sanitize_comment_body("1 < 2");
        assert_eq!(out, "1 \\< 2\n");
    }

    #[test]
    fn nul_bytes_removed() {
        let (_, rep) = sanitize_comment_body("a\0b");
        assert!(rep.removed_nul_bytes);
    }

    #[test]
    fn paragraphs_blank_line_separated() {
        let (out, _) = sanitize_comment_body("first para\n\nsecond para");
        assert_eq!(out, "first para\n\nsecond para\n");
    }

    #[test]
    fn autolink_degrades() {
        let (out, rep) = sanitize_comment_body("go to <https://example.org> now");
        // The angle-bracketed autolink reads as an HTML-ish token and is
        // stripped before markdown parsing.
        assert!(!out.contains("https://example.org"), "{out}");
        assert!(rep.html_tokens() > 0);
    }

    #[test]
    fn inline_code_with_backticks_renders_longer_fence() {
        let (out, _) = sanitize_comment_body("try `` a`b `` ok");
        assert!(out.contains("``a`b``"), "{out}");
    }

    #[test]
    fn unchanged_flag_only_for_identical_output() {
        let (out, rep) = sanitize_comment_body("plain\n");
        assert_eq!(out, "plain\n");
        assert!(!rep.changed);
    }
}
