use crate::models::{ContentSource, LinkFacet, RenderedPost};

/// Default post format: quoted title, line break, permalink.
pub const DEFAULT_TEMPLATE: &str = r#""{title}"\n{url}"#;

pub struct ContentComposer;

impl ContentComposer {
    /// Renders `template` for `source` and links the first occurrence of the
    /// permalink in the resulting text.
    pub fn render(template: &str, source: &ContentSource) -> RenderedPost {
        let text = Self::apply_template(template, source);
        let facets = Self::link_facet(&text, &source.permalink)
            .into_iter()
            .collect();

        RenderedPost { text, facets }
    }

    /// Replaces `{title}`, `{url}` and `{excerpt}` in one pass, so inserted
    /// values are never scanned for placeholders. Afterwards every
    /// two-character `\n` escape in the rendered text becomes a line break,
    /// including one that came from a title or excerpt.
    pub fn apply_template(template: &str, source: &ContentSource) -> String {
        let mut out = String::with_capacity(template.len() + source.title.len() + source.permalink.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let tail = &rest[open..];

            let (value, consumed) = if tail.starts_with("{title}") {
                (source.title.as_str(), "{title}".len())
            } else if tail.starts_with("{url}") {
                (source.permalink.as_str(), "{url}".len())
            } else if tail.starts_with("{excerpt}") {
                (source.excerpt.as_str(), "{excerpt}".len())
            } else {
                ("{", 1)
            };

            out.push_str(value);
            rest = &tail[consumed..];
        }
        out.push_str(rest);

        out.replace("\\n", "\n")
    }

    /// Byte range of the first occurrence of `url` in `text`.
    pub fn link_facet(text: &str, url: &str) -> Option<LinkFacet> {
        if url.is_empty() {
            return None;
        }

        text.find(url).map(|byte_start| LinkFacet {
            byte_start,
            byte_end: byte_start + url.len(),
            target: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, url: &str, excerpt: &str) -> ContentSource {
        ContentSource::new("42", title, url, excerpt)
    }

    // ==================== Template Tests ====================

    #[test]
    fn test_default_template_with_multibyte_title() {
        let post = ContentComposer::render(
            DEFAULT_TEMPLATE,
            &source("速報", "https://example.com/p", ""),
        );

        assert_eq!(post.text, "\"速報\"\nhttps://example.com/p");
        assert_eq!(post.facets.len(), 1);
    }

    #[test]
    fn test_all_placeholders_and_blank_line() {
        let text = ContentComposer::apply_template(
            "{title}\\n{excerpt}\\n\\n{url}",
            &source("Title", "https://a.com/x", "Short excerpt"),
        );

        assert_eq!(text, "Title\nShort excerpt\n\nhttps://a.com/x");
    }

    #[test]
    fn test_escape_in_values_becomes_line_break() {
        let text = ContentComposer::apply_template(
            "{title}\\n{excerpt}",
            &source(r"Part 1\nPart 2", "https://a.com", r"one\ntwo"),
        );

        assert_eq!(text, "Part 1\nPart 2\none\ntwo");
    }

    #[test]
    fn test_unknown_placeholders_pass_through() {
        let text = ContentComposer::apply_template(
            "{author} wrote {title} {",
            &source("Post", "https://a.com", ""),
        );

        assert_eq!(text, "{author} wrote Post {");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let text = ContentComposer::apply_template(
            "{title} {url}",
            &source("About {url} tokens", "https://a.com", ""),
        );

        assert_eq!(text, "About {url} tokens https://a.com");
    }

    // ==================== Facet Tests ====================

    #[test]
    fn test_facet_uses_utf8_byte_offsets() {
        let url = "https://example.com/p";
        let post = ContentComposer::render(
            "{title}\\n{url}",
            &source("日本語のタイトル", url, ""),
        );

        let facet = &post.facets[0];
        assert_eq!(facet.byte_end - facet.byte_start, url.len());
        assert_eq!(&post.text.as_bytes()[facet.byte_start..facet.byte_end], url.as_bytes());
        // 8 chars * 3 bytes + newline
        assert_eq!(facet.byte_start, 25);
        assert_eq!(facet.target, url);
    }

    #[test]
    fn test_facet_marks_first_occurrence() {
        let post = ContentComposer::render(
            "{url} and again {url}",
            &source("t", "https://a.com", ""),
        );

        assert_eq!(post.facets.len(), 1);
        assert_eq!(post.facets[0].byte_start, 0);
        assert_eq!(post.facets[0].byte_end, 13);
    }

    #[test]
    fn test_no_url_in_text_means_no_facets() {
        let post = ContentComposer::render("{title}", &source("Only a title", "https://a.com", ""));

        assert_eq!(post.text, "Only a title");
        assert!(post.facets.is_empty());
        assert!(post.link_target().is_none());
    }
}
