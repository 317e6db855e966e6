//! Message body translation between Slack markup and Mumble HTML.
//!
//! Slack -> Mumble: rewrite `<url|label>` links into `<a href>` anchors.
//! Mumble -> Slack: pull inline base64 images out of the body, then strip the
//! remaining HTML down to plain text.

use base64::Engine as _;
use regex::{Captures, Regex};
use std::sync::OnceLock;

const IMG_OPEN: &str = "<img src=\"";
const DATA_IMAGE_PREFIX: &str = "data:image/";
const BASE64_MARKER: &str = "base64,";

fn slack_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"<(https?:[^|>\s]+)(\|[^>]*)?>")
            .expect("slack link pattern is valid")
    })
}

/// Rewrite Slack links into HTML anchors.
///
/// `<url|label>` becomes `<a href="url">label</a>`. A bare `<url>` uses the url as
/// its label; an explicitly empty label (`<url|>`) gets `empty_label` instead.
pub fn slack_links_to_html(text: &str, empty_label: &str) -> String {
    slack_link_re()
        .replace_all(text, |caps: &Captures| {
            let url = &caps[1];
            let label = match caps.get(2) {
                None => url,
                Some(m) => {
                    let label = &m.as_str()[1..];
                    if label.trim().is_empty() {
                        empty_label
                    } else {
                        label
                    }
                }
            };
            format!("<a href=\"{}\">{}</a>", url, label)
        })
        .into_owned()
}

/// Remove HTML tags, keeping their text content. Line breaks become newlines.
///
/// A `<` that does not open a tag (not followed by a letter, `/` or `!`) or that is
/// never closed is kept as text, so tag-free input comes back unchanged.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(lt) = rest.find('<') {
        out.push_str(&rest[..lt]);
        let after = &rest[lt + 1..];
        let opens_tag = after
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!');
        match after.find('>') {
            Some(gt) if opens_tag => {
                if is_line_break(&after[..gt]) {
                    out.push('\n');
                }
                rest = &after[gt + 1..];
            }
            _ => {
                out.push('<');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_line_break(tag: &str) -> bool {
    let name = tag.trim_end_matches('/').trim();
    name.eq_ignore_ascii_case("br")
}

/// An image decoded from an inline `data:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    /// Subtype from the data URI, e.g. "png" or "jpeg".
    pub subtype: String,
    pub bytes: Vec<u8>,
}

impl InlineImage {
    /// Filename for upload, e.g. "mumble-image-1.png".
    pub fn filename(&self, index: usize) -> String {
        format!("mumble-image-{}.{}", index, self.subtype)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ImageDecodeError {
    #[error("invalid percent escape in image data")]
    Escape,
    #[error("invalid base64 image data: {0}")]
    Base64(String),
}

/// Result of scanning a Mumble body for inline images.
#[derive(Debug)]
pub struct Extraction {
    /// One entry per recognised `<img src="data:image/...;base64,...">` tag, in order.
    pub images: Vec<Result<InlineImage, ImageDecodeError>>,
    /// Body with the recognised image tags removed.
    pub remainder: String,
}

/// Scan `body` for inline base64 images.
///
/// An `<img src="` that lacks a closing quote, a closing `>`, the `data:image/`
/// prefix or the `base64,` marker is left in the remainder untouched. A payload
/// that fails to decode still counts as recognised (the tag is removed) but its
/// entry is an error.
pub fn extract_inline_images(body: &str) -> Extraction {
    let mut images = Vec::new();
    let mut remainder = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(start) = rest.find(IMG_OPEN) {
        remainder.push_str(&rest[..start]);
        let after = &rest[start + IMG_OPEN.len()..];
        match scan_image_tag(after) {
            Some((image, consumed)) => {
                images.push(image);
                rest = &after[consumed..];
            }
            None => {
                remainder.push_str(IMG_OPEN);
                rest = after;
            }
        }
    }
    remainder.push_str(rest);
    Extraction { images, remainder }
}

/// `after` starts just past `<img src="`. Returns the decoded image and how many
/// bytes of `after` the tag spans, or `None` if this is not a complete data image.
fn scan_image_tag(after: &str) -> Option<(Result<InlineImage, ImageDecodeError>, usize)> {
    let quote = after.find('"')?;
    let src = &after[..quote];
    let tag_end = quote + after[quote..].find('>')? + 1;

    let meta_and_data = src.strip_prefix(DATA_IMAGE_PREFIX)?;
    let marker = meta_and_data.find(BASE64_MARKER)?;
    let subtype = meta_and_data[..marker]
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    let payload = &meta_and_data[marker + BASE64_MARKER.len()..];

    let image = decode_payload(payload).map(|bytes| InlineImage {
        subtype: if subtype.is_empty() {
            "png".to_string()
        } else {
            subtype
        },
        bytes,
    });
    Some((image, tag_end))
}

fn decode_payload(payload: &str) -> Result<Vec<u8>, ImageDecodeError> {
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let unescaped = percent_decode(&compact)?;
    base64::engine::general_purpose::STANDARD
        .decode(unescaped.as_bytes())
        .map_err(|e| ImageDecodeError::Base64(e.to_string()))
}

fn percent_decode(s: &str) -> Result<String, ImageDecodeError> {
    if !s.contains('%') {
        return Ok(s.to_string());
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes.get(i + 1..i + 3).ok_or(ImageDecodeError::Escape)?;
            if !hex.iter().all(u8::is_ascii_hexdigit) {
                return Err(ImageDecodeError::Escape);
            }
            let hex = std::str::from_utf8(hex).map_err(|_| ImageDecodeError::Escape)?;
            let value = u8::from_str_radix(hex, 16).map_err(|_| ImageDecodeError::Escape)?;
            out.push(value);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ImageDecodeError::Escape)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLACEHOLDER: &str = "(untitled link)";

    #[test]
    fn labelled_link_becomes_anchor() {
        assert_eq!(
            slack_links_to_html("see <https://example.com|click here>", PLACEHOLDER),
            "see <a href=\"https://example.com\">click here</a>"
        );
    }

    #[test]
    fn empty_label_uses_placeholder() {
        assert_eq!(
            slack_links_to_html("<https://example.com|>", PLACEHOLDER),
            "<a href=\"https://example.com\">(untitled link)</a>"
        );
    }

    #[test]
    fn bare_link_uses_url_as_label() {
        assert_eq!(
            slack_links_to_html("<https://example.com/a?b=1&amp;c=2>", PLACEHOLDER),
            "<a href=\"https://example.com/a?b=1&amp;c=2\">https://example.com/a?b=1&amp;c=2</a>"
        );
    }

    #[test]
    fn several_links_are_rewritten_independently() {
        assert_eq!(
            slack_links_to_html("<http://a.io|A> and <http://b.io|B>", PLACEHOLDER),
            "<a href=\"http://a.io\">A</a> and <a href=\"http://b.io\">B</a>"
        );
    }

    #[test]
    fn non_ascii_and_bracketed_urls_are_rewritten() {
        assert_eq!(
            slack_links_to_html("<https://ja.wikipedia.org/wiki/日本|jp>", PLACEHOLDER),
            "<a href=\"https://ja.wikipedia.org/wiki/日本\">jp</a>"
        );
        let rewritten = slack_links_to_html("<https://w.org/Foo_[bar]{x}^|wiki>", PLACEHOLDER);
        assert_eq!(rewritten, "<a href=\"https://w.org/Foo_[bar]{x}^\">wiki</a>");
        assert_eq!(strip_tags(&rewritten), "wiki");
    }

    #[test]
    fn mentions_are_not_links() {
        let text = "hey <@U123> in <#C456|general>";
        assert_eq!(slack_links_to_html(text, PLACEHOLDER), text);
    }

    #[test]
    fn strip_removes_tags() {
        assert_eq!(
            strip_tags("<b>bold</b> and <a href=\"x\">link</a>"),
            "bold and link"
        );
    }

    #[test]
    fn strip_turns_breaks_into_newlines() {
        assert_eq!(strip_tags("one<br>two<br />three<BR/>"), "one\ntwo\nthree\n");
    }

    #[test]
    fn strip_is_identity_on_plain_text() {
        for text in ["plain words", "a < b and c > d", "x <", "1 <2", "&amp; stays"] {
            assert_eq!(strip_tags(text), text);
            assert_eq!(strip_tags(&strip_tags(text)), strip_tags(text));
        }
    }

    #[test]
    fn image_is_extracted_and_decoded() {
        let body = "alice: <img src=\"data:image/png;base64,AAAA\"/>look at this";
        let extraction = extract_inline_images(body);
        assert_eq!(
            extraction.images,
            vec![Ok(InlineImage {
                subtype: "png".to_string(),
                bytes: vec![0, 0, 0],
            })]
        );
        assert_eq!(extraction.remainder, "alice: look at this");
    }

    #[test]
    fn whitespace_in_payload_is_ignored() {
        let body = "<img src=\"data:image/jpeg;base64,aGVs bG8=\n\" />";
        let extraction = extract_inline_images(body);
        assert_eq!(
            extraction.images,
            vec![Ok(InlineImage {
                subtype: "jpeg".to_string(),
                bytes: b"hello".to_vec(),
            })]
        );
    }

    #[test]
    fn percent_escapes_are_decoded() {
        let body = "<img src=\"data:image/gif;base64,aGVsbG8%3D\"/>";
        let extraction = extract_inline_images(body);
        assert_eq!(
            extraction.images,
            vec![Ok(InlineImage {
                subtype: "gif".to_string(),
                bytes: b"hello".to_vec(),
            })]
        );
    }

    #[test]
    fn signed_percent_escape_is_rejected() {
        for payload in ["AA%+1AA", "AA%-1AA", "AA%2", "AA%G0"] {
            let body = format!("<img src=\"data:image/png;base64,{}\"/>", payload);
            let extraction = extract_inline_images(&body);
            assert_eq!(extraction.images, vec![Err(ImageDecodeError::Escape)], "{}", payload);
        }
    }

    #[test]
    fn bad_base64_is_an_error_but_tag_is_removed() {
        let extraction = extract_inline_images("bob: <img src=\"data:image/png;base64,A!!A\"/>text");
        assert_eq!(extraction.images.len(), 1);
        assert!(matches!(extraction.images[0], Err(ImageDecodeError::Base64(_))));
        assert_eq!(extraction.remainder, "bob: text");
    }

    #[test]
    fn every_image_is_extracted() {
        let body = "<img src=\"data:image/png;base64,AAAA\"/>a<img src=\"data:image/png;base64,AQID\"/>b";
        let extraction = extract_inline_images(body);
        let bytes: Vec<Vec<u8>> = extraction
            .images
            .into_iter()
            .map(|r| r.unwrap().bytes)
            .collect();
        assert_eq!(bytes, vec![vec![0, 0, 0], vec![1, 2, 3]]);
        assert_eq!(extraction.remainder, "ab");
    }

    #[test]
    fn malformed_tags_are_left_alone() {
        for body in [
            "<img src=\"data:image/png;base64,AAAA",
            "<img src=\"data:image/png,AAAA\"/>",
            "<img src=\"data:image/png;base64,AAAA\" no end",
            "<img src=\"https://example.com/cat.png\"/>",
        ] {
            let extraction = extract_inline_images(body);
            assert!(extraction.images.is_empty(), "{}", body);
            assert_eq!(extraction.remainder, body);
        }
    }

    #[test]
    fn filename_uses_subtype() {
        let image = InlineImage {
            subtype: "jpeg".to_string(),
            bytes: vec![],
        };
        assert_eq!(image.filename(2), "mumble-image-2.jpeg");
    }
}
