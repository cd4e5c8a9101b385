//! Character encodings of fetched pages and stylesheets.
//!
//! A [`TextBody`] keeps the exact bytes it was decoded from, so an unchanged
//! document is stored byte for byte and a rewritten one goes back out in the
//! encoding it came in.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    Markup,
    /// Honors a leading `@charset` rule.
    Stylesheet,
}

#[derive(Debug, Clone)]
pub struct TextBody {
    pub bytes: Vec<u8>,
    pub text: String,
    pub encoding: &'static Encoding,
}

impl TextBody {
    /// Decodes `bytes`. A byte order mark wins, then (for stylesheets) an
    /// `@charset` rule, then the `charset` parameter of `content_type`, then UTF-8.
    pub fn decode(bytes: Vec<u8>, content_type: Option<&str>, kind: TextKind) -> Self {
        let (encoding, bom_len) = match Encoding::for_bom(&bytes) {
            Some(found) => found,
            None => {
                let declared = match kind {
                    TextKind::Stylesheet => charset_rule(&bytes),
                    TextKind::Markup => None,
                };
                let encoding = declared
                    .or_else(|| content_type.and_then(charset_from_content_type))
                    .unwrap_or(UTF_8);
                (encoding, 0)
            }
        };

        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        let text = text.into_owned();
        Self {
            bytes,
            text,
            encoding,
        }
    }

    /// Bytes to store for `rewritten`: the original bytes when nothing
    /// changed, otherwise `rewritten` in the source encoding.
    pub fn encode<'a>(&'a self, rewritten: &'a str) -> Cow<'a, [u8]> {
        if rewritten == self.text {
            return Cow::Borrowed(&self.bytes);
        }
        let (encoded, _, _) = self.encoding.encode(rewritten);
        encoded
    }
}

fn charset_rule(bytes: &[u8]) -> Option<&'static Encoding> {
    let rest = bytes.strip_prefix(b"@charset \"")?;
    let end = rest.iter().position(|&b| b == b'"')?;
    if rest.get(end + 1) != Some(&b';') {
        return None;
    }
    let encoding = Encoding::for_label(&rest[..end])?;
    // A UTF-16 label in an ASCII-compatible rule means UTF-8.
    if encoding == UTF_16BE || encoding == UTF_16LE {
        Some(UTF_8)
    } else {
        Some(encoding)
    }
}

fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches(|c| c == '"' || c == '\'');
        Encoding::for_label(label.as_bytes())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unchanged_text_keeps_original_bytes() {
        let latin1 = b"<p>caf\xe9</p>".to_vec();
        let body = TextBody::decode(latin1.clone(), Some("text/html; charset=ISO-8859-1"), TextKind::Markup);

        assert_eq!(body.text, "<p>caf\u{e9}</p>");
        assert_eq!(body.encode(&body.text).as_ref(), latin1.as_slice());
    }

    #[test]
    fn test_rewritten_text_uses_source_encoding() {
        let body = TextBody::decode(b"<img src=a>\xe9".to_vec(), Some("text/html;charset=\"windows-1252\""), TextKind::Markup);
        assert_eq!(body.encode("<img src=b>\u{e9}").as_ref(), b"<img src=b>\xe9");
    }

    #[test]
    fn test_bom_wins_over_header() {
        let body = TextBody::decode(b"\xef\xbb\xbfok".to_vec(), Some("text/html; charset=latin1"), TextKind::Markup);
        assert_eq!(body.encoding, UTF_8);
        assert_eq!(body.text, "ok");
    }

    #[test]
    fn test_charset_rule_applies_to_stylesheets_only() {
        let css = b"@charset \"windows-1252\";\na::after{content:'\xe9'}".to_vec();
        let sheet = TextBody::decode(css.clone(), None, TextKind::Stylesheet);
        assert!(sheet.text.ends_with("content:'\u{e9}'}"));

        let markup = TextBody::decode(css, None, TextKind::Markup);
        assert_eq!(markup.encoding, UTF_8);
    }

    #[test]
    fn test_defaults_to_utf8() {
        let body = TextBody::decode("h\u{e9}".as_bytes().to_vec(), Some("text/html"), TextKind::Markup);
        assert_eq!(body.encoding, UTF_8);
        assert_eq!(body.text, "h\u{e9}");
    }
}
