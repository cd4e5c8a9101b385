//! Resource references embedded in stylesheet text.
//!
//! Token extraction is a plain `url(...)` pattern scan. It does not understand
//! comments or escapes; everything that depends on it goes through
//! [`scan_url_tokens`], so a real tokenizer can replace it in one place.

use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use futures::future::join_all;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::file_manager::FileManager;
use crate::html_parser::ResourceKind;
use crate::session::MirrorSession;
use crate::urls::resolve_asset;

static URL_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)url\(([^)]*)\)").expect("url() token pattern is valid"));

/// One `url(...)` occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssToken {
    /// Byte range of the raw token between the parentheses.
    pub span: Range<usize>,
    /// The reference with padding and surrounding quotes stripped.
    pub value: String,
}

pub fn scan_url_tokens(css: &str) -> Vec<CssToken> {
    URL_TOKEN
        .captures_iter(css)
        .filter_map(|caps| caps.get(1))
        .map(|raw| CssToken {
            span: raw.range(),
            value: raw
                .as_str()
                .trim()
                .trim_matches(|c| c == '\'' || c == '"')
                .trim()
                .to_string(),
        })
        .collect()
}

/// Where the stylesheet text being processed will live, which decides how
/// rewritten links are spelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentLocation {
    /// `index.html`: inline `style` attributes and `<style>` blocks.
    Page,
    /// A linked stylesheet saved under `css/`.
    Stylesheet,
}

impl DocumentLocation {
    pub fn directory(self) -> &'static Path {
        match self {
            Self::Page => Path::new(""),
            Self::Stylesheet => Path::new(ResourceKind::Stylesheet.directory()),
        }
    }
}

/// Replaces each span with its text. Spans must be sorted and disjoint.
pub(crate) fn splice(source: &str, edits: &[(Range<usize>, String)]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for (span, text) in edits {
        out.push_str(&source[cursor..span.start]);
        out.push_str(text);
        cursor = span.end;
    }
    out.push_str(&source[cursor..]);
    out
}

#[derive(Clone, Copy)]
pub struct CssProcessor<'a> {
    session: &'a MirrorSession,
}

impl<'a> CssProcessor<'a> {
    pub fn new(session: &'a MirrorSession) -> Self {
        Self { session }
    }

    /// Downloads every resource `css` references into `css/` and returns the
    /// text with each raw token replaced by its local link.
    ///
    /// A URL already claimed in this run is not fetched again. Links are
    /// written whether or not the download succeeded.
    pub async fn process(&self, css: &str, base_url: &Url, location: DocumentLocation) -> String {
        let tokens = scan_url_tokens(css);
        if tokens.is_empty() {
            return css.to_string();
        }

        let mut edits = Vec::with_capacity(tokens.len());
        let mut pending = Vec::new();

        for token in tokens {
            let Some(url) = resolve_asset(base_url, &token.value) else {
                debug!(token = %token.value, "Skipping non-fetchable url() token");
                continue;
            };

            let claim = self.session.claim(ResourceKind::InlineBackground, &url);
            edits.push((
                token.span,
                FileManager::link_from(location.directory(), claim.path()),
            ));
            if claim.is_new() {
                pending.push((url, claim.path().to_path_buf()));
            }
        }

        join_all(
            pending
                .iter()
                .map(|(url, path)| self.session.download_asset(url, path)),
        )
        .await;

        splice(css, &edits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_strips_quotes_and_padding() {
        let css = r#"a{background:url('a.png')} b{background:url( "b.png" )} c{background:URL(c.png)}"#;
        let values: Vec<_> = scan_url_tokens(css).into_iter().map(|t| t.value).collect();
        assert_eq!(values, vec!["a.png", "b.png", "c.png"]);
    }

    #[test]
    fn test_scan_span_covers_raw_token() {
        let css = "div{background:url('a.png')}";
        let tokens = scan_url_tokens(css);
        assert_eq!(tokens.len(), 1);
        assert_eq!(&css[tokens[0].span.clone()], "'a.png'");
    }

    #[test]
    fn test_scan_reports_each_occurrence() {
        let css = ".a{background:url(x.png)} .b{background:url(x.png)}";
        assert_eq!(scan_url_tokens(css).len(), 2);
        assert!(scan_url_tokens("p{color:red}").is_empty());
    }

    #[test]
    fn test_background_image_extraction() {
        let css_content = r#"
            .bg1 { background-image: url('/images/bg1.jpg'); }
            .bg2 { background: url("/images/bg2.jpg") no-repeat; }
            @font-face { src: url(/fonts/f.woff2) format("woff2"); }
            .bg4 { background-color: red; }
        "#;
        let values: Vec<_> = scan_url_tokens(css_content)
            .into_iter()
            .map(|t| t.value)
            .collect();
        assert_eq!(
            values,
            vec!["/images/bg1.jpg", "/images/bg2.jpg", "/fonts/f.woff2"]
        );
    }

    #[test]
    fn test_splice_replaces_only_spans() {
        let css = "a{background:url('a.png')}";
        let edits = vec![(17..24, "css/x".to_string())];
        assert_eq!(splice(css, &edits), "a{background:url(css/x)}");
        assert_eq!(splice(css, &[]), css);
    }
}
