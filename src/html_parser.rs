//! Page markup: discovering asset references and rewriting them.
//!
//! Discovery and rewriting are separate passes. [`HtmlParser::discover`]
//! parses the page with `select` and lists every reference without touching
//! the document. [`rewrite`] then scans the raw markup and substitutes only the
//! attribute values (and `<style>` bodies) a [`RewritePlan`] maps to new text,
//! so every other byte of the page is preserved.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;
use std::sync::LazyLock;

use html5ever::data::{C1_REPLACEMENTS, NAMED_ENTITIES};
use regex::Regex;
use select::document::Document;
use select::predicate::{Attr, Name};
use tracing::debug;
use url::Url;

use crate::css_processor::{scan_url_tokens, splice};
use crate::error::MirrorError;
use crate::session::MirrorSession;
use crate::urls::{parse_base, resolve_asset};

static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<!--.*?-->|<([A-Za-z][A-Za-z0-9:-]*)((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
        .expect("start tag pattern is valid")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute pattern is valid")
});

/// Elements whose content the tree builder never parses as markup.
const RAW_TEXT_ELEMENTS: [&str; 8] = [
    "script", "style", "textarea", "title", "xmp", "iframe", "noembed", "noframes",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Stylesheet,
    Script,
    Image,
    /// A `url()` token inside stylesheet text, inline styles included.
    InlineBackground,
}

impl ResourceKind {
    /// Output subdirectory the resource is stored in.
    pub fn directory(self) -> &'static str {
        match self {
            Self::Stylesheet | Self::InlineBackground => "css",
            Self::Script => "js",
            Self::Image => "images",
        }
    }
}

/// A single discovered pointer to an external asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
    /// Attribute value as found in the page (entity-decoded).
    pub original_token: String,
    pub kind: ResourceKind,
    pub resolved_url: Url,
    /// Path relative to the output root.
    pub local_path: PathBuf,
}

/// Everything a page asks the mirror to fetch or rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResources {
    pub references: Vec<ResourceReference>,
    /// Distinct `style` attribute values containing `url()` tokens.
    pub inline_styles: Vec<String>,
    /// Distinct `<style>` element bodies containing `url()` tokens.
    pub style_blocks: Vec<String>,
}

impl PageResources {
    pub fn is_empty(&self) -> bool {
        self.references.is_empty() && self.inline_styles.is_empty() && self.style_blocks.is_empty()
    }
}

#[derive(Clone)]
pub struct HtmlParser {
    base_url: Url,
}

impl HtmlParser {
    pub fn new(base_url: &str) -> Result<Self, MirrorError> {
        Ok(Self::from_url(parse_base(base_url)?))
    }

    pub fn from_url(base_url: Url) -> Self {
        Self { base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn discover(&self, html_content: &str) -> PageResources {
        let document = Document::from(html_content);
        let mut resources = PageResources::default();

        for link in document.find(Name("link")) {
            if let (Some(href), Some(rel)) = (link.attr("href"), link.attr("rel")) {
                if is_stylesheet_rel(rel) {
                    self.push_reference(href, ResourceKind::Stylesheet, &mut resources.references);
                }
            }
        }

        for script in document.find(Name("script")) {
            if let Some(src) = script.attr("src") {
                self.push_reference(src, ResourceKind::Script, &mut resources.references);
            }
        }

        for img in document.find(Name("img")) {
            if let Some(src) = img.attr("src") {
                self.push_reference(src, ResourceKind::Image, &mut resources.references);
            }
        }

        for element in document.find(Attr("style", ())) {
            if let Some(style) = element.attr("style") {
                push_stylesheet_text(style.to_string(), &mut resources.inline_styles);
            }
        }

        for block in document.find(Name("style")) {
            push_stylesheet_text(block.text(), &mut resources.style_blocks);
        }

        resources
    }

    fn push_reference(&self, token: &str, kind: ResourceKind, references: &mut Vec<ResourceReference>) {
        let Some(resolved_url) = resolve_asset(&self.base_url, token) else {
            debug!(token, ?kind, "Skipping non-fetchable reference");
            return;
        };

        references.push(ResourceReference {
            original_token: token.to_string(),
            kind,
            local_path: MirrorSession::default_path(kind, &resolved_url),
            resolved_url,
        });
    }
}

fn push_stylesheet_text(text: String, into: &mut Vec<String>) {
    if !scan_url_tokens(&text).is_empty() && !into.contains(&text) {
        into.push(text);
    }
}

/// True when `rel` is exactly the single relation `stylesheet`.
pub fn is_stylesheet_rel(rel: &str) -> bool {
    let mut tokens = rel.split_ascii_whitespace();
    matches!(
        (tokens.next(), tokens.next()),
        (Some(token), None) if token.eq_ignore_ascii_case("stylesheet")
    )
}

/// Replacement text for the rewrite pass, keyed by original (decoded) values.
#[derive(Debug, Clone, Default)]
pub struct RewritePlan {
    links: HashMap<(ResourceKind, String), String>,
    styles: HashMap<String, String>,
    style_blocks: HashMap<String, String>,
}

impl RewritePlan {
    pub fn link(&mut self, kind: ResourceKind, original: impl Into<String>, local: impl Into<String>) {
        self.links.insert((kind, original.into()), local.into());
    }

    pub fn style(&mut self, original: String, rewritten: String) {
        if original != rewritten {
            self.styles.insert(original, rewritten);
        }
    }

    pub fn style_block(&mut self, original: String, rewritten: String) {
        if original != rewritten {
            self.style_blocks.insert(original, rewritten);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.styles.is_empty() && self.style_blocks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Double,
    Single,
    Bare,
}

#[derive(Debug)]
struct RawAttribute {
    name: String,
    value: String,
    /// Absolute byte range of the value, quotes excluded.
    span: Range<usize>,
    quote: Quote,
}

fn parse_attributes(source: &str, offset: usize) -> Vec<RawAttribute> {
    ATTRIBUTE
        .captures_iter(source)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let (value, quote) = match (caps.get(2), caps.get(3), caps.get(4)) {
                (Some(v), _, _) => (v, Quote::Double),
                (_, Some(v), _) => (v, Quote::Single),
                (_, _, Some(v)) => (v, Quote::Bare),
                _ => return None,
            };
            Some(RawAttribute {
                name,
                value: decode_entities(&preprocess(value.as_str())).into_owned(),
                span: offset + value.start()..offset + value.end(),
                quote,
            })
        })
        .collect()
}

/// Applies `plan` to the raw markup. Comments and the content of raw text
/// elements such as `<script>` are never touched.
///
/// Values are compared after the same input preprocessing and character
/// reference decoding the discovery parser applies.
pub fn rewrite(html_content: &str, plan: &RewritePlan) -> String {
    if plan.is_empty() {
        return html_content.to_string();
    }

    let mut edits = Vec::new();
    let mut cursor = 0;

    while let Some(caps) = START_TAG.captures_at(html_content, cursor) {
        let Some(tag) = caps.get(0) else { break };
        cursor = tag.end();

        // Comments match without a tag name.
        let (Some(name), Some(attrs)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let attributes = parse_attributes(attrs.as_str(), attrs.start());
        attribute_edits(&name, &attributes, plan, &mut edits);

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
            let end = find_end_tag(html_content, cursor, &name);
            if name == "style" {
                let body = preprocess(&html_content[cursor..end]);
                if let Some(rewritten) = plan.style_blocks.get(body.as_ref()) {
                    edits.push((cursor..end, rewritten.clone()));
                }
            }
            cursor = end;
        }
    }

    splice(html_content, &edits)
}

/// Byte offset of the first `</name` at or after `from`, ASCII
/// case-insensitive, or the end of input.
fn find_end_tag(html_content: &str, from: usize, name: &str) -> usize {
    let bytes = html_content.as_bytes();
    html_content[from..]
        .match_indices("</")
        .map(|(offset, _)| from + offset)
        .find(|&start| {
            bytes
                .get(start + 2..start + 2 + name.len())
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name.as_bytes()))
        })
        .unwrap_or(html_content.len())
}

fn attribute_edits(
    tag: &str,
    attributes: &[RawAttribute],
    plan: &RewritePlan,
    edits: &mut Vec<(Range<usize>, String)>,
) {
    let target = match tag {
        "link" => attributes
            .iter()
            .find(|attr| attr.name == "rel")
            .filter(|rel| is_stylesheet_rel(&rel.value))
            .map(|_| ("href", ResourceKind::Stylesheet)),
        "script" => Some(("src", ResourceKind::Script)),
        "img" => Some(("src", ResourceKind::Image)),
        _ => None,
    };

    for attr in attributes {
        let replacement = match target {
            Some((name, kind)) if attr.name == name => plan.links.get(&(kind, attr.value.clone())),
            _ if attr.name == "style" => plan.styles.get(&attr.value),
            _ => None,
        };
        if let Some(text) = replacement {
            edits.push((attr.span.clone(), encode_attribute(text, attr.quote)));
        }
    }
}

fn encode_attribute(value: &str, quote: Quote) -> String {
    let needs_quotes = quote == Quote::Bare
        && value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '"' | '\'' | '=' | '<' | '>' | '`'));
    let quote = if needs_quotes { Quote::Double } else { quote };

    let mut encoded = String::with_capacity(value.len() + 2);
    if needs_quotes {
        encoded.push('"');
    }
    for c in value.chars() {
        match (c, quote) {
            ('&', _) => encoded.push_str("&amp;"),
            ('"', Quote::Double) => encoded.push_str("&quot;"),
            ('\'', Quote::Single) => encoded.push_str("&#39;"),
            _ => encoded.push(c),
        }
    }
    if needs_quotes {
        encoded.push('"');
    }
    encoded
}

/// Input stream preprocessing: CR LF and lone CR become LF, NUL becomes
/// U+FFFD.
fn preprocess(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['\r', '\0']) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(
        raw.replace("\r\n", "\n")
            .replace('\r', "\n")
            .replace('\0', "\u{FFFD}"),
    )
}

/// Decodes character references in an attribute value.
fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        decoded.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match decode_entity(&rest[1..]) {
            Some((chars, len)) => {
                decoded.extend(chars.into_iter().flatten());
                rest = &rest[1 + len..];
            }
            None => {
                decoded.push('&');
                rest = &rest[1..];
            }
        }
    }
    decoded.push_str(rest);
    Cow::Owned(decoded)
}

type Decoded = ([Option<char>; 2], usize);

/// Decodes one character reference. `s` starts right after the `&`; the
/// returned length counts the bytes consumed from `s`.
fn decode_entity(s: &str) -> Option<Decoded> {
    match s.strip_prefix('#') {
        Some(numeric) => decode_numeric(numeric).map(|(c, len)| ([Some(c), None], len + 1)),
        None => decode_named(s),
    }
}

fn decode_numeric(s: &str) -> Option<(char, usize)> {
    let (radix, prefix) = match s.as_bytes().first() {
        Some(b'x' | b'X') => (16, 1),
        _ => (10, 0),
    };
    let digits = s[prefix..]
        .bytes()
        .take_while(|b| (*b as char).is_digit(radix))
        .count();
    if digits == 0 {
        return None;
    }

    let code = s[prefix..prefix + digits]
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0u32, |acc, d| acc.saturating_mul(radix).saturating_add(d));
    let mut len = prefix + digits;
    if s[len..].starts_with(';') {
        len += 1;
    }

    let c = match code {
        0x80..=0x9F => C1_REPLACEMENTS[(code - 0x80) as usize]
            .or_else(|| char::from_u32(code))
            .unwrap_or('\u{FFFD}'),
        0 => '\u{FFFD}',
        _ => char::from_u32(code).unwrap_or('\u{FFFD}'),
    };
    Some((c, len))
}

/// Longest match against the named reference table. A match without a
/// trailing `;` followed by `=` or an alphanumeric is left undecoded, as it is
/// inside attribute values.
fn decode_named(s: &str) -> Option<Decoded> {
    let mut matched = None;
    for (i, c) in s.char_indices() {
        let end = i + c.len_utf8();
        match NAMED_ENTITIES.get(&s[..end]) {
            None => break,
            Some(&(0, _)) => {}
            Some(&(first, second)) => matched = Some((end, first, second)),
        }
    }

    let (len, first, second) = matched?;
    if !s[..len].ends_with(';') {
        if let Some(next) = s[len..].chars().next() {
            if next == '=' || next.is_ascii_alphanumeric() {
                return None;
            }
        }
    }

    let second = (second != 0).then(|| char::from_u32(second)).flatten();
    Some(([char::from_u32(first), second], len))
}
