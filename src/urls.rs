//! URL resolution and URL-to-filename mapping.

use url::Url;

use crate::error::MirrorError;

/// Schemes that never point at a downloadable asset.
const INERT_PREFIXES: [&str; 5] = ["data:", "blob:", "javascript:", "about:", "mailto:"];

/// Maps a URL to a flat local filename.
///
/// Every character that is neither alphanumeric, `_` nor whitespace becomes
/// `_`, then each run of whitespace collapses into a single `_`. Distinct URLs
/// may map to the same name; see [`ResolvedPathCache`](crate::downloader::ResolvedPathCache).
pub fn sanitize_filename(url: &str) -> String {
    let mut filename = String::with_capacity(url.len());
    let mut in_whitespace = false;

    for c in url.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                filename.push('_');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        filename.push(if c.is_alphanumeric() || c == '_' { c } else { '_' });
    }

    filename
}

/// Parses the page URL every other reference is resolved against.
pub fn parse_base(url: &str) -> Result<Url, MirrorError> {
    Url::parse(url.trim()).map_err(|source| MirrorError::InvalidUrl {
        url: url.to_string(),
        source,
    })
}

/// Joins `reference` onto `base` with standard relative-reference semantics.
///
/// Absolute references come back unchanged apart from normalization.
pub fn resolve(base: &Url, reference: &str) -> Result<Url, url::ParseError> {
    base.join(reference.trim())
}

/// Resolves a reference found in markup or stylesheet text, or returns `None`
/// when it does not name a fetchable http(s) resource.
pub fn resolve_asset(base: &Url, reference: &str) -> Option<Url> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let lowered = reference.to_ascii_lowercase();
    if INERT_PREFIXES.iter().any(|prefix| lowered.starts_with(prefix)) {
        return None;
    }

    let url = resolve(base, reference).ok()?;
    matches!(url.scheme(), "http" | "https").then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_punctuation() {
        assert_eq!(
            sanitize_filename("http://x.test/p.png"),
            "http___x_test_p_png"
        );
        assert_eq!(
            sanitize_filename("https://cdn.example.com/a/b.css?v=2&x=1"),
            "https___cdn_example_com_a_b_css_v_2_x_1"
        );
    }

    #[test]
    fn test_sanitize_collapses_whitespace_runs() {
        assert_eq!(sanitize_filename("a  b\t\nc"), "a_b_c");
        assert_eq!(sanitize_filename(" lead"), "_lead");
        assert_eq!(sanitize_filename("keep_under_score"), "keep_under_score");
    }

    #[test]
    fn test_sanitize_is_deterministic_and_restricted() {
        let inputs = [
            "http://x.test/style/a.png",
            "https://example.com/path with spaces/#frag",
            "//weird:%20url?q=1;b=2",
            "",
        ];
        for input in inputs {
            let first = sanitize_filename(input);
            assert_eq!(first, sanitize_filename(input));
            assert!(
                first.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
                "unexpected character in {first:?}"
            );
        }
    }

    #[test]
    fn test_url_resolution() {
        let base = Url::parse("https://example.com/subdir/").unwrap();

        let test_cases = vec![
            ("../style.css", "https://example.com/style.css"),
            ("./script.js", "https://example.com/subdir/script.js"),
            ("images/photo.jpg", "https://example.com/subdir/images/photo.jpg"),
            ("/root.png", "https://example.com/root.png"),
            ("?page=2", "https://example.com/subdir/?page=2"),
            ("#top", "https://example.com/subdir/#top"),
            ("https://cdn.example.com/style.css", "https://cdn.example.com/style.css"),
            ("//cdn.example.com/script.js", "https://cdn.example.com/script.js"),
        ];

        for (input, expected) in test_cases {
            let result = resolve(&base, input).unwrap();
            assert_eq!(result.as_str(), expected, "Failed for input: {}", input);
        }
    }

    #[test]
    fn test_absolute_reference_is_unchanged() {
        let base = Url::parse("http://x.test/deep/page.html").unwrap();
        for absolute in ["http://other.test/a.png", "https://cdn.test/x/y.js?v=1"] {
            assert_eq!(resolve(&base, absolute).unwrap().as_str(), absolute);
        }
    }

    #[test]
    fn test_parse_base_rejects_relative_url() {
        assert!(matches!(
            parse_base("not a url"),
            Err(MirrorError::InvalidUrl { .. })
        ));
        assert_eq!(
            parse_base("http://x.test").unwrap().as_str(),
            "http://x.test/"
        );
    }

    #[test]
    fn test_resolve_asset_skips_inert_references() {
        let base = Url::parse("http://x.test/").unwrap();
        for inert in [
            "",
            "   ",
            "#gradient",
            "data:image/png;base64,AAAA",
            "DATA:image/gif;base64,R0lG",
            "javascript:void(0)",
            "blob:http://x.test/1",
            "ftp://x.test/file.bin",
        ] {
            assert!(resolve_asset(&base, inert).is_none(), "{inert:?} should be skipped");
        }
        assert_eq!(
            resolve_asset(&base, " img/a.png ").unwrap().as_str(),
            "http://x.test/img/a.png"
        );
    }
}
