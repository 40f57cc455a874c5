//! Normalizers applied to scraped values before they enter the pipeline.
//!
//! Scraped text arrives with HTML entities and layout whitespace; image
//! references are frequently protocol-relative or schemeless; part
//! numbers carry a vendor prefix that the catalog does not use.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

static NUMERIC_ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&#(x[0-9a-fA-F]+|[0-9]+);").expect("valid entity regex"));

/// De-entitize scraped text and strip layout whitespace.
pub fn text(input: &str) -> String {
    let decoded = decode_entities(input);
    decoded
        .replace(['\r', '\n', '\t'], "")
        .trim()
        .to_string()
}

fn decode_entities(input: &str) -> String {
    let named = input
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ");

    NUMERIC_ENTITY
        .replace_all(&named, |caps: &regex::Captures<'_>| {
            let body = &caps[1];
            let code = if let Some(hex) = body.strip_prefix('x') {
                u32::from_str_radix(hex, 16).ok()
            } else {
                body.parse::<u32>().ok()
            };
            code.and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Absolutize an image reference against the source's base URL.
///
/// Protocol-relative (`//cdn...`) references inherit the base scheme,
/// root-relative paths are joined onto the base origin, and references
/// missing a scheme entirely get `<scheme>://` prepended.
pub fn image_url(url: &str, base_url: &str) -> String {
    let base = Url::parse(base_url).ok();
    let scheme = base
        .as_ref()
        .map(|u| u.scheme().to_string())
        .unwrap_or_else(|| "https".to_string());

    if url.starts_with("//") {
        return format!("{scheme}:{url}");
    }
    if url.starts_with('/') {
        if let Some(joined) = base.and_then(|b| b.join(url).ok()) {
            return joined.to_string();
        }
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return format!("{scheme}://{url}");
    }
    url.to_string()
}

/// Strip the `WPW` vendor prefix from a looked-up part number.
pub fn part_number(input: &str) -> String {
    input.strip_prefix("WPW").unwrap_or(input).to_string()
}
