//! HTML-aware minification for rich text constructs.
//!
//! Applied to Atom text constructs whose `type` names an html flavour.

use minify_html::{minify, Cfg};

/// Returns true for Atom text-construct types that carry markup
/// (`html`, `xhtml`, or any media type mentioning html).
pub(crate) fn is_markup_type(media_type: Option<&str>) -> bool {
    media_type.is_some_and(|t| t.to_ascii_lowercase().contains("html"))
}

/// Minifies an HTML fragment. Comments are dropped and inter-element
/// whitespace collapsed; embedded CSS and JS are left as written.
pub(crate) fn minify_markup(markup: &str) -> String {
    let cfg = Cfg::new();
    let minified = minify(markup.as_bytes(), &cfg);
    String::from_utf8_lossy(&minified).into_owned()
}

/// Applies [`minify_markup`] when `media_type` is a markup type, otherwise
/// returns the text unchanged.
pub(crate) fn normalize_text(text: String, media_type: Option<&str>) -> String {
    if is_markup_type(media_type) {
        minify_markup(&text)
    } else {
        text
    }
}
