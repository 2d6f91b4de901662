use url::Url;

/// Schemes whose references are reported exactly as written
const RAW_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:"];

/// Resolves an `href` or `src` attribute against the page's final URL
///
/// Extraction is descriptive: references that have no meaningful absolute
/// form (`javascript:`, `mailto:`, `tel:`, `data:` and fragment-only
/// references) are returned as written, and so is anything the URL parser
/// cannot join. An empty reference points at the page itself and resolves to
/// `base`.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use scrapeflow_engine::url::resolve_reference;
///
/// let base = Url::parse("https://example.com/a/b").unwrap();
/// assert_eq!(resolve_reference(&base, "../c"), "https://example.com/c");
/// assert_eq!(resolve_reference(&base, "#top"), "#top");
/// ```
pub fn resolve_reference(base: &Url, reference: &str) -> String {
    let reference = reference.trim();

    if reference.starts_with('#') {
        return reference.to_string();
    }

    let lower = reference.to_ascii_lowercase();
    if RAW_SCHEMES.iter().any(|scheme| lower.starts_with(scheme)) {
        return reference.to_string();
    }

    match base.join(reference) {
        Ok(absolute) => absolute.to_string(),
        Err(_) => reference.to_string(),
    }
}
