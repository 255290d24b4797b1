//! HTML page shell around the rendered application.

use askama::Template;

use crate::error::TemplateError;

#[derive(Template)]
#[template(path = "page.html")]
struct PageTemplate<'a> {
    title: &'a str,
    /// Hydration script, inserted raw.
    javascript: &'a str,
    /// Server-rendered markup, inserted raw.
    app_html: &'a str,
    /// Props as a JS object literal, inserted raw.
    app_props: &'a str,
}

/// Fill the page shell.
///
/// `javascript` and `app_props` land inside inline `<script>` elements and
/// are passed through [`escape_script`].
pub fn render_page(
    title: &str,
    javascript: &str,
    app_html: &str,
    app_props: &str,
) -> Result<String, TemplateError> {
    let javascript = escape_script(javascript);
    let app_props = escape_script(app_props);
    let page = PageTemplate {
        title,
        javascript: &javascript,
        app_html,
        app_props: &app_props,
    };
    Ok(page.render()?)
}

/// Rewrite `</script` (any case) as `<\/script`.
///
/// Inside JS string literals, regexes and template literals `<\/` means the
/// same as `</`, but it no longer ends the enclosing `<script>` element.
pub fn escape_script(source: &str) -> String {
    const NEEDLE: &str = "</script";

    let lower = source.to_ascii_lowercase();
    let mut out = String::with_capacity(source.len());
    let mut last = 0;
    for (index, _) in lower.match_indices(NEEDLE) {
        out.push_str(&source[last..index + 1]);
        out.push('\\');
        last = index + 1;
    }
    out.push_str(&source[last..]);
    out
}
