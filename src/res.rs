use axum::response::{Html, IntoResponse, Response};
use pulldown_cmark::{Options, Parser};

use crate::{nav, session::Viewer, AppResult};

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

/// Escapes user supplied text for element content. Braces are encoded too, so text
/// can never be mistaken for a template placeholder.
pub fn esc(text: &str) -> String {
    html_escape::encode_text(text).replace('{', "&#123;")
}

/// Escapes user supplied text for a double quoted attribute.
pub fn attr(text: &str) -> String {
    html_escape::encode_double_quoted_attribute(text).replace('{', "&#123;")
}

/// Wraps a page body in the shared layout with the navigation bar.
pub fn page(title: &str, viewer: &Viewer, main: &str) -> Html<String> {
    Html(
        include_res!(str, "/pages/layout.html")
            .replace("{title}", &esc(title))
            .replace("{nav}", &nav::render(viewer))
            .replace("{main}", main),
    )
}

/// Static placeholder for absent data or a missing session.
pub fn sorry(viewer: &Viewer, message: &str) -> AppResult<Response> {
    Ok(page(
        "Good Neighbor",
        viewer,
        &include_res!(str, "/pages/sorry.html").replace("{message}", &esc(message)),
    )
    .into_response())
}

/// Inline error line next to a form, or nothing.
pub fn error(message: Option<&str>) -> String {
    message
        .map(|message| include_res!(str, "/pages/error.html").replace("{message}", &esc(message)))
        .unwrap_or_default()
}

/// Inline confirmation line, or nothing.
pub fn notice(message: Option<&str>) -> String {
    message
        .map(|message| include_res!(str, "/pages/notice.html").replace("{message}", &esc(message)))
        .unwrap_or_default()
}

/// `<option>` elements for a fixed choice list, marking `selected`.
pub fn options<'a>(choices: impl IntoIterator<Item = &'a str>, selected: Option<&str>) -> String {
    choices
        .into_iter()
        .map(|choice| {
            let mark = if Some(choice) == selected { " selected" } else { "" };
            format!(
                r#"<option value="{}"{mark}>{}</option>"#,
                attr(choice),
                esc(choice)
            )
        })
        .collect()
}

/// Renders trusted Markdown shipped in `res/`.
pub fn markdown(source: &str) -> String {
    let parser = Parser::new_ext(source, Options::ENABLE_TABLES);
    let mut html_output = String::new();
    pulldown_cmark::html::push_html(&mut html_output, parser);
    html_output
}

pub fn price(value: f64) -> String {
    format!("${value:.2}")
}
