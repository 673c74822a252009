//! Markup snippets the renderer injects into the document.

use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Escape text for use in HTML content or a quoted attribute value.
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Serialize a value as a JavaScript literal that is safe inside `<script>`.
///
/// JSON is valid JavaScript, but `</script>`, `<!--` and the U+2028/U+2029
/// line separators are not safe to embed verbatim, so they are written as
/// unicode escapes.
pub fn script_literal(value: &Value) -> Result<String> {
    let json =
        serde_json::to_string(value).map_err(|e| CoreError::Serialization(e.to_string()))?;

    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            _ => out.push(c),
        }
    }
    Ok(out)
}

/// `<link rel="modulepreload">` hint for a chunk URL.
pub fn preload_link(url: &str) -> String {
    format!(r#"<link rel="modulepreload" href="{}">"#, escape_html(url))
}

/// Module script that imports the client entrypoint and calls its default
/// export with the per-plugin bootstrap data.
pub fn hydration_script(entry_url: &str, bootstrap: &Map<String, Value>) -> Result<String> {
    let entry = script_literal(&Value::String(entry_url.to_string()))?;
    let data = script_literal(&Value::Object(bootstrap.clone()))?;

    Ok(format!(
        r#"<script type="module">import hydrate from {entry};hydrate({data});</script>"#
    ))
}
