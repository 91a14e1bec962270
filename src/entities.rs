use html_escape::decode_html_entities;
use std::borrow::Cow;

/// Decode HTML character references (`&amp; &quot; &lt; &gt;`, `&#39;`,
/// `&#x27;`, `&#x2F;`, any decimal or hex reference) in text that has not
/// already been through an HTML parser, such as marketplace API payloads.
///
/// One pass over the input: `&amp;lt;` becomes `&lt;`, never `<`.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    decode_html_entities(input)
}

pub fn decode_optional(value: Option<String>) -> Option<String> {
    value.map(|raw| match decode_entities(&raw) {
        Cow::Borrowed(_) => raw,
        Cow::Owned(decoded) => decoded,
    })
}
