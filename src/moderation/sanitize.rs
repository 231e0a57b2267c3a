//! Stripping of markdown wrapping from model output.
//!
//! Models often wrap JSON in a ```` ```json ```` fence or stray backticks.
//! [`sanitize`] peels those layers off until none remain, so the result is a
//! fixed point: `sanitize(sanitize(x)) == sanitize(x)`. It never fails; a
//! leftover fragment is the parser's problem.

const JSON_FENCE: &str = "```";
const JSON_TAG: &str = "json";

/// Remove fenced-code and backtick wrapping, then trim.
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.trim();
    loop {
        let next = if let Some(inner) = strip_json_fence(text) {
            inner
        } else if let Some(rest) = text.strip_prefix('`') {
            rest.strip_suffix('`').unwrap_or(rest)
        } else {
            break;
        };
        text = next.trim();
    }
    text.to_string()
}

/// Strip a leading ```` ```json ```` marker (tag is case-insensitive) and one
/// trailing fence, if present.
fn strip_json_fence(text: &str) -> Option<&str> {
    let after_fence = text.strip_prefix(JSON_FENCE)?;
    let tag = after_fence.get(..JSON_TAG.len())?;
    if !tag.eq_ignore_ascii_case(JSON_TAG) {
        return None;
    }
    let body = &after_fence[JSON_TAG.len()..];
    Some(body.strip_suffix(JSON_FENCE).unwrap_or(body))
}
