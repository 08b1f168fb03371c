/// Signature shared by text cleanup functions
pub type NormalizeFn = fn(&str) -> String;

/// Markup prefixes the client prepends to chat text
const TAG_OPENERS: &[&str] = &["<col=", "<img=", "<shad=", "<u="];

/// Closing delimiter for a tag
const TAG_CLOSE: char = '>';

const NBSP: char = '\u{a0}';

/// Clean one raw text field for display.
///
/// Leading markup tags (`<col=ff0000>`, `<img=2>`) are stripped one after
/// another, non-breaking spaces become plain spaces and surrounding
/// whitespace is trimmed. Text whose first non-blank content is an
/// unterminated tag is returned exactly as given, surrounding whitespace
/// included.
pub fn normalize(raw: &str) -> String {
    if starts_with_unterminated_tag(raw.trim_start()) {
        return raw.to_string();
    }

    let text = raw.replace(NBSP, " ");
    let mut rest = text.trim();
    while let Some(stripped) = strip_leading_tag(rest) {
        rest = stripped.trim_start();
    }

    rest.to_string()
}

/// Clean an optional field; a field that is empty after cleanup is absent
pub fn normalize_optional(raw: Option<&str>, normalize: NormalizeFn) -> Option<String> {
    raw.map(normalize).filter(|text| !text.is_empty())
}

fn opens_with_tag(text: &str) -> bool {
    TAG_OPENERS.iter().any(|opener| text.starts_with(opener))
}

fn strip_leading_tag(text: &str) -> Option<&str> {
    if !opens_with_tag(text) {
        return None;
    }
    text.find(TAG_CLOSE).map(|end| &text[end + TAG_CLOSE.len_utf8()..])
}

fn starts_with_unterminated_tag(text: &str) -> bool {
    opens_with_tag(text) && !text.contains(TAG_CLOSE)
}
