//! Complaint body extraction.
//!
//! Complaints arrive either as plain text or as the XML document they were
//! filed as. [`extract_text`] returns the span the extractors should score.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::ValidationError;

/// Elements that may carry the complaint text, most specific first.
pub const BODY_ELEMENTS: &[&str] = &[
    "complaint_text",
    "description",
    "message",
    "subject",
    "content",
];

static OPEN_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(complaint_text|description|message|subject|content)(?:\s[^>]*?)?(/?)>")
        .expect("OPEN_TAG regex should compile")
});

static CLOSE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"</\s*(complaint_text|description|message|subject|content)\s*>")
        .expect("CLOSE_TAG regex should compile")
});

static CDATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").expect("CDATA regex should compile")
});

static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("ANY_TAG regex should compile"));

static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|amp|lt|gt|quot|apos);")
        .expect("ENTITY regex should compile")
});

/// Extract, validate and bound the text to score.
///
/// XML bodies yield the first non-empty element of [`BODY_ELEMENTS`].
/// Text longer than `max_bytes` is cut at a char boundary.
pub fn extract_text(raw: &str, min_chars: usize, max_bytes: usize) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    let text = if trimmed.starts_with('<') {
        from_xml(trimmed)?
    } else {
        trimmed.to_string()
    };

    let text = truncate(text.trim(), max_bytes);
    if text.is_empty() {
        return Err(ValidationError::Empty);
    }
    if !text.chars().any(char::is_alphanumeric) {
        return Err(ValidationError::NonText);
    }
    let chars = text.chars().count();
    if chars < min_chars {
        return Err(ValidationError::TooShort {
            chars,
            min: min_chars,
        });
    }
    Ok(text.to_string())
}

fn from_xml(doc: &str) -> Result<String, ValidationError> {
    let mut found_any = false;

    for element in BODY_ELEMENTS {
        let Some(open) = OPEN_TAG.captures_iter(doc).find(|c| &c[1] == *element) else {
            continue;
        };
        found_any = true;

        // <message/> carries nothing
        if &open[2] == "/" {
            continue;
        }

        let start = open.get(0).map_or(0, |m| m.end());
        let close = CLOSE_TAG
            .captures_iter(&doc[start..])
            .find(|c| &c[1] == *element)
            .and_then(|c| c.get(0))
            .ok_or_else(|| ValidationError::MalformedMarkup(format!("unclosed <{element}>")))?;

        let inner = decode(&doc[start..start + close.start()]);
        if !inner.trim().is_empty() {
            return Ok(inner);
        }
    }

    if found_any {
        Err(ValidationError::Empty)
    } else {
        Err(ValidationError::MalformedMarkup(format!(
            "no complaint text element (expected one of {})",
            BODY_ELEMENTS.join(", ")
        )))
    }
}

/// CDATA is taken literally; everything else has tags stripped and entities
/// unescaped.
fn decode(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut last = 0;
    for cdata in CDATA.captures_iter(fragment) {
        let Some(whole) = cdata.get(0) else { continue };
        out.push_str(&decode_markup(&fragment[last..whole.start()]));
        out.push_str(&cdata[1]);
        last = whole.end();
    }
    out.push_str(&decode_markup(&fragment[last..]));
    out
}

fn decode_markup(fragment: &str) -> String {
    let stripped = ANY_TAG.replace_all(fragment, " ");
    ENTITY
        .replace_all(&stripped, |caps: &regex::Captures<'_>| unescape(&caps[1], &caps[0]))
        .into_owned()
}

fn unescape(entity: &str, original: &str) -> String {
    let decoded = match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        numeric => {
            let code = match numeric.strip_prefix("#x").or_else(|| numeric.strip_prefix("#X")) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => numeric.strip_prefix('#').and_then(|d| d.parse().ok()),
            };
            code.and_then(char::from_u32)
        }
    };
    decoded.map_or_else(|| original.to_string(), String::from)
}

fn truncate(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(raw: &str) -> Result<String, ValidationError> {
        extract_text(raw, 5, 64 * 1024)
    }

    #[test]
    fn test_plain_text_is_trimmed() {
        assert_eq!(extract("  Thanks for the quick help!\n").unwrap(), "Thanks for the quick help!");
    }

    #[test]
    fn test_xml_prefers_complaint_text() {
        let doc = r#"<complaint id="7">
  <subject>Billing</subject>
  <complaint_text>My invoice is wrong again</complaint_text>
</complaint>"#;
        assert_eq!(extract(doc).unwrap(), "My invoice is wrong again");
    }

    #[test]
    fn test_xml_falls_back_through_elements() {
        let doc = "<complaint><complaint_text/><description>  </description><message>Parcel never arrived</message></complaint>";
        assert_eq!(extract(doc).unwrap(), "Parcel never arrived");
    }

    #[test]
    fn test_xml_entities_and_cdata() {
        let doc = "<c><message>Fish &amp; chips &#8212; &lt;cold&gt; <![CDATA[5 < 6 & &amp;]]></message></c>";
        assert_eq!(extract(doc).unwrap(), "Fish & chips \u{2014} <cold> 5 < 6 & &amp;");
    }

    #[test]
    fn test_xml_nested_markup_is_stripped() {
        let doc = "<c><description>This is <b>really</b> bad</description></c>";
        let text = extract(doc).unwrap();
        assert_eq!(text.split_whitespace().collect::<Vec<_>>(), vec!["This", "is", "really", "bad"]);
    }

    #[test]
    fn test_xml_attributes_on_body_element() {
        let doc = r#"<c><message lang="en">Rude driver today</message></c>"#;
        assert_eq!(extract(doc).unwrap(), "Rude driver today");
    }

    #[test]
    fn test_xml_without_known_elements_is_malformed() {
        assert!(matches!(
            extract("<c><title>Hello world</title></c>"),
            Err(ValidationError::MalformedMarkup(_))
        ));
    }

    #[test]
    fn test_xml_unclosed_element_is_malformed() {
        assert!(matches!(
            extract("<c><message>Hello world</c>"),
            Err(ValidationError::MalformedMarkup(_))
        ));
    }

    #[test]
    fn test_xml_with_only_empty_elements() {
        assert_eq!(
            extract("<c><message></message></c>"),
            Err(ValidationError::Empty)
        );
    }

    #[test]
    fn test_empty_and_non_text() {
        assert_eq!(extract("   "), Err(ValidationError::Empty));
        assert_eq!(extract("!!! ??? ..."), Err(ValidationError::NonText));
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            extract("ok"),
            Err(ValidationError::TooShort { chars: 2, min: 5 })
        );
    }

    #[test]
    fn test_truncates_at_char_boundary() {
        let text = "ééééé abc";
        let out = extract_text(text, 1, 5).unwrap();
        assert_eq!(out, "éé");
    }

    #[test]
    fn test_invalid_numeric_entity_is_kept() {
        let doc = "<c><message>bad &#xD800; char</message></c>";
        assert_eq!(extract(doc).unwrap(), "bad &#xD800; char");
    }
}
