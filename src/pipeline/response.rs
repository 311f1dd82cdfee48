//! Response cleanup: raw backend text → JSON text ready for schema parsing.
//!
//! Strict structured output usually returns bare JSON, but provider-agnostic
//! backends (and some gateways) still wrap the object in a ```json fence or
//! prefix it with a BOM. These rules only remove wrapping; they never touch
//! keys or values, so a wrong verdict literal still fails validation.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all cleanup rules to the raw content, in order:
///
/// 1. Trim whitespace and invisible Unicode (BOM, zero-width characters)
///    from both ends
/// 2. Strip an outer ```json / ``` fence
/// 3. Trim the fence contents the same way
///
/// Invisible characters inside the document are kept: they may be part of
/// a string value.
pub fn clean_json_text(input: &str) -> String {
    let s = strip_json_fence(trim_invisible(input));
    trim_invisible(&s).to_string()
}

// ── Rule 1: Trim invisible Unicode at the edges ─────────────────────────────

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}')
}

fn trim_invisible(input: &str) -> &str {
    input.trim_matches(|c: char| c.is_whitespace() || is_invisible(c))
}

// ── Rule 2: Strip outer fences ──────────────────────────────────────────────

static RE_JSON_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n?```\s*$")
        .expect("fence pattern is valid")
});

fn strip_json_fence(input: &str) -> String {
    match RE_JSON_FENCE.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json_is_untouched() {
        assert_eq!(clean_json_text("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn json_fence_is_removed() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(clean_json_text(raw), "{\"a\": 1}");
        let raw = "```\n{\"a\": 1}\n```\n";
        assert_eq!(clean_json_text(raw), "{\"a\": 1}");
    }

    #[test]
    fn leading_bom_and_edge_zero_width_are_removed() {
        let raw = "\u{FEFF}  {\"a\":1}\u{200B}\n";
        assert_eq!(clean_json_text(raw), "{\"a\":1}");
        let raw = "\u{FEFF}```json\n\u{200B}{\"a\":1}\n```";
        assert_eq!(clean_json_text(raw), "{\"a\":1}");
    }

    #[test]
    fn joiners_inside_values_survive() {
        let raw = "{\"finalConclusion\":\"a\u{200D}b\"}";
        assert_eq!(clean_json_text(raw), raw);
        let parsed: serde_json::Value = serde_json::from_str(&clean_json_text(raw)).unwrap();
        assert_eq!(parsed["finalConclusion"], "a\u{200D}b");
    }

    #[test]
    fn values_are_not_rewritten() {
        let raw = "{\"physicalVerdict\": \"APTO CONDICIONADO\"}";
        assert_eq!(clean_json_text(raw), raw);
    }

    #[test]
    fn inner_fences_survive() {
        let raw = "{\"notes\": \"```\"}";
        assert_eq!(clean_json_text(raw), raw);
    }
}
