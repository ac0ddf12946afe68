//! Key Template Resolution
//!
//! A key template is any string containing the `{{entity}}` placeholder,
//! e.g. `ip:{{entity}}`. The placeholder is matched case-insensitively and
//! every occurrence is replaced by the entity value.

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

/// The placeholder token, and the default key template
pub const ENTITY_PLACEHOLDER: &str = "{{entity}}";

static ENTITY_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\{\{entity\}\}").expect("placeholder pattern is valid"));

/// Build the store key for `entity_value` from `template`
///
/// A template that is exactly the placeholder (in any casing) yields the
/// entity value itself. Entity values are inserted literally; `$` has no
/// special meaning.
#[must_use]
pub fn resolve_key(entity_value: &str, template: &str) -> String {
    if template.eq_ignore_ascii_case(ENTITY_PLACEHOLDER) {
        return entity_value.to_string();
    }
    ENTITY_TOKEN.replace_all(template, NoExpand(entity_value)).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_is_identity() {
        for entity in ["8.8.8.8", "example.com", "", "{{entity}}", "a b:c"] {
            assert_eq!(resolve_key(entity, ENTITY_PLACEHOLDER), entity);
        }
    }

    #[test]
    fn test_placeholder_casing_ignored() {
        assert_eq!(resolve_key("8.8.8.8", "{{ENTITY}}"), "8.8.8.8");
        assert_eq!(resolve_key("8.8.8.8", "ip:{{Entity}}"), "ip:8.8.8.8");
    }

    #[test]
    fn test_substitution_preserves_literal_text() {
        assert_eq!(resolve_key("8.8.8.8", "ip:{{entity}}:meta"), "ip:8.8.8.8:meta");
        assert_eq!(resolve_key("abc", "prefix-{{entity}}"), "prefix-abc");
    }

    #[test]
    fn test_every_occurrence_replaced() {
        assert_eq!(resolve_key("x", "{{entity}}/{{ENTITY}}"), "x/x");
    }

    #[test]
    fn test_template_without_placeholder_is_constant() {
        assert_eq!(resolve_key("8.8.8.8", "static-key"), "static-key");
    }

    #[test]
    fn test_entity_value_inserted_literally() {
        assert_eq!(resolve_key("$1 ${0}", "k:{{entity}}"), "k:$1 ${0}");
    }
}
