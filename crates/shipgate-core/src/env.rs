//! `${VAR}` interpolation against an injected environment.
//!
//! Values are never read from process-global state directly; callers pass
//! an [`Environment`] so tests and concurrent invocations stay isolated.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};

/// `${NAME}` or `${NAME:-fallback}`.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").expect("placeholder pattern")
});

/// Source of variable values for interpolation.
pub trait Environment {
    fn get(&self, name: &str) -> Option<String>;
}

/// The current process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

impl Environment for BTreeMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        BTreeMap::get(self, name).cloned()
    }
}

/// Replace every placeholder in `input`.
///
/// `${NAME:-fallback}` uses the fallback when `NAME` is unset or empty.
/// Names that cannot be resolved are pushed onto `unresolved` and replaced
/// with the empty string.
pub fn interpolate(input: &str, env: &dyn Environment, unresolved: &mut Vec<String>) -> String {
    if !input.contains("${") {
        return input.to_string();
    }

    PLACEHOLDER
        .replace_all(input, |caps: &Captures<'_>| {
            let name = &caps[1];
            let value = env.get(name);
            match (value, caps.get(2)) {
                (Some(v), Some(fallback)) if v.is_empty() => fallback.as_str().to_string(),
                (Some(v), _) => v,
                (None, Some(fallback)) => fallback.as_str().to_string(),
                (None, None) => {
                    if !unresolved.iter().any(|u| u == name) {
                        unresolved.push(name.to_string());
                    }
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Interpolate every string inside a parsed TOML document, in place.
pub fn interpolate_value(value: &mut toml::Value, env: &dyn Environment, unresolved: &mut Vec<String>) {
    match value {
        toml::Value::String(s) => *s = interpolate(s, env, unresolved),
        toml::Value::Array(items) => {
            for item in items {
                interpolate_value(item, env, unresolved);
            }
        }
        toml::Value::Table(table) => {
            for (_, item) in table.iter_mut() {
                interpolate_value(item, env, unresolved);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_variables() {
        let env = env(&[("HOST", "10.0.0.4"), ("PORT", "8080")]);
        let mut missing = Vec::new();
        let out = interpolate("http://${HOST}:${PORT}/docs", &env, &mut missing);
        assert_eq!(out, "http://10.0.0.4:8080/docs");
        assert!(missing.is_empty());
    }

    #[test]
    fn fallback_applies_to_unset_and_empty() {
        let env = env(&[("EMPTY", "")]);
        let mut missing = Vec::new();
        assert_eq!(interpolate("${UNSET:-3000}", &env, &mut missing), "3000");
        assert_eq!(interpolate("${EMPTY:-x}", &env, &mut missing), "x");
        assert!(missing.is_empty());
    }

    #[test]
    fn set_but_empty_without_fallback_is_resolved() {
        let env = env(&[("EMPTY", "")]);
        let mut missing = Vec::new();
        assert_eq!(interpolate("a${EMPTY}b", &env, &mut missing), "ab");
        assert!(missing.is_empty());
    }

    #[test]
    fn unresolved_names_are_collected_once() {
        let env = env(&[]);
        let mut missing = Vec::new();
        let out = interpolate("${TOKEN}-${TOKEN}-${OTHER}", &env, &mut missing);
        assert_eq!(out, "--");
        assert_eq!(missing, vec!["TOKEN".to_string(), "OTHER".to_string()]);
    }

    #[test]
    fn plain_dollars_are_left_alone() {
        let env = env(&[]);
        let mut missing = Vec::new();
        assert_eq!(interpolate("cost: $5 {x}", &env, &mut missing), "cost: $5 {x}");
        assert!(missing.is_empty());
    }

    #[test]
    fn walks_nested_toml() {
        let mut doc: toml::Value = toml::from_str(
            r#"
            top = "${A}"
            list = ["${B}", 3]
            [nested]
            inner = "pre-${A}"
            "#,
        )
        .unwrap();
        let env = env(&[("A", "1"), ("B", "2")]);
        let mut missing = Vec::new();
        interpolate_value(&mut doc, &env, &mut missing);

        assert_eq!(doc["top"].as_str(), Some("1"));
        assert_eq!(doc["list"][0].as_str(), Some("2"));
        assert_eq!(doc["list"][1].as_integer(), Some(3));
        assert_eq!(doc["nested"]["inner"].as_str(), Some("pre-1"));
    }
}
