//! `{{name}}` placeholder substitution for input text.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}")
            .expect("placeholder regex must compile")
    })
}

/// Replace `{{name}}` placeholders with values from `vars`.
///
/// Unknown placeholders are left as written.
pub fn render_placeholders(text: &str, vars: &HashMap<String, String>) -> String {
    if vars.is_empty() || !text.contains("{{") {
        return text.to_string();
    }
    placeholder_re()
        .replace_all(text, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> HashMap<String, String> {
        HashMap::from([
            ("city".to_string(), "Oslo".to_string()),
            ("user.name".to_string(), "Kari".to_string()),
        ])
    }

    #[test]
    fn substitutes_known_names() {
        assert_eq!(
            render_placeholders("Weather in {{city}} for {{ user.name }}?", &vars()),
            "Weather in Oslo for Kari?"
        );
    }

    #[test]
    fn keeps_unknown_placeholders() {
        assert_eq!(
            render_placeholders("{{city}} / {{country}}", &vars()),
            "Oslo / {{country}}"
        );
    }
}
