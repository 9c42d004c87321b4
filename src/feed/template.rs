//! `${field}` placeholder substitution for feed rows.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::models::{FieldName, Fields};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_.-]+)\}").expect("placeholder regex is valid")
});

/// Width of zero-padded numeric ids.
const ID_WIDTH: usize = 5;

/// Placeholder names used in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(template)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}

/// Value a placeholder renders to, including derived fields.
pub fn field_value(fields: &Fields, name: FieldName) -> String {
    match name {
        FieldName::Id => pad_id(fields.value(FieldName::Id)),
        FieldName::Pubdate => match fields.get(FieldName::Pubdate) {
            Some(value) if !value.is_empty() => value.to_string(),
            _ => fields.value(FieldName::PublishedDate).to_string(),
        },
        _ => fields.value(name).to_string(),
    }
}

/// Substitute every placeholder; unknown or missing fields render empty.
pub fn render(template: &str, fields: &Fields) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            caps[1]
                .parse::<FieldName>()
                .map(|name| field_value(fields, name))
                .unwrap_or_default()
        })
        .into_owned()
}

fn pad_id(id: &str) -> String {
    if !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()) {
        format!("{id:0>ID_WIDTH$}")
    } else {
        id.to_string()
    }
}
