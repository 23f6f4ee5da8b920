//! URL templating with `:name` placeholders.
//!
//! Placeholders are recognised at the start of a template or directly after a
//! `/`, so `http://host:8080/` is left alone while `/users/:id.json` expands
//! `id` and keeps the `.json` extension. Expansion is a single pass over the
//! template: substituted text is never scanned again.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// A source of placeholder values.
pub trait ParamSource {
    /// Look up the value for `name`. `None` means the source has no value.
    fn param(&self, name: &str) -> Option<String>;
}

impl ParamSource for Map<String, Value> {
    fn param(&self, name: &str) -> Option<String> {
        self.get(name).and_then(render)
    }
}

impl ParamSource for Value {
    fn param(&self, name: &str) -> Option<String> {
        self.as_object().and_then(|map| map.param(name))
    }
}

impl ParamSource for HashMap<String, String> {
    fn param(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl ParamSource for BTreeMap<String, String> {
    fn param(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

impl<T: ParamSource + ?Sized> ParamSource for &T {
    fn param(&self, name: &str) -> Option<String> {
        (**self).param(name)
    }
}

impl<T: ParamSource> ParamSource for Option<T> {
    fn param(&self, name: &str) -> Option<String> {
        self.as_ref().and_then(|source| source.param(name))
    }
}

/// Render a JSON value as URL text. `null` counts as missing.
fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
            Some(value.to_string())
        }
    }
}

/// Expand `template`, resolving each placeholder from the first source that
/// has a value for it. Unresolved placeholders become empty strings.
pub fn template_url(template: &str, sources: &[&dyn ParamSource]) -> String {
    expand(template, |name| {
        sources.iter().find_map(|source| source.param(name))
    })
}

/// Single-source expansion.
pub fn express(template: &str, params: &dyn ParamSource) -> String {
    template_url(template, &[params])
}

/// List the placeholder names in `template`, in order of appearance.
pub fn placeholders(template: &str) -> Vec<&str> {
    let mut names = Vec::new();
    scan(template, |segment| {
        if let Segment::Placeholder(name) = segment {
            names.push(name);
        }
    });
    names
}

fn expand<F>(template: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    scan(template, |segment| match segment {
        Segment::Literal(text) => out.push_str(text),
        Segment::Placeholder(name) => {
            if let Some(value) = lookup(name) {
                out.push_str(&value);
            }
        }
    });
    out
}

enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn scan<'a, F>(template: &'a str, mut emit: F)
where
    F: FnMut(Segment<'a>),
{
    let bytes = template.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let at_boundary = i == 0 || bytes[i - 1] == b'/';
        if bytes[i] == b':' && at_boundary && starts_name(bytes.get(i + 1)) {
            let name_start = i + 1;
            let mut name_end = name_start + 1;
            while name_end < bytes.len() && continues_name(bytes[name_end]) {
                name_end += 1;
            }

            if literal_start < i {
                emit(Segment::Literal(&template[literal_start..i]));
            }
            emit(Segment::Placeholder(&template[name_start..name_end]));

            i = name_end;
            literal_start = name_end;
        } else {
            i += 1;
        }
    }

    if literal_start < bytes.len() {
        emit(Segment::Literal(&template[literal_start..]));
    }
}

fn starts_name(byte: Option<&u8>) -> bool {
    matches!(byte, Some(b) if b.is_ascii_alphabetic() || *b == b'_')
}

fn continues_name(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}
