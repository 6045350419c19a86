//! `{{token}}` interpolation.
//!
//! A token is `{{binding.sub.path}}`. The binding is looked up through a
//! [`Resolve`] implementation; the optional sub-path is then walked inside the
//! resolved value. Anything that can't be resolved is left exactly as written,
//! so a partially configured scenario still renders legibly.

use std::borrow::Cow;
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::context::{lookup, path_segments, ContextStore};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([^}]*)\}\}").expect("token pattern is valid")
});

/// Maps a binding name to a value.
pub trait Resolve {
    fn resolve(&self, name: &str) -> Option<Cow<'_, Value>>;
}

impl<F> Resolve for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn resolve(&self, name: &str) -> Option<Cow<'_, Value>> {
        self(name).map(Cow::Owned)
    }
}

impl Resolve for ContextStore {
    fn resolve(&self, name: &str) -> Option<Cow<'_, Value>> {
        self.get(name, None).map(Cow::Borrowed)
    }
}

/// Replace every resolvable `{{token}}` in `text`.
pub fn interpolate<R: Resolve + ?Sized>(text: &str, resolver: &R) -> String {
    if !text.contains("{{") {
        return text.to_owned();
    }
    TOKEN
        .replace_all(text, |caps: &Captures| {
            let token = &caps[1];
            render_token(token, resolver).unwrap_or_else(|| caps[0].to_owned())
        })
        .into_owned()
}

/// Interpolate every string leaf of `value`, leaving its shape untouched.
pub fn interpolate_value<R: Resolve + ?Sized>(value: &Value, resolver: &R) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate(s, resolver)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, resolver))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_value(v, resolver)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Distinct binding names referenced by `text`, in first-seen order.
pub fn referenced_bindings(text: &str) -> Vec<String> {
    let names: IndexSet<String> = TOKEN
        .captures_iter(text)
        .filter_map(|caps| caps[1].trim().split('.').next().map(str::to_owned))
        .filter(|name| !name.is_empty())
        .collect();
    names.into_iter().collect()
}

/// Render a value for inclusion in text: strings verbatim, everything else
/// as compact JSON.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_token<R: Resolve + ?Sized>(token: &str, resolver: &R) -> Option<String> {
    let mut parts = token.trim().split('.');
    let binding = parts.next()?;
    let sub_path: Vec<&str> = parts.collect();

    let resolved = resolver.resolve(binding)?;
    if sub_path.is_empty() {
        return Some(render_value(&resolved));
    }

    let sub_path = sub_path.join(".");
    match &*resolved {
        Value::String(raw) => {
            let parsed: Value = serde_json::from_str(raw).ok()?;
            lookup(&parsed, path_segments(&sub_path)).map(render_value)
        }
        structured => lookup(structured, path_segments(&sub_path)).map(render_value),
    }
}
