//! Placeholder extraction and parameter reconciliation for SQL view templates.
//!
//! A SQL view query declares its variables as `${identifier}` placeholders.
//! Only declared placeholders are ever forwarded upstream: user-supplied
//! values for names the template does not declare are dropped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::Regex;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| {
        let pattern = r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}";
        Regex::new(pattern)
            .unwrap_or_else(|error| panic!("placeholder regex failed to compile: {error}"))
    })
}

/// Placeholder names declared by a template, in first-occurrence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders(Vec<String>);

impl Placeholders {
    /// Iterate names in template order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of distinct placeholders.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the template declares no placeholders.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Placeholders {
    /// Collect names, keeping the first occurrence of each.
    fn from_iter<I: IntoIterator<Item = S>>(names: I) -> Self {
        let mut unique: Vec<String> = Vec::new();
        for name in names {
            let name = name.into();
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Self(unique)
    }
}

/// A declared placeholder has no usable value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("missing value for SQL view parameter `{name}`")]
pub struct MissingParameter {
    name: String,
}

impl MissingParameter {
    /// Build the error for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Placeholder that lacked a value.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Resolved `name → value` pairs in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlViewParameters(Vec<(String, String)>);

impl SqlViewParameters {
    /// Iterate pairs in template order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Look up a resolved value.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find_map(|(candidate, value)| (candidate == name).then_some(value))
    }

    /// Number of resolved parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameters were resolved.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Pairs sorted by name, for fingerprinting.
    pub fn sorted(&self) -> BTreeMap<&str, &str> {
        self.iter().collect()
    }
}

/// Scan `template` for `${identifier}` placeholders.
///
/// # Examples
/// ```
/// use sqlview_backend::domain::extract_placeholders;
///
/// let found = extract_placeholders("SELECT * WHERE ou = ${orgUnit} AND pe = ${pe} OR ou = ${orgUnit}");
/// assert_eq!(found.iter().collect::<Vec<_>>(), ["orgUnit", "pe"]);
/// ```
pub fn extract_placeholders(template: &str) -> Placeholders {
    let mut seen = BTreeSet::new();
    let names = placeholder_regex()
        .captures_iter(template)
        .filter_map(|captures| captures.get(1))
        .map(|name| name.as_str())
        .filter(|name| seen.insert(*name))
        .map(str::to_owned)
        .collect();
    Placeholders(names)
}

/// Reconcile declared placeholders with user values and defaults.
///
/// Values are trimmed; a blank user value counts as absent and falls back to
/// a non-blank default. Keys in `user_values` that the template does not
/// declare are ignored.
///
/// # Errors
///
/// Returns [`MissingParameter`] for the first placeholder, in template
/// order, that has neither a user value nor a default.
pub fn build_parameters(
    placeholders: &Placeholders,
    user_values: &BTreeMap<String, String>,
    defaults: &BTreeMap<String, String>,
) -> Result<SqlViewParameters, MissingParameter> {
    placeholders
        .iter()
        .map(|name| {
            non_blank(user_values, name)
                .or_else(|| non_blank(defaults, name))
                .map(|value| (name.to_owned(), value.to_owned()))
                .ok_or_else(|| MissingParameter::new(name))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(SqlViewParameters)
}

fn non_blank<'a>(values: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
    values
        .get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}
