//! Parameter filters compiled to key predicates.
//!
//! Every filter becomes one or more anchored regular expressions tested
//! against stored keys. Compilation is pure, so a bad filter is rejected
//! before the store is touched.

use regex::Regex;
use serde::Deserialize;

use crate::error::SsmError;
use crate::ssm::name::{ParamName, ParamPath};

/// A filter as supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterFilter {
    /// `Name` or `Path`.
    pub key: String,
    /// Defaults to `Equals` for `Name` and `OneLevel` for `Path`.
    #[serde(default)]
    pub option: Option<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

impl ParameterFilter {
    #[must_use]
    pub fn new(key: &str, option: Option<&str>, values: &[&str]) -> Self {
        Self {
            key: key.to_owned(),
            option: option.map(str::to_owned),
            values: values.iter().map(|v| (*v).to_owned()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterMode {
    Equals,
    BeginsWith,
    Recursive,
    OneLevel,
}

impl FilterMode {
    fn resolve(filter: &ParameterFilter) -> Result<Self, SsmError> {
        let invalid_option = |option: &str| SsmError::InvalidFilterOption {
            key: filter.key.clone(),
            option: option.to_owned(),
        };
        match (filter.key.as_str(), filter.option.as_deref()) {
            ("Name", None | Some("Equals")) => Ok(Self::Equals),
            ("Name", Some("BeginsWith")) => Ok(Self::BeginsWith),
            ("Path", None | Some("OneLevel")) => Ok(Self::OneLevel),
            ("Path", Some("Recursive")) => Ok(Self::Recursive),
            ("Name" | "Path", Some(other)) => Err(invalid_option(other)),
            (other, _) => Err(SsmError::InvalidFilterKey {
                key: other.to_owned(),
            }),
        }
    }
}

fn anchored(pattern: &str) -> Result<Regex, SsmError> {
    Regex::new(pattern).map_err(|e| SsmError::InvalidFilterValue {
        reason: e.to_string(),
    })
}

/// Pattern for every parameter below `path`, at any depth.
fn recursive_pattern(path: &ParamPath) -> String {
    if path.is_root() {
        "^/.+".to_owned()
    } else {
        format!("^{}/.+", regex::escape(path.as_str()))
    }
}

/// Pattern for parameters exactly one level below `path`.
fn one_level_pattern(path: &ParamPath) -> String {
    if path.is_root() {
        "^/[^/]+$".to_owned()
    } else {
        format!("^{}/[^/]+$", regex::escape(path.as_str()))
    }
}

/// `BeginsWith` values may end in `/`, so they are not full names.
fn begins_with_prefix(value: &str) -> Result<String, SsmError> {
    if value.is_empty()
        || !value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))
    {
        return Err(SsmError::InvalidFilterValue {
            reason: format!("'{value}' is not a valid name prefix"),
        });
    }
    Ok(if value.starts_with('/') {
        value.to_owned()
    } else {
        format!("/{value}")
    })
}

/// A compiled set of key patterns.
#[derive(Debug, Clone, Default)]
pub struct KeyMatcher {
    patterns: Vec<Regex>,
}

impl KeyMatcher {
    /// Compile filters into one matcher. A key matches if any value of any
    /// filter matches; an empty filter list matches every key.
    ///
    /// # Errors
    ///
    /// - [`SsmError::InvalidFilterKey`] for a key other than `Name`/`Path`.
    /// - [`SsmError::InvalidFilterOption`] for an option the key does not take.
    /// - [`SsmError::InvalidFilterValue`] for a filter without values.
    /// - The name or path errors of a malformed value.
    pub fn compile(filters: &[ParameterFilter]) -> Result<Self, SsmError> {
        let mut patterns = Vec::new();
        for filter in filters {
            let mode = FilterMode::resolve(filter)?;
            if filter.values.is_empty() {
                return Err(SsmError::InvalidFilterValue {
                    reason: format!("filter '{}' has no values", filter.key),
                });
            }
            for value in &filter.values {
                let pattern = match mode {
                    FilterMode::Equals => {
                        format!("^{}$", regex::escape(ParamName::parse(value)?.as_str()))
                    }
                    FilterMode::BeginsWith => {
                        format!("^{}", regex::escape(&begins_with_prefix(value)?))
                    }
                    FilterMode::Recursive => recursive_pattern(&ParamPath::parse(value)?),
                    FilterMode::OneLevel => one_level_pattern(&ParamPath::parse(value)?),
                };
                patterns.push(anchored(&pattern)?);
            }
        }
        Ok(Self { patterns })
    }

    /// Matcher for the parameters under `path`.
    ///
    /// # Errors
    ///
    /// Only if the generated pattern fails to compile, which escaping rules out.
    pub fn for_path(path: &ParamPath, recursive: bool) -> Result<Self, SsmError> {
        let pattern = if recursive {
            recursive_pattern(path)
        } else {
            one_level_pattern(path)
        };
        Ok(Self {
            patterns: vec![anchored(&pattern)?],
        })
    }

    /// Whether any pattern matches `key`. True for an empty matcher.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(key))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn matcher(key: &str, option: Option<&str>, values: &[&str]) -> KeyMatcher {
        KeyMatcher::compile(&[ParameterFilter::new(key, option, values)]).unwrap()
    }

    #[test]
    fn name_equals_is_exact() {
        let m = matcher("Name", None, &["app/db"]);
        assert!(m.matches("/app/db"));
        assert!(!m.matches("/app/db/password"));
        assert!(!m.matches("/app/dbx"));
    }

    #[test]
    fn name_begins_with() {
        let m = matcher("Name", Some("BeginsWith"), &["/app/d"]);
        assert!(m.matches("/app/db"));
        assert!(m.matches("/app/db/password"));
        assert!(!m.matches("/apx"));
    }

    #[test]
    fn dots_are_literal() {
        let m = matcher("Name", None, &["/a.b"]);
        assert!(m.matches("/a.b"));
        assert!(!m.matches("/aXb"));
    }

    #[test]
    fn recursive_and_one_level() {
        let rec = matcher("Path", Some("Recursive"), &["/app"]);
        let one = matcher("Path", None, &["/app/"]);
        for key in ["/app/db", "/app/db/password"] {
            assert!(rec.matches(key), "{key}");
        }
        assert!(!rec.matches("/app"));
        assert!(!rec.matches("/application/x"));

        assert!(one.matches("/app/db"));
        assert!(!one.matches("/app/db/password"));
    }

    #[test]
    fn root_paths() {
        let one = KeyMatcher::for_path(&ParamPath::root(), false).unwrap();
        let rec = KeyMatcher::for_path(&ParamPath::root(), true).unwrap();
        assert!(one.matches("/top"));
        assert!(!one.matches("/a/b"));
        assert!(rec.matches("/a/b"));
    }

    #[test]
    fn filters_are_ored() {
        let m = KeyMatcher::compile(&[
            ParameterFilter::new("Name", None, &["/x"]),
            ParameterFilter::new("Path", Some("Recursive"), &["/app"]),
        ])
        .unwrap();
        assert!(m.matches("/x"));
        assert!(m.matches("/app/a/b"));
        assert!(!m.matches("/y"));
        assert!(KeyMatcher::compile(&[]).unwrap().matches("/anything"));
    }

    #[test]
    fn bad_filters_are_classified() {
        let err = |f: ParameterFilter| KeyMatcher::compile(&[f]).unwrap_err();
        assert!(matches!(
            err(ParameterFilter::new("Type", None, &["String"])),
            SsmError::InvalidFilterKey { .. }
        ));
        assert!(matches!(
            err(ParameterFilter::new("Name", Some("Recursive"), &["/a"])),
            SsmError::InvalidFilterOption { .. }
        ));
        assert!(matches!(
            err(ParameterFilter::new("Path", Some("Equals"), &["/a"])),
            SsmError::InvalidFilterOption { .. }
        ));
        assert!(matches!(
            err(ParameterFilter::new("Name", None, &[])),
            SsmError::InvalidFilterValue { .. }
        ));
        assert!(matches!(
            err(ParameterFilter::new("Path", None, &["relative"])),
            SsmError::Validation { .. }
        ));
    }
}
