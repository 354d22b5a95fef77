//! Parameter names and hierarchy paths.
//!
//! A parameter is always stored under its fully qualified path. A short name
//! such as `db-password` is the same parameter as `/db-password`.

use std::fmt;

use crate::error::SsmError;

/// Longest accepted name, in bytes.
pub const MAX_NAME_LEN: usize = 1011;

/// Deepest accepted hierarchy.
pub const MAX_HIERARCHY_LEVELS: usize = 15;

const RESERVED_PREFIXES: [&str; 2] = ["aws", "ssm"];

fn validation(reason: String) -> SsmError {
    SsmError::Validation { reason }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/')
}

fn check_chars(raw: &str) -> Result<(), SsmError> {
    if raw.is_empty() {
        return Err(validation("name must not be empty".to_owned()));
    }
    if raw.len() > MAX_NAME_LEN {
        return Err(validation(format!(
            "name is {} characters, the maximum is {MAX_NAME_LEN}",
            raw.len()
        )));
    }
    if let Some(bad) = raw.chars().find(|c| !is_name_char(*c)) {
        return Err(validation(format!("name '{raw}' contains invalid character '{bad}'")));
    }
    Ok(())
}

/// Check the segments after the leading `/` and return how many there are.
fn check_segments(raw: &str, qualified: &str) -> Result<usize, SsmError> {
    let body = qualified.strip_prefix('/').unwrap_or(qualified);
    let mut levels = 0;
    for segment in body.split('/') {
        if segment.is_empty() {
            return Err(validation(format!("name '{raw}' contains an empty path segment")));
        }
        levels += 1;
    }
    if levels > MAX_HIERARCHY_LEVELS {
        return Err(SsmError::HierarchyLevelLimitExceeded {
            name: raw.to_owned(),
            max: MAX_HIERARCHY_LEVELS,
        });
    }
    Ok(levels)
}

/// A validated parameter name in stored form, always starting with `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParamName(String);

impl ParamName {
    /// Validate a short or fully qualified name.
    ///
    /// # Errors
    ///
    /// - [`SsmError::Validation`] for an empty or over-long name, a character
    ///   outside `a-zA-Z0-9_.-/`, an empty segment, or a reserved
    ///   `aws`/`ssm` prefix.
    /// - [`SsmError::HierarchyLevelLimitExceeded`] beyond
    ///   [`MAX_HIERARCHY_LEVELS`] levels.
    pub fn parse(raw: &str) -> Result<Self, SsmError> {
        check_chars(raw)?;
        let qualified = if raw.starts_with('/') {
            raw.to_owned()
        } else {
            format!("/{raw}")
        };
        check_segments(raw, &qualified)?;

        let first = qualified
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if RESERVED_PREFIXES.iter().any(|p| first.starts_with(p)) {
            return Err(validation(format!(
                "name '{raw}' uses a reserved prefix (aws or ssm)"
            )));
        }
        Ok(Self(qualified))
    }

    /// Stored form, also the storage key.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated hierarchy path: the root `/` or `/a/b` without trailing slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamPath(String);

impl ParamPath {
    /// Validate a path. A trailing `/` is accepted and dropped.
    ///
    /// # Errors
    ///
    /// [`SsmError::Validation`] if the path does not start with `/` or breaks
    /// the name rules; [`SsmError::HierarchyLevelLimitExceeded`] if too deep.
    pub fn parse(raw: &str) -> Result<Self, SsmError> {
        check_chars(raw)?;
        if !raw.starts_with('/') {
            return Err(validation(format!("path '{raw}' must begin with '/'")));
        }
        if raw == "/" {
            return Ok(Self::root());
        }
        let trimmed = raw.strip_suffix('/').unwrap_or(raw);
        check_segments(raw, trimmed)?;
        Ok(Self(trimmed.to_owned()))
    }

    /// The root of the hierarchy.
    #[must_use]
    pub fn root() -> Self {
        Self("/".to_owned())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix every parameter below this path starts with.
    #[must_use]
    pub fn scan_prefix(&self) -> String {
        if self.is_root() {
            self.0.clone()
        } else {
            format!("{}/", self.0)
        }
    }
}

impl fmt::Display for ParamPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn short_names_are_qualified() {
        assert_eq!(ParamName::parse("db-password").unwrap().as_str(), "/db-password");
        assert_eq!(ParamName::parse("/app/db/password").unwrap().as_str(), "/app/db/password");
        assert_eq!(
            ParamName::parse("app.v2_x").unwrap(),
            ParamName::parse("/app.v2_x").unwrap()
        );
    }

    #[test]
    fn malformed_names_are_rejected() {
        for raw in ["", "/", "/app/", "//app", "/app//db", "/app db", "/app$", "/ünï"] {
            assert!(
                matches!(ParamName::parse(raw), Err(SsmError::Validation { .. })),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn reserved_prefixes_are_rejected() {
        for raw in ["/aws/x", "awsconfig", "/SSM/x", "/ssmtest"] {
            assert!(ParamName::parse(raw).is_err(), "{raw}");
        }
        assert!(ParamName::parse("/app/aws").is_ok());
    }

    #[test]
    fn limits() {
        let deep = "/a".repeat(MAX_HIERARCHY_LEVELS);
        assert!(ParamName::parse(&deep).is_ok());
        let deeper = format!("{deep}/a");
        assert!(matches!(
            ParamName::parse(&deeper),
            Err(SsmError::HierarchyLevelLimitExceeded { max: 15, .. })
        ));

        let long = format!("/{}", "x".repeat(MAX_NAME_LEN));
        assert!(matches!(ParamName::parse(&long), Err(SsmError::Validation { .. })));
    }

    #[test]
    fn paths() {
        assert!(ParamPath::parse("/").unwrap().is_root());
        assert_eq!(ParamPath::parse("/app/").unwrap().as_str(), "/app");
        assert_eq!(ParamPath::parse("/app").unwrap().scan_prefix(), "/app/");
        assert_eq!(ParamPath::root().scan_prefix(), "/");
        assert!(ParamPath::parse("app").is_err());
        assert!(ParamPath::parse("/app//").is_err());
    }
}
