//! Request, response, and value types for the parameter store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SsmError;
use crate::ssm::filter::ParameterFilter;
use crate::tags::Tag;

/// Kind of value a parameter holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterType {
    #[default]
    String,
    StringList,
    /// Stored as an AES-256-GCM envelope, opened only on request.
    SecureString,
}

impl ParameterType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::StringList => "StringList",
            Self::SecureString => "SecureString",
        }
    }
}

impl fmt::Display for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParameterType {
    type Err = SsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "String" => Ok(Self::String),
            "StringList" => Ok(Self::StringList),
            "SecureString" => Ok(Self::SecureString),
            other => Err(SsmError::Validation {
                reason: format!("unsupported parameter type '{other}'"),
            }),
        }
    }
}

/// Storage tier. Only the value size limit depends on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterTier {
    #[default]
    Standard,
    Advanced,
    #[serde(rename = "Intelligent-Tiering")]
    IntelligentTiering,
}

impl ParameterTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "Standard",
            Self::Advanced => "Advanced",
            Self::IntelligentTiering => "Intelligent-Tiering",
        }
    }

    /// Longest value, in bytes, a parameter in this tier may hold.
    #[must_use]
    pub fn max_value_len(self) -> usize {
        match self {
            Self::Standard => 4096,
            Self::Advanced | Self::IntelligentTiering => 8192,
        }
    }
}

impl FromStr for ParameterTier {
    type Err = SsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Standard" => Ok(Self::Standard),
            "Advanced" => Ok(Self::Advanced),
            "Intelligent-Tiering" => Ok(Self::IntelligentTiering),
            other => Err(SsmError::Validation {
                reason: format!("unsupported parameter tier '{other}'"),
            }),
        }
    }
}

/// Declared data type of a parameter value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    #[default]
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "aws:ec2:image")]
    Ec2Image,
}

impl DataType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Ec2Image => "aws:ec2:image",
        }
    }
}

impl FromStr for DataType {
    type Err = SsmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "aws:ec2:image" => Ok(Self::Ec2Image),
            other => Err(SsmError::Validation {
                reason: format!("unsupported data type '{other}'"),
            }),
        }
    }
}

/// Input to `put_parameter`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutParameterRequest {
    pub name: String,
    pub value: String,
    pub parameter_type: ParameterType,
    /// Key reference for `SecureString`; the first configured key if absent.
    pub key_id: Option<String>,
    pub overwrite: bool,
    /// Merged over any tags the parameter already carries.
    pub tags: Vec<Tag>,
    /// Kept from the previous version if absent.
    pub description: Option<String>,
    /// Kept from the previous version if absent, else `Standard`.
    pub tier: Option<ParameterTier>,
    pub data_type: Option<DataType>,
}

/// Result of `put_parameter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PutParameterOutput {
    pub version: u64,
    pub tier: ParameterTier,
}

/// A parameter value as returned by the get operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "Type")]
    pub parameter_type: ParameterType,
    /// Plain text, or the envelope if decryption was not requested.
    pub value: String,
    pub version: u64,
    #[serde(rename = "ARN")]
    pub arn: String,
    pub last_modified_date: DateTime<Utc>,
    pub data_type: DataType,
}

/// A parameter's attributes without its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ParameterMetadata {
    pub name: String,
    #[serde(rename = "ARN")]
    pub arn: String,
    #[serde(rename = "Type")]
    pub parameter_type: ParameterType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub version: u64,
    pub tier: ParameterTier,
    pub data_type: DataType,
    pub last_modified_date: DateTime<Utc>,
    pub last_modified_user: String,
}

/// Result of `get_parameters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetParametersOutput {
    pub parameters: Vec<Parameter>,
    /// Requested names that are malformed or not stored.
    pub invalid_parameters: Vec<String>,
}

/// Result of `delete_parameters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteParametersOutput {
    pub deleted_parameters: Vec<String>,
    pub invalid_parameters: Vec<String>,
}

/// Input to `get_parameters_by_path`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetParametersByPathRequest {
    pub path: String,
    /// Descend into every level below `path` rather than just the next one.
    pub recursive: bool,
    pub with_decryption: bool,
    /// Further narrow the result; every filter must match.
    pub parameter_filters: Vec<ParameterFilter>,
    pub max_results: Option<usize>,
    pub next_token: Option<String>,
}

/// A page of `get_parameters_by_path`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetParametersByPathOutput {
    pub parameters: Vec<Parameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

/// Input to `describe_parameters`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescribeParametersRequest {
    /// A parameter is included if it matches any filter. No filters match all.
    pub parameter_filters: Vec<ParameterFilter>,
    pub max_results: Option<usize>,
    pub next_token: Option<String>,
}

/// A page of `describe_parameters`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeParametersOutput {
    pub parameters: Vec<ParameterMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_token: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn enums_use_provider_spellings() {
        assert_eq!(
            serde_json::to_string(&ParameterTier::IntelligentTiering).unwrap(),
            r#""Intelligent-Tiering""#
        );
        assert_eq!(serde_json::to_string(&DataType::Ec2Image).unwrap(), r#""aws:ec2:image""#);
        assert_eq!("SecureString".parse::<ParameterType>().unwrap(), ParameterType::SecureString);
        assert!("securestring".parse::<ParameterType>().is_err());
        assert_eq!("text".parse::<DataType>().unwrap(), DataType::Text);
    }

    #[test]
    fn tier_limits() {
        assert_eq!(ParameterTier::Standard.max_value_len(), 4096);
        assert_eq!(ParameterTier::Advanced.max_value_len(), 8192);
    }
}
