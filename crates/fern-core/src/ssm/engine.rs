//! Parameter store engine.
//!
//! Parameters live under their canonical path in their own store. Writes
//! that depend on the current value (version bumps, tag changes) go through
//! [`StorageBackend::update`], so the read and the write are one atomic step.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use fern_storage::{StorageBackend, StorageError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::AccountContext;
use crate::crypto;
use crate::error::{ErrorKind, SsmError};
use crate::keyring::{KeyEntry, KeyRing};
use crate::pagination;
use crate::ssm::filter::{KeyMatcher, ParameterFilter};
use crate::ssm::name::{ParamName, ParamPath};
use crate::ssm::types::{
    DataType, DeleteParametersOutput, DescribeParametersOutput, DescribeParametersRequest,
    GetParametersByPathOutput, GetParametersByPathRequest, GetParametersOutput, Parameter,
    ParameterMetadata, ParameterTier, ParameterType, PutParameterOutput, PutParameterRequest,
};
use crate::tags::{Tag, TagSet};

/// Default and maximum page size for `describe_parameters`.
pub const DESCRIBE_PAGE_SIZE: usize = 50;

/// Default and maximum page size for `get_parameters_by_path`.
pub const PATH_PAGE_SIZE: usize = 10;

/// The only taggable resource type.
pub const TAG_RESOURCE_TYPE: &str = "Parameter";

/// A parameter as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StoredParameter {
    name: String,
    #[serde(rename = "Type")]
    parameter_type: ParameterType,
    /// Envelope text for `SecureString`.
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    key_id: Option<String>,
    version: u64,
    #[serde(default)]
    tags: TagSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default)]
    tier: ParameterTier,
    #[serde(default)]
    data_type: DataType,
    last_modified_date: DateTime<Utc>,
    last_modified_user: String,
}

/// Parameter lifecycle over a [`StorageBackend`].
pub struct ParameterEngine {
    store: Arc<dyn StorageBackend>,
    keys: Arc<KeyRing>,
    account: AccountContext,
}

impl ParameterEngine {
    #[must_use]
    pub fn new(store: Arc<dyn StorageBackend>, keys: Arc<KeyRing>, account: AccountContext) -> Self {
        Self {
            store,
            keys,
            account,
        }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        &self.store
    }

    fn arn(&self, stored_name: &str) -> String {
        format!(
            "arn:aws:ssm:{}:{}:parameter/{}",
            self.account.region,
            self.account.account_id,
            stored_name.trim_start_matches('/')
        )
    }

    fn check_resource_type(resource_type: &str) -> Result<(), SsmError> {
        if resource_type == TAG_RESOURCE_TYPE {
            Ok(())
        } else {
            Err(SsmError::Validation {
                reason: format!("unsupported resource type '{resource_type}'"),
            })
        }
    }

    fn decode_token(token: Option<&str>) -> Result<Option<String>, SsmError> {
        token
            .map(|t| pagination::decode_token(t).ok_or(SsmError::InvalidNextToken))
            .transpose()
    }

    /// Resolve the key a `SecureString` put encrypts with.
    fn write_key(&self, key_id: Option<String>) -> Result<(String, &KeyEntry), SsmError> {
        let reference = match key_id {
            Some(reference) => reference,
            None => self
                .keys
                .default_key()
                .map(KeyEntry::alias_ref)
                .ok_or_else(|| SsmError::InvalidKeyId {
                    key_id: String::new(),
                })?,
        };
        let entry = self
            .keys
            .resolve(&reference)
            .map_err(|_| SsmError::InvalidKeyId {
                key_id: reference.clone(),
            })?;
        Ok((reference, entry))
    }

    fn plain_value(&self, record: &StoredParameter, with_decryption: bool) -> Result<String, SsmError> {
        if record.parameter_type != ParameterType::SecureString || !with_decryption {
            return Ok(record.value.clone());
        }
        let entry = self.keys.resolve(record.key_id.as_deref().unwrap_or_default())?;
        Ok(crypto::open_text(entry.key(), &record.value)?)
    }

    fn to_parameter(
        &self,
        name: String,
        record: &StoredParameter,
        with_decryption: bool,
    ) -> Result<Parameter, SsmError> {
        Ok(Parameter {
            name,
            parameter_type: record.parameter_type,
            value: self.plain_value(record, with_decryption)?,
            version: record.version,
            arn: self.arn(&record.name),
            last_modified_date: record.last_modified_date,
            data_type: record.data_type,
        })
    }

    fn to_metadata(&self, record: StoredParameter) -> ParameterMetadata {
        ParameterMetadata {
            arn: self.arn(&record.name),
            name: record.name,
            parameter_type: record.parameter_type,
            key_id: record.key_id,
            description: record.description,
            version: record.version,
            tier: record.tier,
            data_type: record.data_type,
            last_modified_date: record.last_modified_date,
            last_modified_user: record.last_modified_user,
        }
    }

    async fn load(&self, name: &ParamName) -> Result<Option<StoredParameter>, SsmError> {
        match self.store.get(name.as_str()).await? {
            Some(bytes) => Ok(Some(codec::decode(name.as_str(), &bytes)?)),
            None => Ok(None),
        }
    }

    /// Every stored parameter under `prefix` that `keep` accepts.
    async fn scan<F>(&self, prefix: &str, keep: F) -> Result<Vec<StoredParameter>, SsmError>
    where
        F: Fn(&str) -> bool,
    {
        let entries = self.store.scan_prefix(prefix).await?;
        let mut out = Vec::new();
        for (key, bytes) in entries.iter().filter(|(k, _)| keep(k.as_str())) {
            out.push(codec::decode(key, bytes)?);
        }
        debug!(prefix, scanned = entries.len(), matched = out.len(), "parameters scanned");
        Ok(out)
    }

    /// Rewrite a parameter's tags in place. The version does not change.
    async fn modify_tags<F>(&self, raw_name: &str, f: F) -> Result<(), SsmError>
    where
        F: FnOnce(&mut TagSet) + Send + 'static,
    {
        let name = ParamName::parse(raw_name)?;
        let key = name.as_str().to_owned();
        let k = key.clone();
        self.store
            .update(
                &key,
                Box::new(move |cur: Option<&[u8]>| {
                    let raw = cur.ok_or_else(|| StorageError::Rejected {
                        key: k.clone(),
                        reason: "parameter does not exist".to_owned(),
                    })?;
                    let mut record: StoredParameter =
                        codec::decode(&k, raw).map_err(|e| StorageError::Corrupt {
                            key: k.clone(),
                            reason: e.to_string(),
                        })?;
                    f(&mut record.tags);
                    codec::encode(&record).map_err(|e| StorageError::Write {
                        key: k.clone(),
                        reason: e.to_string(),
                    })
                }),
            )
            .await
            .map_err(|e| match e {
                StorageError::Rejected { .. } => SsmError::ParameterNotFound {
                    name: raw_name.to_owned(),
                },
                other => other.into(),
            })?;
        Ok(())
    }

    /// Create or overwrite a parameter.
    ///
    /// `identity` is the authenticated caller, recorded as the last modifier.
    /// An overwrite bumps the version by one and keeps the previous tags,
    /// with the request's tags merged over them.
    ///
    /// # Errors
    ///
    /// - [`SsmError::Validation`] for a bad name, an empty or over-long
    ///   value, or a key id on a non-secure type.
    /// - [`SsmError::InvalidKeyId`] if a `SecureString` key cannot be resolved.
    /// - [`SsmError::ParameterAlreadyExists`] if the parameter exists and
    ///   `overwrite` is false.
    pub async fn put_parameter(
        &self,
        identity: &str,
        req: PutParameterRequest,
    ) -> Result<PutParameterOutput, SsmError> {
        let name = ParamName::parse(&req.name)?;
        if req.value.is_empty() {
            return Err(SsmError::Validation {
                reason: "parameter value must not be empty".to_owned(),
            });
        }
        let tier_limit = req.tier.unwrap_or_default().max_value_len();
        if req.value.len() > tier_limit {
            return Err(SsmError::Validation {
                reason: format!("parameter value exceeds {tier_limit} bytes"),
            });
        }
        if req.data_type == Some(DataType::Ec2Image) && !req.value.starts_with("ami-") {
            return Err(SsmError::Validation {
                reason: "aws:ec2:image parameters must hold an AMI id".to_owned(),
            });
        }

        let (value, key_id) = if req.parameter_type == ParameterType::SecureString {
            let (reference, entry) = self.write_key(req.key_id)?;
            (crypto::seal_text(entry.key(), &req.value)?, Some(reference))
        } else {
            if req.key_id.is_some() {
                return Err(SsmError::Validation {
                    reason: format!("a key id is only valid for SecureString, not {}", req.parameter_type),
                });
            }
            (req.value, None)
        };

        let record = StoredParameter {
            name: name.as_str().to_owned(),
            parameter_type: req.parameter_type,
            value,
            key_id,
            version: 1,
            tags: req.tags.into_iter().collect(),
            description: req.description,
            tier: req.tier.unwrap_or_default(),
            data_type: req.data_type.unwrap_or_default(),
            last_modified_date: Utc::now(),
            last_modified_user: self.account.user_arn(identity),
        };
        let explicit_tier = req.tier.is_some();
        let explicit_data_type = req.data_type.is_some();
        let overwrite = req.overwrite;

        let key = name.as_str().to_owned();
        let k = key.clone();
        let bytes = self
            .store
            .update(
                &key,
                Box::new(move |cur: Option<&[u8]>| {
                    let mut record = record;
                    if let Some(raw) = cur {
                        if !overwrite {
                            return Err(StorageError::Rejected {
                                key: k,
                                reason: "parameter exists and overwrite is not set".to_owned(),
                            });
                        }
                        let previous: StoredParameter =
                            codec::decode(&k, raw).map_err(|e| StorageError::Corrupt {
                                key: k.clone(),
                                reason: e.to_string(),
                            })?;
                        let mut tags = previous.tags;
                        tags.extend(record.tags.to_vec());
                        record.tags = tags;
                        record.version = previous.version.saturating_add(1);
                        record.description = record.description.or(previous.description);
                        if !explicit_tier {
                            record.tier = previous.tier;
                        }
                        if !explicit_data_type {
                            record.data_type = previous.data_type;
                        }
                    }
                    codec::encode(&record).map_err(|e| StorageError::Write {
                        key: k.clone(),
                        reason: e.to_string(),
                    })
                }),
            )
            .await
            .map_err(|e| match e {
                StorageError::Rejected { .. } => SsmError::ParameterAlreadyExists {
                    name: req.name.clone(),
                },
                other => other.into(),
            })?;

        let stored: StoredParameter = codec::decode(&key, &bytes)?;
        info!(
            parameter = %name,
            version = stored.version,
            parameter_type = %stored.parameter_type,
            user = identity,
            "parameter stored"
        );
        Ok(PutParameterOutput {
            version: stored.version,
            tier: stored.tier,
        })
    }

    /// Read one parameter. The returned name is the name as requested.
    ///
    /// # Errors
    ///
    /// - Name validation errors.
    /// - [`SsmError::ParameterNotFound`] if nothing is stored under the name.
    /// - [`SsmError::Crypto`] if a requested decryption fails.
    pub async fn get_parameter(&self, name: &str, with_decryption: bool) -> Result<Parameter, SsmError> {
        let key = ParamName::parse(name)?;
        let record = self.load(&key).await?.ok_or_else(|| SsmError::ParameterNotFound {
            name: name.to_owned(),
        })?;
        debug!(parameter = %key, version = record.version, "parameter read");
        self.to_parameter(name.to_owned(), &record, with_decryption)
    }

    /// Read several parameters. Malformed and absent names are listed in
    /// `invalid_parameters` instead of failing the call.
    ///
    /// # Errors
    ///
    /// Storage, codec, and crypto failures still fail the whole call.
    pub async fn get_parameters(
        &self,
        names: &[String],
        with_decryption: bool,
    ) -> Result<GetParametersOutput, SsmError> {
        let mut out = GetParametersOutput::default();
        for name in names {
            match self.get_parameter(name, with_decryption).await {
                Ok(parameter) => out.parameters.push(parameter),
                Err(
                    SsmError::ParameterNotFound { .. }
                    | SsmError::Validation { .. }
                    | SsmError::HierarchyLevelLimitExceeded { .. },
                ) => out.invalid_parameters.push(name.clone()),
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Parameters below a path, one level deep or recursively, in key order.
    ///
    /// # Errors
    ///
    /// - Path validation and filter errors, before any read.
    /// - [`SsmError::InvalidNextToken`] for an undecodable token.
    /// - [`SsmError::Crypto`] if a requested decryption fails.
    pub async fn get_parameters_by_path(
        &self,
        req: GetParametersByPathRequest,
    ) -> Result<GetParametersByPathOutput, SsmError> {
        let path = ParamPath::parse(&req.path)?;
        let under_path = KeyMatcher::for_path(&path, req.recursive)?;
        let narrowing = req
            .parameter_filters
            .iter()
            .map(|f| KeyMatcher::compile(std::slice::from_ref(f)))
            .collect::<Result<Vec<_>, _>>()?;
        let start = Self::decode_token(req.next_token.as_deref())?;
        let limit = pagination::normalize_limit(req.max_results, PATH_PAGE_SIZE, PATH_PAGE_SIZE);

        let records = self
            .scan(&path.scan_prefix(), |key| {
                under_path.matches(key) && narrowing.iter().all(|m| m.matches(key))
            })
            .await?;
        let page = pagination::paginate(records, |p| p.name.clone(), start.as_ref(), limit);

        let parameters = page
            .items
            .iter()
            .map(|record| self.to_parameter(record.name.clone(), record, req.with_decryption))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(path = %path, recursive = req.recursive, returned = parameters.len(), "parameters listed by path");
        Ok(GetParametersByPathOutput {
            parameters,
            next_token: page.next.as_deref().map(pagination::encode_token),
        })
    }

    /// Metadata of every parameter matching any filter, in key order.
    ///
    /// # Errors
    ///
    /// - Filter errors, before any read.
    /// - [`SsmError::InvalidNextToken`] for an undecodable token.
    pub async fn describe_parameters(
        &self,
        req: DescribeParametersRequest,
    ) -> Result<DescribeParametersOutput, SsmError> {
        let matcher = KeyMatcher::compile(&req.parameter_filters)?;
        let start = Self::decode_token(req.next_token.as_deref())?;
        let limit =
            pagination::normalize_limit(req.max_results, DESCRIBE_PAGE_SIZE, DESCRIBE_PAGE_SIZE);

        let records = self.scan("/", |key| matcher.matches(key)).await?;
        let page = pagination::paginate(records, |p| p.name.clone(), start.as_ref(), limit);
        let next_token = page.next.as_deref().map(pagination::encode_token);

        Ok(DescribeParametersOutput {
            parameters: page.items.into_iter().map(|r| self.to_metadata(r)).collect(),
            next_token,
        })
    }

    /// Delete one parameter.
    ///
    /// # Errors
    ///
    /// Name validation errors, or [`SsmError::ParameterNotFound`] if absent.
    pub async fn delete_parameter(&self, name: &str) -> Result<(), SsmError> {
        let key = ParamName::parse(name)?;
        if !self.store.exists(key.as_str()).await? {
            return Err(SsmError::ParameterNotFound {
                name: name.to_owned(),
            });
        }
        self.store.delete_all(vec![key.as_str().to_owned()]).await?;
        info!(parameter = %key, "parameter deleted");
        Ok(())
    }

    /// Delete several parameters, each on its own. A name that cannot be
    /// deleted for any reason is reported in `invalid_parameters`.
    pub async fn delete_parameters(&self, names: &[String]) -> DeleteParametersOutput {
        let mut out = DeleteParametersOutput::default();
        for name in names {
            match self.delete_parameter(name).await {
                Ok(()) => out.deleted_parameters.push(name.clone()),
                Err(e) => {
                    if e.kind() == ErrorKind::Internal {
                        warn!(parameter = %name, error = %e, "parameter delete failed");
                    }
                    out.invalid_parameters.push(name.clone());
                }
            }
        }
        out
    }

    /// Add or replace tags on a parameter.
    ///
    /// # Errors
    ///
    /// [`SsmError::Validation`] for a resource type other than `Parameter`,
    /// and [`SsmError::ParameterNotFound`] if the parameter is absent.
    pub async fn add_tags_to_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        tags: Vec<Tag>,
    ) -> Result<(), SsmError> {
        Self::check_resource_type(resource_type)?;
        let added = tags.len();
        self.modify_tags(resource_id, move |set| set.extend(tags)).await?;
        info!(parameter = resource_id, added, "parameter tags added");
        Ok(())
    }

    /// Remove tags by key. Keys that are not present are ignored.
    ///
    /// # Errors
    ///
    /// Same as [`add_tags_to_resource`](Self::add_tags_to_resource).
    pub async fn remove_tags_from_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
        keys: Vec<String>,
    ) -> Result<(), SsmError> {
        Self::check_resource_type(resource_type)?;
        let removed = keys.len();
        self.modify_tags(resource_id, move |set| set.apply(Vec::new(), keys))
            .await?;
        info!(parameter = resource_id, removed, "parameter tags removed");
        Ok(())
    }

    /// Tags on a parameter, in key order.
    ///
    /// # Errors
    ///
    /// Same as [`add_tags_to_resource`](Self::add_tags_to_resource).
    pub async fn list_tags_for_resource(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<Vec<Tag>, SsmError> {
        Self::check_resource_type(resource_type)?;
        let name = ParamName::parse(resource_id)?;
        let record = self.load(&name).await?.ok_or_else(|| SsmError::ParameterNotFound {
            name: resource_id.to_owned(),
        })?;
        Ok(record.tags.to_vec())
    }
}
