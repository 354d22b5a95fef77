//! Request, response, and record types for the hosted zone engine.
//!
//! Field names serialize in the provider's `PascalCase` so stored records
//! read like the documents the wire layer exchanges.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Route53Error;
use crate::tags::Tag;

/// DNS record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RrType {
    A,
    Aaaa,
    Caa,
    Cname,
    Ds,
    Https,
    Mx,
    Naptr,
    Ns,
    Ptr,
    Soa,
    Spf,
    Srv,
    Sshfp,
    Svcb,
    Tlsa,
    Txt,
}

impl RrType {
    /// Every supported type.
    pub const ALL: [Self; 17] = [
        Self::A,
        Self::Aaaa,
        Self::Caa,
        Self::Cname,
        Self::Ds,
        Self::Https,
        Self::Mx,
        Self::Naptr,
        Self::Ns,
        Self::Ptr,
        Self::Soa,
        Self::Spf,
        Self::Srv,
        Self::Sshfp,
        Self::Svcb,
        Self::Tlsa,
        Self::Txt,
    ];

    /// Upper-case mnemonic, e.g. `AAAA`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::Aaaa => "AAAA",
            Self::Caa => "CAA",
            Self::Cname => "CNAME",
            Self::Ds => "DS",
            Self::Https => "HTTPS",
            Self::Mx => "MX",
            Self::Naptr => "NAPTR",
            Self::Ns => "NS",
            Self::Ptr => "PTR",
            Self::Soa => "SOA",
            Self::Spf => "SPF",
            Self::Srv => "SRV",
            Self::Sshfp => "SSHFP",
            Self::Svcb => "SVCB",
            Self::Tlsa => "TLSA",
            Self::Txt => "TXT",
        }
    }
}

impl fmt::Display for RrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RrType {
    type Err = Route53Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Route53Error::InvalidInput {
                reason: format!("unsupported record type '{s}'"),
            })
    }
}

/// Zone settings supplied at creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostedZoneConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub private_zone: bool,
}

/// Name servers authoritative for a zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DelegationSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_reference: Option<String>,
    pub name_servers: Vec<String>,
}

/// A hosted zone as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HostedZone {
    /// Prefixed id, `/hostedzone/Z...`.
    pub id: String,
    /// Canonical name with trailing dot.
    pub name: String,
    pub caller_reference: String,
    pub config: HostedZoneConfig,
    /// Live record set count, never below 2.
    pub resource_record_set_count: u64,
}

/// One value of a record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceRecord {
    pub value: String,
}

impl ResourceRecord {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// Alias target for alias record sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AliasTarget {
    pub hosted_zone_id: String,
    #[serde(rename = "DNSName")]
    pub dns_name: String,
    #[serde(default)]
    pub evaluate_target_health: bool,
}

/// Geolocation routing attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GeoLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdivision_code: Option<String>,
}

/// All records for one name and type in a zone.
///
/// Routing attributes are stored and returned unchanged; the engine does not
/// interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceRecordSet {
    pub name: String,
    #[serde(rename = "Type")]
    pub rr_type: RrType,
    #[serde(rename = "TTL", default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_records: Vec<ResourceRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_target: Option<AliasTarget>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_value_answer: Option<bool>,
}

impl ResourceRecordSet {
    /// A plain record set with a TTL and values.
    #[must_use]
    pub fn new(name: impl Into<String>, rr_type: RrType, ttl: u64, values: &[&str]) -> Self {
        Self {
            name: name.into(),
            rr_type,
            ttl: Some(ttl),
            resource_records: values.iter().map(|v| ResourceRecord::new(*v)).collect(),
            alias_target: None,
            set_identifier: None,
            weight: None,
            region: None,
            failover: None,
            geo_location: None,
            health_check_id: None,
            multi_value_answer: None,
        }
    }
}

/// What a change does to its record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    /// Fail the batch if the record set exists.
    Create,
    /// Remove the record set whether or not it exists.
    Delete,
    /// Create or replace.
    Upsert,
}

impl FromStr for ChangeAction {
    type Err = Route53Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(Self::Create),
            "DELETE" => Ok(Self::Delete),
            "UPSERT" => Ok(Self::Upsert),
            _ => Err(Route53Error::InvalidChangeBatch {
                reason: format!("unknown change action '{s}'"),
            }),
        }
    }
}

/// One entry of a change batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Change {
    pub action: ChangeAction,
    pub resource_record_set: ResourceRecordSet,
}

/// An ordered set of changes applied atomically to one zone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeBatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub changes: Vec<Change>,
}

/// Propagation state of a change. Changes apply synchronously, so every
/// change this engine creates is `INSYNC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    Pending,
    Insync,
}

/// Status record for a completed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangeInfo {
    /// Prefixed id, `/change/C...`.
    pub id: String,
    pub status: ChangeStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Input to `create_hosted_zone`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateHostedZoneRequest {
    pub name: String,
    pub caller_reference: String,
    pub config: Option<HostedZoneConfig>,
    pub delegation_set_id: Option<String>,
}

/// Result of `create_hosted_zone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateHostedZoneOutput {
    pub hosted_zone: HostedZone,
    pub change_info: ChangeInfo,
    pub delegation_set: DelegationSet,
}

/// Result of `get_hosted_zone`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetHostedZoneOutput {
    pub hosted_zone: HostedZone,
    pub delegation_set: DelegationSet,
}

/// Input to `list_hosted_zones`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListHostedZonesRequest {
    /// Zone id (either form) to start from, inclusive.
    pub marker: Option<String>,
    pub max_items: Option<usize>,
}

/// A page of zones ordered by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListHostedZonesOutput {
    pub hosted_zones: Vec<HostedZone>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_marker: Option<String>,
    pub is_truncated: bool,
    pub max_items: usize,
}

/// Input to `list_hosted_zones_by_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListHostedZonesByNameRequest {
    /// Name to start from, inclusive.
    pub dns_name: Option<String>,
    /// Tie-breaker among zones sharing `dns_name`.
    pub hosted_zone_id: Option<String>,
    pub max_items: Option<usize>,
}

/// A page of zones ordered by name, then id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListHostedZonesByNameOutput {
    pub hosted_zones: Vec<HostedZone>,
    #[serde(rename = "DNSName", skip_serializing_if = "Option::is_none")]
    pub dns_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hosted_zone_id: Option<String>,
    #[serde(rename = "NextDNSName", skip_serializing_if = "Option::is_none")]
    pub next_dns_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_hosted_zone_id: Option<String>,
    pub is_truncated: bool,
    pub max_items: usize,
}

/// Input to `list_resource_record_sets`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListResourceRecordSetsRequest {
    pub hosted_zone_id: String,
    pub start_record_name: Option<String>,
    pub start_record_type: Option<RrType>,
    pub max_items: Option<usize>,
}

/// A page of record sets ordered by name, then type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListResourceRecordSetsOutput {
    pub resource_record_sets: Vec<ResourceRecordSet>,
    pub is_truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_record_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_record_type: Option<RrType>,
    pub max_items: usize,
}

/// Tags attached to a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResourceTagSet {
    /// Bare zone id.
    pub resource_id: String,
    /// Always `hostedzone`.
    pub resource_type: String,
    pub tags: Vec<Tag>,
}
