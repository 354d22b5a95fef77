//! Hosted zone engine.
//!
//! Owns the lifecycle of hosted zones, their record sets, and the change
//! records every mutation leaves behind. Each operation that touches more
//! than one key is a single [`WriteBatch`], so a failed validation or a lost
//! race leaves nothing half-written.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use fern_storage::{PutEntry, StorageBackend, StorageError, WriteBatch};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec;
use crate::config::DnsDefaults;
use crate::error::Route53Error;
use crate::ids;
use crate::pagination::{self, Page};
use crate::route53::names::{
    self, APEX_LABEL, HOSTED_ZONE_PREFIX, RecordKey, ZONE_NAME_PREFIX, ZoneId,
};
use crate::route53::types::{
    ChangeAction, ChangeBatch, ChangeInfo, ChangeStatus, CreateHostedZoneOutput,
    CreateHostedZoneRequest, DelegationSet, GetHostedZoneOutput, HostedZone, HostedZoneConfig,
    ListHostedZonesByNameOutput, ListHostedZonesByNameRequest, ListHostedZonesOutput,
    ListHostedZonesRequest, ListResourceRecordSetsOutput, ListResourceRecordSetsRequest,
    ResourceRecordSet, ResourceTagSet, RrType,
};
use crate::tags::{Tag, TagSet};

/// How long change records are kept.
pub const CHANGE_RETENTION: Duration = Duration::from_secs(90 * 24 * 60 * 60);

/// Comment on change records synthesized after the real one expired.
pub const EXPIRED_CHANGE_COMMENT: &str = "Expired - ChangeInfo expires after ~90 days";

/// TTL of the seeded apex SOA record.
pub const SOA_TTL: u64 = 900;

/// TTL of the seeded apex NS record.
pub const NS_TTL: u64 = 172_800;

/// Default and maximum page size for zone listings.
pub const ZONE_PAGE_SIZE: usize = 100;

/// Default and maximum page size for record set listings.
pub const RECORD_PAGE_SIZE: usize = 300;

/// The only taggable resource type.
pub const TAG_RESOURCE_TYPE: &str = "hostedzone";

/// Record sets every zone holds: apex SOA and NS.
const SEEDED_RECORD_COUNT: u64 = 2;

/// A zone as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StoredZone {
    id: String,
    name: String,
    caller_reference: String,
    #[serde(default)]
    config: HostedZoneConfig,
    delegation_set: DelegationSet,
    #[serde(default)]
    tags: TagSet,
}

impl StoredZone {
    fn view(&self, record_count: u64) -> HostedZone {
        HostedZone {
            id: self.id.clone(),
            name: self.name.clone(),
            caller_reference: self.caller_reference.clone(),
            config: self.config.clone(),
            resource_record_set_count: record_count,
        }
    }

    fn zone_id(&self) -> Result<ZoneId, Route53Error> {
        ZoneId::parse(&self.id)
    }
}

fn new_change(comment: Option<String>) -> ChangeInfo {
    ChangeInfo {
        id: names::change_key(&ids::random_id(ids::ID_LEN)),
        status: ChangeStatus::Insync,
        submitted_at: Utc::now(),
        comment,
    }
}

fn put_change(batch: &mut WriteBatch, change: &ChangeInfo) -> Result<(), Route53Error> {
    batch.put(PutEntry::new(change.id.clone(), codec::encode(change)?).with_ttl(CHANGE_RETENTION));
    Ok(())
}

/// Route53-style hosted zone engine.
pub struct HostedZoneEngine {
    store: Arc<dyn StorageBackend>,
    dns: DnsDefaults,
}

impl std::fmt::Debug for HostedZoneEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedZoneEngine")
            .field("dns", &self.dns)
            .finish_non_exhaustive()
    }
}

impl HostedZoneEngine {
    /// Create an engine over `store`, seeding new zones from `dns`.
    #[must_use]
    pub fn new(store: Arc<dyn StorageBackend>, dns: DnsDefaults) -> Self {
        Self { store, dns }
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StorageBackend> {
        &self.store
    }

    async fn load_zone(&self, id: &ZoneId) -> Result<StoredZone, Route53Error> {
        let key = id.zone_key();
        let bytes = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| Route53Error::NoSuchHostedZone { id: id.resource_id() })?;
        Ok(codec::decode(&key, &bytes)?)
    }

    async fn all_zones(&self) -> Result<Vec<StoredZone>, Route53Error> {
        self.store
            .scan_prefix(HOSTED_ZONE_PREFIX)
            .await?
            .into_iter()
            .map(|(key, bytes)| codec::decode(&key, &bytes).map_err(Route53Error::from))
            .collect()
    }

    /// Live record set count, floored at the two seeded records.
    async fn record_count(&self, id: &ZoneId) -> Result<u64, Route53Error> {
        let count = self.store.count_prefix(&id.records_prefix()).await?;
        Ok(u64::try_from(count).unwrap_or(u64::MAX).max(SEEDED_RECORD_COUNT))
    }

    async fn with_count(&self, zone: &StoredZone) -> Result<HostedZone, Route53Error> {
        let count = self.record_count(&zone.zone_id()?).await?;
        Ok(zone.view(count))
    }

    /// Atomically read, modify, and rewrite a zone record.
    async fn modify_zone<F>(&self, id: &ZoneId, f: F) -> Result<StoredZone, Route53Error>
    where
        F: FnOnce(&mut StoredZone) + Send + 'static,
    {
        let key = id.zone_key();
        let k = key.clone();
        let bytes = self
            .store
            .update(
                &key,
                Box::new(move |cur: Option<&[u8]>| {
                    let raw = cur.ok_or_else(|| StorageError::Rejected {
                        key: k.clone(),
                        reason: "hosted zone does not exist".to_owned(),
                    })?;
                    let mut zone: StoredZone =
                        codec::decode(&k, raw).map_err(|e| StorageError::Corrupt {
                            key: k.clone(),
                            reason: e.to_string(),
                        })?;
                    f(&mut zone);
                    codec::encode(&zone).map_err(|e| StorageError::Write {
                        key: k.clone(),
                        reason: e.to_string(),
                    })
                }),
            )
            .await
            .map_err(|e| match e {
                StorageError::Rejected { .. } => Route53Error::NoSuchHostedZone { id: id.resource_id() },
                other => other.into(),
            })?;
        Ok(codec::decode(&key, &bytes)?)
    }

    /// Create a zone with its apex SOA and NS records.
    ///
    /// # Errors
    ///
    /// - [`Route53Error::InvalidDomainName`] for a malformed name.
    /// - [`Route53Error::InvalidInput`] for an empty caller reference.
    /// - [`Route53Error::HostedZoneAlreadyExists`] if a live zone has the
    ///   same canonical name, including one created concurrently.
    pub async fn create_hosted_zone(
        &self,
        req: CreateHostedZoneRequest,
    ) -> Result<CreateHostedZoneOutput, Route53Error> {
        let name = names::canonical_zone_name(&req.name)?;
        if req.caller_reference.trim().is_empty() {
            return Err(Route53Error::InvalidInput {
                reason: "caller reference must not be empty".to_owned(),
            });
        }

        if self.all_zones().await?.iter().any(|z| z.name == name) {
            return Err(Route53Error::HostedZoneAlreadyExists { name });
        }

        let id = ZoneId::generate();
        let zone = StoredZone {
            id: id.resource_id(),
            name: name.clone(),
            caller_reference: req.caller_reference,
            config: req.config.unwrap_or_default(),
            delegation_set: DelegationSet {
                id: req.delegation_set_id,
                caller_reference: None,
                name_servers: self.dns.name_servers.clone(),
            },
            tags: TagSet::new(),
        };

        let ns_values: Vec<&str> = self.dns.name_servers.iter().map(String::as_str).collect();
        let seeded = [
            ResourceRecordSet::new(name.clone(), RrType::Soa, SOA_TTL, &[self.dns.soa.as_str()]),
            ResourceRecordSet::new(name.clone(), RrType::Ns, NS_TTL, &ns_values),
        ];

        let change = new_change(None);
        let mut batch = WriteBatch::new();
        batch
            .put(PutEntry::new(id.zone_key(), codec::encode(&zone)?).create_only())
            .put(PutEntry::new(names::zone_name_key(&name), id.bare().as_bytes().to_vec()).create_only());
        for rrs in &seeded {
            let key = RecordKey::derive(&id, &name, &rrs.name, rrs.rr_type)?;
            batch.put(PutEntry::new(key.key, codec::encode(rrs)?).create_only());
        }
        put_change(&mut batch, &change)?;

        match self.store.commit(batch).await {
            Ok(()) => {}
            Err(StorageError::Rejected { key, .. }) if key.starts_with(ZONE_NAME_PREFIX) => {
                return Err(Route53Error::HostedZoneAlreadyExists { name });
            }
            Err(e) => return Err(e.into()),
        }

        info!(zone_id = %id, name = %name, "hosted zone created");

        Ok(CreateHostedZoneOutput {
            hosted_zone: zone.view(SEEDED_RECORD_COUNT),
            change_info: change,
            delegation_set: zone.delegation_set,
        })
    }

    /// Fetch a zone with its delegation set and live record count.
    ///
    /// # Errors
    ///
    /// Returns [`Route53Error::NoSuchHostedZone`] if the zone does not exist.
    pub async fn get_hosted_zone(&self, id: &str) -> Result<GetHostedZoneOutput, Route53Error> {
        let id = ZoneId::parse(id)?;
        let zone = self.load_zone(&id).await?;
        debug!(zone_id = %id, "hosted zone read");
        Ok(GetHostedZoneOutput {
            hosted_zone: self.with_count(&zone).await?,
            delegation_set: zone.delegation_set,
        })
    }

    /// Number of hosted zones.
    ///
    /// # Errors
    ///
    /// Returns [`Route53Error::Storage`] if the count fails.
    pub async fn get_hosted_zone_count(&self) -> Result<u64, Route53Error> {
        let count = self.store.count_prefix(HOSTED_ZONE_PREFIX).await?;
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    /// Replace a zone's comment. Emits no change record.
    ///
    /// # Errors
    ///
    /// Returns [`Route53Error::NoSuchHostedZone`] if the zone does not exist.
    pub async fn update_hosted_zone_comment(
        &self,
        id: &str,
        comment: Option<String>,
    ) -> Result<HostedZone, Route53Error> {
        let id = ZoneId::parse(id)?;
        let zone = self
            .modify_zone(&id, move |zone| zone.config.comment = comment)
            .await?;
        info!(zone_id = %id, "hosted zone comment updated");
        self.with_count(&zone).await
    }

    /// Delete a zone that holds nothing but its apex SOA and NS records.
    ///
    /// The zone record, its name reservation, and every record set under it
    /// are removed in one batch together with the new change record.
    ///
    /// # Errors
    ///
    /// - [`Route53Error::NoSuchHostedZone`] if the zone does not exist.
    /// - [`Route53Error::HostedZoneNotEmpty`] if any other record set exists.
    pub async fn delete_hosted_zone(&self, id: &str) -> Result<ChangeInfo, Route53Error> {
        let id = ZoneId::parse(id)?;
        let zone = self.load_zone(&id).await?;

        let prefix = id.records_prefix();
        let keys = self.store.list(&prefix).await?;
        let apex_soa = format!("{prefix}{APEX_LABEL}/soa");
        let apex_ns = format!("{prefix}{APEX_LABEL}/ns");
        let only_seeded = keys.iter().all(|k| *k == apex_soa || *k == apex_ns);
        if keys.len() > 2 || !only_seeded {
            return Err(Route53Error::HostedZoneNotEmpty { id: id.resource_id() });
        }

        // Re-checked at commit so a record written after the listing above
        // keeps the zone alive.
        let change = new_change(None);
        let mut batch = WriteBatch::new();
        batch
            .only_keys(prefix.clone(), [apex_soa, apex_ns])
            .delete(id.zone_key())
            .delete(names::zone_name_key(&zone.name))
            .delete_prefix(prefix.clone());
        put_change(&mut batch, &change)?;
        match self.store.commit(batch).await {
            Ok(()) => {}
            Err(StorageError::Rejected { key, .. }) if key.starts_with(&prefix) => {
                return Err(Route53Error::HostedZoneNotEmpty { id: id.resource_id() });
            }
            Err(e) => return Err(e.into()),
        }

        info!(zone_id = %id, name = %zone.name, "hosted zone deleted");
        Ok(change)
    }

    /// Apply a change batch to a zone atomically.
    ///
    /// Every change is validated and keyed before anything is written. The
    /// record writes and the change record then commit as one batch.
    ///
    /// # Errors
    ///
    /// - [`Route53Error::NoSuchHostedZone`] if the zone does not exist.
    /// - [`Route53Error::InvalidChangeBatch`] for an empty batch, a name
    ///   outside the zone, a CREATE or UPSERT without values, or a DELETE of
    ///   the apex SOA or NS.
    /// - [`Route53Error::RecordSetAlreadyExists`] if a CREATE meets an
    ///   existing record set.
    pub async fn change_resource_record_sets(
        &self,
        id: &str,
        change_batch: ChangeBatch,
    ) -> Result<ChangeInfo, Route53Error> {
        let id = ZoneId::parse(id)?;
        let zone = self.load_zone(&id).await?;

        if change_batch.changes.is_empty() {
            return Err(Route53Error::InvalidChangeBatch {
                reason: "change batch contains no changes".to_owned(),
            });
        }

        let mut batch = WriteBatch::new();
        let mut keyed: Vec<RecordKey> = Vec::with_capacity(change_batch.changes.len());
        for change in change_batch.changes {
            let mut rrs = change.resource_record_set;
            let key = RecordKey::derive(&id, &zone.name, &rrs.name, rrs.rr_type)?;

            match change.action {
                ChangeAction::Create | ChangeAction::Upsert => {
                    if rrs.resource_records.is_empty() && rrs.alias_target.is_none() {
                        return Err(Route53Error::InvalidChangeBatch {
                            reason: format!(
                                "resource record set '{}' type '{}' has no records or alias target",
                                key.name, key.rr_type
                            ),
                        });
                    }
                    rrs.name.clone_from(&key.name);
                    let entry = PutEntry::new(key.key.clone(), codec::encode(&rrs)?)
                        .with_overwrite(change.action == ChangeAction::Upsert);
                    batch.put(entry);
                }
                ChangeAction::Delete => {
                    if key.is_apex_default(&zone.name) {
                        return Err(Route53Error::InvalidChangeBatch {
                            reason: format!("cannot delete the apex {} record of zone '{}'", key.rr_type, zone.name),
                        });
                    }
                    batch.delete(key.key.clone());
                }
            }
            keyed.push(key);
        }

        let change = new_change(change_batch.comment);
        put_change(&mut batch, &change)?;

        match self.store.commit(batch).await {
            Ok(()) => {}
            Err(StorageError::Rejected { key, .. }) => {
                let (name, rr_type) = keyed
                    .iter()
                    .find(|k| k.key == key)
                    .map_or_else(|| (key.clone(), String::new()), |k| (k.name.clone(), k.rr_type.to_string()));
                return Err(Route53Error::RecordSetAlreadyExists { name, rr_type });
            }
            Err(e) => return Err(e.into()),
        }

        info!(zone_id = %id, changes = keyed.len(), change_id = %change.id, "record sets changed");
        Ok(change)
    }

    /// Look up a change record.
    ///
    /// Change records expire after [`CHANGE_RETENTION`]. An id that is no
    /// longer stored yields a synthesized in-sync record carrying
    /// [`EXPIRED_CHANGE_COMMENT`] and backdated by the retention period.
    ///
    /// # Errors
    ///
    /// Returns [`Route53Error::Storage`] or [`Route53Error::Codec`] only.
    pub async fn get_change(&self, id: &str) -> Result<ChangeInfo, Route53Error> {
        let bare = names::bare_change_id(id);
        let key = names::change_key(bare);
        match self.store.get(&key).await? {
            Some(bytes) => Ok(codec::decode(&key, &bytes)?),
            None => {
                warn!(change_id = %bare, "change record expired or unknown, synthesizing");
                let retention = chrono::Duration::from_std(CHANGE_RETENTION).unwrap_or(chrono::Duration::zero());
                Ok(ChangeInfo {
                    id: key,
                    status: ChangeStatus::Insync,
                    submitted_at: Utc::now() - retention,
                    comment: Some(EXPIRED_CHANGE_COMMENT.to_owned()),
                })
            }
        }
    }

    /// List zones ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`Route53Error::InvalidInput`] for a malformed marker.
    pub async fn list_hosted_zones(
        &self,
        req: ListHostedZonesRequest,
    ) -> Result<ListHostedZonesOutput, Route53Error> {
        let limit = pagination::normalize_limit(req.max_items, ZONE_PAGE_SIZE, ZONE_PAGE_SIZE);
        let start = req
            .marker
            .as_deref()
            .map(|m| {
                ZoneId::parse(m)
                    .map(|id| id.resource_id())
                    .map_err(|_| Route53Error::InvalidInput {
                        reason: format!("invalid marker '{m}'"),
                    })
            })
            .transpose()?;

        let page: Page<StoredZone, String> =
            pagination::paginate(self.all_zones().await?, |z| z.id.clone(), start.as_ref(), limit);

        let mut hosted_zones = Vec::with_capacity(page.items.len());
        for zone in &page.items {
            hosted_zones.push(self.with_count(zone).await?);
        }
        debug!(count = hosted_zones.len(), "hosted zones listed");

        Ok(ListHostedZonesOutput {
            hosted_zones,
            marker: req.marker,
            is_truncated: page.next.is_some(),
            next_marker: page.next,
            max_items: limit,
        })
    }

    /// List zones ordered by name, then id.
    ///
    /// # Errors
    ///
    /// Returns [`Route53Error::InvalidDomainName`] for a malformed start name
    /// and [`Route53Error::InvalidInput`] if a zone id is given without a name.
    pub async fn list_hosted_zones_by_name(
        &self,
        req: ListHostedZonesByNameRequest,
    ) -> Result<ListHostedZonesByNameOutput, Route53Error> {
        let limit = pagination::normalize_limit(req.max_items, ZONE_PAGE_SIZE, ZONE_PAGE_SIZE);

        let start = match (req.dns_name.as_deref(), req.hosted_zone_id.as_deref()) {
            (None, None) => None,
            (None, Some(_)) => {
                return Err(Route53Error::InvalidInput {
                    reason: "a hosted zone id requires a DNS name".to_owned(),
                });
            }
            (Some(name), id) => {
                let name = names::canonical_zone_name(name)?;
                let id = id.map(ZoneId::parse).transpose()?.map(|id| id.resource_id());
                Some((name, id.unwrap_or_default()))
            }
        };

        let page = pagination::paginate(
            self.all_zones().await?,
            |z| (z.name.clone(), z.id.clone()),
            start.as_ref(),
            limit,
        );

        let mut hosted_zones = Vec::with_capacity(page.items.len());
        for zone in &page.items {
            hosted_zones.push(self.with_count(zone).await?);
        }

        let (next_dns_name, next_hosted_zone_id) = page.next.map_or((None, None), |(n, i)| (Some(n), Some(i)));
        Ok(ListHostedZonesByNameOutput {
            hosted_zones,
            dns_name: req.dns_name,
            hosted_zone_id: req.hosted_zone_id,
            is_truncated: next_dns_name.is_some(),
            next_dns_name,
            next_hosted_zone_id,
            max_items: limit,
        })
    }

    /// List a zone's record sets ordered by name, then type.
    ///
    /// # Errors
    ///
    /// - [`Route53Error::NoSuchHostedZone`] if the zone does not exist.
    /// - [`Route53Error::InvalidInput`] if a start type is given without a
    ///   start name, or the start name lies outside the zone.
    pub async fn list_resource_record_sets(
        &self,
        req: ListResourceRecordSetsRequest,
    ) -> Result<ListResourceRecordSetsOutput, Route53Error> {
        let id = ZoneId::parse(&req.hosted_zone_id)?;
        let zone = self.load_zone(&id).await?;
        let limit = pagination::normalize_limit(req.max_items, RECORD_PAGE_SIZE, RECORD_PAGE_SIZE);

        let start = match (req.start_record_name.as_deref(), req.start_record_type) {
            (None, None) => None,
            (None, Some(_)) => {
                return Err(Route53Error::InvalidInput {
                    reason: "a start record type requires a start record name".to_owned(),
                });
            }
            (Some(name), rr_type) => {
                let name = names::qualify_record_name(&zone.name, name).map_err(|e| Route53Error::InvalidInput {
                    reason: e.to_string(),
                })?;
                Some((name, rr_type.map_or("", RrType::as_str)))
            }
        };

        let records = self
            .store
            .scan_prefix(&id.records_prefix())
            .await?
            .into_iter()
            .map(|(key, bytes)| codec::decode::<ResourceRecordSet>(&key, &bytes).map_err(Route53Error::from))
            .collect::<Result<Vec<_>, _>>()?;

        let page = pagination::paginate(
            records,
            |r| (r.name.clone(), r.rr_type.as_str()),
            start.as_ref(),
            limit,
        );
        debug!(zone_id = %id, count = page.items.len(), "record sets listed");

        let (next_record_name, next_record_type) = match page.next {
            Some((name, rr_type)) => (Some(name), rr_type.parse::<RrType>().ok()),
            None => (None, None),
        };
        Ok(ListResourceRecordSetsOutput {
            resource_record_sets: page.items,
            is_truncated: next_record_name.is_some(),
            next_record_name,
            next_record_type,
            max_items: limit,
        })
    }

    fn check_resource_type(resource_type: &str) -> Result<(), Route53Error> {
        if resource_type.eq_ignore_ascii_case(TAG_RESOURCE_TYPE) {
            Ok(())
        } else {
            Err(Route53Error::InvalidInput {
                reason: format!("unsupported tag resource type '{resource_type}'"),
            })
        }
    }

    /// Remove then add tags on a zone. Emits no change record.
    ///
    /// # Errors
    ///
    /// - [`Route53Error::InvalidInput`] for a resource type other than
    ///   `hostedzone`.
    /// - [`Route53Error::NoSuchHostedZone`] if the zone does not exist.
    pub async fn change_tags_for_resource(
        &self,
        resource_type: &str,
        id: &str,
        add: Vec<Tag>,
        remove: Vec<String>,
    ) -> Result<(), Route53Error> {
        Self::check_resource_type(resource_type)?;
        let id = ZoneId::parse(id)?;
        let (added, removed) = (add.len(), remove.len());
        self.modify_zone(&id, move |zone| zone.tags.apply(add, remove))
            .await?;
        info!(zone_id = %id, added, removed, "hosted zone tags changed");
        Ok(())
    }

    /// Tags on a zone, in key order.
    ///
    /// # Errors
    ///
    /// Same as [`change_tags_for_resource`](Self::change_tags_for_resource).
    pub async fn list_tags_for_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<ResourceTagSet, Route53Error> {
        Self::check_resource_type(resource_type)?;
        let id = ZoneId::parse(id)?;
        let zone = self.load_zone(&id).await?;
        Ok(ResourceTagSet {
            resource_id: id.bare().to_owned(),
            resource_type: TAG_RESOURCE_TYPE.to_owned(),
            tags: zone.tags.to_vec(),
        })
    }
}
