//! Route53-style hosted zones.
//!
//! [`HostedZoneEngine`] owns zones, record sets, and change records. Name
//! and key derivation lives in [`names`]; request and record shapes in
//! [`types`].

mod engine;
pub mod names;
pub mod types;

pub use engine::{
    CHANGE_RETENTION, EXPIRED_CHANGE_COMMENT, HostedZoneEngine, NS_TTL, RECORD_PAGE_SIZE, SOA_TTL,
    TAG_RESOURCE_TYPE, ZONE_PAGE_SIZE,
};
pub use names::{RecordKey, ZoneId};
pub use types::*;
