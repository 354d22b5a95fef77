//! Core library for `fern`.
//!
//! Contains the two domain engines, a Route53-style hosted zone engine
//! ([`route53::HostedZoneEngine`]) and an SSM-style parameter store
//! ([`ssm::ParameterEngine`]), along with the pieces they share: the value
//! codec, cursor pagination, tag sets, random identifiers, AES-256-GCM
//! envelope encryption, and the configured key ring.
//!
//! Both engines talk only to a [`fern_storage::StorageBackend`]. Neither knows
//! about HTTP, request signing, or wire formats.

pub mod codec;
pub mod config;
pub mod crypto;
pub mod dump;
pub mod error;
pub mod ids;
pub mod keyring;
pub mod pagination;
pub mod route53;
pub mod ssm;
pub mod tags;

pub use config::{AccountContext, DnsDefaults};
pub use error::ErrorKind;
pub use keyring::{KeyConfig, KeyRing};
pub use tags::TagSet;
