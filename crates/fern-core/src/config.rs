//! Configuration consumed by the domain engines.
//!
//! These are plain values; loading them from a file or the environment is the
//! binary's job.

use serde::Deserialize;

/// Account id used when none is configured.
pub const ZERO_ACCOUNT_ID: &str = "000000000000";

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Region and account that ARNs are minted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountContext {
    pub region: String,
    pub account_id: String,
}

impl AccountContext {
    /// Context for `region` under the zero account.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: ZERO_ACCOUNT_ID.to_owned(),
        }
    }

    /// IAM user ARN for an authenticated identity.
    #[must_use]
    pub fn user_arn(&self, identity: &str) -> String {
        format!("arn:aws:iam::{}:user/{identity}", self.account_id)
    }
}

impl Default for AccountContext {
    fn default() -> Self {
        Self::new(DEFAULT_REGION)
    }
}

/// Record values seeded into every new hosted zone.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DnsDefaults {
    /// SOA record value.
    pub soa: String,
    /// NS record values, one per name server.
    pub name_servers: Vec<String>,
}

impl Default for DnsDefaults {
    fn default() -> Self {
        Self {
            soa: "ns-1.example.com. hostmaster.example.com. 1 7200 900 1209600 86400".to_owned(),
            name_servers: (1..=4).map(|n| format!("ns-{n}.example.com.")).collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn user_arn_uses_account() {
        let ctx = AccountContext::default();
        assert_eq!(ctx.user_arn("alice"), "arn:aws:iam::000000000000:user/alice");
    }

    #[test]
    fn partial_dns_config_keeps_defaults() {
        let dns: DnsDefaults = serde_json::from_str(r#"{"nameServers":["ns1.local."]}"#).unwrap();
        assert_eq!(dns.name_servers, vec!["ns1.local."]);
        assert_eq!(dns.soa, DnsDefaults::default().soa);
    }
}
