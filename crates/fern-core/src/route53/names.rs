//! Zone ids, zone names, and record keys.
//!
//! Every storage key the zone engine touches is derived here and nowhere
//! else:
//!
//! | Entity | Key |
//! |---|---|
//! | zone | `/hostedzone/<id>` |
//! | name reservation | `/zonename/<canonical name>` |
//! | record set | `/recordset/<id>/<relative label or @>/<type, lower case>` |
//! | change | `/change/<id>` |

use std::fmt;

use crate::error::Route53Error;
use crate::ids;
use crate::route53::types::RrType;

pub(crate) const HOSTED_ZONE_PREFIX: &str = "/hostedzone/";
pub(crate) const ZONE_NAME_PREFIX: &str = "/zonename/";
pub(crate) const RECORD_SET_PREFIX: &str = "/recordset/";
pub(crate) const CHANGE_PREFIX: &str = "/change/";

/// Relative label of the zone apex.
pub const APEX_LABEL: &str = "@";

/// A hosted zone id in bare form (`Z1ABC...`).
///
/// Parses either the bare or the `/hostedzone/`-prefixed form, so callers
/// never strip prefixes themselves.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoneId(String);

impl ZoneId {
    /// Parse a bare or prefixed zone id.
    ///
    /// # Errors
    ///
    /// Returns [`Route53Error::NoSuchHostedZone`] for an empty id or one that
    /// contains a `/` after the prefix, since no zone can have that id.
    pub fn parse(raw: &str) -> Result<Self, Route53Error> {
        let trimmed = raw.trim();
        let bare = trimmed.strip_prefix(HOSTED_ZONE_PREFIX).unwrap_or(trimmed);
        if bare.is_empty() || bare.contains('/') {
            return Err(Route53Error::NoSuchHostedZone { id: raw.to_owned() });
        }
        Ok(Self(bare.to_owned()))
    }

    /// A fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(ids::random_id(ids::ID_LEN))
    }

    /// Bare form.
    #[must_use]
    pub fn bare(&self) -> &str {
        &self.0
    }

    /// Prefixed form, `/hostedzone/<id>`, also the zone's storage key.
    #[must_use]
    pub fn resource_id(&self) -> String {
        format!("{HOSTED_ZONE_PREFIX}{}", self.0)
    }

    /// Storage key of the zone record.
    #[must_use]
    pub fn zone_key(&self) -> String {
        self.resource_id()
    }

    /// Prefix under which every record set of the zone is stored.
    #[must_use]
    pub fn records_prefix(&self) -> String {
        format!("{RECORD_SET_PREFIX}{}/", self.0)
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage key of the reservation that keeps zone names unique.
#[must_use]
pub fn zone_name_key(canonical_name: &str) -> String {
    format!("{ZONE_NAME_PREFIX}{canonical_name}")
}

/// Split a change id into its bare form, accepting `/change/` prefixes.
#[must_use]
pub fn bare_change_id(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix(CHANGE_PREFIX).unwrap_or(trimmed)
}

/// Storage key of a change record.
#[must_use]
pub fn change_key(bare_id: &str) -> String {
    format!("{CHANGE_PREFIX}{bare_id}")
}

/// Canonicalize a zone name: lower case with exactly one trailing dot.
///
/// # Errors
///
/// Returns [`Route53Error::InvalidDomainName`] for an empty name, the root
/// alone, or a name with an empty label.
pub fn canonical_zone_name(name: &str) -> Result<String, Route53Error> {
    let invalid = |reason: &str| Route53Error::InvalidDomainName {
        name: name.to_owned(),
        reason: reason.to_owned(),
    };

    let lowered = name.trim().to_ascii_lowercase();
    let body = lowered.strip_suffix('.').unwrap_or(&lowered);
    if body.is_empty() {
        return Err(invalid("name is empty"));
    }
    if body.split('.').any(str::is_empty) {
        return Err(invalid("name contains an empty label"));
    }
    Ok(format!("{body}."))
}

/// Fully qualify a record name against its zone.
///
/// `@` and the zone name itself denote the apex, even when the zone name is
/// a single label. Any other single label, with or without a trailing dot,
/// is relative to the zone, so `WWW` and `www.` name the same record and
/// `org.` in `example.com.` is `org.example.com.`. Anything longer must end
/// with `.<zone name>`. Comparison is case-insensitive.
///
/// # Errors
///
/// Returns [`Route53Error::InvalidChangeBatch`] if the name is empty or lies
/// outside the zone.
pub fn qualify_record_name(zone_name: &str, name: &str) -> Result<String, Route53Error> {
    let lowered = name.trim().to_ascii_lowercase();
    if lowered == APEX_LABEL {
        return Ok(zone_name.to_owned());
    }

    let body = lowered.strip_suffix('.').unwrap_or(&lowered);
    if body.is_empty() || body.split('.').any(str::is_empty) {
        return Err(Route53Error::InvalidChangeBatch {
            reason: format!("record name '{name}' is not a valid domain name"),
        });
    }

    let absolute = format!("{body}.");
    if absolute == zone_name {
        return Ok(absolute);
    }
    let qualified = if body.contains('.') {
        absolute
    } else {
        format!("{body}.{zone_name}")
    };

    if qualified == zone_name || qualified.ends_with(&format!(".{zone_name}")) {
        Ok(qualified)
    } else {
        Err(Route53Error::InvalidChangeBatch {
            reason: format!("record name '{name}' is not permitted in zone '{zone_name}'"),
        })
    }
}

/// Label of a qualified record name relative to its zone, `@` for the apex.
#[must_use]
pub fn relative_label<'a>(zone_name: &str, qualified: &'a str) -> &'a str {
    match qualified.strip_suffix(zone_name) {
        Some("") | None => APEX_LABEL,
        Some(rest) => rest.strip_suffix('.').unwrap_or(rest),
    }
}

/// A record set's identity within a zone and its storage key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordKey {
    /// Fully qualified, lower-case name with trailing dot.
    pub name: String,
    pub rr_type: RrType,
    /// Storage key.
    pub key: String,
}

impl RecordKey {
    /// Derive the canonical key of `name`/`rr_type` in a zone.
    ///
    /// # Errors
    ///
    /// See [`qualify_record_name`].
    pub fn derive(zone: &ZoneId, zone_name: &str, name: &str, rr_type: RrType) -> Result<Self, Route53Error> {
        let qualified = qualify_record_name(zone_name, name)?;
        let key = format!(
            "{}{}/{}",
            zone.records_prefix(),
            relative_label(zone_name, &qualified),
            rr_type.as_str().to_ascii_lowercase()
        );
        Ok(Self {
            name: qualified,
            rr_type,
            key,
        })
    }

    /// Whether this is the apex SOA or NS record every zone carries.
    #[must_use]
    pub fn is_apex_default(&self, zone_name: &str) -> bool {
        self.name == zone_name && matches!(self.rr_type, RrType::Soa | RrType::Ns)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const ZONE: &str = "example.com.";

    fn zone() -> ZoneId {
        ZoneId::parse("Z1PA6795UKMFR9").unwrap()
    }

    #[test]
    fn zone_id_accepts_both_forms() {
        let bare = ZoneId::parse("Z1PA6795UKMFR9").unwrap();
        let prefixed = ZoneId::parse("/hostedzone/Z1PA6795UKMFR9").unwrap();
        assert_eq!(bare, prefixed);
        assert_eq!(bare.resource_id(), "/hostedzone/Z1PA6795UKMFR9");
        assert_eq!(bare.records_prefix(), "/recordset/Z1PA6795UKMFR9/");
        assert!(ZoneId::parse("").is_err());
        assert!(ZoneId::parse("/hostedzone/").is_err());
        assert!(ZoneId::parse("/hostedzone/a/b").is_err());
    }

    #[test]
    fn zone_names_are_canonical() {
        assert_eq!(canonical_zone_name("Example.COM").unwrap(), ZONE);
        assert_eq!(canonical_zone_name("example.com.").unwrap(), ZONE);
        assert!(canonical_zone_name("").is_err());
        assert!(canonical_zone_name(".").is_err());
        assert!(canonical_zone_name("a..b").is_err());
    }

    #[test]
    fn relative_and_absolute_names_share_a_key() {
        let a = RecordKey::derive(&zone(), ZONE, "WWW", "A".parse().unwrap()).unwrap();
        let b = RecordKey::derive(&zone(), ZONE, "www.", "a".parse().unwrap()).unwrap();
        let c = RecordKey::derive(&zone(), ZONE, "www.example.com", RrType::A).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.key, "/recordset/Z1PA6795UKMFR9/www/a");
        assert_eq!(a.name, "www.example.com.");
    }

    #[test]
    fn apex_maps_to_at_sign() {
        for name in ["example.com.", "EXAMPLE.com", "@"] {
            let k = RecordKey::derive(&zone(), ZONE, name, RrType::Soa).unwrap();
            assert_eq!(k.key, "/recordset/Z1PA6795UKMFR9/@/soa");
            assert!(k.is_apex_default(ZONE));
        }
    }

    #[test]
    fn deep_names_keep_their_labels() {
        let k = RecordKey::derive(&zone(), ZONE, "a.b.example.com.", RrType::Txt).unwrap();
        assert_eq!(k.key, "/recordset/Z1PA6795UKMFR9/a.b/txt");
        assert!(!k.is_apex_default(ZONE));
    }

    #[test]
    fn names_outside_the_zone_are_rejected() {
        for name in ["www.example.org.", "badexample.com.", "", "a..example.com."] {
            assert!(
                matches!(
                    RecordKey::derive(&zone(), ZONE, name, RrType::A),
                    Err(Route53Error::InvalidChangeBatch { .. })
                ),
                "{name}"
            );
        }
    }

    #[test]
    fn single_label_zone_apex() {
        let local = ZoneId::parse("ZLOCAL").unwrap();
        for name in ["local.", "LOCAL", "@"] {
            let k = RecordKey::derive(&local, "local.", name, RrType::Ns).unwrap();
            assert_eq!(k.key, "/recordset/ZLOCAL/@/ns", "{name}");
            assert_eq!(k.name, "local.");
            assert!(k.is_apex_default("local."));
        }
        let www = RecordKey::derive(&local, "local.", "www", RrType::A).unwrap();
        assert_eq!(www.name, "www.local.");
        assert_eq!(www.key, "/recordset/ZLOCAL/www/a");
    }

    #[test]
    fn dotted_single_label_is_relative() {
        let k = RecordKey::derive(&zone(), ZONE, "org.", RrType::A).unwrap();
        assert_eq!(k.name, "org.example.com.");
        assert_eq!(k.key, "/recordset/Z1PA6795UKMFR9/org/a");
        assert!(RecordKey::derive(&zone(), ZONE, "example.org.", RrType::A).is_err());
    }

    #[test]
    fn change_ids_strip_prefix() {
        assert_eq!(bare_change_id("/change/C123"), "C123");
        assert_eq!(bare_change_id("C123"), "C123");
        assert_eq!(change_key("C123"), "/change/C123");
    }

    proptest! {
        #[test]
        fn casing_and_trailing_dot_never_change_the_key(label in "[a-z][a-z0-9-]{0,20}", upper in any::<bool>(), dot in any::<bool>()) {
            let mut name = if upper { label.to_ascii_uppercase() } else { label.clone() };
            if dot {
                name.push('.');
            }
            let k = RecordKey::derive(&zone(), ZONE, &name, RrType::Cname).unwrap();
            prop_assert_eq!(k.key, format!("/recordset/Z1PA6795UKMFR9/{label}/cname"));
        }
    }
}
