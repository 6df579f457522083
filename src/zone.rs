//! Zone suffix matching and fallthrough policy.
//!
//! Zones keep their lowercase fully-qualified text (`svc.clusterset.local.`)
//! next to the parsed [`Name`]. Matching compares labels, never text, so an
//! escaped dot inside a label (`foo\.svc`) cannot pass for a label boundary.
//! It is case-insensitive and picks the longest zone the query name is equal
//! to or a subdomain of.

use hickory_proto::rr::Name;

use crate::error::DnsError;

/// Normalize a zone or query name to lowercase FQDN form.
pub fn normalize(name: &str) -> String {
    let mut normalized = name.to_ascii_lowercase();
    if !normalized.ends_with('.') {
        normalized.push('.');
    }
    normalized
}

/// Parse a query name as a fully-qualified [`Name`], keeping its case.
pub fn parse_name(name: &str) -> Result<Name, hickory_proto::ProtoError> {
    let mut parsed = Name::from_ascii(name)?;
    parsed.set_fqdn(true);
    Ok(parsed)
}

/// One configured zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    text: String,
    origin: Name,
}

impl Zone {
    fn parse(zone: &str) -> Result<Self, DnsError> {
        let text = normalize(zone);
        let origin =
            parse_name(&text).map_err(|e| DnsError::Config(format!("invalid zone {zone:?}: {e}")))?;
        Ok(Self { text, origin })
    }

    /// Normalized zone text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of labels in the zone, not counting the root.
    pub fn num_labels(&self) -> u8 {
        self.origin.num_labels()
    }

    /// True if `qname` is the zone itself or a name below it.
    pub fn contains(&self, qname: &Name) -> bool {
        self.origin.zone_of(qname)
    }
}

/// Parse and normalize a list of configured zone names.
fn parse_zones<I, S>(zones: I) -> Result<Vec<Zone>, DnsError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    zones.into_iter().map(|zone| Zone::parse(zone.as_ref())).collect()
}

/// Set of zones this server is authoritative for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zones {
    zones: Vec<Zone>,
}

impl Zones {
    /// Build a zone list. Fails on an empty list or an unparsable name.
    pub fn new<I, S>(zones: I) -> Result<Self, DnsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let zones = parse_zones(zones)?;
        if zones.is_empty() {
            return Err(DnsError::Config("at least one zone is required".into()));
        }
        Ok(Self { zones })
    }

    /// Return the longest zone containing `qname`, if any.
    pub fn matches(&self, qname: &Name) -> Option<&Zone> {
        self.zones
            .iter()
            .filter(|zone| zone.contains(qname))
            .max_by_key(|zone| zone.num_labels())
    }

    /// Iterate over the normalized zone names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.zones.iter().map(Zone::as_str)
    }

    /// Number of configured zones.
    pub fn len(&self) -> usize {
        self.zones.len()
    }

    /// True if no zones are configured.
    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Names for which a miss is passed on to the next handler instead of being
/// answered with NXDOMAIN.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Fallthrough {
    /// Always answer misses definitively.
    #[default]
    Never,
    /// Pass misses on for names under these zones; an empty list covers every
    /// name.
    Zones(Vec<Zone>),
}

impl Fallthrough {
    /// Build the policy from its configured form.
    ///
    /// `None` disables fallthrough, `Some([])` enables it for every name.
    pub fn from_config(zones: Option<&[String]>) -> Result<Self, DnsError> {
        match zones {
            None => Ok(Self::Never),
            Some(zones) => Ok(Self::Zones(parse_zones(zones)?)),
        }
    }

    /// Check whether a miss for `qname` should be passed on.
    pub fn through(&self, qname: &Name) -> bool {
        match self {
            Self::Never => false,
            Self::Zones(zones) if zones.is_empty() => true,
            Self::Zones(zones) => zones.iter().any(|zone| zone.contains(qname)),
        }
    }
}
