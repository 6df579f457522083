//! Per-query decision: answer with the gateway, deny, or pass on.
//!
//! ```text
//! myservice.test.svc.clusterset.local.  A
//!   → longest matching zone         svc.clusterset.local.
//!   → remainder                     myservice.test.
//!   → identity                      myservice.test
//!   → in index?  yes → A <gateway ipv4>, authoritative
//!                no  → fallthrough ? next handler : NXDOMAIN
//! ```

use hickory_proto::rr::{Name, RecordType};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::{debug, trace};

use crate::config::DnsConfig;
use crate::error::DnsError;
use crate::identity::{build_identity, split_query_name, SEPARATOR};
use crate::index::MembershipIndex;
use crate::zone::{parse_name, Fallthrough, Zone, Zones};

/// An inbound question as seen by the resolver.
#[derive(Debug, Clone, Copy)]
pub struct Query<'a> {
    /// Fully-qualified query name, case preserved.
    pub name: &'a str,
    /// Requested record type.
    pub record_type: RecordType,
}

impl<'a> Query<'a> {
    /// Create a query.
    pub fn new(name: &'a str, record_type: RecordType) -> Self {
        Self { name, record_type }
    }
}

/// One synthesized address record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRecord {
    /// Owner name, identical to the query name.
    pub name: String,
    /// Record TTL in seconds.
    pub ttl: u32,
    /// Gateway address; V4 for A, V6 for AAAA.
    pub address: IpAddr,
}

/// A positive answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Answer section records.
    pub records: Vec<GatewayRecord>,
    /// Whether the response is authoritative.
    pub authoritative: bool,
}

/// Why a query was passed on instead of answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateReason {
    /// The name is outside every configured zone.
    OutOfZone,
    /// The name is in a zone but does not carry a `name.namespace` prefix.
    MalformedName,
    /// The name is unknown (or the type unsupported) and fallthrough covers it.
    Fallthrough,
}

/// Outcome of resolving one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Synthesized gateway answer.
    Answer(Answer),
    /// Definitive "name does not exist".
    NameError,
    /// Hand the query to the next handler.
    Delegate(DelegateReason),
}

/// Capability consumed by the host DNS pipeline.
pub trait Resolve: Send + Sync {
    /// Decide the outcome for a query.
    fn resolve(&self, query: &Query<'_>) -> Resolution;
}

/// Resolves multi-cluster service names against the membership index.
#[derive(Debug, Clone)]
pub struct QueryResolver {
    zones: Zones,
    gateway_ipv4: Ipv4Addr,
    gateway_ipv6: Ipv6Addr,
    fallthrough: Fallthrough,
    ttl: u32,
    index: MembershipIndex,
}

impl QueryResolver {
    /// Create a resolver from its parts.
    pub fn new(
        zones: Zones,
        gateway_ipv4: Ipv4Addr,
        gateway_ipv6: Ipv6Addr,
        fallthrough: Fallthrough,
        ttl: u32,
        index: MembershipIndex,
    ) -> Self {
        Self {
            zones,
            gateway_ipv4,
            gateway_ipv6,
            fallthrough,
            ttl,
            index,
        }
    }

    /// Create a resolver from DNS configuration.
    pub fn from_config(config: &DnsConfig, index: MembershipIndex) -> Result<Self, DnsError> {
        Ok(Self::new(
            config.zones()?,
            config.gateway.ipv4,
            config.gateway.ipv6(),
            config.fallthrough()?,
            config.ttl,
            index,
        ))
    }

    /// Configured zones.
    pub fn zones(&self) -> &Zones {
        &self.zones
    }

    /// Apply the fallthrough policy to a miss.
    fn miss(&self, qname: &Name) -> Resolution {
        if self.fallthrough.through(qname) {
            debug!(name = %qname, "falling through to next handler");
            Resolution::Delegate(DelegateReason::Fallthrough)
        } else {
            Resolution::NameError
        }
    }

    fn answer(&self, qname: &str, address: IpAddr) -> Resolution {
        Resolution::Answer(Answer {
            records: vec![GatewayRecord {
                name: qname.to_string(),
                ttl: self.ttl,
                address,
            }],
            authoritative: true,
        })
    }
}

/// Rebuild the `name.namespace.` text from the labels in front of the zone.
///
/// Labels that are not UTF-8 or that carry an escaped dot cannot form an
/// identity and yield `None`.
fn zone_prefix(qname: &Name, zone: &Zone) -> Option<String> {
    let prefix_labels = usize::from(qname.num_labels().saturating_sub(zone.num_labels()));
    let mut remainder = String::new();
    for label in qname.iter().take(prefix_labels) {
        let label = std::str::from_utf8(label).ok()?;
        if label.contains(SEPARATOR) {
            return None;
        }
        remainder.push_str(label);
        remainder.push(SEPARATOR);
    }
    Some(remainder)
}

impl Resolve for QueryResolver {
    fn resolve(&self, query: &Query<'_>) -> Resolution {
        let qname = query.name;

        let Ok(parsed) = parse_name(qname) else {
            trace!(name = %qname, "unparsable query name");
            return Resolution::Delegate(DelegateReason::OutOfZone);
        };

        let Some(zone) = self.zones.matches(&parsed) else {
            trace!(name = %qname, "not in any zone");
            return Resolution::Delegate(DelegateReason::OutOfZone);
        };

        let Some(remainder) = zone_prefix(&parsed, zone) else {
            debug!(name = %qname, zone = zone.as_str(), "label is not usable in an identity");
            return Resolution::Delegate(DelegateReason::MalformedName);
        };

        let (name, namespace) = match split_query_name(&remainder) {
            Ok(parts) => parts,
            Err(e) => {
                debug!(name = %qname, zone = zone.as_str(), error = %e, "not a service name");
                return Resolution::Delegate(DelegateReason::MalformedName);
            }
        };

        let identity = build_identity(&name.to_ascii_lowercase(), &namespace.to_ascii_lowercase());
        if !self.index.contains(&identity) {
            debug!(name = %qname, identity, "service import not found");
            return self.miss(&parsed);
        }

        match query.record_type {
            RecordType::A => {
                debug!(name = %qname, identity, "answering A with gateway");
                self.answer(qname, IpAddr::V4(self.gateway_ipv4))
            }
            RecordType::AAAA => {
                debug!(name = %qname, identity, "answering AAAA with gateway");
                self.answer(qname, IpAddr::V6(self.gateway_ipv6))
            }
            other => {
                trace!(name = %qname, rtype = ?other, "unsupported record type");
                self.miss(&parsed)
            }
        }
    }
}
