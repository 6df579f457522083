//! Hickory DNS authority adapter over the query resolver.
//!
//! One authority is registered per configured zone. Each one hands the
//! question to the shared [`Resolve`] implementation and maps its decision
//! onto hickory's control flow:
//!
//! | Resolution   | LookupControlFlow                  |
//! |--------------|------------------------------------|
//! | `Answer`     | `Break(Ok(records))`               |
//! | `NameError`  | `Break(Err(NXDomain))`             |
//! | `Delegate`   | `Skip` (next authority in chain)   |
//!
//! Every zone chain ends in a [`TerminalAuthority`], which answers whatever
//! reaches it with REFUSED. Without it hickory drops queries that every
//! authority skipped.

use async_trait::async_trait;
use hickory_proto::op::ResponseCode;
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{DNSClass, LowerName, Name, RData, Record, RecordSet, RecordType};
use hickory_server::authority::{
    Authority, LookupControlFlow, LookupError, LookupOptions, LookupRecords, MessageRequest,
    UpdateResult, ZoneType,
};
use hickory_server::server::RequestInfo;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, trace, warn};

use crate::metrics::{self, QueryResult, Timer};
use crate::resolver::{GatewayRecord, Query, Resolution, Resolve};

/// Authority for one multi-cluster zone.
pub struct GatewayAuthority {
    origin: LowerName,
    resolver: Arc<dyn Resolve>,
}

impl GatewayAuthority {
    /// Create an authority for `zone` backed by `resolver`.
    pub fn new(zone: &str, resolver: Arc<dyn Resolve>) -> Result<Self, hickory_proto::ProtoError> {
        let origin = Name::from_ascii(zone)?.into();
        Ok(Self { origin, resolver })
    }

    /// Build the answer record set. All records share the query name and type.
    fn build_record_set(
        &self,
        record_type: RecordType,
        records: &[GatewayRecord],
    ) -> Result<RecordSet, hickory_proto::ProtoError> {
        let mut record_set: Option<RecordSet> = None;

        for gateway in records {
            let name = Name::from_ascii(&gateway.name)?;
            let rdata = match gateway.address {
                IpAddr::V4(ip) => RData::A(A::from(ip)),
                IpAddr::V6(ip) => RData::AAAA(AAAA::from(ip)),
            };
            let mut record = Record::from_rdata(name.clone(), gateway.ttl, rdata);
            record.set_dns_class(DNSClass::IN);

            record_set
                .get_or_insert_with(|| RecordSet::new(name, record_type, 0))
                .insert(record, 0);
        }

        Ok(record_set.unwrap_or_else(|| RecordSet::new(Name::from(self.origin.clone()), record_type, 0)))
    }

    /// Resolve `name` and translate the outcome.
    fn answer(
        &self,
        name: &str,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<LookupRecords> {
        let timer = Timer::start();
        let rtype_str = rtype.to_string();

        trace!(name = %name, rtype = ?rtype, "DNS lookup");

        match self.resolver.resolve(&Query::new(name, rtype)) {
            Resolution::Answer(answer) => match self.build_record_set(rtype, &answer.records) {
                Ok(record_set) => {
                    debug!(name = %name, rtype = ?rtype, "answering with gateway address");
                    metrics::record_query(&rtype_str, QueryResult::Answered, timer.elapsed());
                    LookupControlFlow::Break(Ok(LookupRecords::new(
                        lookup_options,
                        Arc::new(record_set),
                    )))
                }
                Err(e) => {
                    warn!(name = %name, error = %e, "failed to build answer");
                    metrics::record_query(&rtype_str, QueryResult::Error, timer.elapsed());
                    LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::ServFail)))
                }
            },
            Resolution::NameError => {
                debug!(name = %name, rtype = ?rtype, "name does not exist");
                metrics::record_query(&rtype_str, QueryResult::NxDomain, timer.elapsed());
                LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NXDomain)))
            }
            Resolution::Delegate(reason) => {
                debug!(name = %name, reason = ?reason, "passing to next authority");
                metrics::record_query(&rtype_str, QueryResult::Delegated, timer.elapsed());
                LookupControlFlow::Skip
            }
        }
    }
}

#[async_trait]
impl Authority for GatewayAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    /// Lookups by lowercased name. Answers carry the lowercased owner name.
    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.answer(&name.to_string(), rtype, lookup_options)
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        // Answer with the name exactly as the client spelled it.
        let query = request_info.query.original();
        self.answer(&query.name().to_string(), query.query_type(), lookup_options)
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        Err(ResponseCode::NotImp)
    }
}

/// Last link of a zone's authority chain: refuses every query it receives.
pub struct TerminalAuthority {
    origin: LowerName,
}

impl TerminalAuthority {
    /// Create the terminal authority for `zone`.
    pub fn new(zone: &str) -> Result<Self, hickory_proto::ProtoError> {
        Ok(Self {
            origin: Name::from_ascii(zone)?.into(),
        })
    }
}

#[async_trait]
impl Authority for TerminalAuthority {
    type Lookup = LookupRecords;

    fn zone_type(&self) -> ZoneType {
        ZoneType::Primary
    }

    fn is_axfr_allowed(&self) -> bool {
        false
    }

    fn origin(&self) -> &LowerName {
        &self.origin
    }

    async fn lookup(
        &self,
        name: &LowerName,
        rtype: RecordType,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        debug!(name = %name, rtype = ?rtype, "no authority answered, refusing");
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::Refused)))
    }

    async fn search(
        &self,
        request_info: RequestInfo<'_>,
        lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        self.lookup(
            request_info.query.name(),
            request_info.query.query_type(),
            lookup_options,
        )
        .await
    }

    async fn get_nsec_records(
        &self,
        _name: &LowerName,
        _lookup_options: LookupOptions,
    ) -> LookupControlFlow<Self::Lookup> {
        LookupControlFlow::Break(Err(LookupError::ResponseCode(ResponseCode::NoError)))
    }

    async fn update(&self, _update: &MessageRequest) -> UpdateResult<bool> {
        Err(ResponseCode::NotImp)
    }
}
