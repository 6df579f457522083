//! Shared test infrastructure for catalog-level integration tests.

#![allow(dead_code)]

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};
use hickory_proto::serialize::binary::{BinDecodable, BinDecoder, BinEncoder};
use hickory_server::authority::{Catalog, MessageRequest, MessageResponse};
use hickory_server::proto::rr::Record;
use hickory_server::proto::xfer::Protocol;
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo};

use mcs_gateway_dns::config::{DnsConfig, GatewayConfig};
use mcs_gateway_dns::{build_catalog, MembershipIndex};

// --- Constants ---

pub const ZONE: &str = "svc.clusterset.local.";
pub const GATEWAY_V4: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);
pub const GATEWAY_V6: Ipv6Addr = Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 1);

// --- TestResponseHandler ---

/// Captures the serialized DNS response for inspection in tests.
///
/// Implements `ResponseHandler` so it can be passed to `Catalog::handle_request()`.
/// The response is serialized via `MessageResponse::destructive_emit()` and stored
/// as raw wire-format bytes, which can then be parsed with `Message::from_vec()`.
#[derive(Clone)]
pub struct TestResponseHandler {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl TestResponseHandler {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::with_capacity(512))),
        }
    }

    /// Parse the captured wire bytes into a `Message` for assertions.
    pub fn into_message(self) -> Message {
        let buf = self.buf.lock().unwrap();
        assert!(!buf.is_empty(), "no response was captured");
        Message::from_vec(&buf).expect("failed to parse captured DNS response")
    }
}

#[async_trait]
impl ResponseHandler for TestResponseHandler {
    async fn send_response<'a>(
        &mut self,
        response: MessageResponse<
            '_,
            'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
            impl Iterator<Item = &'a Record> + Send + 'a,
        >,
    ) -> io::Result<ResponseInfo> {
        let mut buf = self.buf.lock().unwrap();
        buf.clear();
        let mut encoder = BinEncoder::new(&mut *buf);
        encoder.set_max_size(u16::MAX);
        let info = response
            .destructive_emit(&mut encoder)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        Ok(info)
    }
}

// --- Config builders ---

pub fn test_dns_config() -> DnsConfig {
    DnsConfig {
        listen_addr: "127.0.0.1:5353".parse().unwrap(),
        zones: vec![ZONE.to_string()],
        gateway: GatewayConfig {
            ipv4: GATEWAY_V4,
            ipv6: Some(GATEWAY_V6),
        },
        ttl: 5,
        fallthrough: None,
    }
}

pub fn test_dns_config_with_fallthrough(names: &[&str]) -> DnsConfig {
    DnsConfig {
        fallthrough: Some(names.iter().map(|n| n.to_string()).collect()),
        ..test_dns_config()
    }
}

/// Build an index holding `identities`.
pub fn index_with(identities: &[&str]) -> MembershipIndex {
    let index = MembershipIndex::new();
    for identity in identities {
        index.add(identity);
    }
    index
}

/// Build a catalog over `index`.
pub fn test_catalog(config: &DnsConfig, index: MembershipIndex) -> Catalog {
    build_catalog(config, index).expect("failed to build catalog")
}

// --- Query/Request construction ---

pub fn client_src() -> SocketAddr {
    "10.0.0.1:12345".parse().unwrap()
}

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg.to_vec().unwrap()
}

/// Parse wire bytes into a MessageRequest.
pub fn parse_message_request(bytes: &[u8]) -> MessageRequest {
    let mut decoder = BinDecoder::new(bytes);
    MessageRequest::read(&mut decoder).expect("failed to parse MessageRequest")
}

/// Build a full `Request` from a client address.
pub fn build_request(name: &str, record_type: RecordType, src: SocketAddr, id: u16) -> Request {
    let bytes = build_query_bytes(name, record_type, id);
    let msg = parse_message_request(&bytes);
    Request::new(msg, src, Protocol::Udp)
}

// --- Response helpers ---

/// Execute a query through the catalog and return the parsed response.
pub async fn execute_query(catalog: &Catalog, name: &str, record_type: RecordType, id: u16) -> Message {
    let request = build_request(name, record_type, client_src(), id);
    let handler = TestResponseHandler::new();
    catalog.handle_request(&request, handler.clone()).await;
    handler.into_message()
}

/// Extract answer addresses from a response.
pub fn extract_ips(msg: &Message) -> Vec<IpAddr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(IpAddr::V4(Ipv4Addr::from(*a))),
            RData::AAAA(aaaa) => Some(IpAddr::V6(Ipv6Addr::from(*aaaa))),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Assert an authoritative answer carrying exactly `expected`.
pub fn assert_gateway_answer(msg: &Message, expected: IpAddr) {
    assert_response_code(msg, ResponseCode::NoError);
    assert!(msg.header().authoritative(), "answer is not authoritative");
    assert_eq!(extract_ips(msg), vec![expected]);
}

/// Assert a delegated query was refused by the zone's own chain.
pub fn assert_refused_by_zone(msg: &Message) {
    assert_response_code(msg, ResponseCode::Refused);
    assert!(msg.header().authoritative(), "refusal should carry the AA flag");
    assert!(msg.answers().is_empty(), "expected no answers, got {:?}", msg.answers());
}
