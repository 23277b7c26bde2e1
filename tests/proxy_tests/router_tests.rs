//! Proxy Router Tests
//!
//! Each test runs a scripted backend on a loopback listener.
//!
//! These tests verify:
//! - Backend responses are relayed byte for byte
//! - Successful quiet mutations are suppressed, failures are not
//! - Backend connections are pooled and reused
//! - Backend failures turn into INTERNAL_ERROR and poison the connection
//! - Opcodes the proxy answers itself

use std::io::Write;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::{BufMut, Bytes, BytesMut};
use memrelay::network::{Reply, RequestHandler};
use memrelay::protocol::{
    read_frame, read_packet, Header, Opcode, Packet, ResponseStatus, MAGIC_REQUEST,
};
use memrelay::{CommandDispatcher, Config, HashResolver, MemoryStore, ProxyRouter};
use parking_lot::Mutex;

// =============================================================================
// Scripted Backend
// =============================================================================

/// What the backend does with one request
enum Action {
    Reply(Vec<u8>),
    Ignore,
    Hangup,
}

struct FakeBackend {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Bytes>>>,
}

impl FakeBackend {
    fn spawn<F>(script: F) -> Self
    where
        F: Fn(&Packet) -> Action + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let script = Arc::new(script);

        let accepted_clone = Arc::clone(&accepted);
        let received_clone = Arc::clone(&received);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let mut stream = match stream {
                    Ok(stream) => stream,
                    Err(_) => break,
                };
                accepted_clone.fetch_add(1, Ordering::SeqCst);

                let script = Arc::clone(&script);
                let received = Arc::clone(&received_clone);
                thread::spawn(move || {
                    while let Ok(frame) = read_frame(&mut stream) {
                        received.lock().push(frame.clone());
                        let request = read_packet(&mut &frame[..]).unwrap();
                        match script(&request) {
                            Action::Reply(bytes) => {
                                if stream.write_all(&bytes).is_err() {
                                    break;
                                }
                            }
                            Action::Ignore => {}
                            Action::Hangup => break,
                        }
                    }
                });
            }
        });

        Self {
            addr,
            accepted,
            received,
        }
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    fn received(&self) -> Vec<Bytes> {
        self.received.lock().clone()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn router_to(addr: SocketAddr, backend_timeout_ms: u64) -> ProxyRouter<HashResolver> {
    let config = Config::builder()
        .backend_timeout_ms(backend_timeout_ms)
        .build();
    let resolver = HashResolver::new(vec![addr]).unwrap();
    ProxyRouter::from_config(resolver, &config).unwrap()
}

/// An address nothing listens on
fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

fn hit_response(request: &Packet, flags: u32, stored: &[u8]) -> Vec<u8> {
    let mut header = Header::response_to(&request.header);
    header.set_body_length(4, 0, stored.len());
    let mut body = BytesMut::new();
    body.put_u32(flags);
    body.put_slice(stored);
    Packet::new(header, body.freeze()).to_bytes().to_vec()
}

fn status_response(request: &Packet, status: ResponseStatus) -> Vec<u8> {
    Header::error_for(&request.header, status).to_bytes().to_vec()
}

fn status_of(reply: &Reply) -> u16 {
    let bytes = reply.bytes().expect("reply carries no bytes");
    read_packet(&mut &bytes[..]).unwrap().header.status
}

// =============================================================================
// Forwarding Tests
// =============================================================================

#[test]
fn test_get_relayed_verbatim() {
    let backend = FakeBackend::spawn(|request| Action::Reply(hit_response(request, 7, b"bar")));
    let router = router_to(backend.addr, 2000);

    let request = Packet::get_request(Opcode::Get, b"foo", 42).unwrap();
    let expected = hit_response(&request, 7, b"bar");
    let reply = router.route(request.clone());

    assert_eq!(reply, Reply::Send(Bytes::from(expected)));
    assert_eq!(backend.received(), vec![request.to_bytes()]);
}

#[test]
fn test_set_forwarded_with_full_body() {
    let backend = FakeBackend::spawn(|request| {
        Action::Reply(status_response(request, ResponseStatus::NoError))
    });
    let router = router_to(backend.addr, 2000);

    let request = Packet::set_request(Opcode::Set, b"k", b"some value", 3, 60, 9).unwrap();
    let reply = router.route(request.clone());

    assert_eq!(status_of(&reply), 0);
    assert_eq!(backend.received(), vec![request.to_bytes()]);
}

#[test]
fn test_getq_error_status_relayed() {
    let backend = FakeBackend::spawn(|request| {
        Action::Reply(status_response(request, ResponseStatus::KeyNotFound))
    });
    let router = router_to(backend.addr, 2000);

    let reply = router.route(Packet::get_request(Opcode::GetQ, b"missing", 1).unwrap());
    assert_eq!(status_of(&reply), ResponseStatus::KeyNotFound.code());
}

#[test]
fn test_setq_success_suppressed() {
    let backend = FakeBackend::spawn(|request| {
        Action::Reply(status_response(request, ResponseStatus::NoError))
    });
    let router = router_to(backend.addr, 2000);

    let reply = router.route(Packet::set_request(Opcode::SetQ, b"k", b"v", 0, 0, 1).unwrap());

    assert_eq!(reply, Reply::Silent);
    assert_eq!(backend.received().len(), 1);
    // The full response was consumed, so the connection stays usable
    assert_eq!(router.pool().idle_count(&backend.addr), 1);
}

#[test]
fn test_setq_failure_relayed() {
    let backend = FakeBackend::spawn(|request| {
        Action::Reply(status_response(request, ResponseStatus::ItemNotStored))
    });
    let router = router_to(backend.addr, 2000);

    let reply = router.route(Packet::set_request(Opcode::SetQ, b"k", b"v", 0, 0, 1).unwrap());
    assert_eq!(status_of(&reply), ResponseStatus::ItemNotStored.code());
}

#[test]
fn test_backend_connection_reused() {
    let backend = FakeBackend::spawn(|request| Action::Reply(hit_response(request, 0, b"v")));
    let router = router_to(backend.addr, 2000);

    for opaque in 0..5 {
        let reply = router.route(Packet::get_request(Opcode::Get, b"key", opaque).unwrap());
        assert_eq!(status_of(&reply), 0);
    }

    assert_eq!(backend.accepted(), 1);
    assert_eq!(router.pool().idle_count(&backend.addr), 1);
}

#[test]
fn test_routes_by_key() {
    let respond = |request: &Packet| Action::Reply(hit_response(request, 0, b"v"));
    let left = FakeBackend::spawn(respond);
    let right = FakeBackend::spawn(respond);
    let (left_addr, right_addr) = (left.addr, right.addr);

    let resolver = move |key: &[u8]| {
        if key.first() == Some(&b'a') {
            left_addr
        } else {
            right_addr
        }
    };
    let router = ProxyRouter::from_config(resolver, &Config::default()).unwrap();

    router.route(Packet::get_request(Opcode::Get, b"apple", 1).unwrap());
    router.route(Packet::get_request(Opcode::Get, b"avocado", 2).unwrap());
    router.route(Packet::get_request(Opcode::Get, b"banana", 3).unwrap());

    assert_eq!(left.received().len(), 2);
    assert_eq!(right.received().len(), 1);
}

#[test]
fn test_zero_length_key_forwarded() {
    let backend = FakeBackend::spawn(|request| Action::Reply(hit_response(request, 0, b"")));
    let router = router_to(backend.addr, 2000);

    let reply = router.route(Packet::get_request(Opcode::Get, b"", 1).unwrap());
    assert_eq!(status_of(&reply), 0);
    assert_eq!(backend.received().len(), 1);
}

// =============================================================================
// Backend Failure Tests
// =============================================================================

#[test]
fn test_backend_hangup_is_internal_error() {
    let backend = FakeBackend::spawn(|_| Action::Hangup);
    let router = router_to(backend.addr, 2000);

    let reply = router.route(Packet::get_request(Opcode::GetK, b"key", 77).unwrap());
    let response = read_packet(&mut &reply.bytes().unwrap()[..]).unwrap();

    assert!(response.header.is_response());
    assert_eq!(response.header.command(), Some(Opcode::GetK));
    assert_eq!(response.header.opaque, 77);
    assert_eq!(response.header.status, ResponseStatus::InternalError.code());
    assert_eq!(router.pool().idle_count(&backend.addr), 0);
}

#[test]
fn test_backend_unreachable_is_internal_error() {
    let router = router_to(dead_addr(), 2000);

    let reply = router.route(Packet::get_request(Opcode::Get, b"key", 1).unwrap());
    assert_eq!(status_of(&reply), ResponseStatus::InternalError.code());
}

#[test]
fn test_backend_timeout_is_internal_error() {
    let backend = FakeBackend::spawn(|_| Action::Ignore);
    let router = router_to(backend.addr, 100);

    let reply = router.route(Packet::get_request(Opcode::GetQ, b"never", 1).unwrap());

    assert_eq!(status_of(&reply), ResponseStatus::InternalError.code());
    assert_eq!(router.pool().idle_count(&backend.addr), 0);
}

#[test]
fn test_backend_request_magic_is_internal_error() {
    let backend = FakeBackend::spawn(|request| {
        let mut header = Header::response_to(&request.header);
        header.magic = MAGIC_REQUEST;
        Action::Reply(header.to_bytes().to_vec())
    });
    let router = router_to(backend.addr, 2000);

    let reply = router.route(Packet::get_request(Opcode::Get, b"key", 1).unwrap());
    assert_eq!(status_of(&reply), ResponseStatus::InternalError.code());
    assert_eq!(router.pool().idle_count(&backend.addr), 0);
}

#[test]
fn test_recovers_after_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = Arc::clone(&calls);
    let backend = FakeBackend::spawn(move |request| {
        if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
            Action::Hangup
        } else {
            Action::Reply(hit_response(request, 0, b"v"))
        }
    });
    let router = router_to(backend.addr, 2000);

    let first = router.route(Packet::get_request(Opcode::Get, b"key", 1).unwrap());
    assert_eq!(status_of(&first), ResponseStatus::InternalError.code());

    let second = router.route(Packet::get_request(Opcode::Get, b"key", 2).unwrap());
    assert_eq!(status_of(&second), 0);
    assert_eq!(backend.accepted(), 2);
}

// =============================================================================
// Local Opcode Tests
// =============================================================================

#[test]
fn test_noop_flushes() {
    let router = router_to(dead_addr(), 100);
    let reply = router.route(Packet::header_only(Header::request(Opcode::Noop)));
    assert_eq!(reply, Reply::Flush);
}

#[test]
fn test_quit_opcodes() {
    let router = router_to(dead_addr(), 100);

    let quitq = router.route(Packet::header_only(Header::request(Opcode::QuitQ)));
    assert_eq!(quitq, Reply::Close);

    let quit = router.route(Packet::header_only(Header::request(Opcode::Quit)));
    assert!(matches!(quit, Reply::SendAndClose(_)));
    assert_eq!(status_of(&quit), ResponseStatus::NotSupported.code());
}

#[test]
fn test_unsupported_opcodes_answered_locally() {
    let router = router_to(dead_addr(), 100);

    for opcode in [
        Opcode::Add,
        Opcode::AddQ,
        Opcode::Delete,
        Opcode::Flush,
        Opcode::FlushQ,
        Opcode::Stat,
        Opcode::Increment,
    ] {
        let mut header = Header::request(opcode);
        header.opaque = 3;
        let reply = router.handle(Packet::header_only(header)).unwrap();

        let response = read_packet(&mut &reply.bytes().unwrap()[..]).unwrap();
        assert_eq!(response.header.command(), Some(opcode));
        assert_eq!(response.header.status, ResponseStatus::NotSupported.code());
        assert_eq!(response.header.opaque, 3);
    }
}

#[test]
fn test_overrunning_key_length_not_forwarded() {
    let backend = FakeBackend::spawn(|request| Action::Reply(hit_response(request, 0, b"v")));
    let router = router_to(backend.addr, 2000);

    let mut header = Header::request(Opcode::Get);
    header.key_length = 10;
    header.total_body = 3;
    let reply = router.route(Packet::new(header, Bytes::from_static(b"foo")));

    assert_eq!(status_of(&reply), ResponseStatus::InvalidArguments.code());
    assert!(backend.received().is_empty());
}

#[test]
fn test_quiet_overrunning_key_length_answered_under_sync_opcode() {
    let backend = FakeBackend::spawn(|request| Action::Reply(hit_response(request, 0, b"v")));
    let router = router_to(backend.addr, 2000);

    let mut header = Header::request(Opcode::GetKQ);
    header.key_length = 10;
    header.total_body = 2;
    header.opaque = 17;
    let reply = router.route(Packet::new(header, Bytes::from_static(b"ab")));

    let response = read_packet(&mut &reply.bytes().unwrap()[..]).unwrap();
    assert_eq!(response.header.status, ResponseStatus::InvalidArguments.code());
    assert_eq!(response.header.command(), Some(Opcode::GetK));
    assert_eq!(response.header.opaque, 17);
    assert!(backend.received().is_empty());
}

#[test]
fn test_invalid_arguments_matches_server_mode() {
    let backend = FakeBackend::spawn(|request| Action::Reply(hit_response(request, 0, b"v")));
    let router = router_to(backend.addr, 2000);
    let dispatcher = CommandDispatcher::new(MemoryStore::new());

    let mut header = Header::request(Opcode::SetQ);
    header.extra_length = 8;
    header.key_length = 4;
    header.total_body = 9;
    let request = Packet::new(header, Bytes::from_static(&[0; 9]));

    let routed = router.route(request.clone());
    let dispatched = dispatcher.dispatch(request).unwrap();
    assert_eq!(routed, dispatched);
}
