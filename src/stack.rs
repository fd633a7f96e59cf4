//! The stack: identifier allocation, message builders, application
//! registry, incoming routing and the retransmission engine.
//!
//! Everything is single-threaded cooperative. The host calls in through
//! [`Stack::feed`], [`Stack::send_by_peer`] and the periodic
//! [`Stack::tick`]; the core never spawns threads, holds locks or blocks.

use crate::avp;
use crate::avp::flags::M;
use crate::avp::{Avp, Grouped, Integer32, OctetString, Unsigned32};
use crate::dictionary::Dictionary;
use crate::error::Result;
use crate::message::{flags, CommandCode, DiameterMessage};
use crate::peer::{Peer, PeerHandle, PeerManager, PeerRole, PeerState, Realm};
use crate::transport::PeerIo;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::sync::Arc;

pub const DIAMETER_SUCCESS: u32 = 2001;
pub const DIAMETER_APPLICATION_UNSUPPORTED: u32 = 3007;

const DEFAULT_RETRANSMIT_INTERVAL: u64 = 1;
const DEFAULT_RETRANSMIT_RETRIES: u8 = 3;

/// Wall clock consumed by the stack; seconds since the Unix epoch. The
/// host may inject its own source, tests use a mock.
pub trait TimeSource {
    fn now(&self) -> u64;
}

pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> u64 {
        chrono::Utc::now().timestamp() as u64
    }
}

/// Application capability set. Handlers receive the stack back so they can
/// build and send messages from within a callback.
pub trait ApplicationListener {
    fn on_request(&mut self, stack: &mut Stack, peer: PeerHandle, request: &DiameterMessage);

    fn on_answer(&mut self, stack: &mut Stack, peer: PeerHandle, answer: &DiameterMessage);

    fn on_redirect(&mut self, _stack: &mut Stack, _peer: PeerHandle, _request: &DiameterMessage) {}

    /// Called when a request exhausted its retries. Maps to `on_request`
    /// unless the application needs special treatment.
    fn on_retransmit(&mut self, stack: &mut Stack, peer: PeerHandle, request: &DiameterMessage) {
        self.on_request(stack, peer, request);
    }

    /// Called once per stack tick.
    fn on_tick(&mut self, _stack: &mut Stack) {}
}

/// Peer lifecycle observer.
pub trait PeerListener {
    /// A server-role peer completed capabilities exchange.
    fn added(&mut self, _peer: &Peer) {}

    /// A server-role peer was removed.
    fn removed(&mut self, _peer: &Peer) {}

    /// A client-role peer completed capabilities exchange.
    fn connected(&mut self, _peer: &Peer) {}

    /// A registered peer's connection went away.
    fn disconnected(&mut self, _peer: &Peer) {}
}

pub type AppHandler = Rc<RefCell<dyn ApplicationListener>>;

struct QueuedMessage {
    peer: PeerHandle,
    message: DiameterMessage,
    last_try: u64,
    retries: u8,
}

pub struct Stack {
    pub(crate) manager: PeerManager,
    pub(crate) auth_apps: BTreeMap<(u32, u32), AppHandler>,
    pub(crate) acct_apps: BTreeMap<(u32, u32), AppHandler>,
    pub(crate) peer_listeners: Vec<Rc<RefCell<dyn PeerListener>>>,
    dictionaries: HashMap<String, Arc<Dictionary>>,
    pub(crate) product_name: String,
    pub(crate) ip4_address: Ipv4Addr,
    pub(crate) vendor_id: u32,
    pub(crate) supported_vendors: Vec<u32>,
    pub(crate) firmware_revision: u32,
    pub(crate) watchdog_seconds: Option<u64>,
    pub(crate) identity: String,
    pub(crate) realm: String,
    pub(crate) time: Box<dyn TimeSource>,
    hbh: u32,
    ete: u32,
    retransmit_interval: u64,
    retransmit_retries: u8,
    queued: Vec<QueuedMessage>,
}

impl Stack {
    pub fn new(product_name: &str, ip4_address: Ipv4Addr) -> Stack {
        Stack::with_time_source(product_name, ip4_address, Box::new(SystemClock))
    }

    pub fn with_time_source(
        product_name: &str,
        ip4_address: Ipv4Addr,
        time: Box<dyn TimeSource>,
    ) -> Stack {
        // RFC 6733 wants the end-to-end counter seeded with the current
        // time in the high 12 bits
        let ete = ((time.now() as u32) & 0xFFF) << 20;
        Stack {
            manager: PeerManager::new(),
            auth_apps: BTreeMap::new(),
            acct_apps: BTreeMap::new(),
            peer_listeners: Vec::new(),
            dictionaries: HashMap::new(),
            product_name: product_name.to_string(),
            ip4_address,
            vendor_id: 0,
            supported_vendors: Vec::new(),
            firmware_revision: 1,
            watchdog_seconds: None,
            identity: String::new(),
            realm: String::new(),
            time,
            hbh: 0,
            ete,
            retransmit_interval: DEFAULT_RETRANSMIT_INTERVAL,
            retransmit_retries: DEFAULT_RETRANSMIT_RETRIES,
            queued: Vec::new(),
        }
    }

    pub fn set_identity(&mut self, identity: &str) {
        self.identity = identity.to_string();
    }

    pub fn set_realm(&mut self, realm: &str) {
        self.realm = realm.to_string();
    }

    pub fn set_vendor_id(&mut self, vendor_id: u32) {
        self.vendor_id = vendor_id;
    }

    pub fn set_firmware_revision(&mut self, firmware_revision: u32) {
        self.firmware_revision = firmware_revision;
    }

    pub fn set_watchdog_seconds(&mut self, seconds: u64) {
        self.watchdog_seconds = Some(seconds);
    }

    pub fn set_retransmit_params(&mut self, interval_seconds: u64, retries: u8) {
        self.retransmit_interval = interval_seconds;
        self.retransmit_retries = retries;
    }

    pub fn load_dictionary(&mut self, name: &str, xml: &str) -> Result<()> {
        let dictionary = Dictionary::new(&[xml])?;
        self.dictionaries.insert(name.to_string(), Arc::new(dictionary));
        Ok(())
    }

    pub fn dictionary(&self, name: &str) -> Option<Arc<Dictionary>> {
        self.dictionaries.get(name).cloned()
    }

    pub fn add_supported_vendor(&mut self, vendor_id: u32) {
        self.supported_vendors.push(vendor_id);
    }

    pub fn register_auth_application(
        &mut self,
        handler: AppHandler,
        vendor_id: u32,
        application_id: u32,
    ) {
        self.auth_apps.insert((vendor_id, application_id), handler);
    }

    pub fn register_acct_application(
        &mut self,
        handler: AppHandler,
        vendor_id: u32,
        application_id: u32,
    ) {
        self.acct_apps.insert((vendor_id, application_id), handler);
    }

    pub fn register_peer_listener(&mut self, listener: Rc<RefCell<dyn PeerListener>>) {
        self.peer_listeners.push(listener);
    }

    pub fn register_peer_io(&mut self, io: Box<dyn PeerIo>) {
        self.manager.register_peer_io(io);
    }

    pub fn client_v4_add(&mut self, host: Ipv4Addr, port: u16) -> PeerHandle {
        self.manager.client_v4_add(host, port)
    }

    pub fn server_v4_add(&mut self, host: Ipv4Addr, port: u16) -> PeerHandle {
        self.manager.server_v4_add(host, port)
    }

    pub fn server_v4_accept(
        &mut self,
        listener: PeerHandle,
        host: Ipv4Addr,
        port: u16,
    ) -> PeerHandle {
        self.manager.server_v4_accept(listener, host, port)
    }

    pub fn peer(&self, handle: PeerHandle) -> Option<&Peer> {
        self.manager.peer(handle)
    }

    pub fn realm(&self, name: &str) -> Option<&Realm> {
        self.manager.realm(name)
    }

    /// Next hop-by-hop identifier; strictly monotone, wraps at 2^32.
    pub fn next_hbh(&mut self) -> u32 {
        self.hbh = self.hbh.wrapping_add(1);
        self.hbh
    }

    /// Next end-to-end identifier; strictly monotone, wraps at 2^32.
    pub fn next_ete(&mut self) -> u32 {
        self.ete = self.ete.wrapping_add(1);
        self.ete
    }

    /// Builds a request with fresh identifiers and Origin-Host and
    /// Origin-Realm. With `vendor_id` set, the application id AVP is
    /// wrapped in a Vendor-Specific-Application-Id group together with a
    /// Vendor-Id; with neither `auth` nor `acct`, no application id AVP is
    /// added at all.
    pub fn create_request(
        &mut self,
        application_id: u32,
        command_code: u32,
        auth: bool,
        acct: bool,
        vendor_id: Option<u32>,
    ) -> DiameterMessage {
        log::debug!("creating request with command code {}", command_code);
        let hop_by_hop = self.next_hbh();
        let end_to_end = self.next_ete();
        let mut message = DiameterMessage::new(
            command_code,
            application_id,
            flags::REQUEST,
            hop_by_hop,
            end_to_end,
        );
        self.add_origin_host_realm(&mut message);

        let app_avp = if auth {
            Some(avp!(258, None, M, Integer32::new(application_id as i32)))
        } else if acct {
            Some(avp!(259, None, M, Integer32::new(application_id as i32)))
        } else {
            None
        };

        match vendor_id {
            Some(vendor) => {
                let mut container =
                    Grouped::new(vec![avp!(266, None, M, Integer32::new(vendor as i32))]);
                if let Some(app_avp) = app_avp {
                    container.add(app_avp);
                }
                message.add_avp(avp!(260, None, M, container));
            }
            None => {
                if let Some(app_avp) = app_avp {
                    message.add_avp(app_avp);
                }
            }
        }

        message
    }

    /// Builds the answer to `request`: same identifiers, command and
    /// application, proxiable flag copied, Result-Code first when given.
    pub fn create_answer(
        &mut self,
        request: &DiameterMessage,
        result_code: Option<u32>,
    ) -> DiameterMessage {
        let answer_flags = if request.is_proxiable() {
            flags::PROXYABLE
        } else {
            0
        };
        let mut message = DiameterMessage::new(
            request.code(),
            request.application_id(),
            answer_flags,
            request.hop_by_hop_id(),
            request.end_to_end_id(),
        );
        if let Some(code) = result_code {
            message.add_avp(avp!(268, None, M, Unsigned32::new(code)));
        }
        self.add_origin_host_realm(&mut message);
        message
    }

    fn add_origin_host_realm(&self, message: &mut DiameterMessage) {
        message.add_avp(avp!(
            264,
            None,
            M,
            OctetString::new(self.identity.clone().into_bytes())
        ));
        message.add_avp(avp!(
            296,
            None,
            M,
            OctetString::new(self.realm.clone().into_bytes())
        ));
    }

    /// Sends a message on a peer; requests are queued for retransmission
    /// when `retransmission` is set.
    pub fn send_by_peer(
        &mut self,
        peer: PeerHandle,
        message: DiameterMessage,
        retransmission: bool,
    ) {
        if message.is_request() && retransmission {
            self.queued.push(QueuedMessage {
                peer,
                message: message.clone(),
                last_try: self.time.now(),
                retries: 0,
            });
        }
        self.manager.send(peer, &message);
    }

    pub(crate) fn register_peer(
        &mut self,
        handle: PeerHandle,
        identity: String,
        realm: String,
        apps: std::collections::BTreeSet<(u32, u32)>,
    ) -> bool {
        let now = self.time.now();
        log::info!(
            "registering {} with identity {} for realm {} with apps {:?}",
            handle,
            identity,
            realm,
            apps
        );
        if !self.manager.register_peer(handle, identity, realm, apps, now) {
            log::error!("failed to register {}", handle);
            return false;
        }
        let listeners = self.peer_listeners.clone();
        if let Some(peer) = self.manager.peer(handle) {
            for listener in &listeners {
                if peer.role() == PeerRole::Client {
                    listener.borrow_mut().connected(peer);
                } else {
                    listener.borrow_mut().added(peer);
                }
            }
        }
        true
    }

    /// Unregisters a peer: realm indices are scrubbed, the realm object
    /// is retained.
    pub fn remove_peer(&mut self, handle: PeerHandle) {
        self.manager.remove_peer(handle);
        let listeners = self.peer_listeners.clone();
        if let Some(peer) = self.manager.peer(handle) {
            if peer.role() == PeerRole::Server {
                for listener in &listeners {
                    listener.borrow_mut().removed(peer);
                }
            }
        }
    }

    pub(crate) fn close_peer(&mut self, handle: PeerHandle, reason: &str) {
        let (state, registered) = match self.manager.peer(handle) {
            Some(peer) => (peer.state(), peer.identity().is_some()),
            None => return,
        };
        if state == PeerState::Closed {
            return;
        }
        log::info!("closing {}: {}", handle, reason);
        self.manager.close_io(handle);
        if let Some(peer) = self.manager.peer_mut(handle) {
            peer.state = PeerState::Closed;
        }
        if registered {
            self.remove_peer(handle);
            let listeners = self.peer_listeners.clone();
            if let Some(peer) = self.manager.peer(handle) {
                for listener in &listeners {
                    listener.borrow_mut().disconnected(peer);
                }
            }
        }
    }

    /// `(vendor_id, application_id)` of a message, per the dispatch rules:
    /// Vendor-Specific-Application-Id wins, then top-level application id
    /// AVPs, then the header.
    fn derive_application(message: &DiameterMessage) -> (u32, u32) {
        let mut vendor_id = 0;
        let app_avp: Option<Avp> = match message.first_avp(260, None) {
            Some(vsa) => match vsa.as_grouped() {
                Ok(group) => {
                    if let Some(v) = group.first_avp(266, None) {
                        vendor_id = v.as_integer32().unwrap_or(0) as u32;
                    }
                    group
                        .first_avp(258, None)
                        .or_else(|| group.first_avp(259, None))
                        .cloned()
                }
                Err(_) => None,
            },
            None => message
                .first_avp(258, None)
                .or_else(|| message.first_avp(259, None))
                .cloned(),
        };
        let application_id = match app_avp.and_then(|a| a.as_integer32().ok()) {
            Some(v) => v as u32,
            None => message.application_id(),
        };
        (vendor_id, application_id)
    }

    fn handler_for(&self, key: (u32, u32)) -> Option<AppHandler> {
        self.auth_apps
            .get(&key)
            .or_else(|| self.acct_apps.get(&key))
            .map(Rc::clone)
    }

    /// Routes one non-watchdog message from an open peer. Unknown
    /// applications are answered with Result-Code 3007 and the error flag
    /// when the message is a request, and dropped when it is an answer.
    pub(crate) fn handle_incoming(&mut self, peer: PeerHandle, message: DiameterMessage) {
        log::debug!("handling incoming message from {}", peer);

        let key = Stack::derive_application(&message);
        let handler = match self.handler_for(key) {
            Some(handler) => handler,
            None => {
                log::error!("{}: application ({}, {}) not found", peer, key.0, key.1);
                if message.is_request() {
                    let mut answer =
                        self.create_answer(&message, Some(DIAMETER_APPLICATION_UNSUPPORTED));
                    answer.set_error(true);
                    self.send_by_peer(peer, answer, false);
                }
                return;
            }
        };

        if message.is_request() {
            handler.borrow_mut().on_request(self, peer, &message);
        } else {
            let hop_by_hop = message.hop_by_hop_id();
            self.queued
                .retain(|q| q.message.hop_by_hop_id() != hop_by_hop);
            handler.borrow_mut().on_answer(self, peer, &message);
        }
    }

    /// Periodic driver: retransmissions first, then the watchdog, then one
    /// `on_tick` per distinct application handler.
    pub fn tick(&mut self) {
        let now = self.time.now();

        let mut keep = Vec::with_capacity(self.queued.len());
        let mut exhausted = Vec::new();
        for mut entry in std::mem::take(&mut self.queued) {
            match self.manager.peer(entry.peer) {
                Some(peer) if peer.state() != PeerState::Closed => {}
                _ => {
                    log::debug!("dropping queued message for vanished {}", entry.peer);
                    continue;
                }
            }
            if now.saturating_sub(entry.last_try) < self.retransmit_interval {
                keep.push(entry);
            } else if entry.retries < self.retransmit_retries {
                entry.retries += 1;
                entry.last_try = now;
                log::debug!(
                    "retransmitting to {}, attempt number {}",
                    entry.peer,
                    entry.retries
                );
                self.manager.send(entry.peer, &entry.message);
                keep.push(entry);
            } else {
                log::error!(
                    "failed to send message to {} after {} retries",
                    entry.peer,
                    entry.retries
                );
                exhausted.push(entry);
            }
        }
        self.queued = keep;
        for entry in exhausted {
            let key = Stack::derive_application(&entry.message);
            if let Some(handler) = self.handler_for(key) {
                handler
                    .borrow_mut()
                    .on_retransmit(self, entry.peer, &entry.message);
            }
        }

        if let Some(interval) = self.watchdog_seconds {
            self.drive_watchdog(now, interval);
        }

        let mut handlers: Vec<AppHandler> = Vec::new();
        for handler in self.auth_apps.values().chain(self.acct_apps.values()) {
            if !handlers.iter().any(|h| Rc::ptr_eq(h, handler)) {
                handlers.push(Rc::clone(handler));
            }
        }
        for handler in handlers {
            handler.borrow_mut().on_tick(self);
        }
    }

    fn drive_watchdog(&mut self, now: u64, interval: u64) {
        let open: Vec<PeerHandle> = self
            .manager
            .peers()
            .filter(|p| p.state() == PeerState::Open && p.identity().is_some())
            .map(|p| p.handle())
            .collect();
        for handle in open {
            let (elapsed, pending) = match self.manager.peer(handle) {
                Some(peer) => (now.saturating_sub(peer.last_watchdog), peer.watchdog_pending),
                None => continue,
            };
            if elapsed >= 2 * interval {
                log::error!("{} silent for {}s, giving up", handle, elapsed);
                self.close_peer(handle, "watchdog expired");
            } else if elapsed >= interval && !pending {
                log::debug!("sending DWR to {}", handle);
                let dwr =
                    self.create_request(0, CommandCode::DeviceWatchdog as u32, false, false, None);
                if let Some(peer) = self.manager.peer_mut(handle) {
                    peer.watchdog_pending = true;
                }
                self.send_by_peer(handle, dwr, false);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp;
    use std::cell::Cell;
    use std::io::Cursor;

    struct MockIo {
        writes: Rc<RefCell<Vec<(PeerHandle, Vec<u8>)>>>,
        closed: Rc<RefCell<Vec<PeerHandle>>>,
    }

    impl PeerIo for MockIo {
        fn connect_v4(&mut self, _peer: PeerHandle, _host: Ipv4Addr, _port: u16) {}
        fn listen_v4(&mut self, _peer: PeerHandle, _host: Ipv4Addr, _port: u16) {}
        fn close(&mut self, peer: PeerHandle) {
            self.closed.borrow_mut().push(peer);
        }
        fn write(&mut self, peer: PeerHandle, data: &[u8]) {
            self.writes.borrow_mut().push((peer, data.to_vec()));
        }
    }

    struct MockClock(Rc<Cell<u64>>);

    impl TimeSource for MockClock {
        fn now(&self) -> u64 {
            self.0.get()
        }
    }

    #[derive(Default)]
    struct TestApp {
        requests: Vec<u32>,
        answers: Vec<u32>,
        retransmits: Vec<u32>,
        ticks: u32,
    }

    impl ApplicationListener for TestApp {
        fn on_request(&mut self, stack: &mut Stack, peer: PeerHandle, request: &DiameterMessage) {
            self.requests.push(request.code());
            let answer = stack.create_answer(request, Some(DIAMETER_SUCCESS));
            stack.send_by_peer(peer, answer, false);
        }

        fn on_answer(&mut self, _stack: &mut Stack, _peer: PeerHandle, answer: &DiameterMessage) {
            self.answers.push(answer.hop_by_hop_id());
        }

        fn on_retransmit(
            &mut self,
            _stack: &mut Stack,
            _peer: PeerHandle,
            request: &DiameterMessage,
        ) {
            self.retransmits.push(request.hop_by_hop_id());
        }

        fn on_tick(&mut self, _stack: &mut Stack) {
            self.ticks += 1;
        }
    }

    #[derive(Default)]
    struct TestListener {
        connected: Vec<String>,
        added: Vec<String>,
        disconnected: Vec<String>,
    }

    impl PeerListener for TestListener {
        fn connected(&mut self, peer: &Peer) {
            self.connected.push(peer.identity().unwrap_or("").to_string());
        }

        fn added(&mut self, peer: &Peer) {
            self.added.push(peer.identity().unwrap_or("").to_string());
        }

        fn disconnected(&mut self, peer: &Peer) {
            self.disconnected
                .push(peer.identity().unwrap_or("").to_string());
        }
    }

    struct Harness {
        stack: Stack,
        writes: Rc<RefCell<Vec<(PeerHandle, Vec<u8>)>>>,
        closed: Rc<RefCell<Vec<PeerHandle>>>,
        app: Rc<RefCell<TestApp>>,
        listener: Rc<RefCell<TestListener>>,
    }

    fn harness(identity: &str, clock: Rc<Cell<u64>>) -> Harness {
        let writes = Rc::new(RefCell::new(Vec::new()));
        let closed = Rc::new(RefCell::new(Vec::new()));
        let mut stack = Stack::with_time_source(
            "diameter-stack test",
            Ipv4Addr::new(127, 0, 0, 1),
            Box::new(MockClock(clock)),
        );
        stack.set_identity(identity);
        stack.set_realm("example.com");
        stack.register_peer_io(Box::new(MockIo {
            writes: Rc::clone(&writes),
            closed: Rc::clone(&closed),
        }));
        let app = Rc::new(RefCell::new(TestApp::default()));
        stack.register_auth_application(app.clone(), 0, 4);
        let listener = Rc::new(RefCell::new(TestListener::default()));
        stack.register_peer_listener(listener.clone());
        Harness {
            stack,
            writes,
            closed,
            app,
            listener,
        }
    }

    fn decode(bytes: &[u8]) -> DiameterMessage {
        let mut cursor = Cursor::new(bytes);
        DiameterMessage::decode_from(&mut cursor).unwrap()
    }

    fn encode(message: &DiameterMessage) -> Vec<u8> {
        let mut bytes = Vec::new();
        message.encode_to(&mut bytes).unwrap();
        bytes
    }

    /// Runs the CER/CEA handshake between two harnesses over their mock
    /// adapters.
    fn connect(client: &mut Harness, server: &mut Harness) -> (PeerHandle, PeerHandle) {
        let cpeer = client.stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);
        assert_eq!(client.stack.feed(cpeer, &[]), 0);
        let cer = client.writes.borrow_mut().remove(0).1;

        let listener = server.stack.server_v4_add(Ipv4Addr::new(0, 0, 0, 0), 3868);
        let speer = server
            .stack
            .server_v4_accept(listener, Ipv4Addr::new(127, 0, 0, 1), 49152);
        assert_eq!(server.stack.feed(speer, &cer), cer.len() as isize);
        let cea = server.writes.borrow_mut().remove(0).1;
        assert_eq!(client.stack.feed(cpeer, &cea), cea.len() as isize);
        (cpeer, speer)
    }

    #[test]
    fn test_cer_contents() {
        let clock = Rc::new(Cell::new(1000));
        let mut client = harness("client.example.com", Rc::clone(&clock));
        client.stack.set_vendor_id(35838);
        client.stack.set_firmware_revision(2);
        client.stack.add_supported_vendor(10415);
        let vendor_app = Rc::new(RefCell::new(TestApp::default()));
        client
            .stack
            .register_auth_application(vendor_app, 10415, 16777251);

        let peer = client.stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);
        client.stack.feed(peer, &[]);
        assert_eq!(
            client.stack.peer(peer).unwrap().state(),
            PeerState::CerSent
        );

        let cer = decode(&client.writes.borrow()[0].1);
        assert!(cer.is_request());
        assert_eq!(cer.code(), 257);
        assert_eq!(cer.application_id(), 0);
        assert_eq!(
            cer.first_avp(264, None).unwrap().as_octet_string().unwrap(),
            b"client.example.com"
        );
        assert_eq!(
            cer.first_avp(296, None).unwrap().as_octet_string().unwrap(),
            b"example.com"
        );
        assert_eq!(
            cer.first_avp(266, None).unwrap().as_integer32().unwrap(),
            35838
        );
        assert_eq!(
            cer.first_avp(269, None).unwrap().as_octet_string().unwrap(),
            b"diameter-stack test"
        );
        assert_eq!(cer.first_avp(267, None).unwrap().as_integer32().unwrap(), 2);
        assert_eq!(
            cer.first_avp(257, None).unwrap().as_address_v4().unwrap(),
            Ipv4Addr::new(127, 0, 0, 1)
        );
        assert_eq!(
            cer.first_avp(265, None).unwrap().as_integer32().unwrap(),
            10415
        );
        // the IETF application rides at the top level, the vendor one
        // inside a Vendor-Specific-Application-Id group
        assert_eq!(cer.first_avp(258, None).unwrap().as_integer32().unwrap(), 4);
        assert_eq!(
            cer.first_avp_path(&[(260, None), (266, None)])
                .unwrap()
                .as_integer32()
                .unwrap(),
            10415
        );
        assert_eq!(
            cer.first_avp_path(&[(260, None), (258, None)])
                .unwrap()
                .as_integer32()
                .unwrap(),
            16777251
        );
    }

    #[test]
    fn test_handshake() {
        let clock = Rc::new(Cell::new(1000));
        let mut client = harness("client.example.com", Rc::clone(&clock));
        let mut server = harness("server.example.com", Rc::clone(&clock));

        let (cpeer, speer) = connect(&mut client, &mut server);

        let client_peer = client.stack.peer(cpeer).unwrap();
        assert_eq!(client_peer.state(), PeerState::Open);
        assert_eq!(client_peer.identity(), Some("server.example.com"));
        assert_eq!(client_peer.realm(), Some("example.com"));
        assert!(client_peer.applications().contains(&(0, 4)));

        let server_peer = server.stack.peer(speer).unwrap();
        assert_eq!(server_peer.state(), PeerState::Open);
        assert_eq!(server_peer.identity(), Some("client.example.com"));
        assert!(server_peer.applications().contains(&(0, 4)));

        assert_eq!(client.listener.borrow().connected, ["server.example.com"]);
        assert_eq!(server.listener.borrow().added, ["client.example.com"]);

        // realm indices point back at the peers
        assert_eq!(
            client
                .stack
                .realm("example.com")
                .unwrap()
                .peer_for_identity("server.example.com"),
            Some(cpeer)
        );
        assert_eq!(
            server
                .stack
                .realm("example.com")
                .unwrap()
                .peers_for_application(0, 4),
            [speer]
        );
    }

    #[test]
    fn test_cea_rejection_closes_peer() {
        let clock = Rc::new(Cell::new(1000));
        let mut client = harness("client.example.com", Rc::clone(&clock));
        let mut other = harness("server.example.com", Rc::clone(&clock));

        let cpeer = client.stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);
        client.stack.feed(cpeer, &[]);
        let cer = decode(&client.writes.borrow_mut().remove(0).1);

        let mut cea = other.stack.create_answer(&cer, Some(5012));
        cea.add_avp(avp!(258, None, M, Integer32::new(4)));
        let bytes = encode(&cea);
        assert_eq!(client.stack.feed(cpeer, &bytes), bytes.len() as isize);

        assert_eq!(client.stack.peer(cpeer).unwrap().state(), PeerState::Closed);
        assert_eq!(*client.closed.borrow(), [cpeer]);
        assert!(client.listener.borrow().connected.is_empty());
    }

    #[test]
    fn test_duplicate_identity_closes_newer_peer() {
        let clock = Rc::new(Cell::new(1000));
        let mut server = harness("server.example.com", Rc::clone(&clock));
        let mut first = harness("client.example.com", Rc::clone(&clock));
        let mut second = harness("client.example.com", Rc::clone(&clock));

        let (_, speer1) = connect(&mut first, &mut server);

        let cpeer2 = second.stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 2), 3868);
        second.stack.feed(cpeer2, &[]);
        let cer = second.writes.borrow_mut().remove(0).1;
        let listener = server.stack.server_v4_add(Ipv4Addr::new(0, 0, 0, 0), 3868);
        let speer2 = server
            .stack
            .server_v4_accept(listener, Ipv4Addr::new(127, 0, 0, 2), 49153);
        server.stack.feed(speer2, &cer);

        // the newer peer is closed, the original registration survives
        assert_eq!(server.stack.peer(speer2).unwrap().state(), PeerState::Closed);
        assert!(server.closed.borrow().contains(&speer2));
        assert_eq!(
            server
                .stack
                .realm("example.com")
                .unwrap()
                .peer_for_identity("client.example.com"),
            Some(speer1)
        );
    }

    #[test]
    fn test_watchdog_reply() {
        let clock = Rc::new(Cell::new(1000));
        let mut client = harness("client.example.com", Rc::clone(&clock));
        let mut server = harness("server.example.com", Rc::clone(&clock));
        let (_, speer) = connect(&mut client, &mut server);

        let dwr = client.stack.create_request(0, 280, false, false, None);
        let bytes = encode(&dwr);
        assert_eq!(server.stack.feed(speer, &bytes), bytes.len() as isize);

        let dwa = decode(&server.writes.borrow_mut().remove(0).1);
        assert_eq!(dwa.code(), 280);
        assert_eq!(dwa.application_id(), 0);
        assert!(!dwa.is_request());
        assert_eq!(dwa.hop_by_hop_id(), dwr.hop_by_hop_id());
        assert_eq!(dwa.end_to_end_id(), dwr.end_to_end_id());
        assert_eq!(
            dwa.first_avp(268, None).unwrap().as_unsigned32().unwrap(),
            DIAMETER_SUCCESS
        );
        assert!(dwa.first_avp(264, None).is_some());
        assert!(dwa.first_avp(296, None).is_some());

        // watchdog traffic never reaches the application
        assert!(server.app.borrow().requests.is_empty());
    }

    #[test]
    fn test_watchdog_emission_and_expiry() {
        let clock = Rc::new(Cell::new(1000));
        let mut client = harness("client.example.com", Rc::clone(&clock));
        let mut server = harness("server.example.com", Rc::clone(&clock));
        server.stack.set_watchdog_seconds(30);
        let (cpeer, speer) = connect(&mut client, &mut server);

        // no DWR before the interval elapses
        clock.set(1010);
        server.stack.tick();
        assert!(server.writes.borrow().is_empty());

        clock.set(1031);
        server.stack.tick();
        let dwr = decode(&server.writes.borrow_mut().remove(0).1);
        assert_eq!(dwr.code(), 280);
        assert!(dwr.is_request());

        // only one DWR outstanding
        server.stack.tick();
        assert!(server.writes.borrow().is_empty());

        // DWA refreshes the watchdog
        clock.set(1032);
        let bytes = encode(&dwr);
        assert_eq!(client.stack.feed(cpeer, &bytes), bytes.len() as isize);
        let dwa = client.writes.borrow_mut().remove(0).1;
        assert_eq!(server.stack.feed(speer, &dwa), dwa.len() as isize);

        clock.set(1050);
        server.stack.tick();
        assert!(server.writes.borrow().is_empty());
        assert_eq!(server.stack.peer(speer).unwrap().state(), PeerState::Open);

        // silence past twice the interval tears the peer down
        clock.set(1100);
        server.stack.tick();
        assert_eq!(server.stack.peer(speer).unwrap().state(), PeerState::Closed);
        assert!(server.closed.borrow().contains(&speer));
        assert_eq!(server.listener.borrow().disconnected, ["client.example.com"]);
        assert_eq!(
            server
                .stack
                .realm("example.com")
                .unwrap()
                .peer_for_identity("client.example.com"),
            None
        );
    }

    #[test]
    fn test_retransmit_timing() {
        let clock = Rc::new(Cell::new(0));
        let mut h = harness("client.example.com", Rc::clone(&clock));
        let peer = h.stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);

        let request = h.stack.create_request(4, 272, true, false, None);
        let hop_by_hop = request.hop_by_hop_id();
        h.stack.send_by_peer(peer, request, true);
        assert_eq!(h.writes.borrow().len(), 1);

        for t in 1..=3u64 {
            clock.set(t);
            h.stack.tick();
            assert_eq!(h.writes.borrow().len(), 1 + t as usize);
        }

        // fourth tick drops the record and surfaces the failure
        clock.set(4);
        h.stack.tick();
        assert_eq!(h.writes.borrow().len(), 4);
        assert_eq!(h.app.borrow().retransmits, [hop_by_hop]);

        clock.set(5);
        h.stack.tick();
        assert_eq!(h.writes.borrow().len(), 4);
        assert_eq!(h.app.borrow().ticks, 5);
    }

    #[test]
    fn test_answer_prunes_retransmit_queue() {
        let clock = Rc::new(Cell::new(0));
        let mut h = harness("client.example.com", Rc::clone(&clock));
        let peer = h.stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);

        let request = h.stack.create_request(4, 272, true, false, None);
        let hop_by_hop = request.hop_by_hop_id();
        let answer = h.stack.create_answer(&request, Some(DIAMETER_SUCCESS));
        h.stack.send_by_peer(peer, request, true);
        assert_eq!(h.writes.borrow().len(), 1);

        h.stack.handle_incoming(peer, answer);
        assert_eq!(h.app.borrow().answers, [hop_by_hop]);

        clock.set(10);
        h.stack.tick();
        assert_eq!(h.writes.borrow().len(), 1);
        assert!(h.app.borrow().retransmits.is_empty());
    }

    #[test]
    fn test_unsupported_application() {
        let clock = Rc::new(Cell::new(0));
        let mut h = harness("server.example.com", Rc::clone(&clock));
        let peer = h.stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);

        let mut request = DiameterMessage::new(300, 99, flags::REQUEST, 77, 88);
        request.add_avp(avp!(258, None, M, Integer32::new(99)));
        h.stack.handle_incoming(peer, request);

        let answer = decode(&h.writes.borrow_mut().remove(0).1);
        assert!(!answer.is_request());
        assert!(answer.is_error());
        assert_eq!(answer.code(), 300);
        assert_eq!(answer.hop_by_hop_id(), 77);
        assert_eq!(
            answer.first_avp(268, None).unwrap().as_unsigned32().unwrap(),
            DIAMETER_APPLICATION_UNSUPPORTED
        );

        // an unsupported answer is dropped silently
        let mut orphan = DiameterMessage::new(300, 99, 0, 78, 89);
        orphan.add_avp(avp!(258, None, M, Integer32::new(99)));
        h.stack.handle_incoming(peer, orphan);
        assert!(h.writes.borrow().is_empty());
    }

    #[test]
    fn test_vendor_specific_dispatch() {
        let clock = Rc::new(Cell::new(0));
        let mut h = harness("server.example.com", Rc::clone(&clock));
        let vendor_app = Rc::new(RefCell::new(TestApp::default()));
        h.stack
            .register_auth_application(vendor_app.clone(), 10415, 16777251);
        let peer = h.stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);

        let mut request = DiameterMessage::new(316, 16777251, flags::REQUEST, 5, 6);
        let group = Grouped::new(vec![
            avp!(266, None, M, Integer32::new(10415)),
            avp!(258, None, M, Integer32::new(16777251)),
        ]);
        request.add_avp(avp!(260, None, M, group));
        h.stack.handle_incoming(peer, request);

        assert_eq!(vendor_app.borrow().requests, [316]);
        assert!(h.app.borrow().requests.is_empty());
    }

    #[test]
    fn test_framing_partitions() {
        let clock = Rc::new(Cell::new(1000));
        let mut client = harness("client.example.com", Rc::clone(&clock));
        let mut server = harness("server.example.com", Rc::clone(&clock));
        let (cpeer, speer) = connect(&mut client, &mut server);

        let mut wire = Vec::new();
        for _ in 0..3 {
            let request = client.stack.create_request(4, 272, true, false, None);
            wire.extend_from_slice(&encode(&request));
        }

        // drip-feed in 7-byte chunks, the host keeps the unconsumed tail
        let mut pending: Vec<u8> = Vec::new();
        let mut total = 0isize;
        for chunk in wire.chunks(7) {
            pending.extend_from_slice(chunk);
            let consumed = server.stack.feed(speer, &pending);
            assert!(consumed >= 0);
            total += consumed;
            pending.drain(..consumed as usize);
        }
        assert!(pending.is_empty());
        assert_eq!(total, wire.len() as isize);
        assert_eq!(server.app.borrow().requests, [272, 272, 272]);

        // the three answers come back in one buffer
        let mut answers = Vec::new();
        for (_, bytes) in server.writes.borrow_mut().drain(..) {
            answers.extend_from_slice(&bytes);
        }
        assert_eq!(
            client.stack.feed(cpeer, &answers),
            answers.len() as isize
        );
        assert_eq!(client.app.borrow().answers.len(), 3);
    }

    #[test]
    fn test_feed_rejects_bad_version() {
        let clock = Rc::new(Cell::new(1000));
        let mut client = harness("client.example.com", Rc::clone(&clock));
        let mut server = harness("server.example.com", Rc::clone(&clock));
        let (cpeer, _) = connect(&mut client, &mut server);

        let mut bad = vec![0u8; 20];
        bad[0] = 2;
        bad[3] = 20;
        assert_eq!(client.stack.feed(cpeer, &bad), -1);
        assert_eq!(client.stack.peer(cpeer).unwrap().state(), PeerState::Closed);
    }

    #[test]
    fn test_malformed_avp_in_base_command_disconnects() {
        let clock = Rc::new(Cell::new(1000));
        let mut client = harness("client.example.com", Rc::clone(&clock));
        let cpeer = client.stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);
        client.stack.feed(cpeer, &[]);
        let mut cer = client.writes.borrow_mut().remove(0).1;
        // reserved bit in the first AVP's flags octet
        cer[24] |= 0x01;

        let mut server = harness("server.example.com", Rc::clone(&clock));
        let listener = server.stack.server_v4_add(Ipv4Addr::new(0, 0, 0, 0), 3868);
        let speer = server
            .stack
            .server_v4_accept(listener, Ipv4Addr::new(127, 0, 0, 1), 49154);
        assert_eq!(server.stack.feed(speer, &cer), -1);
        assert_eq!(server.stack.peer(speer).unwrap().state(), PeerState::Closed);
    }

    #[test]
    fn test_feed_error_tears_down() {
        let clock = Rc::new(Cell::new(1000));
        let mut client = harness("client.example.com", Rc::clone(&clock));
        let mut server = harness("server.example.com", Rc::clone(&clock));
        let (cpeer, _) = connect(&mut client, &mut server);

        client.stack.feed_error(cpeer);
        assert_eq!(client.stack.peer(cpeer).unwrap().state(), PeerState::Closed);
        assert_eq!(*client.closed.borrow(), [cpeer]);
        assert_eq!(client.listener.borrow().disconnected, ["server.example.com"]);
    }

    #[test]
    fn test_identifier_allocation() {
        let clock = Rc::new(Cell::new(0x5A5));
        let mut h = harness("client.example.com", Rc::clone(&clock));

        let first = h.stack.next_hbh();
        assert_eq!(h.stack.next_hbh(), first + 1);
        assert_eq!(h.stack.next_hbh(), first + 2);

        let ete = h.stack.next_ete();
        // seeded with the clock in the high 12 bits
        assert_eq!(ete >> 20, 0x5A5);
        assert_eq!(h.stack.next_ete(), ete + 1);
    }

    #[test]
    fn test_create_request_application_avps() {
        let clock = Rc::new(Cell::new(0));
        let mut h = harness("client.example.com", Rc::clone(&clock));

        let auth = h.stack.create_request(4, 272, true, false, None);
        assert_eq!(auth.first_avp(258, None).unwrap().as_integer32().unwrap(), 4);
        assert!(auth.first_avp(259, None).is_none());

        let acct = h.stack.create_request(3, 271, false, true, None);
        assert_eq!(acct.first_avp(259, None).unwrap().as_integer32().unwrap(), 3);
        assert!(acct.first_avp(258, None).is_none());

        let bare = h.stack.create_request(0, 257, false, false, None);
        assert!(bare.first_avp(258, None).is_none());
        assert!(bare.first_avp(259, None).is_none());
        assert!(bare.first_avp(260, None).is_none());

        let vendored = h.stack.create_request(16777251, 316, true, false, Some(10415));
        assert_eq!(
            vendored
                .first_avp_path(&[(260, None), (266, None)])
                .unwrap()
                .as_integer32()
                .unwrap(),
            10415
        );
        assert_eq!(
            vendored
                .first_avp_path(&[(260, None), (258, None)])
                .unwrap()
                .as_integer32()
                .unwrap(),
            16777251
        );

        // vendor without an application id still carries the container
        let vendor_only = h.stack.create_request(16777251, 316, false, false, Some(10415));
        assert!(vendor_only
            .first_avp_path(&[(260, None), (258, None)])
            .is_none());
        assert_eq!(
            vendor_only
                .first_avp_path(&[(260, None), (266, None)])
                .unwrap()
                .as_integer32()
                .unwrap(),
            10415
        );
    }

    #[test]
    fn test_create_answer_copies_request() {
        let clock = Rc::new(Cell::new(0));
        let mut h = harness("server.example.com", Rc::clone(&clock));

        let mut request = DiameterMessage::new(272, 4, flags::REQUEST | flags::PROXYABLE, 42, 43);
        request.add_avp(avp!(258, None, M, Integer32::new(4)));

        let answer = h.stack.create_answer(&request, Some(DIAMETER_SUCCESS));
        assert!(!answer.is_request());
        assert!(answer.is_proxiable());
        assert_eq!(answer.code(), 272);
        assert_eq!(answer.application_id(), 4);
        assert_eq!(answer.hop_by_hop_id(), 42);
        assert_eq!(answer.end_to_end_id(), 43);

        // Result-Code first, then Origin-Host and Origin-Realm
        let codes: Vec<u32> = answer.avps().iter().map(|a| a.code()).collect();
        assert_eq!(codes, [268, 264, 296]);
    }

    #[test]
    fn test_tick_deduplicates_handlers() {
        let clock = Rc::new(Cell::new(0));
        let mut h = harness("server.example.com", Rc::clone(&clock));
        // same handler serving an auth and an acct application
        h.stack.register_acct_application(h.app.clone(), 0, 3);

        h.stack.tick();
        assert_eq!(h.app.borrow().ticks, 1);
    }
}
