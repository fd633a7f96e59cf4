//! Peers, realms and the per-connection state machine.
//!
//! A [`Peer`] is owned by the [`PeerManager`] and addressed through a
//! stable [`PeerHandle`]; realm indices and the retransmit queue only ever
//! hold handles. Bytes enter through [`Stack::feed`], get framed into
//! messages and run through the state machine of the peer they arrived on.

use crate::avp;
use crate::avp::flags::M;
use crate::avp::{Address, Grouped, Integer32, OctetString};
use crate::error::Error;
use crate::message::{CommandCode, DiameterMessage, HEADER_LENGTH};
use crate::stack::{Stack, DIAMETER_SUCCESS};
use crate::transport;
use crate::transport::PeerIo;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::io::Cursor;
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerHandle(pub(crate) u32);

impl fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Opens the connection and sends the CER.
    Client,
    /// Waits for a CER on an accepted connection.
    Server,
    /// Accepts connections only; traffic never flows on a listener.
    Listen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    WaitConn,
    CerSent,
    WaitCer,
    Listen,
    Open,
    Closed,
}

#[derive(Debug)]
pub struct Peer {
    pub(crate) handle: PeerHandle,
    pub(crate) role: PeerRole,
    pub(crate) state: PeerState,
    pub(crate) identity: Option<String>,
    pub(crate) realm: Option<String>,
    pub(crate) applications: BTreeSet<(u32, u32)>,
    pub(crate) ipv4: Ipv4Addr,
    pub(crate) port: u16,
    pub(crate) last_watchdog: u64,
    pub(crate) watchdog_pending: bool,
}

impl Peer {
    fn new(handle: PeerHandle, role: PeerRole, state: PeerState, ipv4: Ipv4Addr, port: u16) -> Peer {
        Peer {
            handle,
            role,
            state,
            identity: None,
            realm: None,
            applications: BTreeSet::new(),
            ipv4,
            port,
            last_watchdog: 0,
            watchdog_pending: false,
        }
    }

    pub fn handle(&self) -> PeerHandle {
        self.handle
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Diameter identity, known once capabilities exchange succeeded.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    pub fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    /// `(vendor_id, application_id)` pairs advertised and accepted.
    pub fn applications(&self) -> &BTreeSet<(u32, u32)> {
        &self.applications
    }

    pub fn ipv4(&self) -> Ipv4Addr {
        self.ipv4
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} identity={} realm={} ipv4={}:{}",
            self.handle,
            self.identity.as_deref().unwrap_or("?"),
            self.realm.as_deref().unwrap_or("?"),
            self.ipv4,
            self.port
        )
    }
}

/// Administrative domain: identities are unique within a realm, and each
/// advertised application maps to the peers serving it. Realms are never
/// destroyed; removing the last peer leaves an empty realm behind.
#[derive(Debug)]
pub struct Realm {
    name: String,
    identities: HashMap<String, PeerHandle>,
    applications: HashMap<(u32, u32), Vec<PeerHandle>>,
}

impl Realm {
    fn new(name: String) -> Realm {
        Realm {
            name,
            identities: HashMap::new(),
            applications: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn peer_for_identity(&self, identity: &str) -> Option<PeerHandle> {
        self.identities.get(identity).copied()
    }

    pub fn peers_for_application(&self, vendor_id: u32, application_id: u32) -> &[PeerHandle] {
        self.applications
            .get(&(vendor_id, application_id))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    fn add_peer(&mut self, handle: PeerHandle, identity: &str, apps: &BTreeSet<(u32, u32)>) -> bool {
        if let Some(existing) = self.identities.get(identity) {
            log::error!(
                "{} in realm {}, held by {}, rejecting {}",
                Error::DuplicateIdentity(identity.to_string()),
                self.name,
                existing,
                handle
            );
            return false;
        }
        self.identities.insert(identity.to_string(), handle);
        for app in apps {
            self.applications.entry(*app).or_insert_with(Vec::new).push(handle);
        }
        log::debug!("added identity {} to realm {} as {}", identity, self.name, handle);
        true
    }

    fn remove_peer(&mut self, peer: &Peer) {
        if let Some(identity) = &peer.identity {
            self.identities.remove(identity);
        }
        for peers in self.applications.values_mut() {
            peers.retain(|h| *h != peer.handle);
        }
        log::debug!("removed {} from realm {}", peer.handle, self.name);
    }
}

/// Owns every peer and realm; all outbound bytes leave through the
/// registered I/O adapter.
pub struct PeerManager {
    peers: HashMap<PeerHandle, Peer>,
    realms: HashMap<String, Realm>,
    next_handle: u32,
    io: Box<dyn PeerIo>,
}

impl PeerManager {
    pub(crate) fn new() -> PeerManager {
        PeerManager {
            peers: HashMap::new(),
            realms: HashMap::new(),
            next_handle: 0,
            io: Box::new(transport::NullPeerIo),
        }
    }

    pub fn register_peer_io(&mut self, io: Box<dyn PeerIo>) {
        self.io = io;
    }

    fn new_peer(&mut self, role: PeerRole, state: PeerState, host: Ipv4Addr, port: u16) -> PeerHandle {
        self.next_handle += 1;
        let handle = PeerHandle(self.next_handle);
        self.peers.insert(handle, Peer::new(handle, role, state, host, port));
        handle
    }

    pub fn client_v4_add(&mut self, host: Ipv4Addr, port: u16) -> PeerHandle {
        let handle = self.new_peer(PeerRole::Client, PeerState::WaitConn, host, port);
        self.io.connect_v4(handle, host, port);
        handle
    }

    pub fn server_v4_add(&mut self, host: Ipv4Addr, port: u16) -> PeerHandle {
        let handle = self.new_peer(PeerRole::Listen, PeerState::Listen, host, port);
        self.io.listen_v4(handle, host, port);
        handle
    }

    /// Spawns a peer for a connection accepted on `listener`.
    pub fn server_v4_accept(
        &mut self,
        listener: PeerHandle,
        host: Ipv4Addr,
        port: u16,
    ) -> PeerHandle {
        log::debug!("accepting connection {}:{} from {}", host, port, listener);
        self.new_peer(PeerRole::Server, PeerState::WaitCer, host, port)
    }

    pub fn peer(&self, handle: PeerHandle) -> Option<&Peer> {
        self.peers.get(&handle)
    }

    pub(crate) fn peer_mut(&mut self, handle: PeerHandle) -> Option<&mut Peer> {
        self.peers.get_mut(&handle)
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn realm(&self, name: &str) -> Option<&Realm> {
        self.realms.get(name)
    }

    /// Encodes and hands the message to the I/O adapter.
    pub fn send(&mut self, handle: PeerHandle, message: &DiameterMessage) {
        let mut wire = Vec::new();
        if let Err(e) = message.encode_to(&mut wire) {
            log::error!("failed to encode message for {}: {}", handle, e);
            return;
        }
        self.io.write(handle, &wire);
    }

    /// Binds identity, realm and applications to the peer. Fails when the
    /// identity is already taken within the realm; the existing entry is
    /// preserved.
    pub fn register_peer(
        &mut self,
        handle: PeerHandle,
        identity: String,
        realm: String,
        apps: BTreeSet<(u32, u32)>,
        now: u64,
    ) -> bool {
        if !self.peers.contains_key(&handle) {
            return false;
        }
        let entry = self
            .realms
            .entry(realm.clone())
            .or_insert_with(|| Realm::new(realm.clone()));
        if !entry.add_peer(handle, &identity, &apps) {
            return false;
        }
        if let Some(peer) = self.peers.get_mut(&handle) {
            peer.identity = Some(identity);
            peer.realm = Some(realm);
            peer.applications = apps;
            peer.last_watchdog = now;
        }
        true
    }

    /// Scrubs the peer from its realm's indices; the realm itself stays.
    pub fn remove_peer(&mut self, handle: PeerHandle) {
        let peer = match self.peers.get(&handle) {
            Some(p) => p,
            None => return,
        };
        let realm_name = match &peer.realm {
            Some(r) => r.clone(),
            None => return,
        };
        if let Some(realm) = self.realms.get_mut(&realm_name) {
            realm.remove_peer(peer);
        }
    }

    pub(crate) fn close_io(&mut self, handle: PeerHandle) {
        self.io.close(handle);
    }
}

pub(crate) enum PeerEvent {
    /// Transport-level notification without payload: connection
    /// established or upstream flush.
    Flush,
    Message(DiameterMessage),
}

fn is_base_command(message: &DiameterMessage) -> bool {
    message.application_id() == 0
        && matches!(
            message.code(),
            c if c == CommandCode::CapabilitiesExchange as u32
                || c == CommandCode::DeviceWatchdog as u32
                || c == CommandCode::DisconnectPeer as u32
        )
}

fn add_application_avp(
    message: &mut DiameterMessage,
    code: u32,
    vendor_id: u32,
    application_id: u32,
) {
    let app = avp!(code, None, M, Integer32::new(application_id as i32));
    if vendor_id != 0 {
        let group = Grouped::new(vec![
            avp!(266, None, M, Integer32::new(vendor_id as i32)),
            app,
        ]);
        message.add_avp(avp!(260, None, M, group));
    } else {
        message.add_avp(app);
    }
}

fn utf8_avp(message: &DiameterMessage, code: u32) -> Option<String> {
    message
        .first_avp(code, None)
        .and_then(|a| a.as_octet_string().ok())
        .and_then(|b| String::from_utf8(b.to_vec()).ok())
}

impl Stack {
    /// Feeds received bytes to a peer. Consumes as many whole messages as
    /// the buffer holds and returns the number of bytes taken; the caller
    /// keeps the tail and re-feeds it once more bytes arrive. An empty
    /// buffer is the flush/connected signal. A negative return means the
    /// stream is beyond recovery and the transport must be torn down.
    pub fn feed(&mut self, peer: PeerHandle, buf: &[u8]) -> isize {
        let role = match self.manager.peer(peer) {
            Some(p) => p.role,
            None => {
                log::error!("feed on unknown {}", peer);
                return -1;
            }
        };
        if role == PeerRole::Listen {
            log::error!("feed on listening {}", peer);
            return -1;
        }

        if buf.is_empty() {
            self.fsm(peer, PeerEvent::Flush);
            return 0;
        }

        let mut consumed = 0usize;
        while buf.len() - consumed >= HEADER_LENGTH as usize {
            let rest = &buf[consumed..];
            let version = rest[0];
            if version != 1 {
                log::error!("{}: unsupported protocol version {}", peer, version);
                self.close_peer(peer, "bad protocol version");
                return -1;
            }
            let length = u32::from_be_bytes([0, rest[1], rest[2], rest[3]]) as usize;
            if length < HEADER_LENGTH as usize {
                log::error!("{}: message length {} below header size", peer, length);
                self.close_peer(peer, "bad message length");
                return -1;
            }
            if length > rest.len() {
                // partial message, wait for more bytes
                break;
            }

            let mut cursor = Cursor::new(&rest[..length]);
            let message = match DiameterMessage::decode_from(&mut cursor) {
                Ok(m) => m,
                Err(e) => {
                    log::error!("{}: {}", peer, e);
                    self.close_peer(peer, "unparseable message");
                    return -1;
                }
            };
            if message.has_malformed_avps() && is_base_command(&message) {
                log::error!(
                    "{}: malformed AVPs {:?} in base command {}",
                    peer,
                    message.malformed_avps(),
                    message.code()
                );
                self.close_peer(peer, "malformed AVP in base command");
                return -1;
            }

            consumed += length;
            self.fsm(peer, PeerEvent::Message(message));

            match self.manager.peer(peer) {
                Some(p) if p.state != PeerState::Closed => {}
                _ => break,
            }
        }
        consumed as isize
    }

    /// Host-reported transport failure; tears the peer down.
    pub fn feed_error(&mut self, peer: PeerHandle) {
        self.close_peer(peer, "transport error");
    }

    pub(crate) fn fsm(&mut self, peer: PeerHandle, event: PeerEvent) {
        let state = match self.manager.peer(peer) {
            Some(p) => p.state,
            None => return,
        };
        match (state, event) {
            (PeerState::WaitConn, PeerEvent::Flush) => self.send_cer(peer),
            (PeerState::CerSent, PeerEvent::Message(message)) => self.receive_cea(peer, message),
            (PeerState::WaitCer, PeerEvent::Message(message)) => self.receive_cer(peer, message),
            (PeerState::Open, PeerEvent::Message(message)) => self.open_message(peer, message),
            (_, PeerEvent::Flush) => {}
            (state, PeerEvent::Message(message)) => {
                log::warn!(
                    "{}: dropping message {} in state {:?}",
                    peer,
                    message.header(),
                    state
                );
            }
        }
    }

    fn send_cer(&mut self, peer: PeerHandle) {
        let mut message =
            self.create_request(0, CommandCode::CapabilitiesExchange as u32, false, false, None);
        message.add_avp(avp!(266, None, M, Integer32::new(self.vendor_id as i32)));
        message.add_avp(avp!(
            269,
            None,
            M,
            OctetString::new(self.product_name.clone().into_bytes())
        ));
        message.add_avp(avp!(267, None, M, Integer32::new(self.firmware_revision as i32)));
        message.add_avp(avp!(257, None, M, Address::from_ipv4(self.ip4_address)));

        for vendor in &self.supported_vendors {
            message.add_avp(avp!(265, None, M, Integer32::new(*vendor as i32)));
        }

        let auth_keys: Vec<(u32, u32)> = self.auth_apps.keys().copied().collect();
        let acct_keys: Vec<(u32, u32)> = self.acct_apps.keys().copied().collect();
        for (vendor_id, application_id) in auth_keys {
            log::debug!("CER Auth-Application-Id {}", application_id);
            add_application_avp(&mut message, 258, vendor_id, application_id);
        }
        for (vendor_id, application_id) in acct_keys {
            log::debug!("CER Acct-Application-Id {}", application_id);
            add_application_avp(&mut message, 259, vendor_id, application_id);
        }

        log::debug!("sending CER on {}", peer);
        self.send_by_peer(peer, message, false);
        if let Some(p) = self.manager.peer_mut(peer) {
            p.state = PeerState::CerSent;
        }
    }

    fn receive_cea(&mut self, peer: PeerHandle, message: DiameterMessage) {
        log::info!("received CEA from {}", peer);

        let result = message
            .first_avp(268, None)
            .and_then(|a| a.as_unsigned32().ok());
        match result {
            Some(DIAMETER_SUCCESS) => {}
            Some(code) => {
                log::error!(
                    "{}",
                    Error::CapabilitiesFailure(format!(
                        "CEA from {} has result code {}",
                        peer, code
                    ))
                );
                self.close_peer(peer, "capabilities exchange rejected");
                return;
            }
            None => {
                log::error!(
                    "{}",
                    Error::CapabilitiesFailure(format!("CEA from {} has no result code", peer))
                );
                self.close_peer(peer, "capabilities exchange incomplete");
                return;
            }
        }

        let identity = match utf8_avp(&message, 264) {
            Some(identity) => identity,
            None => {
                log::error!(
                    "{}",
                    Error::CapabilitiesFailure(format!(
                        "CEA from {} has no usable Origin-Host AVP",
                        peer
                    ))
                );
                self.close_peer(peer, "capabilities exchange incomplete");
                return;
            }
        };
        let realm = match utf8_avp(&message, 296) {
            Some(realm) => realm,
            None => {
                log::error!(
                    "{}",
                    Error::CapabilitiesFailure(format!(
                        "CEA from {} has no usable Origin-Realm AVP",
                        peer
                    ))
                );
                self.close_peer(peer, "capabilities exchange incomplete");
                return;
            }
        };

        let advertised = advertised_applications(&message);
        let registered: BTreeSet<(u32, u32)> = self
            .auth_apps
            .keys()
            .chain(self.acct_apps.keys())
            .copied()
            .collect();
        let apps: BTreeSet<(u32, u32)> =
            advertised.intersection(&registered).copied().collect();
        if apps.is_empty() {
            log::error!("no mutually supported applications with {}", peer);
        }
        log::debug!(
            "CEA from {}: identity {}, realm {}, applications {:?}",
            peer,
            identity,
            realm,
            apps
        );

        if let Some(p) = self.manager.peer_mut(peer) {
            p.state = PeerState::Open;
        }
        if !self.register_peer(peer, identity, realm, apps) {
            self.close_peer(peer, "registration failed");
        }
    }

    fn receive_cer(&mut self, peer: PeerHandle, message: DiameterMessage) {
        log::info!("received CER from {}", peer);

        let identity = match utf8_avp(&message, 264) {
            Some(identity) => identity,
            None => {
                log::error!(
                    "{}",
                    Error::CapabilitiesFailure(format!(
                        "CER from {} has no usable Origin-Host AVP",
                        peer
                    ))
                );
                self.close_peer(peer, "capabilities exchange incomplete");
                return;
            }
        };
        let realm = match utf8_avp(&message, 296) {
            Some(realm) => realm,
            None => {
                log::error!(
                    "{}",
                    Error::CapabilitiesFailure(format!(
                        "CER from {} has no usable Origin-Realm AVP",
                        peer
                    ))
                );
                self.close_peer(peer, "capabilities exchange incomplete");
                return;
            }
        };

        let mut reply = self.create_answer(&message, Some(DIAMETER_SUCCESS));
        let mut apps: BTreeSet<(u32, u32)> = BTreeSet::new();
        for a in message.find_avps(258, None) {
            if let Ok(v) = a.as_integer32() {
                let key = (0, v as u32);
                if self.auth_apps.contains_key(&key) {
                    log::debug!("echoing Auth-Application-Id {} in CEA", v);
                    reply.add_avp(a.clone());
                    apps.insert(key);
                }
            }
        }
        for a in message.find_avps(259, None) {
            if let Ok(v) = a.as_integer32() {
                let key = (0, v as u32);
                if self.acct_apps.contains_key(&key) {
                    log::debug!("echoing Acct-Application-Id {} in CEA", v);
                    reply.add_avp(a.clone());
                    apps.insert(key);
                }
            }
        }
        self.send_by_peer(peer, reply, false);

        if let Some(p) = self.manager.peer_mut(peer) {
            p.state = PeerState::Open;
        }
        if !self.register_peer(peer, identity, realm, apps) {
            self.close_peer(peer, "registration failed");
        }
    }

    /// Watchdog and disconnect traffic is consumed here; everything else
    /// goes up to the router.
    fn open_message(&mut self, peer: PeerHandle, message: DiameterMessage) {
        if message.application_id() == 0 && message.code() == CommandCode::DeviceWatchdog as u32 {
            if message.is_request() {
                log::debug!("received DWR from {}, replying", peer);
                let answer = self.create_answer(&message, Some(DIAMETER_SUCCESS));
                self.send_by_peer(peer, answer, false);
            } else {
                log::debug!("received DWA from {}", peer);
                let now = self.time.now();
                if let Some(p) = self.manager.peer_mut(peer) {
                    p.last_watchdog = now;
                    p.watchdog_pending = false;
                }
            }
            return;
        }

        if message.application_id() == 0 && message.code() == CommandCode::DisconnectPeer as u32 {
            if message.is_request() {
                log::info!("received DPR from {}", peer);
                let answer = self.create_answer(&message, Some(DIAMETER_SUCCESS));
                self.send_by_peer(peer, answer, false);
                self.close_peer(peer, "disconnect requested by peer");
            }
            return;
        }

        self.handle_incoming(peer, message);
    }
}

fn advertised_applications(message: &DiameterMessage) -> BTreeSet<(u32, u32)> {
    let mut apps = BTreeSet::new();
    for a in message.find_avps(258, None) {
        if let Ok(v) = a.as_integer32() {
            log::debug!("advertised Auth-Application-Id {}", v);
            apps.insert((0, v as u32));
        }
    }
    for a in message.find_avps(259, None) {
        if let Ok(v) = a.as_integer32() {
            apps.insert((0, v as u32));
        }
    }
    for vsa in message.find_avps(260, None) {
        if let Ok(group) = vsa.as_grouped() {
            let vendor_id = group
                .first_avp(266, None)
                .and_then(|a| a.as_integer32().ok())
                .unwrap_or(0) as u32;
            for code in [258, 259] {
                if let Some(a) = group.first_avp(code, None) {
                    if let Ok(v) = a.as_integer32() {
                        apps.insert((vendor_id, v as u32));
                    }
                }
            }
        }
    }
    apps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::avp;

    fn manager_with_peer(identity: &str, realm: &str) -> (PeerManager, PeerHandle) {
        let mut manager = PeerManager::new();
        let handle = manager.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);
        let apps: BTreeSet<(u32, u32)> = [(0, 4)].into_iter().collect();
        assert!(manager.register_peer(handle, identity.into(), realm.into(), apps, 100));
        (manager, handle)
    }

    #[test]
    fn test_register_peer_indexes_realm() {
        let (manager, handle) = manager_with_peer("client.example.com", "example.com");

        let peer = manager.peer(handle).unwrap();
        assert_eq!(peer.identity(), Some("client.example.com"));
        assert_eq!(peer.realm(), Some("example.com"));
        assert!(peer.applications().contains(&(0, 4)));

        let realm = manager.realm("example.com").unwrap();
        assert_eq!(realm.peer_for_identity("client.example.com"), Some(handle));
        assert_eq!(realm.peers_for_application(0, 4), [handle]);
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let (mut manager, first) = manager_with_peer("client.example.com", "example.com");
        let second = manager.client_v4_add(Ipv4Addr::new(127, 0, 0, 2), 3868);
        let apps: BTreeSet<(u32, u32)> = [(0, 4)].into_iter().collect();
        assert!(!manager.register_peer(
            second,
            "client.example.com".into(),
            "example.com".into(),
            apps,
            100
        ));

        // the existing entry is preserved
        let realm = manager.realm("example.com").unwrap();
        assert_eq!(realm.peer_for_identity("client.example.com"), Some(first));
        assert!(manager.peer(second).unwrap().identity().is_none());
    }

    #[test]
    fn test_remove_peer_keeps_realm() {
        let (mut manager, handle) = manager_with_peer("client.example.com", "example.com");
        manager.remove_peer(handle);

        let realm = manager.realm("example.com").unwrap();
        assert_eq!(realm.peer_for_identity("client.example.com"), None);
        assert!(realm.peers_for_application(0, 4).is_empty());

        // the identity is free again
        let third = manager.client_v4_add(Ipv4Addr::new(127, 0, 0, 3), 3868);
        let apps: BTreeSet<(u32, u32)> = [(0, 4)].into_iter().collect();
        assert!(manager.register_peer(
            third,
            "client.example.com".into(),
            "example.com".into(),
            apps,
            200
        ));
    }

    #[test]
    fn test_advertised_applications() {
        use crate::message::flags;
        let mut message = DiameterMessage::new(257, 0, flags::REQUEST, 1, 1);
        message.add_avp(avp!(258, None, M, Integer32::new(4)));
        message.add_avp(avp!(259, None, M, Integer32::new(3)));
        let group = Grouped::new(vec![
            avp!(266, None, M, Integer32::new(10415)),
            avp!(258, None, M, Integer32::new(16777251)),
        ]);
        message.add_avp(avp!(260, None, M, group));

        let apps = advertised_applications(&message);
        assert!(apps.contains(&(0, 4)));
        assert!(apps.contains(&(0, 3)));
        assert!(apps.contains(&(10415, 16777251)));
        assert_eq!(apps.len(), 3);
    }
}
