//! TCP host for a client-role stack: connects, runs the capabilities
//! exchange and fires one Credit-Control request.

use diameter_stack::avp;
use diameter_stack::avp::flags::M;
use diameter_stack::avp::OctetString;
use diameter_stack::stack::{ApplicationListener, Stack};
use diameter_stack::transport::PeerIo;
use diameter_stack::{DiameterMessage, PeerHandle, PeerState};
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

struct ChannelIo {
    writers: Rc<RefCell<HashMap<PeerHandle, mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl PeerIo for ChannelIo {
    fn connect_v4(&mut self, peer: PeerHandle, host: Ipv4Addr, port: u16) {
        log::info!("{} connecting to {}:{}", peer, host, port);
    }

    fn listen_v4(&mut self, _peer: PeerHandle, _host: Ipv4Addr, _port: u16) {}

    fn close(&mut self, peer: PeerHandle) {
        self.writers.borrow_mut().remove(&peer);
    }

    fn write(&mut self, peer: PeerHandle, data: &[u8]) {
        if let Some(tx) = self.writers.borrow().get(&peer) {
            let _ = tx.send(data.to_vec());
        }
    }
}

struct CreditControl;

impl ApplicationListener for CreditControl {
    fn on_request(&mut self, stack: &mut Stack, peer: PeerHandle, request: &DiameterMessage) {
        let answer = stack.create_answer(request, Some(2001));
        stack.send_by_peer(peer, answer, false);
    }

    fn on_answer(&mut self, _stack: &mut Stack, _peer: PeerHandle, answer: &DiameterMessage) {
        log::info!("received answer:\n{}", answer);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let writers = Rc::new(RefCell::new(HashMap::new()));
    let mut stack = Stack::new("diameter-stack", Ipv4Addr::new(127, 0, 0, 1));
    stack.set_identity("client.example.com");
    stack.set_realm("example.com");
    stack.set_watchdog_seconds(30);
    stack.register_peer_io(Box::new(ChannelIo {
        writers: Rc::clone(&writers),
    }));
    stack.register_auth_application(Rc::new(RefCell::new(CreditControl)), 0, 4);

    let peer = stack.client_v4_add(Ipv4Addr::new(127, 0, 0, 1), 3868);
    let socket = TcpStream::connect("127.0.0.1:3868").await.unwrap();
    let (mut reader, mut writer) = socket.into_split();

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    writers.borrow_mut().insert(peer, tx);
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if writer.write_all(&data).await.is_err() {
                break;
            }
        }
    });

    // transport is up, kick the capabilities exchange
    stack.feed(peer, &[]);

    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];
    let mut ticker = interval(Duration::from_secs(1));
    let mut ccr_sent = false;

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => {
                        stack.feed_error(peer);
                        break;
                    }
                    Ok(n) => {
                        pending.extend_from_slice(&buf[..n]);
                        let consumed = stack.feed(peer, &pending);
                        if consumed < 0 {
                            break;
                        }
                        pending.drain(..consumed as usize);
                    }
                }
            }
            _ = ticker.tick() => {
                stack.tick();
            }
        }

        let state = stack.peer(peer).map(|p| p.state());
        if state == Some(PeerState::Open) && !ccr_sent {
            ccr_sent = true;
            let mut ccr = stack.create_request(4, 272, true, false, None);
            ccr.add_avp(avp!(263, None, M, OctetString::new(b"client;1;1".to_vec())));
            log::info!("sending request:\n{}", ccr);
            stack.send_by_peer(peer, ccr, true);
        }
        if state != Some(PeerState::Open) && state != Some(PeerState::WaitConn) && state != Some(PeerState::CerSent) {
            break;
        }
    }
}
