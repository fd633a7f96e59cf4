//! TCP host for a server-role stack: accepts connections, answers the
//! capabilities exchange and echoes Credit-Control requests with
//! DIAMETER_SUCCESS.

use diameter_stack::stack::{ApplicationListener, Stack};
use diameter_stack::transport::PeerIo;
use diameter_stack::{DiameterMessage, PeerHandle};
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};

struct ChannelIo {
    writers: Rc<RefCell<HashMap<PeerHandle, mpsc::UnboundedSender<Vec<u8>>>>>,
}

impl PeerIo for ChannelIo {
    fn connect_v4(&mut self, _peer: PeerHandle, _host: Ipv4Addr, _port: u16) {}

    fn listen_v4(&mut self, peer: PeerHandle, host: Ipv4Addr, port: u16) {
        log::info!("{} listening on {}:{}", peer, host, port);
    }

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
        log::info!("received request:\n{}", request);
        let mut answer = stack.create_answer(request, Some(2001));
        if let Some(session_id) = request.first_avp(263, None) {
            answer.add_avp(session_id.clone());
        }
        stack.send_by_peer(peer, answer, false);
    }

    fn on_answer(&mut self, _stack: &mut Stack, _peer: PeerHandle, answer: &DiameterMessage) {
        log::info!("received answer:\n{}", answer);
    }
}

enum Event {
    Data(PeerHandle, Vec<u8>),
    Closed(PeerHandle),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let writers = Rc::new(RefCell::new(HashMap::new()));
    let mut stack = Stack::new("diameter-stack", Ipv4Addr::new(127, 0, 0, 1));
    stack.set_identity("server.example.com");
    stack.set_realm("example.com");
    stack.set_watchdog_seconds(30);
    stack.register_peer_io(Box::new(ChannelIo {
        writers: Rc::clone(&writers),
    }));
    stack.register_auth_application(Rc::new(RefCell::new(CreditControl)), 0, 4);

    let listener_peer = stack.server_v4_add(Ipv4Addr::new(0, 0, 0, 0), 3868);
    let listener = TcpListener::bind("0.0.0.0:3868").await.unwrap();

    let (events_tx, mut events) = mpsc::unbounded_channel::<Event>();
    let mut pending: HashMap<PeerHandle, Vec<u8>> = HashMap::new();
    let mut ticker = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        log::error!("accept failed: {}", e);
                        continue;
                    }
                };
                let ip = match addr.ip() {
                    std::net::IpAddr::V4(ip) => ip,
                    _ => continue,
                };
                let peer = stack.server_v4_accept(listener_peer, ip, addr.port());
                log::info!("{} accepted from {}", peer, addr);

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

                let events_tx = events_tx.clone();
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    loop {
                        match reader.read(&mut buf).await {
                            Ok(0) | Err(_) => {
                                let _ = events_tx.send(Event::Closed(peer));
                                break;
                            }
                            Ok(n) => {
                                if events_tx.send(Event::Data(peer, buf[..n].to_vec())).is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
            event = events.recv() => {
                match event {
                    Some(Event::Data(peer, data)) => {
                        let buffer = pending.entry(peer).or_default();
                        buffer.extend_from_slice(&data);
                        let consumed = stack.feed(peer, buffer);
                        if consumed < 0 {
                            pending.remove(&peer);
                        } else {
                            buffer.drain(..consumed as usize);
                        }
                    }
                    Some(Event::Closed(peer)) => {
                        stack.feed_error(peer);
                        pending.remove(&peer);
                    }
                    None => break,
                }
            }
            _ = ticker.tick() => {
                stack.tick();
            }
        }
    }
}
