//! Transport adapter contract.
//!
//! The core never opens sockets. The host implements [`PeerIo`] and
//! registers it with the stack; the stack calls out through it to open,
//! close and write connections. Inbound traffic flows the other way: the
//! host calls [`Stack::feed`](crate::stack::Stack::feed) with received
//! bytes, with an empty buffer once the transport is connected (flush
//! signal), and [`Stack::feed_error`](crate::stack::Stack::feed_error)
//! when the transport fails.

use crate::peer::PeerHandle;
use std::net::Ipv4Addr;

pub trait PeerIo {
    /// Open an outbound connection for a client peer.
    fn connect_v4(&mut self, peer: PeerHandle, host: Ipv4Addr, port: u16);

    /// Start listening on behalf of a listen peer.
    fn listen_v4(&mut self, peer: PeerHandle, host: Ipv4Addr, port: u16);

    /// Tear down the transport of a peer. Must be safe to call for peers
    /// that are already gone.
    fn close(&mut self, peer: PeerHandle);

    /// Queue bytes for transmission, in call order. A write to a closed
    /// peer must be a no-op or be reported back through `feed_error`.
    fn write(&mut self, peer: PeerHandle, data: &[u8]);
}

/// Placeholder adapter used until the host registers one.
#[derive(Debug, Default)]
pub(crate) struct NullPeerIo;

impl PeerIo for NullPeerIo {
    fn connect_v4(&mut self, peer: PeerHandle, host: Ipv4Addr, port: u16) {
        log::debug!("no peer I/O registered, connect {}:{} for {} dropped", host, port, peer);
    }

    fn listen_v4(&mut self, peer: PeerHandle, host: Ipv4Addr, port: u16) {
        log::debug!("no peer I/O registered, listen {}:{} for {} dropped", host, port, peer);
    }

    fn close(&mut self, peer: PeerHandle) {
        log::debug!("no peer I/O registered, close for {} dropped", peer);
    }

    fn write(&mut self, peer: PeerHandle, data: &[u8]) {
        log::debug!(
            "no peer I/O registered, {} bytes for {} dropped",
            data.len(),
            peer
        );
    }
}
