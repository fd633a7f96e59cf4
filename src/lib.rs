//! # diameter-stack
//!
//! Sans-I/O implementation of the Diameter base protocol.
//!
//! ## Reference
//! Based on [RFC 6733](https://tools.ietf.org/html/rfc6733)
//!
//! The crate speaks the Diameter base protocol over a reliable transport
//! the *host* provides: peers and their capabilities-exchange/watchdog
//! lifecycle live in [`peer`], application routing and retransmission in
//! [`stack`], and the wire codec in [`avp`] and [`message`]. The host
//! registers a [`transport::PeerIo`] adapter, feeds received bytes in via
//! [`stack::Stack::feed`] and drives timers with [`stack::Stack::tick`].
//!
//! ## Examples
//! * `demos/client.rs` - connects a stack to a server over TCP and
//!   exchanges capabilities.
//! * `demos/server.rs` - accepts connections and answers Credit-Control
//!   requests.

pub mod avp;
pub mod dictionary;
mod display;
pub mod error;
pub mod message;
pub mod peer;
pub mod stack;
pub mod transport;

pub use crate::error::{Error, Result};
pub use crate::message::flags;
pub use crate::message::{ApplicationId, CommandCode, DiameterHeader, DiameterMessage};
pub use crate::peer::{Peer, PeerHandle, PeerRole, PeerState};
pub use crate::stack::{ApplicationListener, PeerListener, Stack};
