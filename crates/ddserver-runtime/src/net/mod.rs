//! Address/socket manager
//!
//! Resolves host/port pairs, picks the first candidate a socket can be
//! opened on, and wraps the result in an [`Endpoint`] that sends and
//! receives [`Message`](ddserver_core::Message)s.

mod endpoint;
mod resolve;

pub use endpoint::{
    create_endpoint_from_peer_address, resolve_and_select, BindOptions, Endpoint, RecvMsg,
};
pub use resolve::{resolve, AddrFamily, AddressCandidate, SocketKind};
