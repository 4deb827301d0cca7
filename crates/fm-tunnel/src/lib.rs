//! fm-tunnel: Tunnel lifecycle and relay engine for fwdmng
//!
//! A [`Registry`] holds [`Host`]s; each host owns [`Forward`]s. Connecting a
//! host establishes one SSH session and a [`DialQueue`] over it. Every
//! forward then listens locally and relays each accepted connection through
//! a channel opened on that shared session.

pub mod dial;
pub mod forward;
pub mod host;
pub mod keepalive;
pub mod registry;
pub mod relay;
pub mod ssh;
pub mod transport;
pub mod view;

pub use dial::{spawn_dial_service, DialQueue, DialRequest};
pub use forward::Forward;
pub use host::{Host, Transition};
pub use keepalive::Keepalive;
pub use registry::{Registry, Removed};
pub use relay::{Relay, RelayHandle};
pub use ssh::{BoxedStream, HandshakeParams, RemoteSession, RusshConnector, SessionConnector};
pub use view::{ForwardView, HostView, ListItem};
