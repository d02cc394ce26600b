//! TCP connection lifecycle for configured links: state machine, backoff
//! reconnect policy, and the link manager itself (§4.5). Framing and
//! parsing are deliberately out of scope here — `gateway::core` wires a
//! `Framer`/`Sl651Parser` pipeline to the data callback this crate exposes.

pub mod manager;
pub mod state;

pub use manager::{ConnectionCallback, DataCallback, LinkMode, TcpLinkManager, TcpStats};
pub use state::{LinkState, LinkStateMachine, ReconnectPolicy};
