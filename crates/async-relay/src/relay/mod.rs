//! Relay flow: dispatching work, processing it on the peer side, and
//! routing callbacks back to the waiting request.

pub mod dispatcher;
pub mod forwarder;
pub mod intake;
pub mod peers;
pub mod processor;

pub use dispatcher::Dispatcher;
pub use forwarder::{ForwardError, Forwarder, HttpForwarder};
pub use intake::CallbackIntake;
pub use peers::{selector_from_config, PeerSelector, SiblingTopology, StaticPeers};
pub use processor::Processor;
