//! P2P wire protocol and peer-group management (spec §3/§4.7/§6).

pub mod group;
pub mod message;
pub mod node;
pub mod payload;

pub use group::{NodeGroup, NodeGroupEvent, DEFAULT_DESIRED_COUNT};
pub use node::{Node, NodeState};
pub use payload::{InvType, InvVec, LocatorRequest, NetAddr, VersionPayload, NODE_NETWORK, PROTOCOL_VERSION};
