//! A single peer connection and its state machine (spec §3 `Node`, §4.7 "Node
//! state transitions"), transcribed from libdogecoin's `dogecoin_node` in
//! `net/net.h`/`net.c`.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

use crate::error::NetError;
use crate::p2p::message;
use crate::primitives::hash::Hash256;

/// Orthogonal state bitmask (spec §3). Multiple flags can be set at once, e.g. a
/// node can be both `CONNECTED` and `HEADERSYNC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeState(pub u32);

impl NodeState {
    pub const CONNECTING: u32 = 1 << 0;
    pub const CONNECTED: u32 = 1 << 1;
    pub const ERRORED: u32 = 1 << 2;
    pub const TIMEOUT: u32 = 1 << 3;
    pub const HEADERSYNC: u32 = 1 << 4;
    pub const BLOCKSYNC: u32 = 1 << 5;
    pub const MISSBEHAVED: u32 = 1 << 6;
    pub const DISCONNECTED: u32 = 1 << 7;
    pub const DISCONNECTED_FROM_REMOTE: u32 = 1 << 8;

    pub fn new() -> Self {
        NodeState(0)
    }

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag != 0
    }

    pub fn insert(&mut self, flag: u32) {
        self.0 |= flag;
    }

    pub fn remove(&mut self, flag: u32) {
        self.0 &= !flag;
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

/// Connect timeout (spec §4.7/§5): a node stuck in `CONNECTING` longer than this
/// transitions to `ERRORED | TIMEOUT`.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Idle-ping interval (spec §4.7/§5).
pub const PING_INTERVAL_SECS: u64 = 120;
/// Header-response timeout (spec §4.8/§5).
pub const HEADER_RESPONSE_TIMEOUT_SECS: u64 = 60;

pub struct Node {
    pub id: u64,
    pub addr: SocketAddr,
    pub state: NodeState,
    pub nonce: u64,
    pub services: u64,
    pub best_known_height: i32,
    pub time_started_connecting: Instant,
    pub time_last_request: Option<Instant>,
    pub last_activity: Instant,
    pub last_ping_sent: Option<(u64, Instant)>,
    pub last_requested_inv: Hash256,
    pub sent_verack: bool,
    pub received_verack: bool,
    pub misbehave_score: i32,
    pub hints: u32,
    write_half: Option<OwnedWriteHalf>,
}

impl Node {
    pub fn new(id: u64, addr: SocketAddr, nonce: u64) -> Self {
        let mut state = NodeState::new();
        state.insert(NodeState::CONNECTING);
        Node {
            id,
            addr,
            state,
            nonce,
            services: 0,
            best_known_height: 0,
            time_started_connecting: Instant::now(),
            time_last_request: None,
            last_activity: Instant::now(),
            last_ping_sent: None,
            last_requested_inv: Hash256::ZERO,
            sent_verack: false,
            received_verack: false,
            misbehave_score: 0,
            hints: 0,
            write_half: None,
        }
    }

    /// `CONNECTING` -> `CONNECTED` once the TCP-level connect attempt completes
    /// (spec §4.7).
    pub fn mark_connected(&mut self, write_half: OwnedWriteHalf) {
        self.state.remove(NodeState::CONNECTING);
        self.state.insert(NodeState::CONNECTED);
        self.write_half = Some(write_half);
        self.last_activity = Instant::now();
    }

    pub fn mark_connect_timeout(&mut self) {
        self.state.remove(NodeState::CONNECTING);
        self.state.insert(NodeState::ERRORED | NodeState::TIMEOUT);
    }

    pub fn mark_errored(&mut self) {
        self.state.insert(NodeState::ERRORED | NodeState::DISCONNECTED);
        self.write_half = None;
    }

    pub fn mark_disconnected_from_remote(&mut self) {
        self.state
            .insert(NodeState::DISCONNECTED | NodeState::DISCONNECTED_FROM_REMOTE);
        self.write_half = None;
    }

    /// A protocol violation moves the node to `MISSBEHAVED`; the group
    /// disconnects it as soon as it observes this flag (spec §4.7).
    pub fn misbehave(&mut self, penalty: i32) {
        self.misbehave_score += penalty;
        if self.misbehave_score >= 100 {
            self.state.insert(NodeState::MISSBEHAVED);
        }
    }

    pub fn is_connecting_timed_out(&self) -> bool {
        self.state.contains(NodeState::CONNECTING)
            && self.time_started_connecting.elapsed().as_secs() > CONNECT_TIMEOUT_SECS
    }

    pub fn handshake_done(&self) -> bool {
        self.sent_verack && self.received_verack
    }

    pub fn is_usable(&self) -> bool {
        self.state.contains(NodeState::CONNECTED)
            && !self.state.contains(NodeState::ERRORED)
            && !self.state.contains(NodeState::MISSBEHAVED)
            && !self.state.contains(NodeState::DISCONNECTED)
    }

    pub async fn send(
        &mut self,
        magic: [u8; 4],
        command: &str,
        payload: &[u8],
    ) -> Result<(), NetError> {
        let write_half = self
            .write_half
            .as_mut()
            .ok_or_else(|| NetError::ProtocolViolation("node has no open socket".into()))?;
        message::write_message(write_half, magic, command, payload).await
    }
}

/// Dial `addr`, splitting the resulting stream so the group can own the write
/// half directly while a reader task owns the read half (spec §9 REDESIGN
/// FLAGS: replace shared libevent buffers with owned buffers handed off rather
/// than referenced across suspension points).
pub async fn connect(addr: SocketAddr) -> Result<(OwnedWriteHalf, tokio::net::tcp::OwnedReadHalf), NetError> {
    let stream = TcpStream::connect(addr).await?;
    stream.set_nodelay(true).ok();
    let (read_half, write_half) = stream.into_split();
    Ok((write_half, read_half))
}
