//! SPV client state machine (spec §3 `SPV state`, §4.8 "Header sync state
//! machine" / "Block download" / "Completion signal"), transcribed from
//! `dogecoin_spv_client` in libdogecoin's `netspv.c`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::chainparams::ChainParams;
use crate::error::SpvError;
use crate::p2p::group::{NodeGroup, NodeGroupEvent};
use crate::p2p::node::{NodeState, HEADER_RESPONSE_TIMEOUT_SECS};
use crate::p2p::payload::{
    self, deserialize_headers, deserialize_inv, BlockPayload, InvType, InvVec, LocatorRequest,
    MAX_HEADERS_RESULTS,
};
use crate::primitives::hash::Hash256;
use crate::spv::headers_db::{BlockIndex, ConnectOutcome, HeadersDb};
use crate::transaction::tx::Tx;

/// How far ahead of `oldest_item_of_interest` (in seconds) a header's
/// timestamp must be before the client flips from header sync to full block
/// sync (spec §4.8 step 3).
const BLOCK_SYNC_LOOKAHEAD_SECS: i64 = 4500;
/// `oldest_item_of_interest − CHECKPOINT_LOOKBACK_SECS` is the newest
/// checkpoint timestamp eligible to anchor a fast-start chain (spec §4.8
/// step 1, "newest checkpoint with timestamp < oldest_item_of_interest − 900·5").
const CHECKPOINT_LOOKBACK_SECS: i64 = 900 * 5;
/// Two peers agreeing with the chaintip height is the completion signal
/// (spec §4.8 "Completion signal").
const SYNC_COMPLETION_PEER_COUNT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    HeaderSync,
    FullBlockSync,
}

pub struct SpvClient<D: HeadersDb> {
    pub chainparams: ChainParams,
    pub group: NodeGroup,
    pub headers_db: D,
    pub state: ClientState,
    pub use_checkpoints: bool,
    pub oldest_item_of_interest: i64,
    pub sync_completed: bool,

    last_headers_request_time: Option<Instant>,
    headersync_peer: Option<u64>,
    blocksync_peer: Option<u64>,
    candidates_cache: Vec<std::net::SocketAddr>,
    #[allow(clippy::type_complexity)]
    sync_transaction: Option<Box<dyn FnMut(&Tx, usize, &Arc<BlockIndex>) + Send>>,
}

impl<D: HeadersDb> SpvClient<D> {
    pub fn new(
        chainparams: ChainParams,
        headers_db: D,
        desired_count: u32,
        client_string: String,
        use_checkpoints: bool,
        oldest_item_of_interest: i64,
    ) -> Self {
        SpvClient {
            group: NodeGroup::new(chainparams, desired_count, client_string),
            chainparams,
            headers_db,
            state: ClientState::HeaderSync,
            use_checkpoints,
            oldest_item_of_interest,
            sync_completed: false,
            last_headers_request_time: None,
            headersync_peer: None,
            blocksync_peer: None,
            candidates_cache: Vec::new(),
            sync_transaction: None,
        }
    }

    pub fn set_sync_transaction_callback(
        &mut self,
        callback: impl FnMut(&Tx, usize, &Arc<BlockIndex>) + Send + 'static,
    ) {
        self.sync_transaction = Some(Box::new(callback));
    }

    /// Resolve peer candidates (explicit list or DNS seeds) and open sockets
    /// (spec §4.7 connection policy).
    pub async fn discover_peers(&mut self, explicit: &[String]) {
        self.candidates_cache = self.group.resolve_candidates(explicit).await;
        self.group.connect_next_nodes(&self.candidates_cache);
    }

    /// Drive the event loop until `sync_completed` fires or `timeout` elapses
    /// (spec §8 scenario 6). Returns whether sync completed within the bound.
    pub async fn run_until_synced(&mut self, timeout: Duration) -> Result<bool, SpvError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut ticker = tokio::time::interval(Duration::from_secs(3));
        ticker.tick().await; // first tick fires immediately

        loop {
            if self.sync_completed {
                return Ok(true);
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    return Ok(self.sync_completed);
                }
                _ = ticker.tick() => {
                    self.run_maintenance().await?;
                }
                event = self.group.next_event() => {
                    match event {
                        Some(event) => self.handle_event(event).await?,
                        None => return Ok(self.sync_completed),
                    }
                }
            }
        }
    }

    async fn run_maintenance(&mut self) -> Result<(), SpvError> {
        self.group.sweep_connect_timeouts();
        self.group.connect_next_nodes(&self.candidates_cache);
        self.group.send_idle_pings().await?;
        self.check_header_stall().await?;
        if self.headersync_peer.is_none() {
            self.maybe_start_header_sync().await?;
        }
        Ok(())
    }

    /// A header request that has not answered in `HEADER_RESPONSE_TIMEOUT_SECS`
    /// is abandoned and retried against a (possibly different) peer (spec §4.8
    /// step 5).
    async fn check_header_stall(&mut self) -> Result<(), SpvError> {
        if self.state != ClientState::HeaderSync {
            return Ok(());
        }
        let stalled = self
            .last_headers_request_time
            .map(|t| t.elapsed().as_secs() > HEADER_RESPONSE_TIMEOUT_SECS)
            .unwrap_or(false);
        if stalled {
            warn!("header sync stalled, retrying");
            self.headersync_peer = None;
            self.last_headers_request_time = None;
            self.maybe_start_header_sync().await?;
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: NodeGroupEvent) -> Result<(), SpvError> {
        match event {
            NodeGroupEvent::Connected { node_id } => {
                if let Err(e) = self.group.send_version(node_id, self.local_start_height()).await {
                    warn!(node_id, error = %e, "failed to send version");
                }
            }
            NodeGroupEvent::HandshakeDone { node_id } => {
                info!(node_id, "spv handshake complete");
                if self.headersync_peer.is_none() {
                    self.maybe_start_header_sync().await?;
                }
            }
            NodeGroupEvent::Application {
                node_id,
                command,
                payload,
            } => {
                self.handle_application_message(node_id, &command, &payload).await?;
            }
            NodeGroupEvent::Disconnected { node_id, .. } | NodeGroupEvent::Misbehaved { node_id } => {
                if self.headersync_peer == Some(node_id) {
                    self.headersync_peer = None;
                }
                if self.blocksync_peer == Some(node_id) {
                    self.blocksync_peer = None;
                }
            }
            NodeGroupEvent::ConnectFailed { .. } => {}
        }
        Ok(())
    }

    fn local_start_height(&self) -> i32 {
        self.headers_db
            .get_chaintip()
            .map(|tip| tip.height as i32)
            .unwrap_or(0)
    }

    async fn handle_application_message(
        &mut self,
        node_id: u64,
        command: &str,
        payload_bytes: &[u8],
    ) -> Result<(), SpvError> {
        match command {
            "headers" => self.on_headers(node_id, payload_bytes).await?,
            "inv" => self.on_inv(node_id, payload_bytes).await?,
            "block" => self.on_block(payload_bytes)?,
            "reject" => warn!(node_id, "peer sent reject"),
            "getdata" | "getheaders" | "getblocks" => {
                // This core never serves other peers' sync requests.
            }
            other => warn!(node_id, command = other, "unhandled application command"),
        }
        Ok(())
    }

    async fn on_headers(&mut self, node_id: u64, payload_bytes: &[u8]) -> Result<(), SpvError> {
        let headers = deserialize_headers(payload_bytes)?;
        let count = headers.len();
        let mut newest_connected: Option<Arc<BlockIndex>> = None;

        for header in &headers {
            let (index, outcome) = self.headers_db.connect_hdr(header)?;
            if outcome == ConnectOutcome::NotConnected {
                warn!(node_id, "received header with unknown prev_block");
                continue;
            }
            newest_connected = Some(index);
        }

        if let Some(index) = &newest_connected {
            if self.state == ClientState::HeaderSync
                && (index.header.timestamp as i64)
                    > self.oldest_item_of_interest - BLOCK_SYNC_LOOKAHEAD_SECS
            {
                info!(height = index.height, "flipping to full block sync");
                self.state = ClientState::FullBlockSync;
                if let Some(peer) = self.headersync_peer.take() {
                    if let Some(node) = self.group.node_mut(peer) {
                        node.state.remove(NodeState::HEADERSYNC);
                        node.state.insert(NodeState::BLOCKSYNC);
                    }
                    self.blocksync_peer = Some(peer);
                    self.request_blocks(peer).await?;
                }
                return Ok(());
            }
        }

        if count == MAX_HEADERS_RESULTS {
            self.request_next_headers_page(node_id).await?;
        } else {
            self.headersync_peer = None;
        }
        Ok(())
    }

    async fn on_inv(&mut self, node_id: u64, payload_bytes: &[u8]) -> Result<(), SpvError> {
        if self.state != ClientState::FullBlockSync {
            return Ok(());
        }
        let items = deserialize_inv(payload_bytes)?;
        let block_items: Vec<InvVec> = items
            .into_iter()
            .filter(|item| item.inv_type == InvType::Block)
            .collect();
        if block_items.is_empty() {
            return Ok(());
        }
        let last_hash = block_items.last().map(|item| item.hash).unwrap_or(Hash256::ZERO);
        if let Some(node) = self.group.node_mut(node_id) {
            node.last_requested_inv = last_hash;
        }
        self.group.send_inv(node_id, &block_items).await?;
        Ok(())
    }

    fn on_block(&mut self, payload_bytes: &[u8]) -> Result<(), SpvError> {
        let block = BlockPayload::deserialize(payload_bytes)?;
        let (index, outcome) = self.headers_db.connect_hdr(&block.header)?;
        if outcome == ConnectOutcome::NotConnected {
            warn!("received block with unknown prev_block");
            return Ok(());
        }
        if let Some(callback) = self.sync_transaction.as_mut() {
            for (pos, tx) in block.txs.iter().enumerate() {
                callback(tx, pos, &index);
            }
        }
        self.maybe_signal_sync_completed();
        Ok(())
    }

    fn maybe_signal_sync_completed(&mut self) {
        if self.sync_completed {
            return;
        }
        let Some(tip) = self.headers_db.get_chaintip() else {
            return;
        };
        if self.group.count_peers_at_height(tip.height as i32) >= SYNC_COMPLETION_PEER_COUNT {
            self.sync_completed = true;
            info!(height = tip.height, "sync completed");
        }
    }

    async fn maybe_start_header_sync(&mut self) -> Result<(), SpvError> {
        let Some(peer) = self.group.best_peer_for_sync(NodeState::HEADERSYNC) else {
            return Ok(());
        };
        self.headersync_peer = Some(peer);
        if let Some(node) = self.group.node_mut(peer) {
            node.state.insert(NodeState::HEADERSYNC);
        }
        self.send_getheaders(peer).await
    }

    async fn request_next_headers_page(&mut self, node_id: u64) -> Result<(), SpvError> {
        self.send_getheaders(node_id).await
    }

    async fn send_getheaders(&mut self, node_id: u64) -> Result<(), SpvError> {
        let locator = self.current_locator();
        let request = LocatorRequest {
            version: payload::PROTOCOL_VERSION as u32,
            locator,
            stop_hash: Hash256::ZERO,
        };
        self.group
            .send_command(node_id, "getheaders", &request.serialize())
            .await
            .map_err(SpvError::Net)?;
        self.last_headers_request_time = Some(Instant::now());
        Ok(())
    }

    async fn request_blocks(&mut self, node_id: u64) -> Result<(), SpvError> {
        let locator = self.current_locator();
        let request = LocatorRequest {
            version: payload::PROTOCOL_VERSION as u32,
            locator,
            stop_hash: Hash256::ZERO,
        };
        self.group
            .send_command(node_id, "getblocks", &request.serialize())
            .await
            .map_err(SpvError::Net)?;
        Ok(())
    }

    /// Compute the block locator for `getheaders`/`getblocks` (spec §4.8 step
    /// 1). When the chain is empty and checkpoints are in play, anchor at the
    /// newest eligible checkpoint instead of genesis.
    fn current_locator(&mut self) -> Vec<Hash256> {
        if self.headers_db.get_chaintip().is_some() {
            return self.headers_db.fill_blocklocator_tip();
        }
        if self.use_checkpoints && !self.headers_db.has_checkpoint_start() {
            let threshold = self.oldest_item_of_interest - CHECKPOINT_LOOKBACK_SECS;
            if let Some(checkpoint) = self
                .chainparams
                .checkpoints()
                .iter()
                .filter(|c| (c.timestamp as i64) < threshold)
                .max_by_key(|c| c.height)
            {
                let checkpoint = *checkpoint;
                let _ = self.headers_db.set_checkpoint_start(checkpoint);
                return vec![checkpoint.hash];
            }
        }
        vec![Hash256::ZERO]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainparams::Network;
    use crate::spv::headers_db::MemoryHeadersDb;

    fn make_client() -> SpvClient<MemoryHeadersDb> {
        SpvClient::new(
            ChainParams::for_network(Network::Regtest),
            MemoryHeadersDb::new(),
            8,
            "dogecoin-core-test".into(),
            false,
            1_700_000_000,
        )
    }

    #[test]
    fn starts_in_header_sync_state() {
        let client = make_client();
        assert_eq!(client.state, ClientState::HeaderSync);
        assert!(!client.sync_completed);
    }

    #[test]
    fn locator_falls_back_to_zero_hash_without_checkpoints() {
        let mut client = make_client();
        assert_eq!(client.current_locator(), vec![Hash256::ZERO]);
    }

    #[test]
    fn maybe_signal_sync_completed_requires_two_matching_peers() {
        let mut client = make_client();
        client.maybe_signal_sync_completed();
        assert!(!client.sync_completed);
    }
}
