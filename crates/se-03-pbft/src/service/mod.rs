//! # Shard Node Service
//!
//! One PBFT replica. Inbound messages are handled one at a time by
//! [`ShardNode::run`]; on the primary a separate proposer task feeds new
//! requests into the same state.
//!
//! ## Per-sequence flow
//!
//! ```text
//! primary: propose ──PrePrepare──→ backups
//! backups: validate ──Prepare──→ all          (2f voters, self included)
//! all:     ──Commit──→ all                    (2f+1 voters, self included)
//! all:     apply through the strategy, seq += 1
//! ```
//!
//! A replica that sees a commit quorum for a request it cannot apply asks
//! the primary for the missing range and replays the answer.

use crate::context::{NodeContext, PRIMARY_INDEX};
use crate::domain::{CommitDecision, ConsensusError, ConsensusResult, PbftState, Placement};
use crate::strategy::Strategy;
use emu_telemetry::{metric_inc, CATCH_UP_REQUESTS, PROTOCOL_REJECTIONS};
use parking_lot::Mutex;
use se_01_ledger::Ledger;
use shared_net::{
    Inbox, Message, PrePrepare, RequestOldMessage, SendOldMessage, Transport, Vote,
};
use shared_types::{hash_hex, EmulatorConfig, Hash, NodeIndex, Request, ShardId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub struct ShardNode {
    ctx: NodeContext,
    strategy: Strategy,
    state: Mutex<PbftState>,
    /// Held by the proposer from PrePrepare until its commit.
    propose_gate: Semaphore,
    stop_tx: watch::Sender<bool>,
}

impl ShardNode {
    pub fn new(ctx: NodeContext, strategy: Strategy) -> Self {
        let first_seq = ctx.ledger.height() + 1;
        let state = PbftState::new(ctx.f(), first_seq, ctx.config.request_retention);
        let (stop_tx, _) = watch::channel(false);
        Self {
            ctx,
            strategy,
            state: Mutex::new(state),
            propose_gate: Semaphore::new(1),
            stop_tx,
        }
    }

    /// Build a replica with the strategy named in `config`.
    pub fn from_config(
        config: Arc<EmulatorConfig>,
        shard_id: ShardId,
        node_id: NodeIndex,
        ledger: Arc<dyn Ledger>,
        transport: Arc<dyn Transport>,
    ) -> ConsensusResult<Self> {
        let strategy = Strategy::new(config.strategy, &config.barrier);
        let ctx = NodeContext::new(config, shard_id, node_id, ledger, transport)?;
        Ok(Self::new(ctx, strategy))
    }

    pub fn context(&self) -> &NodeContext {
        &self.ctx
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Next sequence number this replica will commit.
    pub fn seq(&self) -> u64 {
        self.state.lock().seq()
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Receiver that flips to `true` once the replica stops.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    /// Handle `inbox` until a Stop message, a fatal error or the inbox
    /// closing. The primary also runs its proposer until then.
    pub async fn run(self: Arc<Self>, mut inbox: Inbox) -> ConsensusResult<()> {
        info!(
            shard = self.ctx.shard_id,
            node = self.ctx.node_id,
            strategy = %self.strategy.kind(),
            seq = self.seq(),
            "[se-03] Replica started"
        );
        let proposer = self
            .ctx
            .is_primary()
            .then(|| tokio::spawn(Arc::clone(&self).propose_loop()));

        let mut stop = self.stop_signal();
        let result = loop {
            let msg = tokio::select! {
                msg = inbox.recv() => msg,
                _ = wait_stopped(&mut stop) => break Ok(()),
            };
            let Some(msg) = msg else {
                break Ok(());
            };
            if let Err(e) = self.dispatch(msg).await {
                error!(shard = self.ctx.shard_id, node = self.ctx.node_id, error = %e, "[se-03] Replica failed");
                break Err(e);
            }
            if self.is_stopped() {
                break Ok(());
            }
        };
        self.stop().await;

        if let Some(handle) = proposer {
            match handle.await {
                Ok(Err(e)) => warn!(shard = self.ctx.shard_id, error = %e, "[se-03] Proposer ended with error"),
                Err(e) => warn!(shard = self.ctx.shard_id, error = %e, "[se-03] Proposer task panicked"),
                Ok(Ok(())) => {}
            }
        }
        info!(shard = self.ctx.shard_id, node = self.ctx.node_id, seq = self.seq(), "[se-03] Replica stopped");
        result
    }

    /// Set the stop flag and close the transport. Idempotent.
    pub async fn stop(&self) {
        if self.stop_tx.send_replace(true) {
            return;
        }
        self.propose_gate.close();
        self.ctx.transport.close().await;
        info!(shard = self.ctx.shard_id, node = self.ctx.node_id, "[se-03] Stop received");
    }

    pub async fn dispatch(&self, msg: Message) -> ConsensusResult<()> {
        match msg {
            Message::PrePrepare(pp) => self.handle_pre_prepare(pp).await,
            Message::Prepare(vote) => self.handle_prepare(vote).await,
            Message::Commit(vote) => self.handle_commit(vote).await,
            Message::RequestOldRequest(req) => self.handle_request_old(req).await,
            Message::SendOldRequest(reply) => self.handle_send_old(reply).await,
            Message::Stop => {
                self.stop().await;
                Ok(())
            }
            other => {
                self.strategy.handle_outside(&self.ctx, other);
                Ok(())
            }
        }
    }

    // =========================================================================
    // PROPOSER
    // =========================================================================

    async fn propose_loop(self: Arc<Self>) -> ConsensusResult<()> {
        let interval = Duration::from_millis(self.ctx.config.block_interval_ms);
        let mut stop = self.stop_signal();
        loop {
            tokio::select! {
                _ = sleep(interval) => {}
                _ = wait_stopped(&mut stop) => return Ok(()),
            }
            let permit = tokio::select! {
                permit = self.propose_gate.acquire() => permit,
                _ = wait_stopped(&mut stop) => return Ok(()),
            };
            match permit {
                Ok(permit) => permit.forget(),
                Err(_) => return Ok(()),
            }

            let seq = self.seq();
            let request = match self.strategy.propose(&self.ctx, seq, &stop).await {
                Ok(request) => request,
                Err(ConsensusError::Stopped) => return Ok(()),
                Err(e) => {
                    error!(shard = self.ctx.shard_id, error = %e, "[se-03] Proposal failed");
                    self.stop().await;
                    return Err(e);
                }
            };
            if let Err(e) = self.broadcast_proposal(seq, request).await {
                error!(shard = self.ctx.shard_id, error = %e, "[se-03] Proposal failed");
                self.stop().await;
                return Err(e);
            }
        }
    }

    async fn broadcast_proposal(&self, seq: u64, request: Request) -> ConsensusResult<()> {
        let digest = request.digest()?;
        if !self.state.lock().store_request(seq, digest, request.clone()) {
            return Err(ConsensusError::SlotTaken { seq });
        }
        info!(
            shard = self.ctx.shard_id,
            seq,
            digest = %hash_hex(&digest),
            kind = ?request.kind,
            "[se-03] PrePrepare broadcast"
        );
        let msg = Message::PrePrepare(PrePrepare {
            request,
            digest,
            seq_id: seq,
        });
        self.ctx.broadcast(&msg).await?;
        // With f = 0 no votes are needed from anyone else.
        self.send_commit_if_turn(digest, seq).await?;
        self.drive_commits(digest, seq).await
    }

    fn release_gate(&self) {
        if self.propose_gate.available_permits() == 0 {
            self.propose_gate.add_permits(1);
        }
    }

    // =========================================================================
    // THREE PHASES
    // =========================================================================

    async fn handle_pre_prepare(&self, pp: PrePrepare) -> ConsensusResult<()> {
        if self.ctx.is_primary() {
            self.reject("not_from_primary", pp.seq_id);
            return Ok(());
        }
        if pp.request.digest().ok() != Some(pp.digest) {
            self.reject("digest", pp.seq_id);
            return Ok(());
        }
        let (placement, stored) = {
            let mut state = self.state.lock();
            let placement = state.placement(pp.seq_id);
            let stored = matches!(placement, Placement::Current | Placement::Ahead)
                && state.store_request(pp.seq_id, pp.digest, pp.request.clone());
            (placement, stored)
        };
        match placement {
            Placement::Stale => {
                self.reject("stale", pp.seq_id);
                return Ok(());
            }
            Placement::Beyond => {
                self.reject("window", pp.seq_id);
                return Ok(());
            }
            _ if !stored => {
                warn!(
                    shard = self.ctx.shard_id,
                    node = self.ctx.node_id,
                    seq = pp.seq_id,
                    digest = %hash_hex(&pp.digest),
                    "[se-03] Conflicting PrePrepare ignored"
                );
                self.reject("equivocation", pp.seq_id);
                return Ok(());
            }
            Placement::Ahead => {
                debug!(shard = self.ctx.shard_id, node = self.ctx.node_id, seq = pp.seq_id, "[se-03] PrePrepare stored ahead");
            }
            Placement::Current => self.prepare_current(pp.digest, pp.seq_id, &pp.request).await?,
        }
        // Votes for this digest may have arrived before the proposal.
        self.send_commit_if_turn(pp.digest, pp.seq_id).await?;
        self.drive_commits(pp.digest, pp.seq_id).await
    }

    /// Validate the request for the current sequence and vote Prepare.
    async fn prepare_current(&self, digest: Hash, seq: u64, request: &Request) -> ConsensusResult<()> {
        if self.ctx.is_primary() {
            return Ok(());
        }
        if !self.strategy.validate(&self.ctx, request) {
            self.reject("invalid_block", seq);
            return Ok(());
        }
        if !self.state.lock().mark_prepared(digest, seq, self.ctx.node_id) {
            return Ok(());
        }
        debug!(shard = self.ctx.shard_id, node = self.ctx.node_id, seq, digest = %hash_hex(&digest), "[se-03] Prepare broadcast");
        self.ctx
            .broadcast(&Message::Prepare(self.vote(digest, seq)))
            .await
    }

    async fn handle_prepare(&self, vote: Vote) -> ConsensusResult<()> {
        if !self.is_member(vote.sender) {
            self.reject("sender", vote.seq_id);
            return Ok(());
        }
        self.state
            .lock()
            .record_prepare(vote.seq_id, vote.digest, vote.sender);
        self.send_commit_if_turn(vote.digest, vote.seq_id).await?;
        self.drive_commits(vote.digest, vote.seq_id).await
    }

    async fn send_commit_if_turn(&self, digest: Hash, seq: u64) -> ConsensusResult<()> {
        let turn = self
            .state
            .lock()
            .take_commit_turn(digest, seq, self.ctx.node_id);
        if !turn {
            return Ok(());
        }
        debug!(shard = self.ctx.shard_id, node = self.ctx.node_id, seq, digest = %hash_hex(&digest), "[se-03] Commit broadcast");
        self.ctx
            .broadcast(&Message::Commit(self.vote(digest, seq)))
            .await
    }

    async fn handle_commit(&self, vote: Vote) -> ConsensusResult<()> {
        if !self.is_member(vote.sender) {
            self.reject("sender", vote.seq_id);
            return Ok(());
        }
        self.state
            .lock()
            .record_commit(vote.seq_id, vote.digest, vote.sender);
        self.drive_commits(vote.digest, vote.seq_id).await
    }

    /// Apply every request whose commit quorum is complete, starting with
    /// `digest`, and keep going while each commit unlocks the next one.
    async fn drive_commits(&self, digest: Hash, seq: u64) -> ConsensusResult<()> {
        let mut next = Some((digest, seq));
        while let Some((digest, seq)) = next.take() {
            let decision = self.state.lock().decide_commit(digest, seq);
            match decision {
                CommitDecision::Wait => {}
                CommitDecision::Apply(request) => {
                    self.strategy.commit(&self.ctx, seq, &request).await?;
                    self.state.lock().finish_commit(seq);
                    info!(
                        shard = self.ctx.shard_id,
                        node = self.ctx.node_id,
                        seq,
                        digest = %hash_hex(&digest),
                        "[se-03] Committed"
                    );
                    if self.ctx.is_primary() {
                        self.release_gate();
                    }
                    next = self.advance().await?;
                }
                CommitDecision::CatchUp(range) => {
                    info!(
                        shard = self.ctx.shard_id,
                        node = self.ctx.node_id,
                        from = range.start,
                        to = range.end,
                        "[se-03] Behind, requesting old requests"
                    );
                    metric_inc!(CATCH_UP_REQUESTS, &[self.ctx.shard_label().as_str()]);
                    let ask = Message::RequestOldRequest(RequestOldMessage {
                        range,
                        server_node: PRIMARY_INDEX,
                        sender_node: self.ctx.node_id,
                    });
                    self.ctx.send_to_primary(&ask).await?;
                }
            }
        }
        Ok(())
    }

    /// Prepare whatever became the current sequence. Returns its digest so
    /// the caller can check for an already complete commit quorum.
    async fn advance(&self) -> ConsensusResult<Option<(Hash, u64)>> {
        let (seq, pending) = {
            let state = self.state.lock();
            (state.seq(), state.unprepared_current())
        };
        if let Some((digest, request)) = pending {
            self.prepare_current(digest, seq, &request).await?;
        }
        let Some(digest) = self.state.lock().digest_at(seq) else {
            return Ok(None);
        };
        self.send_commit_if_turn(digest, seq).await?;
        Ok(Some((digest, seq)))
    }

    // =========================================================================
    // CATCH-UP
    // =========================================================================

    async fn handle_request_old(&self, req: RequestOldMessage) -> ConsensusResult<()> {
        let old_requests = self.state.lock().requests_in(req.range);
        info!(
            shard = self.ctx.shard_id,
            to = req.sender_node,
            from_seq = req.range.start,
            to_seq = req.range.end,
            served = old_requests.len(),
            "[se-03] Serving old requests"
        );
        let reply = Message::SendOldRequest(SendOldMessage {
            range: req.range,
            old_requests,
            sender_node: self.ctx.node_id,
        });
        let addr = self.ctx.config.nodes.addr(self.ctx.shard_id, req.sender_node);
        self.ctx.send_to(&reply, &addr).await
    }

    async fn handle_send_old(&self, reply: SendOldMessage) -> ConsensusResult<()> {
        if reply.old_requests.len() < reply.range.len() {
            warn!(
                shard = self.ctx.shard_id,
                node = self.ctx.node_id,
                expected = reply.range.len(),
                got = reply.old_requests.len(),
                "[se-03] Old request reply is truncated"
            );
        }
        let mut applied = 0usize;
        for (offset, request) in reply.old_requests.iter().enumerate() {
            let Some(height) = u64::try_from(offset)
                .ok()
                .and_then(|offset| reply.range.start.checked_add(offset))
            else {
                break;
            };
            // A commit quorum outranks the proposal this replica saw.
            let (local, known) = {
                let state = self.state.lock();
                let known = state.quorum_digest(height).or_else(|| state.digest_at(height));
                (state.seq(), known)
            };
            if height < local {
                continue;
            }
            if height > local {
                break;
            }
            let Ok(digest) = request.digest() else {
                self.reject("catch_up_digest", height);
                break;
            };
            if known.is_some_and(|known| known != digest) {
                self.reject("catch_up_digest", height);
                break;
            }
            if !self.strategy.validate(&self.ctx, request) {
                self.reject("invalid_block", height);
                break;
            }
            self.strategy.apply_caught_up(&self.ctx, request)?;
            self.state
                .lock()
                .record_caught_up(height, digest, request.clone());
            applied += 1;
        }
        self.state.lock().end_catch_up();
        info!(
            shard = self.ctx.shard_id,
            node = self.ctx.node_id,
            applied,
            seq = self.seq(),
            "[se-03] Caught up"
        );
        if let Some((digest, seq)) = self.advance().await? {
            self.drive_commits(digest, seq).await?;
        }
        Ok(())
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    fn vote(&self, digest: Hash, seq: u64) -> Vote {
        Vote {
            digest,
            seq_id: seq,
            sender: self.ctx.node_id,
        }
    }

    fn is_member(&self, node: NodeIndex) -> bool {
        node < self.ctx.config.nodes_per_shard
    }

    fn reject(&self, reason: &'static str, seq: u64) {
        metric_inc!(PROTOCOL_REJECTIONS, &[self.ctx.shard_label().as_str(), reason]);
        debug!(shard = self.ctx.shard_id, node = self.ctx.node_id, seq, reason, "[se-03] Message rejected");
    }
}

/// Resolve once the stop flag is set or its sender is gone.
async fn wait_stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}
