//! Mediator role of a transfer task (§4.4): forwards a `MediatedTransfer`
//! from a predecessor `P` to a next hop `N` with a strictly smaller
//! expiration, then waits for either a `Secret` (settle both adjacent
//! channels and relay the secret onward to `N`, continuing it toward the
//! target) or a `CancelTransfer`/timeout (roll back and relay the
//! cancellation upstream to `P`).

use std::sync::Arc;
use std::time::Duration;

use slog::Logger;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::messages::{CancelTransfer, LockFields, MediatedTransfer, Message, SecretMessage};
use crate::primitives::{Address, AssetId, BlockNumber, Hashlock, Secret, TokenAmount};

use super::{Completion, Outcome, TransferEnvironment, TransferError};

enum DownstreamOutcome {
    Secret(Secret),
    Cancelled,
    TimedOut,
}

/// One payment, from this node's perspective as an intermediate hop.
pub struct MediatorTask {
    hashlock: Hashlock,
    asset_id: AssetId,
    our_address: Address,
    predecessor: Address,
    target: Address,
    initiator: Address,
    amount: TokenAmount,
    incoming_expiration: BlockNumber,
    fee: TokenAmount,
    reveal_timeout: u64,
    timeout_per_hop: Duration,
    max_paths: usize,
    env: Arc<dyn TransferEnvironment>,
    inbox: mpsc::UnboundedReceiver<Message>,
    completion: Completion,
    log: Logger,
}

impl MediatorTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        asset_id: AssetId,
        our_address: Address,
        predecessor: Address,
        target: Address,
        initiator: Address,
        amount: TokenAmount,
        hashlock: Hashlock,
        incoming_expiration: BlockNumber,
        fee: TokenAmount,
        reveal_timeout: u64,
        timeout_per_hop: Duration,
        max_paths: usize,
        env: Arc<dyn TransferEnvironment>,
        log: Logger,
    ) -> (Self, mpsc::UnboundedSender<Message>, tokio::sync::oneshot::Receiver<Outcome>) {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (completion, completed) = Completion::new();
        let task = Self {
            hashlock,
            asset_id,
            our_address,
            predecessor,
            target,
            initiator,
            amount,
            incoming_expiration,
            fee,
            reveal_timeout,
            timeout_per_hop,
            max_paths,
            env,
            inbox,
            completion,
            log,
        };
        (task, inbox_tx, completed)
    }

    pub fn hashlock(&self) -> Hashlock {
        self.hashlock
    }

    pub async fn run(mut self) {
        let outcome = self.drive().await;
        match &outcome {
            Ok(()) => info!(self.log, "mediated transfer settled"; "hashlock" => ?self.hashlock),
            Err(err) => warn!(self.log, "mediated transfer ended without settling"; "hashlock" => ?self.hashlock, "error" => %err),
        }
        self.completion.complete(outcome);
    }

    async fn drive(&mut self) -> Outcome {
        let candidates = self.env.candidate_paths(self.asset_id, self.our_address, self.target, self.max_paths);
        let mut candidates: Vec<Vec<Address>> = candidates
            .into_iter()
            .filter(|path| path.len() >= 2 && path[1] != self.predecessor)
            .rev()
            .collect();

        loop {
            let path = match candidates.pop() {
                Some(path) => path,
                None => {
                    self.cancel_upstream().await;
                    return Err(TransferError::NoPath);
                }
            };
            let next_hop = path[1];

            let reveal_floor = self.env.current_block() + self.reveal_timeout;
            let forwarded_expiration = BlockNumber(self.incoming_expiration.0.saturating_sub(self.reveal_timeout));
            if forwarded_expiration < reveal_floor {
                continue;
            }

            let prepared = match self.env.create_mediated_transfer(
                self.asset_id,
                next_hop,
                self.amount,
                self.hashlock,
                forwarded_expiration,
                self.target,
                self.initiator,
                self.fee,
            ) {
                Ok(prepared) => prepared,
                Err(err) => {
                    debug!(self.log, "candidate hop rejected by channel, trying next"; "next_hop" => %next_hop, "error" => %err);
                    continue;
                }
            };

            let message = Message::MediatedTransfer(MediatedTransfer {
                sender: self.our_address,
                nonce: prepared.nonce,
                asset: self.asset_id,
                recipient: next_hop,
                transferred_amount: prepared.transferred_amount,
                locks_root: prepared.locks_root,
                target: self.target,
                initiator: self.initiator,
                lock: LockFields { amount: self.amount, expiration: forwarded_expiration, hashlock: self.hashlock },
                fee: self.fee,
                signature: Vec::new(),
            });

            if self.env.send(next_hop, message).await.is_err() {
                debug!(self.log, "next hop unreachable, trying next candidate"; "next_hop" => %next_hop);
                continue;
            }
            debug!(self.log, "forwarded lock"; "next_hop" => %next_hop, "hashlock" => ?self.hashlock);

            match self.await_downstream().await {
                DownstreamOutcome::Secret(secret) => {
                    self.env.register_secret(self.asset_id, next_hop, secret);
                    self.env.register_secret(self.asset_id, self.predecessor, secret);
                    self.env
                        .send(
                            next_hop,
                            Message::Secret(SecretMessage { sender: self.our_address, secret, signature: Vec::new() }),
                        )
                        .await?;
                    return Ok(());
                }
                DownstreamOutcome::Cancelled => continue,
                DownstreamOutcome::TimedOut => {
                    self.cancel_upstream().await;
                    return Err(TransferError::Timeout);
                }
            }
        }
    }

    async fn await_downstream(&mut self) -> DownstreamOutcome {
        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    match message {
                        Some(Message::Secret(secret_message)) if secret_message.secret.hashlock() == self.hashlock => {
                            return DownstreamOutcome::Secret(secret_message.secret);
                        }
                        Some(Message::CancelTransfer(cancel)) if cancel.hashlock == self.hashlock => {
                            return DownstreamOutcome::Cancelled;
                        }
                        Some(_) => continue,
                        None => return DownstreamOutcome::TimedOut,
                    }
                }
                _ = sleep(self.timeout_per_hop) => return DownstreamOutcome::TimedOut,
            }
        }
    }

    async fn cancel_upstream(&self) {
        let _ = self
            .env
            .send(
                self.predecessor,
                Message::CancelTransfer(CancelTransfer { sender: self.our_address, hashlock: self.hashlock, signature: Vec::new() }),
            )
            .await;
    }
}
