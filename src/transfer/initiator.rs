//! Initiator role of a transfer task (§4.4): `INIT -> PATH_CHOSEN ->
//! LOCK_SENT -> SECRET_REVEALED -> SETTLED`, with `NO_PATH`/`TIMEOUT`/
//! `CANCELLED` branches.

use std::sync::Arc;
use std::time::Duration;

use slog::Logger;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::messages::{LockFields, Message, MediatedTransfer, SecretMessage, TransferTimeout};
use crate::primitives::{Address, AssetId, BlockNumber, Hashlock, Secret, TokenAmount};

use super::{Completion, Outcome, TransferEnvironment, TransferError};

enum AwaitOutcome {
    SecretRequested,
    Cancelled,
    TimedOut,
}

/// One payment, from this node's own perspective as its origin.
pub struct InitiatorTask {
    hashlock: Hashlock,
    asset_id: AssetId,
    our_address: Address,
    target: Address,
    amount: TokenAmount,
    secret: Secret,
    settle_timeout: u64,
    timeout_per_hop: Duration,
    max_paths: usize,
    env: Arc<dyn TransferEnvironment>,
    inbox: mpsc::UnboundedReceiver<Message>,
    completion: Completion,
    log: Logger,
}

impl InitiatorTask {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        asset_id: AssetId,
        our_address: Address,
        target: Address,
        amount: TokenAmount,
        secret: Secret,
        settle_timeout: u64,
        timeout_per_hop: Duration,
        max_paths: usize,
        env: Arc<dyn TransferEnvironment>,
        log: Logger,
    ) -> (Self, mpsc::UnboundedSender<Message>, tokio::sync::oneshot::Receiver<Outcome>) {
        let (inbox_tx, inbox) = mpsc::unbounded_channel();
        let (completion, completed) = Completion::new();
        let hashlock = secret.hashlock();
        let task = Self {
            hashlock,
            asset_id,
            our_address,
            target,
            amount,
            secret,
            settle_timeout,
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

    /// Drives the state machine to completion and notifies whoever is
    /// awaiting the result. Intended to be `tokio::spawn`ed by the
    /// coordinator.
    pub async fn run(mut self) {
        let outcome = self.drive().await;
        match &outcome {
            Ok(()) => info!(self.log, "initiator transfer settled"; "hashlock" => ?self.hashlock),
            Err(err) => warn!(self.log, "initiator transfer ended without settling"; "hashlock" => ?self.hashlock, "error" => %err),
        }
        self.completion.complete(outcome);
    }

    async fn drive(&mut self) -> Outcome {
        let candidates = self.env.candidate_paths(self.asset_id, self.our_address, self.target, self.max_paths);
        if candidates.is_empty() {
            return Err(TransferError::NoPath);
        }
        let mut candidates: Vec<Vec<Address>> = candidates.into_iter().rev().collect();

        loop {
            let path = match candidates.pop() {
                Some(path) if path.len() >= 2 => path,
                Some(_) => continue,
                None => return Err(TransferError::NoPath),
            };

            let next_hop = path[1];
            let hops_remaining = path.len() - 1;
            let expiration = self.env.current_block() + self.settle_timeout;

            let prepared = match self.env.create_mediated_transfer(
                self.asset_id,
                next_hop,
                self.amount,
                self.hashlock,
                expiration,
                self.target,
                self.our_address,
                TokenAmount::ZERO,
            ) {
                Ok(prepared) => prepared,
                Err(err) => {
                    debug!(self.log, "candidate path rejected by channel, trying next"; "next_hop" => %next_hop, "error" => %err);
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
                initiator: self.our_address,
                lock: LockFields { amount: self.amount, expiration, hashlock: self.hashlock },
                fee: TokenAmount::ZERO,
                signature: Vec::new(),
            });

            if self.env.send(next_hop, message).await.is_err() {
                debug!(self.log, "next hop unreachable, trying next candidate"; "next_hop" => %next_hop);
                continue;
            }
            debug!(self.log, "lock sent"; "next_hop" => %next_hop, "hashlock" => ?self.hashlock);

            match self.await_secret_request(hops_remaining).await {
                AwaitOutcome::SecretRequested => {
                    self.reveal_secret(next_hop).await?;
                    return Ok(());
                }
                AwaitOutcome::Cancelled => continue,
                AwaitOutcome::TimedOut => {
                    let _ = self
                        .env
                        .send(
                            next_hop,
                            Message::TransferTimeout(TransferTimeout {
                                sender: self.our_address,
                                hashlock: self.hashlock,
                                echo: [0u8; 32],
                                signature: Vec::new(),
                            }),
                        )
                        .await;
                    return Err(TransferError::Timeout);
                }
            }
        }
    }

    async fn await_secret_request(&mut self, hops_remaining: usize) -> AwaitOutcome {
        let deadline = self.timeout_per_hop * hops_remaining.max(1) as u32;
        loop {
            tokio::select! {
                message = self.inbox.recv() => {
                    match message {
                        Some(Message::SecretRequest(request)) if request.hashlock == self.hashlock => {
                            return AwaitOutcome::SecretRequested;
                        }
                        Some(Message::CancelTransfer(cancel)) if cancel.hashlock == self.hashlock => {
                            return AwaitOutcome::Cancelled;
                        }
                        Some(_) => continue,
                        None => return AwaitOutcome::TimedOut,
                    }
                }
                _ = sleep(deadline) => return AwaitOutcome::TimedOut,
            }
        }
    }

    async fn reveal_secret(&mut self, next_hop: Address) -> Outcome {
        self.env
            .send(
                next_hop,
                Message::Secret(SecretMessage { sender: self.our_address, secret: self.secret, signature: Vec::new() }),
            )
            .await?;
        self.env.register_secret(self.asset_id, next_hop, self.secret);
        Ok(())
    }
}
