//! AFK coin accrual sessions.
//!
//! One scheduler task owns the whole session registry and a time-ordered
//! queue of next-fire deadlines, so N online accounts cost one timer, not
//! N. The registry is keyed by email and is the mechanism that prevents
//! double-accrual for one identity across simultaneous connections.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::error::LedgerError;
use crate::ledger::service::LedgerService;

/// Server-to-client message on the accrual push channel.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PushMessage {
    /// Seconds left until the next coin.
    Count { amount: u64 },
    /// A coin was credited.
    Coin,
}

enum Command {
    Open {
        email: String,
        push: mpsc::UnboundedSender<PushMessage>,
        reply: oneshot::Sender<Result<(), LedgerError>>,
    },
    Close {
        email: String,
    },
}

/// Handle to the scheduler task. Cloneable; the task runs until every
/// handle is dropped.
#[derive(Clone)]
pub struct SessionManager {
    cmd_tx: mpsc::Sender<Command>,
}

impl SessionManager {
    pub fn spawn(ledger: Arc<LedgerService>, interval_secs: u64) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let scheduler = Scheduler {
            ledger,
            interval: interval_secs.max(1),
            cmd_rx,
            sessions: HashMap::new(),
            queue: BinaryHeap::new(),
            next_generation: 0,
        };
        tokio::spawn(scheduler.run());
        Self { cmd_tx }
    }

    /// Register an accrual session. Rejected with `ALREADY_ACTIVE` when a
    /// session for this email is already live.
    pub async fn open_session(
        &self,
        email: &str,
        push: mpsc::UnboundedSender<PushMessage>,
    ) -> Result<(), LedgerError> {
        let (reply, response) = oneshot::channel();
        self.cmd_tx
            .send(Command::Open { email: email.to_string(), push, reply })
            .await
            .expect("accrual scheduler task is gone");
        response.await.expect("accrual scheduler task is gone")
    }

    /// Drop the session and cancel its future ticks. An in-flight credit
    /// write is allowed to complete.
    pub async fn close_session(&self, email: &str) {
        let _ = self.cmd_tx.send(Command::Close { email: email.to_string() }).await;
    }
}

struct Session {
    remaining: u64,
    push: mpsc::UnboundedSender<PushMessage>,
    generation: u64,
}

/// Heap entry; ordered by deadline so the earliest fires first.
#[derive(PartialEq, Eq)]
struct Deadline {
    at: Instant,
    generation: u64,
    email: String,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.at, self.generation).cmp(&(other.at, other.generation))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

struct Scheduler {
    ledger: Arc<LedgerService>,
    interval: u64,
    cmd_rx: mpsc::Receiver<Command>,
    sessions: HashMap<String, Session>,
    queue: BinaryHeap<Reverse<Deadline>>,
    next_generation: u64,
}

impl Scheduler {
    async fn run(mut self) {
        info!("Accrual scheduler started (interval: {}s)", self.interval);
        loop {
            let next_fire = self.queue.peek().map(|Reverse(d)| d.at);
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Open { email, push, reply }) => {
                        let _ = reply.send(self.open(email, push));
                    }
                    Some(Command::Close { email }) => {
                        if self.sessions.remove(&email).is_some() {
                            debug!("Accrual session closed for {}", email);
                        }
                    }
                    // Every handle dropped; process is shutting down.
                    None => break,
                },
                _ = sleep_until(next_fire.unwrap_or_else(Instant::now)), if next_fire.is_some() => {
                    self.fire_due().await;
                }
            }
        }
    }

    fn open(
        &mut self,
        email: String,
        push: mpsc::UnboundedSender<PushMessage>,
    ) -> Result<(), LedgerError> {
        if self.sessions.contains_key(&email) {
            return Err(LedgerError::AlreadyActive);
        }
        let generation = self.next_generation;
        self.next_generation += 1;
        self.sessions.insert(
            email.clone(),
            Session { remaining: self.interval, push, generation },
        );
        self.queue.push(Reverse(Deadline {
            at: Instant::now() + Duration::from_secs(1),
            generation,
            email,
        }));
        Ok(())
    }

    async fn fire_due(&mut self) {
        let now = Instant::now();
        while let Some(Reverse(head)) = self.queue.peek() {
            if head.at > now {
                break;
            }
            let Reverse(due) = self.queue.pop().expect("peeked entry is gone");
            self.tick(due).await;
        }
    }

    async fn tick(&mut self, due: Deadline) {
        let ledger = self.ledger.clone();
        let interval = self.interval;

        let session = match self.sessions.get_mut(&due.email) {
            Some(session) if session.generation == due.generation => session,
            // Closed (or closed and reopened) since this deadline was
            // queued; the stale entry just falls out of the heap.
            _ => return,
        };

        session.remaining = session.remaining.saturating_sub(1);
        let mut earned = false;
        if session.remaining == 0 {
            session.remaining = interval;
            match ledger.credit_coins(&due.email, 1).await {
                Ok(_) => earned = true,
                Err(err) => {
                    // Session-local failure: this session dies, the
                    // scheduler and every other session keep running.
                    warn!("Closing accrual session for {}: {}", due.email, err);
                    self.sessions.remove(&due.email);
                    return;
                }
            }
        }

        if earned && session.push.send(PushMessage::Coin).is_err() {
            self.sessions.remove(&due.email);
            return;
        }
        let amount = session.remaining;
        if session.push.send(PushMessage::Count { amount }).is_err() {
            self.sessions.remove(&due.email);
            return;
        }

        self.queue.push(Reverse(Deadline {
            at: due.at + Duration::from_secs(1),
            generation: due.generation,
            email: due.email,
        }));
    }
}
