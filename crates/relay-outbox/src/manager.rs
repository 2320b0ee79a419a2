//! Outbox manager: one actor per queue key.
//!
//! Each queue key is owned by a task that pulls commands off an mpsc mailbox
//! and runs them one at a time against its [`OutboxQueue`]. Callers talk to it
//! through a cloneable [`QueueHandle`]. After a successful enqueue the actor
//! posts a drain request to its own mailbox, so the enqueue caller gets its
//! reply without waiting for delivery.
//!
//! Deliveries never run inside the command loop. The actor reads the batch,
//! hands it to a spawned pass task and keeps serving enqueues and status reads
//! while the downstream answers. When the pass task finishes, the actor
//! writes its outcomes. At most one pass per key is in flight; drains asked
//! for in the meantime run once it is done.

use crate::queue::{DrainStart, PassOutcomes};
use crate::{
    Attributes, Deliverer, DrainReport, EventId, OutboxError, OutboxQueue, OutboxResult,
    QueueKey, QueueSettings, QueueStatus, QueueStore, WakeTimer,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Mailbox capacity per queue actor.
pub const MAILBOX_CAPACITY: usize = 256;

enum Command {
    Enqueue {
        payload: Vec<u8>,
        attributes: Attributes,
        reply: oneshot::Sender<OutboxResult<EventId>>,
    },
    Drain {
        reply: oneshot::Sender<OutboxResult<DrainReport>>,
    },
    Status {
        reply: oneshot::Sender<OutboxResult<QueueStatus>>,
    },
    /// Fire-and-forget drain; errors are logged.
    RequestDrain,
}

/// Handle to a running queue actor.
#[derive(Clone)]
pub struct QueueHandle {
    key: QueueKey,
    tx: mpsc::Sender<Command>,
    drain_pending: Arc<AtomicBool>,
}

impl QueueHandle {
    fn spawn(queue: OutboxQueue) -> Self {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let drain_pending = Arc::new(AtomicBool::new(false));
        let key = queue.key().clone();

        let actor = QueueActor::new(queue, rx, tx.downgrade(), drain_pending.clone());
        tokio::spawn(actor.run());

        Self {
            key,
            tx,
            drain_pending,
        }
    }

    pub fn key(&self) -> &QueueKey {
        &self.key
    }

    /// Durably append an event. A drain pass is requested afterwards.
    pub async fn enqueue(&self, payload: Vec<u8>, attributes: Attributes) -> OutboxResult<EventId> {
        let (reply, rx) = oneshot::channel();
        self.call(
            Command::Enqueue {
                payload,
                attributes,
                reply,
            },
            rx,
        )
        .await
    }

    /// Run a drain pass and wait for its report.
    pub async fn drain(&self) -> OutboxResult<DrainReport> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Drain { reply }, rx).await
    }

    pub async fn status(&self) -> OutboxResult<QueueStatus> {
        let (reply, rx) = oneshot::channel();
        self.call(Command::Status { reply }, rx).await
    }

    /// Ask for a drain without waiting for it.
    ///
    /// Requests made while one is already waiting in the mailbox are folded
    /// into it.
    pub fn request_drain(&self) {
        request_drain(&self.key, &self.tx, &self.drain_pending);
    }

    async fn call<T>(
        &self,
        command: Command,
        rx: oneshot::Receiver<OutboxResult<T>>,
    ) -> OutboxResult<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| OutboxError::ActorStopped(self.key.to_string()))?;
        rx.await
            .map_err(|_| OutboxError::ActorStopped(self.key.to_string()))?
    }
}

fn request_drain(key: &QueueKey, tx: &mpsc::Sender<Command>, pending: &AtomicBool) {
    if pending.swap(true, Ordering::AcqRel) {
        debug!(queue = %key, "Drain already pending");
        return;
    }
    if let Err(e) = tx.try_send(Command::RequestDrain) {
        pending.store(false, Ordering::Release);
        warn!(queue = %key, error = %e, "Could not request drain");
    }
}

type DrainReply = oneshot::Sender<OutboxResult<DrainReport>>;

/// A pass whose batch is out with the deliverer.
struct PassInFlight {
    task: JoinHandle<PassOutcomes>,
    waiters: Vec<DrainReply>,
}

struct QueueActor {
    queue: OutboxQueue,
    mailbox: mpsc::Receiver<Command>,
    self_tx: mpsc::WeakSender<Command>,
    drain_pending: Arc<AtomicBool>,
    in_flight: Option<PassInFlight>,
    /// Drain callers waiting for the pass after the one in flight.
    next_waiters: Vec<DrainReply>,
    /// A background drain was asked for while a pass was in flight.
    rerun: bool,
}

impl QueueActor {
    fn new(
        queue: OutboxQueue,
        mailbox: mpsc::Receiver<Command>,
        self_tx: mpsc::WeakSender<Command>,
        drain_pending: Arc<AtomicBool>,
    ) -> Self {
        Self {
            queue,
            mailbox,
            self_tx,
            drain_pending,
            in_flight: None,
            next_waiters: Vec::new(),
            rerun: false,
        }
    }

    async fn run(mut self) {
        debug!(queue = %self.queue.key(), "Queue actor started");

        loop {
            tokio::select! {
                command = self.mailbox.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                joined = pass_finished(&mut self.in_flight) => {
                    self.complete_pass(joined).await;
                }
            }
        }

        // Outcomes of a pass already sent downstream must still be written.
        while let Some(pass) = self.in_flight.as_mut() {
            let joined = (&mut pass.task).await;
            self.complete_pass(joined).await;
        }

        debug!(queue = %self.queue.key(), "Queue actor stopped");
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Enqueue {
                payload,
                attributes,
                reply,
            } => {
                let result = self.queue.enqueue(payload, attributes).await;
                let accepted = result.is_ok();
                let _ = reply.send(result);
                if accepted {
                    self.request_own_drain();
                }
            }
            Command::Drain { reply } => {
                if self.in_flight.is_some() {
                    self.next_waiters.push(reply);
                } else {
                    self.start_pass(vec![reply]).await;
                }
            }
            Command::Status { reply } => {
                let _ = reply.send(self.queue.status().await);
            }
            Command::RequestDrain => {
                self.drain_pending.store(false, Ordering::Release);
                if self.in_flight.is_some() {
                    self.rerun = true;
                } else {
                    self.start_pass(Vec::new()).await;
                }
            }
        }
    }

    /// Take a batch and send it out, or answer at once when there is nothing
    /// to deliver.
    async fn start_pass(&mut self, waiters: Vec<DrainReply>) {
        self.rerun = false;
        match self.queue.start_drain().await {
            Ok(DrainStart::Deliver(batch)) => {
                self.in_flight = Some(PassInFlight {
                    task: tokio::spawn(batch.deliver()),
                    waiters,
                });
            }
            Ok(DrainStart::Finished(report)) => self.reply(waiters, Ok(report)),
            Err(e) => self.reply(waiters, Err(e)),
        }
    }

    async fn complete_pass(&mut self, joined: Result<PassOutcomes, JoinError>) {
        let Some(pass) = self.in_flight.take() else {
            return;
        };

        let outcomes = joined.unwrap_or_else(|e| {
            error!(queue = %self.queue.key(), error = %e, "Delivery task aborted");
            PassOutcomes::default()
        });
        let result = self.queue.finish_drain(&outcomes).await;
        self.reply(pass.waiters, result);

        if self.rerun || !self.next_waiters.is_empty() {
            let waiters = std::mem::take(&mut self.next_waiters);
            self.start_pass(waiters).await;
        }
    }

    fn reply(&self, mut waiters: Vec<DrainReply>, result: OutboxResult<DrainReport>) {
        if let Err(e) = &result {
            if waiters.is_empty() {
                warn!(queue = %self.queue.key(), error = %e, "Background drain failed");
            }
        }
        // Errors are not cloneable; every waiter but the last gets the message.
        let last = waiters.pop();
        for waiter in waiters {
            let shared = match &result {
                Ok(report) => Ok(report.clone()),
                Err(e) => Err(OutboxError::Storage(e.to_string())),
            };
            let _ = waiter.send(shared);
        }
        if let Some(waiter) = last {
            let _ = waiter.send(result);
        }
    }

    fn request_own_drain(&self) {
        if let Some(tx) = self.self_tx.upgrade() {
            request_drain(self.queue.key(), &tx, &self.drain_pending);
        }
    }
}

async fn pass_finished(in_flight: &mut Option<PassInFlight>) -> Result<PassOutcomes, JoinError> {
    match in_flight {
        Some(pass) => (&mut pass.task).await,
        None => std::future::pending().await,
    }
}

/// Owns the queue actors and the collaborators they share.
pub struct OutboxManager {
    store: Arc<dyn QueueStore>,
    deliverer: Option<Arc<dyn Deliverer>>,
    timer: Arc<dyn WakeTimer>,
    settings: QueueSettings,
    queues: RwLock<HashMap<QueueKey, QueueHandle>>,
}

impl OutboxManager {
    pub fn new(
        store: Arc<dyn QueueStore>,
        deliverer: Option<Arc<dyn Deliverer>>,
        timer: Arc<dyn WakeTimer>,
        settings: QueueSettings,
    ) -> Self {
        if deliverer.is_none() {
            warn!("No destination configured; events will be queued but not delivered");
        }
        Self {
            store,
            deliverer,
            timer,
            settings,
            queues: RwLock::new(HashMap::new()),
        }
    }

    /// Get the handle for `key`, starting its actor on first use.
    pub async fn queue(&self, key: &QueueKey) -> QueueHandle {
        {
            let queues = self.queues.read().await;
            if let Some(handle) = queues.get(key) {
                return handle.clone();
            }
        }

        let mut queues = self.queues.write().await;
        if let Some(handle) = queues.get(key) {
            return handle.clone();
        }

        let handle = QueueHandle::spawn(self.engine(key));
        queues.insert(key.clone(), handle.clone());
        info!(queue = %key, "Created queue actor");
        handle
    }

    pub async fn enqueue(
        &self,
        key: &QueueKey,
        payload: Vec<u8>,
        attributes: Attributes,
    ) -> OutboxResult<EventId> {
        self.queue(key).await.enqueue(payload, attributes).await
    }

    /// Run a drain pass on `key` and wait for its report.
    ///
    /// A queue with no actor and nothing stored is answered without starting
    /// one.
    pub async fn drain(&self, key: &QueueKey) -> OutboxResult<DrainReport> {
        match self.active_queue(key).await? {
            Some(handle) => handle.drain().await,
            None if self.deliverer.is_none() => {
                warn!(queue = %key, "No destination configured, skipping drain");
                Ok(DrainReport::NotConfigured)
            }
            None => Ok(DrainReport::Empty),
        }
    }

    /// Status of `key`. Queues without a running actor are read straight
    /// from the store.
    pub async fn status(&self, key: &QueueKey) -> OutboxResult<QueueStatus> {
        match self.live_queue(key).await {
            Some(handle) => handle.status().await,
            None => self.engine(key).status().await,
        }
    }

    /// Ask for a background drain on `key`. Empty queues without an actor
    /// are skipped.
    pub async fn request_drain(&self, key: &QueueKey) {
        match self.active_queue(key).await {
            Ok(Some(handle)) => handle.request_drain(),
            Ok(None) => debug!(queue = %key, "Nothing queued, drain not requested"),
            Err(e) => warn!(queue = %key, error = %e, "Could not check queue for drain"),
        }
    }

    async fn live_queue(&self, key: &QueueKey) -> Option<QueueHandle> {
        self.queues.read().await.get(key).cloned()
    }

    /// The running actor for `key`, or a new one if the store holds events
    /// for it.
    async fn active_queue(&self, key: &QueueKey) -> OutboxResult<Option<QueueHandle>> {
        if let Some(handle) = self.live_queue(key).await {
            return Ok(Some(handle));
        }
        if self.store.load(key).await?.events.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.queue(key).await))
    }

    /// An engine for `key` over the shared store, deliverer and timer.
    fn engine(&self, key: &QueueKey) -> OutboxQueue {
        OutboxQueue::new(
            key.clone(),
            self.store.clone(),
            self.deliverer.clone(),
            self.timer.clone(),
            self.settings.clone(),
        )
    }

    /// Request a drain on every queue in the store or in memory. Returns how
    /// many queues were asked.
    pub async fn request_drain_all(&self) -> OutboxResult<usize> {
        let keys = self.known_queues().await?;
        for key in &keys {
            self.request_drain(key).await;
        }
        Ok(keys.len())
    }

    /// Drain every known queue and collect the reports.
    pub async fn drain_all(&self) -> OutboxResult<BTreeMap<QueueKey, OutboxResult<DrainReport>>> {
        let mut reports = BTreeMap::new();
        for key in self.known_queues().await? {
            let report = self.drain(&key).await;
            reports.insert(key, report);
        }
        Ok(reports)
    }

    /// Status for every known queue.
    pub async fn get_status(&self) -> OutboxResult<BTreeMap<QueueKey, QueueStatus>> {
        let mut status = BTreeMap::new();
        for key in self.known_queues().await? {
            let queue_status = self.status(&key).await?;
            status.insert(key, queue_status);
        }
        Ok(status)
    }

    /// Number of running queue actors.
    pub async fn queue_count(&self) -> usize {
        self.queues.read().await.len()
    }

    /// Re-arm persisted wakes after a restart.
    ///
    /// Queues with a stored wake get their timer back; non-empty queues
    /// without one get a drain request right away.
    pub async fn recover(&self) -> OutboxResult<usize> {
        let keys = self.store.list_queues().await?;
        let mut recovered = 0;

        for key in &keys {
            match self.store.load_wake(key).await? {
                Some(wake_at) => {
                    self.timer.schedule_at(key, wake_at);
                    recovered += 1;
                }
                None => {
                    let snapshot = self.store.load(key).await?;
                    if !snapshot.events.is_empty() {
                        self.request_drain(key).await;
                        recovered += 1;
                    }
                }
            }
        }

        info!(queues = keys.len(), recovered, "Recovered queue schedules");
        Ok(recovered)
    }

    /// Turn fired wake timers into drain requests until the timer goes away.
    pub async fn run_timer_loop(self: Arc<Self>, mut fired: mpsc::UnboundedReceiver<QueueKey>) {
        while let Some(key) = fired.recv().await {
            debug!(queue = %key, "Wake fired, requesting drain");
            self.request_drain(&key).await;
        }
        debug!("Wake timer channel closed");
    }

    /// Stop all queue actors once their mailboxes are empty.
    pub async fn shutdown(&self) {
        let mut queues = self.queues.write().await;
        let count = queues.len();
        queues.clear();
        info!(queues = count, "Queue actors released");
    }

    async fn known_queues(&self) -> OutboxResult<Vec<QueueKey>> {
        let mut keys: BTreeSet<QueueKey> = self.store.list_queues().await?.into_iter().collect();
        keys.extend(self.queues.read().await.keys().cloned());
        Ok(keys.into_iter().collect())
    }
}
