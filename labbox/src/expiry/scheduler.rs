//! Delay-queue scheduler firing one callback per lease.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::time::{DelayQueue, delay_queue};

/// Callback invoked with the key of an elapsed lease.
pub type ExpiryCallback<K> = Arc<dyn Fn(K) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Lease {
    deadline: Instant,
    generation: u64,
}

enum Command<K> {
    Set {
        key: K,
        deadline: Instant,
        generation: u64,
    },
    Cancel {
        key: K,
    },
}

/// Keyed lease timers.
///
/// A dedicated task owns a [`DelayQueue`]; callers talk to it over a channel
/// and read lease state from a shared map. Guarantees:
///
/// - each `set` fires the callback at most once, after its TTL
/// - a replaced or cancelled lease never fires
/// - callbacks run on their own spawned task, never on the caller
///
/// Must be created inside a tokio runtime.
pub struct ExpiryScheduler<K> {
    leases: Arc<Mutex<HashMap<K, Lease>>>,
    tx: mpsc::UnboundedSender<Command<K>>,
    next_generation: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<K> ExpiryScheduler<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    pub fn new<F, Fut>(callback: F) -> Self
    where
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let callback: ExpiryCallback<K> = Arc::new(move |key| Box::pin(callback(key)));
        let leases = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_queue(rx, Arc::clone(&leases), callback));

        Self {
            leases,
            tx,
            next_generation: AtomicU64::new(0),
            task: Mutex::new(Some(task)),
        }
    }

    /// Install or replace the lease for `key`. Replacing resets the timer.
    pub fn set(&self, key: K, ttl: Duration) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + ttl;

        // Map update and send happen under one lock so the queue task sees
        // commands in the same order as the map.
        let mut leases = self.leases.lock();
        leases.insert(
            key.clone(),
            Lease {
                deadline,
                generation,
            },
        );
        if self
            .tx
            .send(Command::Set {
                key,
                deadline,
                generation,
            })
            .is_err()
        {
            tracing::warn!("Expiry scheduler stopped, lease will not fire");
        }
    }

    /// Time left on the lease for `key`, if one is pending.
    pub fn get(&self, key: &K) -> Option<Duration> {
        self.leases
            .lock()
            .get(key)
            .map(|lease| lease.deadline.saturating_duration_since(Instant::now()))
    }

    /// Drop the lease for `key`. Returns whether one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        let mut leases = self.leases.lock();
        let removed = leases.remove(key).is_some();
        if removed {
            let _ = self.tx.send(Command::Cancel { key: key.clone() });
        }
        removed
    }

    /// Number of pending leases.
    pub fn len(&self) -> usize {
        self.leases.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the queue task. Pending leases are discarded without firing.
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.leases.lock().clear();
    }
}

impl<K> Debug for ExpiryScheduler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryScheduler")
            .field("pending", &self.leases.lock().len())
            .finish()
    }
}

async fn run_queue<K>(
    mut rx: mpsc::UnboundedReceiver<Command<K>>,
    leases: Arc<Mutex<HashMap<K, Lease>>>,
    callback: ExpiryCallback<K>,
) where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    let mut queue: DelayQueue<(K, u64)> = DelayQueue::new();
    let mut queued: HashMap<K, delay_queue::Key> = HashMap::new();

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Set { key, deadline, generation }) => {
                    if let Some(old) = queued.remove(&key) {
                        queue.remove(&old);
                    }
                    let queue_key = queue.insert_at((key.clone(), generation), deadline);
                    queued.insert(key, queue_key);
                }
                Some(Command::Cancel { key }) => {
                    if let Some(old) = queued.remove(&key) {
                        queue.remove(&old);
                    }
                }
                None => break,
            },
            Some(expired) = queue.next(), if !queue.is_empty() => {
                let (key, generation) = expired.into_inner();
                queued.remove(&key);

                let current = {
                    let mut leases = leases.lock();
                    let current = leases.get(&key).is_some_and(|l| l.generation == generation);
                    if current {
                        leases.remove(&key);
                    }
                    current
                };
                if current {
                    tracing::debug!(key = ?key, "Lease expired");
                    tokio::spawn((callback)(key));
                }
            }
        }
    }

    tracing::debug!("Expiry queue stopped");
}
