//! Hierarchy synchronizer.
//!
//! # Responsibility
//! - Own refresh cycles: flat pull + tree pull, then publish the new view.
//! - Turn remote `Created`/`Moved`/`Edited` events into coalesced refreshes.
//! - Expose read-only projections (tree, flat map, loading flag).
//!
//! # Invariants
//! - At most one refresh pass runs at a time. Requests arriving mid-flight
//!   bump the requested generation; the running leader performs exactly one
//!   more pass covering all of them.
//! - `refresh()` returns only after a pass covering its request published.
//! - Leadership is released when the leading future is dropped, so an
//!   aborted or timed-out pass never wedges later refreshes.
//! - The view is replaced wholesale after each pass.
//! - No timeout: if the ledger never answers, `is_loading` stays true.

use crate::model::node::NodeId;
use crate::remote::{QueryInterface, RemoteEvent, RemoteEventKind, Subscription};
use crate::store::node_store::NodeStore;
use crate::store::tree_builder::{DisplayTree, TreeBuilder};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

/// Callback invoked after every completed refresh pass.
pub type ChangeObserver = Arc<dyn Fn(&SyncSnapshot) + Send + Sync>;

/// Errors from synchronizer setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// `subscribe` needs a tokio runtime to host the event worker.
    NoRuntime,
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoRuntime => write!(f, "event subscription requires a running tokio runtime"),
        }
    }
}

impl Error for SyncError {}

/// View published by one refresh pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSnapshot {
    /// Requested generation this pass satisfied.
    pub generation: u64,
    pub nodes: NodeStore,
    pub tree: Option<DisplayTree>,
}

/// Result of one `refresh()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This caller led the refresh and ran `passes` passes.
    Completed { generation: u64, passes: u32 },
    /// Another leader's pass covered this request and has published.
    Coalesced,
}

#[derive(Debug, Default, Clone, Copy)]
struct GuardState {
    requested: u64,
    completed: u64,
    running: bool,
}

/// Single-flight guard keyed by a monotonic generation counter.
///
/// State lives in a watch channel so coalesced callers can wait for the
/// generation they requested.
#[derive(Debug)]
struct RefreshGuard {
    state: watch::Sender<GuardState>,
}

impl Default for RefreshGuard {
    fn default() -> Self {
        Self {
            state: watch::Sender::new(GuardState::default()),
        }
    }
}

impl RefreshGuard {
    fn request(&self) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.requested += 1;
            generation = state.requested;
        });
        generation
    }

    /// Claims leadership when work is outstanding and nobody runs it.
    fn try_lead(&self) -> Option<u64> {
        let mut lead = None;
        self.state.send_if_modified(|state| {
            if state.running || state.requested <= state.completed {
                return false;
            }
            state.running = true;
            lead = Some(state.requested);
            true
        });
        lead
    }

    /// Records a finished pass; returns the next generation if more arrived.
    fn finish_pass(&self, generation: u64) -> Option<u64> {
        let mut next = None;
        self.state.send_modify(|state| {
            state.completed = generation;
            if state.requested > generation {
                next = Some(state.requested);
            } else {
                state.running = false;
            }
        });
        next
    }

    /// Drops leadership without finishing; returns whether work is outstanding.
    fn release(&self) -> bool {
        let mut outstanding = false;
        self.state.send_modify(|state| {
            state.running = false;
            outstanding = state.requested > state.completed;
        });
        outstanding
    }

    /// Waits until `generation` is covered (`true`) or leadership lapses
    /// with the request still uncovered (`false`).
    async fn wait_covered(&self, generation: u64) -> bool {
        let mut updates = self.state.subscribe();
        loop {
            let state = *updates.borrow_and_update();
            if state.completed >= generation {
                return true;
            }
            if !state.running {
                return false;
            }
            if updates.changed().await.is_err() {
                return true;
            }
        }
    }

    fn is_running(&self) -> bool {
        self.state.borrow().running
    }
}

/// Leadership of one `run_pending` call; releases the guard if dropped early.
struct Leadership<'a> {
    sync: &'a Synchronizer,
    armed: bool,
}

impl Leadership<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Leadership<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let outstanding = self.sync.guard.release();
        warn!("event=refresh_pass module=sync status=abandoned outstanding={outstanding}");
        if outstanding {
            self.sync.signal.notify_one();
        }
    }
}

#[derive(Debug, Default)]
struct ViewState {
    nodes: NodeStore,
    tree: Option<DisplayTree>,
    generation: u64,
    passes: u64,
}

#[derive(Default)]
struct ObserverTable {
    next_key: u64,
    observers: Vec<(u64, ChangeObserver)>,
}

/// Owns the local hierarchy view and its refresh cycles.
pub struct Synchronizer {
    query: Arc<dyn QueryInterface>,
    builder: TreeBuilder,
    guard: RefreshGuard,
    view: Mutex<ViewState>,
    observers: Mutex<ObserverTable>,
    signal: Arc<Notify>,
}

impl Synchronizer {
    pub fn new(query: Arc<dyn QueryInterface>, builder: TreeBuilder) -> Self {
        Self {
            query,
            builder,
            guard: RefreshGuard::default(),
            view: Mutex::new(ViewState::default()),
            observers: Mutex::new(ObserverTable::default()),
            signal: Arc::new(Notify::new()),
        }
    }

    /// Pulls the hierarchy and replaces the local view.
    ///
    /// When a refresh is already running this waits for the leader's pass
    /// covering this request and returns `Coalesced`. If that leader is
    /// dropped first, this caller takes over.
    pub async fn refresh(&self) -> RefreshOutcome {
        let generation = self.guard.request();
        loop {
            if let Some(outcome) = self.run_pending().await {
                return outcome;
            }
            debug!("event=refresh module=sync status=coalesced generation={generation}");
            if self.guard.wait_covered(generation).await {
                return RefreshOutcome::Coalesced;
            }
        }
    }

    /// Marks the view stale and wakes the event worker.
    pub fn schedule_refresh(&self) {
        self.guard.request();
        self.signal.notify_one();
    }

    /// Runs passes while work is outstanding; `None` if another leader runs.
    async fn run_pending(&self) -> Option<RefreshOutcome> {
        let mut generation = self.guard.try_lead()?;
        let leadership = Leadership {
            sync: self,
            armed: true,
        };

        let mut passes = 0u32;
        loop {
            debug!("event=refresh_pass module=sync status=start generation={generation}");
            let query = self.query.as_ref();
            let (flat, tree) = futures::join!(NodeStore::pull(query), self.builder.pull(query));
            passes += 1;

            info!(
                "event=refresh_pass module=sync status=ok generation={} nodes={} pruned={} tree_nodes={}",
                generation,
                flat.store.len(),
                flat.pruned.len(),
                tree.as_ref().map_or(0, DisplayTree::node_count)
            );

            let snapshot = SyncSnapshot {
                generation,
                nodes: flat.store,
                tree,
            };
            {
                let mut view = lock(&self.view);
                view.nodes = snapshot.nodes.clone();
                view.tree = snapshot.tree.clone();
                view.generation = generation;
                view.passes += 1;
            }
            self.notify_observers(&snapshot);

            match self.guard.finish_pass(generation) {
                Some(next) => generation = next,
                None => break,
            }
        }

        leadership.disarm();
        Some(RefreshOutcome::Completed { generation, passes })
    }

    /// Subscribes to remote mutation events and registers `on_change`.
    ///
    /// Fails with `SyncError::NoRuntime` outside a tokio runtime. The
    /// returned handle stops the event worker and unregisters every handler
    /// when dropped.
    pub fn subscribe(
        self: &Arc<Self>,
        on_change: ChangeObserver,
    ) -> Result<SyncSubscription, SyncError> {
        let runtime = Handle::try_current().map_err(|_| SyncError::NoRuntime)?;
        let observer_key = {
            let mut table = lock(&self.observers);
            let key = table.next_key;
            table.next_key += 1;
            table.observers.push((key, on_change));
            key
        };

        let remote: Vec<Subscription> = RemoteEventKind::ALL
            .iter()
            .map(|kind| {
                let weak = Arc::downgrade(self);
                self.query.subscribe(
                    *kind,
                    Arc::new(move |event: &RemoteEvent| {
                        if let Some(sync) = weak.upgrade() {
                            debug!(
                                "event=remote_event module=sync status=scheduled kind={} node_id={}",
                                event.kind.as_str(),
                                event.node_id.map_or_else(|| "-".to_string(), |id| id.to_string())
                            );
                            sync.schedule_refresh();
                        }
                    }),
                )
            })
            .collect();

        let worker = runtime.spawn(refresh_worker(Arc::downgrade(self), Arc::clone(&self.signal)));
        info!("event=sync_subscribe module=sync status=ok");

        Ok(SyncSubscription {
            sync: Arc::downgrade(self),
            observer_key,
            remote,
            worker: Some(worker),
        })
    }

    pub fn current_tree(&self) -> Option<DisplayTree> {
        lock(&self.view).tree.clone()
    }

    pub fn flat_node_map(&self) -> NodeStore {
        lock(&self.view).nodes.clone()
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let view = lock(&self.view);
        SyncSnapshot {
            generation: view.generation,
            nodes: view.nodes.clone(),
            tree: view.tree.clone(),
        }
    }

    /// True while a refresh pass is running.
    pub fn is_loading(&self) -> bool {
        self.guard.is_running()
    }

    /// Generation satisfied by the latest published view.
    pub fn generation(&self) -> u64 {
        lock(&self.view).generation
    }

    /// Number of refresh passes completed since creation.
    pub fn completed_passes(&self) -> u64 {
        lock(&self.view).passes
    }

    /// Label of one circle in the current view.
    pub fn label_of(&self, id: NodeId) -> Option<String> {
        lock(&self.view).nodes.get(id).map(|node| node.label.clone())
    }

    fn notify_observers(&self, snapshot: &SyncSnapshot) {
        let observers: Vec<ChangeObserver> = lock(&self.observers)
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in observers {
            observer(snapshot);
        }
    }

    fn remove_observer(&self, key: u64) {
        lock(&self.observers)
            .observers
            .retain(|(entry_key, _)| *entry_key != key);
    }
}

async fn refresh_worker(sync: Weak<Synchronizer>, signal: Arc<Notify>) {
    loop {
        signal.notified().await;
        let Some(sync) = sync.upgrade() else {
            break;
        };
        sync.run_pending().await;
    }
}

/// Live event subscription of one synchronizer.
pub struct SyncSubscription {
    sync: Weak<Synchronizer>,
    observer_key: u64,
    remote: Vec<Subscription>,
    worker: Option<JoinHandle<()>>,
}

impl SyncSubscription {
    pub fn dispose(self) {
        drop(self);
    }

    /// Number of remote event registrations held.
    pub fn remote_registrations(&self) -> usize {
        self.remote.len()
    }
}

impl Drop for SyncSubscription {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.remote.clear();
        if let Some(sync) = self.sync.upgrade() {
            sync.remove_observer(self.observer_key);
        }
        debug!("event=sync_unsubscribe module=sync status=ok");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
