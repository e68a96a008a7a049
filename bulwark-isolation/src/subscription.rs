//! Isolated subscriptions.
//!
//! A subscription binds a scoped change-feed to an application callback.
//! Every record of every snapshot is re-verified before delivery, so a store
//! that serves a foreign record (query bug, stale index) cannot leak it.
//!
//! The admin-aware variant returns its [`SubscriptionHandle`] before admin
//! status is known. The handle's phase is guarded by a mutex and the feed
//! is only opened while holding it in a non-cancelled phase: cancelling
//! during resolution guarantees the feed is never opened.

use crate::IsolationLayer;
use crate::admin::Caller;
use crate::query::create_isolated_query;
use crate::validate::check_owner;
use bulwark_core::config::OnViolation;
use bulwark_core::document::{Document, validate_collection_path};
use bulwark_core::error::{IsolationError, Result};
use bulwark_core::principal::Uid;
use bulwark_core::query::Query;
use bulwark_core::store::{ChangeFeed, DocumentStore};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Callback = Box<dyn FnMut(Result<Vec<Document>>) + Send + 'static>;

/// Visibility applied to a live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeMode {
    /// Only records whose owner field equals the principal.
    Owner,
    /// The whole collection (admin override).
    Unscoped,
}

/// Lifecycle of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionPhase {
    /// Admin status is still being resolved; no feed exists yet.
    Resolving,
    /// The feed is open.
    Live(ScopeMode),
    /// Cancelled by the application.
    Cancelled,
    /// Ended by the store closing the feed or by a terminating violation.
    Ended,
}

struct Shared {
    phase: Mutex<SubscriptionPhase>,
    cancel: watch::Sender<bool>,
}

impl Shared {
    fn new(phase: SubscriptionPhase) -> (Arc<Self>, watch::Receiver<bool>) {
        let (cancel, cancelled) = watch::channel(false);
        let shared = Arc::new(Self {
            phase: Mutex::new(phase),
            cancel,
        });
        (shared, cancelled)
    }

    /// Opens the feed unless the subscription was cancelled.
    fn open(
        &self,
        store: &dyn DocumentStore,
        query: &Query,
        mode: ScopeMode,
    ) -> Option<Result<ChangeFeed>> {
        let mut phase = self.phase.lock();
        if *phase == SubscriptionPhase::Cancelled {
            return None;
        }
        match store.watch(query) {
            Ok(feed) => {
                *phase = SubscriptionPhase::Live(mode);
                Some(Ok(feed))
            }
            Err(e) => {
                *phase = SubscriptionPhase::Ended;
                Some(Err(e))
            }
        }
    }

    fn finish(&self) {
        let mut phase = self.phase.lock();
        if *phase != SubscriptionPhase::Cancelled {
            *phase = SubscriptionPhase::Ended;
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.phase.lock() == SubscriptionPhase::Cancelled
    }
}

/// Handle to a live subscription.
///
/// Dropping the handle cancels the subscription.
pub struct SubscriptionHandle {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SubscriptionHandle {
    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> SubscriptionPhase {
        *self.shared.phase.lock()
    }

    /// Returns true while the subscription is resolving or live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self.phase(),
            SubscriptionPhase::Resolving | SubscriptionPhase::Live(_)
        )
    }

    /// Cancels the subscription.
    ///
    /// A snapshot already being delivered may still complete; nothing is
    /// delivered after it. Idempotent.
    pub fn cancel(&self) {
        {
            let mut phase = self.shared.phase.lock();
            if matches!(
                *phase,
                SubscriptionPhase::Resolving | SubscriptionPhase::Live(_)
            ) {
                debug!(from = ?*phase, "Cancelling subscription");
                *phase = SubscriptionPhase::Cancelled;
            }
        }
        self.shared.cancel.send_replace(true);
    }

    /// Waits for the subscription task to end.
    ///
    /// Only returns once the subscription is cancelled or ended.
    pub async fn join(self) {
        let task = self.task.lock().take();
        if let Some(task) = task
            && let Err(e) = task.await
        {
            warn!(error = %e, "Subscription task failed");
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

async fn wait_cancelled(cancelled: &mut watch::Receiver<bool>) {
    loop {
        if *cancelled.borrow_and_update() {
            return;
        }
        if cancelled.changed().await.is_err() {
            return;
        }
    }
}

/// What a subscription may see and how it reacts to a mismatch.
struct Scope {
    layer: IsolationLayer,
    collection: String,
    uid: Uid,
    owner_field: String,
    on_violation: OnViolation,
}

impl Scope {
    fn query(&self, mode: ScopeMode) -> Query {
        match mode {
            ScopeMode::Owner => {
                create_isolated_query(&self.collection, &self.uid, &self.owner_field)
            }
            ScopeMode::Unscoped => Query::collection(self.collection.as_str()),
        }
    }

    /// Re-verifies every record of a snapshot.
    async fn screen(&self, documents: Vec<Document>, mode: ScopeMode) -> Result<Vec<Document>> {
        if mode == ScopeMode::Unscoped {
            return Ok(documents);
        }
        let mut visible = Vec::with_capacity(documents.len());
        for document in documents {
            match check_owner(&document, &self.uid, &self.owner_field) {
                Ok(()) => visible.push(document),
                Err(e) => {
                    let e = self
                        .layer
                        .reject(&self.uid, &document.path().to_string(), e)
                        .await;
                    if self.on_violation == OnViolation::Terminate {
                        return Err(e);
                    }
                }
            }
        }
        Ok(visible)
    }
}

struct Worker {
    scope: Scope,
    shared: Arc<Shared>,
    cancelled: watch::Receiver<bool>,
    callback: Callback,
}

impl Worker {
    /// Invokes the callback unless the subscription was cancelled.
    fn deliver(&mut self, result: Result<Vec<Document>>) -> bool {
        if self.shared.is_cancelled() {
            return false;
        }
        (self.callback)(result);
        true
    }

    async fn resolve_then_run(mut self, caller: Caller) {
        let resolved = tokio::select! {
            biased;
            () = wait_cancelled(&mut self.cancelled) => {
                debug!(uid = %self.scope.uid, "Cancelled during admin resolution");
                return;
            }
            resolved = self.scope.layer.is_admin(caller) => resolved,
        };
        let mode = match resolved {
            Ok(true) => ScopeMode::Unscoped,
            Ok(false) => ScopeMode::Owner,
            Err(e) => {
                self.shared.finish();
                self.deliver(Err(e));
                return;
            }
        };
        let query = self.scope.query(mode);
        match self.shared.open(self.scope.layer.store().as_ref(), &query, mode) {
            None => debug!(uid = %self.scope.uid, "Cancelled before feed opened"),
            Some(Err(e)) => {
                self.deliver(Err(e));
            }
            Some(Ok(feed)) => self.run(feed, mode).await,
        }
    }

    async fn run(mut self, mut feed: ChangeFeed, mode: ScopeMode) {
        info!(
            uid = %self.scope.uid,
            collection = %self.scope.collection,
            ?mode,
            "Subscription live"
        );
        loop {
            let next = tokio::select! {
                biased;
                () = wait_cancelled(&mut self.cancelled) => break,
                next = feed.next() => next,
            };
            let Some(snapshot) = next else {
                debug!(uid = %self.scope.uid, "Change-feed closed by store");
                self.shared.finish();
                break;
            };
            let screened = match snapshot {
                Ok(snapshot) => self.scope.screen(snapshot.documents, mode).await,
                Err(e) => Err(e),
            };
            let terminal = screened.is_err();
            if terminal {
                self.shared.finish();
            }
            if !self.deliver(screened) || terminal {
                break;
            }
        }
        debug!(uid = %self.scope.uid, "Subscription detached");
    }
}

/// Builder for a subscription.
#[must_use]
pub struct SubscriptionRequest<'a> {
    layer: &'a IsolationLayer,
    collection: String,
    caller: Caller,
    owner_field: Option<String>,
    on_violation: OnViolation,
}

impl SubscriptionRequest<'_> {
    /// Sets the owner field. Defaults to the configured default.
    pub fn owner_field(mut self, owner_field: impl Into<String>) -> Self {
        self.owner_field = Some(owner_field.into());
        self
    }

    /// Sets the violation policy. Defaults to the configured policy.
    pub fn on_violation(mut self, policy: OnViolation) -> Self {
        self.on_violation = policy;
        self
    }

    fn into_worker<F>(self, callback: F) -> Result<(Worker, Caller)>
    where
        F: FnMut(Result<Vec<Document>>) + Send + 'static,
    {
        validate_collection_path(&self.collection)?;
        let owner_field = self
            .layer
            .owner_field(self.owner_field.as_deref())
            .to_string();
        let (shared, cancelled) = Shared::new(SubscriptionPhase::Resolving);
        let worker = Worker {
            scope: Scope {
                layer: self.layer.clone(),
                collection: self.collection,
                uid: self.caller.uid().clone(),
                owner_field,
                on_violation: self.on_violation,
            },
            shared,
            cancelled,
            callback: Box::new(callback),
        };
        Ok((worker, self.caller))
    }

    fn start(worker: Worker, mode: ScopeMode) -> Result<SubscriptionHandle> {
        let query = worker.scope.query(mode);
        let shared = Arc::clone(&worker.shared);
        let Some(feed) = shared.open(worker.scope.layer.store().as_ref(), &query, mode) else {
            return Err(IsolationError::store("watch", "subscription cancelled before start"));
        };
        let task = tokio::spawn(worker.run(feed?, mode));
        Ok(SubscriptionHandle {
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    /// Opens an owner-scoped subscription.
    ///
    /// Must be called within a Tokio runtime.
    pub fn scoped<F>(self, callback: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(Result<Vec<Document>>) + Send + 'static,
    {
        let (worker, _) = self.into_worker(callback)?;
        Self::start(worker, ScopeMode::Owner)
    }

    /// Opens an admin-aware subscription without waiting for admin
    /// resolution.
    ///
    /// The handle is returned immediately in the `Resolving` phase.
    /// Resolution failures are delivered to the callback. Must be called
    /// within a Tokio runtime.
    pub fn admin_aware<F>(self, callback: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(Result<Vec<Document>>) + Send + 'static,
    {
        let (worker, caller) = self.into_worker(callback)?;
        let shared = Arc::clone(&worker.shared);
        let task = tokio::spawn(worker.resolve_then_run(caller));
        Ok(SubscriptionHandle {
            shared,
            task: Mutex::new(Some(task)),
        })
    }

    /// Resolves admin status, then opens the matching subscription.
    ///
    /// The returned handle is already live.
    pub async fn admin_aware_resolved<F>(self, callback: F) -> Result<SubscriptionHandle>
    where
        F: FnMut(Result<Vec<Document>>) + Send + 'static,
    {
        let (worker, caller) = self.into_worker(callback)?;
        let mode = if worker.scope.layer.is_admin(caller).await? {
            ScopeMode::Unscoped
        } else {
            ScopeMode::Owner
        };
        Self::start(worker, mode)
    }
}

impl IsolationLayer {
    /// Starts building a subscription to `collection` on behalf of `caller`.
    pub fn subscription(
        &self,
        collection: &str,
        caller: impl Into<Caller>,
    ) -> SubscriptionRequest<'_> {
        SubscriptionRequest {
            layer: self,
            collection: collection.to_string(),
            caller: caller.into(),
            owner_field: None,
            on_violation: self.config().subscriptions.on_violation,
        }
    }

    /// Subscribes to the documents of `collection` owned by `uid`.
    pub fn subscribe_to_isolated_collection<F>(
        &self,
        collection: &str,
        uid: &Uid,
        owner_field: Option<&str>,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: FnMut(Result<Vec<Document>>) + Send + 'static,
    {
        let mut request = self.subscription(collection, uid);
        if let Some(field) = owner_field {
            request = request.owner_field(field);
        }
        request.scoped(callback)
    }

    /// Subscribes to `collection` with admin override, returning the handle
    /// before admin status is resolved.
    pub fn subscribe_with_admin_access<F>(
        &self,
        collection: &str,
        caller: impl Into<Caller>,
        owner_field: Option<&str>,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: FnMut(Result<Vec<Document>>) + Send + 'static,
    {
        let mut request = self.subscription(collection, caller);
        if let Some(field) = owner_field {
            request = request.owner_field(field);
        }
        request.admin_aware(callback)
    }

    /// Subscribes to `collection` with admin override, resolving admin
    /// status before returning.
    pub async fn subscribe_with_admin_access_resolved<F>(
        &self,
        collection: &str,
        caller: impl Into<Caller>,
        owner_field: Option<&str>,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: FnMut(Result<Vec<Document>>) + Send + 'static,
    {
        let mut request = self.subscription(collection, caller);
        if let Some(field) = owner_field {
            request = request.owner_field(field);
        }
        request.admin_aware_resolved(callback).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bulwark_core::document::{DocumentPath, Fields};
    use bulwark_core::error::ErrorKind;
    use bulwark_core::store::MemoryStore;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{Semaphore, mpsc};

    type Deliveries = mpsc::UnboundedReceiver<Result<Vec<Document>>>;

    fn uid(raw: &str) -> Uid {
        Uid::parse(Some(raw)).unwrap()
    }

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn collector() -> (impl FnMut(Result<Vec<Document>>) + Send + 'static, Deliveries) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            move |result| {
                let _ = tx.send(result);
            },
            rx,
        )
    }

    async fn next(rx: &mut Deliveries) -> Result<Vec<Document>> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("delivery timed out")
            .expect("callback dropped")
    }

    async fn assert_silent(rx: &mut Deliveries) {
        let outcome = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
        assert!(!matches!(outcome, Ok(Some(_))), "unexpected delivery");
    }

    fn ids(documents: &[Document]) -> Vec<&str> {
        documents.iter().map(Document::id).collect()
    }

    /// Store wrapper that can leak foreign records and gate profile reads.
    struct TestStore {
        inner: MemoryStore,
        leak: bool,
        gate: Option<Semaphore>,
        watches: AtomicUsize,
    }

    impl TestStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                leak: false,
                gate: None,
                watches: AtomicUsize::new(0),
            }
        }

        fn leaky(mut self) -> Self {
            self.leak = true;
            self
        }

        fn gated(mut self) -> Self {
            self.gate = Some(Semaphore::new(0));
            self
        }

        fn open(&self) {
            if let Some(gate) = &self.gate {
                gate.add_permits(Semaphore::MAX_PERMITS / 2);
            }
        }
    }

    #[async_trait]
    impl DocumentStore for TestStore {
        async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
            if let Some(gate) = &self.gate
                && path.collection() == "users"
            {
                let _permit = gate
                    .acquire()
                    .await
                    .map_err(|e| IsolationError::store("get", e.to_string()))?;
            }
            self.inner.get(path).await
        }
        async fn query(&self, query: &Query) -> Result<Vec<Document>> {
            self.inner.query(query).await
        }
        async fn set(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
            self.inner.set(path, fields).await
        }
        async fn update(&self, path: &DocumentPath, fields: Fields) -> Result<()> {
            self.inner.update(path, fields).await
        }
        async fn delete(&self, path: &DocumentPath) -> Result<()> {
            self.inner.delete(path).await
        }
        async fn add(&self, collection: &str, fields: Fields) -> Result<String> {
            self.inner.add(collection, fields).await
        }
        fn watch(&self, query: &Query) -> Result<ChangeFeed> {
            self.watches.fetch_add(1, Ordering::SeqCst);
            if self.leak {
                self.inner.watch(&query.without_filters())
            } else {
                self.inner.watch(query)
            }
        }
    }

    fn seeded() -> MemoryStore {
        MemoryStore::from_fixture(&json!({
            "users/admin1": { "role": "admin" },
            "projects/p1": { "founderId": "alice" },
            "projects/p2": { "founderId": "bob" },
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_scoped_subscription_delivers_own_records() {
        let store = Arc::new(TestStore::new(seeded()));
        let layer = IsolationLayer::with_defaults(store.clone());
        let (callback, mut rx) = collector();

        let handle = layer
            .subscribe_to_isolated_collection(
                "projects",
                &uid("alice"),
                Some("founderId"),
                callback,
            )
            .unwrap();
        assert_eq!(handle.phase(), SubscriptionPhase::Live(ScopeMode::Owner));
        assert_eq!(ids(&next(&mut rx).await.unwrap()), ["p1"]);

        let path = DocumentPath::parse("projects/p3").unwrap();
        store
            .set(&path, fields(json!({ "founderId": "alice" })))
            .await
            .unwrap();
        assert_eq!(ids(&next(&mut rx).await.unwrap()), ["p1", "p3"]);
    }

    #[tokio::test]
    async fn test_injected_foreign_record_is_never_delivered() {
        let store = Arc::new(TestStore::new(seeded()).leaky());
        let layer = IsolationLayer::with_defaults(store.clone());
        let (callback, mut rx) = collector();

        let _handle = layer
            .subscribe_to_isolated_collection(
                "projects",
                &uid("alice"),
                Some("founderId"),
                callback,
            )
            .unwrap();
        assert_eq!(ids(&next(&mut rx).await.unwrap()), ["p1"]);

        let path = DocumentPath::parse("projects/p9").unwrap();
        store
            .set(&path, fields(json!({ "founderId": "mallory" })))
            .await
            .unwrap();
        assert_eq!(ids(&next(&mut rx).await.unwrap()), ["p1"]);

        // p2 in both snapshots, p9 in the second
        assert_eq!(store.inner.collection_len("security_logs"), 3);
    }

    #[tokio::test]
    async fn test_terminate_policy_ends_feed() {
        let store = Arc::new(TestStore::new(seeded()).leaky());
        let layer = IsolationLayer::with_defaults(store.clone());
        let (callback, mut rx) = collector();

        let handle = layer
            .subscription("projects", &uid("alice"))
            .owner_field("founderId")
            .on_violation(OnViolation::Terminate)
            .scoped(callback)
            .unwrap();

        let err = next(&mut rx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OwnershipViolation);
        assert_silent(&mut rx).await;
        assert_eq!(handle.phase(), SubscriptionPhase::Ended);
        handle.join().await;
        assert_eq!(store.inner.watcher_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_detaches_feed() {
        let store = Arc::new(TestStore::new(seeded()));
        let layer = IsolationLayer::with_defaults(store.clone());
        let (callback, mut rx) = collector();

        let handle = layer
            .subscribe_to_isolated_collection(
                "projects",
                &uid("alice"),
                Some("founderId"),
                callback,
            )
            .unwrap();
        next(&mut rx).await.unwrap();

        handle.cancel();
        assert_eq!(handle.phase(), SubscriptionPhase::Cancelled);
        assert!(!handle.is_active());
        handle.join().await;
        assert_eq!(store.inner.watcher_count(), 0);

        let path = DocumentPath::parse("projects/p4").unwrap();
        store
            .set(&path, fields(json!({ "founderId": "alice" })))
            .await
            .unwrap();
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn test_drop_cancels() {
        let store = Arc::new(TestStore::new(seeded()));
        let layer = IsolationLayer::with_defaults(store.clone());
        let (callback, mut rx) = collector();

        let handle = layer
            .subscribe_to_isolated_collection(
                "projects",
                &uid("alice"),
                Some("founderId"),
                callback,
            )
            .unwrap();
        next(&mut rx).await.unwrap();
        drop(handle);

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.inner.watcher_count() > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_admin_aware_modes() {
        let store = Arc::new(TestStore::new(seeded()));
        let layer = IsolationLayer::with_defaults(store.clone());

        let (callback, mut rx) = collector();
        let _admin = layer
            .subscribe_with_admin_access("projects", &uid("admin1"), Some("founderId"), callback)
            .unwrap();
        assert_eq!(ids(&next(&mut rx).await.unwrap()), ["p1", "p2"]);

        let (callback, mut rx) = collector();
        let _alice = layer
            .subscribe_with_admin_access("projects", &uid("alice"), Some("founderId"), callback)
            .unwrap();
        assert_eq!(ids(&next(&mut rx).await.unwrap()), ["p1"]);
    }

    #[tokio::test]
    async fn test_cancel_during_resolution_never_opens_feed() {
        let store = Arc::new(TestStore::new(seeded()).gated());
        let layer = IsolationLayer::with_defaults(store.clone());
        let (callback, mut rx) = collector();

        let handle = layer
            .subscribe_with_admin_access("projects", &uid("admin1"), Some("founderId"), callback)
            .unwrap();
        assert_eq!(handle.phase(), SubscriptionPhase::Resolving);

        handle.cancel();
        store.open();
        let shared = Arc::clone(&handle.shared);
        handle.join().await;

        assert_eq!(*shared.phase.lock(), SubscriptionPhase::Cancelled);
        assert_eq!(store.watches.load(Ordering::SeqCst), 0);
        assert_eq!(store.inner.watcher_count(), 0);
        assert_silent(&mut rx).await;
    }

    #[tokio::test]
    async fn test_resolved_variant_is_live_on_return() {
        let store = Arc::new(TestStore::new(seeded()));
        let layer = IsolationLayer::with_defaults(store.clone());
        let (callback, mut rx) = collector();

        let handle = layer
            .subscribe_with_admin_access_resolved("projects", &uid("admin1"), None, callback)
            .await
            .unwrap();
        assert_eq!(handle.phase(), SubscriptionPhase::Live(ScopeMode::Unscoped));
        assert_eq!(next(&mut rx).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_collection_rejected_up_front() {
        let layer = IsolationLayer::with_defaults(Arc::new(seeded()));
        let (callback, _rx) = collector();
        assert!(
            layer
                .subscribe_with_admin_access("projects/p1", &uid("alice"), None, callback)
                .is_err()
        );
    }
}
