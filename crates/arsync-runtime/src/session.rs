//! AR sync session
//!
//! One `Session` owns the channel, the domain clients, the update queue and
//! the live scene registry. The engine calls [`Session::tick`] once per frame
//! (or lets [`Session::spawn_ticker`] do it); everything network-bound runs on
//! the tokio runtime the session was created on.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use arsync_core::{
    ArError, ArResult, Assignment, HandSample, ObjectId, PointCloud, Scenario, Transform,
};
use arsync_state::{
    prototype_preview, AssetFetcher, AssetStats, ReconciliationResult, Reconciler,
    ResolvedPrototype,
};
use arsync_transport::{Channel, ConnectionState, Connector};
use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clients::{
    ClientContext, HandTrackingClient, MeshClient, ObjectClient, PointCloudClient, RobotClient,
    SelectionClient,
};
use crate::observer::SceneBuffer;
use crate::{EngineObserver, ObserverList, RobotEnvelope, SessionConfig};

/// Session counters
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    pub ticks: u64,
    pub applied: u64,
    pub deleted: u64,
    pub pruned: u64,
    pub dropped: u64,
    pub robot_events: u64,
    /// Messages from replaced channels, discarded before reaching the engine
    pub stray_messages: u64,
    pub channel_changes: u64,
    pub resubscriptions: u64,
    pub assets: AssetStats,
    pub last_tick_duration: Duration,
}

/// What one tick did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub reconciliation: ReconciliationResult,
    pub robot_events: u32,
    pub stray_robot_events: u32,
}

pub struct Session {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    handle: Handle,
    ctx: ClientContext,

    objects: Arc<ObjectClient>,
    meshes: MeshClient,
    selection: SelectionClient,
    robot: Arc<RobotClient>,
    hands: Arc<HandTrackingClient>,
    point_cloud: PointCloudClient,

    channel: RwLock<Option<Channel>>,
    /// Last target asked for, successful or still in progress
    requested: Mutex<Option<String>>,
    change_lock: tokio::sync::Mutex<()>,
    changing: AtomicBool,
    failed: AtomicBool,
    synced: AtomicBool,
    watcher: Mutex<Option<JoinHandle<()>>>,

    robot_rx: Mutex<mpsc::Receiver<RobotEnvelope>>,
    reconciler: Mutex<Reconciler>,
    /// Held from reconciliation until observers saw the result, so scene
    /// changes reach them in reconciler order
    scene_lock: Mutex<()>,
    observers: RwLock<ObserverList>,
    stats: Mutex<SessionStats>,
    resubscriptions: Arc<AtomicU64>,
}

impl Session {
    /// Create a session on the current tokio runtime
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> ArResult<Self> {
        config.validate()?;
        let handle = Handle::try_current().map_err(|e| ArError::NoRuntime(e.to_string()))?;

        let (robot_tx, robot_rx) = mpsc::channel(config.event_buffer);
        let ctx = ClientContext::new(robot_tx);

        Ok(Session {
            objects: Arc::new(ObjectClient::new(ctx.clone())),
            meshes: MeshClient::new(ctx.clone(), handle.clone()),
            selection: SelectionClient::new(),
            robot: Arc::new(RobotClient::new(ctx.clone())),
            hands: Arc::new(HandTrackingClient::new()),
            point_cloud: PointCloudClient::new(),
            config,
            connector,
            handle,
            ctx,
            channel: RwLock::new(None),
            requested: Mutex::new(None),
            change_lock: tokio::sync::Mutex::new(()),
            changing: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            synced: AtomicBool::new(false),
            watcher: Mutex::new(None),
            robot_rx: Mutex::new(robot_rx),
            reconciler: Mutex::new(Reconciler::new()),
            scene_lock: Mutex::new(()),
            observers: RwLock::new(ObserverList::new()),
            stats: Mutex::new(SessionStats::default()),
            resubscriptions: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn add_observer(&self, observer: Arc<dyn EngineObserver>) {
        self.observers.write().add(observer);
    }

    /// Connect to the configured target
    pub async fn connect(&self) -> ArResult<bool> {
        let target = self.config.target.clone();
        self.change_channel(&target).await
    }

    // ========================================================================
    // CHANNEL
    // ========================================================================

    /// Switch to another server
    ///
    /// Returns `Ok(false)` without doing anything when `target` is the last
    /// requested one. On failure the previous channel stays in place.
    pub async fn change_channel(&self, target: &str) -> ArResult<bool> {
        let _change = self.change_lock.lock().await;
        {
            let mut requested = self.requested.lock();
            if requested.as_deref() == Some(target) {
                tracing::debug!(server = target, "channel already requested");
                return Ok(false);
            }
            *requested = Some(target.to_string());
        }
        self.rebuild(target).await?;
        Ok(true)
    }

    /// Rebuild the channel to the last requested target
    pub async fn reconnect(&self) -> ArResult<()> {
        let _change = self.change_lock.lock().await;
        let target = self
            .requested
            .lock()
            .clone()
            .unwrap_or_else(|| self.config.target.clone());
        *self.requested.lock() = Some(target.clone());
        self.rebuild(&target).await
    }

    async fn rebuild(&self, target: &str) -> ArResult<()> {
        self.changing.store(true, Ordering::SeqCst);
        let next = self.ctx.generations.current().next();
        let constructed = Channel::construct(
            self.connector.as_ref(),
            target,
            next,
            self.config.connect_timeout,
            self.config.retries,
        )
        .await;

        let channel = match constructed {
            Ok(channel) => channel,
            Err(e) => {
                self.failed.store(true, Ordering::SeqCst);
                self.changing.store(false, Ordering::SeqCst);
                let current = self.channel.read().as_ref().map(|c| c.target().to_string());
                tracing::warn!(server = target, error = %e, kept = ?current, "channel change failed");
                *self.requested.lock() = current;
                return Err(e);
            }
        };

        self.install(channel).await;
        self.failed.store(false, Ordering::SeqCst);
        self.changing.store(false, Ordering::SeqCst);

        let synced = self.sync_and_subscribe(false).await;
        let observers = self.observers.read().clone();
        observers.channel_changed(target);
        synced
    }

    /// Swap in a new channel: new generation, rebound clients, empty state
    async fn install(&self, channel: Channel) {
        let generation = channel.generation();
        let endpoint = Arc::clone(channel.endpoint());

        {
            let _gate = self.ctx.lock_gate();
            self.ctx.generations.advance();
            self.ctx.queue.clear();
            self.ctx.assets.clear();
        }

        self.objects.bind(endpoint.objects(), generation);
        self.meshes.bind(endpoint.meshes(), generation);
        self.selection.bind(endpoint.selection());
        self.robot.bind(endpoint.robot(), generation);
        self.hands.bind(endpoint.hand_tracking()).await;
        self.point_cloud.bind(endpoint.point_cloud());

        {
            let mut rx = self.robot_rx.lock();
            while rx.try_recv().is_ok() {}
        }
        {
            let _scene = self.scene_lock.lock();
            let mut scene = SceneBuffer::default();
            self.reconciler.lock().clear(&mut scene);
            let mut observers = self.observers.read().clone();
            scene.replay(&mut observers);
        }

        self.synced.store(false, Ordering::SeqCst);
        self.start_watcher(&channel);
        tracing::info!(server = channel.target(), ?generation, "channel installed");
        *self.channel.write() = Some(channel);
        self.stats.lock().channel_changes += 1;
    }

    /// Resubscribe lost streams whenever the connection becomes ready again
    fn start_watcher(&self, channel: &Channel) {
        let mut state = channel.watch_state();
        let objects = Arc::clone(&self.objects);
        let robot = Arc::clone(&self.robot);
        let resubscriptions = Arc::clone(&self.resubscriptions);
        let server = channel.target().to_string();

        let task = self.handle.spawn(async move {
            while state.changed().await.is_ok() {
                let current = *state.borrow_and_update();
                tracing::info!(%server, state = %current, "connection state changed");
                if current.is_ready() {
                    resubscribe(&objects, &robot, &resubscriptions);
                }
            }
        });

        if let Some(previous) = self.watcher.lock().replace(task) {
            previous.abort();
        }
    }

    pub fn current_target(&self) -> Option<String> {
        self.channel.read().as_ref().map(|c| c.target().to_string())
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.changing.load(Ordering::SeqCst) {
            return ConnectionState::Connecting;
        }
        match self.channel.read().as_ref() {
            Some(channel) => channel.state(),
            None if self.failed.load(Ordering::SeqCst) => ConnectionState::Failed,
            None => ConnectionState::Disconnected,
        }
    }

    // ========================================================================
    // SUBSCRIPTIONS
    // ========================================================================

    /// Sync objects and start every subscription
    ///
    /// Runs once per channel unless `forced`. Subscriptions already running
    /// are left alone.
    pub async fn sync_and_subscribe(&self, forced: bool) -> ArResult<()> {
        if self.channel.read().is_none() {
            return Err(ArError::NoChannel);
        }
        if !forced && self.synced.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.objects.sync()?;
        self.objects.subscribe()?;
        self.robot.subscribe()?;
        if let Err(e) = self.hands.start().await {
            tracing::warn!(error = %e, "hand tracking upload unavailable");
        }

        self.synced.store(true, Ordering::SeqCst);
        tracing::debug!(forced, "synced and subscribed");
        Ok(())
    }

    /// The AR anchor moved: re-express hand samples and resync objects
    pub async fn anchor_updated(&self, anchor: &Transform) -> ArResult<()> {
        self.hands.set_anchor(anchor);
        self.sync_and_subscribe(true).await
    }

    // ========================================================================
    // TICK
    // ========================================================================

    /// Apply everything collected since the last tick
    ///
    /// Never waits on the network. Observers are called after the live
    /// registry is unlocked; they must not call `tick` themselves.
    pub fn tick(&self) -> TickReport {
        let started = Instant::now();
        let _scene = self.scene_lock.lock();
        let mut observers = self.observers.read().clone();

        let live: Vec<ObjectId> = self.reconciler.lock().ids().cloned().collect();
        let mut scene = SceneBuffer::with_liveness(&observers, &live);

        let batch = self.ctx.queue.drain();
        let reconciliation = self.reconciler.lock().reconcile(
            batch,
            &self.ctx.assets,
            &self.meshes as &dyn AssetFetcher,
            &mut scene,
        );
        scene.replay(&mut observers);

        let current = self.ctx.generations.current();
        let mut report = TickReport {
            reconciliation,
            ..Default::default()
        };
        let mut events = Vec::new();
        {
            let mut rx = self.robot_rx.lock();
            while let Ok(envelope) = rx.try_recv() {
                if envelope.generation != current {
                    report.stray_robot_events += 1;
                    tracing::debug!(generation = ?envelope.generation, "discarding robot event from a replaced channel");
                    continue;
                }
                events.push(envelope.event);
            }
        }
        for event in &events {
            observers.dispatch_robot(event);
            report.robot_events += 1;
        }

        let mut stats = self.stats.lock();
        stats.ticks += 1;
        stats.applied += u64::from(reconciliation.applied);
        stats.deleted += u64::from(reconciliation.deleted);
        stats.pruned += u64::from(reconciliation.pruned);
        stats.dropped += u64::from(reconciliation.dropped);
        stats.robot_events += u64::from(report.robot_events);
        stats.stray_messages += u64::from(report.stray_robot_events);
        stats.last_tick_duration = started.elapsed();
        report
    }

    /// Tick on the session runtime every `tick_interval`
    ///
    /// The task ends once the session is dropped.
    pub fn spawn_ticker(self: &Arc<Self>) -> JoinHandle<()> {
        let session: Weak<Session> = Arc::downgrade(self);
        let period = self.config.tick_interval;

        self.handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(session) = session.upgrade() else {
                    break;
                };
                session.tick();
            }
        })
    }

    // ========================================================================
    // REQUESTS
    // ========================================================================

    /// Select a live object
    ///
    /// Returns `Ok(false)` for unknown objects and objects without a
    /// petri-net id.
    pub async fn select_object(&self, id: &str, assignment: Assignment) -> ArResult<bool> {
        let target = {
            let reconciler = self.reconciler.lock();
            reconciler
                .instance(id)
                .filter(|instance| instance.is_selectable())
                .map(|instance| (instance.id().clone(), instance.pn_id()))
        };
        let Some((id, pn_id)) = target else {
            tracing::debug!(id, "object not selectable");
            return Ok(false);
        };

        self.selection.send_selection(&id, pn_id, assignment).await?;
        Ok(true)
    }

    pub async fn scenario(&self) -> ArResult<Scenario> {
        self.selection.scenario().await
    }

    pub async fn register_point_cloud(&self, cloud: &PointCloud) -> ArResult<Option<Transform>> {
        self.point_cloud.register(cloud).await
    }

    pub async fn send_hand_sample(&self, sample: &HandSample) -> ArResult<()> {
        self.hands.send_sample(sample).await
    }

    /// Preview of a prototype for local spawning
    ///
    /// `None` while the prototype is not cached; a fetch is started then.
    pub fn spawn_prototype(&self, name: &str) -> Option<(Transform, ResolvedPrototype)> {
        if let Some(preview) = prototype_preview(name, &self.ctx.assets) {
            return Some(preview);
        }
        let claimed = self.ctx.assets.begin_fetch([name]);
        if !claimed.is_empty() {
            self.meshes.request(claimed);
        }
        None
    }

    // ========================================================================
    // INSPECTION
    // ========================================================================

    pub fn stats(&self) -> SessionStats {
        let mut stats = self.stats.lock().clone();
        stats.stray_messages += self.ctx.stray_messages();
        stats.resubscriptions = self.resubscriptions.load(Ordering::Relaxed);
        stats.assets = self.ctx.assets.stats();
        stats
    }

    /// Sets and deletes waiting for the next tick
    pub fn pending_updates(&self) -> (usize, usize) {
        (self.ctx.queue.pending_sets(), self.ctx.queue.pending_deletes())
    }

    pub fn contains_object(&self, id: &str) -> bool {
        self.reconciler.lock().contains(id)
    }

    pub fn object_count(&self) -> usize {
        self.reconciler.lock().len()
    }

    pub fn active_workers(&self) -> usize {
        self.objects.active_workers() + self.robot.active_workers()
    }

    pub fn robot_overflowed(&self) -> u64 {
        self.robot.overflowed()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.abort();
        }
    }
}

fn resubscribe(objects: &ObjectClient, robot: &RobotClient, counter: &AtomicU64) {
    if objects.take_disconnected() {
        let result = objects
            .sync()
            .and_then(|synced| Ok(objects.subscribe()? || synced));
        match result {
            Ok(true) => {
                counter.fetch_add(1, Ordering::Relaxed);
                tracing::info!("object streams resubscribed");
            }
            Ok(false) => tracing::debug!("object streams already running"),
            Err(e) => {
                objects.mark_disconnected();
                tracing::warn!(error = %e, "object resubscription failed");
            }
        }
    }
    if robot.take_disconnected() {
        match robot.subscribe() {
            Ok(true) => {
                counter.fetch_add(1, Ordering::Relaxed);
                tracing::info!("robot streams resubscribed");
            }
            Ok(false) => tracing::debug!("robot streams already running"),
            Err(e) => {
                robot.mark_disconnected();
                tracing::warn!(error = %e, "robot resubscription failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use arsync_transport::Endpoint;

    struct Nowhere;

    #[async_trait]
    impl Connector for Nowhere {
        async fn connect(&self, target: &str) -> ArResult<Arc<dyn Endpoint>> {
            Err(ArError::TransportError(format!("{} unreachable", target)))
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            connect_timeout: Duration::from_millis(50),
            ..Default::default()
        }
    }

    #[test]
    fn test_new_requires_runtime() {
        let err = Session::new(config(), Arc::new(Nowhere)).err().unwrap();
        assert!(matches!(err, ArError::NoRuntime(_)));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = SessionConfig {
            event_buffer: 0,
            ..config()
        };
        assert!(matches!(
            Session::new(config, Arc::new(Nowhere)),
            Err(ArError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_change_keeps_state() {
        let session = Session::new(config(), Arc::new(Nowhere)).unwrap();

        let err = session.change_channel("A").await.unwrap_err();
        assert!(matches!(err, ArError::ConnectionFailed { .. }));
        assert_eq!(session.connection_state(), ConnectionState::Failed);
        assert_eq!(session.current_target(), None);

        // the failed target is not remembered, so asking again retries
        assert!(session.change_channel("A").await.is_err());
    }

    #[tokio::test]
    async fn test_requests_without_channel() {
        let session = Session::new(config(), Arc::new(Nowhere)).unwrap();
        assert_eq!(session.sync_and_subscribe(false).await.unwrap_err(), ArError::NoChannel);
        assert_eq!(session.scenario().await.unwrap_err(), ArError::NoChannel);
        assert!(!session.select_object("X1", Assignment::Robot).await.unwrap());
        assert!(session.spawn_prototype("bowl").is_none());
    }

    #[tokio::test]
    async fn test_failed_resubscription_keeps_flag() {
        let (tx, _rx) = mpsc::channel(4);
        let ctx = ClientContext::new(tx);
        let objects = ObjectClient::new(ctx.clone());
        let robot = RobotClient::new(ctx);
        let counter = AtomicU64::new(0);

        objects.mark_disconnected();
        robot.mark_disconnected();
        resubscribe(&objects, &robot, &counter);

        // unbound clients cannot restart, so the next ready retries
        assert_eq!(counter.load(Ordering::Relaxed), 0);
        assert!(objects.is_disconnected());
        assert!(robot.is_disconnected());
    }

    #[tokio::test]
    async fn test_empty_tick() {
        let session = Session::new(config(), Arc::new(Nowhere)).unwrap();
        let report = session.tick();
        assert!(report.reconciliation.is_noop());
        assert_eq!(session.stats().ticks, 1);
    }
}
