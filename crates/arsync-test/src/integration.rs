//! End-to-end scenarios
//!
//! A real `Session` against the mock network:
//! - Delete-wins batching across one tick
//! - Channel changes with stale streams still delivering
//! - Resubscription after transport loss
//! - Prototype fetch deduplication
//! - Robot streams, selection, scenario and uploads

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use arsync_core::{JointsSynced, ObjectId, Vec3, VisualChange, VoxelData};
use arsync_runtime::{EngineObserver, RobotStream};
use arsync_state::ObjectVisual;
use arsync_wire::{
    ColorMsg, ColoredBoxMsg, MatrixMsg, ObjectDataMsg, ObjectInstanceBody, ObjectInstanceMsg,
    ObjectInstanceTfMeta, ObbMsg,
};
use parking_lot::Mutex;
use tokio::time::Instant;

// ============================================================================
// MESSAGE BUILDERS
// ============================================================================

/// Prototype-backed instance at `x` along the server's X axis
pub fn object_msg(id: &str, pn_id: i32, prototype: &str, x: f64) -> ObjectInstanceTfMeta {
    let mut data = [0.0; 16];
    data[0] = 1.0;
    data[5] = 1.0;
    data[10] = 1.0;
    data[15] = 1.0;
    data[12] = x;

    ObjectInstanceTfMeta {
        object_instance: Some(ObjectInstanceMsg {
            id: id.to_string(),
            pn_id,
            data: Some(ObjectInstanceBody::Obj(ObjectDataMsg {
                prototype_name: prototype.to_string(),
                transform: Some(MatrixMsg {
                    rows: 4,
                    cols: 4,
                    data: data.to_vec(),
                }),
            })),
        }),
        transformation_meta: None,
    }
}

/// Colored box instance, never needs assets
pub fn box_msg(id: &str, pn_id: i32) -> ObjectInstanceTfMeta {
    ObjectInstanceTfMeta {
        object_instance: Some(ObjectInstanceMsg {
            id: id.to_string(),
            pn_id,
            data: Some(ObjectInstanceBody::Box(ColoredBoxMsg {
                obbox: Some(ObbMsg::default()),
                box_color: Some(ColorMsg { r: 0, g: 255, b: 0, a: 128 }),
            })),
        }),
        transformation_meta: None,
    }
}

// ============================================================================
// RECORDING OBSERVER
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    Instance(ObjectId),
    Deleted(ObjectId),
    Voxels(usize),
    Tcps(usize),
    Joints(usize),
    Visibility(RobotStream, VisualChange),
    ChannelChanged(String),
}

/// Observer recording every callback in order
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SceneEvent>>,
    dead: Mutex<HashSet<String>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SceneEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn has(&self, event: &SceneEvent) -> bool {
        self.events.lock().contains(event)
    }

    /// Events mentioning object `id`
    pub fn object_events(&self, id: &str) -> Vec<SceneEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| match e {
                SceneEvent::Instance(i) | SceneEvent::Deleted(i) => i.as_str() == id,
                _ => false,
            })
            .cloned()
            .collect()
    }

    /// Pretend the engine destroyed `id` on its own
    pub fn kill(&self, id: &str) {
        self.dead.lock().insert(id.to_string());
    }

    fn record(&self, event: SceneEvent) {
        self.events.lock().push(event);
    }
}

impl EngineObserver for RecordingObserver {
    fn on_object_instance(&self, visual: &ObjectVisual) {
        self.record(SceneEvent::Instance(visual.id.clone()));
    }

    fn on_object_deleted(&self, id: &ObjectId) {
        self.record(SceneEvent::Deleted(id.clone()));
    }

    fn on_voxel_update(&self, voxels: &VoxelData) {
        self.record(SceneEvent::Voxels(voxels.indices.len()));
    }

    fn on_tcp_update(&self, tcps: &[Vec3]) {
        self.record(SceneEvent::Tcps(tcps.len()));
    }

    fn on_joint_sync(&self, samples: &[JointsSynced]) {
        self.record(SceneEvent::Joints(samples.len()));
    }

    fn on_visibility_change(&self, stream: RobotStream, change: VisualChange) {
        self.record(SceneEvent::Visibility(stream, change));
    }

    fn on_channel_changed(&self, target: &str) {
        self.record(SceneEvent::ChannelChanged(target.to_string()));
    }

    fn is_alive(&self, id: &ObjectId) -> bool {
        !self.dead.lock().contains(id.as_str())
    }
}

// ============================================================================
// WAITING
// ============================================================================

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Await `future`, failing the test if it takes longer than `timeout`
pub async fn within<T>(timeout: Duration, future: impl Future<Output = T>) -> T {
    match tokio::time::timeout(timeout, future).await {
        Ok(value) => value,
        Err(_) => panic!("operation did not finish within {:?}", timeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockNetwork, MockServer};
    use arsync_core::{Assignment, HandIndex, HandSample, PointCloud, Quat, Scenario, Transform, TrackingStatus};
    use arsync_runtime::{Session, SessionConfig};
    use arsync_transport::{ConnectionState, RpcStatus};
    use arsync_wire::{
        TcpsMsg, TcpsTfMeta, TcpsTransmission, TcpsTransmissionBody, Vertex3d, VoxelTransmission,
        VoxelTransmissionBody, ASSIGNMENT_ROBOT, VISUAL_REVOKED,
    };
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        network: Arc<MockNetwork>,
        a: Arc<MockServer>,
        b: Arc<MockServer>,
        session: Session,
        observer: Arc<RecordingObserver>,
    }

    fn harness() -> Harness {
        let network = MockNetwork::new();
        let a = network.add_server("A");
        let b = network.add_server("B");
        a.add_prototype("bowl", 0.1);
        b.add_prototype("bowl", 0.1);

        let config = SessionConfig {
            target: "A".into(),
            connect_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let session = Session::new(config, network.clone()).unwrap();
        let observer = Arc::new(RecordingObserver::new());
        session.add_observer(observer.clone());

        Harness {
            network,
            a,
            b,
            session,
            observer,
        }
    }

    async fn connected() -> Harness {
        let h = harness();
        assert!(within(WAIT, h.session.connect()).await.unwrap());
        let a = h.a.clone();
        assert!(
            wait_until(WAIT, || a.object_subscribers() == 1
                && a.delete_subscribers() == 1
                && a.robot_subscribers() == 3)
            .await
        );
        h
    }

    /// Tick until `id` is live
    async fn tick_until_live(h: &Harness, id: &str) -> bool {
        wait_until(WAIT, || {
            h.session.tick();
            h.session.contains_object(id)
        })
        .await
    }

    #[tokio::test]
    async fn test_connect_announces_channel() {
        let h = connected().await;
        assert_eq!(h.session.connection_state(), ConnectionState::Ready);
        assert_eq!(h.session.current_target().as_deref(), Some("A"));
        assert!(h.observer.has(&SceneEvent::ChannelChanged("A".into())));
        let a = h.a.clone();
        assert!(wait_until(WAIT, || a.sync_calls() == 1).await);
    }

    #[tokio::test]
    async fn test_delete_wins_within_one_tick() {
        let h = connected().await;

        h.a.push_object(object_msg("X1", 1, "bowl", 1.0));
        h.a.push_object(object_msg("X1", 1, "bowl", 2.0));
        h.a.push_delete("X1");
        let session = &h.session;
        assert!(wait_until(WAIT, || session.pending_updates() == (2, 1)).await);

        let report = h.session.tick();
        assert_eq!(report.reconciliation.superseded, 2);
        assert!(!h.session.contains_object("X1"));
        assert!(h.observer.object_events("X1").is_empty());
    }

    #[tokio::test]
    async fn test_prototype_objects_wait_for_assets() {
        let h = connected().await;

        h.a.push_object(object_msg("X1", 1, "bowl", 1.0));
        assert!(tick_until_live(&h, "X1").await);
        assert_eq!(h.observer.object_events("X1"), vec![SceneEvent::Instance(ObjectId::new("X1"))]);

        h.a.push_delete("X1");
        let session = &h.session;
        assert!(
            wait_until(WAIT, || {
                session.tick();
                !session.contains_object("X1")
            })
            .await
        );
        assert!(h.observer.has(&SceneEvent::Deleted(ObjectId::new("X1"))));
    }

    #[tokio::test]
    async fn test_one_fetch_per_prototype() {
        let h = harness();
        for i in 0..3 {
            h.a.seed_object(object_msg(&format!("X{}", i), 1, "bowl", i as f64));
        }
        within(WAIT, h.session.connect()).await.unwrap();

        for i in 0..3 {
            assert!(tick_until_live(&h, &format!("X{}", i)).await);
        }
        h.a.push_object(object_msg("X9", 1, "bowl", 9.0));
        assert!(tick_until_live(&h, "X9").await);

        assert_eq!(h.a.prototype_fetches("bowl"), 1);
        assert_eq!(h.a.mesh_fetches("bowl_mesh"), 1);
    }

    #[tokio::test]
    async fn test_unknown_prototype_dropped() {
        let h = connected().await;
        h.a.push_object(object_msg("ghost", 1, "unobtainium", 0.0));
        h.a.push_object(box_msg("zone", 0));

        assert!(tick_until_live(&h, "zone").await);
        let session = &h.session;
        assert!(wait_until(WAIT, || {
            session.tick();
            session.stats().dropped == 1
        })
        .await);
        assert!(!h.session.contains_object("ghost"));
    }

    #[tokio::test]
    async fn test_change_channel_clears_everything() {
        let h = connected().await;
        h.a.push_object(object_msg("X1", 1, "bowl", 1.0));
        assert!(tick_until_live(&h, "X1").await);
        assert_eq!(h.session.stats().assets.prototypes, 1);
        h.observer.clear();

        assert!(within(WAIT, h.session.change_channel("B")).await.unwrap());
        assert_eq!(
            h.observer.events(),
            vec![
                SceneEvent::Deleted(ObjectId::new("X1")),
                SceneEvent::ChannelChanged("B".into()),
            ]
        );
        assert_eq!(h.session.object_count(), 0);
        assert_eq!(h.session.stats().assets.prototypes, 0);

        // streams of the old channel keep running until they end on their own
        h.a.push_object(object_msg("X2", 1, "bowl", 2.0));
        h.a.push_tcps(TcpsTransmission {
            data: Some(TcpsTransmissionBody::TcpData(TcpsTfMeta {
                tcps: Some(TcpsMsg {
                    points: vec![Vertex3d::default()],
                }),
                transformation_meta: None,
            })),
        });
        let session = &h.session;
        assert!(wait_until(WAIT, || session.stats().stray_messages >= 2).await);

        for _ in 0..5 {
            h.session.tick();
        }
        assert!(!h.session.contains_object("X2"));
        assert!(h.observer.object_events("X2").is_empty());
        assert!(!h.observer.events().iter().any(|e| matches!(e, SceneEvent::Tcps(_))));

        let b = h.b.clone();
        assert!(wait_until(WAIT, || b.object_subscribers() == 1).await);
        h.b.push_object(object_msg("Y1", 1, "bowl", 0.0));
        assert!(tick_until_live(&h, "Y1").await);
    }

    #[tokio::test]
    async fn test_retarget_guard() {
        let h = connected().await;
        assert!(!h.session.change_channel("A").await.unwrap());
        assert_eq!(h.network.connects(), 1);

        within(WAIT, h.session.reconnect()).await.unwrap();
        assert_eq!(h.network.connects(), 2);
    }

    #[tokio::test]
    async fn test_failed_change_keeps_channel() {
        let h = connected().await;
        h.a.push_object(box_msg("zone", 0));
        assert!(tick_until_live(&h, "zone").await);

        let result = within(Duration::from_secs(5), h.session.change_channel("nowhere")).await;
        assert!(result.is_err());
        assert_eq!(h.session.current_target().as_deref(), Some("A"));
        assert_eq!(h.session.connection_state(), ConnectionState::Ready);
        assert!(h.session.contains_object("zone"));

        // the guard was reset to the channel still in use
        assert!(!h.session.change_channel("A").await.unwrap());
    }

    #[tokio::test]
    async fn test_resubscribe_after_transport_loss() {
        let h = connected().await;
        assert_eq!(h.a.object_subscriptions_opened(), 1);

        h.a.fail_streams(RpcStatus::unknown("connection reset"));
        let session = &h.session;
        assert!(wait_until(WAIT, || session.active_workers() == 0).await);

        h.a.set_state(ConnectionState::Disconnected);
        h.a.set_state(ConnectionState::Ready);

        let a = h.a.clone();
        assert!(
            wait_until(WAIT, || a.object_subscribers() == 1 && a.robot_subscribers() == 3).await
        );
        assert_eq!(h.a.object_subscriptions_opened(), 2);
        assert_eq!(h.session.stats().resubscriptions, 2);

        h.a.push_object(box_msg("zone", 0));
        assert!(tick_until_live(&h, "zone").await);
    }

    #[tokio::test]
    async fn test_clean_end_does_not_resubscribe() {
        let h = connected().await;
        h.a.close_streams();
        let session = &h.session;
        assert!(wait_until(WAIT, || session.active_workers() == 0).await);

        h.a.set_state(ConnectionState::Disconnected);
        h.a.set_state(ConnectionState::Ready);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(h.a.object_subscriptions_opened(), 1);
        assert_eq!(h.session.stats().resubscriptions, 0);
    }

    #[tokio::test]
    async fn test_subscriptions_are_idempotent() {
        let h = connected().await;
        for _ in 0..5 {
            h.session.sync_and_subscribe(true).await.unwrap();
            assert!(h.session.active_workers() <= 6);
        }
        assert_eq!(h.a.object_subscriptions_opened(), 1);
        assert_eq!(h.a.object_subscribers(), 1);
    }

    #[tokio::test]
    async fn test_robot_visibility_and_tcps() {
        let h = connected().await;
        h.a.push_voxels(VoxelTransmission {
            data: Some(VoxelTransmissionBody::StateUpdate(VISUAL_REVOKED)),
        });
        h.a.push_tcps(TcpsTransmission {
            data: Some(TcpsTransmissionBody::TcpData(TcpsTfMeta {
                tcps: Some(TcpsMsg {
                    points: vec![Vertex3d::default(), Vertex3d { x: 1.0, y: 0.0, z: 0.0 }],
                }),
                transformation_meta: None,
            })),
        });

        let session = &h.session;
        let observer = &h.observer;
        assert!(
            wait_until(WAIT, || {
                session.tick();
                observer.has(&SceneEvent::Tcps(2))
                    && observer.has(&SceneEvent::Visibility(RobotStream::Voxels, VisualChange::Revoked))
            })
            .await
        );
    }

    #[tokio::test]
    async fn test_scenario_values() {
        let h = connected().await;
        for (value, expected) in [(1, Scenario::ReserveOnly), (2, Scenario::Mixed), (99, Scenario::Mixed)] {
            h.a.set_scenario(value);
            assert_eq!(h.session.scenario().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_select_object() {
        let h = connected().await;
        h.a.push_object(box_msg("robot_zone", 7));
        h.a.push_object(box_msg("decor", 0));
        assert!(tick_until_live(&h, "robot_zone").await);
        assert!(tick_until_live(&h, "decor").await);

        assert!(h.session.select_object("robot_zone", Assignment::Robot).await.unwrap());
        assert!(!h.session.select_object("decor", Assignment::Robot).await.unwrap());
        assert!(!h.session.select_object("missing", Assignment::Human).await.unwrap());

        let selections = h.a.selections();
        assert_eq!(selections.len(), 1);
        assert_eq!(selections[0].object_id, "robot_zone");
        assert_eq!(selections[0].pn_id, 7);
        assert_eq!(selections[0].assignment, ASSIGNMENT_ROBOT);
    }

    /// Reads the session back from inside scene callbacks
    #[derive(Default)]
    struct Inspector {
        session: Mutex<Option<std::sync::Weak<Session>>>,
        seen: Mutex<Vec<(String, bool, usize)>>,
    }

    impl Inspector {
        fn look(&self, id: &ObjectId) {
            let session = self.session.lock().clone();
            if let Some(session) = session.and_then(|s| s.upgrade()) {
                let entry = (
                    id.as_str().to_string(),
                    session.contains_object(id.as_str()),
                    session.object_count(),
                );
                self.seen.lock().push(entry);
            }
        }
    }

    impl EngineObserver for Inspector {
        fn on_object_instance(&self, visual: &ObjectVisual) {
            self.look(&visual.id);
        }

        fn on_object_deleted(&self, id: &ObjectId) {
            self.look(id);
        }

        fn is_alive(&self, id: &ObjectId) -> bool {
            self.look(id);
            true
        }
    }

    #[tokio::test]
    async fn test_observer_can_query_session() {
        let network = MockNetwork::new();
        let a = network.add_server("A");
        let config = SessionConfig {
            target: "A".into(),
            connect_timeout: Duration::from_millis(200),
            ..Default::default()
        };
        let session = Arc::new(Session::new(config, network.clone()).unwrap());
        let inspector = Arc::new(Inspector::default());
        *inspector.session.lock() = Some(Arc::downgrade(&session));
        session.add_observer(inspector.clone());

        assert!(within(WAIT, session.connect()).await.unwrap());
        let server = a.clone();
        assert!(
            wait_until(WAIT, || server.object_subscribers() == 1
                && server.delete_subscribers() == 1)
            .await
        );

        a.push_object(box_msg("zone", 0));
        assert!(
            wait_until(WAIT, || {
                session.tick();
                session.contains_object("zone")
            })
            .await
        );
        assert!(inspector.seen.lock().contains(&("zone".to_string(), true, 1)));

        a.push_delete("zone");
        assert!(
            wait_until(WAIT, || {
                session.tick();
                !session.contains_object("zone")
            })
            .await
        );
        assert_eq!(inspector.seen.lock().last(), Some(&("zone".to_string(), false, 0)));
    }

    #[tokio::test]
    async fn test_engine_destroyed_object_pruned() {
        let h = connected().await;
        h.a.push_object(box_msg("zone", 0));
        assert!(tick_until_live(&h, "zone").await);

        h.observer.kill("zone");
        let report = h.session.tick();
        assert_eq!(report.reconciliation.pruned, 1);
        assert!(!h.session.contains_object("zone"));
    }

    #[tokio::test]
    async fn test_hand_samples_in_anchor_space() {
        let h = connected().await;
        let anchor = Transform::new(Vec3::new(0.0, 0.0, 1.0), Quat::IDENTITY, Vec3::ONE);
        h.session.anchor_updated(&anchor).await.unwrap();

        let sample = HandSample {
            valid: true,
            hand: HandIndex::Left,
            tracking_status: TrackingStatus::Tracked,
            grip: Transform::new(Vec3::new(0.0, 0.0, 1.5), Quat::IDENTITY, Vec3::ONE),
            aim: Transform::IDENTITY,
            key_positions: vec![],
            key_rotations: vec![],
            key_radii: vec![],
            is_grasped: true,
            time_stamp: chrono::Utc::now(),
        };
        h.session.send_hand_sample(&sample).await.unwrap();

        let uploads = h.a.hand_uploads();
        assert_eq!(uploads.len(), 1);
        let grip = uploads[0].grip_position.unwrap();
        assert!((grip.z - 0.5).abs() < 1e-6);
        assert!(uploads[0].is_grasped);
        // a forced resync reruns the one-shot object sync
        let a = h.a.clone();
        assert!(wait_until(WAIT, || a.sync_calls() == 2).await);
    }

    #[tokio::test]
    async fn test_point_cloud_registration() {
        let h = connected().await;
        let cloud = PointCloud {
            points: vec![Vec3::new(1.0, 1.0, 1.0), Vec3::new(f64::INFINITY, 0.0, 0.0)],
            timestamp: 1_700_000_000.0,
        };

        assert_eq!(h.session.register_point_cloud(&cloud).await.unwrap(), None);

        h.a.set_registration(Some(Transform::new(Vec3::new(0.0, 2.0, 0.0), Quat::IDENTITY, Vec3::ONE)));
        let registration = h.session.register_point_cloud(&cloud).await.unwrap().unwrap();
        assert!(registration.translation.approx_eq(Vec3::new(0.0, 2.0, 0.0), 1e-9));
        assert_eq!(h.a.point_clouds()[0].vertices.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_prototype_preview() {
        let h = connected().await;
        assert!(h.session.spawn_prototype("bowl").is_none());

        let session = &h.session;
        assert!(wait_until(WAIT, || session.spawn_prototype("bowl").is_some()).await);
        let (transform, resolved) = h.session.spawn_prototype("bowl").unwrap();
        assert!(transform.scale.approx_eq(Vec3::new(0.1, 0.1, 0.1), 1e-6));
        assert_eq!(resolved.mesh.name, "bowl_mesh");
        assert_eq!(h.a.prototype_fetches("bowl"), 1);
    }

    #[tokio::test]
    async fn test_ticker_applies_updates() {
        let h = connected().await;
        let session = Arc::new(h.session);
        let ticker = session.spawn_ticker();

        h.a.push_object(box_msg("zone", 0));
        let s = &session;
        assert!(wait_until(WAIT, || s.contains_object("zone")).await);
        ticker.abort();
    }
}
