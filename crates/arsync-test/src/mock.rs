//! In-memory workspace server
//!
//! Implements every service trait plus `Endpoint` and `Connector`, so a real
//! `Session` can run against it without a network. Tests drive the server
//! side directly: seed objects, push stream messages, fail streams and flip
//! the connection state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use arsync_core::{ArError, ArResult, Transform};
use arsync_transport::{
    rejected_stream, stream_channel, BoxSink, BoxStream, ClientStream, ConnectionState, Connector,
    Endpoint, HandTrackingService, MeshService, ObjectService, PointCloudService, RobotService,
    RpcResult, RpcStatus, SelectionService, StreamSender, VecStream,
};
use arsync_wire::*;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

// ============================================================================
// SUBSCRIBER LISTS
// ============================================================================

/// Open server-side streams of one method
struct Subscribers<M> {
    senders: Mutex<Vec<StreamSender<M>>>,
    opened: AtomicUsize,
}

impl<M: Clone + Send + 'static> Subscribers<M> {
    fn new() -> Self {
        Subscribers {
            senders: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
        }
    }

    fn open(&self) -> BoxStream<M> {
        let (tx, stream) = stream_channel();
        self.senders.lock().push(tx);
        self.opened.fetch_add(1, Ordering::SeqCst);
        stream
    }

    /// Send to every open stream, returning how many got it
    fn broadcast(&self, message: &M) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|tx| tx.send(message.clone()));
        senders.len()
    }

    fn fail_all(&self, status: &RpcStatus) {
        for tx in self.senders.lock().drain(..) {
            tx.fail(status.clone());
        }
    }

    fn close_all(&self) {
        self.senders.lock().clear();
    }

    fn open_count(&self) -> usize {
        let mut senders = self.senders.lock();
        senders.retain(|tx| !tx.is_closed());
        senders.len()
    }
}

// ============================================================================
// MOCK SERVER
// ============================================================================

pub struct MockServer {
    name: String,
    state: watch::Sender<ConnectionState>,

    seeded: Mutex<Vec<ObjectInstanceTfMeta>>,
    prototypes: Mutex<HashMap<String, ObjectPrototypeTfMeta>>,
    meshes: Mutex<HashMap<String, MeshDataTfMeta>>,
    prototype_requests: Mutex<Vec<String>>,
    mesh_requests: Mutex<Vec<String>>,

    objects: Subscribers<ObjectInstanceTfMeta>,
    deletes: Subscribers<DeleteRequest>,
    voxels: Subscribers<VoxelTransmission>,
    tcps: Subscribers<TcpsTransmission>,
    joints: Subscribers<SyncJointsTransmission>,
    sync_calls: AtomicUsize,
    reject_subscriptions: Mutex<Option<RpcStatus>>,

    scenario: AtomicI32,
    selections: Mutex<Vec<SelectionMessage>>,
    hand_uploads: Mutex<Vec<HandDataMsg>>,
    point_clouds: Mutex<Vec<PclDataMsg>>,
    registration: Mutex<Option<Transform>>,
}

impl MockServer {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Ready);
        Arc::new(MockServer {
            name: name.into(),
            state,
            seeded: Mutex::new(Vec::new()),
            prototypes: Mutex::new(HashMap::new()),
            meshes: Mutex::new(HashMap::new()),
            prototype_requests: Mutex::new(Vec::new()),
            mesh_requests: Mutex::new(Vec::new()),
            objects: Subscribers::new(),
            deletes: Subscribers::new(),
            voxels: Subscribers::new(),
            tcps: Subscribers::new(),
            joints: Subscribers::new(),
            sync_calls: AtomicUsize::new(0),
            reject_subscriptions: Mutex::new(None),
            scenario: AtomicI32::new(SCENARIO_MIXED),
            selections: Mutex::new(Vec::new()),
            hand_uploads: Mutex::new(Vec::new()),
            point_clouds: Mutex::new(Vec::new()),
            registration: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ---- catalog -----------------------------------------------------------

    /// Register a prototype together with a one-triangle mesh
    pub fn add_prototype(&self, name: &str, half_size: f32) {
        let mesh_name = format!("{}_mesh", name);
        self.prototypes.lock().insert(
            name.to_string(),
            ObjectPrototypeTfMeta {
                object_prototype: Some(ObjectPrototypeMsg {
                    name: name.to_string(),
                    mesh_name: mesh_name.clone(),
                    bounding_box: Some(AabbMsg {
                        translation: Some(Vertex3d::default()),
                        diagonal: Some(Size3d {
                            x: half_size * 2.0,
                            y: half_size * 2.0,
                            z: half_size * 2.0,
                        }),
                    }),
                    mean_color: Some(ColorMsg { r: 200, g: 180, b: 40, a: 255 }),
                    type_tag: "prop".to_string(),
                }),
                transformation_meta: None,
            },
        );
        self.meshes.lock().insert(
            mesh_name.clone(),
            MeshDataTfMeta {
                mesh_data: Some(MeshDataMsg {
                    name: mesh_name,
                    vertices: vec![
                        Vertex3d { x: 0.0, y: 0.0, z: 0.0 },
                        Vertex3d { x: 1.0, y: 0.0, z: 0.0 },
                        Vertex3d { x: 0.0, y: 1.0, z: 0.0 },
                    ],
                    indices: vec![0, 1, 2],
                    ..Default::default()
                }),
                transformation_meta: None,
            },
        );
    }

    /// Instance returned by the next object syncs
    pub fn seed_object(&self, instance: ObjectInstanceTfMeta) {
        self.seeded.lock().push(instance);
    }

    /// Times a prototype name was part of a fetch
    pub fn prototype_fetches(&self, name: &str) -> usize {
        self.prototype_requests
            .lock()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    pub fn mesh_fetches(&self, name: &str) -> usize {
        self.mesh_requests.lock().iter().filter(|n| n.as_str() == name).count()
    }

    // ---- streams -----------------------------------------------------------

    pub fn push_object(&self, instance: ObjectInstanceTfMeta) -> usize {
        self.objects.broadcast(&instance)
    }

    pub fn push_delete(&self, id: &str) -> usize {
        self.deletes.broadcast(&DeleteRequest { id: id.to_string() })
    }

    pub fn push_voxels(&self, message: VoxelTransmission) -> usize {
        self.voxels.broadcast(&message)
    }

    pub fn push_tcps(&self, message: TcpsTransmission) -> usize {
        self.tcps.broadcast(&message)
    }

    pub fn push_joints(&self, message: SyncJointsTransmission) -> usize {
        self.joints.broadcast(&message)
    }

    /// End every open subscription with `status`
    pub fn fail_streams(&self, status: RpcStatus) {
        self.objects.fail_all(&status);
        self.deletes.fail_all(&status);
        self.voxels.fail_all(&status);
        self.tcps.fail_all(&status);
        self.joints.fail_all(&status);
    }

    /// End every open subscription normally
    pub fn close_streams(&self) {
        self.objects.close_all();
        self.deletes.close_all();
        self.voxels.close_all();
        self.tcps.close_all();
        self.joints.close_all();
    }

    /// Refuse new subscriptions with `status` until cleared with `None`
    pub fn reject_subscriptions(&self, status: Option<RpcStatus>) {
        *self.reject_subscriptions.lock() = status;
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub fn object_subscribers(&self) -> usize {
        self.objects.open_count()
    }

    pub fn delete_subscribers(&self) -> usize {
        self.deletes.open_count()
    }

    pub fn robot_subscribers(&self) -> usize {
        self.voxels.open_count() + self.tcps.open_count() + self.joints.open_count()
    }

    /// `subscribe_objects` calls accepted so far
    pub fn object_subscriptions_opened(&self) -> usize {
        self.objects.opened.load(Ordering::SeqCst)
    }

    pub fn sync_calls(&self) -> usize {
        self.sync_calls.load(Ordering::SeqCst)
    }

    // ---- unary and uploads -------------------------------------------------

    pub fn set_scenario(&self, value: i32) {
        self.scenario.store(value, Ordering::SeqCst);
    }

    pub fn set_registration(&self, registration: Option<Transform>) {
        *self.registration.lock() = registration;
    }

    pub fn selections(&self) -> Vec<SelectionMessage> {
        self.selections.lock().clone()
    }

    pub fn hand_uploads(&self) -> Vec<HandDataMsg> {
        self.hand_uploads.lock().clone()
    }

    pub fn point_clouds(&self) -> Vec<PclDataMsg> {
        self.point_clouds.lock().clone()
    }

    fn open_subscription<M: Clone + Send + 'static>(&self, subscribers: &Subscribers<M>) -> BoxStream<M> {
        match self.reject_subscriptions.lock().clone() {
            Some(status) => rejected_stream(status),
            None => subscribers.open(),
        }
    }
}

#[async_trait]
impl ObjectService for MockServer {
    async fn sync_objects(&self) -> RpcResult<BoxStream<ObjectInstanceTfMeta>> {
        self.sync_calls.fetch_add(1, Ordering::SeqCst);
        Ok(VecStream::boxed(self.seeded.lock().clone()))
    }

    async fn subscribe_objects(&self) -> RpcResult<BoxStream<ObjectInstanceTfMeta>> {
        Ok(self.open_subscription(&self.objects))
    }

    async fn subscribe_delete_objects(&self) -> RpcResult<BoxStream<DeleteRequest>> {
        Ok(self.open_subscription(&self.deletes))
    }
}

#[async_trait]
impl MeshService for MockServer {
    async fn get_meshes(&self, names: NameList) -> RpcResult<BoxStream<MeshDataTfMeta>> {
        self.mesh_requests.lock().extend(names.names.iter().cloned());
        let meshes = self.meshes.lock();
        let found = names
            .names
            .iter()
            .filter_map(|name| meshes.get(name).cloned())
            .collect();
        Ok(VecStream::boxed(found))
    }

    async fn get_object_prototypes(
        &self,
        names: NameList,
    ) -> RpcResult<BoxStream<ObjectPrototypeTfMeta>> {
        self.prototype_requests.lock().extend(names.names.iter().cloned());
        let prototypes = self.prototypes.lock();
        let found = names
            .names
            .iter()
            .filter_map(|name| prototypes.get(name).cloned())
            .collect();
        Ok(VecStream::boxed(found))
    }
}

#[async_trait]
impl SelectionService for MockServer {
    async fn send_selection(&self, selection: SelectionMessage) -> RpcResult<()> {
        self.selections.lock().push(selection);
        Ok(())
    }

    async fn get_scenario(&self) -> RpcResult<ScenarioMsg> {
        Ok(ScenarioMsg {
            scenario: self.scenario.load(Ordering::SeqCst),
        })
    }
}

#[async_trait]
impl RobotService for MockServer {
    async fn subscribe_voxels(&self) -> RpcResult<BoxStream<VoxelTransmission>> {
        Ok(self.open_subscription(&self.voxels))
    }

    async fn subscribe_tcps(&self) -> RpcResult<BoxStream<TcpsTransmission>> {
        Ok(self.open_subscription(&self.tcps))
    }

    async fn subscribe_sync_joints(&self) -> RpcResult<BoxStream<SyncJointsTransmission>> {
        Ok(self.open_subscription(&self.joints))
    }
}

#[async_trait]
impl PointCloudService for MockServer {
    async fn register_point_cloud(&self, cloud: PclDataMsg) -> RpcResult<IcpResult> {
        self.point_clouds.lock().push(cloud);
        let registration = *self.registration.lock();
        let data = registration.map(|transform| IcpData {
            transform: Some(encode_transform(&transform)),
            transformation_meta: Some(engine_meta()),
        });
        Ok(IcpResult { data })
    }
}

/// Upload stream feeding the server's hand sample log
struct HandUpload {
    server: Arc<MockServer>,
}

#[async_trait]
impl ClientStream<HandDataMsg> for HandUpload {
    async fn send(&mut self, message: HandDataMsg) -> RpcResult<()> {
        self.server.hand_uploads.lock().push(message);
        Ok(())
    }

    async fn finish(&mut self) -> RpcResult<()> {
        Ok(())
    }
}

/// Connected view of a [`MockServer`]
struct MockEndpoint {
    server: Arc<MockServer>,
}

#[async_trait]
impl HandTrackingService for MockEndpoint {
    async fn upload_hand_data(&self) -> RpcResult<BoxSink<HandDataMsg>> {
        Ok(Box::new(HandUpload {
            server: Arc::clone(&self.server),
        }))
    }
}

impl Endpoint for MockEndpoint {
    fn objects(&self) -> Arc<dyn ObjectService> {
        self.server.clone()
    }

    fn meshes(&self) -> Arc<dyn MeshService> {
        self.server.clone()
    }

    fn selection(&self) -> Arc<dyn SelectionService> {
        self.server.clone()
    }

    fn robot(&self) -> Arc<dyn RobotService> {
        self.server.clone()
    }

    fn hand_tracking(&self) -> Arc<dyn HandTrackingService> {
        Arc::new(MockEndpoint {
            server: Arc::clone(&self.server),
        })
    }

    fn point_cloud(&self) -> Arc<dyn PointCloudService> {
        self.server.clone()
    }

    fn state(&self) -> watch::Receiver<ConnectionState> {
        self.server.state.subscribe()
    }
}

// ============================================================================
// MOCK NETWORK
// ============================================================================

/// Address book of mock servers
#[derive(Default)]
pub struct MockNetwork {
    servers: Mutex<HashMap<String, Arc<MockServer>>>,
    connects: AtomicUsize,
}

impl MockNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create a server reachable under `target`
    pub fn add_server(&self, target: &str) -> Arc<MockServer> {
        let server = MockServer::new(target);
        self.servers
            .lock()
            .insert(target.to_string(), Arc::clone(&server));
        server
    }

    pub fn remove_server(&self, target: &str) -> Option<Arc<MockServer>> {
        self.servers.lock().remove(target)
    }

    /// Successful connections so far
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MockNetwork {
    async fn connect(&self, target: &str) -> ArResult<Arc<dyn Endpoint>> {
        let server = self
            .servers
            .lock()
            .get(target)
            .cloned()
            .ok_or_else(|| ArError::TransportError(format!("no route to {}", target)))?;
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockEndpoint { server }))
    }
}
