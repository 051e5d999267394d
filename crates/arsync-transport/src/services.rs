//! Remote services
//!
//! One trait per server API. An [`Endpoint`] is a connected transport that
//! hands out all of them and reports its own liveness.

use std::sync::Arc;

use arsync_core::ArResult;
use arsync_wire::{
    DeleteRequest, HandDataMsg, IcpResult, MeshDataTfMeta, NameList, ObjectInstanceTfMeta,
    ObjectPrototypeTfMeta, PclDataMsg, ScenarioMsg, SelectionMessage, SyncJointsTransmission,
    TcpsTransmission, VoxelTransmission,
};
use async_trait::async_trait;
use tokio::sync::watch;

use crate::{BoxSink, BoxStream, ConnectionState, RpcResult};

/// Object instance synchronization
#[async_trait]
pub trait ObjectService: Send + Sync {
    /// Snapshot of every current instance; the stream ends after the last one
    async fn sync_objects(&self) -> RpcResult<BoxStream<ObjectInstanceTfMeta>>;

    /// Live instance updates
    async fn subscribe_objects(&self) -> RpcResult<BoxStream<ObjectInstanceTfMeta>>;

    /// Live delete notifications
    async fn subscribe_delete_objects(&self) -> RpcResult<BoxStream<DeleteRequest>>;
}

/// Bulk asset fetch by name
#[async_trait]
pub trait MeshService: Send + Sync {
    async fn get_meshes(&self, names: NameList) -> RpcResult<BoxStream<MeshDataTfMeta>>;

    async fn get_object_prototypes(
        &self,
        names: NameList,
    ) -> RpcResult<BoxStream<ObjectPrototypeTfMeta>>;
}

#[async_trait]
pub trait SelectionService: Send + Sync {
    async fn send_selection(&self, selection: SelectionMessage) -> RpcResult<()>;

    async fn get_scenario(&self) -> RpcResult<ScenarioMsg>;
}

/// Robot state streams, each multiplexing data and visibility signals
#[async_trait]
pub trait RobotService: Send + Sync {
    async fn subscribe_voxels(&self) -> RpcResult<BoxStream<VoxelTransmission>>;

    async fn subscribe_tcps(&self) -> RpcResult<BoxStream<TcpsTransmission>>;

    async fn subscribe_sync_joints(&self) -> RpcResult<BoxStream<SyncJointsTransmission>>;
}

#[async_trait]
pub trait HandTrackingService: Send + Sync {
    async fn upload_hand_data(&self) -> RpcResult<BoxSink<HandDataMsg>>;
}

#[async_trait]
pub trait PointCloudService: Send + Sync {
    /// Upload a cloud and get the registration against the workspace
    async fn register_point_cloud(&self, cloud: PclDataMsg) -> RpcResult<IcpResult>;
}

/// A connected transport
pub trait Endpoint: Send + Sync {
    fn objects(&self) -> Arc<dyn ObjectService>;
    fn meshes(&self) -> Arc<dyn MeshService>;
    fn selection(&self) -> Arc<dyn SelectionService>;
    fn robot(&self) -> Arc<dyn RobotService>;
    fn hand_tracking(&self) -> Arc<dyn HandTrackingService>;
    fn point_cloud(&self) -> Arc<dyn PointCloudService>;

    /// Transport liveness; goes to `Disconnected` on loss and back to `Ready`
    /// once the transport recovers on its own
    fn state(&self) -> watch::Receiver<ConnectionState>;
}

/// Factory for endpoints
#[async_trait]
pub trait Connector: Send + Sync {
    /// One connection attempt; the caller bounds it with a timeout
    async fn connect(&self, target: &str) -> ArResult<Arc<dyn Endpoint>>;
}
