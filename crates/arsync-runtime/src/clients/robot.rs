//! Robot voxel, TCP and joint streams

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arsync_core::{ArError, ArResult, Generation, SyncPayload};
use arsync_transform::ConverterCache;
use arsync_transport::{RobotService, RpcStatus, StreamRunner};
use arsync_wire::{
    decode_joint_sync_transmission, decode_tcps_transmission, decode_voxel_transmission,
    SyncJointsTransmission, TcpsTransmission, VoxelTransmission,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::error::TrySendError;

use super::ClientContext;
use crate::{RobotEnvelope, RobotEvent, RobotStream};

struct Binding {
    service: Arc<dyn RobotService>,
    generation: Generation,
    voxels: StreamRunner<VoxelTransmission>,
    tcps: StreamRunner<TcpsTransmission>,
    joints: StreamRunner<SyncJointsTransmission>,
}

/// Robot client
///
/// Decoded events go to the bounded robot channel drained by the tick. When
/// the channel is full the event is dropped; the next update supersedes it.
pub struct RobotClient {
    ctx: ClientContext,
    binding: Mutex<Option<Arc<Binding>>>,
    disconnected: Arc<AtomicBool>,
    overflow: Arc<AtomicU64>,
}

impl RobotClient {
    pub fn new(ctx: ClientContext) -> Self {
        RobotClient {
            ctx,
            binding: Mutex::new(None),
            disconnected: Arc::new(AtomicBool::new(false)),
            overflow: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn bind(&self, service: Arc<dyn RobotService>, generation: Generation) {
        *self.binding.lock() = Some(Arc::new(Binding {
            service,
            generation,
            voxels: StreamRunner::new("robot_voxels"),
            tcps: StreamRunner::new("robot_tcps"),
            joints: StreamRunner::new("robot_joints"),
        }));
        self.disconnected.store(false, Ordering::SeqCst);
    }

    /// Start all three subscriptions that are not already running
    pub fn subscribe(&self) -> ArResult<bool> {
        let binding = self.binding.lock().clone().ok_or(ArError::NoChannel)?;
        let generation = binding.generation;

        let service = Arc::clone(&binding.service);
        let mut frames = ConverterCache::new();
        let publish = self.publisher(generation, RobotStream::Voxels);
        let voxels = binding.voxels.start(
            move || async move { service.subscribe_voxels().await },
            move |message: VoxelTransmission| {
                match decode_voxel_transmission(&message, &mut frames) {
                    Ok(SyncPayload::Data(voxels)) => publish(RobotEvent::Voxels(voxels)),
                    Ok(SyncPayload::Visibility(change)) => {
                        publish(RobotEvent::Visibility(RobotStream::Voxels, change))
                    }
                    Err(e) => tracing::warn!(error = %e, "dropping undecodable voxel update"),
                }
            },
            self.finish_handler(generation, RobotStream::Voxels),
        )?;

        let service = Arc::clone(&binding.service);
        let mut frames = ConverterCache::new();
        let publish = self.publisher(generation, RobotStream::Tcps);
        let tcps = binding.tcps.start(
            move || async move { service.subscribe_tcps().await },
            move |message: TcpsTransmission| match decode_tcps_transmission(&message, &mut frames) {
                Ok(SyncPayload::Data(tcps)) => publish(RobotEvent::Tcps(tcps)),
                Ok(SyncPayload::Visibility(change)) => {
                    publish(RobotEvent::Visibility(RobotStream::Tcps, change))
                }
                Err(e) => tracing::warn!(error = %e, "dropping undecodable tcp update"),
            },
            self.finish_handler(generation, RobotStream::Tcps),
        )?;

        let service = Arc::clone(&binding.service);
        let publish = self.publisher(generation, RobotStream::Joints);
        let joints = binding.joints.start(
            move || async move { service.subscribe_sync_joints().await },
            move |message: SyncJointsTransmission| match decode_joint_sync_transmission(&message) {
                Ok(SyncPayload::Data(samples)) => publish(RobotEvent::Joints(samples)),
                Ok(SyncPayload::Visibility(change)) => {
                    publish(RobotEvent::Visibility(RobotStream::Joints, change))
                }
                Err(e) => tracing::warn!(error = %e, "dropping undecodable joint sync"),
            },
            self.finish_handler(generation, RobotStream::Joints),
        )?;

        Ok(voxels || tcps || joints)
    }

    /// Flag the streams for resubscription on the next ready transition
    pub fn mark_disconnected(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    pub fn take_disconnected(&self) -> bool {
        self.disconnected.swap(false, Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Events dropped because the robot channel was full
    pub fn overflowed(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }

    pub fn active_workers(&self) -> usize {
        self.binding
            .lock()
            .as_ref()
            .map(|b| b.voxels.active_workers() + b.tcps.active_workers() + b.joints.active_workers())
            .unwrap_or(0)
    }

    fn publisher(
        &self,
        generation: Generation,
        stream: RobotStream,
    ) -> impl Fn(RobotEvent) + Send + 'static {
        let ctx = self.ctx.clone();
        let overflow = Arc::clone(&self.overflow);
        let label = stream_label(stream);

        move |event| {
            ctx.deliver(generation, label, || {
                let envelope = RobotEnvelope { generation, event };
                match ctx.robot_tx.try_send(envelope) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        overflow.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(%stream, "robot event channel full, dropping update");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::debug!(%stream, "robot event channel closed");
                    }
                }
            });
        }
    }

    fn finish_handler(
        &self,
        generation: Generation,
        stream: RobotStream,
    ) -> impl FnOnce(&RpcStatus) + Send + 'static {
        let generations = self.ctx.generations.clone();
        let disconnected = Arc::clone(&self.disconnected);

        move |status| {
            if status.is_transport_loss() && generations.is_current(generation) {
                tracing::warn!(%stream, %status, "robot stream lost");
                disconnected.store(true, Ordering::SeqCst);
            }
        }
    }
}

fn stream_label(stream: RobotStream) -> &'static str {
    match stream {
        RobotStream::Voxels => "robot_voxels",
        RobotStream::Tcps => "robot_tcps",
        RobotStream::Joints => "robot_joints",
    }
}
