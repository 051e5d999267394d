//! Hand tracking upload
//!
//! Samples arrive in engine world space. Before upload they are moved into
//! the anchor's local space, which is what the server tracks against.

use std::sync::Arc;

use arsync_core::{ArError, ArResult, HandSample, Transform, Vec3};
use arsync_transport::{BoxSink, HandTrackingService};
use arsync_wire::{encode_hand_sample, HandDataMsg};
use parking_lot::Mutex;

#[derive(Default)]
pub struct HandTrackingClient {
    service: Mutex<Option<Arc<dyn HandTrackingService>>>,
    sink: tokio::sync::Mutex<Option<BoxSink<HandDataMsg>>>,
    local: Mutex<Transform>,
}

impl HandTrackingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach to a new channel; an open upload on the old one is abandoned
    pub async fn bind(&self, service: Arc<dyn HandTrackingService>) {
        *self.service.lock() = Some(service);
        self.sink.lock().await.take();
    }

    /// Open the upload stream unless it is already open
    pub async fn start(&self) -> ArResult<bool> {
        let mut sink = self.sink.lock().await;
        if sink.is_some() {
            return Ok(false);
        }
        let service = self.service.lock().clone().ok_or(ArError::NoChannel)?;
        *sink = Some(service.upload_hand_data().await?);
        tracing::debug!("hand tracking upload opened");
        Ok(true)
    }

    pub async fn is_started(&self) -> bool {
        self.sink.lock().await.is_some()
    }

    /// Use the inverse of the anchor pose for every following sample
    pub fn set_anchor(&self, anchor: &Transform) {
        *self.local.lock() = inverse_pose(anchor);
    }

    /// Upload one sample; a failed send closes the stream
    pub async fn send_sample(&self, sample: &HandSample) -> ArResult<()> {
        let local = *self.local.lock();
        let message = encode_hand_sample(&to_local(sample, &local));

        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(ArError::NoChannel)?;
        if let Err(status) = sink.send(message).await {
            guard.take();
            return Err(status.into());
        }
        Ok(())
    }

    /// Half-close the upload and wait for the server's status
    pub async fn stop(&self) -> ArResult<()> {
        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };
        sink.finish().await?;
        tracing::debug!("hand tracking upload closed");
        Ok(())
    }
}

/// Inverse of a rigid pose; scale is ignored
pub fn inverse_pose(pose: &Transform) -> Transform {
    let rotation = pose.rotation.normalize().conjugate();
    Transform::new(-rotation.rotate(pose.translation), rotation, Vec3::ONE)
}

/// `local` applied after `pose`
fn compose(local: &Transform, pose: &Transform) -> Transform {
    Transform::new(
        local.rotation.rotate(pose.translation) + local.translation,
        local.rotation * pose.rotation,
        pose.scale,
    )
}

fn to_local(sample: &HandSample, local: &Transform) -> HandSample {
    HandSample {
        grip: compose(local, &sample.grip),
        aim: compose(local, &sample.aim),
        key_positions: sample
            .key_positions
            .iter()
            .map(|p| local.rotation.rotate(*p) + local.translation)
            .collect(),
        key_rotations: sample
            .key_rotations
            .iter()
            .map(|q| local.rotation * *q)
            .collect(),
        ..sample.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arsync_core::{HandIndex, Quat, TrackingStatus};
    use arsync_transport::{sink_channel, RpcResult};
    use std::f64::consts::FRAC_PI_2;
    use tokio::sync::mpsc;

    struct Uploads {
        rx: Mutex<Option<mpsc::UnboundedReceiver<HandDataMsg>>>,
        sink: Mutex<Option<BoxSink<HandDataMsg>>>,
    }

    impl Uploads {
        fn new() -> Self {
            let (sink, rx) = sink_channel();
            Uploads {
                rx: Mutex::new(Some(rx)),
                sink: Mutex::new(Some(sink)),
            }
        }
    }

    #[async_trait::async_trait]
    impl HandTrackingService for Uploads {
        async fn upload_hand_data(&self) -> RpcResult<BoxSink<HandDataMsg>> {
            Ok(self.sink.lock().take().unwrap())
        }
    }

    fn sample(at: Vec3) -> HandSample {
        HandSample {
            valid: true,
            hand: HandIndex::Right,
            tracking_status: TrackingStatus::Tracked,
            grip: Transform::new(at, Quat::IDENTITY, Vec3::ONE),
            aim: Transform::IDENTITY,
            key_positions: vec![at],
            key_rotations: vec![Quat::IDENTITY],
            key_radii: vec![0.01],
            is_grasped: false,
            time_stamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_inverse_pose() {
        let anchor = Transform::new(
            Vec3::new(1.0, 2.0, 0.0),
            Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), FRAC_PI_2),
            Vec3::ONE,
        );
        let inverse = inverse_pose(&anchor);
        let back = compose(&inverse, &anchor);
        assert!(back.translation.approx_eq(Vec3::ZERO, 1e-9));
        assert!(back.rotation.approx_eq(Quat::IDENTITY, 1e-9));
    }

    #[tokio::test]
    async fn test_samples_sent_in_anchor_space() {
        let service = Arc::new(Uploads::new());
        let mut rx = service.rx.lock().take().unwrap();
        let client = HandTrackingClient::new();
        client.bind(service).await;

        assert!(client.start().await.unwrap());
        assert!(!client.start().await.unwrap());

        client.set_anchor(&Transform::new(Vec3::new(1.0, 0.0, 0.0), Quat::IDENTITY, Vec3::ONE));
        client.send_sample(&sample(Vec3::new(3.0, 0.0, 0.0))).await.unwrap();

        let sent = rx.recv().await.unwrap();
        let grip = sent.grip_position.unwrap();
        assert!((grip.x - 2.0).abs() < 1e-6);
        assert_eq!(sent.hand_key_positions.len(), 1);

        client.stop().await.unwrap();
        assert!(!client.is_started().await);
    }

    #[tokio::test]
    async fn test_send_without_stream() {
        let client = HandTrackingClient::new();
        let err = client.send_sample(&sample(Vec3::ZERO)).await.unwrap_err();
        assert_eq!(err, ArError::NoChannel);
    }
}
