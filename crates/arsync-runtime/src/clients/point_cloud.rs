//! Point cloud registration

use std::sync::Arc;

use arsync_core::{ArError, ArResult, PointCloud, Transform};
use arsync_transport::PointCloudService;
use arsync_wire::{decode_icp_result, encode_point_cloud};
use parking_lot::Mutex;

#[derive(Default)]
pub struct PointCloudClient {
    service: Mutex<Option<Arc<dyn PointCloudService>>>,
}

impl PointCloudClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, service: Arc<dyn PointCloudService>) {
        *self.service.lock() = Some(service);
    }

    /// Upload a capture and return the registration, if the server found one
    pub async fn register(&self, cloud: &PointCloud) -> ArResult<Option<Transform>> {
        let service = self.service.lock().clone().ok_or(ArError::NoChannel)?;
        let message = encode_point_cloud(cloud);
        let sent = message.vertices.len();
        let result = service.register_point_cloud(message).await?;

        let registration = decode_icp_result(&result)?;
        tracing::debug!(
            points = sent,
            dropped = cloud.points.len() - sent,
            registered = registration.is_some(),
            "point cloud uploaded"
        );
        Ok(registration)
    }
}
