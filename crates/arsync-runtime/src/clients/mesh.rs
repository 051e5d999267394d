//! Prototype and mesh fetching

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arsync_core::{ArResult, Generation, MeshData, ObjectPrototype};
use arsync_state::AssetFetcher;
use arsync_transform::ConverterCache;
use arsync_transport::MeshService;
use arsync_wire::{decode_mesh_meta, decode_prototype_meta, NameList};
use parking_lot::Mutex;
use tokio::runtime::Handle;

use super::ClientContext;

/// Fetches prototypes, then their missing meshes, into the asset cache
///
/// Fetches run as tasks on the session runtime; [`AssetFetcher::request`]
/// returns immediately.
pub struct MeshClient {
    ctx: ClientContext,
    handle: Handle,
    binding: Mutex<Option<(Arc<dyn MeshService>, Generation)>>,
    failed: Arc<AtomicU64>,
}

impl MeshClient {
    pub fn new(ctx: ClientContext, handle: Handle) -> Self {
        MeshClient {
            ctx,
            handle,
            binding: Mutex::new(None),
            failed: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn bind(&self, service: Arc<dyn MeshService>, generation: Generation) {
        *self.binding.lock() = Some((service, generation));
    }

    /// Fetches that ended with an RPC error
    pub fn failed_fetches(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

impl AssetFetcher for MeshClient {
    fn request(&self, prototype_names: Vec<String>) {
        let Some((service, generation)) = self.binding.lock().clone() else {
            tracing::warn!(prototypes = ?prototype_names, "no channel, cannot fetch prototypes");
            self.ctx.assets.finish_fetch(&prototype_names);
            return;
        };

        let ctx = self.ctx.clone();
        let failed = Arc::clone(&self.failed);
        self.handle.spawn(async move {
            if let Err(e) = fetch(service.as_ref(), &ctx, generation, &prototype_names).await {
                failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(prototypes = ?prototype_names, error = %e, "prototype fetch failed");
            }
            // after a channel switch the claims belong to the new cache
            ctx.deliver(generation, "mesh_fetch", || ctx.assets.finish_fetch(&prototype_names));
        });
    }
}

async fn fetch(
    service: &dyn MeshService,
    ctx: &ClientContext,
    generation: Generation,
    names: &[String],
) -> ArResult<()> {
    let prototypes = fetch_prototypes(service, names).await?;
    if prototypes.is_empty() {
        return Ok(());
    }

    let mesh_names = ctx
        .assets
        .missing_meshes(prototypes.iter().map(|p| p.mesh_name.as_str()));
    let fetched = prototypes.len();
    let delivered = ctx.deliver(generation, "mesh_fetch", || {
        for prototype in prototypes {
            ctx.assets.insert_prototype(prototype);
        }
    });
    if !delivered || mesh_names.is_empty() {
        return Ok(());
    }

    let meshes = fetch_meshes(service, mesh_names).await?;
    tracing::debug!(prototypes = fetched, meshes = meshes.len(), "assets fetched");
    ctx.deliver(generation, "mesh_fetch", || {
        for mesh in meshes {
            ctx.assets.insert_mesh(mesh);
        }
    });
    Ok(())
}

async fn fetch_prototypes(
    service: &dyn MeshService,
    names: &[String],
) -> ArResult<Vec<ObjectPrototype>> {
    let mut stream = service
        .get_object_prototypes(NameList::new(names.iter().cloned()))
        .await?;
    stream.initial_metadata().await?;

    let mut frames = ConverterCache::new();
    let mut prototypes = Vec::new();
    while let Some(message) = stream.message().await? {
        match decode_prototype_meta(&message, &mut frames) {
            Ok(prototype) => prototypes.push(prototype),
            Err(e) => tracing::warn!(error = %e, "dropping undecodable prototype"),
        }
    }
    Ok(prototypes)
}

async fn fetch_meshes(service: &dyn MeshService, names: Vec<String>) -> ArResult<Vec<MeshData>> {
    let mut stream = service.get_meshes(NameList::new(names)).await?;
    stream.initial_metadata().await?;

    let mut frames = ConverterCache::new();
    let mut meshes = Vec::new();
    while let Some(message) = stream.message().await? {
        match decode_mesh_meta(&message, &mut frames) {
            Ok(mesh) => meshes.push(mesh),
            Err(e) => tracing::warn!(error = %e, "dropping undecodable mesh"),
        }
    }
    Ok(meshes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arsync_transport::{BoxStream, RpcResult, RpcStatus, VecStream};
    use arsync_wire::{MeshDataMsg, MeshDataTfMeta, ObjectPrototypeMsg, ObjectPrototypeTfMeta, Vertex3d};
    use async_trait::async_trait;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct Catalog {
        meshes_down: bool,
    }

    #[async_trait]
    impl MeshService for Catalog {
        async fn get_meshes(&self, names: NameList) -> RpcResult<BoxStream<MeshDataTfMeta>> {
            if self.meshes_down {
                return Err(RpcStatus::unavailable("mesh store offline"));
            }
            let meshes = names
                .names
                .into_iter()
                .map(|name| MeshDataTfMeta {
                    mesh_data: Some(MeshDataMsg {
                        name,
                        vertices: vec![Vertex3d::default(); 3],
                        indices: vec![0, 1, 2],
                        ..Default::default()
                    }),
                    transformation_meta: None,
                })
                .collect();
            Ok(VecStream::boxed(meshes))
        }

        async fn get_object_prototypes(
            &self,
            names: NameList,
        ) -> RpcResult<BoxStream<ObjectPrototypeTfMeta>> {
            let prototypes = names
                .names
                .into_iter()
                .filter(|name| name != "unknown")
                .map(|name| ObjectPrototypeTfMeta {
                    object_prototype: Some(ObjectPrototypeMsg {
                        mesh_name: format!("{}_mesh", name),
                        name,
                        ..Default::default()
                    }),
                    transformation_meta: None,
                })
                .collect();
            Ok(VecStream::boxed(prototypes))
        }
    }

    fn client(catalog: Catalog) -> MeshClient {
        let (tx, _rx) = mpsc::channel(4);
        let ctx = ClientContext::new(tx);
        let generation = ctx.generations.advance();
        let client = MeshClient::new(ctx, Handle::current());
        client.bind(Arc::new(catalog), generation);
        client
    }

    async fn wait_idle(client: &MeshClient) {
        for _ in 0..200 {
            if client.ctx.assets.stats().in_flight == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("fetch did not finish");
    }

    #[tokio::test]
    async fn test_fetch_resolves_prototype() {
        let client = client(Catalog { meshes_down: false });
        let claimed = client.ctx.assets.begin_fetch(["bowl", "unknown"]);
        client.request(claimed);
        wait_idle(&client).await;

        assert!(client.ctx.assets.is_resolved("bowl"));
        assert!(!client.ctx.assets.is_resolved("unknown"));
        assert_eq!(client.failed_fetches(), 0);
    }

    #[tokio::test]
    async fn test_mesh_failure_releases_claim() {
        let client = client(Catalog { meshes_down: true });
        let claimed = client.ctx.assets.begin_fetch(["bowl"]);
        client.request(claimed);
        wait_idle(&client).await;

        assert!(client.ctx.assets.prototype("bowl").is_some());
        assert!(!client.ctx.assets.is_resolved("bowl"));
        assert_eq!(client.failed_fetches(), 1);
    }

    #[tokio::test]
    async fn test_unbound_request_releases_claim() {
        let (tx, _rx) = mpsc::channel(4);
        let client = MeshClient::new(ClientContext::new(tx), Handle::current());
        let claimed = client.ctx.assets.begin_fetch(["bowl"]);
        client.request(claimed);
        assert!(!client.ctx.assets.is_in_flight("bowl"));
    }
}
