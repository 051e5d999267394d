//! Object instance sync and subscriptions

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arsync_core::{ArError, ArResult, Generation};
use arsync_transform::ConverterCache;
use arsync_transport::{ObjectService, RpcStatus, StreamRunner};
use arsync_wire::{decode_delete, decode_object_instance_meta, DeleteRequest, ObjectInstanceTfMeta};
use parking_lot::Mutex;

use super::ClientContext;

struct Binding {
    service: Arc<dyn ObjectService>,
    generation: Generation,
    sync: StreamRunner<ObjectInstanceTfMeta>,
    updates: StreamRunner<ObjectInstanceTfMeta>,
    deletes: StreamRunner<DeleteRequest>,
}

/// Object client
///
/// Runs the one-shot sync plus the update and delete subscriptions, feeding
/// decoded instances into the update queue.
pub struct ObjectClient {
    ctx: ClientContext,
    binding: Mutex<Option<Arc<Binding>>>,
    disconnected: Arc<AtomicBool>,
}

impl ObjectClient {
    pub fn new(ctx: ClientContext) -> Self {
        ObjectClient {
            ctx,
            binding: Mutex::new(None),
            disconnected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attach to a new channel with fresh runners
    pub fn bind(&self, service: Arc<dyn ObjectService>, generation: Generation) {
        *self.binding.lock() = Some(Arc::new(Binding {
            service,
            generation,
            sync: StreamRunner::new("object_sync"),
            updates: StreamRunner::new("object_updates"),
            deletes: StreamRunner::new("object_deletes"),
        }));
        self.disconnected.store(false, Ordering::SeqCst);
    }

    fn binding(&self) -> ArResult<Arc<Binding>> {
        self.binding.lock().clone().ok_or(ArError::NoChannel)
    }

    /// Fetch every current instance once
    pub fn sync(&self) -> ArResult<bool> {
        let binding = self.binding()?;
        let service = Arc::clone(&binding.service);
        binding.sync.start(
            move || async move { service.sync_objects().await },
            self.instance_handler(binding.generation, "object_sync"),
            self.finish_handler(binding.generation, "object_sync"),
        )
    }

    /// Start the update and delete subscriptions
    ///
    /// Returns true if at least one of them was (re)started.
    pub fn subscribe(&self) -> ArResult<bool> {
        let binding = self.binding()?;

        let service = Arc::clone(&binding.service);
        let updates = binding.updates.start(
            move || async move { service.subscribe_objects().await },
            self.instance_handler(binding.generation, "object_updates"),
            self.finish_handler(binding.generation, "object_updates"),
        )?;

        let service = Arc::clone(&binding.service);
        let ctx = self.ctx.clone();
        let generation = binding.generation;
        let deletes = binding.deletes.start(
            move || async move { service.subscribe_delete_objects().await },
            move |request: DeleteRequest| match decode_delete(&request) {
                Ok(id) => {
                    ctx.deliver(generation, "object_deletes", || ctx.queue.push_delete(id));
                }
                Err(e) => tracing::warn!(error = %e, "dropping malformed delete request"),
            },
            self.finish_handler(binding.generation, "object_deletes"),
        )?;

        Ok(updates || deletes)
    }

    /// Flag the streams for resubscription on the next ready transition
    pub fn mark_disconnected(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Clear and return the flag set by a lost stream
    pub fn take_disconnected(&self) -> bool {
        self.disconnected.swap(false, Ordering::SeqCst)
    }

    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    /// Workers alive across the three runners
    pub fn active_workers(&self) -> usize {
        self.binding
            .lock()
            .as_ref()
            .map(|b| b.sync.active_workers() + b.updates.active_workers() + b.deletes.active_workers())
            .unwrap_or(0)
    }

    fn instance_handler(
        &self,
        generation: Generation,
        stream: &'static str,
    ) -> impl FnMut(ObjectInstanceTfMeta) + Send + 'static {
        let ctx = self.ctx.clone();
        let mut frames = ConverterCache::new();

        move |message| match decode_object_instance_meta(&message, &mut frames) {
            Ok(instance) => {
                ctx.deliver(generation, stream, || {
                    if let Some(name) = instance.prototype_name() {
                        if !ctx.assets.is_resolved(name) {
                            ctx.queue.mark_prototype_pending(name);
                        }
                    }
                    ctx.queue.push_set(instance);
                });
            }
            Err(e) => tracing::warn!(stream, error = %e, "dropping undecodable object instance"),
        }
    }

    fn finish_handler(
        &self,
        generation: Generation,
        stream: &'static str,
    ) -> impl FnOnce(&RpcStatus) + Send + 'static {
        let generations = self.ctx.generations.clone();
        let disconnected = Arc::clone(&self.disconnected);

        move |status| {
            if status.is_transport_loss() && generations.is_current(generation) {
                tracing::warn!(stream, %status, "stream lost, resubscribing once the channel is ready");
                disconnected.store(true, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arsync_transport::{rejected_stream, BoxStream, RpcResult, VecStream};
    use arsync_wire::{MatrixMsg, ObjectDataMsg, ObjectInstanceBody, ObjectInstanceMsg};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct Fixed {
        fail_updates: bool,
    }

    fn instance(id: &str) -> ObjectInstanceTfMeta {
        ObjectInstanceTfMeta {
            object_instance: Some(ObjectInstanceMsg {
                id: id.into(),
                pn_id: 3,
                data: Some(ObjectInstanceBody::Obj(ObjectDataMsg {
                    prototype_name: "bowl".into(),
                    transform: Some(MatrixMsg {
                        rows: 4,
                        cols: 4,
                        data: vec![
                            1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0,
                            0.0, 1.0,
                        ],
                    }),
                })),
            }),
            transformation_meta: None,
        }
    }

    #[async_trait]
    impl ObjectService for Fixed {
        async fn sync_objects(&self) -> RpcResult<BoxStream<ObjectInstanceTfMeta>> {
            Ok(VecStream::boxed(vec![instance("X1"), instance("X2")]))
        }

        async fn subscribe_objects(&self) -> RpcResult<BoxStream<ObjectInstanceTfMeta>> {
            if self.fail_updates {
                Ok(rejected_stream(RpcStatus::unknown("connection reset")))
            } else {
                Ok(VecStream::boxed(vec![]))
            }
        }

        async fn subscribe_delete_objects(&self) -> RpcResult<BoxStream<DeleteRequest>> {
            Ok(VecStream::boxed(vec![DeleteRequest { id: "X2".into() }]))
        }
    }

    fn client() -> (ObjectClient, Generation) {
        let (tx, _rx) = mpsc::channel(4);
        let ctx = ClientContext::new(tx);
        let generation = ctx.generations.advance();
        (ObjectClient::new(ctx), generation)
    }

    async fn settle(client: &ObjectClient) {
        let binding = client.binding().unwrap();
        binding.sync.wait_done().await;
        binding.updates.wait_done().await;
        binding.deletes.wait_done().await;
    }

    #[test]
    fn test_unbound_client() {
        let (client, _) = client();
        assert_eq!(client.sync().unwrap_err(), ArError::NoChannel);
    }

    #[tokio::test]
    async fn test_sync_fills_queue() {
        let (client, generation) = client();
        client.bind(Arc::new(Fixed { fail_updates: false }), generation);

        assert!(client.sync().unwrap());
        assert!(client.subscribe().unwrap());
        settle(&client).await;

        let batch = client.ctx.queue.drain();
        assert_eq!(batch.sets.len(), 2);
        assert_eq!(batch.deletes.len(), 1);
        assert!(batch.pending_prototypes.contains("bowl"));
        assert!(!client.is_disconnected());
        assert_eq!(client.active_workers(), 0);
    }

    #[tokio::test]
    async fn test_lost_stream_sets_flag() {
        let (client, generation) = client();
        client.bind(Arc::new(Fixed { fail_updates: true }), generation);

        client.subscribe().unwrap();
        settle(&client).await;

        assert!(client.take_disconnected());
        assert!(!client.take_disconnected());
    }

    #[tokio::test]
    async fn test_stale_generation_discarded() {
        let (client, generation) = client();
        client.bind(Arc::new(Fixed { fail_updates: true }), generation);
        client.ctx.generations.advance();

        client.sync().unwrap();
        client.subscribe().unwrap();
        settle(&client).await;

        assert!(client.ctx.queue.is_empty());
        assert_eq!(client.ctx.stray_messages(), 3);
        assert!(!client.is_disconnected());
    }
}
