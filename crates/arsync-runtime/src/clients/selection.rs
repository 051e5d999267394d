//! Selection and scenario

use std::sync::Arc;

use arsync_core::{ArError, ArResult, Assignment, ObjectId, PetriNetId, Scenario};
use arsync_transport::SelectionService;
use arsync_wire::{decode_scenario, encode_selection};
use parking_lot::Mutex;

#[derive(Default)]
pub struct SelectionClient {
    service: Mutex<Option<Arc<dyn SelectionService>>>,
}

impl SelectionClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, service: Arc<dyn SelectionService>) {
        *self.service.lock() = Some(service);
    }

    fn service(&self) -> ArResult<Arc<dyn SelectionService>> {
        self.service.lock().clone().ok_or(ArError::NoChannel)
    }

    pub async fn send_selection(
        &self,
        id: &ObjectId,
        pn_id: PetriNetId,
        assignment: Assignment,
    ) -> ArResult<()> {
        let service = self.service()?;
        service
            .send_selection(encode_selection(id, pn_id, assignment))
            .await?;
        tracing::debug!(%id, ?assignment, "selection sent");
        Ok(())
    }

    /// Scenario the server runs; unknown values read as `Mixed`
    pub async fn scenario(&self) -> ArResult<Scenario> {
        let service = self.service()?;
        let message = service.get_scenario().await?;
        Ok(decode_scenario(&message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arsync_transport::RpcResult;
    use arsync_wire::{ScenarioMsg, SelectionMessage};
    use async_trait::async_trait;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<SelectionMessage>>,
        scenario: i32,
    }

    #[async_trait]
    impl SelectionService for Recording {
        async fn send_selection(&self, selection: SelectionMessage) -> RpcResult<()> {
            self.sent.lock().push(selection);
            Ok(())
        }

        async fn get_scenario(&self) -> RpcResult<ScenarioMsg> {
            Ok(ScenarioMsg {
                scenario: self.scenario,
            })
        }
    }

    #[tokio::test]
    async fn test_send_selection() {
        let service = Arc::new(Recording::default());
        let client = SelectionClient::new();
        client.bind(service.clone());

        client
            .send_selection(&ObjectId::new("X1"), PetriNetId::new(4), Assignment::Human)
            .await
            .unwrap();

        let sent = service.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].object_id, "X1");
        assert_eq!(sent[0].pn_id, 4);
        assert_eq!(sent[0].assignment, arsync_wire::ASSIGNMENT_HUMAN);
    }

    #[tokio::test]
    async fn test_scenario_values() {
        for (value, expected) in [(1, Scenario::ReserveOnly), (2, Scenario::Mixed), (99, Scenario::Mixed)] {
            let client = SelectionClient::new();
            client.bind(Arc::new(Recording {
                scenario: value,
                ..Default::default()
            }));
            assert_eq!(client.scenario().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_unbound() {
        let client = SelectionClient::new();
        assert_eq!(client.scenario().await.unwrap_err(), ArError::NoChannel);
    }
}
