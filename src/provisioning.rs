//! Provisioning Coordinator
//!
//! Bridges the provisioning endpoints with the test harness. A pending link
//! attempt walks a small state machine, each transition driven by exactly one
//! handler:
//!
//! ```text
//! advertised -> code-issued -> device-registered -> keys-uploaded
//! ```
//!
//! The harness observes attempts through [`ProvisioningCoordinator::wait`]
//! and supplies the provision URL plus the primary device's key material;
//! `PendingProvision::complete` resolves only once the freshly linked device
//! has uploaded its keys.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::queue::PromiseQueue;

/// Key material and identity of a primary device, supplied by the harness so
/// the server can mint the encrypted `ProvisionMessage`.
#[derive(Debug, Clone)]
pub struct PrimaryDeviceSecrets {
    pub aci: Uuid,
    pub pni: Uuid,
    pub e164: String,
    pub profile_key: Vec<u8>,
    /// (serialized public, serialized private) per identity flavor.
    pub aci_identity: (Vec<u8>, Vec<u8>),
    pub pni_identity: (Vec<u8>, Vec<u8>),
}

/// What the harness hands back to an advertised link attempt.
#[derive(Debug, Clone)]
pub struct PendingProvisionResponse {
    /// The `sgnl://linkdevice?uuid=...&pub_key=...` URL shown by the linking
    /// client.
    pub provision_url: String,
    pub primary: PrimaryDeviceSecrets,
}

/// The device a completed link attempt produced.
#[derive(Debug, Clone)]
pub struct LinkedDevice {
    pub aci: Uuid,
    pub pni: Uuid,
    pub device_id: u32,
    pub registration_id: u32,
}

/// An advertised link attempt as seen by the test harness.
pub struct PendingProvision {
    /// Provisioning address uuid the client was assigned.
    pub uuid: String,
    response_tx: oneshot::Sender<PendingProvisionResponse>,
    result_rx: oneshot::Receiver<LinkedDevice>,
    timeout: Duration,
}

impl PendingProvision {
    /// Supplies the provision URL and primary-device material, then waits for
    /// the link to finish (device registered and keys uploaded).
    pub async fn complete(self, response: PendingProvisionResponse) -> ServerResult<LinkedDevice> {
        self.response_tx
            .send(response)
            .map_err(|_| ServerError::ProvisionTimeout)?;
        match timeout(self.timeout, self.result_rx).await {
            Ok(Ok(device)) => Ok(device),
            Ok(Err(_)) | Err(_) => Err(ServerError::ProvisionTimeout),
        }
    }
}

/// Handler-side half of an advertised attempt.
pub struct ProvisionTicket {
    pub response_rx: oneshot::Receiver<PendingProvisionResponse>,
    pub result_tx: oneshot::Sender<LinkedDevice>,
}

struct CodeBinding {
    primary_aci: Uuid,
    result_tx: oneshot::Sender<LinkedDevice>,
}

pub struct ProvisioningCoordinator {
    provision_queue: PromiseQueue<PendingProvision>,
    by_code: Mutex<HashMap<String, CodeBinding>>,
    by_device: Mutex<HashMap<(Uuid, u32), oneshot::Sender<LinkedDevice>>>,
    /// Live provisioning sockets by their advertised address uuid, fed by
    /// `PUT /v1/provisioning/{destination}`.
    sockets: Mutex<HashMap<String, tokio::sync::mpsc::UnboundedSender<Vec<u8>>>>,
    timeout: Duration,
}

impl ProvisioningCoordinator {
    pub fn new(timeout: Duration) -> Self {
        ProvisioningCoordinator {
            provision_queue: PromiseQueue::with_timeout(timeout),
            by_code: Mutex::new(HashMap::new()),
            by_device: Mutex::new(HashMap::new()),
            sockets: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Registers a provisioning socket under its address uuid.
    pub fn register_socket(&self, uuid: String) -> tokio::sync::mpsc::UnboundedReceiver<Vec<u8>> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        self.sockets.lock().unwrap().insert(uuid, tx);
        rx
    }

    pub fn unregister_socket(&self, uuid: &str) {
        self.sockets.lock().unwrap().remove(uuid);
    }

    /// Delivers a provision envelope to a live provisioning socket.
    pub fn deliver_envelope(&self, uuid: &str, envelope: Vec<u8>) -> bool {
        match self.sockets.lock().unwrap().get(uuid) {
            Some(tx) => tx.send(envelope).is_ok(),
            None => false,
        }
    }

    /// Advertises a new link attempt and returns the handler-side ticket. The
    /// harness-side record is queued for [`wait`](Self::wait).
    pub fn advertise(&self, uuid: String) -> ProvisionTicket {
        let (response_tx, response_rx) = oneshot::channel();
        let (result_tx, result_rx) = oneshot::channel();
        self.provision_queue.push(PendingProvision {
            uuid,
            response_tx,
            result_rx,
            timeout: self.timeout,
        });
        ProvisionTicket {
            response_rx,
            result_tx,
        }
    }

    /// Harness side: waits for the next advertised attempt, in request order.
    pub async fn wait(&self) -> ServerResult<PendingProvision> {
        self.provision_queue.shift().await
    }

    /// Handler side: waits for the harness to fill in the response.
    pub async fn await_response(
        &self,
        response_rx: oneshot::Receiver<PendingProvisionResponse>,
    ) -> ServerResult<PendingProvisionResponse> {
        match timeout(self.timeout, response_rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) | Err(_) => Err(ServerError::QueueTimeout),
        }
    }

    /// Transition: advertised -> code-issued.
    pub fn bind_code(&self, code: String, primary_aci: Uuid, result_tx: oneshot::Sender<LinkedDevice>) {
        self.by_code.lock().unwrap().insert(
            code,
            CodeBinding {
                primary_aci,
                result_tx,
            },
        );
    }

    /// Transition: code-issued -> device-registered. A provisioning code maps
    /// to exactly one attempt and is consumed here; the caller re-keys the
    /// returned result sender with `bind_device` once a device id exists.
    pub fn take_code(&self, code: &str) -> ServerResult<(Uuid, oneshot::Sender<LinkedDevice>)> {
        let binding = self
            .by_code
            .lock()
            .unwrap()
            .remove(code)
            .ok_or(ServerError::NotFound("provisioning code"))?;
        Ok((binding.primary_aci, binding.result_tx))
    }

    pub fn bind_device(&self, aci: Uuid, device_id: u32, result_tx: oneshot::Sender<LinkedDevice>) {
        self.by_device
            .lock()
            .unwrap()
            .insert((aci, device_id), result_tx);
    }

    /// Transition: keys-uploaded (terminal). Completes the harness wait.
    pub fn complete_device(&self, aci: Uuid, device_id: u32, device: LinkedDevice) {
        if let Some(tx) = self.by_device.lock().unwrap().remove(&(aci, device_id)) {
            let _ = tx.send(device);
        }
    }

    /// Whether a link attempt is waiting on this device's key upload.
    pub fn has_pending_device(&self, aci: Uuid, device_id: u32) -> bool {
        self.by_device.lock().unwrap().contains_key(&(aci, device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> PrimaryDeviceSecrets {
        PrimaryDeviceSecrets {
            aci: Uuid::new_v4(),
            pni: Uuid::new_v4(),
            e164: "+12025550100".into(),
            profile_key: vec![1; 32],
            aci_identity: (vec![5; 33], vec![6; 32]),
            pni_identity: (vec![7; 33], vec![8; 32]),
        }
    }

    #[tokio::test]
    async fn test_full_state_machine() {
        let coordinator = ProvisioningCoordinator::new(Duration::from_secs(1));
        let primary_aci = Uuid::new_v4();

        // advertised
        let ticket = coordinator.advertise("provision-uuid".into());
        let pending = coordinator.wait().await.unwrap();
        assert_eq!(pending.uuid, "provision-uuid");

        // The harness completes concurrently with the handler's transitions.
        let mut response = PendingProvisionResponse {
            provision_url: "sgnl://linkdevice?uuid=x&pub_key=y".into(),
            primary: secrets(),
        };
        response.primary.aci = primary_aci;
        let harness = tokio::spawn(async move { pending.complete(response).await });

        let response = coordinator.await_response(ticket.response_rx).await.unwrap();
        assert_eq!(response.primary.aci, primary_aci);

        // code-issued
        coordinator.bind_code("123456".into(), primary_aci, ticket.result_tx);

        // device-registered
        let (aci, result_tx) = coordinator.take_code("123456").unwrap();
        assert_eq!(aci, primary_aci);
        coordinator.bind_device(aci, 2, result_tx);
        assert!(coordinator.has_pending_device(aci, 2));

        // keys-uploaded
        coordinator.complete_device(
            aci,
            2,
            LinkedDevice {
                aci,
                pni: Uuid::new_v4(),
                device_id: 2,
                registration_id: 4242,
            },
        );

        let device = harness.await.unwrap().unwrap();
        assert_eq!(device.device_id, 2);
        assert_eq!(device.registration_id, 4242);
    }

    #[tokio::test]
    async fn test_code_consumed_once() {
        let coordinator = ProvisioningCoordinator::new(Duration::from_secs(1));
        let (tx, _rx) = oneshot::channel();
        coordinator.bind_code("999999".into(), Uuid::new_v4(), tx);

        assert!(coordinator.take_code("999999").is_ok());
        assert!(matches!(
            coordinator.take_code("999999"),
            Err(ServerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let coordinator = ProvisioningCoordinator::new(Duration::from_millis(10));
        assert!(matches!(
            coordinator.wait().await,
            Err(ServerError::QueueTimeout)
        ));
    }

    #[tokio::test]
    async fn test_complete_times_out_when_link_stalls() {
        let coordinator = ProvisioningCoordinator::new(Duration::from_millis(20));
        let _ticket = coordinator.advertise("uuid".into());
        let pending = coordinator.wait().await.unwrap();

        let err = pending
            .complete(PendingProvisionResponse {
                provision_url: "sgnl://linkdevice?uuid=x&pub_key=y".into(),
                primary: secrets(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::ProvisionTimeout));
    }
}
