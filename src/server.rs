//! Test Facade
//!
//! The embedding surface integration tests drive: start/stop the listener,
//! create primary and secondary devices directly against the state, and the
//! orchestration waits (`wait_for_provision`, `wait_for_storage_manifest`)
//! that rendezvous with in-flight client requests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use libsignal_protocol::KeyPair;
use rand::rngs::OsRng;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use crate::account::IdentityKind;
use crate::config::ServerConfig;
use crate::crypto;
use crate::error::{ServerError, ServerResult};
use crate::provisioning::{PendingProvision, PrimaryDeviceSecrets};
use crate::routes;
use crate::state::{
    AuthenticatedDevice, KeyUpload, LinkAttributes, RegistrationRequest, ServerState,
};
use crate::tls;
use crate::websocket::{self, WsContext};

/// Options for [`Server::create_primary_device`].
#[derive(Debug, Clone, Default)]
pub struct PrimaryDeviceOptions {
    pub profile_name: String,
}

/// A primary device the harness drives. Holds identifiers and client-side key
/// material only; all state lives in the server it references.
pub struct PrimaryDevice {
    pub aci: Uuid,
    pub pni: Uuid,
    pub e164: String,
    pub device_id: u32,
    pub registration_id: u32,
    pub pni_registration_id: u32,
    pub password: String,
    pub profile_name: String,
    pub profile_key: Vec<u8>,
    pub aci_identity: KeyPair,
    pub pni_identity: KeyPair,
    state: Arc<ServerState>,
}

impl PrimaryDevice {
    /// The material the provisioning coordinator packs into a
    /// `ProvisionMessage` for a linking secondary.
    pub fn secrets(&self) -> PrimaryDeviceSecrets {
        PrimaryDeviceSecrets {
            aci: self.aci,
            pni: self.pni,
            e164: self.e164.clone(),
            profile_key: self.profile_key.clone(),
            aci_identity: (
                self.aci_identity.public_key.serialize().into_vec(),
                self.aci_identity.private_key.serialize(),
            ),
            pni_identity: (
                self.pni_identity.public_key.serialize().into_vec(),
                self.pni_identity.private_key.serialize(),
            ),
        }
    }

    pub fn auth(&self) -> AuthenticatedDevice {
        AuthenticatedDevice {
            aci: self.aci,
            pni: self.pni,
            e164: self.e164.clone(),
            device_id: self.device_id,
        }
    }

    /// Basic `Authorization` header value for this device.
    pub fn authorization(&self) -> String {
        crate::auth::basic_header(&self.aci.to_string(), self.device_id, &self.password)
    }

    pub fn server_state(&self) -> &Arc<ServerState> {
        &self.state
    }
}

/// A directly linked secondary device.
pub struct SecondaryDevice {
    pub aci: Uuid,
    pub pni: Uuid,
    pub device_id: u32,
    pub registration_id: u32,
    pub pni_registration_id: u32,
    pub password: String,
}

/// The mock server: protocol state plus its HTTPS/WebSocket listener.
pub struct Server {
    state: Arc<ServerState>,
    app: axum::Router,
    listener_task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let state = Arc::new(ServerState::new(config)?);
        let api = routes::router(state.clone());
        let ws = websocket::router(WsContext {
            state: state.clone(),
            api: api.clone(),
        });
        Ok(Server {
            state,
            app: api.merge(ws),
            listener_task: Mutex::new(None),
            local_addr: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        })
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Binds and serves; returns the bound address (port 0 allocates one).
    pub async fn listen(&self, addr: SocketAddr) -> ServerResult<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("bind {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::Internal(format!("local addr: {}", e)))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let app = self.app.clone();

        let task = match &self.state.config.tls {
            None => {
                let mut shutdown_rx = shutdown_rx;
                tokio::spawn(async move {
                    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                        let _ = shutdown_rx.changed().await;
                    });
                    if let Err(e) = serve.await {
                        tracing::error!("listener failed: {}", e);
                    }
                })
            }
            Some(paths) => {
                let acceptor = tls::build_acceptor(paths)?;
                let mut shutdown_rx = shutdown_rx;
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            accepted = listener.accept() => {
                                let Ok((stream, _peer)) = accepted else { continue };
                                let acceptor = acceptor.clone();
                                let app = app.clone();
                                tokio::spawn(async move {
                                    let Ok(tls_stream) = acceptor.accept(stream).await else {
                                        return;
                                    };
                                    let service =
                                        hyper_util::service::TowerToHyperService::new(app);
                                    let builder = hyper_util::server::conn::auto::Builder::new(
                                        hyper_util::rt::TokioExecutor::new(),
                                    );
                                    let _ = builder
                                        .serve_connection_with_upgrades(
                                            hyper_util::rt::TokioIo::new(tls_stream),
                                            service,
                                        )
                                        .await;
                                });
                            }
                            _ = shutdown_rx.changed() => break,
                        }
                    }
                })
            }
        };

        *self.listener_task.lock().unwrap() = Some(task);
        *self.local_addr.lock().unwrap() = Some(local_addr);
        *self.shutdown_tx.lock().unwrap() = Some(shutdown_tx);
        info!("listening on {}", local_addr);
        Ok(local_addr)
    }

    pub fn address(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().unwrap()
    }

    /// Stops the listener. In-memory state survives until drop.
    pub fn close(&self) {
        if let Some(tx) = self.shutdown_tx.lock().unwrap().take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.listener_task.lock().unwrap().take() {
            task.abort();
        }
        *self.local_addr.lock().unwrap() = None;
    }

    /// Waits for the next advertised link attempt.
    pub async fn wait_for_provision(&self) -> ServerResult<PendingProvision> {
        self.state.provisioning.wait().await
    }

    /// Waits until `aci`'s storage manifest version exceeds `after_version`.
    pub async fn wait_for_storage_manifest(&self, aci: Uuid, after_version: u64) -> ServerResult<u64> {
        self.state
            .wait_for_manifest(aci, after_version, self.state.config.orchestration_timeout)
            .await
    }

    /// Registers a fresh account + primary device with generated identity
    /// material, the way a real client would during registration.
    pub fn create_primary_device(
        &self,
        options: PrimaryDeviceOptions,
    ) -> ServerResult<PrimaryDevice> {
        let mut rng = OsRng;
        let aci_identity = KeyPair::generate(&mut rng);
        let pni_identity = KeyPair::generate(&mut rng);
        let password = crypto::generate_password(&mut rng);
        let profile_key = crypto::generate_profile_key(&mut rng).to_vec();
        let registration_id = crypto::generate_registration_id(&mut rng) as u32;
        let pni_registration_id = crypto::generate_registration_id(&mut rng) as u32;

        let registered = self.state.register_account(RegistrationRequest {
            e164: None,
            password: password.clone(),
            registration_id,
            pni_registration_id,
            fetches_messages: true,
            name: None,
            aci_identity_key: Some(aci_identity.public_key.serialize().into_vec()),
            pni_identity_key: Some(pni_identity.public_key.serialize().into_vec()),
            profile_key: Some(profile_key.clone()),
            ..RegistrationRequest::default()
        })?;

        Ok(PrimaryDevice {
            aci: registered.aci,
            pni: registered.pni,
            e164: registered.e164,
            device_id: registered.device_id,
            registration_id,
            pni_registration_id,
            password,
            profile_name: options.profile_name,
            profile_key,
            aci_identity,
            pni_identity,
            state: self.state.clone(),
        })
    }

    /// Links a secondary device to `primary` directly, skipping the
    /// provisioning wire dance.
    pub fn create_secondary_device(&self, primary: &PrimaryDevice) -> ServerResult<SecondaryDevice> {
        let mut rng = OsRng;
        let password = crypto::generate_password(&mut rng);
        let registration_id = crypto::generate_registration_id(&mut rng) as u32;
        let pni_registration_id = crypto::generate_registration_id(&mut rng) as u32;

        let code = crypto::generate_provisioning_code();
        let (result_tx, _result_rx) = tokio::sync::oneshot::channel();
        self.state
            .provisioning
            .bind_code(code.clone(), primary.aci, result_tx);

        let linked = self.state.link_device(
            &code,
            LinkAttributes {
                password: password.clone(),
                registration_id,
                pni_registration_id,
                name: None,
                fetches_messages: true,
            },
        )?;

        // Give the device the shared account identity plus a fresh signed
        // prekey so bundle fetches against it succeed.
        let auth = AuthenticatedDevice {
            aci: linked.aci,
            pni: linked.pni,
            e164: linked.e164.clone(),
            device_id: linked.device_id,
        };
        let signed = signed_prekey_for(&primary.aci_identity, 1, &mut rng)?;
        self.state.update_device_keys(
            &auth,
            IdentityKind::Aci,
            KeyUpload {
                identity_key: Some(primary.aci_identity.public_key.serialize().into_vec()),
                signed_pre_key: Some(signed),
                ..KeyUpload::default()
            },
        )?;

        Ok(SecondaryDevice {
            aci: linked.aci,
            pni: linked.pni,
            device_id: linked.device_id,
            registration_id,
            pni_registration_id,
            password,
        })
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(task) = self.listener_task.lock().unwrap().take() {
            task.abort();
        }
    }
}

fn signed_prekey_for(
    identity: &KeyPair,
    key_id: u32,
    rng: &mut OsRng,
) -> ServerResult<crate::account::StoredSignedPreKey> {
    let key = KeyPair::generate(rng);
    let public_key = key.public_key.serialize().into_vec();
    let signature = identity
        .private_key
        .calculate_signature(&public_key, rng)?
        .into_vec();
    Ok(crate::account::StoredSignedPreKey {
        key_id,
        public_key,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_server() -> Server {
        Server::new(ServerConfig::for_tests()).unwrap()
    }

    #[tokio::test]
    async fn test_listen_and_close() {
        let server = test_server();
        let addr = server.listen("127.0.0.1:0".parse().unwrap()).await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.address(), Some(addr));
        server.close();
        assert_eq!(server.address(), None);
    }

    #[tokio::test]
    async fn test_create_primary_device_registers_account() {
        let server = test_server();
        let primary = server
            .create_primary_device(PrimaryDeviceOptions {
                profile_name: "Alice".into(),
            })
            .unwrap();

        assert_eq!(primary.device_id, 1);
        assert!(primary.e164.starts_with("+1"));
        // The account authenticates with the generated credentials.
        let auth = server
            .state()
            .authenticate(&format!("{}.1", primary.aci), &primary.password)
            .unwrap();
        assert_eq!(auth.aci, primary.aci);
    }

    #[tokio::test]
    async fn test_create_secondary_device_links() {
        let server = test_server();
        let primary = server
            .create_primary_device(PrimaryDeviceOptions {
                profile_name: "Alice".into(),
            })
            .unwrap();
        let secondary = server.create_secondary_device(&primary).unwrap();

        assert_eq!(secondary.aci, primary.aci);
        assert_eq!(secondary.device_id, 2);

        // The new device serves prekey bundles under the shared identity.
        let bundles = server
            .state()
            .prekey_bundles(&primary.aci.to_string(), "2", false)
            .unwrap();
        assert_eq!(
            bundles.identity_key,
            primary.aci_identity.public_key.serialize().into_vec()
        );
    }
}
