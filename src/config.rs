//! Server Configuration
//!
//! Certificate material is seeded from two JSON files under the certs
//! directory: `trust-root.json` (sealed-sender trust root keypair) and
//! `zk-params.json` (the three zkgroup parameter bundles). Missing files are
//! generated and written back so a fresh checkout self-seeds. Listener
//! settings come from environment variables.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use libsignal_protocol::{KeyPair, PrivateKey, PublicKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::info;
use zkgroup::generic_server_params::GenericServerSecretParams;
use zkgroup::ServerSecretParams;

use crate::error::{ServerError, ServerResult};
use crate::zkcred::ZkParams;

const TRUST_ROOT_FILE: &str = "trust-root.json";
const ZK_PARAMS_FILE: &str = "zk-params.json";

/// Paths to a PEM certificate chain and private key for the HTTPS listener.
#[derive(Debug, Clone)]
pub struct TlsPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Process-wide immutable configuration, loaded once at server construction.
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen_addr: SocketAddr,
    /// Sealed-sender trust root; clients pin the public half.
    pub trust_root: KeyPair,
    /// zkgroup parameter bundles (groups/profiles, call links, backups).
    pub zk_params: Arc<ZkParams>,
    /// TLS material; plain TCP when absent.
    pub tls: Option<TlsPaths>,
    /// Timeout applied to every harness-blocking wait.
    pub orchestration_timeout: Duration,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrustRootSeed {
    private_key: String,
    public_key: String,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZkParamsSeed {
    server_secret_params: String,
    generic_server_secret_params: String,
    backup_generic_server_secret_params: String,
}

impl ServerConfig {
    /// Loads configuration from `certs_dir` seed files plus env overrides.
    pub fn load(certs_dir: &Path) -> ServerResult<Self> {
        let mut config = ServerConfig {
            listen_addr: "127.0.0.1:8080".parse().unwrap(),
            trust_root: load_or_generate_trust_root(certs_dir)?,
            zk_params: Arc::new(load_or_generate_zk_params(certs_dir)?),
            tls: None,
            orchestration_timeout: crate::queue::DEFAULT_TIMEOUT,
        };

        if let Ok(addr) = std::env::var("SIGNAL_MOCK_LISTEN_ADDR") {
            if let Ok(parsed) = addr.parse() {
                config.listen_addr = parsed;
            }
        }

        if let Ok(val) = std::env::var("SIGNAL_MOCK_TIMEOUT_SECS") {
            if let Ok(parsed) = val.parse() {
                config.orchestration_timeout = Duration::from_secs(parsed);
            }
        }

        if let (Ok(cert), Ok(key)) = (
            std::env::var("SIGNAL_MOCK_TLS_CERT"),
            std::env::var("SIGNAL_MOCK_TLS_KEY"),
        ) {
            config.tls = Some(TlsPaths {
                cert_path: PathBuf::from(cert),
                key_path: PathBuf::from(key),
            });
        }

        Ok(config)
    }

    /// Fresh in-memory configuration for embedding the server in tests.
    pub fn for_tests() -> Self {
        let mut rng = OsRng;
        ServerConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            trust_root: KeyPair::generate(&mut rng),
            zk_params: Arc::new(ZkParams::generate(&mut rng)),
            tls: None,
            orchestration_timeout: crate::queue::DEFAULT_TIMEOUT,
        }
    }
}

/// Loads the trust root keypair, generating and saving one if absent.
fn load_or_generate_trust_root(certs_dir: &Path) -> ServerResult<KeyPair> {
    let path = certs_dir.join(TRUST_ROOT_FILE);

    if let Ok(data) = std::fs::read(&path) {
        let seed: TrustRootSeed = serde_json::from_slice(&data)
            .map_err(|e| ServerError::Internal(format!("parse {}: {}", path.display(), e)))?;
        let private = PrivateKey::deserialize(&decode_b64(&seed.private_key)?)?;
        let public = PublicKey::deserialize(&decode_b64(&seed.public_key)?)?;
        return Ok(KeyPair::new(public, private));
    }

    let key_pair = KeyPair::generate(&mut OsRng);
    let seed = TrustRootSeed {
        private_key: BASE64.encode(key_pair.private_key.serialize()),
        public_key: BASE64.encode(key_pair.public_key.serialize()),
    };
    save_seed(certs_dir, &path, &seed)?;
    info!("Generated trust root at {}", path.display());
    Ok(key_pair)
}

/// Loads the zkgroup parameter bundles, generating and saving them if absent.
fn load_or_generate_zk_params(certs_dir: &Path) -> ServerResult<ZkParams> {
    let path = certs_dir.join(ZK_PARAMS_FILE);

    if let Ok(data) = std::fs::read(&path) {
        let seed: ZkParamsSeed = serde_json::from_slice(&data)
            .map_err(|e| ServerError::Internal(format!("parse {}: {}", path.display(), e)))?;
        let server_secret: ServerSecretParams =
            zkgroup::deserialize(&decode_b64(&seed.server_secret_params)?)?;
        let generic_secret: GenericServerSecretParams =
            zkgroup::deserialize(&decode_b64(&seed.generic_server_secret_params)?)?;
        let backup_secret: GenericServerSecretParams =
            zkgroup::deserialize(&decode_b64(&seed.backup_generic_server_secret_params)?)?;
        return Ok(ZkParams {
            server_secret,
            generic_secret,
            backup_secret,
        });
    }

    let params = ZkParams::generate(&mut OsRng);
    let seed = ZkParamsSeed {
        server_secret_params: BASE64.encode(zkgroup::serialize(&params.server_secret)),
        generic_server_secret_params: BASE64.encode(zkgroup::serialize(&params.generic_secret)),
        backup_generic_server_secret_params: BASE64
            .encode(zkgroup::serialize(&params.backup_secret)),
    };
    save_seed(certs_dir, &path, &seed)?;
    info!("Generated zk params at {}", path.display());
    Ok(params)
}

fn save_seed<T: Serialize>(certs_dir: &Path, path: &Path, seed: &T) -> ServerResult<()> {
    std::fs::create_dir_all(certs_dir)
        .map_err(|e| ServerError::Internal(format!("create {}: {}", certs_dir.display(), e)))?;
    let json = serde_json::to_vec_pretty(seed)
        .map_err(|e| ServerError::Internal(format!("serialize seed: {}", e)))?;
    std::fs::write(path, json)
        .map_err(|e| ServerError::Internal(format!("write {}: {}", path.display(), e)))?;
    Ok(())
}

fn decode_b64(value: &str) -> ServerResult<Vec<u8>> {
    BASE64
        .decode(value)
        .map_err(|e| ServerError::Internal(format!("seed base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_trust_root_generate_then_load_is_stable() {
        let dir = tempdir().unwrap();
        let first = load_or_generate_trust_root(dir.path()).unwrap();
        let second = load_or_generate_trust_root(dir.path()).unwrap();
        assert_eq!(
            first.public_key.serialize(),
            second.public_key.serialize()
        );
        assert_eq!(
            first.private_key.serialize(),
            second.private_key.serialize()
        );
    }

    #[test]
    fn test_zk_params_generate_then_load_is_stable() {
        let dir = tempdir().unwrap();
        let first = load_or_generate_zk_params(dir.path()).unwrap();
        let second = load_or_generate_zk_params(dir.path()).unwrap();
        assert_eq!(
            zkgroup::serialize(&first.server_secret),
            zkgroup::serialize(&second.server_secret)
        );
        assert_eq!(
            zkgroup::serialize(&first.backup_secret),
            zkgroup::serialize(&second.backup_secret)
        );
    }

    #[test]
    fn test_load_rejects_corrupt_seed() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(TRUST_ROOT_FILE), b"not json").unwrap();
        assert!(load_or_generate_trust_root(dir.path()).is_err());
    }

    #[test]
    fn test_for_tests_has_no_tls() {
        let config = ServerConfig::for_tests();
        assert!(config.tls.is_none());
        assert_eq!(config.listen_addr.port(), 0);
    }
}
