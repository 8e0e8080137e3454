//! TLS Listener Configuration
//!
//! Loads the PEM certificate chain and private key for the HTTPS listener
//! into a rustls server config. Tests embed the server without TLS; the
//! binary enables it when cert paths are configured.

use std::io::BufReader;
use std::sync::Arc;

use tokio_rustls::rustls::{self, pki_types};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsPaths;
use crate::error::{ServerError, ServerResult};

/// Loads PEM certificates from a file path.
fn load_certs(path: &std::path::Path) -> ServerResult<Vec<pki_types::CertificateDer<'static>>> {
    let file = std::fs::File::open(path)
        .map_err(|e| ServerError::Internal(format!("open cert file {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::Internal(format!("parse certs {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(ServerError::Internal(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

/// Loads a PEM private key from a file path.
fn load_private_key(path: &std::path::Path) -> ServerResult<pki_types::PrivateKeyDer<'static>> {
    let file = std::fs::File::open(path)
        .map_err(|e| ServerError::Internal(format!("open key file {}: {}", path.display(), e)))?;
    let mut reader = BufReader::new(file);

    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| ServerError::Internal(format!("parse key {}: {}", path.display(), e)))?
        .ok_or_else(|| ServerError::Internal(format!("no private key in {}", path.display())))
}

/// Builds a TLS acceptor from the configured cert/key paths.
pub fn build_acceptor(paths: &TlsPaths) -> ServerResult<TlsAcceptor> {
    let certs = load_certs(&paths.cert_path)?;
    let key = load_private_key(&paths.key_path)?;

    let config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| ServerError::Internal(format!("build TLS config: {}", e)))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_load_certs_missing_file() {
        let result = load_certs(&PathBuf::from("/nonexistent/cert.pem"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_private_key_missing_file() {
        let result = load_private_key(&PathBuf::from("/nonexistent/key.pem"));
        assert!(result.is_err());
    }

    #[test]
    fn test_build_acceptor_missing_files() {
        let paths = TlsPaths {
            cert_path: PathBuf::from("/nonexistent/cert.pem"),
            key_path: PathBuf::from("/nonexistent/key.pem"),
        };
        assert!(build_acceptor(&paths).is_err());
    }
}
