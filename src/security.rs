/// mTLS material for the HTTP surface.
///
/// When `security.mtls.enabled`, both sides of every connection present a
/// certificate. The CA pool, when supplied, gates client verification
/// (require-and-verify); without it client certificates are not required
/// and the server logs a warning. Unreadable or invalid material is fatal
/// at startup. Disabled mTLS yields plain HTTP and a plain client.
use crate::config::MtlsConfig;
use crate::error::{TesseraError, TesseraResult};
use rustls::server::AllowAnyAuthenticatedClient;
use rustls::{Certificate, PrivateKey, RootCertStore, ServerConfig};
use std::sync::Arc;

fn tls_error(reason: impl std::fmt::Display) -> TesseraError {
    TesseraError::TlsSetup {
        reason: reason.to_string(),
    }
}

fn read_file(path: &str, what: &str) -> TesseraResult<Vec<u8>> {
    std::fs::read(path).map_err(|e| tls_error(format!("failed to read {} {}: {}", what, path, e)))
}

fn load_certificates(pem: &[u8]) -> TesseraResult<Vec<Certificate>> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader)
        .map_err(|e| tls_error(format!("failed to parse certificate: {}", e)))?;
    if certs.is_empty() {
        return Err(tls_error("no certificates found in certificate file"));
    }
    Ok(certs.into_iter().map(Certificate).collect())
}

/// Parse a private key, trying PKCS#8 first and falling back to RSA.
fn load_private_key(pem: &[u8]) -> TesseraResult<PrivateKey> {
    let mut reader = pem;
    let mut keys = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .map_err(|e| tls_error(format!("failed to parse PKCS8 key: {}", e)))?;

    if keys.is_empty() {
        let mut reader = pem;
        keys = rustls_pemfile::rsa_private_keys(&mut reader)
            .map_err(|e| tls_error(format!("failed to parse RSA key: {}", e)))?;
    }

    keys.into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| tls_error("no private keys found in key file"))
}

/// Build the rustls server config, or `None` when mTLS is disabled.
///
/// `with_safe_defaults` pins the protocol floor at TLS 1.2.
pub fn server_config(cfg: &MtlsConfig) -> TesseraResult<Option<ServerConfig>> {
    if !cfg.enabled {
        tracing::info!("mTLS is disabled");
        return Ok(None);
    }

    let cert_chain = load_certificates(&read_file(&cfg.cert_file, "cert file")?)?;
    let key = load_private_key(&read_file(&cfg.key_file, "key file")?)?;

    let builder = ServerConfig::builder().with_safe_defaults();
    let config = if cfg.ca_cert.is_empty() {
        tracing::warn!("no CA cert provided, skipping client cert verification");
        builder
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)
            .map_err(|e| tls_error(format!("failed to build TLS config: {}", e)))?
    } else {
        let mut roots = RootCertStore::empty();
        for ca in load_certificates(&read_file(&cfg.ca_cert, "CA cert file")?)? {
            roots
                .add(&ca)
                .map_err(|e| tls_error(format!("failed to add CA cert to pool: {}", e)))?;
        }
        builder
            .with_client_cert_verifier(AllowAnyAuthenticatedClient::new(roots).boxed())
            .with_single_cert(cert_chain, key)
            .map_err(|e| tls_error(format!("failed to build TLS config: {}", e)))?
    };

    tracing::info!("mTLS config loaded");
    Ok(Some(config))
}

/// Prepared material for `axum_server::bind_rustls`, or `None` when
/// mTLS is disabled.
pub fn rustls_config(
    cfg: &MtlsConfig,
) -> TesseraResult<Option<axum_server::tls_rustls::RustlsConfig>> {
    Ok(server_config(cfg)?
        .map(|config| axum_server::tls_rustls::RustlsConfig::from_config(Arc::new(config))))
}

/// HTTP client for peer traffic: presents the node certificate and trusts
/// the cluster CA when mTLS is enabled, plain otherwise.
pub fn http_client(cfg: &MtlsConfig) -> TesseraResult<reqwest::Client> {
    if !cfg.enabled {
        return reqwest::Client::builder()
            .build()
            .map_err(|e| tls_error(format!("failed to build HTTP client: {}", e)));
    }

    let mut identity_pem = read_file(&cfg.cert_file, "cert file")?;
    identity_pem.extend_from_slice(&read_file(&cfg.key_file, "key file")?);
    let identity = reqwest::Identity::from_pem(&identity_pem)
        .map_err(|e| tls_error(format!("failed to load client identity: {}", e)))?;

    let mut builder = reqwest::Client::builder().use_rustls_tls().identity(identity);
    if !cfg.ca_cert.is_empty() {
        let ca = reqwest::Certificate::from_pem(&read_file(&cfg.ca_cert, "CA cert file")?)
            .map_err(|e| tls_error(format!("failed to load CA cert: {}", e)))?;
        builder = builder.add_root_certificate(ca);
    }
    builder
        .build()
        .map_err(|e| tls_error(format!("failed to build mTLS client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_mtls_yields_nothing() {
        let cfg = MtlsConfig::default();
        assert!(server_config(&cfg).unwrap().is_none());
        assert!(rustls_config(&cfg).unwrap().is_none());
        http_client(&cfg).unwrap();
    }

    #[test]
    fn test_missing_cert_file_is_fatal() {
        let cfg = MtlsConfig {
            enabled: true,
            cert_file: "/nonexistent/cert.pem".to_string(),
            key_file: "/nonexistent/key.pem".to_string(),
            ca_cert: String::new(),
        };
        assert!(matches!(
            server_config(&cfg),
            Err(TesseraError::TlsSetup { .. })
        ));
        assert!(matches!(
            http_client(&cfg),
            Err(TesseraError::TlsSetup { .. })
        ));
    }

    #[test]
    fn test_garbage_pem_is_fatal() {
        use std::io::Write;
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        cert.write_all(b"not a pem").unwrap();
        let mut key = tempfile::NamedTempFile::new().unwrap();
        key.write_all(b"also not a pem").unwrap();

        let cfg = MtlsConfig {
            enabled: true,
            cert_file: cert.path().to_string_lossy().into_owned(),
            key_file: key.path().to_string_lossy().into_owned(),
            ca_cert: String::new(),
        };
        assert!(matches!(
            server_config(&cfg),
            Err(TesseraError::TlsSetup { .. })
        ));
    }
}
