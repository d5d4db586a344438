//! TLS trust establishment: the three trust modes (system roots, a pinned
//! certificate file, or a pinned certificate hash) plus ALPN negotiation.

use std::fs;
use std::net::TcpStream;

use native_tls::{Certificate, TlsConnector, TlsStream};

use mapi_common::err::mapi_error::MapiError;
use mapi_common::err::MapiResult;

use crate::target::Target;

/// How the client decides to trust the server's certificate.
#[derive(Debug, Clone)]
pub enum TrustMode {
    /// Validate against the platform's system root store (the default).
    System,
    /// Validate against a single PEM certificate file.
    Cert(String),
    /// Skip chain validation; only the certificate's digest must match.
    Hash(String),
}

impl TrustMode {
    pub fn from_target(target: &Target) -> MapiResult<TrustMode> {
        match (&target.cert, &target.certhash) {
            (Some(_), Some(_)) => Err(MapiError::Config(
                "cert and certhash are mutually exclusive".into(),
            )),
            (Some(path), None) => Ok(TrustMode::Cert(path.clone())),
            (None, Some(hash)) => Ok(TrustMode::Hash(hash.clone())),
            (None, None) => Ok(TrustMode::System),
        }
    }
}

/// The ALPN protocol id MonetDB servers speak. Negotiation is best-effort:
/// a server that does not support ALPN simply proceeds without it.
pub const ALPN_PROTOCOL: &str = "mapi/9";

/// Builds a connector for the given trust mode. Prefers TLS 1.3 where the
/// platform's TLS backend allows requesting a minimum version; falls back
/// silently on backends that don't expose the knob (native-tls's guarantee
/// is "at least the platform default").
fn build_connector(mode: &TrustMode, client_cert: Option<(&str, &str)>) -> MapiResult<TlsConnector> {
    let mut builder = TlsConnector::builder();
    builder.min_protocol_version(Some(native_tls::Protocol::Tlsv12));
    builder.request_alpns(&[ALPN_PROTOCOL]);

    match mode {
        TrustMode::System => {}
        TrustMode::Cert(path) => {
            let pem = fs::read(path)
                .map_err(|e| MapiError::Tls(format!("reading cert file {}: {}", path, e)))?;
            let cert = Certificate::from_pem(&pem)
                .map_err(|e| MapiError::Tls(format!("parsing cert file {}: {}", path, e)))?;
            builder.add_root_certificate(cert);
        }
        TrustMode::Hash(_) => {
            // Chain validation is meaningless when the client trusts the leaf
            // by digest alone; hostname checks are disabled too since the
            // hash already pins the exact certificate presented.
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
    }

    if let Some((cert_path, key_path)) = client_cert {
        let cert_pem = fs::read(cert_path)
            .map_err(|e| MapiError::Tls(format!("reading client cert {}: {}", cert_path, e)))?;
        let key_pem = fs::read(key_path)
            .map_err(|e| MapiError::Tls(format!("reading client key {}: {}", key_path, e)))?;
        let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem)
            .map_err(|e| MapiError::Tls(format!("loading client identity: {}", e)))?;
        builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| MapiError::Tls(format!("building TLS connector: {}", e)))
}

/// Wraps an established TCP stream in TLS, validating per `mode`. For
/// `TrustMode::Hash`, the leaf certificate's SHA-256 digest is checked
/// against the pinned value after the handshake completes (native-tls has
/// no pre-handshake hook for this, so chain validation is disabled and the
/// digest check happens as a post-condition).
pub fn wrap(
    stream: TcpStream,
    host: &str,
    mode: &TrustMode,
    client_cert: Option<(&str, &str)>,
) -> MapiResult<TlsStream<TcpStream>> {
    let connector = build_connector(mode, client_cert)?;
    let tls = connector
        .connect(host, stream)
        .map_err(|e| MapiError::Tls(format!("TLS handshake with {}: {}", host, e)))?;

    if let TrustMode::Hash(expected) = mode {
        let cert = tls
            .peer_certificate()
            .map_err(|e| MapiError::Tls(format!("reading peer certificate: {}", e)))?
            .ok_or_else(|| MapiError::Tls("server presented no certificate".into()))?;
        let der = cert
            .to_der()
            .map_err(|e| MapiError::Tls(format!("encoding peer certificate: {}", e)))?;
        verify_certhash(&der, expected)?;
    }

    Ok(tls)
}

fn verify_certhash(der: &[u8], expected: &str) -> MapiResult<()> {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(der);
    let actual = hex::encode(digest);

    let expected_hex: String = expected
        .strip_prefix("sha256:")
        .unwrap_or(expected)
        .chars()
        .filter(|c| *c != ':')
        .collect::<String>()
        .to_ascii_lowercase();

    if actual.starts_with(&expected_hex) {
        Ok(())
    } else {
        Err(MapiError::Tls(format!(
            "certificate hash mismatch: expected prefix {}, got {}",
            expected_hex, actual
        )))
    }
}
