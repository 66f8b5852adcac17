//! In-memory certificate authority. A root CA is generated once at process
//! startup and used to mint a fresh leaf certificate for every intercepted
//! host; sandbox images trust this root ahead of time, matching the
//! pre-trusted-CA design named in SPEC_FULL.md §6. There is no teacher
//! module for TLS interception — this is grounded in the `rcgen`/`rustls`
//! stack already present in the wider example pack (see DESIGN.md).

use std::sync::Arc;

use dashmap::DashMap;
use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use rustls::ServerConfig;
use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::error::{ProxyError, Result};

pub struct CertAuthority {
    ca_key: KeyPair,
    ca_cert: rcgen::Certificate,
    leaf_cache: DashMap<String, Arc<ServerConfig>>,
}

impl CertAuthority {
    /// Generate a fresh root CA. A persisted-CA variant (loading
    /// `PROXY_CA_CERT`/`PROXY_CA_KEY` from disk) would slot in here without
    /// changing `server_config_for`'s callers.
    pub fn generate() -> Result<Self> {
        let mut params =
            CertificateParams::new(Vec::<String>::new()).map_err(|e| ProxyError::Tls(e.to_string()))?;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(DnType::CommonName, "yolo-cage egress proxy root CA");

        let ca_key = KeyPair::generate().map_err(|e| ProxyError::Tls(e.to_string()))?;
        let ca_cert = params
            .self_signed(&ca_key)
            .map_err(|e| ProxyError::Tls(e.to_string()))?;

        Ok(CertAuthority {
            ca_key,
            ca_cert,
            leaf_cache: DashMap::new(),
        })
    }

    /// PEM encoding of the root certificate, for baking into sandbox images.
    pub fn root_cert_pem(&self) -> String {
        self.ca_cert.pem()
    }

    /// Mint (or fetch from cache) a TLS server config presenting a leaf
    /// certificate for `host`, signed by the in-memory root CA.
    pub fn server_config_for(&self, host: &str) -> Result<Arc<ServerConfig>> {
        if let Some(existing) = self.leaf_cache.get(host) {
            return Ok(existing.clone());
        }

        let mut params = CertificateParams::new(vec![host.to_string()])
            .map_err(|e| ProxyError::Tls(e.to_string()))?;
        params.distinguished_name.push(DnType::CommonName, host);

        let leaf_key = KeyPair::generate().map_err(|e| ProxyError::Tls(e.to_string()))?;
        let leaf_cert = params
            .signed_by(&leaf_key, &self.ca_cert, &self.ca_key)
            .map_err(|e| ProxyError::Tls(e.to_string()))?;

        let cert_der: CertificateDer<'static> = leaf_cert.der().clone();
        let key_der: PrivateKeyDer<'static> =
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));

        let mut config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der)
            .map_err(|e| ProxyError::Tls(e.to_string()))?;
        config.alpn_protocols = vec![b"http/1.1".to_vec()];

        let config = Arc::new(config);
        self.leaf_cache.insert(host.to_string(), config.clone());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mints_distinct_configs_per_host_and_caches_repeats() {
        let ca = CertAuthority::generate().unwrap();
        let first = ca.server_config_for("example.com").unwrap();
        let again = ca.server_config_for("example.com").unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        let other = ca.server_config_for("other.example.com").unwrap();
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn root_cert_pem_is_well_formed() {
        let ca = CertAuthority::generate().unwrap();
        let pem = ca.root_cert_pem();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----"));
    }
}
