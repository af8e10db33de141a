// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client for the intake endpoint.
//!
//! Without TLS options the client uses reqwest's stock rustls setup. With any
//! of them set, a rustls `ClientConfig` is built here and handed to reqwest:
//!
//! - a root CA bundle replaces the system roots,
//! - a server name makes the certificate check use that name instead of the url host,
//! - `insecure_skip_verify` accepts any certificate.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, warn};

use crate::config::{Config, TlsOptions};
use crate::constants::REQUEST_TIMEOUT;
use crate::errors::ConfigError;

/// Builds the client used by one pipeline's sender.
///
/// An unusable proxy url is reported and the client is built without a proxy.
pub fn build_client(config: &Config) -> Result<reqwest::Client, ConfigError> {
    let mut builder = if config.tls.is_default() {
        reqwest::Client::builder().use_rustls_tls()
    } else {
        reqwest::Client::builder().use_preconfigured_tls(tls_config(&config.tls)?)
    };
    builder = builder.timeout(REQUEST_TIMEOUT);

    if let Some(proxy_url) = &config.proxy_url {
        match reqwest::Proxy::all(proxy_url.as_str()) {
            Ok(proxy) => {
                debug!("Sending logs through proxy {proxy_url}");
                builder = builder.proxy(proxy);
            }
            Err(e) => warn!("Invalid proxy {proxy_url}, initializing without proxy: {e}"),
        }
    }

    Ok(builder.build()?)
}

fn tls_config(tls: &TlsOptions) -> Result<ClientConfig, ConfigError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ConfigError::Tls(e.to_string()))?;

    let mut config = if tls.insecure_skip_verify {
        warn!("TLS certificate verification is disabled");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate { provider }))
            .with_no_client_auth()
    } else {
        let roots = Arc::new(root_store(tls.root_ca_pem.as_deref())?);
        match &tls.server_name {
            Some(name) => {
                let server_name = ServerName::try_from(name.clone())
                    .map_err(|e| ConfigError::Tls(format!("invalid server name {name:?}: {e}")))?;
                let inner = WebPkiServerVerifier::builder_with_provider(roots, provider)
                    .build()
                    .map_err(|e| ConfigError::Tls(e.to_string()))?;
                builder
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(ServerNameOverride {
                        inner,
                        server_name,
                    }))
                    .with_no_client_auth()
            }
            None => builder.with_root_certificates(roots).with_no_client_auth(),
        }
    };
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(config)
}

fn root_store(root_ca_pem: Option<&[u8]>) -> Result<RootCertStore, ConfigError> {
    let mut store = RootCertStore::empty();
    let Some(pem) = root_ca_pem else {
        let native = rustls_native_certs::load_native_certs();
        for err in &native.errors {
            debug!("Failed to load a native certificate: {err}");
        }
        let (added, ignored) = store.add_parsable_certificates(native.certs);
        debug!("Loaded {added} native root certificates, ignored {ignored}");
        return Ok(store);
    };

    for cert in CertificateDer::pem_slice_iter(pem) {
        let cert = cert.map_err(|e| ConfigError::Tls(format!("invalid root CA: {e}")))?;
        store
            .add(cert)
            .map_err(|e| ConfigError::Tls(format!("invalid root CA: {e}")))?;
    }
    if store.is_empty() {
        return Err(ConfigError::Tls(
            "root CA file holds no certificate".to_string(),
        ));
    }
    Ok(store)
}

/// Checks the chain against a fixed name instead of the url host.
#[derive(Debug)]
struct ServerNameOverride {
    inner: Arc<WebPkiServerVerifier>,
    server_name: ServerName<'static>,
}

impl ServerCertVerifier for ServerNameOverride {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        self.inner.verify_server_cert(
            end_entity,
            intermediates,
            &self.server_name,
            ocsp_response,
            now,
        )
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

/// Accepts any certificate chain. Handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyCertificate {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
