// Copyright 2023 Pants project contributors (see CONTRIBUTORS.md).
// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! TLS configuration for the RPC facade's client and server channels.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};

/// Whether the peer certificate chain should be validated. `DangerouslyDisabled` exists for local
/// development and integration tests only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CertificateCheck {
    #[default]
    Enabled,
    DangerouslyDisabled,
}

/// Raw TLS material (PEM-encoded) plus the validation policy, convertible into a `rustls`
/// `ClientConfig` via `TryInto`.
#[derive(Clone, Default)]
pub struct Config {
    pub root_ca_certs: Option<Vec<u8>>,
    pub client_identity: Option<(Vec<u8>, Vec<u8>)>,
    pub certificate_check: CertificateCheck,
}

impl Config {
    pub fn new(
        root_ca_certs: Option<&[u8]>,
        client_identity: Option<(&[u8], &[u8])>,
    ) -> Result<Config, String> {
        Ok(Config {
            root_ca_certs: root_ca_certs.map(|c| c.to_vec()),
            client_identity: client_identity.map(|(c, k)| (c.to_vec(), k.to_vec())),
            certificate_check: CertificateCheck::Enabled,
        })
    }
}

impl TryFrom<Config> for ClientConfig {
    type Error = String;

    fn try_from(config: Config) -> Result<ClientConfig, String> {
        let builder = ClientConfig::builder();

        let mut root_store = RootCertStore::empty();
        if let Some(pem) = &config.root_ca_certs {
            for cert in rustls_pemfile::certs(&mut std::io::Cursor::new(pem))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("invalid root CA PEM: {e}"))?
            {
                root_store
                    .add(cert)
                    .map_err(|e| format!("invalid root CA cert: {e}"))?;
            }
        } else {
            for cert in
                rustls_native_certs::load_native_certs().map_err(|e| format!("{e}"))?
            {
                let _ = root_store.add(cert);
            }
        }

        let builder = builder.with_root_certificates(root_store);

        let mut client_config = if let Some((cert_pem, key_pem)) = &config.client_identity {
            let certs = rustls_pemfile::certs(&mut std::io::Cursor::new(cert_pem))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| format!("invalid client cert PEM: {e}"))?;
            let key = rustls_pemfile::private_key(&mut std::io::Cursor::new(key_pem))
                .map_err(|e| format!("invalid client key PEM: {e}"))?
                .ok_or_else(|| "no private key found in client identity PEM".to_owned())?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| format!("invalid client identity: {e}"))?
        } else {
            builder.with_no_client_auth()
        };

        if config.certificate_check == CertificateCheck::DangerouslyDisabled {
            client_config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        Ok(client_config)
    }
}

/// A certificate verifier that accepts any certificate. Used only when `CertificateCheck` is
/// explicitly set to `DangerouslyDisabled`, for local development and tests.
#[derive(Debug)]
pub struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::aws_lc_rs::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
