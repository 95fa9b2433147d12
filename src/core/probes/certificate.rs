// src/core/probes/certificate.rs

use chrono::{DateTime, Utc};
use native_tls::TlsConnector;
use serde::Serialize;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use tokio::task::spawn_blocking;
use tracing::{debug, error, info};
use x509_parser::prelude::*;

use crate::core::models::LookupResult;

const TLS_PORT: u16 = 443;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateInfo {
    pub issuer: String,
    pub subject: String,
    pub not_before: DateTime<Utc>,
    pub expires: DateTime<Utc>,
    pub days_until_expiry: i64,
}

/// Performs a verified TLS handshake with `host:443` and returns the leaf
/// certificate. Chain, hostname and validity errors surface as `Err`.
pub async fn fetch_certificate(host: &str, timeout: Duration) -> LookupResult<CertificateInfo> {
    info!(target = host, "Retrieving TLS certificate.");
    let host_owned = host.to_string();

    debug!("Spawning blocking task for TLS connection.");
    spawn_blocking(move || perform_handshake(&host_owned, timeout))
        .await
        .unwrap_or_else(|e| {
            error!(panic = %e, "Blocking TLS task panicked!");
            Err(format!("Task panicked: {}", e))
        })
}

fn perform_handshake(host: &str, timeout: Duration) -> LookupResult<CertificateInfo> {
    let connector = TlsConnector::new().map_err(|e| format!("TlsConnector Error: {}", e))?;

    let addr = (host, TLS_PORT)
        .to_socket_addrs()
        .map_err(|e| format!("Address Resolution Error: {}", e))?
        .next()
        .ok_or_else(|| format!("No address found for {}", host))?;

    debug!(target = host, %addr, "Connecting TCP stream to port 443.");
    let stream =
        TcpStream::connect_timeout(&addr, timeout).map_err(|e| format!("TCP Connection Error: {}", e))?;
    stream
        .set_read_timeout(Some(timeout))
        .and_then(|_| stream.set_write_timeout(Some(timeout)))
        .map_err(|e| format!("TCP Connection Error: {}", e))?;

    debug!(target = host, "Performing TLS handshake.");
    let stream = connector
        .connect(host, stream)
        .map_err(|e| format!("TLS Handshake Error: {}", e))?;

    let cert = stream
        .peer_certificate()
        .map_err(|e| format!("Could not get peer certificate: {}", e))?
        .ok_or_else(|| "No peer certificate presented".to_string())?;
    let der = cert
        .to_der()
        .map_err(|e| format!("Could not convert certificate to DER: {}", e))?;
    let (_, x509) = parse_x509_certificate(&der).map_err(|e| format!("X.509 Parse Error: {}", e))?;

    info!(subject = %x509.subject(), issuer = %x509.issuer(), "Parsed peer certificate.");
    let validity = x509.validity();
    let expires = asn1_time_to_chrono_utc(&validity.not_after);

    Ok(CertificateInfo {
        issuer: x509.issuer().to_string(),
        subject: x509.subject().to_string(),
        not_before: asn1_time_to_chrono_utc(&validity.not_before),
        expires,
        days_until_expiry: expires.signed_duration_since(Utc::now()).num_days(),
    })
}

fn asn1_time_to_chrono_utc(time: &ASN1Time) -> DateTime<Utc> {
    DateTime::from_timestamp(time.timestamp(), 0).unwrap_or_default()
}
