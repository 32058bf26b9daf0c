//! Per-user HTTP client for the book API.
//!
//! Every virtual user owns one [`BookClient`], built at user start. TLS
//! certificate verification is switched off per client when the profile
//! targets a server with a self-signed certificate.

use reqwest::Client;
use std::time::Duration;
use url::Url;

use crate::loadtest::error::{LoadTestError, RequestError};

/// HTTP client owned by a single virtual user.
#[derive(Debug, Clone)]
pub struct BookClient {
    http: Client,
    accept_invalid_certs: bool,
}

impl BookClient {
    /// Build a client with the given per-request timeout.
    ///
    /// When `accept_invalid_certs` is `true` the client skips certificate
    /// validation, so self-signed and expired certificates are accepted.
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, LoadTestError> {
        let mut builder = reqwest::ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("buch-lasttest/", env!("CARGO_PKG_VERSION")));

        if accept_invalid_certs {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let http = builder.build().map_err(|e| LoadTestError::Client {
            message: e.to_string(),
        })?;

        Ok(Self {
            http,
            accept_invalid_certs,
        })
    }

    /// Whether this client skips TLS certificate verification.
    pub fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    /// Issue one GET request and drain the response body.
    ///
    /// Returns the status code on 2xx. Any other status, a timeout or a
    /// transport failure is returned as a classified [`RequestError`].
    pub async fn get(&self, url: &Url) -> Result<u16, RequestError> {
        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RequestError::classify_reqwest(&e))?;

        let status = response.status();

        // Read the body so the measured latency covers the full response.
        response
            .bytes()
            .await
            .map_err(|e| RequestError::classify_reqwest(&e))?;

        if status.is_success() {
            Ok(status.as_u16())
        } else {
            Err(RequestError::Http {
                status: status.as_u16(),
            })
        }
    }
}
