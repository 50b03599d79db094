//! Per-request authorization headers.
//!
//! Request signing is pluggable: the transport asks the configured
//! [`StreamAuth`] for headers on every connection attempt, so signatures that
//! depend on the URL or parameters can be recomputed.

use std::fmt;

use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};

use crate::stream::{StreamClientError, StreamRequest};

pub trait StreamAuth: Send + Sync + fmt::Debug {
    /// Returns the headers to attach to `request`.
    fn headers(
        &self,
        request: &StreamRequest,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, StreamClientError>;
}

/// Sends requests without credentials. Useful against local test servers.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAuth;

impl StreamAuth for NoAuth {
    fn headers(
        &self,
        _request: &StreamRequest,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, StreamClientError> {
        Ok(Vec::new())
    }
}

/// `Authorization: Bearer <token>`.
#[derive(Clone, Debug)]
pub struct BearerToken {
    token: SecretString,
}

impl BearerToken {
    pub fn new(token: SecretString) -> Self {
        Self { token }
    }
}

impl StreamAuth for BearerToken {
    fn headers(
        &self,
        _request: &StreamRequest,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, StreamClientError> {
        let value = format!("Bearer {}", self.token.expose_secret());
        Ok(vec![(AUTHORIZATION, sensitive_value(&value)?)])
    }
}

/// Static secret sent under a custom header, such as `x-api-key`.
#[derive(Clone, Debug)]
pub struct ApiKey {
    header: HeaderName,
    secret: SecretString,
}

impl ApiKey {
    pub fn new(header: &str, secret: SecretString) -> Result<Self, StreamClientError> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .map_err(|err| StreamClientError::InvalidHeader(err.to_string()))?;
        Ok(Self { header, secret })
    }
}

impl StreamAuth for ApiKey {
    fn headers(
        &self,
        _request: &StreamRequest,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, StreamClientError> {
        let value = sensitive_value(self.secret.expose_secret())?;
        Ok(vec![(self.header.clone(), value)])
    }
}

fn sensitive_value(value: &str) -> Result<HeaderValue, StreamClientError> {
    let mut value = HeaderValue::from_str(value)
        .map_err(|err| StreamClientError::InvalidHeader(err.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}
