//! HTTP transports for the team server.
//!
//! Every request is a `PUT` of the signed block JSON to the configured
//! endpoint; the response body is the server envelope.

use std::time::Duration;

use super::{TeamServer, TeamServiceConfig, TransportError};

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

/// Blocking transport. Must not be built or dropped inside an async runtime;
/// use [`AsyncHttpTeamServer`] there.
pub struct HttpTeamServer {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpTeamServer {
    pub fn new(config: &TeamServiceConfig) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(map_error)?;
        Ok(HttpTeamServer {
            endpoint: config.endpoint.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl TeamServer for HttpTeamServer {
    fn send(&self, body: &str) -> Result<String, TransportError> {
        log::debug!("PUT {} ({} bytes)", self.endpoint, body.len());
        self.client
            .put(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body.to_string())
            .send()
            .and_then(|response| response.text())
            .map_err(map_error)
    }
}

#[cfg(feature = "native")]
pub use self::nonblocking::AsyncHttpTeamServer;

#[cfg(feature = "native")]
mod nonblocking {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::map_error;
    use crate::service::{AsyncTeamServer, TeamServiceConfig, TransportError};

    pub struct AsyncHttpTeamServer {
        endpoint: String,
        client: reqwest::Client,
    }

    impl AsyncHttpTeamServer {
        pub fn new(config: &TeamServiceConfig) -> Result<Self, TransportError> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(config.request_timeout_secs))
                .build()
                .map_err(map_error)?;
            Ok(AsyncHttpTeamServer {
                endpoint: config.endpoint.clone(),
                client,
            })
        }
    }

    #[async_trait]
    impl AsyncTeamServer for AsyncHttpTeamServer {
        async fn send(&self, body: String) -> Result<String, TransportError> {
            log::debug!("PUT {} ({} bytes)", self.endpoint, body.len());
            let response = self
                .client
                .put(&self.endpoint)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(map_error)?;
            response.text().await.map_err(map_error)
        }
    }
}
