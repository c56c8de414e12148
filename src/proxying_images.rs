/// Fetching original images from their origin servers
use crate::utils::types::ImageId;
use async_trait::async_trait;
use http::HeaderMap;
use log::debug;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error while fetching image from its origin
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("{0}")]
    Download(String),
    #[error("server returned status: {0}")]
    Status(u16),
    #[error("request cancelled")]
    Cancelled,
}

/// Successful (HTTP 200) origin response
pub struct OriginResponse {
    pub body: Vec<u8>,
    pub headers: HeaderMap,
}

#[async_trait]
pub trait OriginBackend {
    /// Fetch `url` (`host[:port]/path`, no scheme) from the origin
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &ImageId,
    ) -> Result<OriginResponse, FetchError>;
}

pub struct HttpOriginBackend {
    client: Client,
}

impl HttpOriginBackend {
    /// `keep_alive = false` disables idle connection pooling to origins
    pub fn new(timeout: Duration, keep_alive: bool) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout / 3)
            .redirect(reqwest::redirect::Policy::limited(5));
        if !keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        }

        Ok(HttpOriginBackend {
            client: builder.build()?,
        })
    }

    /// Scheme to fetch with: https when origin answers a HEAD over TLS at all, http otherwise
    async fn negotiate_scheme(
        &self,
        cancel: &CancellationToken,
        url: &ImageId,
    ) -> Result<&'static str, FetchError> {
        let probe = self.client.head(format!("https://{}", url)).send();
        match cancelable(cancel, probe).await? {
            Ok(_) => Ok("https"),
            Err(err) => {
                debug!("HTTPS probe failed for {}, falling back to http: {}", url, err);
                Ok("http")
            }
        }
    }
}

async fn cancelable<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, FetchError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(FetchError::Cancelled),
        res = fut => Ok(res),
    }
}

#[async_trait]
impl OriginBackend for HttpOriginBackend {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        url: &ImageId,
    ) -> Result<OriginResponse, FetchError> {
        let scheme = self.negotiate_scheme(cancel, url).await?;

        let resp = cancelable(cancel, self.client.get(format!("{}://{}", scheme, url)).send())
            .await?
            .map_err(|err| {
                debug!("Got http error while fetching image {}: {}", url, err);
                FetchError::Download(err.to_string())
            })?;

        let status = resp.status();
        if status != StatusCode::OK {
            debug!("Origin returned status={} for image {}", status, url);
            return Err(FetchError::Status(status.as_u16()));
        }

        let headers = resp.headers().clone();
        let body = cancelable(cancel, resp.bytes())
            .await?
            .map_err(|err| FetchError::Download(err.to_string()))?;

        Ok(OriginResponse {
            body: body.to_vec(),
            headers,
        })
    }
}
