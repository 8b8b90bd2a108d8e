//! ReqwestTransport - HttpTransport の本番実装

use async_trait::async_trait;

use crate::ports::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Shares one `reqwest::Client` (and its connection pool) across deliveries.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| TransportError::Other(format!("http client: {err}")))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn classify(err: reqwest::Error, request: &HttpRequest) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(request.timeout)
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .post(&request.url)
            .timeout(request.timeout)
            .body(request.body.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| classify(err, &request))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| classify(err, &request))?;

        Ok(HttpResponse { status, body })
    }
}
