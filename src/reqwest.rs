//! [`Executor`] backed by a `reqwest` client.
//! Use the `reqwest` feature to enable this.

use ::reqwest::multipart::Form;
use ::reqwest::Client;
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use tracing::trace;

use crate::engine::{Executor, SendPayload};
use crate::{Body, Request, Response, TransportError};

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Sends requests with a shared `reqwest::Client`, buffering each response body.
#[derive(Debug, Clone, Default)]
pub struct ReqwestExecutor {
    client: Client,
}

impl ReqwestExecutor {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn build(&self, request: Request) -> ::reqwest::RequestBuilder {
        let Request {
            method,
            url,
            mut headers,
            body,
        } = request;
        match body {
            Body::Empty => self.client.request(method, url).headers(headers),
            Body::Raw(raw) => self.client.request(method, url).headers(headers).body(raw),
            Body::File(bytes) => self.client.request(method, url).headers(headers).body(bytes),
            Body::UrlEncoded(pairs) => {
                let encoded = Body::UrlEncoded(pairs).to_bytes();
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static(FORM_URLENCODED));
                }
                self.client
                    .request(method, url)
                    .headers(headers)
                    .body(encoded)
            }
            Body::FormData(fields) => {
                // The multipart boundary is only known once the form is built.
                headers.remove(CONTENT_TYPE);
                let form = fields
                    .into_iter()
                    .fold(Form::new(), |form, (name, value)| form.text(name, value));
                self.client
                    .request(method, url)
                    .headers(headers)
                    .multipart(form)
            }
        }
    }
}

#[async_trait::async_trait]
impl Executor for ReqwestExecutor {
    async fn send(&self, payload: SendPayload) -> Result<Response, TransportError> {
        trace!(kind = ?payload.kind, attempt = payload.attempt, url = %payload.request.url, "sending");
        let response = self
            .build(payload.request)
            .send()
            .await
            .map_err(TransportError::new)?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(TransportError::new)?;
        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
