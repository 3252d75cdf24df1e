//! Authenticated request pipeline.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use super::envelope::{DataResponse, ErrorResponse, decode_body};
use super::request::ApiRequest;
use crate::credentials::{CredentialStore, ProactiveRenewal, RefreshCoordinator};
use crate::error::{ClientError, Result};

/// Issues API calls with the current access token attached.
///
/// A 401 is recovered once per request: the pipeline renews (or joins the
/// renewal in flight) and replays the request with the new token. A second 401
/// is surfaced as [`ClientError::Unauthorized`].
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    store: Arc<dyn CredentialStore>,
    coordinator: RefreshCoordinator,
    proactive: ProactiveRenewal,
}

impl ApiClient {
    pub fn new(
        http: reqwest::Client,
        base_url: Url,
        store: Arc<dyn CredentialStore>,
        coordinator: RefreshCoordinator,
        proactive: ProactiveRenewal,
    ) -> Self {
        Self {
            http,
            base_url,
            store,
            coordinator,
            proactive,
        }
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send `request` and decode the normalized response data as `T`.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        mut request: ApiRequest,
    ) -> Result<DataResponse<T>> {
        let mut token = if request.skip_auth {
            None
        } else {
            self.store.read().map(|credential| {
                self.proactive.check(&credential);
                credential.access_token
            })
        };

        loop {
            let response = self.send(&request, token.as_deref()).await?;
            let status = response.status();
            let body = response.bytes().await?;

            if status == StatusCode::UNAUTHORIZED && !request.skip_auth {
                if request.retried {
                    let error = ErrorResponse::parse(&body);
                    debug!(path = %request.path, "Request rejected again after renewal");
                    return Err(ClientError::Unauthorized {
                        message: error.message,
                    });
                }
                request.retried = true;
                token = Some(self.recover(token.as_deref()).await?);
                debug!(path = %request.path, "Replaying request with renewed token");
                continue;
            }

            if !status.is_success() {
                let error = ErrorResponse::parse(&body);
                if status == StatusCode::UNAUTHORIZED {
                    return Err(ClientError::Unauthorized {
                        message: error.message,
                    });
                }
                return Err(ClientError::Api {
                    status: status.as_u16(),
                    code: error.code,
                    message: error.message,
                });
            }

            return decode_body(&body).into_typed();
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<DataResponse<T>> {
        self.execute(ApiRequest::get(path)).await
    }

    pub async fn post<T, B>(&self, path: &str, body: &B) -> Result<DataResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put<T, B>(&self, path: &str, body: &B) -> Result<DataResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.execute(ApiRequest::put(path).json(body)?).await
    }

    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<DataResponse<T>> {
        self.execute(ApiRequest::delete(path)).await
    }

    /// Token to replay with after a 401 on a request sent with `sent`.
    async fn recover(&self, sent: Option<&str>) -> Result<String> {
        // A renewal finished while the request was in flight.
        if let Some(current) = self.store.access_token()
            && sent != Some(current.as_str())
        {
            trace!("Credential changed since send, reusing current token");
            return Ok(current);
        }
        Ok(self.coordinator.renew().await?)
    }

    async fn send(&self, request: &ApiRequest, token: Option<&str>) -> Result<reqwest::Response> {
        let url = self
            .base_url
            .join(request.path.trim_start_matches('/'))?;

        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = request.body.as_ref() {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        trace!(method = %request.method, path = %request.path, retried = request.retried, "Sending request");
        Ok(builder.send().await?)
    }
}
