use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    error::ErrorBody,
    protocol::{Envelope, ResultPage, SearchQuery},
};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

use crate::{error::ClientError, search::ResourceSearch, session::SessionStore, ClientEvent};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const FALLBACK_ERROR_MESSAGE: &str = "An error occurred";

/// Paths relative to the API base URL. `{key}` is substituted per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub search: String,
    pub health: String,
    pub statistics: String,
    pub token: String,
    pub user: String,
    pub bpmn_xml: String,
    pub resolve_incident: String,
    pub cancel_instance: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            search: "/resource-search".into(),
            health: "/health".into(),
            statistics: "/camunda/resource/operate/statistics".into(),
            token: "/authentication/token".into(),
            user: "/authentication/user".into(),
            bpmn_xml: "/camunda/process-definition/{key}/xml".into(),
            resolve_incident: "/camunda/incident/{key}".into(),
            cancel_instance: "/camunda/process-instance/{key}/cancel".into(),
        }
    }
}

pub(crate) fn expand_key(template: &str, key: impl std::fmt::Display) -> String {
    template.replace("{key}", &key.to_string())
}

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub endpoints: Endpoints,
}

impl ApiClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            endpoints: Endpoints::default(),
        }
    }
}

pub struct ApiClient {
    http: Client,
    base_url: String,
    pub(crate) endpoints: Endpoints,
    session: Arc<SessionStore>,
    events: broadcast::Sender<ClientEvent>,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig, session: Arc<SessionStore>) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        Url::parse(&base_url)
            .map_err(|err| ClientError::InvalidUrl(format!("{base_url}: {err}")))?;
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ClientError::Config(err.to_string()))?;
        let (events, _) = broadcast::channel(256);
        Ok(Self {
            http,
            base_url,
            endpoints: config.endpoints,
            session,
            events,
        })
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub(crate) fn url(&self, path: &str) -> Result<Url, ClientError> {
        let path = path.trim();
        let joined = if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        };
        Url::parse(&joined).map_err(|err| ClientError::InvalidUrl(format!("{joined}: {err}")))
    }

    /// Sends a request with the session token attached and maps the
    /// response status onto [`ClientError`].
    pub(crate) async fn execute(
        &self,
        method: Method,
        path: &str,
        build: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<Response, ClientError> {
        let url = self.url(path)?;
        let mut request = self.http.request(method.clone(), url);
        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        let request = build(request);

        let _ = self.events.send(ClientEvent::RequestStarted {
            path: path.to_string(),
        });
        let result = request.send().await;
        let _ = self.events.send(ClientEvent::RequestFinished {
            path: path.to_string(),
            status: result.as_ref().ok().map(|res| res.status().as_u16()),
        });

        let response = result.map_err(|err| {
            warn!(method = %method, path, error = %err, "http: no response");
            ClientError::Network(err.to_string())
        })?;
        self.check_status(&method, path, response).await
    }

    async fn check_status(
        &self,
        method: &Method,
        path: &str,
        response: Response,
    ) -> Result<Response, ClientError> {
        let status = response.status();
        if status.is_success() {
            debug!(method = %method, path, status = status.as_u16(), "http: ok");
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!(method = %method, path, "http: unauthorized; dropping session");
            self.session.clear();
            let _ = self.events.send(ClientEvent::SessionExpired);
            return Err(ClientError::Auth);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(ErrorBody::into_message)
            .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string());
        warn!(
            method = %method,
            path,
            status = status.as_u16(),
            message = %message,
            "http: request failed"
        );
        Err(ClientError::server(status.as_u16(), message))
    }

    pub(crate) async fn decode<T: DeserializeOwned>(
        path: &str,
        response: Response,
    ) -> Result<T, ClientError> {
        let body = response
            .bytes()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))?;
        serde_json::from_slice::<Envelope<T>>(&body)
            .map(Envelope::into_inner)
            .map_err(|err| ClientError::Decode {
                path: path.to_string(),
                message: err.to_string(),
            })
    }

    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ClientError> {
        let response = self
            .execute(Method::GET, path, |req| {
                if query.is_empty() {
                    req
                } else {
                    req.query(query)
                }
            })
            .await?;
        Self::decode(path, response).await
    }

    pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let response = self
            .execute(Method::POST, path, |req| req.json(body))
            .await?;
        Self::decode(path, response).await
    }

    /// POST without a meaningful response body.
    pub(crate) async fn post_empty(&self, path: &str) -> Result<(), ClientError> {
        self.execute(Method::POST, path, |req| req.header(CONTENT_TYPE, "application/json"))
            .await?;
        Ok(())
    }

    pub(crate) async fn get_text(&self, path: &str) -> Result<String, ClientError> {
        let response = self.execute(Method::GET, path, |req| req).await?;
        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));
        if is_json {
            return Self::decode::<String>(path, response).await;
        }
        response
            .text()
            .await
            .map_err(|err| ClientError::Network(err.to_string()))
    }
}

#[async_trait]
impl ResourceSearch for ApiClient {
    async fn search(&self, query: &SearchQuery) -> Result<ResultPage, ClientError> {
        let path = self.endpoints.search.clone();
        self.get_json(&path, &query.query_pairs()).await
    }
}
