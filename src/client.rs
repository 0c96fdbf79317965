//! The request orchestrator.
//!
//! [`Client::submit`] takes a [`RequestParameters`] value and decides what to
//! do with it:
//!
//! - host reachable: send it (`Sent`)
//! - host unreachable, cached response available: replay the cached
//!   response (`CacheFallback`)
//! - host unreachable, nothing cached: fail with `UnreachableServer`
//!   (`Failed`)
//!
//! In the unreachable cases the request may also be admitted to the retry
//! queue, depending on its [`QueueAdmissionPolicy`](crate::QueueAdmissionPolicy).
//! Live and cached responses go through the same completion handling: the
//! body is parsed on a blocking worker, then the outcome is handed to the
//! [`Dispatcher`], which delivers it on the delivery context.

use crate::cache::{CacheKey, CachedResponse, ResponseCache};
use crate::dispatch::{DeliveryContext, Dispatcher};
use crate::materialize::{materialize, FromRecord};
use crate::notification::NotificationCenter;
use crate::params::{CachePolicy, HttpVerb, Parser, RequestParameters};
use crate::path::KeyPath;
use crate::queue::{QueueAdmissionPolicy, RetryQueue, RetryQueueEntry};
use crate::reachability::Reachability;
use crate::{Error, Result};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use url::Url;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connectivity-aware API client.
///
/// Cloning is cheap; clones share the connection pool, retry queue and
/// delivery context.
///
/// # Examples
///
/// ```no_run
/// use courier::{Client, FromRecord, ManualReachability, Objects, Record, RequestParameters};
///
/// struct Thing {
///     name: String,
///     id: u64,
/// }
///
/// impl FromRecord for Thing {
///     fn from_record(record: &Record) -> Option<Self> {
///         Some(Thing {
///             name: record.get("name")?.as_str()?.to_string(),
///             id: record.get("id")?.as_u64()?,
///         })
///     }
/// }
///
/// # async fn example() -> Result<(), courier::Error> {
/// let client = Client::builder()
///     .host("http://thingserver.example.com")?
///     .build()?;
///
/// let params = RequestParameters::<Thing>::get("http://thingserver.example.com/thing/0")?
///     .key_path("data.toomuchdata.things")?
///     .on_success(|things: Objects<Thing>| {
///         for thing in things.iter() {
///             println!("{} ({})", thing.name, thing.id);
///         }
///     })
///     .on_failure(|error| eprintln!("{}", error.reason()))
///     .build();
///
/// client.submit(params);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    host: Url,
    default_headers: HeaderMap,
    default_timeout: Duration,
    default_cache_policy: CachePolicy,
    reachability: Option<Arc<dyn Reachability>>,
    cache: Option<Arc<dyn ResponseCache>>,
    queue: RetryQueue,
    dispatcher: Dispatcher,
    runtime: Handle,
}

/// Which path [`Client::submit`] took for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Sent over the network.
    Sent,
    /// Served from the response cache. `queued` is `true` if the request was
    /// also admitted to the retry queue.
    CacheFallback { queued: bool },
    /// Failed before reaching the network. `queued` is `true` if the request
    /// was admitted to the retry queue.
    Failed { queued: bool },
}

impl RequestState {
    /// Returns `true` if the request is waiting in the retry queue.
    pub fn is_queued(&self) -> bool {
        matches!(
            self,
            RequestState::CacheFallback { queued: true } | RequestState::Failed { queued: true }
        )
    }
}

/// Response details as reported by the transport.
#[derive(Debug, Clone)]
pub(crate) struct ResponseMeta {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) url: Url,
}

/// What the transport hands back when a request completes.
///
/// Any combination of the three parts may be present; completion handling
/// decides which one wins.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    pub(crate) body: Option<Bytes>,
    pub(crate) response: Option<ResponseMeta>,
    pub(crate) error: Option<reqwest::Error>,
}

impl Completion {
    async fn receive(result: reqwest::Result<reqwest::Response>) -> Self {
        let response = match result {
            Ok(response) => response,
            Err(error) => {
                return Self {
                    error: Some(error),
                    ..Self::default()
                }
            }
        };

        let meta = ResponseMeta {
            status: response.status(),
            headers: response.headers().clone(),
            url: response.url().clone(),
        };

        match response.bytes().await {
            Ok(body) => Self {
                body: Some(body),
                response: Some(meta),
                error: None,
            },
            Err(error) => Self {
                body: None,
                response: Some(meta),
                error: Some(error),
            },
        }
    }

    fn from_cache(cached: CachedResponse) -> Self {
        Self {
            body: Some(cached.body),
            response: Some(ResponseMeta {
                status: cached.status,
                headers: cached.headers,
                url: cached.url,
            }),
            error: None,
        }
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The host this client talks to.
    pub fn host(&self) -> &Url {
        &self.inner.host
    }

    /// The center that channel listeners are posted to.
    pub fn notification_center(&self) -> &NotificationCenter {
        self.inner.dispatcher.notification_center()
    }

    /// Number of requests waiting in the retry queue.
    pub fn pending_retries(&self) -> usize {
        self.inner.queue.len()
    }

    /// URLs of the requests waiting in the retry queue, head first.
    pub fn queued_urls(&self) -> Vec<Url> {
        self.inner.queue.urls()
    }

    /// Returns `true` unless the reachability source says otherwise.
    pub fn is_reachable(&self) -> bool {
        self.inner.is_reachable()
    }

    /// Resends every queued request while the host stays reachable.
    ///
    /// This runs automatically when the reachability source reports that the
    /// host came back. Returns the number of resent requests.
    pub fn drain_retry_queue(&self) -> usize {
        let inner = &self.inner;
        inner.queue.drain(|| inner.is_reachable())
    }

    /// Issues a request.
    ///
    /// The outcome is delivered asynchronously to the request's listeners on
    /// the delivery context, never from within this call. Exactly one outcome
    /// is delivered per attempt; a request resent from the retry queue is a
    /// new attempt.
    pub fn submit<T>(&self, params: RequestParameters<T>) -> RequestState
    where
        T: FromRecord + Send + Sync + 'static,
    {
        let params = Arc::new(params);
        let cache_policy = params
            .cache_policy()
            .unwrap_or(self.inner.default_cache_policy);

        let request = match self.inner.build_request(&params, cache_policy) {
            Ok(request) => request,
            Err(error) => {
                self.inner
                    .dispatcher
                    .fail(params.failure_listeners(), error);
                return RequestState::Failed { queued: false };
            }
        };

        let cache_key = CacheKey::new(params.verb().method(), params.url().clone());

        match cache_policy {
            CachePolicy::ReturnCacheDataDontLoad => {
                return match self.inner.cached(&cache_key, cache_policy) {
                    Some(cached) => {
                        self.complete(Completion::from_cache(cached), params);
                        RequestState::CacheFallback { queued: false }
                    }
                    None => {
                        self.fail_unreachable(&params);
                        RequestState::Failed { queued: false }
                    }
                };
            }
            CachePolicy::ReturnCacheDataElseLoad => {
                if let Some(cached) = self.inner.cached(&cache_key, cache_policy) {
                    tracing::debug!(url = %params.url(), "Serving cached response");
                    self.complete(Completion::from_cache(cached), params);
                    return RequestState::CacheFallback { queued: false };
                }
            }
            CachePolicy::UseProtocolCachePolicy | CachePolicy::ReloadIgnoringCacheData => {}
        }

        if self.inner.is_reachable() {
            self.send(request, params, cache_policy);
            return RequestState::Sent;
        }

        tracing::warn!(host = %self.inner.host, url = %params.url(), "Host unreachable");

        let served_from_cache = match self.inner.cached(&cache_key, cache_policy) {
            Some(cached) => {
                tracing::warn!(url = %params.url(), "Falling back to cached response");
                self.complete(Completion::from_cache(cached), Arc::clone(&params));
                true
            }
            None => {
                self.fail_unreachable(&params);
                false
            }
        };

        let queued = self.admit(request, params, cache_policy);

        if served_from_cache {
            RequestState::CacheFallback { queued }
        } else {
            RequestState::Failed { queued }
        }
    }

    fn fail_unreachable<T>(&self, params: &RequestParameters<T>) {
        self.inner.dispatcher.fail(
            params.failure_listeners(),
            Error::UnreachableServer {
                host: self.inner.host.to_string(),
            },
        );
    }

    fn admit<T>(
        &self,
        request: reqwest::Request,
        params: Arc<RequestParameters<T>>,
        cache_policy: CachePolicy,
    ) -> bool
    where
        T: FromRecord + Send + Sync + 'static,
    {
        let policy = params.admission();
        if policy == QueueAdmissionPolicy::NoQueueing {
            return false;
        }

        let url = params.url().clone();
        let client = Arc::downgrade(&self.inner);
        let entry = RetryQueueEntry::new(url, move || match Weak::upgrade(&client) {
            Some(inner) => Client { inner }.send(request, params, cache_policy),
            None => tracing::debug!("Client dropped; discarding queued request"),
        });

        if !self.inner.queue.admit(entry, policy) {
            return false;
        }

        // The host may have come back after the reachability check but before
        // admission, in which case the watcher already drained an empty queue.
        if self.inner.is_reachable() {
            tracing::debug!(host = %self.inner.host, "Host reachable again; draining retry queue");
            self.drain_retry_queue();
        }
        true
    }

    /// Sends `request` and feeds the transport's answer into completion
    /// handling.
    fn send<T>(
        &self,
        request: reqwest::Request,
        params: Arc<RequestParameters<T>>,
        cache_policy: CachePolicy,
    ) where
        T: FromRecord + Send + Sync + 'static,
    {
        let client = self.clone();
        self.inner.runtime.spawn(async move {
            let inner = &client.inner;
            let start_time = Instant::now();

            tracing::debug!(
                method = %request.method(),
                url = %request.url(),
                timeout_ms = request.timeout().map(|t| t.as_millis() as u64),
                "Executing HTTP request"
            );

            let completion = Completion::receive(inner.http_client.execute(request).await).await;

            if let Some(meta) = &completion.response {
                tracing::info!(
                    status = meta.status.as_u16(),
                    latency_ms = start_time.elapsed().as_millis() as u64,
                    url = %meta.url,
                    "Received HTTP response"
                );
            }

            inner.remember(&params, cache_policy, &completion);
            client.complete(completion, params);
        });
    }

    /// Parses `completion` off the delivery context and dispatches the result.
    fn complete<T>(&self, completion: Completion, params: Arc<RequestParameters<T>>)
    where
        T: FromRecord + Send + Sync + 'static,
    {
        let dispatcher = self.inner.dispatcher.clone();
        let runtime = self.inner.runtime.clone();

        runtime.spawn(async move {
            let key_path = params.key_path().clone();
            let parser = params.parser().cloned();
            let parsed = tokio::task::spawn_blocking(move || {
                parse_completion::<T>(completion, &key_path, parser.as_ref())
            })
            .await;

            match parsed {
                Ok(Ok(objects)) => dispatcher.succeed(params.success_listeners(), objects),
                Ok(Err(error)) => dispatcher.fail(params.failure_listeners(), error),
                Err(join_error) => {
                    tracing::error!(error = %join_error, "Response parsing task failed");
                    dispatcher.fail(
                        params.failure_listeners(),
                        Error::JsonDecode {
                            raw_response: String::new(),
                            serde_error: format!("parsing task failed: {}", join_error),
                        },
                    );
                }
            }
        });
    }
}

impl ClientInner {
    fn is_reachable(&self) -> bool {
        self.reachability
            .as_ref()
            .map_or(true, |reachability| reachability.is_reachable())
    }

    fn build_request<T>(
        &self,
        params: &RequestParameters<T>,
        cache_policy: CachePolicy,
    ) -> Result<reqwest::Request> {
        let verb = params.verb();
        let mut request = self
            .http_client
            .request(verb.method(), params.url().clone())
            .timeout(params.timeout().unwrap_or(self.default_timeout));

        for (name, value) in &self.default_headers {
            request = request.header(name, value);
        }

        for (name, value) in params.headers() {
            request = request.header(name, value);
        }

        if let Some((name, value)) = cache_policy.request_header() {
            request = request.header(name, value);
        }

        if let Some(upload) = params.upload() {
            if verb.carries_body() {
                request = request
                    .header(CONTENT_TYPE, upload.content_type.clone())
                    .body(upload.bytes.clone());
            } else {
                tracing::debug!(verb = %verb, url = %params.url(), "Ignoring upload body");
            }
        }

        Ok(request.build()?)
    }

    fn cached(&self, key: &CacheKey, cache_policy: CachePolicy) -> Option<CachedResponse> {
        if !cache_policy.uses_cache() {
            return None;
        }
        self.cache.as_ref()?.lookup(key)
    }

    fn remember<T>(
        &self,
        params: &RequestParameters<T>,
        cache_policy: CachePolicy,
        completion: &Completion,
    ) {
        let Some(cache) = &self.cache else { return };
        if params.verb() != HttpVerb::Get || !cache_policy.uses_cache() {
            return;
        }

        if let (Some(meta), Some(body), None) =
            (&completion.response, &completion.body, &completion.error)
        {
            if meta.status.is_success() && !body.is_empty() {
                cache.store(
                    CacheKey::new(params.verb().method(), params.url().clone()),
                    CachedResponse {
                        status: meta.status,
                        headers: meta.headers.clone(),
                        body: body.clone(),
                        url: meta.url.clone(),
                    },
                );
            }
        }
    }
}

/// Turns a transport completion into materialized objects.
///
/// Checks run in order: transport error, HTTP status, missing body, JSON
/// decoding, then either the request's own parser or key path followed by
/// materialization.
pub(crate) fn parse_completion<T: FromRecord>(
    completion: Completion,
    key_path: &KeyPath,
    parser: Option<&Parser<T>>,
) -> Result<Vec<T>> {
    if let Some(error) = completion.error {
        return Err(Error::Transport(error));
    }

    if let Some(meta) = completion.response {
        if meta.status.as_u16() >= 400 {
            let raw_response = completion
                .body
                .as_deref()
                .map(|body| String::from_utf8_lossy(body).into_owned())
                .unwrap_or_default();

            if meta.status.is_server_error() {
                tracing::warn!(
                    status = meta.status.as_u16(),
                    response = %raw_response,
                    "Server error (5xx)"
                );
            } else {
                tracing::error!(
                    status = meta.status.as_u16(),
                    response = %raw_response,
                    "Client error (4xx)"
                );
            }

            return Err(Error::BadHttpStatus {
                status: meta.status,
                raw_response,
                headers: meta.headers,
                url: meta.url,
            });
        }
    }

    let body = completion
        .body
        .filter(|body| !body.is_empty())
        .ok_or(Error::EmptyResponseBody)?;

    let json: Value = serde_json::from_slice(&body).map_err(|e| {
        let raw_response = String::from_utf8_lossy(&body).into_owned();
        tracing::error!(
            error = %e,
            raw_response = %raw_response,
            "Failed to decode response"
        );
        Error::JsonDecode {
            raw_response,
            serde_error: e.to_string(),
        }
    })?;

    match parser {
        Some(parser) => parser(&json, key_path),
        None => materialize(key_path.extract(&json)?),
    }
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use courier::{CachePolicy, ClientBuilder, MemoryCache, TcpProbe, Url};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), courier::Error> {
/// let host = Url::parse("https://api.example.com")?;
/// let client = ClientBuilder::new()
///     .host(host.as_str())?
///     .default_timeout(Duration::from_secs(30))
///     .default_cache_policy(CachePolicy::UseProtocolCachePolicy)
///     .reachability(TcpProbe::new(&host)?)
///     .response_cache(MemoryCache::new(256))
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    host: Option<Url>,
    default_headers: HeaderMap,
    default_timeout: Duration,
    default_cache_policy: CachePolicy,
    reachability: Option<Arc<dyn Reachability>>,
    cache: Option<Arc<dyn ResponseCache>>,
    notification_center: Option<NotificationCenter>,
    delivery_context: Option<DeliveryContext>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            host: None,
            default_headers: HeaderMap::new(),
            default_timeout: DEFAULT_TIMEOUT,
            default_cache_policy: CachePolicy::default(),
            reachability: None,
            cache: None,
            notification_center: None,
            delivery_context: None,
        }
    }

    /// Sets the host requests are sent to.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn host(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.host = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets the timeout for requests that do not set their own. Defaults to
    /// 60 seconds.
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the cache policy for requests that do not set their own.
    pub fn default_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.default_cache_policy = policy;
        self
    }

    /// Sets the reachability source.
    ///
    /// Without one, the host is always considered reachable.
    pub fn reachability(mut self, reachability: impl Reachability) -> Self {
        self.reachability = Some(Arc::new(reachability));
        self
    }

    /// Sets the response cache used for offline fallback.
    pub fn response_cache(mut self, cache: impl ResponseCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Sets the center that channel listeners post to.
    pub fn notification_center(mut self, center: NotificationCenter) -> Self {
        self.notification_center = Some(center);
        self
    }

    /// Sets the context outcomes are delivered on.
    ///
    /// By default a dedicated task on the client's runtime is used.
    pub fn delivery_context(mut self, context: DeliveryContext) -> Self {
        self.delivery_context = Some(context);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// Must be called from within a Tokio runtime; the client keeps a handle
    /// to it so requests can be submitted from any thread.
    ///
    /// # Errors
    ///
    /// Returns an error if no host was provided, if there is no current
    /// runtime, or if the HTTP client cannot be created. A reachability
    /// source that fails to start is logged and ignored.
    pub fn build(self) -> Result<Client> {
        let host = self
            .host
            .ok_or_else(|| Error::ConfigurationError("Host is required".to_string()))?;

        let runtime = Handle::try_current().map_err(|e| {
            Error::ConfigurationError(format!("Client must be built inside a Tokio runtime: {}", e))
        })?;

        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        let (reachability, transitions) = match self.reachability {
            Some(reachability) => match reachability.start() {
                Ok(transitions) => (Some(reachability), Some(transitions)),
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        host = %host,
                        "Reachability monitor failed to start; always sending live"
                    );
                    (None, None)
                }
            },
            None => (None, None),
        };

        let delivery_context = self
            .delivery_context
            .unwrap_or_else(|| DeliveryContext::spawn_on(&runtime));
        let dispatcher = Dispatcher::new(
            self.notification_center.unwrap_or_default(),
            delivery_context,
        );

        let client = Client {
            inner: Arc::new(ClientInner {
                http_client,
                host,
                default_headers: self.default_headers,
                default_timeout: self.default_timeout,
                default_cache_policy: self.default_cache_policy,
                reachability,
                cache: self.cache,
                queue: RetryQueue::new(),
                dispatcher,
                runtime,
            }),
        };

        if let Some(transitions) = transitions {
            watch_reachability(&client, transitions);
        }

        Ok(client)
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains the retry queue each time the host becomes reachable. Stops when
/// the client is dropped or the reachability source goes away.
fn watch_reachability(client: &Client, mut transitions: watch::Receiver<bool>) {
    let weak = Arc::downgrade(&client.inner);
    client.inner.runtime.spawn(async move {
        while transitions.changed().await.is_ok() {
            let reachable = *transitions.borrow_and_update();
            let Some(inner) = weak.upgrade() else { break };
            if reachable {
                Client { inner }.drain_retry_queue();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materialize::Record;
    use serde_json::json;

    fn response(status: u16, body: &str) -> Completion {
        Completion {
            body: Some(Bytes::from(body.to_string())),
            response: Some(ResponseMeta {
                status: StatusCode::from_u16(status).unwrap(),
                headers: HeaderMap::new(),
                url: Url::parse("https://api.example.com/a").unwrap(),
            }),
            error: None,
        }
    }

    fn path(path: &str) -> KeyPath {
        KeyPath::parse(path).unwrap()
    }

    #[test]
    fn test_extracts_and_materializes() {
        let body = json!({"a": {"b": [{"x": 1}, {"y": 2}]}}).to_string();
        let records: Vec<Record> =
            parse_completion(response(200, &body), &path("a.b"), None).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["x"], 1);
        assert_eq!(records[1]["y"], 2);
    }

    #[test]
    fn test_bad_key_path() {
        let body = json!({"a": {"b": []}}).to_string();
        let err =
            parse_completion::<Record>(response(200, &body), &path("a.c"), None).unwrap_err();
        assert_eq!(err.key_path(), Some("a.c"));
    }

    #[test]
    fn test_status_checked_before_body() {
        let body = json!({"a": 1}).to_string();
        let err = parse_completion::<Record>(response(404, &body), &path(""), None).unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.raw_response(), Some(body.as_str()));

        let err = parse_completion::<Record>(response(503, ""), &path(""), None).unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[test]
    fn test_empty_body() {
        let err = parse_completion::<Record>(response(200, ""), &path(""), None).unwrap_err();
        assert!(matches!(err, Error::EmptyResponseBody));

        let no_body = Completion {
            body: None,
            ..response(204, "")
        };
        let err = parse_completion::<Record>(no_body, &path(""), None).unwrap_err();
        assert!(matches!(err, Error::EmptyResponseBody));
    }

    #[test]
    fn test_malformed_json() {
        let err =
            parse_completion::<Record>(response(200, "not json"), &path(""), None).unwrap_err();
        match err {
            Error::JsonDecode { raw_response, .. } => assert_eq!(raw_response, "not json"),
            other => panic!("Expected JsonDecode, got {:?}", other),
        }
    }

    #[test]
    fn test_redirect_class_is_parsed() {
        let body = json!({"x": 1}).to_string();
        let records: Vec<Record> = parse_completion(response(304, &body), &path(""), None).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_custom_parser_replaces_materialization() {
        let parser: Parser<Record> = Arc::new(|json: &Value, key_path: &KeyPath| -> Result<Vec<Record>> {
            let days = key_path.extract(json)?;
            Ok(days
                .as_object()
                .into_iter()
                .flat_map(|map| map.values())
                .filter_map(|day| day.as_object().cloned())
                .collect())
        });
        let body = json!({"days": {"mon": {"t": 1}, "tue": {"t": 2}}}).to_string();

        let records =
            parse_completion(response(200, &body), &path("days"), Some(&parser)).unwrap();
        assert_eq!(records.len(), 2);

        // Status and body checks still run before the parser
        let err =
            parse_completion(response(500, &body), &path("days"), Some(&parser)).unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        let err = parse_completion(response(200, ""), &path("days"), Some(&parser)).unwrap_err();
        assert!(matches!(err, Error::EmptyResponseBody));
    }

    #[test]
    fn test_request_state_queued() {
        assert!(RequestState::Failed { queued: true }.is_queued());
        assert!(RequestState::CacheFallback { queued: true }.is_queued());
        assert!(!RequestState::Sent.is_queued());
        assert!(!RequestState::Failed { queued: false }.is_queued());
    }
}
