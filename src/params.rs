//! Per-request parameters.
//!
//! A [`RequestParameters`] value describes one request completely: where it
//! goes, what it uploads, how long it may take, which listeners hear about
//! the outcome, how the response is materialized and whether it may be
//! queued while offline. It is built once and never mutated afterwards.

use crate::dispatch::{Listener, Objects};
use crate::materialize::Record;
use crate::path::KeyPath;
use crate::queue::QueueAdmissionPolicy;
use crate::{Error, Result};
use bytes::Bytes;
use http::header::CACHE_CONTROL;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// The HTTP verbs a request may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpVerb {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpVerb {
    /// Returns `true` for verbs that send an upload body.
    ///
    /// GET and DELETE never carry a body.
    pub fn carries_body(self) -> bool {
        matches!(self, HttpVerb::Post | HttpVerb::Put | HttpVerb::Patch)
    }

    /// The corresponding [`http::Method`].
    pub fn method(self) -> Method {
        match self {
            HttpVerb::Get => Method::GET,
            HttpVerb::Post => Method::POST,
            HttpVerb::Put => Method::PUT,
            HttpVerb::Patch => Method::PATCH,
            HttpVerb::Delete => Method::DELETE,
        }
    }
}

impl From<HttpVerb> for Method {
    fn from(verb: HttpVerb) -> Self {
        verb.method()
    }
}

impl fmt::Display for HttpVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method().as_str())
    }
}

/// How a request interacts with the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CachePolicy {
    /// Load from the network. While offline, fall back to a cached response.
    /// Successful GET responses are cached.
    #[default]
    UseProtocolCachePolicy,

    /// Never read or write the cache.
    ReloadIgnoringCacheData,

    /// Use a cached response when there is one, even when online.
    ReturnCacheDataElseLoad,

    /// Only ever use the cache; a miss fails without touching the network.
    ReturnCacheDataDontLoad,
}

impl CachePolicy {
    pub(crate) fn uses_cache(self) -> bool {
        !matches!(self, CachePolicy::ReloadIgnoringCacheData)
    }

    pub(crate) fn request_header(self) -> Option<(HeaderName, HeaderValue)> {
        match self {
            CachePolicy::ReloadIgnoringCacheData => {
                Some((CACHE_CONTROL, HeaderValue::from_static("no-cache")))
            }
            _ => None,
        }
    }
}

/// A model that can provide its own upload body.
pub trait Uploadable {
    /// The bytes to upload, or `None` to send no body.
    fn upload_data(&self) -> Option<Bytes>;

    /// The `Content-Type` of [`upload_data`](Uploadable::upload_data).
    fn content_type(&self) -> &str {
        "application/json"
    }
}

/// Turns the decoded response document into objects, in place of key-path
/// extraction followed by [`materialize()`](crate::materialize()).
///
/// Runs after the transport, status and empty-body checks, on a blocking
/// worker.
pub type Parser<T> = Arc<dyn Fn(&Value, &KeyPath) -> Result<Vec<T>> + Send + Sync>;

/// An upload body and its content type.
#[derive(Debug, Clone)]
pub struct Upload {
    /// The raw body
    pub bytes: Bytes,
    /// The `Content-Type` header value
    pub content_type: HeaderValue,
}

/// Everything needed to issue one request and deliver its outcome.
///
/// `T` is the type responses are materialized into; the default,
/// [`Record`], returns the raw JSON objects.
pub struct RequestParameters<T = Record> {
    url: Url,
    verb: HttpVerb,
    upload: Option<Upload>,
    headers: HeaderMap,
    cache_policy: Option<CachePolicy>,
    timeout: Option<Duration>,
    on_success: Vec<Listener<Objects<T>>>,
    on_failure: Vec<Listener<Arc<Error>>>,
    key_path: KeyPath,
    admission: QueueAdmissionPolicy,
    parser: Option<Parser<T>>,
    factory: PhantomData<fn() -> T>,
}

impl<T> RequestParameters<T> {
    /// Starts building parameters for `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` does not parse.
    ///
    /// # Examples
    ///
    /// ```
    /// use courier::{QueueAdmissionPolicy, Record, RequestParameters};
    ///
    /// let params = RequestParameters::<Record>::builder("https://api.example.com/things")?
    ///     .key_path("data.things")?
    ///     .notify_success("things.loaded")
    ///     .notify_failure("things.failed")
    ///     .admission(QueueAdmissionPolicy::LastUniqueRequestPerUrl)
    ///     .build();
    ///
    /// assert_eq!(params.key_path().to_string(), "data.things");
    /// # Ok::<(), courier::Error>(())
    /// ```
    pub fn builder(url: impl AsRef<str>) -> Result<RequestParametersBuilder<T>> {
        Ok(RequestParametersBuilder::new(Url::parse(url.as_ref())?))
    }

    /// Builder for a GET request.
    pub fn get(url: impl AsRef<str>) -> Result<RequestParametersBuilder<T>> {
        Self::builder(url)
    }

    /// Builder for a POST request.
    pub fn post(url: impl AsRef<str>) -> Result<RequestParametersBuilder<T>> {
        Ok(Self::builder(url)?.method(HttpVerb::Post))
    }

    /// Builder for a PUT request.
    pub fn put(url: impl AsRef<str>) -> Result<RequestParametersBuilder<T>> {
        Ok(Self::builder(url)?.method(HttpVerb::Put))
    }

    /// Builder for a PATCH request.
    pub fn patch(url: impl AsRef<str>) -> Result<RequestParametersBuilder<T>> {
        Ok(Self::builder(url)?.method(HttpVerb::Patch))
    }

    /// Builder for a DELETE request.
    pub fn delete(url: impl AsRef<str>) -> Result<RequestParametersBuilder<T>> {
        Ok(Self::builder(url)?.method(HttpVerb::Delete))
    }

    /// The request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The HTTP verb.
    pub fn verb(&self) -> HttpVerb {
        self.verb
    }

    /// The upload body, if any. Ignored for GET and DELETE.
    pub fn upload(&self) -> Option<&Upload> {
        self.upload.as_ref()
    }

    /// Headers added on top of the client defaults.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The cache policy, or `None` to use the client default.
    pub fn cache_policy(&self) -> Option<CachePolicy> {
        self.cache_policy
    }

    /// The timeout, or `None` to use the client default.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Listeners notified on success, in registration order.
    pub fn success_listeners(&self) -> &[Listener<Objects<T>>] {
        &self.on_success
    }

    /// Listeners notified on failure, in registration order.
    pub fn failure_listeners(&self) -> &[Listener<Arc<Error>>] {
        &self.on_failure
    }

    /// Where the payload sits inside the response document.
    pub fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    /// How the request enters the retry queue while offline.
    pub fn admission(&self) -> QueueAdmissionPolicy {
        self.admission
    }

    /// The custom parser, or `None` for the default key path and
    /// materialization.
    pub fn parser(&self) -> Option<&Parser<T>> {
        self.parser.as_ref()
    }
}

impl<T> Clone for RequestParameters<T> {
    fn clone(&self) -> Self {
        Self {
            url: self.url.clone(),
            verb: self.verb,
            upload: self.upload.clone(),
            headers: self.headers.clone(),
            cache_policy: self.cache_policy,
            timeout: self.timeout,
            on_success: self.on_success.clone(),
            on_failure: self.on_failure.clone(),
            key_path: self.key_path.clone(),
            admission: self.admission,
            parser: self.parser.clone(),
            factory: PhantomData,
        }
    }
}

impl<T> fmt::Debug for RequestParameters<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestParameters")
            .field("url", &self.url.as_str())
            .field("verb", &self.verb)
            .field("upload", &self.upload.as_ref().map(|u| u.bytes.len()))
            .field("cache_policy", &self.cache_policy)
            .field("timeout", &self.timeout)
            .field("on_success", &self.on_success)
            .field("on_failure", &self.on_failure)
            .field("key_path", &self.key_path.to_string())
            .field("admission", &self.admission)
            .field("parser", &self.parser.is_some())
            .finish()
    }
}

/// Builder for [`RequestParameters`].
pub struct RequestParametersBuilder<T = Record> {
    params: RequestParameters<T>,
}

impl<T> RequestParametersBuilder<T> {
    fn new(url: Url) -> Self {
        Self {
            params: RequestParameters {
                url,
                verb: HttpVerb::default(),
                upload: None,
                headers: HeaderMap::new(),
                cache_policy: None,
                timeout: None,
                on_success: Vec::new(),
                on_failure: Vec::new(),
                key_path: KeyPath::default(),
                admission: QueueAdmissionPolicy::default(),
                parser: None,
                factory: PhantomData,
            },
        }
    }

    /// Sets the HTTP verb. Defaults to GET.
    pub fn method(mut self, verb: HttpVerb) -> Self {
        self.params.verb = verb;
        self
    }

    /// Sets a raw upload body. Only sent for POST, PUT and PATCH.
    ///
    /// # Errors
    ///
    /// Returns an error if `content_type` is not a valid header value.
    pub fn body(mut self, bytes: impl Into<Bytes>, content_type: &str) -> Result<Self> {
        let content_type = HeaderValue::try_from(content_type)
            .map_err(|e| Error::ConfigurationError(format!("Invalid content type: {}", e)))?;
        self.params.upload = Some(Upload {
            bytes: bytes.into(),
            content_type,
        });
        Ok(self)
    }

    /// Serializes `body` as the JSON upload body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if serialization fails.
    pub fn json_body<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let bytes =
            serde_json::to_vec(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.params.upload = Some(Upload {
            bytes: bytes.into(),
            content_type: HeaderValue::from_static("application/json"),
        });
        Ok(self)
    }

    /// Uses the model's own upload data as the body.
    ///
    /// # Errors
    ///
    /// Returns an error if the model's content type is not a valid header value.
    pub fn upload(self, model: &impl Uploadable) -> Result<Self> {
        match model.upload_data() {
            Some(bytes) => self.body(bytes, model.content_type()),
            None => Ok(self),
        }
    }

    /// Adds a request header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.params.headers.insert(name, value);
        Ok(self)
    }

    /// Overrides the client's default cache policy.
    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.params.cache_policy = Some(policy);
        self
    }

    /// Overrides the client's default timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.params.timeout = Some(timeout);
        self
    }

    /// Sets the dotted path to the payload inside the response document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKeyPath`] if the path has an empty segment.
    pub fn key_path(mut self, path: &str) -> Result<Self> {
        self.params.key_path = KeyPath::parse(path)?;
        Ok(self)
    }

    /// Sets the retry queue admission policy. Defaults to no queueing.
    pub fn admission(mut self, policy: QueueAdmissionPolicy) -> Self {
        self.params.admission = policy;
        self
    }

    /// Replaces the default parsing with `parser`.
    ///
    /// The parser receives the decoded response document and the request's
    /// key path; an error it returns is delivered to the failure listeners.
    pub fn parser(
        mut self,
        parser: impl Fn(&Value, &KeyPath) -> Result<Vec<T>> + Send + Sync + 'static,
    ) -> Self {
        self.params.parser = Some(Arc::new(parser));
        self
    }

    /// Calls `f` with the materialized objects on success.
    pub fn on_success(mut self, f: impl Fn(Objects<T>) + Send + Sync + 'static) -> Self {
        self.params.on_success.push(Listener::callback(f));
        self
    }

    /// Posts a notification named `name` on success.
    pub fn notify_success(mut self, name: impl Into<String>) -> Self {
        self.params.on_success.push(Listener::channel(name));
        self
    }

    /// Calls `f` with the error on failure.
    pub fn on_failure(mut self, f: impl Fn(Arc<Error>) + Send + Sync + 'static) -> Self {
        self.params.on_failure.push(Listener::callback(f));
        self
    }

    /// Posts a notification named `name` on failure.
    pub fn notify_failure(mut self, name: impl Into<String>) -> Self {
        self.params.on_failure.push(Listener::channel(name));
        self
    }

    /// Finishes the parameters.
    pub fn build(self) -> RequestParameters<T> {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Note {
        text: String,
    }

    impl Uploadable for Note {
        fn upload_data(&self) -> Option<Bytes> {
            Some(Bytes::from(self.text.clone()))
        }

        fn content_type(&self) -> &str {
            "text/plain"
        }
    }

    #[test]
    fn test_defaults() {
        let params = RequestParameters::<Record>::builder("https://api.example.com/a")
            .unwrap()
            .build();

        assert_eq!(params.verb(), HttpVerb::Get);
        assert!(params.upload().is_none());
        assert!(params.key_path().is_empty());
        assert_eq!(params.cache_policy(), None);
        assert_eq!(params.timeout(), None);
        assert_eq!(params.admission(), QueueAdmissionPolicy::NoQueueing);
        assert!(params.success_listeners().is_empty());
        assert!(params.parser().is_none());
    }

    #[test]
    fn test_malformed_url_rejected() {
        let result = RequestParameters::<Record>::builder("not a url");
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_bad_key_path_rejected() {
        let result = RequestParameters::<Record>::builder("https://api.example.com/a")
            .unwrap()
            .key_path("data..items");
        assert!(matches!(result, Err(Error::InvalidKeyPath { .. })));
    }

    #[test]
    fn test_json_body() {
        let params = RequestParameters::<Record>::post("https://api.example.com/things")
            .unwrap()
            .json_body(&json!({"name": "widget"}))
            .unwrap()
            .build();

        assert_eq!(params.verb(), HttpVerb::Post);
        let upload = params.upload().unwrap();
        assert_eq!(upload.content_type, "application/json");
        assert_eq!(&upload.bytes[..], br#"{"name":"widget"}"#);
    }

    #[test]
    fn test_uploadable_model() {
        let note = Note {
            text: "hello".to_string(),
        };
        let params = RequestParameters::<Record>::put("https://api.example.com/notes/1")
            .unwrap()
            .upload(&note)
            .unwrap()
            .build();

        let upload = params.upload().unwrap();
        assert_eq!(upload.content_type, "text/plain");
        assert_eq!(&upload.bytes[..], b"hello");
    }

    #[test]
    fn test_verbs() {
        assert!(!HttpVerb::Get.carries_body());
        assert!(!HttpVerb::Delete.carries_body());
        assert!(HttpVerb::Patch.carries_body());
        assert_eq!(Method::from(HttpVerb::Delete), Method::DELETE);
        assert_eq!(HttpVerb::Put.to_string(), "PUT");
    }

    #[test]
    fn test_listeners_accumulate() {
        let params = RequestParameters::<Record>::builder("https://api.example.com/a")
            .unwrap()
            .notify_success("loaded")
            .on_success(|_| {})
            .on_failure(|_| {})
            .build();

        assert_eq!(params.success_listeners().len(), 2);
        assert_eq!(params.failure_listeners().len(), 1);
        assert!(matches!(
            &params.success_listeners()[0],
            Listener::Channel(name) if name == "loaded"
        ));
    }
}
