//! # Courier - a connectivity-aware API client
//!
//! Courier issues HTTP requests, turns JSON responses into typed domain
//! objects, and reports each outcome to callbacks and named broadcast
//! channels. While the host is unreachable it serves cached responses when it
//! can and holds requests in a retry queue until connectivity returns.
//!
//! ## Quick Start
//!
//! ```no_run
//! use courier::{Client, FromRecord, ManualReachability, Objects, QueueAdmissionPolicy, Record, RequestParameters};
//!
//! struct Weather {
//!     conditions: String,
//!     icon_url: String,
//! }
//!
//! impl FromRecord for Weather {
//!     fn from_record(record: &Record) -> Option<Self> {
//!         Some(Weather {
//!             conditions: record.get("conditions")?.as_str()?.to_string(),
//!             icon_url: record.get("icon_url")?.as_str()?.to_string(),
//!         })
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), courier::Error> {
//!     let client = Client::builder()
//!         .host("https://api.example.com")?
//!         .reachability(ManualReachability::default())
//!         .build()?;
//!
//!     let params = RequestParameters::<Weather>::get("https://api.example.com/forecast.json")?
//!         .key_path("forecast.simpleforecast.forecastday")?
//!         .admission(QueueAdmissionPolicy::LastUniqueRequestPerUrl)
//!         .notify_failure("weather.failed")
//!         .on_success(|days: Objects<Weather>| {
//!             for day in days.iter() {
//!                 println!("{} ({})", day.conditions, day.icon_url);
//!             }
//!         })
//!         .build();
//!
//!     client.submit(params);
//!     Ok(())
//! }
//! ```
//!
//! ## How a request is handled
//!
//! 1. [`Client::submit`] builds the HTTP request from the parameters.
//! 2. If the host is reachable the request is sent. Otherwise a cached
//!    response is replayed if one exists, or the request fails with
//!    [`Error::UnreachableServer`]. Either way it may also be queued for a
//!    later retry, per its [`QueueAdmissionPolicy`].
//! 3. The response is checked (transport error, HTTP status, empty body),
//!    decoded, narrowed with the request's [`KeyPath`] and materialized into
//!    `T` via [`FromRecord`], on a blocking worker.
//! 4. The [`Dispatcher`] delivers the outcome to every listener on the
//!    [`DeliveryContext`].
//!
//! ## Listening for results
//!
//! ```no_run
//! use courier::{Client, Record, RequestParameters};
//!
//! # async fn example(client: Client) -> Result<(), courier::Error> {
//! let mut loaded = client.notification_center().subscribe("things.loaded");
//!
//! client.submit(
//!     RequestParameters::<Record>::get("https://api.example.com/things")?
//!         .notify_success("things.loaded")
//!         .build(),
//! );
//!
//! let note = loaded.recv().await.expect("channel open");
//! let records = note.object_data::<Record>().unwrap_or_default();
//! println!("{} records", records.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
mod client;
pub mod dispatch;
mod error;
mod materialize;
pub mod notification;
mod params;
mod path;
pub mod queue;
pub mod reachability;

pub use cache::{CacheKey, CachedResponse, MemoryCache, ResponseCache};
pub use client::{Client, ClientBuilder, RequestState};
pub use dispatch::{DeliveryContext, DeliveryLoop, Dispatcher, Listener, Objects};
pub use error::{Error, ErrorKind, Result};
pub use materialize::{materialize, Decoded, FromRecord, Record};
pub use notification::{Notification, NotificationCenter, DATA_KEY, ERROR_KEY};
pub use params::{
    CachePolicy, HttpVerb, Parser, RequestParameters, RequestParametersBuilder, Upload,
    Uploadable,
};
pub use path::KeyPath;
pub use queue::{QueueAdmissionPolicy, RetryQueue, RetryQueueEntry};
pub use reachability::{ManualReachability, Reachability, TcpProbe};
pub use url::Url;
