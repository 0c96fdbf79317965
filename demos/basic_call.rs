//! Basic example demonstrating GET and POST requests with typed results.
//!
//! This example shows how to:
//! - Create a client for a host
//! - Narrow a response with a key path and materialize it into a type
//! - Upload a model with a POST request
//! - Receive outcomes through callbacks and a named channel
//!
//! Run with: `cargo run --example basic_call`

use courier::{
    Client, Decoded, Error, FromRecord, Objects, Record, RequestParameters, Uploadable,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const HOST: &str = "https://jsonplaceholder.typicode.com";

/// Coordinates nested under a user's address.
#[derive(Debug)]
struct Location {
    lat: String,
    lng: String,
}

impl FromRecord for Location {
    fn from_record(record: &Record) -> Option<Self> {
        Some(Location {
            lat: record.get("lat")?.as_str()?.to_string(),
            lng: record.get("lng")?.as_str()?.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    id: u32,
    title: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

impl Uploadable for NewPost {
    fn upload_data(&self) -> Option<bytes::Bytes> {
        serde_json::to_vec(self).ok().map(Into::into)
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("courier=debug,basic_call=info")
        .init();

    let client = Client::builder().host(HOST)?.build()?;

    println!("=== GET with a key path ===");
    let (tx, mut rx) = mpsc::unbounded_channel::<Result<Objects<Location>, Arc<Error>>>();
    let failures = tx.clone();

    let params = RequestParameters::<Location>::get(format!("{HOST}/users/1"))?
        .key_path("address.geo")?
        .on_success(move |locations| {
            let _ = tx.send(Ok(locations));
        })
        .on_failure(move |error| {
            let _ = failures.send(Err(error));
        })
        .build();

    println!("Submitted: {:?}", client.submit(params));
    match tokio::time::timeout(Duration::from_secs(30), rx.recv()).await {
        Ok(Some(Ok(locations))) => {
            for location in locations.iter() {
                println!("User 1 lives at {}, {}", location.lat, location.lng);
            }
        }
        Ok(Some(Err(error))) => println!("Request failed: {}", error.reason()),
        _ => println!("No outcome received"),
    }
    println!();

    println!("=== POST an uploadable model ===");
    let mut created = client.notification_center().subscribe("post.created");

    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };

    let params = RequestParameters::<Decoded<Post>>::post(format!("{HOST}/posts"))?
        .upload(&new_post)?
        .notify_success("post.created")
        .on_failure(|error| eprintln!("Create failed: {}", error.reason()))
        .build();
    client.submit(params);

    if let Ok(Ok(note)) = tokio::time::timeout(Duration::from_secs(30), created.recv()).await {
        if let Some(posts) = note.object_data::<Decoded<Post>>() {
            for post in posts.iter() {
                println!("Created post {}: {}", post.0.id, post.0.title);
            }
        }
    }

    Ok(())
}
