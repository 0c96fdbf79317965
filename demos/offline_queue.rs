//! Example demonstrating offline behavior.
//!
//! This example shows how to:
//! - Drive reachability by hand with `ManualReachability`
//! - Fall back to cached responses while the host is unreachable
//! - Queue requests and have them resent when the host comes back
//! - Deliver outcomes on the application's own loop
//!
//! Run with: `cargo run --example offline_queue`

use courier::{
    Client, DeliveryContext, Error, ManualReachability, MemoryCache, QueueAdmissionPolicy,
    Record, RequestParameters,
};
use std::time::Duration;

const HOST: &str = "https://jsonplaceholder.typicode.com";

fn todo_request(id: u32) -> Result<RequestParameters<Record>, Error> {
    Ok(RequestParameters::<Record>::get(format!("{HOST}/todos/{id}"))?
        .admission(QueueAdmissionPolicy::LastUniqueRequestPerUrl)
        .on_success(move |todos| {
            for todo in todos.iter() {
                println!("todo {id}: {}", todo["title"]);
            }
        })
        .on_failure(move |error| println!("todo {id} failed: {}", error.reason()))
        .build())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("courier=debug,offline_queue=info")
        .init();

    let reachability = ManualReachability::new(true);
    let (context, mut delivery_loop) = DeliveryContext::channel();

    let client = Client::builder()
        .host(HOST)?
        .reachability(reachability.clone())
        .response_cache(MemoryCache::new(32))
        .delivery_context(context)
        .build()?;

    // Pumps the delivery loop so callbacks run on this task.
    let mut pump = |label: &str| {
        println!("--- {label} ---");
        delivery_loop.run_pending()
    };

    println!("=== Online: warm the cache ===");
    client.submit(todo_request(1)?);
    tokio::time::sleep(Duration::from_secs(2)).await;
    pump("online");

    println!("=== Offline ===");
    reachability.set_reachable(false);

    // Served from cache, and queued for a fresh copy
    println!("todo 1: {:?}", client.submit(todo_request(1)?));
    // Nothing cached: fails now, and is queued
    println!("todo 2: {:?}", client.submit(todo_request(2)?));
    // Replaces the earlier queued request for the same URL
    println!("todo 2: {:?}", client.submit(todo_request(2)?));
    println!("Queued: {:?}", client.queued_urls());

    tokio::time::sleep(Duration::from_millis(200)).await;
    pump("offline");

    println!("=== Back online ===");
    reachability.set_reachable(true);
    tokio::time::sleep(Duration::from_secs(2)).await;
    pump("reconnected");
    println!("Pending retries: {}", client.pending_retries());

    Ok(())
}
