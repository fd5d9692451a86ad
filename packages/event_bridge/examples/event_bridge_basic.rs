//! Basic example of bridging a callback-based event source into async code.
//!
//! Waits for a single "ready" event, then consumes a stream of "progress" events until the
//! producer is done, and finally releases a resource with exactly-once cleanup.

use std::rc::Rc;

use event_bridge::{Disposable, LocalEmitter, Normalized, as_sequence, wait_once};
use futures::StreamExt;
use futures::executor::block_on;

fn main() {
    println!("=== Event Bridge Basic Example ===");

    let emitter = Rc::new(LocalEmitter::<&str, String>::new());

    let ready = wait_once(&emitter, "ready", false);
    let mut progress = as_sequence(&emitter, "progress", 16);

    println!("Firing events...");
    emitter.emit(&"ready", vec!["worker-1".to_string()]);

    for step in 1..=3 {
        emitter.emit(&"progress", vec![format!("step {step}"), "ok".to_string()]);
    }

    match block_on(ready) {
        Ok(Normalized::Single(name)) => println!("Ready: {name}"),
        Ok(other) => println!("Ready with {} arguments", other.len()),
        Err(rejected) => println!("Rejected: {rejected}"),
    }

    let steps: Vec<_> = block_on((&mut progress).take(3).collect());

    for step in steps {
        println!("Progress: {:?}", step.into_vec());
    }

    progress.close();
    println!(
        "Listeners left for \"progress\": {}",
        emitter.listener_count(&"progress")
    );

    let connection = Disposable::new("connection-42", |name| {
        println!("Closing {name}");
        Ok(())
    });

    println!("Using {}", *connection);
    drop(connection);

    println!("Example completed successfully!");
}
