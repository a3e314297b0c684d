//! Demonstrates a saturated pool rejecting extra callers instead of queueing them.
use std::sync::Arc;
use std::time::Duration;
use stormwall::prelude::*;
use tokio::sync::{oneshot, Mutex};

struct Holder {
    started: Mutex<Option<oneshot::Sender<()>>>,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl Runner for Holder {
    type Output = &'static str;
    type Error = std::io::Error;

    async fn run(&self, result: ResultSender<&'static str, std::io::Error>) {
        if let Some(started) = self.started.lock().await.take() {
            let _ = started.send(());
        }
        if let Some(release) = self.release.lock().await.take() {
            let _ = release.await;
        }
        let _ = result.ok("served");
    }

    async fn fallback(
        &self,
        cause: CommandError<std::io::Error>,
        result: ResultSender<&'static str, std::io::Error>,
    ) {
        let _ = if cause.is_pool_full() { result.ok("shed") } else { result.ok("degraded") };
    }

    fn pool_name(&self) -> &str {
        "inventory"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let registry = PoolRegistry::builder().pool("inventory", PoolConfig::new(1)?).build()?;
    let sink = MemorySink::new();

    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    let holder = Arc::new(Holder {
        started: Mutex::new(Some(started_tx)),
        release: Mutex::new(Some(release_rx)),
    });

    let held = Command::from_arc(holder.clone(), &registry).with_sink(sink.clone()).queue();
    started_rx.await?;

    let rejected = Command::from_arc(holder, &registry).with_sink(sink.clone()).execute().await?;
    assert_eq!(rejected, "shed");

    let _ = release_tx.send(());
    assert_eq!(held.await?, "served");

    for event in sink.events() {
        println!("{}", event);
    }
    for pool in registry.snapshot() {
        println!("{:?}", pool);
    }
    Ok(())
}
