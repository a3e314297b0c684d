//! Demonstrates a command whose run misses its deadline and degrades to a fallback.
use std::time::Duration;
use stormwall::prelude::*;

struct Quote {
    delay: Duration,
}

#[async_trait]
impl Runner for Quote {
    type Output = String;
    type Error = std::io::Error;

    async fn run(&self, result: ResultSender<String, std::io::Error>) {
        tokio::time::sleep(self.delay).await;
        let _ = result.ok("live quote: 101.25".to_string());
    }

    async fn fallback(
        &self,
        cause: CommandError<std::io::Error>,
        result: ResultSender<String, std::io::Error>,
    ) {
        let _ = result.ok(format!("cached quote: 100.00 ({})", cause));
    }

    fn pool_name(&self) -> &str {
        "quotes"
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(100)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let registry = PoolRegistry::new();

    let fast = Command::new(Quote { delay: Duration::from_millis(10) }, &registry)
        .with_sink(LogSink)
        .execute()
        .await?;
    println!("fast path: {}", fast);

    let slow = Command::new(Quote { delay: Duration::from_millis(300) }, &registry)
        .with_sink(LogSink)
        .execute()
        .await?;
    println!("fallback path: {}", slow);

    Ok(())
}
