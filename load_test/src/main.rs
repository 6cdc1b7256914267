use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tokio::sync::Semaphore;

/// Hammers a hive's `/emit` endpoint with concurrent counter
/// increments. Grounded on the teacher's `/write` hammer, retargeted
/// at Beehive's single `Emit` entry point.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, default_value = "http://127.0.0.1:7000")]
    target: String,

    #[arg(long, default_value_t = 1000)]
    requests: usize,

    #[arg(long, default_value_t = 100)]
    concurrency: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let permits = std::sync::Arc::new(Semaphore::new(args.concurrency));
    let client = reqwest::Client::new();
    let url = format!("{}/emit", args.target);

    let mut tasks = Vec::with_capacity(args.requests);
    for _ in 0..args.requests {
        let payload = json!({
            "app": "counter",
            "message_type": "add",
            "payload": 1,
        });

        let permit = permits.clone().acquire_owned().await.unwrap();
        let client = client.clone();
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = client.post(&url).json(&payload).send().await {
                tracing::debug!(error = %e, "emit failed");
            }
        }));
    }

    for t in tasks {
        let _ = t.await;
    }

    Ok(())
}
