use std::sync::Arc;

use clap::Parser;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use grader::config::CliArgs;
use grader::create_timestamp;
use grader::language::LanguageRegistry;
use grader::queue::{QueuedSubmission, SubmissionQueue};
use grader::task::GradeRequest;
use grader::worker::worker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = CliArgs::parse();
    let n_workers = cli.workers;

    if n_workers == 0 {
        anyhow::bail!("The number of grading workers must not be 0");
    }
    if cli.requests.is_empty() {
        anyhow::bail!("No grading request files given");
    }

    let limits = Arc::new(cli.to_limits()?);
    let registry = Arc::new(LanguageRegistry::new());
    let queue = Arc::new(SubmissionQueue::new());
    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let mut workers = JoinSet::new();
    for i in 1..=n_workers {
        workers.spawn(worker(
            i,
            registry.clone(),
            limits.clone(),
            queue.clone(),
            shutdown_token.clone(),
        ));
    }

    let mut pending = Vec::new();
    for (idx, path) in cli.requests.iter().enumerate() {
        let request = match load_request(path) {
            Ok(request) => request,
            Err(e) => {
                // a malformed request, unknown language included, is
                // rejected here and never enters the pipeline
                log::error!("Rejecting request {path}: {e}");
                continue;
            }
        };

        let (responder, receiver) = oneshot::channel();
        queue
            .push(QueuedSubmission {
                id: idx as u64,
                request,
                responder,
            })
            .await;
        pending.push((path.clone(), receiver));
    }

    for (path, receiver) in pending {
        match receiver.await {
            Ok(result) => {
                let line = serde_json::json!({
                    "request": path,
                    "graded_at": create_timestamp(),
                    "result": result,
                });
                println!("{line}");
            }
            Err(_) => log::error!("Grading of {path} was dropped before completion"),
        }
    }

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    shutdown_token.cancel();
    log::info!("Shutdown signal sent to workers, waiting for them to finish...");

    while let Some(res) = workers.join_next().await {
        if let Err(e) = res {
            if e.is_panic() {
                log::error!("Worker handle panicked: {e:?}");
            } else {
                log::error!("Worker handle finished with error: {e:?}");
            }
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}

fn load_request(path: &str) -> anyhow::Result<GradeRequest> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}
