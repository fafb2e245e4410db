//! End-to-end runs of the coordinator with in-process stand-ins for the model
//! and the code runner.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use tokio_util::sync::CancellationToken;

use gridbench_core::error::{ProviderError, SourceError};
use gridbench_core::llm::ChatMessage;
use gridbench_core::metrics::RunInfo;
use gridbench_core::recovery::RetryPolicy;
use gridbench_core::tasks::Example;
use gridbench_core::{
    CheckpointWriter, CodeRunner, Coordinator, EvalError, Grid, ModelProvider, ResultLog,
    RunStatus, SandboxError, SolveMode, TaskDescriptor, TaskProcessor, TaskStream, executor_for,
};

const SOLUTION: &str = "The output matches the input.\n```python\ndef solve_task(grid):\n    return grid\n```";
const SLOW_MARKER: i64 = 777;

fn grid(value: i64) -> Grid {
    Grid::try_from(vec![vec![value, 0], vec![0, value]]).unwrap()
}

/// Identity task: whatever the input, the expected output is the same grid
fn task(id: &str, value: i64) -> TaskDescriptor {
    let pair = Example {
        input: grid(value),
        output: grid(value),
    };
    TaskDescriptor::new(id, vec![pair.clone()], vec![pair])
}

fn source(tasks: Vec<TaskDescriptor>) -> TaskStream {
    stream::iter(tasks.into_iter().map(Ok)).boxed()
}

fn mentions_slow_marker(messages: &[ChatMessage]) -> bool {
    messages
        .iter()
        .any(|m| m.content.contains(&SLOW_MARKER.to_string()))
}

/// Answers with the identity solution, tracking how many calls overlap
#[derive(Default)]
struct CountingProvider {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
    delay: Duration,
}

#[async_trait]
impl ModelProvider for CountingProvider {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if mentions_slow_marker(messages) {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(SOLUTION.to_string())
    }

    fn identifier(&self) -> String {
        "stub/counting".to_string()
    }
}

/// Records how many tasks had been pulled from the source at each call
struct PullObservingProvider {
    pulled: Arc<AtomicUsize>,
    seen: Mutex<Vec<usize>>,
}

#[async_trait]
impl ModelProvider for PullObservingProvider {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.seen
            .lock()
            .unwrap()
            .push(self.pulled.load(Ordering::SeqCst));
        Ok(SOLUTION.to_string())
    }

    fn identifier(&self) -> String {
        "stub/observer".to_string()
    }
}

/// Fires the run's cancellation token, then answers normally
struct CancellingProvider {
    token: CancellationToken,
}

#[async_trait]
impl ModelProvider for CancellingProvider {
    async fn generate(&self, _messages: &[ChatMessage]) -> Result<String, ProviderError> {
        self.token.cancel();
        Ok(SOLUTION.to_string())
    }

    fn identifier(&self) -> String {
        "stub/cancelling".to_string()
    }
}

/// Panics for tasks carrying the slow marker
struct PanickingProvider;

#[async_trait]
impl ModelProvider for PanickingProvider {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        if mentions_slow_marker(messages) {
            panic!("provider blew up");
        }
        Ok(SOLUTION.to_string())
    }

    fn identifier(&self) -> String {
        "stub/panicking".to_string()
    }
}

/// Returns the input grid unchanged without spawning anything
struct EchoRunner;

#[async_trait]
impl CodeRunner for EchoRunner {
    async fn run(&self, _code: &str, input: &Grid, _attempt_id: &str) -> Result<Grid, SandboxError> {
        Ok(input.clone())
    }
}

fn coordinator(
    provider: Arc<dyn ModelProvider>,
    log_path: &Path,
    concurrency: usize,
    interval: usize,
) -> Coordinator {
    let processor = TaskProcessor::new(
        provider.clone(),
        executor_for(SolveMode::Code, "solve_task"),
        Arc::new(EchoRunner),
    )
    .with_retry(RetryPolicy::new().with_max_retries(1).with_backoff(Duration::ZERO));
    let info = RunInfo {
        mode: SolveMode::Code,
        model_identifier: provider.identifier(),
        best_of: 1,
        max_concurrent_tasks: concurrency,
        config: serde_json::Value::Null,
    };
    Coordinator::new(processor, CheckpointWriter::new(log_path, interval), info)
}

fn log_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("results").join("code_benchmark_results.jsonl")
}

#[tokio::test]
async fn test_run_records_every_task_and_bounds_concurrency() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let provider = Arc::new(CountingProvider {
        delay: Duration::from_millis(20),
        ..CountingProvider::default()
    });
    let tasks: Vec<_> = (0..8).map(|i| task(&format!("task-{i}"), 1)).collect();

    let metadata = coordinator(provider.clone(), &path, 3, 3)
        .run(source(tasks), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Completed);
    assert_eq!(metadata.tasks_submitted, 8);
    assert_eq!(metadata.tasks_completed, 8);
    assert_eq!(metadata.tasks_solved, 8);
    assert_eq!(metadata.verification_pass_rate_percent, 100.0);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 8);
    assert_eq!(provider.max_in_flight.load(Ordering::SeqCst), 3);

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(content.lines().count(), 9);
    assert!(content.lines().last().unwrap().contains("\"entry_type\":\"metadata\""));

    let log = ResultLog::read(&path).await.unwrap();
    let mut ids: Vec<_> = log.records.iter().map(|r| r.task_id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(log.metadata.unwrap().status, RunStatus::Completed);
}

#[tokio::test]
async fn test_tasks_are_pulled_only_when_a_slot_frees() {
    let dir = tempfile::tempdir().unwrap();
    let pulled = Arc::new(AtomicUsize::new(0));
    let provider = Arc::new(PullObservingProvider {
        pulled: pulled.clone(),
        seen: Mutex::new(Vec::new()),
    });

    let counter = pulled.clone();
    let tasks = stream::iter((0..4).map(|i| task(&format!("task-{i}"), 1)))
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .map(Ok)
        .boxed();

    coordinator(provider.clone(), &log_path(&dir), 1, 5)
        .run(tasks, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(*provider.seen.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_empty_source_still_writes_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);

    let metadata = coordinator(Arc::new(CountingProvider::default()), &path, 4, 5)
        .run(source(Vec::new()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Completed);
    assert_eq!(metadata.tasks_completed, 0);
    let log = ResultLog::read(&path).await.unwrap();
    assert!(log.records.is_empty());
    assert!(log.metadata.is_some());
}

#[tokio::test]
async fn test_cancellation_finalizes_as_interrupted() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let provider = Arc::new(CountingProvider::default());
    let tasks = vec![
        task("fast-0", 1),
        task("fast-1", 1),
        task("slow-0", SLOW_MARKER),
        task("slow-1", SLOW_MARKER),
        task("never", 1),
    ];

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let coordinator = coordinator(provider, &path, 2, 10);
    let metadata = coordinator.run(source(tasks), cancel).await.unwrap();

    assert_eq!(metadata.status, RunStatus::Interrupted);
    assert_eq!(metadata.tasks_completed, 2);
    assert_eq!(metadata.tasks_submitted, 4);
    assert!(coordinator.checkpoint().is_finalized());

    let log = ResultLog::read(&path).await.unwrap();
    let ids: Vec<_> = log.records.iter().map(|r| r.task_id.as_str()).collect();
    assert!(ids.contains(&"fast-0"));
    assert!(ids.contains(&"fast-1"));
    assert_eq!(log.metadata.unwrap().status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_task_finishing_as_interrupt_arrives_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let cancel = CancellationToken::new();
    let provider = Arc::new(CancellingProvider {
        token: cancel.clone(),
    });

    let metadata = coordinator(provider, &path, 1, 5)
        .run(source(vec![task("last", 1)]), cancel)
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Interrupted);
    assert_eq!(metadata.tasks_submitted, 1);
    assert_eq!(metadata.tasks_completed, 1);
    assert_eq!(metadata.solved_task_ids, vec!["last".to_string()]);

    let log = ResultLog::read(&path).await.unwrap();
    assert_eq!(log.records.len(), 1);
    assert_eq!(log.records[0].task_id, "last");
    assert!(log.records[0].solved());
    assert_eq!(log.metadata.unwrap().status, RunStatus::Interrupted);
}

#[tokio::test]
async fn test_source_failure_aborts_after_draining() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let items = vec![
        Ok(task("first", 1)),
        Ok(task("second", 1)),
        Err(SourceError::format("tasks.jsonl", "truncated record")),
        Ok(task("unreached", 1)),
    ];

    let result = coordinator(Arc::new(CountingProvider::default()), &path, 1, 5)
        .run(stream::iter(items).boxed(), CancellationToken::new())
        .await;
    assert!(matches!(result, Err(EvalError::Source(_))));

    let log = ResultLog::read(&path).await.unwrap();
    let ids: Vec<_> = log.records.iter().map(|r| r.task_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second"]);

    let metadata = log.metadata.unwrap();
    assert_eq!(metadata.status, RunStatus::Aborted);
    assert!(metadata.error.unwrap().contains("truncated record"));
}

#[tokio::test]
async fn test_panicking_task_becomes_failed_record() {
    let dir = tempfile::tempdir().unwrap();
    let path = log_path(&dir);
    let tasks = vec![task("ok", 1), task("boom", SLOW_MARKER), task("ok-too", 1)];

    let metadata = coordinator(Arc::new(PanickingProvider), &path, 2, 1)
        .run(source(tasks), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(metadata.status, RunStatus::Completed);
    assert_eq!(metadata.tasks_completed, 3);
    assert_eq!(metadata.tasks_solved, 2);
    assert_eq!(metadata.unsolved_task_ids, vec!["boom".to_string()]);

    let log = ResultLog::read(&path).await.unwrap();
    let boom = log.records.iter().find(|r| r.task_id == "boom").unwrap();
    assert!(boom.error.as_deref().unwrap().contains("provider blew up"));
    assert!(boom.task_data.is_some());
}
