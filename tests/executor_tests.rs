//! Tests for the shell worker pool behind the executor contract.

use std::time::Duration;

use conductor::config::ExecutorConfig;
use conductor::executor::{ExecuteRequest, JobExecutor, JobOutcome, OutcomePayload};
use conductor::queue::{Job, JobStatus};
use tokio::time::timeout;

fn shell_executor(workers: usize, queue_capacity: usize) -> conductor::executor::ExecutorClient {
    JobExecutor::spawn(ExecutorConfig {
        queue_capacity,
        workers,
        nominal_latency_ms: 10,
    })
}

fn command_job(id: i64, commands: &[&str]) -> Job {
    let mut job = Job::new(0, vec![], vec![], commands.iter().map(|s| s.to_string()).collect());
    job.id = id;
    job
}

async fn run_to_outcome(client: &conductor::executor::ExecutorClient, job: Job) -> JobOutcome {
    let (request, handle) = ExecuteRequest::new(job);
    assert!(client.submit(request), "submission should be accepted");

    let ack = timeout(Duration::from_secs(2), handle.ack_rx)
        .await
        .expect("ack should arrive")
        .expect("ack channel open");
    assert!(ack.is_ok(), "worker should acknowledge acceptance");

    timeout(Duration::from_secs(5), handle.outcome_rx)
        .await
        .expect("outcome should arrive")
        .expect("outcome channel open")
}

#[tokio::test]
async fn simple_command_completes_with_stdout_lines() {
    let client = shell_executor(2, 16);

    let outcome = run_to_outcome(&client, command_job(1, &["echo hello"])).await;
    assert_eq!(outcome.job_id, 1);
    assert_eq!(outcome.status, JobStatus::Complete);
    match outcome.payload {
        OutcomePayload::Outputs(outputs) => assert_eq!(outputs, vec!["hello".to_string()]),
        OutcomePayload::Children(_) => panic!("shell jobs do not spawn children"),
    }
}

#[tokio::test]
async fn commands_run_in_order_and_outputs_accumulate() {
    let client = shell_executor(2, 16);

    let outcome = run_to_outcome(&client, command_job(2, &["echo one", "echo two", "seq 3 4"])).await;
    assert_eq!(outcome.status, JobStatus::Complete);
    match outcome.payload {
        OutcomePayload::Outputs(outputs) => assert_eq!(
            outputs,
            vec![
                "one".to_string(),
                "two".to_string(),
                "3".to_string(),
                "4".to_string()
            ]
        ),
        OutcomePayload::Children(_) => panic!("shell jobs do not spawn children"),
    }
}

#[tokio::test]
async fn failing_command_errors_the_job() {
    let client = shell_executor(2, 16);

    let outcome = run_to_outcome(&client, command_job(3, &["echo kept", "false", "echo skipped"])).await;
    assert_eq!(outcome.status, JobStatus::Error);
    match outcome.payload {
        // Output gathered before the failure is preserved; nothing after
        // the failing command ran.
        OutcomePayload::Outputs(outputs) => assert_eq!(outputs, vec!["kept".to_string()]),
        OutcomePayload::Children(_) => panic!("shell jobs do not spawn children"),
    }
}

#[tokio::test]
async fn empty_job_completes_with_no_outputs() {
    let client = shell_executor(1, 4);

    let outcome = run_to_outcome(&client, command_job(4, &[])).await;
    assert_eq!(outcome.status, JobStatus::Complete);
    match outcome.payload {
        OutcomePayload::Outputs(outputs) => assert!(outputs.is_empty()),
        OutcomePayload::Children(_) => panic!("shell jobs do not spawn children"),
    }
}

#[tokio::test]
async fn full_pool_refuses_further_submissions() {
    // One worker and a one-slot queue: a slow job occupies the worker,
    // the next submission sits in the queue, the third is refused.
    let client = shell_executor(1, 1);

    let (slow, _slow_handle) = ExecuteRequest::new(command_job(5, &["sleep 2"]));
    assert!(client.submit(slow));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (queued, _queued_handle) = ExecuteRequest::new(command_job(6, &["echo queued"]));
    assert!(client.submit(queued));

    let (refused, _refused_handle) = ExecuteRequest::new(command_job(7, &["echo refused"]));
    assert!(!client.submit(refused));
}
