#![cfg(feature = "client")]

use chatgate::chat::ChatRequest;
use chatgate::jobs::{Job, JobQueue};
use chatgate_nats::NatsJobQueue;

// Requires NATS running and env CHATGATE_TEST_NATS_URL set, e.g. nats://127.0.0.1:4222
#[tokio::test]
#[ignore]
async fn jobs_reach_a_queue_group_member() {
    let url = std::env::var("CHATGATE_TEST_NATS_URL").expect("set CHATGATE_TEST_NATS_URL");
    let subject = format!("chat.jobs.it.{}", std::process::id());

    let worker = NatsJobQueue::connect(&url, subject.clone(), "it-workers").await.expect("connect");
    let submitter = NatsJobQueue::connect(&url, subject, "it-workers").await.expect("connect");

    // Join the group before publishing; core NATS does not buffer for absent consumers.
    let receiving = tokio::spawn(async move { worker.receive().await });
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let job = Job::new_pending("j1", "u1", "session-0000abcd", ChatRequest::new("hello"), 1);
    submitter.publish(&job).await.expect("publish");

    let received = receiving.await.unwrap().expect("receive").expect("job");
    assert_eq!(received, job);
}
