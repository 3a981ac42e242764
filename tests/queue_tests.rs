//! Queue-facing behaviour: id assignment, queries, and snapshot
//! semantics, driven through the state-machine handlers.


use std::collections::HashSet;
use std::time::Duration;

use conductor::queue::{JobQuery, JobStatus, QueueInput, QueueState};
use test_harness::{make_job, TestRig};
use tokio::sync::oneshot;

async fn query(rig: &mut TestRig, query: JobQuery) -> Vec<conductor::queue::Job> {
    let (reply, rx) = oneshot::channel();
    rig.state = rig
        .state
        .step(&mut rig.store, &rig.ctx, QueueInput::Query { query, reply })
        .await;
    rx.await.unwrap().unwrap()
}

#[tokio::test]
async fn burst_of_pushes_yields_unique_ids() {
    let mut rig = TestRig::running().await;

    // 1,000 registrations, paced so no single millisecond sees more than
    // the sub-counter's 256-id budget.
    let mut ids = Vec::with_capacity(1000);
    for _ in 0..5 {
        for _ in 0..200 {
            let id = rig.push(make_job(0, vec![], vec![], vec![])).await.unwrap();
            ids.push(id);
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let unique: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(unique.len(), 1000);
    assert_eq!(rig.store.pending_jobs.len(), 1000);
}

#[tokio::test]
async fn pushed_job_is_visible_to_the_next_query() {
    let mut rig = TestRig::running().await;

    let id = rig.push(make_job(3, vec![], vec![], vec!["work"])).await.unwrap();

    let jobs = query(&mut rig, JobQuery::All).await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, id);
    assert_eq!(jobs[0].status, JobStatus::Queued);
    assert_eq!(jobs[0].priority, 3);
}

#[tokio::test]
async fn priority_query_filters_the_snapshot() {
    let mut rig = TestRig::running().await;

    let a = rig.push(make_job(1, vec![], vec![], vec![])).await.unwrap();
    let _b = rig.push(make_job(2, vec![], vec![], vec![])).await.unwrap();
    let c = rig.push(make_job(1, vec![], vec![], vec![])).await.unwrap();

    let jobs = query(&mut rig, JobQuery::AtPriority(1)).await;
    let ids: HashSet<i64> = jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, HashSet::from([a, c]));

    let none = query(&mut rig, JobQuery::AtPriority(99)).await;
    assert!(none.is_empty());
}

#[tokio::test]
async fn queries_report_paused_jobs_as_paused() {
    let mut rig = TestRig::running().await;

    rig.push(make_job(0, vec![], vec![], vec![])).await.unwrap();
    rig.toggle_pause().await.unwrap();

    let jobs = query(&mut rig, JobQuery::All).await;
    assert_eq!(jobs[0].status, JobStatus::Paused);
}

#[tokio::test]
async fn query_is_a_snapshot_not_a_view() {
    let mut rig = TestRig::running().await;

    rig.push(make_job(0, vec![], vec![], vec![])).await.unwrap();
    let before = query(&mut rig, JobQuery::All).await;

    rig.push(make_job(0, vec![], vec![], vec![])).await.unwrap();
    assert_eq!(before.len(), 1);
    assert_eq!(query(&mut rig, JobQuery::All).await.len(), 2);
}

#[tokio::test]
async fn blocked_pushes_sort_after_their_blockers() {
    let mut rig = TestRig::running().await;

    let a = rig.push(make_job(10, vec![], vec![], vec![])).await.unwrap();
    let b = rig
        .push(make_job(-10, vec![a], vec![], vec![]))
        .await
        .unwrap();

    // The urgent job depends on the lazy one, so the lazy one leads.
    let ids: Vec<i64> = rig.store.pending_jobs.iter().map(|j| j.id).collect();
    assert_eq!(ids, vec![a, b]);
    assert_eq!(rig.state, QueueState::Running);
}
