//! Integration tests for the instance lifecycle.

use std::sync::Arc;
use std::time::Duration;

use labbox::gateway::RouteResolver;
use labbox::management::{GatewayMode, ManagerOptions};
use labbox::{InstanceStatus, LabboxError};
use labbox_test_utils::{
    CHALLENGE_ID, ManualClock, STATIC_FLAG, TestHarness, TokioClock, USER_ID, seed_catalog,
    seed_challenge, seed_user, temp_database,
};

fn gateway_options() -> ManagerOptions {
    ManagerOptions {
        gateway: Some(GatewayMode {
            domain: "ctf.local".to_string(),
            https: false,
        }),
        ..Default::default()
    }
}

// ============================================================================
// RUN
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_run_boots_instance() {
    let harness = TestHarness::new(ManagerOptions::default());

    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    let created = harness.db.find_instance(&id).unwrap().unwrap();
    assert_eq!(created.status, InstanceStatus::Creating);
    assert_eq!(created.flag, STATIC_FLAG);
    assert_eq!(created.expires_at - created.created_at, 60 * 60_000);

    harness.settle().await;

    let running = harness.db.find_instance(&id).unwrap().unwrap();
    assert_eq!(running.status, InstanceStatus::Running);
    assert_eq!(running.access_url, "32768");
    assert!(running.subdomain.is_empty());

    let remaining = harness.manager.lease_remaining(&id).unwrap();
    assert!(remaining > Duration::from_secs(59 * 60));
    assert!(remaining <= Duration::from_secs(60 * 60));

    let workload = harness.runtime.workload(id.as_str()).unwrap();
    assert_eq!(workload.spec.name, id.as_str());
    assert_eq!(workload.spec.image, "nginx:alpine");
    assert_eq!(
        workload.spec.env,
        vec![("flag".to_string(), STATIC_FLAG.to_string())]
    );
    assert_eq!(workload.spec.memory_bytes, 128 * 1024 * 1024);
    assert_eq!(workload.spec.nano_cpus, 500_000_000);
    assert_eq!(workload.spec.ports, vec!["80/tcp".to_string()]);
    assert!(workload.spec.auto_remove);

    let records = harness.db.list_challenge_records(USER_ID).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].instance_id, id.as_str());
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_run_conflicts() {
    let harness = TestHarness::new(ManagerOptions::default());

    harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    let err = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap_err();

    assert!(matches!(err, LabboxError::AlreadyExists(_)));
    assert_eq!(err.code(), 20001);
    assert_eq!(harness.runtime.workload_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quota_of_one() {
    let harness = TestHarness::new(ManagerOptions {
        max_instances: 1,
        ..Default::default()
    });
    seed_user(&harness.db, "user-2");

    let first = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    let err = harness.manager.run("user-2", CHALLENGE_ID).await.unwrap_err();
    assert!(matches!(err, LabboxError::SystemBusy { live: 1, max: 1 }));

    harness.settle().await;
    harness.manager.destroy(&first).await.unwrap();
    harness.settle().await;

    harness.manager.run("user-2", CHALLENGE_ID).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_missing_catalog_entries() {
    let harness = TestHarness::new(ManagerOptions::default());

    let err = harness.manager.run(USER_ID, "nope").await.unwrap_err();
    assert!(matches!(err, LabboxError::ChallengeNotFound(_)));

    let err = harness.manager.run("stranger", CHALLENGE_ID).await.unwrap_err();
    assert!(matches!(err, LabboxError::UserNotFound(_)));

    let mut orphan = harness.db.find_challenge(CHALLENGE_ID).unwrap().unwrap();
    orphan.id = "orphan".to_string();
    orphan.image_id = "missing-image".to_string();
    harness.db.upsert_challenge(&orphan).unwrap();
    let err = harness.manager.run(USER_ID, "orphan").await.unwrap_err();
    assert!(matches!(err, LabboxError::ImageNotFound(_)));

    let mut disabled = harness.db.find_challenge(CHALLENGE_ID).unwrap().unwrap();
    disabled.id = "disabled".to_string();
    disabled.enabled = false;
    harness.db.upsert_challenge(&disabled).unwrap();
    let err = harness.manager.run(USER_ID, "disabled").await.unwrap_err();
    assert!(matches!(err, LabboxError::ChallengeNotFound(_)));

    assert_eq!(harness.db.count_instances().unwrap(), 0);
    assert_eq!(harness.runtime.workload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_create_failure_persists_nothing() {
    let harness = TestHarness::new(ManagerOptions {
        max_instances: 1,
        ..Default::default()
    });
    harness.runtime.fail_create("no such image");

    let err = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap_err();
    assert!(matches!(err, LabboxError::Runtime(_)));
    assert_eq!(harness.db.count_instances().unwrap(), 0);
    assert!(harness.db.list_challenge_records(USER_ID).unwrap().is_empty());

    // The failed attempt released its quota slot.
    harness.runtime.clear_failures();
    harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_dynamic_flags_are_unique() {
    let harness = TestHarness::new(ManagerOptions {
        flag_prefix: "ctf".to_string(),
        ..Default::default()
    });
    seed_challenge(&harness.db, "dyn", 30, true);
    seed_user(&harness.db, "user-2");

    let a = harness.manager.run(USER_ID, "dyn").await.unwrap();
    let b = harness.manager.run("user-2", "dyn").await.unwrap();

    let flag_a = harness.db.find_instance(&a).unwrap().unwrap().flag;
    let flag_b = harness.db.find_instance(&b).unwrap().unwrap().flag;
    assert!(flag_a.starts_with("ctf{") && flag_a.ends_with('}'));
    assert_eq!(flag_a.len(), "ctf{}".len() + 36);
    assert_ne!(flag_a, flag_b);

    let env = harness.runtime.workload(a.as_str()).unwrap().spec.env;
    assert_eq!(env, vec![("flag".to_string(), flag_a)]);
}

// ============================================================================
// GATEWAY MODE
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_gateway_mode_registers_route() {
    let harness = TestHarness::new(gateway_options());

    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    let instance = harness.db.find_instance(&id).unwrap().unwrap();
    assert_eq!(instance.subdomain.len(), 8);
    assert_eq!(
        instance.access_url,
        format!("http://{}.ctf.local", instance.subdomain)
    );
    assert!(!harness.router.contains(&instance.subdomain));

    harness.settle().await;

    let route = harness.router.resolve(&instance.subdomain).unwrap();
    assert_eq!(route.host, "127.0.0.1:32768");
    assert_eq!(route.protocol, "http");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_get_distinct_subdomains() {
    let harness = Arc::new(TestHarness::new(gateway_options()));
    for i in 0..20 {
        seed_user(&harness.db, &format!("racer-{i}"));
    }

    let tasks: Vec<_> = (0..20)
        .map(|i| {
            let manager = Arc::clone(&harness.manager);
            tokio::spawn(async move { manager.run(&format!("racer-{i}"), CHALLENGE_ID).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let mut subdomains: Vec<_> = harness
        .db
        .list_instances()
        .unwrap()
        .into_iter()
        .map(|i| i.subdomain)
        .collect();
    subdomains.sort();
    subdomains.dedup();
    assert_eq!(subdomains.len(), 20);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_subdomains_time_out() {
    let harness = TestHarness::new(ManagerOptions {
        subdomain_length: 1,
        allocation_timeout: Duration::from_secs(2),
        ..gateway_options()
    });
    for i in 0..=35 {
        seed_user(&harness.db, &format!("player-{i}"));
    }

    for i in 0..35 {
        harness
            .manager
            .run(&format!("player-{i}"), CHALLENGE_ID)
            .await
            .unwrap();
    }

    let err = harness
        .manager
        .run("player-35", CHALLENGE_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, LabboxError::Timeout(_)));
    assert_eq!(err.code(), 20008);

    let last = harness.instance_id("player-35", CHALLENGE_ID);
    assert!(harness.db.find_instance(&last).unwrap().is_none());
    assert_eq!(harness.db.count_instances().unwrap(), 35);
    assert_eq!(harness.runtime.workload_count(), 35);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_respect_quota() {
    let harness = TestHarness::new(ManagerOptions {
        max_instances: 5,
        ..Default::default()
    });
    for i in 0..12 {
        seed_user(&harness.db, &format!("racer-{i}"));
    }

    let tasks: Vec<_> = (0..12)
        .map(|i| {
            let manager = Arc::clone(&harness.manager);
            tokio::spawn(async move { manager.run(&format!("racer-{i}"), CHALLENGE_ID).await })
        })
        .collect();

    let mut admitted = 0;
    let mut busy = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(LabboxError::SystemBusy { .. }) => busy += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(admitted, 5);
    assert_eq!(busy, 7);
    assert_eq!(harness.db.count_instances().unwrap(), 5);
}

// ============================================================================
// EXPIRY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_one_minute_expiry_removes_instance_and_route() {
    let harness = TestHarness::new(gateway_options());
    seed_challenge(&harness.db, "quick", 1, false);

    let id = harness.manager.run(USER_ID, "quick").await.unwrap();
    harness.settle().await;
    let subdomain = harness.db.find_instance(&id).unwrap().unwrap().subdomain;
    assert!(harness.router.contains(&subdomain));

    tokio::time::sleep(Duration::from_secs(30)).await;
    harness.settle().await;
    assert!(harness.db.find_instance(&id).unwrap().is_some());

    tokio::time::sleep(Duration::from_secs(31)).await;
    harness.settle().await;

    assert!(harness.db.find_instance(&id).unwrap().is_none());
    assert!(!harness.router.contains(&subdomain));
    assert_eq!(harness.runtime.removed(), vec![id.to_string()]);
    assert!(harness.manager.lease_remaining(&id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_expired_before_boot_completes_is_destroyed() {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let harness = TestHarness::with_clock(gateway_options(), clock.clone());

    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    clock.advance(Duration::from_secs(2 * 3600));
    harness.settle().await;

    assert!(harness.db.find_instance(&id).unwrap().is_none());
    assert!(harness.router.is_empty());
    assert!(harness.manager.lease_remaining(&id).is_none());
    assert_eq!(harness.runtime.workload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_boot_failure_still_expires() {
    let harness = TestHarness::new(ManagerOptions::default());
    seed_challenge(&harness.db, "quick", 1, false);
    harness.runtime.fail_start("exec format error");

    let id = harness.manager.run(USER_ID, "quick").await.unwrap();
    harness.settle().await;

    let failed = harness.db.find_instance(&id).unwrap().unwrap();
    assert_eq!(failed.status, InstanceStatus::CreateFailure);
    assert!(failed.message.contains("exec format error"));
    assert!(harness.manager.lease_remaining(&id).is_some());

    tokio::time::sleep(Duration::from_secs(61)).await;
    harness.settle().await;
    assert!(harness.db.find_instance(&id).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_crashed_workload_is_create_failure() {
    let harness = TestHarness::new(ManagerOptions::default());
    harness.runtime.crash_on_start();

    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    harness.settle().await;

    let failed = harness.db.find_instance(&id).unwrap().unwrap();
    assert_eq!(failed.status, InstanceStatus::CreateFailure);
    assert!(failed.message.contains("stopped"));
}

#[tokio::test(start_paused = true)]
async fn test_port_wait_times_out() {
    let harness = TestHarness::new(ManagerOptions {
        start_timeout: Duration::from_secs(5),
        ..Default::default()
    });
    harness.runtime.never_publish();

    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    tokio::time::sleep(Duration::from_secs(3)).await;
    harness.settle().await;
    assert_eq!(
        harness.db.find_instance(&id).unwrap().unwrap().status,
        InstanceStatus::Creating
    );

    tokio::time::sleep(Duration::from_secs(3)).await;
    harness.settle().await;

    let failed = harness.db.find_instance(&id).unwrap().unwrap();
    assert_eq!(failed.status, InstanceStatus::CreateFailure);
    assert!(failed.message.contains("published no port"));
}

#[tokio::test(start_paused = true)]
async fn test_slow_port_is_polled() {
    let harness = TestHarness::new(ManagerOptions::default());
    harness.runtime.delay_port(3);

    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    harness.settle().await;

    let running = harness.db.find_instance(&id).unwrap().unwrap();
    assert_eq!(running.status, InstanceStatus::Running);
    assert_eq!(running.access_url, "32768");
}

// ============================================================================
// DESTROY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_destroy_is_idempotent() {
    let harness = TestHarness::new(ManagerOptions::default());
    let id = harness.instance_id(USER_ID, CHALLENGE_ID);

    harness.manager.destroy(&id).await.unwrap();

    harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    harness.settle().await;

    harness.manager.destroy(&id).await.unwrap();
    assert_eq!(
        harness.db.find_instance(&id).unwrap().unwrap().status,
        InstanceStatus::Deleting
    );
    assert!(harness.manager.lease_remaining(&id).is_none());

    harness.manager.destroy(&id).await.unwrap();
    harness.settle().await;

    assert!(harness.db.find_instance(&id).unwrap().is_none());
    assert_eq!(harness.runtime.workload_count(), 0);

    harness.manager.destroy(&id).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_repeated_destroy_spares_next_instance() {
    let harness = TestHarness::new(ManagerOptions::default());
    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    harness.settle().await;

    // A second teardown, had one been started, would stall in removal.
    harness
        .runtime
        .delay_removes(&[Duration::ZERO, Duration::from_secs(10)]);
    harness.manager.destroy(&id).await.unwrap();
    harness.manager.destroy(&id).await.unwrap();
    harness.settle().await;
    assert!(harness.db.find_instance(&id).unwrap().is_none());
    assert_eq!(harness.runtime.removed(), vec![id.to_string()]);

    let again = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    assert_eq!(again, id);
    harness.settle().await;

    tokio::time::sleep(Duration::from_secs(11)).await;
    harness.settle().await;

    let fresh = harness.db.find_instance(&id).unwrap().unwrap();
    assert_eq!(fresh.status, InstanceStatus::Running);
    assert_eq!(harness.runtime.workload_count(), 1);
    assert_eq!(harness.runtime.removed().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_does_not_wait_on_workload_creation() {
    let harness = TestHarness::new(ManagerOptions::default());
    let id = harness.instance_id(USER_ID, CHALLENGE_ID);
    harness.runtime.slow_create(Some(Duration::from_secs(5)));

    let manager = Arc::clone(&harness.manager);
    let pending = tokio::spawn(async move { manager.run(USER_ID, CHALLENGE_ID).await });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    let start = tokio::time::Instant::now();
    let err = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap_err();
    assert!(matches!(err, LabboxError::AlreadyExists(_)));
    harness.manager.destroy(&id).await.unwrap();
    assert!(!harness.manager.submit_flag(&id, STATIC_FLAG).await.unwrap());
    assert!(start.elapsed() < Duration::from_secs(1));

    assert_eq!(pending.await.unwrap().unwrap(), id);
    harness.settle().await;
    assert_eq!(
        harness.db.find_instance(&id).unwrap().unwrap().status,
        InstanceStatus::Running
    );
    assert_eq!(harness.runtime.workload_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_destroy_tolerates_vanished_workload() {
    let harness = TestHarness::new(ManagerOptions::default());
    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    harness.settle().await;

    harness.runtime.vanish(id.as_str());
    harness.manager.destroy(&id).await.unwrap();
    harness.settle().await;

    assert!(harness.db.find_instance(&id).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_failed_removal_is_recorded_and_retryable() {
    let harness = TestHarness::new(gateway_options());
    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    harness.settle().await;
    let subdomain = harness.db.find_instance(&id).unwrap().unwrap().subdomain;

    harness.runtime.fail_remove(Some("device busy"));
    harness.manager.destroy(&id).await.unwrap();
    harness.settle().await;

    let stuck = harness.db.find_instance(&id).unwrap().unwrap();
    assert_eq!(stuck.status, InstanceStatus::DeleteFailure);
    assert!(stuck.message.contains("device busy"));
    assert!(harness.router.contains(&subdomain));

    harness.runtime.fail_remove(None);
    harness.manager.destroy(&id).await.unwrap();
    harness.settle().await;

    assert!(harness.db.find_instance(&id).unwrap().is_none());
    assert!(!harness.router.contains(&subdomain));
}

#[tokio::test(start_paused = true)]
async fn test_destroy_during_boot_leaves_no_route() {
    let harness = TestHarness::new(gateway_options());

    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    harness.manager.destroy(&id).await.unwrap();
    harness.settle().await;

    assert!(harness.db.find_instance(&id).unwrap().is_none());
    assert!(harness.router.is_empty());
    assert!(harness.manager.lease_remaining(&id).is_none());
}

// ============================================================================
// FLAG SUBMISSION
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_solve_after_ninety_seconds() {
    let harness = TestHarness::new(ManagerOptions::default());
    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    harness.settle().await;

    tokio::time::sleep(Duration::from_secs(90)).await;
    let ok = harness
        .manager
        .submit_flag(&id, &STATIC_FLAG.to_uppercase())
        .await
        .unwrap();
    assert!(ok);

    let solve = harness.db.find_solve(USER_ID, CHALLENGE_ID).unwrap().unwrap();
    assert!((90_000..90_100).contains(&solve.used_time), "{}", solve.used_time);
    assert_eq!(solve.used_time_str, "1m30s");
    assert_eq!(solve.points, 100);
    assert_eq!(solve.solved_at - solve.start_at, solve.used_time);

    harness.settle().await;
    assert!(harness.db.find_instance(&id).unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_wrong_flag_changes_nothing() {
    let harness = TestHarness::new(ManagerOptions::default());
    let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    harness.settle().await;
    let before = harness.db.find_instance(&id).unwrap().unwrap();

    assert!(!harness.manager.submit_flag(&id, "flag{nope}").await.unwrap());
    harness.settle().await;

    assert_eq!(harness.db.find_instance(&id).unwrap().unwrap(), before);
    assert!(harness.db.find_solve(USER_ID, CHALLENGE_ID).unwrap().is_none());

    let missing = harness.instance_id("nobody", CHALLENGE_ID);
    assert!(!harness.manager.submit_flag(&missing, STATIC_FLAG).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_repeat_solve_keeps_first_solved_at() {
    let harness = TestHarness::new(ManagerOptions::default());

    let solve_after = |secs: u64| {
        let harness = &harness;
        async move {
            let id = harness.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
            harness.settle().await;
            tokio::time::sleep(Duration::from_secs(secs)).await;
            assert!(harness.manager.submit_flag(&id, STATIC_FLAG).await.unwrap());
            harness.settle().await;
            harness.db.find_solve(USER_ID, CHALLENGE_ID).unwrap().unwrap()
        }
    };

    let first = solve_after(90).await;
    let faster = solve_after(30).await;
    assert_eq!(faster.id, first.id);
    assert_eq!(faster.solved_at, first.solved_at);
    assert!(faster.used_time < 31_000);
    assert_eq!(faster.used_time_str, "30s");

    let slower = solve_after(60).await;
    assert_eq!(slower.used_time, faster.used_time);
    assert_eq!(harness.db.list_solves(USER_ID).unwrap().len(), 1);
}

// ============================================================================
// RECOVERY
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_restart_rebuilds_routes_and_leases() {
    let (_dir, db) = temp_database();
    seed_catalog(&db, 60);

    let before = TestHarness::with_database(
        db.clone(),
        gateway_options(),
        Arc::new(TokioClock::default()),
    );
    let id = before.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    before.settle().await;
    before.manager.shutdown();
    let runtime = Arc::clone(&before.runtime);
    let subdomain = db.find_instance(&id).unwrap().unwrap().subdomain;

    let after = TestHarness::with_parts(
        db.clone(),
        runtime,
        gateway_options(),
        Arc::new(TokioClock::default()),
    );
    assert!(after.router.is_empty());

    assert_eq!(after.manager.restart_containers().await.unwrap(), 1);
    after.settle().await;

    assert!(after.router.contains(&subdomain));
    assert!(after.manager.lease_remaining(&id).is_some());
    assert_eq!(
        db.find_instance(&id).unwrap().unwrap().status,
        InstanceStatus::Running
    );
}

#[tokio::test(start_paused = true)]
async fn test_restart_destroys_expired_instances() {
    let (_dir, db) = temp_database();
    seed_catalog(&db, 60);

    let before = TestHarness::with_database(
        db.clone(),
        ManagerOptions::default(),
        Arc::new(TokioClock::new(1_700_000_000_000)),
    );
    let id = before.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    before.settle().await;
    before.manager.shutdown();

    // Two hours later.
    let after = TestHarness::with_parts(
        db.clone(),
        Arc::clone(&before.runtime),
        ManagerOptions::default(),
        Arc::new(TokioClock::new(1_700_000_000_000 + 2 * 3_600_000)),
    );
    after.manager.restart_containers().await.unwrap();
    after.settle().await;

    assert!(db.find_instance(&id).unwrap().is_none());
    assert_eq!(after.runtime.workload_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_restart_resumes_teardown() {
    let (_dir, db) = temp_database();
    seed_catalog(&db, 60);

    let before = TestHarness::with_database(
        db.clone(),
        ManagerOptions::default(),
        Arc::new(TokioClock::default()),
    );
    let id = before.manager.run(USER_ID, CHALLENGE_ID).await.unwrap();
    before.settle().await;
    before.runtime.fail_remove(Some("daemon restarting"));
    before.manager.destroy(&id).await.unwrap();
    before.settle().await;
    before.manager.shutdown();
    assert_eq!(
        db.find_instance(&id).unwrap().unwrap().status,
        InstanceStatus::DeleteFailure
    );

    before.runtime.fail_remove(None);
    db.transition_status(&id, InstanceStatus::Deleting, "").unwrap();

    let after = TestHarness::with_parts(
        db.clone(),
        Arc::clone(&before.runtime),
        ManagerOptions::default(),
        Arc::new(TokioClock::default()),
    );
    after.manager.restart_containers().await.unwrap();
    after.settle().await;

    assert!(db.find_instance(&id).unwrap().is_none());
}
