//! Goal lifecycle behavior: client accounting, terminal mapping, and
//! control goal validation.

use fleetkit::command::GoalEvent;
use fleetkit::fms::{
    DynamicEventFeedback, DynamicEventStatus, DynamicEventType, EventId, GoalTerminalStatus,
};
use fleetkit::goals::{ControlKind, GoalSubmission, RobotSnapshot};
use fleetkit::store::RobotUpdate;
use fleetkit::test_support::{MockCommandFactory, MockTaskApi};
use fleetkit::{FleetError, FleetKitConfig, FleetOrchestrator};
use std::sync::Arc;
use std::time::Duration;

fn orchestrator_with(factory: Arc<MockCommandFactory>) -> FleetOrchestrator {
    FleetOrchestrator::new(
        FleetKitConfig::default(),
        factory,
        Arc::new(MockTaskApi::new()),
    )
}

#[tokio::test]
async fn store_sequence_supersedes_caller_sequence() {
    let factory = Arc::new(MockCommandFactory::new());
    let orchestrator = orchestrator_with(factory.clone());

    orchestrator
        .context()
        .store
        .upsert("r1", "f1", RobotUpdate::default().with_event_seq(5))
        .await;

    let submission = GoalSubmission::new_request("r1", "f1", "go_to_place", serde_json::json!({}))
        .with_sequence(9);
    let completion = orchestrator.submit_goal(submission, None).await.unwrap();
    assert_eq!(completion.status, GoalTerminalStatus::Succeeded);

    let sent = factory.sent_goals();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.dynamic_event_seq, 5);
}

#[tokio::test]
async fn caller_sequence_is_used_when_store_has_none() {
    let factory = Arc::new(MockCommandFactory::new());
    let orchestrator = orchestrator_with(factory.clone());

    let submission = GoalSubmission::new_request("r1", "f1", "go_to_place", serde_json::json!({}))
        .with_sequence(9);
    orchestrator.submit_goal(submission, None).await.unwrap();
    assert_eq!(factory.sent_goals()[0].1.dynamic_event_seq, 9);
}

#[tokio::test]
async fn clients_are_destroyed_on_every_exit_path() {
    // Success.
    let factory = Arc::new(MockCommandFactory::new());
    let orchestrator = orchestrator_with(factory.clone());
    let counters = factory.counters();
    orchestrator
        .submit_goal(
            GoalSubmission::new_request("r1", "f1", "go_to_place", serde_json::json!({})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(counters.created(), 1);
    assert!(counters.balanced());

    // Rejection.
    factory.push_script(vec![GoalEvent::Rejected]);
    let result = orchestrator
        .submit_goal(
            GoalSubmission::new_request("r1", "f1", "go_to_place", serde_json::json!({})),
            None,
        )
        .await;
    assert!(matches!(result, Err(FleetError::GoalRejected { .. })));
    assert_eq!(counters.created(), 2);
    assert!(counters.balanced());

    // Endpoint unavailable: nothing is sent, client still destroyed.
    factory.set_ready(false);
    let sent_before = factory.sent_goals().len();
    let result = orchestrator
        .submit_goal(
            GoalSubmission::new_request("r1", "f1", "go_to_place", serde_json::json!({})),
            None,
        )
        .await;
    assert!(matches!(result, Err(FleetError::EndpointUnavailable { .. })));
    assert_eq!(factory.sent_goals().len(), sent_before);
    assert_eq!(counters.created(), 3);
    assert!(counters.balanced());

    // Stream ending without a terminal result is a protocol error.
    factory.set_ready(true);
    factory.push_script(vec![GoalEvent::Accepted]);
    let result = orchestrator
        .submit_goal(
            GoalSubmission::new_request("r1", "f1", "go_to_place", serde_json::json!({})),
            None,
        )
        .await;
    assert!(matches!(result, Err(FleetError::Protocol { .. })));
    assert_eq!(counters.created(), 4);
    assert!(counters.balanced());
}

#[tokio::test]
async fn feedback_merges_into_store_and_forwards() {
    let factory = Arc::new(MockCommandFactory::new());
    factory.push_script(vec![
        GoalEvent::Accepted,
        GoalEvent::Feedback(DynamicEventFeedback {
            status: DynamicEventStatus::Underway,
            // Wide ids can arrive as strings; the merge normalizes them.
            id: Some(EventId::Text("33".to_string())),
        }),
        GoalEvent::Completed(GoalTerminalStatus::Succeeded),
    ]);
    let orchestrator = orchestrator_with(factory.clone());

    let (tx, mut rx) = tokio::sync::mpsc::channel(8);
    let completion = orchestrator
        .submit_goal(
            GoalSubmission::new_request("r1", "f1", "go_to_place", serde_json::json!({})),
            Some(tx),
        )
        .await
        .unwrap();

    assert_eq!(completion.dynamic_event_id, Some(33));

    let record = orchestrator.get_robot("r1", "f1").unwrap();
    assert_eq!(record.dynamic_event_id, Some(33));
    assert_eq!(
        record.dynamic_event_status,
        Some(DynamicEventStatus::Underway)
    );

    let forwarded = rx.recv().await.unwrap();
    assert_eq!(forwarded.status, DynamicEventStatus::Underway);
}

#[tokio::test]
async fn cancel_without_event_id_fails_before_any_client_exists() {
    let factory = Arc::new(MockCommandFactory::new());
    let orchestrator = orchestrator_with(factory.clone());
    let counters = factory.counters();

    let snapshot = RobotSnapshot {
        name: "r1".to_string(),
        fleet: "f1".to_string(),
        dynamic_event_seq: Some(4),
        dynamic_event_id: None,
    };
    let result = orchestrator
        .send_control(ControlKind::Cancel, &snapshot, None)
        .await;

    assert!(matches!(
        result,
        Err(FleetError::Validation { field, .. }) if field == "dynamic_event_id"
    ));
    assert_eq!(counters.created(), 0);
}

#[tokio::test]
async fn control_goals_require_identity_and_sequence() {
    let factory = Arc::new(MockCommandFactory::new());
    let orchestrator = orchestrator_with(factory.clone());

    let snapshot = RobotSnapshot {
        name: "r1".to_string(),
        fleet: "f1".to_string(),
        dynamic_event_seq: None,
        dynamic_event_id: Some(2),
    };
    let result = orchestrator
        .send_control(ControlKind::End, &snapshot, None)
        .await;
    assert!(matches!(
        result,
        Err(FleetError::Validation { field, .. }) if field == "dynamic_event_seq"
    ));
    assert_eq!(factory.counters().created(), 0);
}

#[tokio::test]
async fn cancel_goal_targets_the_open_event_and_clears_it() {
    let factory = Arc::new(MockCommandFactory::new());
    factory.push_script(MockCommandFactory::terminal_script(
        GoalTerminalStatus::Succeeded,
    ));
    let orchestrator = orchestrator_with(factory.clone());

    let record = orchestrator
        .context()
        .store
        .upsert(
            "r1",
            "f1",
            RobotUpdate {
                dynamic_event_seq: Some(4),
                dynamic_event_id: Some(11),
                dynamic_event_status: Some(DynamicEventStatus::Underway),
                ..Default::default()
            },
        )
        .await;

    orchestrator
        .send_control(ControlKind::Cancel, &RobotSnapshot::from(&record), None)
        .await
        .unwrap();

    let sent = factory.sent_goals();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.event_type, DynamicEventType::Cancel);
    assert_eq!(sent[0].1.id, Some(11));

    let record = orchestrator.get_robot("r1", "f1").unwrap();
    assert!(record.dynamic_event_id.is_none());
    assert!(record.dynamic_event_status.is_none());
    // The task sequence is not the event's; it survives the cancel.
    assert_eq!(record.dynamic_event_seq, Some(4));
}

#[tokio::test]
async fn abort_counts_as_settled_only_after_our_cancel() {
    let factory = Arc::new(MockCommandFactory::new());
    let orchestrator = orchestrator_with(factory.clone());

    let record = orchestrator
        .context()
        .store
        .upsert(
            "r1",
            "f1",
            RobotUpdate {
                dynamic_event_seq: Some(1),
                dynamic_event_id: Some(7),
                dynamic_event_status: Some(DynamicEventStatus::Underway),
                ..Default::default()
            },
        )
        .await;

    // Our cancel goes out first...
    factory.push_script(MockCommandFactory::terminal_script(
        GoalTerminalStatus::Succeeded,
    ));
    orchestrator
        .send_control(ControlKind::Cancel, &RobotSnapshot::from(&record), None)
        .await
        .unwrap();

    // ...so the victim goal's abort is an expected termination.
    factory.push_script(MockCommandFactory::terminal_script(
        GoalTerminalStatus::Aborted,
    ));
    let completion = orchestrator
        .submit_goal(
            GoalSubmission::new_request("r1", "f1", "go_to_place", serde_json::json!({})),
            None,
        )
        .await
        .unwrap();
    assert_eq!(completion.status, GoalTerminalStatus::Aborted);

    // With no cancel pending, an abort is a genuine failure.
    factory.push_script(MockCommandFactory::terminal_script(
        GoalTerminalStatus::Aborted,
    ));
    let result = orchestrator
        .submit_goal(
            GoalSubmission::new_request("r1", "f1", "go_to_place", serde_json::json!({})),
            None,
        )
        .await;
    assert!(matches!(result, Err(FleetError::GoalAborted { .. })));
}

#[tokio::test]
async fn concurrent_end_goals_collapse_to_one_submission() {
    let factory = Arc::new(MockCommandFactory::new());
    factory.set_goal_delay(Duration::from_millis(50));
    let orchestrator = orchestrator_with(factory.clone());

    let record = orchestrator
        .context()
        .store
        .upsert("r1", "f1", RobotUpdate::default().with_event_seq(3))
        .await;
    let snapshot = RobotSnapshot::from(&record);

    let (first, second) = tokio::join!(
        orchestrator.send_control(ControlKind::End, &snapshot, None),
        orchestrator.send_control(ControlKind::End, &snapshot, None),
    );

    let outcomes = [first, second];
    let successes = outcomes.iter().filter(|r| r.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|r| matches!(r, Err(FleetError::EndEventInFlight { .. })))
        .count();

    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);
    // Exactly one end goal reached the command channel.
    assert_eq!(factory.sent_goals().len(), 1);
    assert_eq!(
        factory.sent_goals()[0].1.event_type,
        DynamicEventType::End
    );

    // The guard released; a later end may proceed.
    assert!(!orchestrator.context().end_guard.is_held("f1", "r1"));
}
