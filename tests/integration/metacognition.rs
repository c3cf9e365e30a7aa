//! Runaway-loop detection across sessions.

use std::time::Duration;

use crate::fixtures::{drive, init_tracing, proposed, ScriptedInvoker};
use sage::{Engine, MetacognitiveState, SessionId};

#[test]
fn repeated_action_aborts_only_the_noisy_session() {
    init_tracing();
    let mut engine = Engine::new();
    let looping = SessionId::new();
    let healthy = SessionId::new();

    for _ in 0..3 {
        engine.record_action(looping, "search", Duration::from_secs(2));
    }
    engine.record_action(healthy, "search", Duration::from_secs(2));
    engine.record_action(healthy, "read", Duration::from_secs(2));
    engine.record_action(healthy, "write", Duration::from_secs(2));

    assert!(engine.metacog(looping).is_stuck());
    assert!(engine.should_abort(looping));
    assert!(!engine.should_abort(healthy));
}

#[test]
fn confidence_streak_builds_toward_abort() {
    let mut engine = Engine::new();
    let session = SessionId::new();

    for score in [0.8, 0.3, 0.2, 0.1] {
        engine.record_confidence(session, score);
    }

    let state = engine.metacog(session);
    assert_eq!(state.low_confidence_streak(), 3);
    assert!(state.is_declining());
    // Three is a warning sign, not yet a forced abort.
    assert!(!engine.should_abort(session));

    engine.record_confidence(session, 0.2);
    assert!(engine.should_abort(session));
}

#[test]
fn soft_time_limit_warns_before_the_hard_one_aborts() {
    let mut engine = Engine::new();
    let session = SessionId::new();

    engine.record_action(session, "deep_analysis", Duration::from_secs(150));
    let state = engine.metacog(session);
    assert!(state.is_taking_too_long());
    assert!(!state.should_abort());

    engine.record_action(session, "more_analysis", Duration::from_secs(200));
    assert!(engine.should_abort(session));
}

#[test]
fn orchestrator_loop_feeds_metacognition_per_iteration() {
    init_tracing();
    let mut engine = Engine::new();
    let session = SessionId::new();

    engine
        .seed_plan(
            session,
            "three independent chores",
            vec![
                proposed("a", "first chore", &[], 3),
                proposed("b", "second chore", &[], 2),
                proposed("c", "third chore", &[], 1),
            ],
        )
        .unwrap();

    let invoker = ScriptedInvoker::new();
    let plan = engine.plan_mut(session).unwrap();
    let dispatched = drive(plan, &invoker);

    // One action record per dispatch, the way the orchestrator loops.
    for id in &dispatched {
        engine.record_action(session, &format!("execute:{}", id), Duration::from_secs(1));
        engine.record_confidence(session, 0.9);
    }

    let state = engine.metacog(session);
    assert_eq!(state.iterations_used, 3);
    assert_eq!(state.thinking_time_seconds, 3.0);
    assert!(!state.should_abort());
    assert!(state.avg_confidence() > 0.8);
}

#[test]
fn reset_clears_a_wedged_session() {
    let mut engine = Engine::new();
    let session = SessionId::new();

    for _ in 0..20 {
        engine.record_action(session, "retry_login", Duration::from_secs(1));
    }
    assert!(engine.should_abort(session));

    engine.reset_metacog(session);
    assert!(!engine.should_abort(session));
    assert_eq!(engine.metacog(session).iterations_used, 0);
}

#[test]
fn state_survives_a_snapshot_round_trip() {
    let mut state = MetacognitiveState::new();
    for i in 0..55 {
        state.record_action(&format!("step_{}", i), Duration::from_millis(500));
    }
    state.record_confidence(0.3);
    state.record_quality(0.7);

    let json = serde_json::to_string(&state.snapshot()).unwrap();
    let restored = MetacognitiveState::from_snapshot(serde_json::from_str(&json).unwrap());

    // The ring keeps only the newest 50 labels, but the counters keep
    // the full history.
    assert_eq!(restored.repeated_actions.len(), 50);
    assert_eq!(restored.iterations_used, 55);
    assert_eq!(restored.repeated_actions.back().unwrap(), "step_54");
    assert_eq!(restored.low_confidence_streak(), 1);
    assert_eq!(restored.quality_scores, vec![0.7]);
}
