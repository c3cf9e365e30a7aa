//! Terminal failure -> planner correction -> resumed execution.

use crate::fixtures::{
    drive, init_tracing, proposed, proposed_with_tool, ScriptedInvoker, StubOracle,
};
use sage::oracle::{PlanCorrection, PlannerOracle, ToolOutcome, ToolSpec};
use sage::{Engine, NodeStatus, SessionId};

fn catalog() -> Vec<ToolSpec> {
    vec![
        ToolSpec::new("api_fetch", "fetch records from the partner api"),
        ToolSpec::new("csv_export", "ask the partner for a csv export"),
    ]
}

#[test]
fn failed_branch_is_replanned_and_finishes() {
    init_tracing();
    let mut engine = Engine::new();
    let session = SessionId::new();

    let oracle = StubOracle::new(vec![
        proposed_with_tool("fetch", "fetch partner records", &[], 5, "api_fetch"),
        proposed("merge", "merge into our table", &["fetch"], 3),
        proposed("notify", "notify the owner", &["merge"], 0),
    ])
    .with_correction(PlanCorrection {
        remove_ids: vec!["fetch".to_string()],
        new_nodes: vec![proposed_with_tool(
            "fetch_csv",
            "fall back to the csv export",
            &[],
            8,
            "csv_export",
        )],
    });

    let proposals = oracle.propose("sync partner records", &catalog()).unwrap();
    engine
        .seed_plan(session, "sync partner records", proposals)
        .unwrap();

    // The api is down for good; both attempts burn out.
    let invoker = ScriptedInvoker::new();
    invoker.script(
        "api_fetch",
        vec![
            ToolOutcome::failed("401 unauthorized"),
            ToolOutcome::failed("401 unauthorized"),
        ],
    );

    let plan = engine.plan_mut(session).unwrap();
    drive(plan, &invoker);

    assert!(plan.has_failures());
    assert_eq!(plan.get_node("fetch").unwrap().status, NodeStatus::Failed);
    assert_eq!(plan.get_node("merge").unwrap().status, NodeStatus::Skipped);
    assert_eq!(plan.get_node("notify").unwrap().status, NodeStatus::Skipped);

    // One correction round per terminal failure.
    let correction = oracle
        .correct(
            "sync partner records",
            "fetch",
            "401 unauthorized",
            &engine.plan(session).unwrap().snapshot(),
        )
        .unwrap();
    engine.apply_correction(session, correction).unwrap();

    let plan = engine.plan_mut(session).unwrap();
    assert_eq!(plan.revision_count(), 1);
    assert!(!plan.contains_node("fetch"));

    // The skipped branch stays skipped; only the replacement runs.
    let dispatched = drive(plan, &invoker);
    assert_eq!(dispatched, vec!["fetch_csv"]);
    assert_eq!(
        plan.get_node("fetch_csv").unwrap().status,
        NodeStatus::Completed
    );
    assert!(plan.is_complete());
    assert_eq!(
        oracle.corrections_requested.borrow().as_slice(),
        ["fetch".to_string()]
    );
}

#[test]
fn correction_can_revive_a_skipped_branch() {
    init_tracing();
    let mut engine = Engine::new();
    let session = SessionId::new();

    engine
        .seed_plan(
            session,
            "publish the digest",
            vec![
                proposed_with_tool("collect", "collect the articles", &[], 5, "feed_pull"),
                proposed("digest", "write the digest", &["collect"], 0),
            ],
        )
        .unwrap();

    let invoker = ScriptedInvoker::new();
    invoker.script(
        "feed_pull",
        vec![
            ToolOutcome::failed("feed moved"),
            ToolOutcome::failed("feed moved"),
        ],
    );

    let plan = engine.plan_mut(session).unwrap();
    drive(plan, &invoker);
    assert_eq!(plan.get_node("digest").unwrap().status, NodeStatus::Skipped);

    // Replace both the dead fetch and the skipped dependent.
    engine
        .apply_correction(
            session,
            PlanCorrection {
                remove_ids: vec!["collect".to_string(), "digest".to_string()],
                new_nodes: vec![
                    proposed_with_tool("collect2", "pull from the new feed url", &[], 5, "feed_pull"),
                    proposed("digest2", "write the digest", &["collect2"], 0),
                ],
            },
        )
        .unwrap();

    let plan = engine.plan_mut(session).unwrap();
    let dispatched = drive(plan, &invoker);

    assert_eq!(dispatched, vec!["collect2", "digest2"]);
    assert!(plan.is_complete());
    assert!(!plan.has_failures());
    assert_eq!(plan.revision_count(), 1);
}

#[test]
fn snapshot_carries_enough_for_the_oracle() {
    let mut engine = Engine::new();
    let session = SessionId::new();
    engine
        .seed_plan(
            session,
            "snapshot check",
            vec![
                proposed("a", "first", &[], 5),
                proposed("b", "second", &["a"], 0),
            ],
        )
        .unwrap();

    let plan = engine.plan_mut(session).unwrap();
    plan.mark_running("a");
    plan.complete_node("a", "done");

    let snapshot = plan.snapshot();
    assert_eq!(snapshot.goal, "snapshot check");
    assert_eq!(snapshot.nodes.len(), 2);
    assert_eq!(snapshot.nodes[0].status, NodeStatus::Completed);
    assert_eq!(snapshot.nodes[1].depends_on, vec!["a"]);

    // The serialized form a real oracle prompt would embed.
    let json = serde_json::to_string(&snapshot).unwrap();
    assert!(json.contains("\"goal\":\"snapshot check\""));
    assert!(json.contains("\"completed\""));
}
