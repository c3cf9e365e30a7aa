//! Driving a plan to completion through the orchestrator loop.

use crate::fixtures::{drive, init_tracing, proposed, proposed_with_tool, ScriptedInvoker};
use sage::oracle::ToolOutcome;
use sage::{Engine, NodeSpec, NodeStatus, SessionId};

#[test]
fn diamond_plan_runs_in_dependency_order() {
    init_tracing();
    let mut engine = Engine::new();
    let session = SessionId::new();

    engine
        .seed_plan(
            session,
            "compare two vendors",
            vec![
                proposed("gather", "gather both price lists", &[], 5),
                proposed("vendor_a", "analyze vendor a", &["gather"], 3),
                proposed("vendor_b", "analyze vendor b", &["gather"], 7),
                proposed("compare", "write the comparison", &["vendor_a", "vendor_b"], 0),
            ],
        )
        .unwrap();

    let invoker = ScriptedInvoker::new();
    let plan = engine.plan_mut(session).unwrap();
    let dispatched = drive(plan, &invoker);

    // gather first, then the middle wave by priority, then the join.
    assert_eq!(dispatched, vec!["gather", "vendor_b", "vendor_a", "compare"]);
    assert!(plan.is_complete());
    assert_eq!(plan.progress(), 1.0);
    assert!(!plan.has_failures());
}

#[test]
fn transient_failure_is_retried_and_recovers() {
    init_tracing();
    let mut engine = Engine::new();
    let session = SessionId::new();

    engine
        .seed_plan(
            session,
            "fetch and summarize",
            vec![
                proposed_with_tool("fetch", "fetch the page", &[], 5, "http_get"),
                proposed("summarize", "summarize it", &["fetch"], 0),
            ],
        )
        .unwrap();

    let invoker = ScriptedInvoker::new();
    invoker.script(
        "http_get",
        vec![ToolOutcome::failed("503 from upstream"), ToolOutcome::ok("<html>")],
    );

    let plan = engine.plan_mut(session).unwrap();
    drive(plan, &invoker);

    let fetch = plan.get_node("fetch").unwrap();
    assert_eq!(fetch.status, NodeStatus::Completed);
    assert_eq!(fetch.retry_count, 1);
    assert_eq!(invoker.invocation_count("http_get"), 2);
    assert!(plan.is_complete());
}

#[test]
fn exhausted_retries_cascade_to_dependents() {
    init_tracing();
    let mut engine = Engine::new();
    let session = SessionId::new();

    engine
        .seed_plan(
            session,
            "scrape and report",
            vec![
                proposed_with_tool("scrape", "scrape the site", &[], 5, "browser"),
                proposed("extract", "extract the table", &["scrape"], 3),
                proposed("report", "write the report", &["extract"], 0),
                proposed("housekeeping", "rotate the logs", &[], 1),
            ],
        )
        .unwrap();

    let invoker = ScriptedInvoker::new();
    // Default budget is two failures before the node goes terminal.
    invoker.script(
        "browser",
        vec![
            ToolOutcome::failed("robot check"),
            ToolOutcome::failed("robot check again"),
        ],
    );

    let plan = engine.plan_mut(session).unwrap();
    drive(plan, &invoker);

    assert_eq!(plan.get_node("scrape").unwrap().status, NodeStatus::Failed);
    assert_eq!(plan.get_node("extract").unwrap().status, NodeStatus::Skipped);
    assert_eq!(plan.get_node("report").unwrap().status, NodeStatus::Skipped);
    // The independent branch still ran.
    assert_eq!(
        plan.get_node("housekeeping").unwrap().status,
        NodeStatus::Completed
    );

    assert!(plan.is_complete());
    assert!(plan.has_failures());
    assert_eq!(plan.progress(), 1.0);
}

#[test]
fn ready_set_is_stable_between_dispatch_decisions() {
    let mut engine = Engine::new();
    let session = SessionId::new();
    engine
        .seed_plan(
            session,
            "stable readiness",
            vec![
                proposed("a", "first", &[], 2),
                proposed("b", "second", &[], 1),
            ],
        )
        .unwrap();

    let plan = engine.plan(session).unwrap();
    for _ in 0..3 {
        let ready: Vec<&str> = plan
            .get_ready_nodes()
            .iter()
            .map(|node| node.id.as_str())
            .collect();
        assert_eq!(ready, vec!["a", "b"]);
    }
}

#[test]
fn topological_sort_matches_execution_constraints() {
    let mut engine = Engine::new();
    let session = SessionId::new();
    engine
        .seed_plan(
            session,
            "ordering",
            vec![
                proposed("load", "load the dataset", &[], 1),
                proposed("clean", "clean the dataset", &["load"], 9),
                proposed("plot", "plot the results", &["clean"], 0),
                proposed("audit", "independent audit", &[], 5),
            ],
        )
        .unwrap();

    let plan = engine.plan(session).unwrap();
    let order = plan.topological_sort();
    let pos = |id: &str| order.iter().position(|n| n == id).unwrap();

    assert_eq!(order.len(), 4);
    assert!(pos("load") < pos("clean"));
    assert!(pos("clean") < pos("plot"));
    // audit (priority 5) beats load (priority 1) among the initial candidates.
    assert!(pos("audit") < pos("load"));

    // The static wave view agrees with the edge structure.
    let groups = plan.get_parallel_groups();
    assert_eq!(groups[0], vec!["audit".to_string(), "load".to_string()]);
    assert_eq!(groups[1], vec!["clean".to_string()]);
    assert_eq!(groups[2], vec!["plot".to_string()]);
}

#[test]
fn empty_plan_is_complete_and_sorts_to_nothing() {
    let mut engine = Engine::new();
    let session = SessionId::new();
    let plan = engine.create_plan(session, "nothing to do");

    assert!(plan.is_complete());
    assert_eq!(plan.progress(), 1.0);
    assert!(plan.topological_sort().is_empty());
    assert!(plan.get_parallel_groups().is_empty());
}

#[test]
fn late_added_node_joins_the_ready_pool() {
    let mut engine = Engine::new();
    let session = SessionId::new();
    let plan = engine.create_plan(session, "growing plan");
    plan.add_node(NodeSpec::new("a", "first")).unwrap();

    let invoker = ScriptedInvoker::new();
    drive(plan, &invoker);
    assert!(plan.is_complete());

    // A dependency on the already-completed node is immediately satisfied.
    plan.add_node(NodeSpec::new("b", "afterthought").depends_on(["a"]))
        .unwrap();
    let ready: Vec<&str> = plan
        .get_ready_nodes()
        .iter()
        .map(|node| node.id.as_str())
        .collect();
    assert_eq!(ready, vec!["b"]);
}
