//! Orchestrator behavior: supersession, debouncing, graceful failure.

mod common;

use std::sync::Arc;
use std::time::Duration;

use asmlens::engine::NO_ASSEMBLY_PLACEHOLDER;
use common::fixtures::MCA_REPORT;
use common::harness::{failed_output, ok_output, EngineHarness, MockToolchain, ScriptedCompile};

const FAST_DEBOUNCE: Duration = Duration::from_millis(20);

#[tokio::test]
async fn initial_run_publishes_a_snapshot() {
    let toolchain = Arc::new(
        MockToolchain::new(ok_output("main:\n\tadd edi, esi\n\timul edi, esi\n\tret\n"))
            .with_report(MCA_REPORT),
    );
    let mut harness = EngineHarness::spawn(toolchain, FAST_DEBOUNCE);

    let snapshot = harness.next_snapshot().await;
    assert!(snapshot.success);
    assert_eq!(snapshot.sequence, 1);
    assert!(snapshot.assembly.contains("main:"));
    assert!(!snapshot.cycles.is_empty(), "report rows must become cycles");
}

#[tokio::test]
async fn late_run_is_superseded_by_newer_result() {
    // Run #1 (the initial compile) is slow; run #2 finishes first. The
    // published state must be run #2 and must never be overwritten by the
    // late completion of run #1.
    let toolchain = Arc::new(
        MockToolchain::new(ok_output("main:\n\tret\n")).with_scripted(vec![
            ScriptedCompile {
                delay: Duration::from_millis(400),
                output: ok_output("main:\n\tnop\n"),
            },
            ScriptedCompile {
                delay: Duration::from_millis(10),
                output: ok_output("main:\n\tret\n"),
            },
        ]),
    );
    let mut harness = EngineHarness::spawn(toolchain, FAST_DEBOUNCE);

    // Give run #1 time to start compiling, then trigger run #2.
    tokio::time::sleep(Duration::from_millis(100)).await;
    harness.engine.refresh().await;

    let published = harness.next_snapshot().await;
    assert_eq!(published.sequence, 2, "newest run wins");

    let late = tokio::time::timeout(Duration::from_millis(600), harness.snapshots.recv()).await;
    assert!(late.is_err(), "run #1 must be silently discarded");
}

#[tokio::test]
async fn compiler_failure_degrades_to_a_failure_snapshot() {
    let toolchain = Arc::new(MockToolchain::new(failed_output(
        "main.cpp:3:5: error: expected ';' after return statement",
    )));
    let mut harness = EngineHarness::spawn(toolchain, FAST_DEBOUNCE);

    let snapshot = harness.next_snapshot().await;
    assert!(!snapshot.success);
    assert!(snapshot.diagnostics.contains("expected ';'"));
    assert_eq!(snapshot.assembly, NO_ASSEMBLY_PLACEHOLDER);
}

#[tokio::test]
async fn failure_retains_the_last_good_assembly() {
    let toolchain = Arc::new(
        MockToolchain::new(failed_output("main.cpp:1:1: error: unknown type")).with_scripted(
            vec![ScriptedCompile {
                delay: Duration::ZERO,
                output: ok_output("main:\n\tret\n"),
            }],
        ),
    );
    let mut harness = EngineHarness::spawn(toolchain, FAST_DEBOUNCE);

    let good = harness.next_snapshot().await;
    assert!(good.success);

    harness.engine.refresh().await;
    let failed = harness.next_snapshot().await;
    assert!(!failed.success);
    assert!(
        failed.assembly.contains("\tret"),
        "failure keeps the last good view"
    );
    assert!(failed.diagnostics.contains("unknown type"));
}

#[tokio::test]
async fn save_bursts_coalesce_into_one_run() {
    let toolchain = Arc::new(MockToolchain::new(ok_output("main:\n\tret\n")));
    let mut harness = EngineHarness::spawn(toolchain.clone(), Duration::from_millis(80));

    let initial = harness.next_snapshot().await;
    assert_eq!(initial.sequence, 1);

    // One editor save often surfaces as several OS-level events.
    for _ in 0..5 {
        harness.touch().await;
    }

    let coalesced = harness.next_snapshot().await;
    assert_eq!(coalesced.sequence, 2, "burst must start exactly one run");
    assert_eq!(toolchain.compile_calls(), 2);

    let extra = tokio::time::timeout(Duration::from_millis(300), harness.snapshots.recv()).await;
    assert!(extra.is_err(), "no trailing runs after the burst");
}

#[tokio::test]
async fn unreadable_source_reports_watch_failure() {
    let toolchain = Arc::new(MockToolchain::new(ok_output("main:\n\tret\n")));
    let mut harness = EngineHarness::spawn(toolchain, FAST_DEBOUNCE);
    std::fs::remove_file(&harness.source).expect("remove source");

    let snapshot = harness.next_snapshot().await;
    assert!(!snapshot.success);
    assert!(snapshot.diagnostics.contains("cannot read"));

    // The loop keeps serving triggers afterwards.
    std::fs::write(&harness.source, "int main() { return 0; }\n").expect("restore");
    harness.engine.refresh().await;
    let recovered = harness.next_snapshot().await;
    assert!(recovered.success);
}
