//! End-to-end pipeline tests: shell-emitted git-shaped streams driven
//! through job → reader → model → ticker → sink, with fold and locate
//! operations interleaved against the live flush.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use livediff_stream::TickControl;
use livediff_view::{
    CommandSpec, MemorySink, PanelRegistry, PanelView, RawCommandView, Sink, SinkCall,
    TreeCommandView,
};

const TICK: Duration = Duration::from_millis(10);

type SharedSink = Arc<Mutex<MemorySink>>;

fn sh_spec(script: &str) -> CommandSpec {
    CommandSpec::new(
        "/bin/sh",
        vec!["-c".to_string(), script.to_string()],
    )
}

/// One `printf` per line; lines may contain literal tabs.
fn emit_script(lines: &[&str], delay: Option<&str>) -> String {
    let mut parts = Vec::new();
    for line in lines {
        parts.push(format!("printf '%s\\n' '{line}'"));
        if let Some(delay) = delay {
            parts.push(format!("sleep {delay}"));
        }
    }
    parts.join("; ")
}

async fn wait_until(what: &str, mut predicate: impl FnMut() -> bool) {
    for _ in 0..400 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for: {what}");
}

fn shared_sink() -> SharedSink {
    Arc::new(Mutex::new(MemorySink::new()))
}

/// Sink appends must cover disjoint, strictly increasing ranges: no row is
/// ever sent twice by the flush tick.
fn assert_appends_monotone(calls: &[SinkCall]) {
    let mut expected_at = 0usize;
    for call in calls {
        if let SinkCall::Append { at, count } = call {
            assert_eq!(
                *at, expected_at,
                "append ranges must be contiguous and disjoint: {calls:?}"
            );
            expected_at += count;
        }
    }
}

#[tokio::test]
async fn raw_view_streams_everything_once_and_caches() {
    let registry = Arc::new(PanelRegistry::new());
    let lines = ["alpha", "beta", "gamma", "delta"];
    let spec = sh_spec(&emit_script(&lines, Some("0.02"))).with_source("demo-source");
    let sink = shared_sink();

    let view = RawCommandView::open(&spec, Box::new(Arc::clone(&sink)), TICK, &registry);

    wait_until("cache population", || registry.cached("demo-source").is_some()).await;
    wait_until("final flush", || sink.lock().unwrap().len() == lines.len()).await;

    {
        let sink = sink.lock().unwrap();
        assert_eq!(sink.lines(), &lines);
        assert_appends_monotone(sink.calls());
    }
    assert_eq!(registry.cached("demo-source").unwrap(), &lines);
    assert!(!view.lock().unwrap().stream_failed());

    // The view has run its completion bookkeeping; further ticks stop.
    wait_until("view done", || {
        view.lock().unwrap().write_buffer_tick() == TickControl::Stop
    })
    .await;

    registry.cleanup_all().await;
    assert_eq!(registry.view_count(), 0);
}

#[tokio::test]
async fn raw_view_spawn_failure_is_flagged_and_empty() {
    let registry = Arc::new(PanelRegistry::new());
    let spec = CommandSpec::new("definitely-not-a-real-binary-1b2c3", vec![]);
    let sink = shared_sink();

    let view = RawCommandView::open(&spec, Box::new(Arc::clone(&sink)), TICK, &registry);

    wait_until("failure noticed", || view.lock().unwrap().stream_failed()).await;
    assert!(sink.lock().unwrap().lines().is_empty());
    // Empty-but-failed, not empty-and-successful: no cache entry appears.
    assert!(registry.cached("demo-source").is_none());
    registry.cleanup_all().await;
}

#[tokio::test]
async fn tree_view_builds_rows_and_appends_footer() {
    let registry = Arc::new(PanelRegistry::new());
    let stream = [
        ":100644 100644 0000000 1111111 A\tfoo/bar.txt",
        ":100644 100644 0000000 2222222 M\tfoo/baz.txt",
        ":100644 100644 3333333 0000000 D\tqux.txt",
        "1\t0\tfoo/bar.txt",
        "2\t2\tfoo/baz.txt",
        "0\t4\tqux.txt",
        " 3 files changed, 3 insertions(+), 6 deletions(-)",
    ];
    let spec = sh_spec(&emit_script(&stream, Some("0.02")));
    let sink = shared_sink();
    let pane_sink = Arc::clone(&sink);

    let view = TreeCommandView::open(
        &spec,
        Box::new(move |_parent: &str| Box::new(Arc::clone(&pane_sink)) as Box<dyn Sink>),
        100,
        TICK,
        &registry,
    );

    wait_until("footer flushed", || {
        sink.lock().unwrap().lines().last().map(String::as_str)
            == Some("3 files changed, 3 insertions(+), 6 deletions(-)")
    })
    .await;

    {
        let sink = sink.lock().unwrap();
        assert_eq!(
            sink.lines(),
            &[
                "foo/",
                "  A  bar.txt",
                "  M  baz.txt",
                "D  qux.txt",
                "3 files changed, 3 insertions(+), 6 deletions(-)",
            ]
        );
        assert_appends_monotone(sink.calls());
    }

    {
        let model = view.lock().unwrap().model();
        let model = model.lock().unwrap();
        let group = model.group(0).unwrap();
        assert_eq!(group.stat_for("foo/baz.txt"), Some("+2 -2"));
        assert_eq!(group.stat_for("qux.txt"), Some("+0 -4"));
    }

    registry.cleanup_all().await;
}

#[tokio::test]
async fn fold_operations_keep_sink_and_cursor_in_step() {
    let registry = Arc::new(PanelRegistry::new());
    let stream = [
        ":100644 100644 0000000 1111111 A\tfoo/bar.txt",
        ":100644 100644 0000000 2222222 M\tfoo/baz.txt",
        ":100644 100644 3333333 0000000 D\tqux.txt",
    ];
    let spec = sh_spec(&emit_script(&stream, None));
    let sink = shared_sink();
    let pane_sink = Arc::clone(&sink);

    let view = TreeCommandView::open(
        &spec,
        Box::new(move |_parent: &str| Box::new(Arc::clone(&pane_sink)) as Box<dyn Sink>),
        100,
        TICK,
        &registry,
    );

    wait_until("rows flushed", || sink.lock().unwrap().len() == 4).await;

    // Collapse foo/ removes its two file rows from the sink.
    let splice = view.lock().unwrap().expand_or_collapse_at(0, 0).unwrap();
    assert_eq!(splice.removed, 2);
    assert_eq!(
        sink.lock().unwrap().lines(),
        &["foo/", "D  qux.txt"]
    );

    // Expand restores exactly the pre-collapse rows (round-trip law).
    let splice = view.lock().unwrap().expand_or_collapse_at(0, 0).unwrap();
    assert_eq!(splice.inserted, 2);
    assert_eq!(
        sink.lock().unwrap().lines(),
        &["foo/", "  A  bar.txt", "  M  baz.txt", "D  qux.txt"]
    );

    // Fold ops on non-directories surface typed errors.
    assert!(view.lock().unwrap().expand_or_collapse_at(0, 1).is_err());
    assert!(view.lock().unwrap().expand_or_collapse_at(7, 0).is_err());

    registry.cleanup_all().await;
}

#[tokio::test]
async fn locate_opens_closed_ancestors_and_flags_unknown_paths() {
    let registry = Arc::new(PanelRegistry::new());
    let stream = [
        ":100644 100644 0000000 1111111 A\tsrc/core/deep/lib.rs",
        ":100644 100644 0000000 2222222 A\tsrc/core/deep/util.rs",
        ":100644 100644 0000000 3333333 M\tsrc/main.rs",
    ];
    let spec = sh_spec(&emit_script(&stream, None));
    let sink = shared_sink();
    let pane_sink = Arc::clone(&sink);

    // Threshold 0: every directory starts closed, files are hidden.
    let view = TreeCommandView::open(
        &spec,
        Box::new(move |_parent: &str| Box::new(Arc::clone(&pane_sink)) as Box<dyn Sink>),
        0,
        TICK,
        &registry,
    );

    wait_until("dir rows flushed", || sink.lock().unwrap().len() >= 3).await;

    let index = view
        .lock()
        .unwrap()
        .locate(0, "src/core/deep/util.rs")
        .unwrap();
    {
        let model = view.lock().unwrap().model();
        let model = model.lock().unwrap();
        assert_eq!(
            model.group(0).unwrap().rows()[index].path,
            "src/core/deep/util.rs"
        );
    }
    // The sink mirrors the expansion: the located row is rendered at the
    // same position the model reports.
    assert_eq!(
        sink.lock().unwrap().lines()[index],
        "    A  util.rs"
    );

    let missing = view.lock().unwrap().locate(0, "src/never/streamed.rs");
    assert!(matches!(
        missing,
        Err(livediff_core::ModelError::NotTracked(_))
    ));

    registry.cleanup_all().await;
}

#[tokio::test]
async fn kill_mid_stream_freezes_rows_and_keeps_flushed_content() {
    let registry = Arc::new(PanelRegistry::new());
    // Three quick records, then a long stall before more would arrive.
    let script = concat!(
        "printf '%s\\n' ':100644 100644 0000000 1111111 A\tfoo/bar.txt'; ",
        "printf '%s\\n' ':100644 100644 0000000 2222222 M\tfoo/baz.txt'; ",
        "printf '%s\\n' ':100644 100644 3333333 0000000 D\tqux.txt'; ",
        "sleep 30; ",
        "printf '%s\\n' ':100644 100644 0000000 4444444 A\tnever/seen.txt'"
    );
    let spec = sh_spec(script);
    let sink = shared_sink();
    let pane_sink = Arc::clone(&sink);

    let view = TreeCommandView::open(
        &spec,
        Box::new(move |_parent: &str| Box::new(Arc::clone(&pane_sink)) as Box<dyn Sink>),
        100,
        TICK,
        &registry,
    );

    wait_until("first rows flushed", || sink.lock().unwrap().len() >= 4).await;
    let before: Vec<String> = sink.lock().unwrap().lines().to_vec();

    let identity = view.lock().unwrap().buffer_identity().to_string();
    registry
        .get(&identity)
        .expect("view registered")
        .cleanup()
        .await;

    // No growth after teardown, and flushed rows are untouched.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let after: Vec<String> = sink.lock().unwrap().lines().to_vec();
    assert_eq!(before, after);
    assert!(!after.contains(&"  A  seen.txt".to_string()));

    registry.cleanup_all().await;
}

#[tokio::test]
async fn invalid_sink_stops_flushing() {
    let registry = Arc::new(PanelRegistry::new());
    let script = "while true; do printf 'line\\n'; sleep 0.02; done";
    let spec = sh_spec(script);
    let sink = shared_sink();

    let _view = RawCommandView::open(&spec, Box::new(Arc::clone(&sink)), TICK, &registry);

    wait_until("some flush", || sink.lock().unwrap().len() > 0).await;
    sink.lock().unwrap().invalidate();
    let frozen = sink.lock().unwrap().len();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(sink.lock().unwrap().len(), frozen);

    registry.cleanup_all().await;
}

#[tokio::test]
async fn registry_replaces_views_with_the_same_identity() {
    let registry = Arc::new(PanelRegistry::new());
    let spec = sh_spec("printf 'only\\n'");

    let first = RawCommandView::open(&spec, Box::new(shared_sink()), TICK, &registry);
    let second = RawCommandView::open(&spec, Box::new(shared_sink()), TICK, &registry);
    assert_eq!(registry.view_count(), 1);

    let registered = registry.get(&spec.buffer_identity()).unwrap();
    let PanelView::Raw(current) = registered else {
        panic!("expected a raw view");
    };
    assert!(Arc::ptr_eq(&current, &second));
    assert!(!Arc::ptr_eq(&current, &first));

    registry.cleanup_all().await;
    assert_eq!(registry.view_count(), 0);
}
