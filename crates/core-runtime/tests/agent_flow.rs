//! End-to-end conversations with a scripted editor.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use core_actions::Action;
use core_runtime::{reduce_fn, BuiltinCmd, CmdCtx, Ctx, IssueKey, StoreIssues};

use common::{client_actions, Harness};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hello_round_trip() {
    let harness = Harness::spawn(|_store| {});

    harness.send(json!({"Cookie": "c1", "Action": {"Name": "Started"}}));
    let resp = harness.response_for("c1").await;

    assert_eq!(resp["Error"], "");
    assert_eq!(resp["State"]["Status"], json!([]));
    assert_eq!(resp["State"]["Errors"], json!([]));
    assert_eq!(resp["State"]["Completions"], json!([]));

    assert!(
        harness.stderr.text().starts_with("ready\n"),
        "handshake line first: {:?}",
        harness.stderr.text()
    );
    harness.finish().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn responses_keep_request_order_and_cookies() {
    let harness = Harness::spawn(|_store| {});
    for i in 0..5 {
        harness.send(json!({"Cookie": format!("c{i}"), "Action": {"Name": "ViewActivated"}}));
    }
    harness
        .wait_for("five replies", |rs| {
            let cookies: Vec<&str> = rs
                .iter()
                .filter_map(|r| r["Cookie"].as_str())
                .filter(|c| !c.is_empty())
                .collect();
            (cookies.len() == 5).then(|| {
                assert_eq!(cookies, vec!["c0", "c1", "c2", "c3", "c4"]);
            })
        })
        .await;
    harness.finish().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_action_is_a_soft_error() {
    let harness = Harness::spawn(|store| {
        store.using(reduce_fn("tattle", |mx: &Ctx| {
            if matches!(mx.action, Action::ViewActivated) {
                mx.state.add_status(["pipeline ran"])
            } else {
                mx.state.clone()
            }
        }));
    });
    harness.send(json!({"Cookie": "bad", "Action": {"Name": "MakeCoffee"}}));
    let resp = harness.response_for("bad").await;
    assert_eq!(resp["Error"], "unknown client action: MakeCoffee");
    assert_eq!(
        resp["State"]["Status"],
        json!([]),
        "pipeline did not run for the rejected action"
    );

    // The agent is still serving, and known actions still reduce.
    harness.send(json!({"Cookie": "ok", "Action": {"Name": "ViewActivated"}}));
    let resp = harness.response_for("ok").await;
    assert_eq!(resp["Error"], "");
    assert_eq!(resp["State"]["Status"], json!(["pipeline ran"]));
    harness.finish().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn echo_command_streams_output_then_closes() {
    let harness = Harness::spawn(|store| {
        store.before(reduce_fn("echo.table", |mx: &Ctx| match &mx.action {
            Action::RunCmd(_) => mx.state.add_builtin_cmds([BuiltinCmd::new(
                ".echo",
                "write args back",
                Arc::new(|cx: &mut CmdCtx| {
                    let line = format!("{}\n", cx.args.join(" "));
                    cx.output.write(line.as_bytes());
                }),
            )]),
            _ => mx.state.clone(),
        }));
    });

    harness.send(json!({
        "Cookie": "c2",
        "Action": {"Name": "RunCmd", "Data": {"Name": ".echo", "Args": ["hi"], "Fd": "f1"}}
    }));
    harness.response_for("c2").await;

    harness
        .wait_for("echo output and close", |rs| {
            let outs = client_actions(rs, "CmdOutput");
            let chunk = outs
                .iter()
                .find(|a| a["Data"]["Fd"] == "f1" && a["Data"]["Output"] == "hi\n")?;
            assert_eq!(chunk["Data"]["Close"], json!(false));
            outs.iter()
                .find(|a| a["Data"]["Fd"] == "f1" && a["Data"]["Close"] == json!(true))
                .map(|_| ())
        })
        .await;
    harness.finish().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kill_cancels_a_running_command() {
    let harness = Harness::spawn(|store| {
        store.before(reduce_fn("wait.table", |mx: &Ctx| match &mx.action {
            Action::RunCmd(_) => mx.state.add_builtin_cmds([BuiltinCmd::new(
                ".wait",
                "spin until cancelled",
                Arc::new(|cx: &mut CmdCtx| {
                    while !cx.ctx.is_done() {
                        std::thread::sleep(Duration::from_millis(10));
                    }
                    cx.output.write(b"cancelled\n");
                }),
            )]),
            _ => mx.state.clone(),
        }));
    });

    harness.send(json!({
        "Cookie": "w",
        "Action": {"Name": "RunCmd", "Data": {"Name": ".wait", "Fd": "w1"}}
    }));
    harness.response_for("w").await;

    // The first ticket in this session belongs to `.wait`.
    harness.send(json!({
        "Cookie": "k",
        "Action": {"Name": "RunCmd", "Data": {"Name": ".kill", "Args": ["@1"], "Fd": "k1"}}
    }));
    harness.response_for("k").await;

    harness
        .wait_for("kill report and cancelled command", |rs| {
            let outs = client_actions(rs, "CmdOutput");
            outs.iter()
                .find(|a| a["Data"]["Fd"] == "k1" && a["Data"]["Output"] == "@1: true\n")?;
            outs.iter()
                .find(|a| a["Data"]["Fd"] == "w1" && a["Data"]["Output"] == "cancelled\n")?;
            outs.iter()
                .find(|a| a["Data"]["Fd"] == "w1" && a["Data"]["Close"] == json!(true))
                .map(|_| ())
        })
        .await;
    harness.finish().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cached_issues_survive_unrelated_dispatches() {
    let harness = Harness::spawn(|store| {
        store.using(reduce_fn("linter", |mx: &Ctx| {
            if matches!(mx.action, Action::ViewSaved) {
                let set = (0..3)
                    .map(|i| core_runtime::Issue {
                        path: "/w/lib.rs".to_string(),
                        row: i,
                        message: format!("issue {i}"),
                        label: "linter".to_string(),
                        ..core_runtime::Issue::default()
                    })
                    .collect();
                mx.dispatch(
                    StoreIssues {
                        key: IssueKey::new("linter", "/w/lib.rs"),
                        issues: set,
                    }
                    .into_action(),
                );
            }
            mx.state.clone()
        }));
    });

    harness.send(json!({
        "Cookie": "save",
        "Action": {"Name": "ViewSaved"},
        "Props": {"View": {"Name": "lib.rs", "Path": "/w/lib.rs"}}
    }));
    harness.response_for("save").await;

    for (i, action) in ["ViewActivated", "ViewPosChanged", "ViewModified"]
        .iter()
        .enumerate()
    {
        let cookie = format!("after{i}");
        harness.send(json!({"Cookie": cookie, "Action": {"Name": action}}));
        let resp = harness.response_for(&cookie).await;
        let got = resp["State"]["Issues"]
            .as_array()
            .expect("issues array")
            .len();
        assert_eq!(got, 3, "reduction for {action}: {resp:#?}");
    }
    harness.finish().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_reducer_leaves_neighbours_and_response_intact() {
    let seen = Arc::new(AtomicUsize::new(0));
    let s1 = Arc::clone(&seen);
    let s3 = Arc::clone(&seen);
    let harness = Harness::spawn(move |store| {
        store.using(reduce_fn("r1", move |mx: &Ctx| {
            s1.fetch_add(1, Ordering::SeqCst);
            mx.state.clone()
        }));
        store.using(reduce_fn("r2", |_mx: &Ctx| -> core_runtime::State {
            panic!("boom")
        }));
        store.using(reduce_fn("r3", move |mx: &Ctx| {
            s3.fetch_add(1, Ordering::SeqCst);
            mx.state.add_status(["r3 alive"])
        }));
    });

    harness.send(json!({"Cookie": "p", "Action": {"Name": "ViewActivated"}}));
    let resp = harness.response_for("p").await;
    assert_eq!(resp["Error"], "");
    assert_eq!(resp["State"]["Status"], json!(["r3 alive"]));
    assert!(
        seen.load(Ordering::SeqCst) >= 2,
        "r1 and r3 both observed the action"
    );
    harness.finish().await.expect("clean shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_request_unmounts_and_exits() {
    let unmounts = Arc::new(AtomicUsize::new(0));
    let u = Arc::clone(&unmounts);
    let harness = Harness::spawn(move |store| {
        store.using(reduce_fn("watch", move |mx: &Ctx| {
            if matches!(mx.action, Action::Unmount) {
                u.fetch_add(1, Ordering::SeqCst);
            }
            mx.state.clone()
        }));
    });

    harness.send(json!({"Cookie": "bye", "Action": {"Name": "Shutdown"}}));
    let resp = harness.response_for("bye").await;
    let shutdowns: Vec<_> = resp["State"]["ClientActions"]
        .as_array()
        .expect("client actions")
        .iter()
        .filter(|a| a["Name"] == "Shutdown")
        .collect();
    assert_eq!(shutdowns.len(), 1);

    harness.finish().await.expect("clean exit after shutdown");
    assert_eq!(unmounts.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fmt_reducer_sends_the_view_back() {
    let harness = Harness::spawn(|store| {
        store.using(reduce_fn("fmt", |mx: &Ctx| {
            if matches!(mx.action, Action::ViewFmt) {
                let src = mx.read_view().map(|s| (*s).clone()).unwrap_or_default();
                let fmtd = String::from_utf8_lossy(&src).trim_end().to_string() + "\n";
                mx.state.set_src(fmtd.into_bytes())
            } else {
                mx.state.clone()
            }
        }));
    });

    harness.send(json!({
        "Cookie": "fmt",
        "Action": {"Name": "ViewFmt"},
        "Props": {"View": {"Name": "a.rs", "Dirty": true, "Src": "fn a() {}\n\n\n"}}
    }));
    let resp = harness.response_for("fmt").await;
    assert_eq!(resp["State"]["View"]["Src"], "fn a() {}\n");

    // A request that does not touch the source omits the view again.
    harness.send(json!({
        "Cookie": "later",
        "Action": {"Name": "ViewPosChanged"},
        "Props": {"View": {"Name": "a.rs", "Dirty": true, "Src": "fn a() {}\n"}}
    }));
    let resp = harness.response_for("later").await;
    assert!(resp["State"].get("View").is_none(), "{resp:#?}");
    harness.finish().await.expect("clean shutdown");
}
