use super::*;
use crate::utils::console::MemorySink;
use std::time::{Duration, Instant};

fn sh(script: &str) -> ArgumentVector {
    ArgumentVector::from(vec!["sh", "-c", script])
}

fn poll_until<F: FnMut() -> bool>(timeout: Duration, mut f: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    f()
}

fn is_alive(sys: &mut System, pid: Pid) -> bool {
    sys.refresh_processes(ProcessesToUpdate::All, true);
    match sys.process(pid) {
        Some(p) => p.status() != ProcessStatus::Zombie,
        None => false,
    }
}

#[cfg(unix)]
#[test]
fn test_output_is_forwarded_in_order() {
    let sink = Arc::new(MemorySink::default());
    let h = ProcessHandle::new("run");
    assert_eq!(h.state(), ProcessState::Idle);
    h.start(
        sh("for i in 1 2 3 4 5; do echo line$i; done; printf 'no newline'"),
        sink.clone(),
    )
    .unwrap();
    assert_eq!(h.wait().unwrap(), ExitOutcome::Succeeded);
    assert_eq!(h.state(), ProcessState::Finished);
    assert_eq!(
        sink.contents(),
        "line1\nline2\nline3\nline4\nline5\nno newline"
    );
}

#[cfg(unix)]
#[test]
fn test_stderr_is_merged() {
    let sink = Arc::new(MemorySink::default());
    let h = ProcessHandle::new("run");
    h.start(
        sh("i=0; while [ $i -lt 300 ]; do echo out$i; echo err$i 1>&2; i=$((i+1)); done"),
        sink.clone(),
    )
    .unwrap();
    assert_eq!(h.wait().unwrap(), ExitOutcome::Succeeded);
    let expected: String = (0..300).map(|i| format!("out{i}\nerr{i}\n")).collect();
    assert_eq!(sink.contents(), expected);
}

#[cfg(unix)]
#[test]
fn test_nonzero_exit_is_surfaced() {
    let sink = Arc::new(MemorySink::default());
    let h = ProcessHandle::new("run");
    let argv = sh("echo working; exit 3");
    h.start(argv.clone(), sink.clone()).unwrap();
    match h.wait() {
        Err(PilotError::ExternalToolFailed { code, argv: a }) => {
            assert_eq!(code, Some(3));
            assert_eq!(a, argv);
        }
        r => panic!("expected ExternalToolFailed, got {:?}", r),
    }
    assert!(sink.contents().contains("exited with exit status 3"));
    // a failed run does not block the next one
    h.start(sh("true"), sink.clone()).unwrap();
    assert_eq!(h.wait().unwrap(), ExitOutcome::Succeeded);
}

#[cfg(unix)]
#[test]
fn test_second_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("starts.txt");
    let script = format!("echo started >> '{}'; sleep 2", marker.display());
    let sink = Arc::new(MemorySink::default());

    let h = ProcessHandle::new("run");
    h.start(sh(&script), sink.clone()).unwrap();
    match h.start(sh(&script), sink.clone()) {
        Err(PilotError::AlreadyRunning(name)) => assert_eq!(name, "run"),
        r => panic!("expected AlreadyRunning, got {:?}", r),
    }
    assert_eq!(h.wait().unwrap(), ExitOutcome::Succeeded);

    let starts = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(starts.lines().count(), 1);
}

#[cfg(unix)]
#[test]
fn test_concurrent_starts_spawn_one_child() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("starts.txt");
    let script = format!("echo started >> '{}'; sleep 1", marker.display());
    let h = Arc::new(ProcessHandle::new("run"));
    let barrier = Arc::new(std::sync::Barrier::new(8));

    let threads: Vec<_> = (0..8)
        .map(|_| {
            let h = Arc::clone(&h);
            let b = Arc::clone(&barrier);
            let argv = sh(&script);
            std::thread::spawn(move || {
                let sink: Arc<dyn ConsoleSink> = Arc::new(MemorySink::default());
                b.wait();
                h.start(argv, sink).is_ok()
            })
        })
        .collect();
    let started = threads
        .into_iter()
        .map(|t| t.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(started, 1);
    h.wait().unwrap();
    let starts = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(starts.lines().count(), 1);
}

#[cfg(unix)]
#[test]
fn test_kill_terminates_descendants() {
    let sink = Arc::new(MemorySink::default());
    let h = ProcessHandle::new("run");
    h.start(sh("sleep 30 & sleep 30 & wait"), sink.clone())
        .unwrap();
    let root = Pid::from_u32(h.pid().expect("running process has a pid"));

    let mut sys = System::new();
    let mut tree = Vec::new();
    let found = poll_until(Duration::from_secs(5), || {
        sys.refresh_processes(ProcessesToUpdate::All, true);
        tree = descendants(&sys, root);
        tree.len() >= 2
    });
    assert!(found, "the two background sleeps never showed up");
    tree.push(root);

    h.kill().unwrap();
    assert_eq!(h.state(), ProcessState::Finished);

    let all_gone = poll_until(Duration::from_secs(5), || {
        tree.iter().all(|pid| !is_alive(&mut sys, *pid))
    });
    assert!(all_gone, "processes survived the kill: {:?}", tree);
    assert_eq!(h.wait().unwrap(), ExitOutcome::Killed);
    assert!(sink.contents().contains("The run process was killed."));
}

#[test]
fn test_kill_requires_running() {
    let h = ProcessHandle::new("download");
    match h.kill() {
        Err(PilotError::NotRunning(name)) => assert_eq!(name, "download"),
        r => panic!("expected NotRunning, got {:?}", r),
    }
    assert!(matches!(h.wait(), Err(PilotError::NotRunning(_))));
}

#[test]
fn test_spawn_failure_leaves_handle_reusable() {
    let sink = Arc::new(MemorySink::default());
    let h = ProcessHandle::new("run");
    let argv = ArgumentVector::from(vec!["/definitely/not/bcbio_nextgen.py", "-v"]);
    match h.start(argv, sink.clone()) {
        Err(PilotError::Spawn { program, .. }) => {
            assert_eq!(program, "/definitely/not/bcbio_nextgen.py")
        }
        r => panic!("expected a spawn failure, got {:?}", r),
    }
    assert_eq!(h.state(), ProcessState::Finished);
    assert!(!h.is_active());
}

#[cfg(unix)]
#[test]
fn test_independent_handles_do_not_block_each_other() {
    let run_sink = Arc::new(MemorySink::default());
    let dl_sink = Arc::new(MemorySink::default());
    let run = ProcessHandle::new("run");
    let download = ProcessHandle::new("download");

    run.start(sh("sleep 1; echo run-done"), run_sink.clone())
        .unwrap();
    download
        .start(sh("echo download-done"), dl_sink.clone())
        .unwrap();
    assert_eq!(download.wait().unwrap(), ExitOutcome::Succeeded);
    assert!(run.is_active());
    assert_eq!(run.wait().unwrap(), ExitOutcome::Succeeded);

    // each handle's output goes to its own sink only
    assert_eq!(run_sink.contents(), "run-done\n");
    assert_eq!(dl_sink.contents(), "download-done\n");
}
