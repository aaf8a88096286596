//! Launching and supervising the external pipeline as a child process.

use crossbeam::channel::Receiver;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use strum::Display;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};
use tracing::{debug, info, warn};

use crate::utils::arg_builder::ArgumentVector;
use crate::utils::console::ConsoleSink;
use crate::utils::errors::PilotError;
use crate::utils::worker::Worker;

/// How many times the process tree is re-scanned for freshly forked
/// descendants while it is being frozen.
const MAX_FREEZE_ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ProcessState {
    Idle,
    Starting,
    Running,
    Killed,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Succeeded,
    Killed,
}

/// What the monitor observed when the child went away.
#[derive(Debug, Clone)]
pub struct ExitReport {
    pub code: Option<i32>,
    pub argv: ArgumentVector,
    pub killed: bool,
}

impl ExitReport {
    pub fn into_result(self) -> Result<ExitOutcome, PilotError> {
        if self.killed {
            Ok(ExitOutcome::Killed)
        } else if self.code == Some(0) {
            Ok(ExitOutcome::Succeeded)
        } else {
            Err(PilotError::ExternalToolFailed {
                code: self.code,
                argv: self.argv,
            })
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: ProcessState,
    pid: Option<Pid>,
    // bumped on every start so a stale monitor never touches a newer launch
    generation: u64,
    killed: bool,
}

/// One logical action ("run", "download") that owns at most one child
/// process at a time.
pub struct ProcessHandle {
    name: String,
    inner: Arc<Mutex<Inner>>,
    monitor: Mutex<Option<Worker<ExitReport>>>,
}

impl ProcessHandle {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            inner: Arc::new(Mutex::new(Inner {
                state: ProcessState::Idle,
                pid: None,
                generation: 0,
                killed: false,
            })),
            monitor: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ProcessState {
        lock(&self.inner).state
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.inner).pid.map(|p| p.as_u32())
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            ProcessState::Starting | ProcessState::Running | ProcessState::Killed
        )
    }

    pub fn start(&self, argv: ArgumentVector, sink: Arc<dyn ConsoleSink>) -> Result<(), PilotError> {
        self.launch(argv, None, sink)
    }

    /// Like [`ProcessHandle::start`], with `dir` as the child's working directory.
    pub fn start_in(
        &self,
        argv: ArgumentVector,
        dir: &Path,
        sink: Arc<dyn ConsoleSink>,
    ) -> Result<(), PilotError> {
        self.launch(argv, Some(dir), sink)
    }

    fn launch(
        &self,
        argv: ArgumentVector,
        dir: Option<&Path>,
        sink: Arc<dyn ConsoleSink>,
    ) -> Result<(), PilotError> {
        // check and transition under one lock: a second caller sees `Starting`
        let generation = {
            let mut g = lock(&self.inner);
            match g.state {
                ProcessState::Idle | ProcessState::Finished => {}
                _ => return Err(PilotError::AlreadyRunning(self.name.clone())),
            }
            g.state = ProcessState::Starting;
            g.generation += 1;
            g.killed = false;
            g.pid = None;
            g.generation
        };

        // stdout and stderr share one pipe, so the reader sees them in the order written
        let spawned = os_pipe::pipe().and_then(|(reader, writer)| {
            let mut cmd = argv.to_command();
            cmd.stdin(Stdio::null())
                .stdout(writer.try_clone()?)
                .stderr(writer);
            if let Some(d) = dir {
                cmd.current_dir(d);
            }
            debug!("{} command : {}", self.name, argv);
            // the parent's write ends close when `cmd` drops at the end of this closure
            let child = cmd.spawn()?;
            Ok((child, reader))
        });
        let (mut child, reader) = match spawned {
            Ok(c) => c,
            Err(source) => {
                lock(&self.inner).state = ProcessState::Finished;
                return Err(PilotError::Spawn {
                    program: argv.program().to_string(),
                    source,
                });
            }
        };

        let pid = Pid::from_u32(child.id());
        {
            let mut g = lock(&self.inner);
            g.state = ProcessState::Running;
            g.pid = Some(pid);
        }
        info!("started the {} process (pid {})", self.name, pid);

        let inner = Arc::clone(&self.inner);
        let name = self.name.clone();

        let monitor = Worker::spawn(&format!("{}-monitor", self.name), move |tx| {
            forward_output(reader, sink.as_ref());

            let code = match child.wait() {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("could not wait for the {} process: {}", name, e);
                    None
                }
            };

            let killed = {
                let mut g = lock(&inner);
                if g.generation == generation {
                    g.state = ProcessState::Finished;
                    g.pid = None;
                    g.killed
                } else {
                    // only a completed kill() lets a newer launch begin before we get here
                    true
                }
            };

            let report = ExitReport {
                code,
                argv,
                killed,
            };
            if killed {
                sink.write_line(&format!("The {} process was killed.", name));
            } else if code != Some(0) {
                let e = report.clone().into_result().err();
                if let Some(e) = e {
                    sink.write_line(&e.to_string());
                }
            } else {
                info!("the {} process finished successfully", name);
            }
            let _ = tx.send(report);
        });

        match monitor {
            Ok(w) => {
                *lock(&self.monitor) = Some(w);
                Ok(())
            }
            Err(source) => {
                // the child was moved into the dropped job; make sure it does not linger
                terminate_tree(&self.name, pid);
                lock(&self.inner).state = ProcessState::Finished;
                Err(PilotError::Spawn {
                    program: format!("{}-monitor", self.name),
                    source,
                })
            }
        }
    }

    /// Receiver that yields one [`ExitReport`] when the current child exits.
    pub fn exit_events(&self) -> Option<Receiver<ExitReport>> {
        lock(&self.monitor).as_ref().map(|w| w.events().clone())
    }

    /// Blocks until the current child has exited and all of its output was forwarded.
    pub fn wait(&self) -> Result<ExitOutcome, PilotError> {
        let worker = lock(&self.monitor).take();
        let mut worker = worker.ok_or_else(|| PilotError::NotRunning(self.name.clone()))?;
        let report = worker.events().recv();
        worker.join();
        match report {
            Ok(r) => r.into_result(),
            // the monitor always sends before returning, unless it panicked
            Err(_) => Err(PilotError::NotRunning(self.name.clone())),
        }
    }

    /// Terminates the child and every process it has spawned, directly or
    /// transitively. Failing to signal an individual descendant is logged and
    /// tolerated. The handle is `Finished` afterwards in every case.
    pub fn kill(&self) -> Result<(), PilotError> {
        let pid = {
            let mut g = lock(&self.inner);
            if g.state != ProcessState::Running {
                return Err(PilotError::NotRunning(self.name.clone()));
            }
            g.state = ProcessState::Killed;
            g.killed = true;
            g.pid
        };

        if let Some(pid) = pid {
            let n = terminate_tree(&self.name, pid);
            info!("killed the {} process tree ({} processes)", self.name, n);
        }

        let mut g = lock(&self.inner);
        if g.state == ProcessState::Killed {
            g.state = ProcessState::Finished;
        }
        Ok(())
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // the guarded data stays consistent even if a holder panicked
    m.lock().unwrap_or_else(|e| e.into_inner())
}

fn forward_output<R: Read>(stream: R, sink: &dyn ConsoleSink) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => break,
            Ok(_) => sink.write(&String::from_utf8_lossy(&buf)),
            Err(e) => {
                warn!("stopped reading child output: {}", e);
                break;
            }
        }
    }
}

/// All live processes whose ancestry leads to `root`, excluding `root` itself,
/// in breadth-first order.
pub fn descendants(sys: &System, root: Pid) -> Vec<Pid> {
    let mut children: HashMap<Pid, Vec<Pid>> = HashMap::new();
    for (pid, p) in sys.processes() {
        // on Linux the table also lists threads
        if p.thread_kind().is_some() || p.status() == ProcessStatus::Zombie {
            continue;
        }
        if let Some(parent) = p.parent() {
            children.entry(parent).or_default().push(*pid);
        }
    }

    let mut seen = HashSet::from([root]);
    let mut out = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(p) = queue.pop_front() {
        if let Some(cs) = children.get(&p) {
            for c in cs {
                if seen.insert(*c) {
                    out.push(*c);
                    queue.push_back(*c);
                }
            }
        }
    }
    out
}

/// Freeze `root` and its descendants (so nothing forks while the tree is
/// collected), then kill all of them. Returns the number of processes signalled.
fn terminate_tree(name: &str, root: Pid) -> usize {
    let mut sys = System::new();
    let mut tree: Vec<Pid> = vec![root];
    let mut stopped: HashSet<Pid> = HashSet::new();

    for _ in 0..MAX_FREEZE_ROUNDS {
        sys.refresh_processes(ProcessesToUpdate::All, true);
        let mut grew = false;
        for pid in tree.clone() {
            for d in descendants(&sys, pid) {
                if !tree.contains(&d) {
                    tree.push(d);
                    grew = true;
                }
            }
        }
        for pid in &tree {
            if stopped.insert(*pid) {
                if let Some(p) = sys.process(*pid) {
                    // unsupported platforms return None; we still kill below
                    let _ = p.kill_with(Signal::Stop);
                }
            }
        }
        if !grew && stopped.len() == tree.len() {
            break;
        }
    }

    // kill leaves first so a dying parent does not reparent live children
    let mut signalled = 0;
    for pid in tree.iter().rev() {
        match sys.process(*pid) {
            Some(p) if p.kill() => signalled += 1,
            Some(_) => warn!("could not terminate pid {} of the {} process tree", pid, name),
            None => warn!("pid {} of the {} process tree had already exited", pid, name),
        }
    }
    signalled
}

#[cfg(test)]
mod tests;
