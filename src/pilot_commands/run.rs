use crate::utils::arg_builder::{ArgumentBuilder, ArgumentVector};
use crate::utils::console::{Console, ConsoleSink, TerminalDisplay, TextDisplay};
use crate::utils::constants::{DOCTOR_SUBCOMMAND, RUN_CONFIG_PATH};
use crate::utils::doctor_utils::ReferenceFile;
use crate::utils::run_config::RunConfiguration;
use crate::utils::supervisor::{ExitOutcome, ExitReport, ProcessHandle, ProcessState};
use crate::utils::worker::Worker;

use anyhow::Context;
use crossbeam::channel::{never, select, Receiver};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use strum::{Display, EnumString};
use tracing::{info, warn};

const CONTROL_HELP: &str = "\
commands:
  kill [run|download]                  terminate a process and everything it started
  download <dir> <cdna|gtf|gtf_chr>... fetch reference files into <dir>
  status                               show what is running
  help                                 show this message
  quit                                 kill whatever is running and exit
";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Target {
    Run,
    Download,
}

/// A line typed by the user while the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Kill(Target),
    Download {
        dir: PathBuf,
        files: Vec<ReferenceFile>,
    },
    Status,
    Help,
    Quit,
}

/// Parses one control line. Blank lines yield `Ok(None)`.
pub fn parse_control(line: &str) -> Result<Option<ControlCommand>, String> {
    let mut words = line.split_whitespace();
    let cmd = match words.next() {
        Some(c) => c,
        None => return Ok(None),
    };
    let rest: Vec<&str> = words.collect();
    let parsed = match (cmd, rest.as_slice()) {
        ("kill", []) => ControlCommand::Kill(Target::Run),
        ("kill", [t]) => ControlCommand::Kill(
            Target::from_str(t).map_err(|_| format!("cannot kill `{}`; expected run or download", t))?,
        ),
        ("download", [dir, files @ ..]) if !files.is_empty() => {
            let files = files
                .iter()
                .map(|f| {
                    ReferenceFile::from_str(f)
                        .map_err(|_| format!("unknown reference file `{}`; expected cdna, gtf or gtf_chr", f))
                })
                .collect::<Result<Vec<_>, _>>()?;
            ControlCommand::Download {
                dir: PathBuf::from(dir),
                files,
            }
        }
        ("download", _) => {
            return Err(String::from("usage: download <dir> <cdna|gtf|gtf_chr>..."));
        }
        ("status", []) => ControlCommand::Status,
        ("help", []) => ControlCommand::Help,
        ("quit", []) | ("exit", []) => ControlCommand::Quit,
        _ => return Err(format!("unrecognized command `{}`; type `help`", line.trim())),
    };
    Ok(Some(parsed))
}

/// `<exe> doctor -d --<file>... <dir>`
pub fn download_command(exe: &Path, dir: &Path, files: &[ReferenceFile]) -> ArgumentVector {
    let mut argv = vec![
        exe.to_string_lossy().into_owned(),
        DOCTOR_SUBCOMMAND.to_string(),
        String::from("-d"),
    ];
    argv.extend(files.iter().map(|f| format!("--{}", f)));
    argv.push(dir.to_string_lossy().into_owned());
    ArgumentVector::from(argv)
}

/// The two independent actions of a session, each writing to its own sink.
struct Session {
    exe: PathBuf,
    run: ProcessHandle,
    download: ProcessHandle,
    run_sink: Arc<dyn ConsoleSink>,
    download_sink: Arc<dyn ConsoleSink>,
}

impl Session {
    fn new<D: TextDisplay>(exe: PathBuf, console: &Console<D>) -> Self {
        Self {
            exe,
            run: ProcessHandle::new("run"),
            download: ProcessHandle::new("download"),
            run_sink: Arc::new(console.handle()),
            download_sink: Arc::new(console.handle()),
        }
    }

    fn handle(&self, t: Target) -> &ProcessHandle {
        match t {
            Target::Run => &self.run,
            Target::Download => &self.download,
        }
    }

    fn describe(&self, h: &ProcessHandle) -> String {
        match (h.state(), h.pid()) {
            (ProcessState::Running, Some(pid)) => format!("{}: running (pid {})", h.name(), pid),
            (s, _) => format!("{}: {}", h.name(), s),
        }
    }

    /// Carries out `cmd`. Returns `true` once the user asked to quit.
    fn apply<D: TextDisplay>(
        &self,
        cmd: ControlCommand,
        console: &mut Console<D>,
        download_exit: &mut Option<Receiver<ExitReport>>,
    ) -> bool {
        match cmd {
            ControlCommand::Kill(t) => {
                if let Err(e) = self.handle(t).kill() {
                    console.show(&format!("{}\n", e));
                }
            }
            ControlCommand::Download { dir, files } => {
                let argv = download_command(&self.exe, &dir, &files);
                match self.download.start(argv, self.download_sink.clone()) {
                    Ok(()) => {
                        *download_exit = self.download.exit_events();
                        console.show(&format!("Downloading into {}...\n", dir.display()));
                    }
                    Err(e) => console.show(&format!("{}\n", e)),
                }
            }
            ControlCommand::Status => {
                console.show(&format!(
                    "{}\n{}\n",
                    self.describe(&self.run),
                    self.describe(&self.download)
                ));
            }
            ControlCommand::Help => console.show(CONTROL_HELP),
            ControlCommand::Quit => {
                for h in [&self.run, &self.download] {
                    if h.is_active() {
                        if let Err(e) = h.kill() {
                            warn!("{}", e);
                        }
                    }
                }
                return true;
            }
        }
        false
    }
}

fn read_commands(tx: crossbeam::channel::Sender<String>) {
    for line in std::io::stdin().lock().lines() {
        match line {
            Ok(l) => {
                if tx.send(l).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!("stopped reading commands: {}", e);
                break;
            }
        }
    }
}

/// Drives the session until neither process is active any more. Output of
/// both processes, exit notifications and user commands are all handled on
/// this thread, which is the only one that touches the display.
fn supervise<D: TextDisplay>(
    console: &mut Console<D>,
    session: &Session,
    mut commands: Receiver<String>,
) -> Option<ExitReport> {
    let messages = console.messages().clone();
    let mut run_exit = session.run.exit_events();
    let mut download_exit: Option<Receiver<ExitReport>> = None;
    let mut run_report = None;
    let mut quitting = false;

    while run_exit.is_some() || download_exit.is_some() {
        let run_rx = run_exit.clone().unwrap_or_else(never);
        let download_rx = download_exit.clone().unwrap_or_else(never);
        let command_rx = commands.clone();
        select! {
            recv(messages) -> msg => {
                if let Ok(text) = msg {
                    console.show(&text);
                }
            }
            recv(run_rx) -> r => {
                // the monitor queues all output before its report
                console.pump();
                run_exit = None;
                match r {
                    Ok(report) => {
                        if report.code == Some(0) && !report.killed {
                            console.show("The run process finished.\n");
                        }
                        run_report = Some(report);
                    }
                    Err(_) => warn!("the run monitor went away without reporting"),
                }
            }
            recv(download_rx) -> r => {
                console.pump();
                download_exit = None;
                if let Ok(report) = r {
                    if report.code == Some(0) && !report.killed {
                        console.show("The download process finished.\n");
                    }
                }
            }
            recv(command_rx) -> line => {
                match line {
                    Ok(line) => match parse_control(&line) {
                        Ok(Some(cmd)) => {
                            if !quitting && session.apply(cmd, console, &mut download_exit) {
                                quitting = true;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => console.show(&format!("{}\n", e)),
                    },
                    // stdin closed; keep supervising what is running
                    Err(_) => commands = never(),
                }
            }
        }
    }
    console.pump();
    run_report
}

/// ### Program Name
/// bcbio-pilot run
///
/// Launches the helper for the saved run options and supervises it until it
/// ends. Commands typed on stdin can kill it or start a reference download
/// alongside it.
pub fn run_pipeline(pilot_home_path: PathBuf) -> anyhow::Result<()> {
    let run_config_p = pilot_home_path.join(RUN_CONFIG_PATH);
    let run_config = RunConfiguration::load(&run_config_p)?;
    run_config.validate().with_context(|| {
        format!(
            "the run options in {} are incomplete; set them with `bcbio-pilot config set`",
            run_config_p.display()
        )
    })?;

    let argv = ArgumentBuilder::for_current_exe()?.build(&run_config)?;
    let exe = std::env::current_exe().context("could not determine the path of this executable")?;
    info!("pipeline command : {}", argv);

    let mut console = Console::new(TerminalDisplay);
    let session = Session::new(exe, &console);
    session.run.start(argv, session.run_sink.clone())?;
    console.show(CONTROL_HELP);

    // the reader blocks on stdin and is left behind when we return
    let stdin = Worker::spawn("stdin", read_commands)?;
    let report = supervise(&mut console, &session, stdin.events().clone());

    match report.map(ExitReport::into_result) {
        Some(Ok(ExitOutcome::Succeeded)) => info!("the run finished successfully"),
        Some(Ok(ExitOutcome::Killed)) => warn!("the run was killed"),
        Some(Err(e)) => return Err(e.into()),
        None => warn!("the run ended without an exit report"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::console::BufferDisplay;
    use crossbeam::channel::unbounded;

    #[test]
    fn control_lines_parse() {
        assert_eq!(parse_control("  ").unwrap(), None);
        assert_eq!(parse_control("kill").unwrap(), Some(ControlCommand::Kill(Target::Run)));
        assert_eq!(
            parse_control("kill download").unwrap(),
            Some(ControlCommand::Kill(Target::Download))
        );
        assert_eq!(
            parse_control("download refs gtf_chr cdna").unwrap(),
            Some(ControlCommand::Download {
                dir: PathBuf::from("refs"),
                files: vec![ReferenceFile::GtfChr, ReferenceFile::Cdna],
            })
        );
        assert_eq!(parse_control("quit").unwrap(), Some(ControlCommand::Quit));
        assert!(parse_control("download refs").is_err());
        assert!(parse_control("download refs genome").is_err());
        assert!(parse_control("kill everything").is_err());
        assert!(parse_control("launch").is_err());
    }

    #[test]
    fn download_command_calls_doctor() {
        let argv = download_command(
            Path::new("/usr/local/bin/bcbio-pilot"),
            Path::new("refs"),
            &[ReferenceFile::Cdna, ReferenceFile::GtfChr],
        );
        assert_eq!(argv.program(), "/usr/local/bin/bcbio-pilot");
        assert_eq!(argv.args(), ["doctor", "-d", "--cdna", "--gtf_chr", "refs"]);
    }

    #[cfg(unix)]
    #[test]
    fn supervise_shows_output_until_run_ends() {
        let mut console = Console::new(BufferDisplay::default());
        let session = Session::new(PathBuf::from("bcbio-pilot"), &console);
        session
            .run
            .start(
                ArgumentVector::from(vec![
                    "sh",
                    "-c",
                    "i=0; while [ $i -lt 200 ]; do echo step $i; i=$((i+1)); done",
                ]),
                session.run_sink.clone(),
            )
            .unwrap();
        let (_tx, rx) = unbounded::<String>();

        let report = supervise(&mut console, &session, rx).unwrap();
        assert_eq!(report.code, Some(0));
        let shown = console.display().content();
        let steps: String = (0..200).map(|i| format!("step {i}\n")).collect();
        assert_eq!(shown, format!("{steps}The run process finished.\n"));
    }

    #[cfg(unix)]
    #[test]
    fn kill_command_ends_the_run() {
        let mut console = Console::new(BufferDisplay::default());
        let session = Session::new(PathBuf::from("bcbio-pilot"), &console);
        session
            .run
            .start(
                ArgumentVector::from(vec!["sh", "-c", "echo started; sleep 30"]),
                session.run_sink.clone(),
            )
            .unwrap();
        let (tx, rx) = unbounded::<String>();
        tx.send(String::from("status")).unwrap();
        tx.send(String::from("kill")).unwrap();
        drop(tx);

        let report = supervise(&mut console, &session, rx).unwrap();
        assert!(report.killed);
        assert_eq!(session.run.state(), ProcessState::Finished);
        let shown = console.display().content();
        assert!(shown.contains("run: running (pid "));
        assert!(shown.contains("The run process was killed."));
    }
}
