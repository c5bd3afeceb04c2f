//! External command execution.
//!
//! Every interaction with NetworkManager and the kernel networking tools goes
//! through the [`CommandRunner`] trait. The real implementation,
//! [`SystemRunner`], spawns processes with a bounded execution time; tests
//! substitute a scripted fake so the whole crate can run without radio
//! hardware.
//!
//! Failures never surface as Rust errors here. Whether the executable could
//! not be started, ran past the timeout, or exited non-zero, the caller gets
//! a [`CommandOutput`] with a non-zero `exit_code` and whatever error text
//! was available.

use std::io::Read;
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Upper bound on the execution time of a single external command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Standard error text reported when a command exceeds [`COMMAND_TIMEOUT`].
pub const TIMEOUT_MESSAGE: &str = "Command timed out";

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Captured result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output with surrounding whitespace removed.
    pub stdout: String,
    /// Standard error with surrounding whitespace removed.
    pub stderr: String,
    /// Process exit code. Non-zero for any kind of failure.
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i32) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Output shape for a command that could not be run to completion.
    pub fn failure(stderr: impl Into<String>) -> Self {
        Self::new("", stderr, 1)
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes external commands.
///
/// `run` hands the whole string to a shell and must only be used for fixed
/// command lines. Anything carrying user input, and in particular a
/// passphrase, goes through `run_argv` so no shell ever re-interprets it.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str) -> CommandOutput;

    fn run_argv(&self, argv: &[&str]) -> CommandOutput;
}

/// Runs commands on the host with a fixed timeout.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    timeout: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::with_timeout(COMMAND_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn execute(&self, mut command: Command, rendered: &str) -> CommandOutput {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        // Own process group, so a timeout also reaches anything the command forks.
        #[cfg(unix)]
        command.process_group(0);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = rendered, error = %e, "failed to start command");
                return CommandOutput::failure(e.to_string());
            }
        };

        // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
        let (tx, rx) = mpsc::channel();
        if let Some(pipe) = child.stdout.take() {
            spawn_reader(pipe, Stream::Stdout, tx.clone());
        }
        if let Some(pipe) = child.stderr.take() {
            spawn_reader(pipe, Stream::Stderr, tx.clone());
        }
        drop(tx);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    return self.abandon(&mut child, rendered);
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    kill_group(&child);
                    let _ = child.kill();
                    warn!(command = rendered, error = %e, "failed to wait for command");
                    return CommandOutput::failure(e.to_string());
                }
            }
        };

        let mut output = CommandOutput {
            // Terminated by a signal: no exit code, still a failure.
            exit_code: status.code().unwrap_or(1),
            ..CommandOutput::default()
        };

        // A background process can inherit the pipes and hold them open past
        // the exit of the command itself; the deadline covers that wait too.
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((Stream::Stdout, text)) => output.stdout = text,
                Ok((Stream::Stderr, text)) => output.stderr = text,
                Err(RecvTimeoutError::Timeout) => return self.abandon(&mut child, rendered),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!(command = rendered, exit_code = output.exit_code, "command finished");
        output
    }

    fn abandon(&self, child: &mut Child, rendered: &str) -> CommandOutput {
        kill_group(child);
        let _ = child.kill();
        let _ = child.wait();
        warn!(command = rendered, timeout = ?self.timeout, "command timed out");
        CommandOutput::failure(TIMEOUT_MESSAGE)
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, command: &str) -> CommandOutput {
        debug!(command, "running shell command");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        self.execute(cmd, command)
    }

    fn run_argv(&self, argv: &[&str]) -> CommandOutput {
        let Some((program, args)) = argv.split_first() else {
            return CommandOutput::failure("Empty command");
        };
        let rendered = render_argv(argv);
        debug!(command = %rendered, "running command");
        let mut cmd = Command::new(program);
        cmd.args(args);
        self.execute(cmd, &rendered)
    }
}

enum Stream {
    Stdout,
    Stderr,
}

fn spawn_reader<R: Read + Send + 'static>(mut source: R, stream: Stream, tx: Sender<(Stream, String)>) {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = source.read_to_end(&mut buf);
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).trim().to_string()));
    });
}

/// Kills the process group led by `child`.
#[cfg(unix)]
fn kill_group(child: &Child) {
    let group = format!("-{}", child.id());
    let _ = Command::new("kill")
        .args(["-KILL", "--", group.as_str()])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn kill_group(_child: &Child) {}

/// Renders an argument vector for logs, masking the value after `password`.
pub fn render_argv(argv: &[&str]) -> String {
    let mut rendered = Vec::with_capacity(argv.len());
    let mut mask_next = false;
    for arg in argv {
        if mask_next {
            rendered.push("********");
            mask_next = false;
        } else {
            rendered.push(*arg);
            mask_next = *arg == "password";
        }
    }
    rendered.join(" ")
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    //! Scripted stand-in for the host's command line tools.

    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard, PoisonError};

    use super::{CommandOutput, CommandRunner};

    /// Answers commands from a script keyed by the rendered command line.
    /// Unscripted commands fail with exit code 127.
    #[derive(Default)]
    pub struct ScriptedRunner {
        responses: Mutex<HashMap<String, CommandOutput>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn on(self, command: &str, output: CommandOutput) -> Self {
            self.set(command, output);
            self
        }

        pub fn ok(self, command: &str, stdout: &str) -> Self {
            self.on(command, CommandOutput::new(stdout, "", 0))
        }

        pub fn fail(self, command: &str, stderr: &str) -> Self {
            self.on(command, CommandOutput::new("", stderr, 1))
        }

        /// Replaces the scripted answer for `command` after construction.
        pub fn set(&self, command: &str, output: CommandOutput) {
            lock(&self.responses).insert(command.to_string(), output);
        }

        pub fn calls(&self) -> Vec<String> {
            lock(&self.calls).clone()
        }

        pub fn called(&self, command: &str) -> bool {
            lock(&self.calls).iter().any(|c| c == command)
        }

        fn answer(&self, key: String) -> CommandOutput {
            let output = lock(&self.responses)
                .get(&key)
                .cloned()
                .unwrap_or_else(|| CommandOutput::new("", format!("unscripted: {key}"), 127));
            lock(&self.calls).push(key);
            output
        }
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    impl CommandRunner for ScriptedRunner {
        fn run(&self, command: &str) -> CommandOutput {
            self.answer(command.to_string())
        }

        fn run_argv(&self, argv: &[&str]) -> CommandOutput {
            self.answer(argv.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_form_captures_trimmed_stdout() {
        let out = SystemRunner::new().run("echo '  hello  '");
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn non_zero_exit_is_reported_not_raised() {
        let out = SystemRunner::new().run_argv(&["sh", "-c", "echo oops >&2; exit 3"]);
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stderr, "oops");
    }

    #[test]
    fn argv_form_does_not_interpret_shell_syntax() {
        let out = SystemRunner::new().run_argv(&["echo", "$HOME;`id`"]);
        assert_eq!(out.stdout, "$HOME;`id`");
    }

    #[test]
    fn missing_executable_folds_into_failure() {
        let out = SystemRunner::new().run_argv(&["definitely-not-a-real-binary-42"]);
        assert!(!out.success());
        assert!(out.stdout.is_empty());
        assert!(!out.stderr.is_empty());
    }

    #[test]
    fn empty_argv_is_a_failure() {
        assert!(!SystemRunner::new().run_argv(&[]).success());
    }

    #[test]
    fn timeout_returns_sentinel() {
        let out = SystemRunner::with_timeout(Duration::from_millis(100)).run_argv(&["sleep", "5"]);
        assert_eq!(out, CommandOutput::failure(TIMEOUT_MESSAGE));
    }

    #[test]
    fn shell_form_timeout_returns_sentinel() {
        let started = Instant::now();
        let out = SystemRunner::with_timeout(Duration::from_millis(100)).run("sleep 5");
        assert_eq!(out, CommandOutput::failure(TIMEOUT_MESSAGE));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn background_child_holding_stdout_cannot_outlast_timeout() {
        let started = Instant::now();
        let out = SystemRunner::with_timeout(Duration::from_millis(200)).run("sleep 6 & echo hi");
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(out, CommandOutput::failure(TIMEOUT_MESSAGE));
    }

    #[test]
    fn timeout_kills_forked_descendants() {
        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("sleep 30 & echo $! > {}; wait", pid_file.display());

        let out = SystemRunner::with_timeout(Duration::from_millis(300)).run(&script);
        assert_eq!(out, CommandOutput::failure(TIMEOUT_MESSAGE));

        let pid = std::fs::read_to_string(&pid_file).unwrap().trim().to_string();
        // Zombies count as gone: nothing guarantees the orphan is reaped promptly.
        let gone = (0..50).any(|_| {
            let running = std::fs::read_to_string(format!("/proc/{pid}/stat"))
                .map(|stat| !stat.rsplit(')').next().unwrap_or("").trim_start().starts_with('Z'))
                .unwrap_or(false);
            if running {
                thread::sleep(Duration::from_millis(20));
            }
            !running
        });
        assert!(gone, "sleep {pid} survived the timeout");
    }

    #[test]
    fn quick_background_child_does_not_block_output() {
        let out = SystemRunner::new().run("(sleep 0.1; echo late) & echo now; wait");
        assert!(out.success());
        assert_eq!(out.stdout, "now\nlate");
    }

    #[test]
    fn render_argv_masks_passwords() {
        let argv = ["nmcli", "device", "wifi", "connect", "Home", "password", "s3cret", "ifname", "wlan0"];
        let rendered = render_argv(&argv);
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.ends_with("password ******** ifname wlan0"));
    }
}
