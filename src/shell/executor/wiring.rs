//! Descriptor wiring for a pipeline: which end of which pipe, or which file,
//! each stage reads from and writes to.

use std::fs::{File, OpenOptions};
#[cfg(not(any(target_os = "linux", target_os = "android")))]
use std::os::fd::AsRawFd;
use std::os::fd::OwnedFd;
use std::os::unix::fs::OpenOptionsExt;

use log::debug;
#[cfg(any(target_os = "linux", target_os = "android"))]
use nix::{fcntl::OFlag, unistd::pipe2};
#[cfg(not(any(target_os = "linux", target_os = "android")))]
use nix::{
    fcntl::{fcntl, FcntlArg, FdFlag},
    unistd::pipe,
};

use crate::shell::error::ShellError;
use crate::shell::parser::ast::{Command, Pipeline, RedirectMode};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageInput {
    Inherit,
    /// Read end of channel `n`.
    Pipe(usize),
    File(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    Inherit,
    /// Write end of channel `n`.
    Pipe(usize),
    File(String, RedirectMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub input: StageInput,
    pub output: StageOutput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WiringPlan {
    /// Channel `i` connects stage `i` to stage `i + 1`.
    pub channels: usize,
    pub stages: Vec<StagePlan>,
}

/// Works out each stage's endpoints: the implicit pipe connection, overridden
/// by the command's own redirection for that direction.
pub fn plan(pipeline: &Pipeline) -> WiringPlan {
    let count = pipeline.commands.len();
    let stages = pipeline
        .commands
        .iter()
        .enumerate()
        .map(|(i, command)| {
            let input = match command.effective_input() {
                Some(redirection) => StageInput::File(redirection.target.clone()),
                None if i > 0 => StageInput::Pipe(i - 1),
                None => StageInput::Inherit,
            };
            let output = match command.effective_output() {
                Some(redirection) => {
                    StageOutput::File(redirection.target.clone(), redirection.mode)
                }
                None if i + 1 < count => StageOutput::Pipe(i),
                None => StageOutput::Inherit,
            };
            StagePlan { input, output }
        })
        .collect();

    WiringPlan {
        channels: count.saturating_sub(1),
        stages,
    }
}

/// The pipes of one pipeline. Every end is owned here until a stage takes it;
/// whatever is left is closed when this is dropped.
pub struct Channels {
    readers: Vec<Option<OwnedFd>>,
    writers: Vec<Option<OwnedFd>>,
}

impl Channels {
    pub fn open(count: usize) -> Result<Self, ShellError> {
        let mut readers = Vec::with_capacity(count);
        let mut writers = Vec::with_capacity(count);
        for _ in 0..count {
            // 子进程只通过 dup2 到 0/1 的副本持有管道
            let (reader, writer) = cloexec_pipe()?;
            readers.push(Some(reader));
            writers.push(Some(writer));
        }
        debug!("创建了 {} 个管道", count);
        Ok(Self { readers, writers })
    }

    pub fn take_reader(&mut self, channel: usize) -> Option<OwnedFd> {
        self.readers.get_mut(channel).and_then(Option::take)
    }

    pub fn take_writer(&mut self, channel: usize) -> Option<OwnedFd> {
        self.writers.get_mut(channel).and_then(Option::take)
    }

    /// Ends not yet handed to a stage.
    pub fn open_ends(&self) -> usize {
        self.readers.iter().chain(&self.writers).flatten().count()
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd), ShellError> {
    Ok(pipe2(OFlag::O_CLOEXEC)?)
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn cloexec_pipe() -> Result<(OwnedFd, OwnedFd), ShellError> {
    let (reader, writer) = pipe()?;
    for fd in [&reader, &writer] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((reader, writer))
}

/// Files opened for a command's redirections; `None` keeps the pipe or
/// terminal endpoint.
#[derive(Debug, Default)]
pub struct RedirectedFiles {
    pub stdin: Option<File>,
    pub stdout: Option<File>,
}

/// Opens every redirection in declaration order, so `> a > b` creates both
/// files while only `b` is used.
pub fn open_redirections(command: &Command) -> Result<RedirectedFiles, ShellError> {
    let mut files = RedirectedFiles::default();
    for redirection in &command.redirections {
        let target = &redirection.target;
        let opened = match redirection.mode {
            RedirectMode::Input => File::open(target),
            RedirectMode::Output => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o644)
                .open(target),
            RedirectMode::Append => OpenOptions::new()
                .append(true)
                .create(true)
                .mode(0o644)
                .open(target),
        };
        let file = opened.map_err(|err| ShellError::execution(target, &err))?;
        if redirection.mode.is_input() {
            files.stdin = Some(file);
        } else {
            files.stdout = Some(file);
        }
    }
    Ok(files)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::shell::parser::ast::Redirection;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    fn command(argv: &[&str], redirections: Vec<Redirection>) -> Command {
        Command {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            redirections,
            ..Command::default()
        }
    }

    fn redirect(mode: RedirectMode, target: &str) -> Redirection {
        Redirection {
            mode,
            target: target.to_string(),
        }
    }

    #[test]
    fn test_three_stage_topology() {
        let pipeline = Pipeline {
            commands: vec![
                command(&["a"], vec![]),
                command(&["b"], vec![]),
                command(&["c"], vec![]),
            ],
            background: false,
        };
        let wiring = plan(&pipeline);
        assert_eq!(wiring.channels, 2);
        assert_eq!(
            wiring.stages,
            vec![
                StagePlan {
                    input: StageInput::Inherit,
                    output: StageOutput::Pipe(0)
                },
                StagePlan {
                    input: StageInput::Pipe(0),
                    output: StageOutput::Pipe(1)
                },
                StagePlan {
                    input: StageInput::Pipe(1),
                    output: StageOutput::Inherit
                },
            ]
        );
    }

    #[test]
    fn test_single_command_has_no_channels() {
        let pipeline = Pipeline {
            commands: vec![command(&["ls"], vec![])],
            background: false,
        };
        let wiring = plan(&pipeline);
        assert_eq!(wiring.channels, 0);
        assert_eq!(wiring.stages[0].input, StageInput::Inherit);
        assert_eq!(wiring.stages[0].output, StageOutput::Inherit);
    }

    #[test]
    fn test_explicit_redirections_override_pipes() {
        let pipeline = Pipeline {
            commands: vec![
                command(&["a"], vec![redirect(RedirectMode::Output, "a.out")]),
                command(
                    &["b"],
                    vec![
                        redirect(RedirectMode::Input, "first.in"),
                        redirect(RedirectMode::Input, "second.in"),
                    ],
                ),
            ],
            background: false,
        };
        let wiring = plan(&pipeline);
        assert_eq!(wiring.channels, 1);
        assert_eq!(
            wiring.stages[0].output,
            StageOutput::File("a.out".into(), RedirectMode::Output)
        );
        assert_eq!(wiring.stages[1].input, StageInput::File("second.in".into()));
    }

    #[test]
    fn test_channels_hand_out_each_end_once() {
        let mut channels = Channels::open(2).unwrap();
        assert_eq!(channels.open_ends(), 4);
        assert!(channels.take_writer(0).is_some());
        assert!(channels.take_writer(0).is_none());
        assert!(channels.take_reader(1).is_some());
        assert!(channels.take_reader(5).is_none());
        assert_eq!(channels.open_ends(), 2);
    }

    #[test]
    fn test_open_redirections_creates_every_output() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let second = dir.path().join("second.txt");
        fs::write(&first, "old contents").unwrap();

        let cmd = command(
            &["echo"],
            vec![
                redirect(RedirectMode::Output, first.to_str().unwrap()),
                redirect(RedirectMode::Append, second.to_str().unwrap()),
            ],
        );
        let files = open_redirections(&cmd).unwrap();
        assert!(files.stdin.is_none());
        assert!(files.stdout.is_some());
        assert_eq!(fs::read_to_string(&first).unwrap(), "");
        assert!(second.exists());
    }

    #[test]
    fn test_missing_input_is_execution_error() {
        let cmd = command(&["cat"], vec![redirect(RedirectMode::Input, "/no/such/input.txt")]);
        match open_redirections(&cmd) {
            Err(ShellError::Execution { path, reason }) => {
                assert_eq!(path, "/no/such/input.txt");
                assert_eq!(reason, "no such file or directory");
            }
            other => panic!("expected execution error, got {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_input_is_execution_error() {
        // root reads through mode 000
        if nix::unistd::geteuid().is_root() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let locked = dir.path().join("locked.txt");
        fs::write(&locked, "secret").unwrap();
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

        let target = locked.to_str().unwrap();
        let cmd = command(&["cat"], vec![redirect(RedirectMode::Input, target)]);
        match open_redirections(&cmd) {
            Err(ShellError::Execution { path, reason }) => {
                assert_eq!(path, target);
                assert_eq!(reason, "permission denied");
            }
            other => panic!("expected execution error, got {:?}", other),
        }
    }
}
