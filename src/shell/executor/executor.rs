use std::fs::{self, File};
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{self, Stdio};

use log::{debug, error, info, warn};
use nix::errno::Errno;
use nix::unistd::Pid;

use super::builtins::{BuiltinFn, Builtins};
use super::job_manager::ProcessHandle;
use super::wiring::{self, Channels, StageInput, StageOutput, StagePlan};
use crate::shell::error::ShellError;
use crate::shell::parser::ast::{Command, Pipeline};
use crate::shell::signals;
use crate::shell::state::ShellState;
use crate::shell::status::ExitStatus;
use crate::utils::path;

/// What a stage turned into once the pipeline has been set up.
enum Stage {
    Spawned(ProcessHandle),
    /// Runs in-process once every external stage has been spawned.
    Builtin {
        name: String,
        handler: BuiltinFn,
        argv: Vec<String>,
        stdout: Option<OwnedFd>,
    },
    Done(ExitStatus),
}

pub struct Executor {
    builtins: Builtins,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self::with_builtins(Builtins::default())
    }

    pub fn with_builtins(builtins: Builtins) -> Self {
        Self { builtins }
    }

    /// Runs a parsed pipeline. Foreground pipelines report the status of their
    /// last command; background ones are handed to the job table and report
    /// success right away.
    pub fn execute(
        &self,
        pipeline: &Pipeline,
        state: &mut ShellState,
    ) -> Result<ExitStatus, ShellError> {
        debug!("执行管道: {}", pipeline);

        if let [command] = pipeline.commands.as_slice() {
            if command.argv.is_empty() {
                return Ok(self.assign(command, state));
            }
        }

        let wiring = wiring::plan(pipeline);
        let mut channels = Channels::open(wiring.channels)?;
        let mut stages = Vec::with_capacity(pipeline.commands.len());
        let mut pgid: Option<Pid> = None;

        let stage_plans = pipeline.commands.iter().zip(&wiring.stages);
        for (i, (command, stage_plan)) in stage_plans.enumerate() {
            // 相邻的管道端总是取出，未使用的在本轮结束时关闭
            let upstream = i.checked_sub(1).and_then(|c| channels.take_reader(c));
            let downstream = channels.take_writer(i);

            let group = if pipeline.background {
                Some(pgid.unwrap_or(Pid::from_raw(0)))
            } else {
                None
            };

            let started =
                self.start_stage(command, stage_plan, upstream, downstream, group, state);
            let stage = match started {
                Ok(stage) => stage,
                Err(err) => {
                    error!("阶段 {} 启动失败: {}", i, err);
                    eprintln!("forksh: {}", err);
                    Stage::Done(ExitStatus::Code(err.status_code()))
                }
            };
            if let Stage::Spawned(handle) = &stage {
                if pipeline.background && pgid.is_none() {
                    pgid = Some(handle.pid());
                }
            }
            stages.push(stage);
        }
        debug_assert_eq!(channels.open_ends(), 0);
        drop(channels);

        let mut statuses = Vec::with_capacity(stages.len());
        let mut handles = Vec::new();
        // 管道中的 exit 只结束它自己的阶段
        let exit_request = state.exit_request;
        for stage in stages {
            match stage {
                Stage::Spawned(handle) => {
                    statuses.push(None);
                    handles.push((statuses.len() - 1, handle));
                }
                Stage::Builtin {
                    name,
                    handler,
                    argv,
                    stdout,
                } => {
                    let status = run_builtin(&name, handler, &argv, stdout, state);
                    statuses.push(Some(status));
                }
                Stage::Done(status) => statuses.push(Some(status)),
            }
        }
        if pipeline.commands.len() > 1 {
            state.exit_request = exit_request;
        }

        if pipeline.background {
            if let Some(pgid) = pgid {
                let processes: Vec<ProcessHandle> =
                    handles.into_iter().map(|(_, handle)| handle).collect();
                let last_pid = processes.last().map(ProcessHandle::pid).unwrap_or(pgid);
                let index = state.jobs.add_job(pgid, processes, command_text(pipeline));
                println!("[{}] {}", index, last_pid);
                info!("后台任务 [{}] 已启动, pgid {}", index, pgid);
            }
            return Ok(ExitStatus::SUCCESS);
        }

        for (slot, mut handle) in handles {
            let status = match handle.wait() {
                Ok(status) => status,
                Err(err) => {
                    error!("等待进程 {} 失败: {}", handle.pid(), err);
                    ExitStatus::Code(1)
                }
            };
            statuses[slot] = Some(status);
        }

        let status = statuses
            .last()
            .copied()
            .flatten()
            .unwrap_or(ExitStatus::SUCCESS);
        debug!("管道结束: {}", status);
        Ok(status)
    }

    /// A lone command without a program: its assignments set shell-local
    /// variables and its redirections are still opened.
    fn assign(&self, command: &Command, state: &mut ShellState) -> ExitStatus {
        if let Err(err) = wiring::open_redirections(command) {
            error!("重定向失败: {}", err);
            eprintln!("forksh: {}", err);
            return ExitStatus::Code(err.status_code());
        }
        for (name, value) in &command.assignments {
            state.vars.set(name.clone(), value.clone());
        }
        ExitStatus::SUCCESS
    }

    fn start_stage(
        &self,
        command: &Command,
        stage_plan: &StagePlan,
        upstream: Option<OwnedFd>,
        downstream: Option<OwnedFd>,
        group: Option<Pid>,
        state: &ShellState,
    ) -> Result<Stage, ShellError> {
        let files = wiring::open_redirections(command)?;
        let stdin: Option<OwnedFd> = match stage_plan.input {
            StageInput::Pipe(_) => upstream,
            StageInput::File(ref target) => {
                debug!("输入重定向: {}", target);
                files.stdin.map(OwnedFd::from)
            }
            StageInput::Inherit => None,
        };
        let stdout: Option<OwnedFd> = match stage_plan.output {
            StageOutput::Pipe(_) => downstream,
            StageOutput::File(ref target, mode) => {
                debug!("输出重定向 ({:?}): {}", mode, target);
                files.stdout.map(OwnedFd::from)
            }
            StageOutput::Inherit => None,
        };

        let argv = &command.argv;
        let Some(program) = argv.first() else {
            // 管道中没有程序的阶段不影响当前 shell
            debug!("空阶段, 忽略赋值: {:?}", command.assignments);
            return Ok(Stage::Done(ExitStatus::SUCCESS));
        };

        if let Some(handler) = self.builtins.get(program) {
            debug!("内建命令: {:?}", argv);
            return Ok(Stage::Builtin {
                name: program.clone(),
                handler,
                argv: argv.clone(),
                stdout,
            });
        }

        let executable = resolve_program(program, state.vars.get("PATH"))?;

        let mut cmd = process::Command::new(&executable);
        cmd.arg0(program)
            .args(&argv[1..])
            .env_clear()
            .envs(state.vars.exported())
            .envs(command.assignments.iter().map(|(name, value)| (name, value)))
            .stdin(stdin.map_or_else(Stdio::inherit, Stdio::from))
            .stdout(stdout.map_or_else(Stdio::inherit, Stdio::from))
            .stderr(Stdio::inherit());
        if let Some(pgid) = group {
            cmd.process_group(pgid.as_raw());
        }
        // SAFETY: the hook only resets signal dispositions, which is
        // async-signal-safe.
        unsafe {
            cmd.pre_exec(signals::restore_default_signals);
        }

        let child = cmd.spawn().map_err(|source| ShellError::Spawn {
            program: program.clone(),
            source,
        })?;
        let pid = Pid::from_raw(child.id() as i32);
        info!("启动进程 {}: {} {:?}", pid, executable.display(), argv);
        Ok(Stage::Spawned(ProcessHandle::new(pid)))
    }
}

/// Finds the file to exec. A name with a `/` is taken as a path and must be
/// an executable file; anything else is looked up in `PATH`.
fn resolve_program(program: &str, search_path: Option<&str>) -> Result<PathBuf, ShellError> {
    if !program.contains('/') {
        return path::find_executable(program, search_path)
            .ok_or_else(|| ShellError::CommandNotFound(program.to_string()));
    }

    let metadata =
        fs::metadata(program).map_err(|_| ShellError::CommandNotFound(program.to_string()))?;
    let errno = if metadata.is_dir() {
        Errno::EISDIR
    } else if !path::is_executable(Path::new(program)) {
        Errno::EACCES
    } else {
        return Ok(PathBuf::from(program));
    };
    Err(ShellError::Spawn {
        program: program.to_string(),
        source: io::Error::from_raw_os_error(errno as i32),
    })
}

fn run_builtin(
    name: &str,
    handler: BuiltinFn,
    argv: &[String],
    stdout: Option<OwnedFd>,
    state: &mut ShellState,
) -> ExitStatus {
    let result = match stdout {
        Some(fd) => {
            let mut file = File::from(fd);
            handler(argv, state, &mut file).and_then(|code| file.flush().map(|_| code))
        }
        None => {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            handler(argv, state, &mut lock).and_then(|code| lock.flush().map(|_| code))
        }
    };
    match result {
        Ok(code) => ExitStatus::Code(code),
        Err(err) => {
            warn!("内建命令 {} 失败: {}", name, err);
            eprintln!("forksh: {}: {}", name, err);
            ExitStatus::Code(1)
        }
    }
}

/// The pipeline as the user would retype it, without the trailing `&`.
fn command_text(pipeline: &Pipeline) -> String {
    pipeline
        .commands
        .iter()
        .map(Command::to_string)
        .collect::<Vec<_>>()
        .join(" | ")
}
