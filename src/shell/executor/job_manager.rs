use std::fmt;

use log::{debug, error};
use nix::errno::Errno;
use nix::sys::wait::waitpid;
use nix::sys::wait::WaitPidFlag as WF;
use nix::unistd::Pid;

use crate::shell::error::ShellError;
use crate::shell::status::ExitStatus;

/// A spawned child, reaped at most once.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: Pid,
    status: Option<ExitStatus>,
}

impl ProcessHandle {
    pub fn new(pid: Pid) -> Self {
        Self { pid, status: None }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Blocks until the child terminates.
    pub fn wait(&mut self) -> Result<ExitStatus, ShellError> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        loop {
            match waitpid(self.pid, None) {
                Ok(ws) => {
                    if let Some(status) = ExitStatus::from_wait(ws) {
                        debug!("进程 {} 结束: {}", self.pid, status);
                        self.status = Some(status);
                        return Ok(status);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(err) => {
                    error!("waitpid {} 失败: {}", self.pid, err);
                    return Err(err.into());
                }
            }
        }
    }

    /// Reaps the child if it has terminated, without blocking.
    pub fn try_wait(&mut self) -> Option<ExitStatus> {
        if self.status.is_some() {
            return self.status;
        }
        match waitpid(self.pid, Some(WF::WNOHANG)) {
            Ok(ws) => self.status = ExitStatus::from_wait(ws),
            // 已被其他地方回收
            Err(Errno::ECHILD) => self.status = Some(ExitStatus::SUCCESS),
            Err(err) => error!("waitpid {} 失败: {}", self.pid, err),
        }
        self.status
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Running,
    Done,
    Killed,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub pgid: Pid,
    pub index: usize,
    pub command: String,
    pub status: JobStatus,
    pub processes: Vec<ProcessHandle>,
    pub is_current: bool,
    pub is_previous: bool,
}

impl Job {
    fn new(pgid: Pid, index: usize, command: String, processes: Vec<ProcessHandle>) -> Self {
        Self {
            pgid,
            index,
            command,
            status: JobStatus::Running,
            processes,
            is_current: false,
            is_previous: false,
        }
    }

    /// The pid a user would `kill`: the last process of the pipeline.
    pub fn pid(&self) -> Pid {
        self.processes.last().map(ProcessHandle::pid).unwrap_or(self.pgid)
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Killed => "killed",
        };
        let mark = if self.is_current {
            "+"
        } else if self.is_previous {
            "-"
        } else {
            " "
        };
        write!(
            f,
            "[{}] {} {} {} {}",
            self.index,
            mark,
            self.pid(),
            status,
            self.command
        )
    }
}

/// Background pipelines that have not been reaped yet.
#[derive(Debug, Default)]
pub struct JobManager {
    jobs: Vec<Job>,
}

impl JobManager {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn get_jobs(&self) -> &[Job] {
        &self.jobs
    }

    fn find_available_index(&self) -> usize {
        let mut index = 1;
        while self.jobs.iter().any(|job| job.index == index) {
            index += 1;
        }
        index
    }

    /// Registers a background pipeline and returns its job number.
    pub fn add_job(&mut self, pgid: Pid, processes: Vec<ProcessHandle>, command: String) -> usize {
        let index = self.find_available_index();
        let job = Job::new(pgid, index, command, processes);
        debug!("添加后台任务: {}", job);
        self.jobs.push(job);
        self.update_marks(index);
        index
    }

    fn remove_job(&mut self, index: usize) -> Option<Job> {
        let pos = self.jobs.iter().position(|job| job.index == index)?;
        let job = self.jobs.remove(pos);

        if job.is_current && !self.jobs.is_empty() {
            // 如果删除的是当前任务，将上一个任务提升为当前任务
            if let Some(prev_job) = self.jobs.iter_mut().find(|job| job.is_previous) {
                prev_job.is_current = true;
                prev_job.is_previous = false;
            } else {
                // 如果没有上一个任务，将最后一个任务设为当前任务
                let last_idx = self.jobs.len() - 1;
                self.jobs[last_idx].is_current = true;
            }
        }
        Some(job)
    }

    fn update_marks(&mut self, current_job_index: usize) {
        for job in self.jobs.iter_mut() {
            if job.index == current_job_index {
                job.is_current = true;
                job.is_previous = false;
            } else if job.is_current {
                job.is_current = false;
                job.is_previous = true;
            } else {
                job.is_previous = false;
            }
        }
    }

    /// Collects every background process that has terminated and returns the
    /// jobs whose processes are all gone.
    pub fn reap(&mut self) -> Vec<Job> {
        let mut finished = Vec::new();
        for job in self.jobs.iter_mut() {
            let mut all_done = true;
            for process in job.processes.iter_mut() {
                if process.try_wait().is_none() {
                    all_done = false;
                }
            }
            if all_done {
                let last = job.processes.last().and_then(|p| p.status);
                job.status = match last {
                    Some(ExitStatus::Signaled(_)) => JobStatus::Killed,
                    _ => JobStatus::Done,
                };
                finished.push(job.index);
            }
        }

        finished
            .into_iter()
            .filter_map(|index| self.remove_job(index))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::thread;
    use std::time::{Duration, Instant};

    fn spawn(program: &str, args: &[&str]) -> ProcessHandle {
        let child = Command::new(program).args(args).spawn().unwrap();
        ProcessHandle::new(Pid::from_raw(child.id() as i32))
    }

    #[test]
    fn test_wait_collects_exit_code() {
        let mut handle = spawn("sh", &["-c", "exit 7"]);
        assert_eq!(handle.wait().unwrap(), ExitStatus::Code(7));
        // a second wait answers from the recorded status
        assert_eq!(handle.wait().unwrap(), ExitStatus::Code(7));
    }

    #[test]
    fn test_wait_reports_signal() {
        let mut handle = spawn("sh", &["-c", "kill -TERM $$"]);
        assert_eq!(handle.wait().unwrap(), ExitStatus::Signaled(15));
    }

    #[test]
    fn test_job_indexes_and_marks() {
        let mut jobs = JobManager::new();
        let first = jobs.add_job(Pid::from_raw(100), vec![], "sleep 10".into());
        let second = jobs.add_job(Pid::from_raw(200), vec![], "sleep 20".into());
        assert_eq!((first, second), (1, 2));
        assert!(jobs.get_jobs()[1].is_current);
        assert!(jobs.get_jobs()[0].is_previous);

        jobs.remove_job(1);
        assert_eq!(jobs.add_job(Pid::from_raw(300), vec![], "sleep 30".into()), 1);
        assert_eq!(jobs.get_jobs()[1].to_string(), "[1] + 300 running sleep 30");
    }

    #[test]
    fn test_reap_finished_job() {
        let mut jobs = JobManager::new();
        let handle = spawn("true", &[]);
        let pgid = handle.pid();
        jobs.add_job(pgid, vec![handle], "true".into());

        let deadline = Instant::now() + Duration::from_secs(10);
        let finished = loop {
            let finished = jobs.reap();
            if !finished.is_empty() || Instant::now() > deadline {
                break finished;
            }
            thread::sleep(Duration::from_millis(20));
        };
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, JobStatus::Done);
        assert!(jobs.get_jobs().is_empty());
    }
}
