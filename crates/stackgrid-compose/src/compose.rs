//! The compose command set, run inside a project directory.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::ComposeResult;
use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// Drives the external compose tool for one project directory at a time.
///
/// `program` may contain spaces (`"docker compose"`); the first word is the
/// executable and the rest are prepended to every invocation.
#[derive(Clone)]
pub struct Compose {
    runner: Arc<dyn CommandRunner>,
    program: Vec<String>,
    timeout: Duration,
    up_timeout: Duration,
    log_tail: u32,
}

impl Compose {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: &str,
        timeout: Duration,
        up_timeout: Duration,
        log_tail: u32,
    ) -> Self {
        let mut words: Vec<String> = program.split_whitespace().map(str::to_string).collect();
        if words.is_empty() {
            words.push("docker-compose".to_string());
        }
        Self {
            runner,
            program: words,
            timeout,
            up_timeout,
            log_tail,
        }
    }

    fn spec(&self, dir: &Path, args: &[&str], timeout: Duration) -> CommandSpec {
        CommandSpec::new(&self.program[0], timeout)
            .args(self.program[1..].iter().cloned())
            .args(args.iter().copied())
            .current_dir(dir)
    }

    async fn checked(&self, spec: CommandSpec) -> ComposeResult<()> {
        info!(command = %spec.display(), cwd = ?spec.cwd, "running compose");
        self.runner.run(spec.clone()).await?.check(&spec)?;
        Ok(())
    }

    pub async fn up(&self, dir: &Path) -> ComposeResult<()> {
        self.checked(self.spec(dir, &["up", "-d"], self.up_timeout))
            .await
    }

    pub async fn down(&self, dir: &Path) -> ComposeResult<()> {
        self.checked(self.spec(dir, &["down"], self.timeout)).await
    }

    pub async fn stop(&self, dir: &Path, service: Option<&str>) -> ComposeResult<()> {
        self.checked(self.spec(dir, &with_service("stop", service), self.timeout))
            .await
    }

    pub async fn start(&self, dir: &Path, service: Option<&str>) -> ComposeResult<()> {
        self.checked(self.spec(dir, &with_service("start", service), self.timeout))
            .await
    }

    pub async fn restart(&self, dir: &Path, service: Option<&str>) -> ComposeResult<()> {
        self.checked(self.spec(dir, &with_service("restart", service), self.timeout))
            .await
    }

    /// Bring `service` to exactly `replicas` containers without touching
    /// the ones already running.
    pub async fn scale(&self, dir: &Path, service: &str, replicas: u32) -> ComposeResult<()> {
        let target = format!("{service}={replicas}");
        self.checked(self.spec(
            dir,
            &["up", "-d", "--no-recreate", "--scale", &target, service],
            self.up_timeout,
        ))
        .await
    }

    pub async fn pull(&self, dir: &Path) -> ComposeResult<()> {
        self.checked(self.spec(dir, &["pull"], self.up_timeout))
            .await
    }

    /// Tail of a service's container logs. The raw output is returned so
    /// the caller can tell a timeout apart from other failures.
    pub async fn logs(&self, dir: &Path, service: &str) -> ComposeResult<CommandOutput> {
        let tail = format!("--tail={}", self.log_tail);
        let spec = self
            .spec(dir, &["logs", "--no-color", &tail, service], self.timeout)
            .captured();
        self.runner.run(spec).await
    }
}

fn with_service<'a>(verb: &'a str, service: Option<&'a str>) -> Vec<&'a str> {
    let mut args = vec![verb];
    args.extend(service);
    args
}
