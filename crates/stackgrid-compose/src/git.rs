//! Source-control commands used to materialise repository checkouts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::error::ComposeResult;
use crate::runner::{CommandRunner, CommandSpec};

/// Branch cloned when a repository records none.
pub const DEFAULT_BRANCH: &str = "master";

#[derive(Clone)]
pub struct Git {
    runner: Arc<dyn CommandRunner>,
    program: String,
    timeout: Duration,
}

impl Git {
    pub fn new(runner: Arc<dyn CommandRunner>, program: &str, timeout: Duration) -> Self {
        Self {
            runner,
            program: program.to_string(),
            timeout,
        }
    }

    async fn checked(&self, spec: CommandSpec) -> ComposeResult<()> {
        info!(command = %spec.display(), cwd = ?spec.cwd, "running git");
        self.runner.run(spec.clone()).await?.check(&spec)?;
        Ok(())
    }

    /// Clone `location` at `branch` (or [`DEFAULT_BRANCH`]) into `dest`.
    pub async fn clone(&self, location: &str, branch: Option<&str>, dest: &Path) -> ComposeResult<()> {
        let mut spec = CommandSpec::new(&self.program, self.timeout).args([
            "clone",
            "--branch",
            branch.unwrap_or(DEFAULT_BRANCH),
            location,
        ]);
        spec = spec.arg(dest.to_string_lossy());
        if let Some(parent) = dest.parent() {
            spec = spec.current_dir(parent);
        }
        self.checked(spec).await
    }

    pub async fn fetch(&self, dir: &Path) -> ComposeResult<()> {
        self.checked(
            CommandSpec::new(&self.program, self.timeout)
                .args(["fetch", "origin"])
                .current_dir(dir),
        )
        .await
    }

    /// Hard-reset the checkout to `origin/<branch>`, or to the upstream of
    /// the current branch when no branch is recorded.
    pub async fn reset_hard(&self, dir: &Path, branch: Option<&str>) -> ComposeResult<()> {
        let target = match branch {
            Some(branch) => format!("origin/{branch}"),
            None => "@{upstream}".to_string(),
        };
        self.checked(
            CommandSpec::new(&self.program, self.timeout)
                .args(["reset", "--hard", &target])
                .current_dir(dir),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::runner::CommandOutput;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<CommandSpec>>);

    #[async_trait]
    impl CommandRunner for Recorder {
        async fn run(&self, spec: CommandSpec) -> ComposeResult<CommandOutput> {
            self.0.lock().unwrap().push(spec);
            Ok(CommandOutput::exited(0))
        }
    }

    #[tokio::test]
    async fn clone_defaults_to_master() {
        let recorder = Arc::new(Recorder::default());
        let git = Git::new(recorder.clone(), "git", Duration::from_secs(5));

        git.clone("https://example.org/app.git", None, Path::new("/data/p1"))
            .await
            .unwrap();
        git.clone("https://example.org/app.git", Some("prod"), Path::new("/data/p2"))
            .await
            .unwrap();

        let specs = recorder.0.lock().unwrap();
        assert_eq!(
            specs[0].args,
            ["clone", "--branch", "master", "https://example.org/app.git", "/data/p1"]
        );
        assert_eq!(specs[0].cwd.as_deref(), Some(Path::new("/data")));
        assert_eq!(specs[1].args[2], "prod");
    }

    #[tokio::test]
    async fn reset_targets_branch_or_upstream() {
        let recorder = Arc::new(Recorder::default());
        let git = Git::new(recorder.clone(), "git", Duration::from_secs(5));
        let dir = Path::new("/data/p1");

        git.fetch(dir).await.unwrap();
        git.reset_hard(dir, Some("prod")).await.unwrap();
        git.reset_hard(dir, None).await.unwrap();

        let specs = recorder.0.lock().unwrap();
        assert_eq!(specs[0].args, ["fetch", "origin"]);
        assert_eq!(specs[1].args, ["reset", "--hard", "origin/prod"]);
        assert_eq!(specs[2].args, ["reset", "--hard", "@{upstream}"]);
    }
}
