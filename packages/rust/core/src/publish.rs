//! Publish Gate and the git publish collaborator.
//!
//! Only a [`SuperBundleSummary`] can reach the gate, and the gate refuses any
//! archive that does not live directly in the super-bundle directory. Unit and
//! bundle archives therefore never get staged.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use hashstack_artifacts::SuperBundleSummary;
use hashstack_shared::{HashstackError, PublishConfig, Result};

// ---------------------------------------------------------------------------
// Collaborator
// ---------------------------------------------------------------------------

/// What the collaborator is asked to publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub super_index: u32,
    pub archive_path: PathBuf,
    pub top_level_hash: String,
}

/// Successful collaborator outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published { commit_message: String },
    NothingToPublish,
}

/// External publish capability: stage, commit and push one archive.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome>;

    fn name(&self) -> &str;
}

/// Publishes through the `git` binary in a working copy.
pub struct GitPublisher {
    repo_dir: PathBuf,
    remote: String,
    branch: String,
    commit_prefix: String,
}

impl GitPublisher {
    pub fn new(config: &PublishConfig) -> Self {
        Self {
            repo_dir: config.repo_dir.clone(),
            remote: config.remote.clone(),
            branch: config.branch.clone(),
            commit_prefix: config.commit_prefix.clone(),
        }
    }

    pub fn commit_message(&self, request: &PublishRequest) -> String {
        format!(
            "{} super_{:04} hash={}",
            self.commit_prefix, request.super_index, request.top_level_hash
        )
    }

    async fn git(&self, step: &str, args: &[&str]) -> Result<Output> {
        debug!(step, ?args, "running git");
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .await
            .map_err(|e| {
                HashstackError::publish(step, format!("failed to run git: {e}. Is git installed?"))
            })
    }

    async fn git_ok(&self, step: &str, args: &[&str]) -> Result<()> {
        let output = self.git(step, args).await?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(HashstackError::publish(step, stderr.trim().to_string()))
    }
}

/// True when `git push --porcelain` output updated no ref. Ref lines are
/// `<flag>\t<from>:<to>\t<summary>`; `=` marks a ref already up to date.
fn push_was_noop(porcelain: &str) -> bool {
    porcelain
        .lines()
        .filter(|line| line.as_bytes().get(1) == Some(&b'\t'))
        .all(|line| line.starts_with('='))
}

#[async_trait]
impl Publisher for GitPublisher {
    async fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome> {
        let dir = request.archive_path.parent().ok_or_else(|| {
            HashstackError::publish("add", format!("{} has no parent", request.archive_path.display()))
        })?;
        let dir = std::fs::canonicalize(dir).map_err(|e| HashstackError::io(dir, e))?;
        let dir = dir.to_string_lossy().into_owned();

        self.git_ok("add", &["add", "-f", "--", dir.as_str()]).await?;

        // Only the super-bundle directory is compared and committed; anything
        // else already in the index stays staged and local.
        let diff = self
            .git("diff", &["diff", "--cached", "--quiet", "--", dir.as_str()])
            .await?;
        let message = self.commit_message(request);
        let committed = match diff.status.code() {
            Some(0) => false,
            Some(1) => {
                self.git_ok("commit", &["commit", "-m", message.as_str(), "--", dir.as_str()])
                    .await?;
                true
            }
            _ => {
                let stderr = String::from_utf8_lossy(&diff.stderr);
                return Err(HashstackError::publish("diff", stderr.trim().to_string()));
            }
        };

        // Push even without a new commit: an earlier push may have failed.
        let push = self
            .git(
                "push",
                &["push", "--porcelain", self.remote.as_str(), self.branch.as_str()],
            )
            .await?;
        let stdout = String::from_utf8_lossy(&push.stdout);
        if !push.status.success() || stdout.lines().any(|line| line.starts_with("!\t")) {
            let stderr = String::from_utf8_lossy(&push.stderr);
            let detail = if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() };
            return Err(HashstackError::publish("push", detail.to_string()));
        }

        if !committed && push_was_noop(&stdout) {
            return Ok(PublishOutcome::NothingToPublish);
        }
        Ok(PublishOutcome::Published {
            commit_message: message,
        })
    }

    fn name(&self) -> &str {
        "git"
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// What the gate reports back. Never an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishReport {
    Published { commit_message: String },
    NothingToPublish,
    Disabled,
    /// The gate was never reached because the run produced no super-bundle.
    Skipped { reason: String },
    Rejected { reason: String },
    Failed { step: String, message: String },
}

impl PublishReport {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Rejected { .. } | Self::Failed { .. })
    }
}

impl std::fmt::Display for PublishReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Published { commit_message } => write!(f, "published ({commit_message})"),
            Self::NothingToPublish => f.write_str("nothing to publish"),
            Self::Disabled => f.write_str("publishing disabled"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
            Self::Rejected { reason } => write!(f, "rejected: {reason}"),
            Self::Failed { step, message } => write!(f, "failed during {step}: {message}"),
        }
    }
}

/// Hands super-bundle archives, and nothing else, to a [`Publisher`].
pub struct PublishGate {
    publisher: Arc<dyn Publisher>,
    super_dir: PathBuf,
    enabled: bool,
}

impl PublishGate {
    pub fn new(publisher: Arc<dyn Publisher>, super_dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            publisher,
            super_dir: super_dir.into(),
            enabled,
        }
    }

    /// Publish one super-bundle. Failures are reported, never retried.
    #[instrument(skip_all, fields(super_index = summary.super_index, hash = %summary.super_hash, publisher = self.publisher.name()))]
    pub async fn submit(&self, summary: &SuperBundleSummary) -> PublishReport {
        if !self.enabled {
            info!("publishing disabled, archive stays local");
            return PublishReport::Disabled;
        }

        if !is_directly_inside(&self.super_dir, &summary.archive_path) {
            let reason = format!(
                "{} is not inside {}",
                summary.archive_path.display(),
                self.super_dir.display()
            );
            warn!(%reason, "refusing to publish");
            return PublishReport::Rejected { reason };
        }

        let request = PublishRequest {
            super_index: summary.super_index,
            archive_path: summary.archive_path.clone(),
            top_level_hash: summary.super_hash.clone(),
        };

        match self.publisher.publish(&request).await {
            Ok(PublishOutcome::Published { commit_message }) => {
                info!(%commit_message, "super-bundle published");
                PublishReport::Published { commit_message }
            }
            Ok(PublishOutcome::NothingToPublish) => {
                info!("nothing to publish");
                PublishReport::NothingToPublish
            }
            Err(HashstackError::Publish { step, message }) => {
                warn!(%step, %message, "publish failed");
                PublishReport::Failed { step, message }
            }
            Err(e) => {
                warn!(error = %e, "publish failed");
                PublishReport::Failed {
                    step: "publish".into(),
                    message: e.to_string(),
                }
            }
        }
    }
}

fn is_directly_inside(dir: &Path, file: &Path) -> bool {
    let Some(parent) = file.parent() else {
        return false;
    };
    match (std::fs::canonicalize(dir), std::fs::canonicalize(parent)) {
        (Ok(dir), Ok(parent)) => dir == parent,
        _ => dir == parent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hashstack-publish-test-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Records requests and answers from a fixed script.
    struct FakePublisher {
        calls: Mutex<Vec<PublishRequest>>,
        result: fn() -> Result<PublishOutcome>,
    }

    impl FakePublisher {
        fn new(result: fn() -> Result<PublishOutcome>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                result,
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome> {
            self.calls.lock().unwrap().push(request.clone());
            (self.result)()
        }

        fn name(&self) -> &str {
            "fake"
        }
    }

    fn summary_in(dir: &Path) -> SuperBundleSummary {
        SuperBundleSummary {
            super_index: 3,
            super_hash: "ab".repeat(32),
            bundle_hashes: vec![],
            archive_path: dir.join("super_0003_10.zip"),
        }
    }

    #[tokio::test]
    async fn publishes_super_bundle_once() {
        let tmp = temp_dir();
        let publisher = FakePublisher::new(|| {
            Ok(PublishOutcome::Published {
                commit_message: "msg".into(),
            })
        });
        let gate = PublishGate::new(publisher.clone(), &tmp, true);

        let report = gate.submit(&summary_in(&tmp)).await;
        assert!(matches!(report, PublishReport::Published { .. }));
        assert_eq!(publisher.call_count(), 1);

        let calls = publisher.calls.lock().unwrap();
        assert_eq!(calls[0].top_level_hash, "ab".repeat(32));
        assert_eq!(calls[0].super_index, 3);
        drop(calls);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn rejects_archives_outside_super_dir() {
        let tmp = temp_dir();
        let super_dir = tmp.join("super");
        let bundles_dir = tmp.join("bundles");
        std::fs::create_dir_all(&super_dir).unwrap();
        std::fs::create_dir_all(&bundles_dir).unwrap();

        let publisher = FakePublisher::new(|| Ok(PublishOutcome::NothingToPublish));
        let gate = PublishGate::new(publisher.clone(), &super_dir, true);

        let report = gate.submit(&summary_in(&bundles_dir)).await;
        assert!(matches!(report, PublishReport::Rejected { .. }));
        assert!(report.is_failure());
        assert_eq!(publisher.call_count(), 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn failure_is_reported_not_retried() {
        let tmp = temp_dir();
        let publisher = FakePublisher::new(|| Err(HashstackError::publish("push", "remote hung up")));
        let gate = PublishGate::new(publisher.clone(), &tmp, true);

        let report = gate.submit(&summary_in(&tmp)).await;
        assert_eq!(
            report,
            PublishReport::Failed {
                step: "push".into(),
                message: "remote hung up".into()
            }
        );
        assert_eq!(publisher.call_count(), 1);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn disabled_gate_never_calls_publisher() {
        let tmp = temp_dir();
        let publisher = FakePublisher::new(|| Ok(PublishOutcome::NothingToPublish));
        let gate = PublishGate::new(publisher.clone(), &tmp, false);

        assert_eq!(gate.submit(&summary_in(&tmp)).await, PublishReport::Disabled);
        assert_eq!(publisher.call_count(), 0);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    fn git_available() -> bool {
        std::process::Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git_output(dir: &Path, args: &[&str]) -> String {
        let output = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(output.status.success(), "git {args:?} failed");
        String::from_utf8(output.stdout).unwrap()
    }

    fn git(dir: &Path, args: &[&str]) {
        git_output(dir, args);
    }

    /// Working copy with an `origin` bare remote and an archive in
    /// `infinity_tokens/super`. Returns (work, remote, summary).
    fn git_fixture(tmp: &Path) -> (PathBuf, PathBuf, SuperBundleSummary) {
        let remote = tmp.join("remote.git");
        let work = tmp.join("work");
        std::fs::create_dir_all(&remote).unwrap();
        std::fs::create_dir_all(&work).unwrap();

        git(&remote, &["init", "--bare", "-q"]);
        git(&work, &["init", "-q"]);
        git(&work, &["config", "user.email", "hashstack@example.com"]);
        git(&work, &["config", "user.name", "hashstack"]);
        git(&work, &["config", "commit.gpgsign", "false"]);
        let remote_url = remote.to_string_lossy().into_owned();
        git(&work, &["remote", "add", "origin", remote_url.as_str()]);

        let super_dir = work.join("infinity_tokens").join("super");
        std::fs::create_dir_all(&super_dir).unwrap();
        let summary = summary_in(&super_dir);
        std::fs::write(&summary.archive_path, b"archive bytes").unwrap();

        (work, remote, summary)
    }

    fn git_gate(work: &Path, summary: &SuperBundleSummary) -> PublishGate {
        let config = PublishConfig {
            repo_dir: work.to_path_buf(),
            ..PublishConfig::default()
        };
        let publisher = Arc::new(GitPublisher::new(&config));
        let super_dir = summary.archive_path.parent().unwrap().to_path_buf();
        PublishGate::new(publisher, super_dir, true)
    }

    /// Commit subjects and file names that reached the remote.
    fn remote_log(remote: &Path) -> String {
        git_output(remote, &["log", "--all", "--name-only", "--format=%s"])
    }

    #[test]
    fn porcelain_noop_detection() {
        let up_to_date = "To /tmp/remote.git\n=\tHEAD:refs/heads/main\t[up to date]\nDone\n";
        let pushed = "To /tmp/remote.git\n \tHEAD:refs/heads/main\tabc..def\nDone\n";
        let created = "To /tmp/remote.git\n*\tHEAD:refs/heads/main\t[new branch]\nDone\n";

        assert!(push_was_noop(up_to_date));
        assert!(!push_was_noop(pushed));
        assert!(!push_was_noop(created));
    }

    #[tokio::test]
    async fn git_publisher_commits_then_reports_nothing_to_publish() {
        if !git_available() {
            return;
        }
        let tmp = temp_dir();
        let (work, remote, summary) = git_fixture(&tmp);
        let gate = git_gate(&work, &summary);

        let first = gate.submit(&summary).await;
        match &first {
            PublishReport::Published { commit_message } => {
                assert!(commit_message.starts_with("[Infinity Grand Master] super_0003 hash="));
            }
            other => panic!("expected publish, got {other:?}"),
        }
        assert!(remote_log(&remote).contains("super_0003_10.zip"));

        let second = gate.submit(&summary).await;
        assert_eq!(second, PublishReport::NothingToPublish);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn commit_left_by_failed_push_is_pushed_next_time() {
        if !git_available() {
            return;
        }
        let tmp = temp_dir();
        let (work, remote, summary) = git_fixture(&tmp);
        let gate = git_gate(&work, &summary);

        git(&work, &["remote", "set-url", "origin", "/nonexistent/remote.git"]);
        let first = gate.submit(&summary).await;
        assert!(
            matches!(&first, PublishReport::Failed { step, .. } if step == "push"),
            "{first:?}"
        );
        assert!(remote_log(&remote).is_empty());

        let remote_url = remote.to_string_lossy().into_owned();
        git(&work, &["remote", "set-url", "origin", remote_url.as_str()]);
        let second = gate.submit(&summary).await;
        assert!(matches!(second, PublishReport::Published { .. }), "{second:?}");
        let log = remote_log(&remote);
        assert!(log.contains("super_0003 hash="), "{log}");
        assert!(log.contains("super_0003_10.zip"), "{log}");

        assert_eq!(gate.submit(&summary).await, PublishReport::NothingToPublish);

        let _ = std::fs::remove_dir_all(&tmp);
    }

    #[tokio::test]
    async fn staged_bundle_archives_stay_local() {
        if !git_available() {
            return;
        }
        let tmp = temp_dir();
        let (work, remote, summary) = git_fixture(&tmp);
        let gate = git_gate(&work, &summary);

        let bundles_dir = work.join("infinity_tokens").join("bundles");
        std::fs::create_dir_all(&bundles_dir).unwrap();
        std::fs::write(bundles_dir.join("bundle_0001_10.zip"), b"local only").unwrap();
        git(&work, &["add", "-f", "infinity_tokens/bundles/bundle_0001_10.zip"]);

        let report = gate.submit(&summary).await;
        assert!(matches!(report, PublishReport::Published { .. }), "{report:?}");

        let log = remote_log(&remote);
        assert!(log.contains("infinity_tokens/super/super_0003_10.zip"), "{log}");
        assert!(!log.contains("bundle_0001_10.zip"), "{log}");

        let staged = git_output(&work, &["diff", "--cached", "--name-only"]);
        assert!(staged.contains("infinity_tokens/bundles/bundle_0001_10.zip"));

        let _ = std::fs::remove_dir_all(&tmp);
    }
}
