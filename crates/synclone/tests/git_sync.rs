//! End-to-end tests against real git repositories.
//!
//! Each test builds a seed work tree and bare "remote" repositories inside a
//! temporary directory, so nothing touches the network. Tests return early
//! when no `git` binary is installed.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use synclone::executor::{ALREADY_CLONED_REASON, ExecOutcome, Git, partial_path};
use synclone::platform::{
    self, CloneUrls, PlatformClient, RepoPage, RepositoryDescriptor, UserInfo, Visibility,
    VisibilityFilter,
};
use synclone::state::MemoryStore;
use synclone::{
    Action, GitExecutor, Protocol, Provider, RepoExecutor, RunController, RunOptions, RunTarget,
    StateStore, Strategy, TaskError,
};

/// Upper bound for any single test; a hang means a git prompt or a deadlock.
const TEST_TIMEOUT: Duration = Duration::from_secs(60);

const GIT_ENV: [(&str, &str); 6] = [
    ("GIT_AUTHOR_NAME", "Synclone Test"),
    ("GIT_AUTHOR_EMAIL", "test@example.com"),
    ("GIT_COMMITTER_NAME", "Synclone Test"),
    ("GIT_COMMITTER_EMAIL", "test@example.com"),
    ("GIT_CONFIG_NOSYSTEM", "1"),
    ("GIT_CONFIG_GLOBAL", "/dev/null"),
];

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .is_ok_and(|out| out.status.success())
}

macro_rules! require_git {
    () => {
        if !git_available() {
            eprintln!("git not found, skipping");
            return;
        }
    };
}

fn git_status(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .envs(GIT_ENV)
        .output()
        .expect("failed to spawn git")
}

fn git(dir: &Path, args: &[&str]) -> String {
    let out = git_status(dir, args);
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn write(dir: &Path, file: &str, contents: &str) {
    let path = dir.join(file);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}

fn read(dir: &Path, file: &str) -> String {
    std::fs::read_to_string(dir.join(file)).unwrap()
}

fn commit_all(dir: &Path, message: &str) -> String {
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "-q", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

fn executor() -> GitExecutor {
    let git = GIT_ENV
        .iter()
        .fold(Git::new(), |git, (k, v)| git.with_env(*k, *v));
    GitExecutor::new(Protocol::Https).with_git(git)
}

/// A seed work tree plus bare remotes cloned from it.
struct Fixture {
    dir: TempDir,
    seed: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let seed = dir.path().join("seed");
        std::fs::create_dir(&seed).unwrap();
        git(&seed, &["init", "-q"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        write(&seed, "README.md", "hello\n");
        write(&seed, "src/lib.rs", "pub fn answer() -> u32 {\n    42\n}\n");
        commit_all(&seed, "initial");

        let fixture = Self { dir, seed };
        let remote = fixture.remote_path("api");
        git(fixture.dir.path(), &[
            "clone",
            "-q",
            "--bare",
            fixture.seed.to_str().unwrap(),
            remote.to_str().unwrap(),
        ]);
        git(&fixture.seed, &["remote", "add", "origin", remote.to_str().unwrap()]);
        fixture
    }

    fn remote_path(&self, name: &str) -> PathBuf {
        self.dir.path().join("remotes").join(format!("{name}.git"))
    }

    /// Another bare remote with the seed's current history.
    fn add_remote(&self, name: &str) {
        let remote = self.remote_path(name);
        git(self.dir.path(), &[
            "clone",
            "-q",
            "--bare",
            self.seed.to_str().unwrap(),
            remote.to_str().unwrap(),
        ]);
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("work")
    }

    fn descriptor(&self, name: &str) -> RepositoryDescriptor {
        RepositoryDescriptor {
            provider: Provider::GitHub,
            organization: "acme".to_string(),
            namespace: "acme".to_string(),
            name: name.to_string(),
            default_branch: "main".to_string(),
            visibility: Visibility::Public,
            archived: false,
            fork: false,
            language: None,
            size_kb: None,
            star_count: None,
            updated_at: None,
            topics: Vec::new(),
            clone_urls: CloneUrls {
                https: self.remote_path(name).to_string_lossy().into_owned(),
                ssh: None,
            },
        }
    }

    /// Commit `contents` to `file` in the seed and push it to the `api` remote.
    fn push_upstream(&self, file: &str, contents: &str) -> String {
        write(&self.seed, file, contents);
        let head = commit_all(&self.seed, "upstream change");
        git(&self.seed, &["push", "-q", "origin", "main"]);
        head
    }
}

async fn with_timeout<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(TEST_TIMEOUT, future)
        .await
        .expect("test timed out")
}

#[tokio::test]
async fn absent_repository_is_cloned_without_leftovers() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");

    let outcome = with_timeout(executor().execute(&repo, &path, Strategy::Reset))
        .await
        .unwrap();

    assert_eq!(outcome, ExecOutcome::Synced(Action::Clone));
    assert_eq!(read(&path, "README.md"), "hello\n");
    assert!(!partial_path(&path).exists());
}

#[tokio::test]
async fn fetch_twice_only_moves_remote_tracking_refs() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&repo, &path, Strategy::Fetch))
        .await
        .unwrap();
    let head = git(&path, &["rev-parse", "HEAD"]);
    write(&path, "notes.txt", "local notes\n");
    let upstream = fx.push_upstream("README.md", "changed upstream\n");

    for _ in 0..2 {
        let outcome = with_timeout(exec.execute(&repo, &path, Strategy::Fetch))
            .await
            .unwrap();
        assert_eq!(outcome, ExecOutcome::Synced(Action::Fetch));
        assert_eq!(git(&path, &["rev-parse", "HEAD"]), head);
        assert_eq!(git(&path, &["rev-parse", "origin/main"]), upstream);
        assert_eq!(read(&path, "README.md"), "hello\n");
        assert_eq!(read(&path, "notes.txt"), "local notes\n");
    }
}

#[tokio::test]
async fn reset_on_dirty_clone_matches_a_fresh_clone() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&repo, &path, Strategy::Reset))
        .await
        .unwrap();
    write(&path, "src/lib.rs", "pub fn answer() -> u32 {\n    7\n}\n");
    commit_all(&path, "local commit");
    write(&path, "README.md", "uncommitted edit\n");
    std::fs::remove_file(path.join("src/lib.rs")).unwrap();
    fx.push_upstream("README.md", "hello again\n");

    let outcome = with_timeout(exec.execute(&repo, &path, Strategy::Reset))
        .await
        .unwrap();
    assert_eq!(outcome, ExecOutcome::Synced(Action::Reset));

    let fresh = fx.root().join("fresh");
    with_timeout(exec.execute(&repo, &fresh, Strategy::Clone))
        .await
        .unwrap();

    assert_eq!(
        git(&path, &["rev-parse", "HEAD"]),
        git(&fresh, &["rev-parse", "HEAD"])
    );
    for file in ["README.md", "src/lib.rs"] {
        assert_eq!(read(&path, file), read(&fresh, file), "{file}");
    }
    assert_eq!(git(&path, &["status", "--porcelain", "--untracked-files=no"]), "");
    assert_eq!(git(&path, &["symbolic-ref", "--short", "HEAD"]), "main");
}

#[tokio::test]
async fn pull_fast_forwards_a_clean_clone() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&repo, &path, Strategy::Pull))
        .await
        .unwrap();
    let upstream = fx.push_upstream("README.md", "hello again\n");

    let outcome = with_timeout(exec.execute(&repo, &path, Strategy::Pull))
        .await
        .unwrap();
    assert_eq!(outcome, ExecOutcome::Synced(Action::Pull));
    assert_eq!(git(&path, &["rev-parse", "HEAD"]), upstream);
}

#[tokio::test]
async fn pull_conflict_is_aborted_without_losing_work() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&repo, &path, Strategy::Pull))
        .await
        .unwrap();
    write(&path, "README.md", "local version\n");
    let local = commit_all(&path, "local edit");
    fx.push_upstream("README.md", "upstream version\n");

    let err = with_timeout(exec.execute(&repo, &path, Strategy::Pull))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::MergeConflict), "{err}");
    assert!(!err.is_retryable());
    assert_eq!(read(&path, "README.md"), "local version\n");
    assert_eq!(read(&path, "src/lib.rs"), "pub fn answer() -> u32 {\n    42\n}\n");
    assert_eq!(git(&path, &["rev-parse", "HEAD"]), local);
    assert!(!git_status(&path, &["rev-parse", "-q", "--verify", "MERGE_HEAD"]).status.success());
    assert_eq!(git(&path, &["status", "--porcelain"]), "");
}

#[tokio::test]
async fn rebase_conflict_is_aborted_without_losing_work() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&repo, &path, Strategy::Rebase))
        .await
        .unwrap();
    write(&path, "README.md", "local version\n");
    let local = commit_all(&path, "local edit");
    fx.push_upstream("README.md", "upstream version\n");

    let err = with_timeout(exec.execute(&repo, &path, Strategy::Rebase))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::RebaseConflict), "{err}");
    assert_eq!(read(&path, "README.md"), "local version\n");
    assert_eq!(git(&path, &["rev-parse", "HEAD"]), local);
    assert_eq!(git(&path, &["symbolic-ref", "--short", "HEAD"]), "main");
    assert!(!path.join(".git/rebase-merge").exists());
    assert!(!path.join(".git/rebase-apply").exists());
}

/// The work tree holds no conflict markers, no unmerged entries and no
/// leftover stash.
fn assert_no_conflict_residue(path: &Path) {
    assert!(!read(path, "README.md").contains("<<<<<<<"));
    assert_eq!(git(path, &["diff", "--name-only", "--diff-filter=U"]), "");
    assert_eq!(git(path, &["stash", "list"]), "");
}

#[tokio::test]
async fn pull_conflicting_with_uncommitted_edits_restores_them() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&repo, &path, Strategy::Pull))
        .await
        .unwrap();
    let before = git(&path, &["rev-parse", "HEAD"]);
    write(&path, "README.md", "uncommitted local\n");
    write(&path, "notes.txt", "scratch\n");
    write(&path, "src/extra.rs", "pub fn extra() {}\n");
    git(&path, &["add", "src/extra.rs"]);
    fx.push_upstream("README.md", "upstream version\n");

    let err = with_timeout(exec.execute(&repo, &path, Strategy::Pull))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::MergeConflict), "{err}");
    assert_eq!(read(&path, "README.md"), "uncommitted local\n");
    assert_eq!(read(&path, "notes.txt"), "scratch\n");
    assert_eq!(git(&path, &["diff", "--cached", "--name-only"]), "src/extra.rs");
    assert_eq!(git(&path, &["rev-parse", "HEAD"]), before);
    assert_no_conflict_residue(&path);
}

#[tokio::test]
async fn rebase_conflicting_with_uncommitted_edits_restores_them() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&repo, &path, Strategy::Rebase))
        .await
        .unwrap();
    let before = git(&path, &["rev-parse", "HEAD"]);
    write(&path, "README.md", "uncommitted local\n");
    fx.push_upstream("README.md", "upstream version\n");

    let err = with_timeout(exec.execute(&repo, &path, Strategy::Rebase))
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::RebaseConflict), "{err}");
    assert_eq!(read(&path, "README.md"), "uncommitted local\n");
    assert_eq!(git(&path, &["rev-parse", "HEAD"]), before);
    assert_eq!(git(&path, &["symbolic-ref", "--short", "HEAD"]), "main");
    assert!(!path.join(".git/rebase-merge").exists());
    assert_no_conflict_residue(&path);
}

#[tokio::test]
async fn pull_carries_unrelated_uncommitted_edits_forward() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&repo, &path, Strategy::Pull))
        .await
        .unwrap();
    write(&path, "src/lib.rs", "pub fn answer() -> u32 {\n    7\n}\n");
    write(&path, "notes.txt", "scratch\n");
    let upstream = fx.push_upstream("README.md", "upstream version\n");

    let outcome = with_timeout(exec.execute(&repo, &path, Strategy::Pull))
        .await
        .unwrap();

    assert_eq!(outcome, ExecOutcome::Synced(Action::Pull));
    assert_eq!(git(&path, &["rev-parse", "HEAD"]), upstream);
    assert_eq!(read(&path, "README.md"), "upstream version\n");
    assert_eq!(read(&path, "src/lib.rs"), "pub fn answer() -> u32 {\n    7\n}\n");
    assert_eq!(read(&path, "notes.txt"), "scratch\n");
    assert_no_conflict_residue(&path);
}

#[tokio::test]
async fn clone_strategy_leaves_present_repository_alone() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("api");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&repo, &path, Strategy::Clone))
        .await
        .unwrap();
    fx.push_upstream("README.md", "hello again\n");

    let outcome = with_timeout(exec.execute(&repo, &path, Strategy::Clone))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ExecOutcome::Skipped(ALREADY_CLONED_REASON.to_string())
    );
    assert_eq!(read(&path, "README.md"), "hello\n");
}

#[tokio::test]
async fn foreign_checkout_is_not_touched() {
    require_git!();
    let fx = Fixture::new();
    fx.add_remote("web");
    let path = fx.root().join("api");
    let exec = executor();

    with_timeout(exec.execute(&fx.descriptor("api"), &path, Strategy::Reset))
        .await
        .unwrap();
    write(&path, "README.md", "keep me\n");

    let err = with_timeout(exec.execute(&fx.descriptor("web"), &path, Strategy::Reset))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::RemoteMismatch { .. }), "{err}");
    assert!(!err.is_retryable());
    assert_eq!(read(&path, "README.md"), "keep me\n");
}

#[tokio::test]
async fn failed_clone_leaves_nothing_behind() {
    require_git!();
    let fx = Fixture::new();
    let repo = fx.descriptor("missing");
    let path = fx.root().join("missing");

    let result = with_timeout(executor().execute(&repo, &path, Strategy::Reset)).await;

    assert!(result.is_err());
    assert!(!path.exists());
    assert!(!partial_path(&path).exists());
}

struct FixedClient {
    repos: Vec<RepositoryDescriptor>,
}

#[async_trait]
impl PlatformClient for FixedClient {
    fn provider(&self) -> Provider {
        Provider::GitHub
    }

    async fn authenticate(&self) -> platform::Result<UserInfo> {
        Ok(UserInfo {
            username: "bot".to_string(),
            name: None,
        })
    }

    async fn list_repositories(
        &self,
        _org: &str,
        _page: u32,
        _page_size: u32,
        _visibility: VisibilityFilter,
    ) -> platform::Result<RepoPage> {
        Ok(RepoPage {
            items: self.repos.clone(),
            next_page: None,
            rate_limit: None,
        })
    }
}

#[tokio::test]
async fn controller_clones_then_updates_every_repository() {
    require_git!();
    let fx = Fixture::new();
    fx.add_remote("web");
    let client = FixedClient {
        repos: vec![fx.descriptor("api"), fx.descriptor("web")],
    };
    let store = Arc::new(MemoryStore::new());
    let controller = RunController::new(
        Arc::new(client),
        Arc::new(executor()),
        Arc::clone(&store) as Arc<dyn StateStore>,
    );
    let target = RunTarget::new(Provider::GitHub, "acme", fx.root());

    let first = with_timeout(controller.run(&target, &RunOptions::default(), None))
        .await
        .unwrap();
    assert_eq!(first.cloned, 2);
    assert_eq!(first.failed, 0);
    assert!(first.is_success());
    for name in ["api", "web"] {
        assert_eq!(read(&fx.root().join(name), "README.md"), "hello\n");
    }
    // A fully successful run leaves no state behind
    assert!(store.list().await.unwrap().is_empty());

    fx.push_upstream("README.md", "hello again\n");
    let second = with_timeout(controller.run(&target, &RunOptions::default(), None))
        .await
        .unwrap();
    assert_eq!(second.cloned, 0);
    assert_eq!(second.updated, 2);
    assert_eq!(read(&fx.root().join("api"), "README.md"), "hello again\n");
    assert_eq!(read(&fx.root().join("web"), "README.md"), "hello\n");
}

#[tokio::test]
async fn dry_run_reports_plans_without_cloning() {
    require_git!();
    let fx = Fixture::new();
    let client = FixedClient {
        repos: vec![fx.descriptor("api")],
    };
    let store = Arc::new(MemoryStore::new());
    let controller = RunController::new(
        Arc::new(client),
        Arc::new(executor()),
        Arc::clone(&store) as Arc<dyn StateStore>,
    );
    let target = RunTarget::new(Provider::GitHub, "acme", fx.root());
    let options = RunOptions {
        dry_run: true,
        ..RunOptions::default()
    };

    let summary = with_timeout(controller.run(&target, &options, None))
        .await
        .unwrap();

    assert!(summary.dry_run);
    assert_eq!(summary.planned.len(), 1);
    assert_eq!(summary.planned[0].action, Some(Action::Clone));
    assert!(!fx.root().join("api").exists());
    assert_eq!(store.save_count(), 0);
}
