//! End-to-end tests for the composition and execution pipeline.
//!
//! These tests drive the full flow across the workspace crates:
//! 1. Resolve project ids through a storage resolver
//! 2. Detect the project flavor from marker files
//! 3. Assemble the component graph into a schematic
//! 4. Build the image and synchronize mounts (recorded docker/rsync)
//! 5. Execute scripts and inspect structured results
//!
//! The external control plane is a recording executor, so build and sync
//! invocation counts are observable.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use cradle_common::config::CradleConfig;
use cradle_common::error::CradleError;
use cradle_common::types::ContainerName;
use cradle_docker::process::{CommandExecutor, RecordingExecutor};
use cradle_exec::{DockerEnv, PersistentEnv};
use cradle_schematic::catalog::universal_schematic;
use cradle_schematic::{ProjectDef, ProjectDir, ProjectKind};
use cradle_storage::StorageResolver;

fn uv_project_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("pyproject.toml"),
        "[project]\nname = \"demo\"\ndependencies = [\"requests\"]\n\n[tool.uv]\ndev-dependencies = []\n",
    )
    .expect("write pyproject");
    dir
}

fn resolver_for(id: &str, path: &Path) -> Arc<StorageResolver> {
    Arc::new(StorageResolver::from_map(HashMap::from([(
        id.to_owned(),
        path.to_path_buf(),
    )])))
}

async fn demo_env(executor: &Arc<RecordingExecutor>, dir: &Path) -> DockerEnv {
    let config = CradleConfig::default();
    let project = ProjectDef::new(vec![ProjectDir::new("demo", ProjectKind::Uv)]);
    let resolver = resolver_for("demo", dir);
    let schematic = universal_schematic(&project, &config, &resolver)
        .await
        .expect("schematic");
    DockerEnv::new(
        project,
        schematic,
        &config,
        resolver,
        Arc::clone(executor) as Arc<dyn CommandExecutor>,
    )
}

// ── Composition ──────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_uv_detection_feeds_the_schematic() {
    let dir = uv_project_dir();
    let config = CradleConfig::default();
    let project = ProjectDef::new(vec![ProjectDir::new("demo", ProjectKind::Auto)]);
    let resolver = resolver_for("demo", dir.path());

    let schematic = universal_schematic(&project, &config, &resolver)
        .await
        .expect("schematic");

    let preview = schematic.dockerfile_preview();
    assert!(preview.starts_with("FROM ubuntu:22.04 AS base\n"));
    assert!(preview.contains("astral.sh/uv/install.sh"));
    assert!(schematic.init_commands.contains(&"uv sync".to_owned()));
    assert!(schematic.init_commands.contains(&"cd /sources/demo".to_owned()));
}

#[tokio::test]
async fn pipeline_detection_priority_prefers_uv_over_setup_py() {
    let dir = uv_project_dir();
    std::fs::write(dir.path().join("setup.py"), "from setuptools import setup\n")
        .expect("write setup.py");

    let config = CradleConfig::default();
    let project = ProjectDef::new(vec![ProjectDir::new("demo", ProjectKind::Auto)]);
    let resolver = resolver_for("demo", dir.path());

    let schematic = universal_schematic(&project, &config, &resolver)
        .await
        .expect("schematic");
    assert!(schematic.init_commands.contains(&"uv sync".to_owned()));
    assert!(!schematic.init_commands.contains(&"pip install -e .".to_owned()));
}

// ── Execution ────────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_echo_hello_returns_its_stdout() {
    let dir = uv_project_dir();
    let executor = Arc::new(RecordingExecutor::new());
    executor.respond("docker run", RecordingExecutor::ok("hello\n"));
    let env = demo_env(&executor, dir.path()).await;

    let result = env.run_script("echo hello").await.expect("run");
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.exit_code, 0);
    assert!(result.success());

    // The transient container is removed on exit and the script travels
    // base64-encoded through the installed runner.
    let run_cmd = executor
        .commands()
        .into_iter()
        .find(|c| c.contains("docker run"))
        .expect("run command");
    assert!(run_cmd.contains("--rm"));
    assert!(run_cmd.contains("bash /usr/local/bin/cradle-runner.sh "));
}

#[tokio::test]
async fn pipeline_exit_3_is_a_result_not_an_error() {
    let dir = uv_project_dir();
    let executor = Arc::new(RecordingExecutor::new());
    executor.respond("docker run", RecordingExecutor::fail(3, ""));
    let env = demo_env(&executor, dir.path()).await;

    let result = env.run_script("exit 3").await.expect("run");
    assert_eq!(result.exit_code, 3);
    assert!(!result.success());
}

#[tokio::test]
async fn pipeline_unknown_id_fails_with_the_offending_id() {
    let resolver = StorageResolver::from_map(HashMap::from([
        ("a".to_owned(), "/srv/a".into()),
        ("b".to_owned(), "/srv/b".into()),
    ]));

    let err = resolver.locate("missing").await.unwrap_err();
    match err {
        CradleError::UnknownId { id } => assert_eq!(id, "missing"),
        other => panic!("unexpected error: {other}"),
    }
}

// ── Preparation amortization ─────────────────────────────────────────

#[tokio::test]
async fn pipeline_concurrent_prepares_build_and_sync_once() {
    let dir = uv_project_dir();
    let executor = Arc::new(RecordingExecutor::new());
    let env = Arc::new(demo_env(&executor, dir.path()).await);

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..16 {
        let env = Arc::clone(&env);
        let _ = tasks.spawn(async move { env.prepare().await });
    }
    while let Some(joined) = tasks.join_next().await {
        let _ = joined.expect("join").expect("prepare");
    }

    assert_eq!(executor.count_matching("docker build"), 1);
    // One sync pass per resolve mount, regardless of caller count.
    assert_eq!(
        executor.count_matching("rsync -a --delete"),
        env.schematic()
            .mounts
            .iter()
            .filter(|m| matches!(m, cradle_schematic::MountRequest::Resolve { .. }))
            .count()
    );
}

#[tokio::test]
async fn pipeline_repeated_scripts_reuse_the_preparation() {
    let dir = uv_project_dir();
    let executor = Arc::new(RecordingExecutor::new());
    let env = demo_env(&executor, dir.path()).await;

    let _ = env.run_script("true").await.expect("first");
    let _ = env.run_script("true").await.expect("second");
    let _ = env.run_script("true").await.expect("third");

    assert_eq!(executor.count_matching("docker build"), 1);
    assert_eq!(executor.count_matching("docker run"), 3);
}

// ── Persistent environment ───────────────────────────────────────────

#[tokio::test]
async fn pipeline_persistent_stop_then_run_recreates() {
    let dir = uv_project_dir();
    let executor = Arc::new(RecordingExecutor::new());
    executor.enqueue("ps -a", RecordingExecutor::ok(""));
    executor.respond(
        "ps -a",
        RecordingExecutor::ok(r#"{"Names":"demo-live","State":"running"}"#),
    );
    executor.respond("docker exec demo-live", RecordingExecutor::ok("ok\n"));

    let config = CradleConfig::default();
    let project = ProjectDef::new(vec![ProjectDir::new("demo", ProjectKind::Uv)]);
    let resolver = resolver_for("demo", dir.path());
    let schematic = universal_schematic(&project, &config, &resolver)
        .await
        .expect("schematic");
    let env = PersistentEnv::new(
        project,
        schematic,
        &config,
        resolver,
        Arc::clone(&executor) as Arc<dyn CommandExecutor>,
        ContainerName::new("demo-live"),
    );

    let first = env.run_script("echo ok").await.expect("first run");
    assert_eq!(first.stdout, "ok\n");

    env.stop().await.expect("stop");
    executor.enqueue("ps -a", RecordingExecutor::ok(""));

    let second = env.run_script("echo ok").await.expect("recreated run");
    assert_eq!(second.stdout, "ok\n");

    assert_eq!(executor.count_matching("docker run -d --rm --name demo-live"), 2);
    assert_eq!(executor.count_matching("docker build"), 1);
}
