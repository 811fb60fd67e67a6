//! End-to-end checks of the tick loop and rebuild protocol against real files

#![cfg(unix)]

use rand::rngs::StdRng;
use rand::SeedableRng;
use reforge::codec::{Artifact, ConfigBlock, Markers};
use reforge::error::ReplaceError;
use reforge::learning::{observe_reward, RewardSource};
use reforge::memory::{StateSnapshot, StateStore};
use reforge::rebuild::{CommandBuild, CycleOutcome, ProcessReplacer, RebuildController, RebuildState};
use reforge::{Agent, FatalError};
use std::convert::Infallible;
use std::ffi::OsStr;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Stands in for exec: records what the next generation would see, then fails
struct RecordingReplacer {
    state_path: PathBuf,
    seen: Arc<Mutex<Vec<(PathBuf, StateSnapshot)>>>,
}

impl RecordingReplacer {
    fn new(state_path: &Path) -> Self {
        Self {
            state_path: state_path.to_path_buf(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl ProcessReplacer for RecordingReplacer {
    fn replace(&self, exe: &Path, _argv0: &OsStr) -> Result<Infallible, ReplaceError> {
        // A fresh mapping is exactly what the exec'd binary would get
        let next_generation = StateStore::open(&self.state_path).unwrap().snapshot();
        self.seen.lock().unwrap().push((exe.to_path_buf(), next_generation));
        Err(ReplaceError::Exec {
            path: exe.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "recorded"),
        })
    }
}

fn write_artifact(path: &Path, probability: f64, interval: u64) -> String {
    let text = format!(
        "# tuning\n# BEGIN CONFIG\nLEARNING_RATE=0.050000\nMUTATION_PROB={:.6}\nRECOMPILE_INTERVAL={}\n# END CONFIG\n# trailer\n",
        probability, interval
    );
    std::fs::write(path, &text).unwrap();
    text
}

fn fake_executable(dir: &Path) -> PathBuf {
    let path = dir.join("reforge-next");
    std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn test_fresh_state_first_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.dat");
    assert!(!path.exists());

    let mut store = StateStore::open(&path).unwrap();
    assert_eq!(store.snapshot(), StateSnapshot::defaults());

    observe_reward(&mut store, 1.0, 1.0, 0.05).unwrap();
    assert!((store.weight() - 0.145).abs() < 1e-12);
    assert!((store.bias() - 0.045).abs() < 1e-12);
    assert!((store.running_reward() - 0.01).abs() < 1e-12);
}

#[tokio::test]
async fn test_no_mutation_when_draw_exceeds_probability() {
    let dir = tempfile::tempdir().unwrap();
    let artifact_path = dir.path().join("tuning.cfg");
    // Probability 0: every draw is >= p
    let original = write_artifact(&artifact_path, 0.0, 10);
    let state_path = dir.path().join("state.dat");

    let controller = RebuildController::new(
        Artifact::new(&artifact_path, Markers::default()),
        // Would surface as BuildFailed if it were ever invoked
        CommandBuild::new("false"),
        RecordingReplacer::new(&state_path),
        StdRng::seed_from_u64(1),
    )
    .with_target(fake_executable(dir.path()));

    let mut agent = Agent::new(
        StateStore::open(&state_path).unwrap(),
        controller,
        RewardSource::default(),
        StdRng::seed_from_u64(2),
    );

    for expected in 1..=10u64 {
        let report = agent.tick().await.unwrap();
        assert_eq!(report.iteration, expected);
        if expected == 10 {
            assert!(matches!(report.outcome, CycleOutcome::Skipped { .. }));
        } else {
            assert!(matches!(report.outcome, CycleOutcome::NotDue));
        }
    }

    assert_eq!(agent.controller().state(), RebuildState::Running);
    assert_eq!(std::fs::read_to_string(&artifact_path).unwrap(), original);
    assert_eq!(agent.store().iteration(), 10);
}

#[tokio::test]
async fn test_state_survives_into_next_generation() {
    let dir = tempfile::tempdir().unwrap();
    let artifact_path = dir.path().join("tuning.cfg");
    write_artifact(&artifact_path, 1.0, 3);
    let state_path = dir.path().join("state.dat");
    let target = fake_executable(dir.path());
    let replacer = RecordingReplacer::new(&state_path);
    let seen = Arc::clone(&replacer.seen);

    let controller = RebuildController::new(
        Artifact::new(&artifact_path, Markers::default()),
        CommandBuild::new("true"),
        replacer,
        StdRng::seed_from_u64(3),
    )
    .with_target(&target);

    let mut agent = Agent::new(
        StateStore::open(&state_path).unwrap(),
        controller,
        RewardSource::default(),
        StdRng::seed_from_u64(4),
    );

    agent.tick().await.unwrap();
    agent.tick().await.unwrap();
    let err = agent.tick().await.unwrap_err();
    assert!(matches!(err, FatalError::Replace(_)));
    assert_eq!(agent.controller().state(), RebuildState::Replacing);

    // The replacement saw the flushed record, not a stale one
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (exe, next_generation) = &seen[0];
    assert_eq!(exe, &target);
    assert_eq!(*next_generation, agent.store().snapshot());
    assert_eq!(next_generation.iteration, 3);

    // Artifact was rewritten before the build, trailer intact
    let text = std::fs::read_to_string(&artifact_path).unwrap();
    assert!(text.ends_with("# END CONFIG\n# trailer\n"));
    let block = ConfigBlock::parse(&text);
    assert!(block.mutation_probability <= 0.99);
    assert!(block.recompile_interval >= 1);
}

#[tokio::test]
async fn test_build_failure_keeps_running_on_new_config() {
    let dir = tempfile::tempdir().unwrap();
    let artifact_path = dir.path().join("tuning.cfg");
    write_artifact(&artifact_path, 1.0, 2);
    let state_path = dir.path().join("state.dat");

    let controller = RebuildController::new(
        Artifact::new(&artifact_path, Markers::default()),
        CommandBuild::new("sh").arg("-c").arg("exit 2"),
        RecordingReplacer::new(&state_path),
        StdRng::seed_from_u64(5),
    )
    .with_target(fake_executable(dir.path()));

    let mut agent = Agent::new(
        StateStore::open(&state_path).unwrap(),
        controller,
        RewardSource::default(),
        StdRng::seed_from_u64(6),
    );

    agent.tick().await.unwrap();
    let report = agent.tick().await.unwrap();
    assert!(matches!(report.outcome, CycleOutcome::BuildFailed(_)));

    let on_disk = Artifact::new(&artifact_path, Markers::default()).load().unwrap();
    assert_eq!(*agent.controller().config(), on_disk);
    assert_eq!(agent.controller().state(), RebuildState::Running);

    // Loop keeps going on the current process
    let report = agent.tick().await.unwrap();
    assert_eq!(report.iteration, 3);
}

#[test]
fn test_reopen_after_restart_keeps_progress() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.dat");

    {
        let mut store = StateStore::open(&path).unwrap();
        for _ in 0..5 {
            store.advance_iteration();
        }
        store.set_scratch("before restart");
        observe_reward(&mut store, 0.5, 0.4, 0.05).unwrap();
    }

    let store = StateStore::open(&path).unwrap();
    assert_eq!(store.iteration(), 5);
    assert_eq!(store.scratch(), "before restart");
    assert!(store.weight() != 0.1);
}
