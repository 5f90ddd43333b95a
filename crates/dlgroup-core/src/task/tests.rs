use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use crate::config::TaskConfig;
use crate::context::DownloadContext;
use crate::control_file::{control_file_path, ControlFileState, JsonControlFile, ProgressPersistence};
use crate::dependency::ManualGate;
use crate::error::{HandlerError, TaskError};
use crate::handler::{
    HandlerOutcome, InMemoryPreHandler, PostDownloadHandler, SpawnMetadata, UriListPostHandler,
};
use crate::result_code::ResultCode;
use crate::runtime::ProtocolRuntime;

use super::*;

const URI: &str = "https://example.com/pub/file.bin";

fn config(dir: &Path) -> TaskConfig {
    TaskConfig {
        dir: dir.to_path_buf(),
        max_connections: 4,
        ..TaskConfig::default()
    }
}

fn context(dir: &Path, length: Option<u64>) -> DownloadContext {
    let ctx = DownloadContext::from_uris(dir, vec![URI.to_string()], None);
    match length {
        Some(len) => ctx.with_expected_length(len),
        None => ctx,
    }
}

fn task_with(dir: &Path, cfg: TaskConfig, length: Option<u64>) -> DownloadTask {
    let mut ids = TaskIdCounter::default();
    DownloadTask::new(&mut ids, cfg, context(dir, length))
}

fn complete(task: &mut DownloadTask, cmd: &TransferCommand) {
    let bytes = cmd.segment.len();
    task.finish_command(cmd, CommandOutcome::Completed { bytes }).unwrap();
}

#[derive(Default)]
struct Swarm {
    detached: RefCell<Vec<TaskId>>,
}

impl ProtocolRuntime for Swarm {
    fn name(&self) -> &str {
        "swarm"
    }

    fn detach(&self, task: TaskId) {
        self.detached.borrow_mut().push(task);
    }

    fn is_p2p(&self) -> bool {
        true
    }
}

#[test]
fn unknown_length_starts_with_one_command_then_fans_out() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), None);

    let initial = task.create_initial_command().unwrap();
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].kind, CommandKind::Initiate);
    assert_eq!(task.num_command(), 1);
    assert!(task.create_next_command(4).is_empty());

    task.resolve_total_length(1000).unwrap();
    assert_eq!(task.piece_store().unwrap().piece_count(), 4);

    let next = task.create_next_command(4);
    assert_eq!(next.len(), 3);
    assert_eq!(task.num_command(), 4);
    let pieces: Vec<usize> = next.iter().map(|c| c.piece).collect();
    assert_eq!(pieces, vec![1, 2, 3]);
    assert!(next.iter().all(|c| c.kind == CommandKind::FetchSegment));
}

#[test]
fn unknown_length_stream_completes_whole_content() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), None);
    let initial = task.create_initial_command().unwrap();

    task.write_data(0, &[7u8; 100]).unwrap();
    task.finish_command(&initial[0], CommandOutcome::Completed { bytes: 100 })
        .unwrap();

    assert_eq!(task.total_length(), Some(100));
    assert!(task.download_finished());
    assert!(task.all_download_finished());
    assert_eq!(task.download_result(), ResultCode::Finished);
}

#[test]
fn failed_initiate_command_is_reissued() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), None);
    let initial = task.create_initial_command().unwrap();
    task.finish_command(
        &initial[0],
        CommandOutcome::Failed {
            code: ResultCode::NetworkProblem,
        },
    )
    .unwrap();

    let retry = task.create_next_command(4);
    assert_eq!(retry.len(), 1);
    assert_eq!(retry[0].kind, CommandKind::Initiate);
}

#[test]
fn known_length_starts_up_to_concurrency_limit() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TaskConfig {
        piece_length: Some(100),
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));

    let initial = task.create_initial_command().unwrap();
    assert_eq!(initial.len(), 4);
    assert_eq!(task.piece_store().unwrap().piece_count(), 10);
    assert_eq!(initial[1].segment.start, 100);
    assert!(initial.iter().all(|c| c.streaming && c.uri == URI));
    assert!(dir.path().join("file.bin").exists());
}

#[test]
fn adjusted_limit_applies_to_one_call() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TaskConfig {
        max_connections: 2,
        piece_length: Some(100),
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));
    assert_eq!(task.create_initial_command().unwrap().len(), 2);

    assert!(task.create_next_command(5).is_empty());
    assert_eq!(task.create_next_command_with_adj(5, 2).len(), 2);
    assert!(task.create_next_command_with_adj(5, -5).is_empty());
    assert_eq!(task.num_command(), 4);
}

#[test]
fn zero_speed_limit_never_exceeds() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    task.create_initial_command().unwrap();
    task.write_data(0, &[1u8; 1000]).unwrap();

    assert_eq!(task.max_download_speed_limit(), 0);
    assert!(!task.does_download_speed_exceed());
    assert!(task.calculate_stat().download_speed > 0);

    task.set_max_download_speed_limit(10);
    assert!(task.does_download_speed_exceed());
    assert!(!task.does_upload_speed_exceed());
}

#[test]
fn force_halt_releases_runtime_before_more_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    let swarm = Rc::new(Swarm::default());
    let rt: Rc<dyn ProtocolRuntime> = swarm.clone();
    task.attach_runtime(&rt);
    assert!(task.p2p_involved());

    let cmds = task.create_initial_command().unwrap();
    complete(&mut task, &cmds[0]);
    assert_eq!(task.num_command(), 3);

    task.set_force_halt_requested(true, HaltReason::UserRequest);
    assert_eq!(*swarm.detached.borrow(), vec![task.id()]);
    assert!(task.is_halt_requested());
    assert!(task.is_force_halt_requested());
    assert_eq!(task.halt_reason(), Some(HaltReason::UserRequest));
    assert!(task.create_next_command(4).is_empty());
    assert_eq!(task.release_runtime_resource(), None);

    for cmd in &cmds[1..] {
        task.finish_command(
            cmd,
            CommandOutcome::Failed {
                code: ResultCode::NetworkProblem,
            },
        )
        .unwrap();
    }
    assert!(task.is_terminal());
}

#[test]
fn plain_halt_keeps_force_flag_clear() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    task.set_halt_requested(true, HaltReason::ShutdownSignal);
    assert!(task.is_halt_requested());
    assert!(!task.is_force_halt_requested());
    assert!(task.create_initial_command().unwrap().is_empty());
    assert_eq!(task.phase(), TaskPhase::Created);
}

#[test]
fn basename_mismatch_fails_before_any_write() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TaskConfig {
        auto_file_renaming: false,
        ..config(dir.path())
    };
    let mut ids = TaskIdCounter::default();
    let ctx = context(dir.path(), Some(1000)).with_expected_basename("expected.iso");
    let mut task = DownloadTask::new(&mut ids, cfg, ctx);

    let err = task.create_initial_command().unwrap_err();
    assert!(matches!(err, TaskError::ContentMismatch { field: "filename", .. }));
    assert!(task.is_failed());
    assert_ne!(task.download_result(), ResultCode::Finished);
    assert_eq!(task.download_result(), ResultCode::ContentMismatch);
    assert!(!dir.path().join("file.bin").exists());
    assert!(task.write_data(0, b"x").is_err());
}

#[test]
fn length_mismatch_is_fatal_unless_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    task.create_initial_command().unwrap();
    let err = task.resolve_total_length(999).unwrap_err();
    assert!(matches!(err, TaskError::ContentMismatch { field: "length", .. }));

    let cfg = TaskConfig {
        ignore_length_mismatch: true,
        ..config(dir.path())
    };
    let task = task_with(dir.path(), cfg, Some(1000));
    assert!(task.validate_total_length(999).is_ok());
}

#[test]
fn piece_store_and_tracker_are_paired() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    assert!(task.transfer().is_none());
    assert!(task.piece_store().is_none());

    task.create_initial_command().unwrap();
    let t = task.transfer().unwrap();
    assert_eq!(t.pieces().piece_count(), t.segments().segment_count());

    task.drop_piece_storage();
    assert!(task.transfer().is_none());
    assert!(!task.download_finished());
}

#[test]
fn initial_command_runs_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    assert_eq!(task.create_initial_command().unwrap().len(), 4);
    assert!(task.create_initial_command().unwrap().is_empty());
    assert_eq!(task.num_command(), 4);
}

#[test]
#[should_panic(expected = "underflow")]
fn command_counter_underflow_panics() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    task.decrease_num_command();
}

#[test]
fn dependency_gate_holds_task_in_created() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    let (gate, handle) = ManualGate::new();
    task.depends_on(Box::new(gate));

    assert!(!task.is_dependency_resolved());
    assert!(task.create_initial_command().unwrap().is_empty());
    assert_eq!(task.phase(), TaskPhase::Created);

    handle.resolve();
    assert_eq!(task.create_initial_command().unwrap().len(), 4);
    assert_eq!(task.phase(), TaskPhase::Active);
}

#[test]
fn pause_suspends_command_creation() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    let cmds = task.create_initial_command().unwrap();
    complete(&mut task, &cmds[0]);

    task.set_pause_requested(true);
    assert!(task.is_pause_requested());
    assert!(task.create_next_command(4).is_empty());

    task.set_pause_requested(false);
    assert_eq!(task.run_state(), RunState::Running);
    assert!(task.create_next_command(4).is_empty(), "all pieces assigned or done");
    assert_eq!(task.num_command(), 3);
}

#[test]
fn resume_skips_completed_pieces() {
    let dir = tempfile::tempdir().unwrap();
    let mut first = task_with(dir.path(), config(dir.path()), Some(1000));
    let cmds = first.create_initial_command().unwrap();
    complete(&mut first, &cmds[0]);
    complete(&mut first, &cmds[1]);
    first.set_halt_requested(true, HaltReason::ShutdownSignal);
    for cmd in &cmds[2..] {
        first
            .finish_command(
                cmd,
                CommandOutcome::Failed {
                    code: ResultCode::NetworkProblem,
                },
            )
            .unwrap();
    }
    assert!(first.is_terminal());
    first.finalize();
    let control = control_file_path(&dir.path().join("file.bin"));
    assert!(control.exists());

    let mut second = task_with(dir.path(), config(dir.path()), Some(1000));
    let cmds = second.create_initial_command().unwrap();
    let pieces: Vec<usize> = cmds.iter().map(|c| c.piece).collect();
    assert_eq!(pieces, vec![2, 3]);
    assert_eq!(second.completed_length(), 500);
    assert_eq!(second.resume_failure_count(), 0);
}

#[test]
fn resume_adopts_stored_length_for_unknown_length_context() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");
    std::fs::write(&dest, vec![0u8; 1000]).unwrap();
    let state = ControlFileState {
        version: 1,
        uris: vec![URI.to_string()],
        total_length: 1000,
        piece_length: 250,
        bitfield: vec![0b0000_0001],
        files: vec!["file.bin".to_string()],
        upload_length: 0,
    };
    JsonControlFile.save(&state, &control_file_path(&dest)).unwrap();

    let mut task = task_with(dir.path(), config(dir.path()), None);
    let cmds = task.create_initial_command().unwrap();
    assert_eq!(task.total_length(), Some(1000));
    assert_eq!(cmds.len(), 3);
    assert!(cmds.iter().all(|c| c.kind == CommandKind::FetchSegment));
}

#[test]
fn incompatible_control_file_is_discarded() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");
    let stale = ControlFileState {
        version: 1,
        uris: vec![URI.to_string()],
        total_length: 4000,
        piece_length: 1000,
        bitfield: vec![0xf0],
        files: vec!["file.bin".to_string()],
        upload_length: 0,
    };
    JsonControlFile.save(&stale, &control_file_path(&dest)).unwrap();

    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    let cmds = task.create_initial_command().unwrap();
    assert_eq!(cmds.len(), 4);
    assert_eq!(task.resume_failure_count(), 1);
    assert_eq!(task.completed_length(), 0);
    assert!(!control_file_path(&dest).exists());
}

#[test]
fn resume_failure_limit_makes_stale_state_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");
    std::fs::write(control_file_path(&dest), b"{ not json").unwrap();

    let cfg = TaskConfig {
        max_resume_failure_tries: 1,
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));
    let err = task.create_initial_command().unwrap_err();
    assert!(matches!(err, TaskError::ResumeInconsistency { .. }));
    assert_eq!(task.download_result(), ResultCode::CannotResume);
    assert!(control_file_path(&dest).exists());
}

#[test]
fn existing_file_is_renamed_when_allowed() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("file.bin"), b"keep me").unwrap();

    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    task.create_initial_command().unwrap();
    assert_eq!(
        task.context().first_file_path(),
        Some(dir.path().join("file.1.bin").as_path())
    );
    assert_eq!(std::fs::read(dir.path().join("file.bin")).unwrap(), b"keep me");
}

#[test]
fn existing_file_without_overwrite_or_rename_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("file.bin"), b"keep me").unwrap();
    let cfg = TaskConfig {
        auto_file_renaming: false,
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));

    let err = task.create_initial_command().unwrap_err();
    assert!(matches!(err, TaskError::SafetyViolation { .. }));
    assert_eq!(task.download_result(), ResultCode::UnsafeDestination);
    assert_eq!(std::fs::read(dir.path().join("file.bin")).unwrap(), b"keep me");
}

#[test]
fn rename_gives_up_after_max_tries() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["file.bin", "file.1.bin", "file.2.bin"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    let cfg = TaskConfig {
        max_auto_rename_tries: 2,
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));
    let err = task.create_initial_command().unwrap_err();
    assert!(matches!(err, TaskError::RenameExhausted { tries: 2, .. }));
    assert_eq!(task.download_result(), ResultCode::FileRenamingFailed);
}

#[test]
fn destination_outside_dir_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let mut ids = TaskIdCounter::default();
    let ctx = context(other.path(), Some(1000));
    let mut task = DownloadTask::new(&mut ids, config(dir.path()), ctx);

    let err = task.create_initial_command().unwrap_err();
    assert!(matches!(err, TaskError::SafetyViolation { .. }));
    assert!(!other.path().join("file.bin").exists());
}

#[test]
fn not_found_limit_fails_task() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TaskConfig {
        max_file_not_found: 2,
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));
    let cmds = task.create_initial_command().unwrap();

    task.finish_command(&cmds[0], CommandOutcome::NotFound).unwrap();
    assert_eq!(task.file_not_found_count(), 1);
    let err = task.finish_command(&cmds[1], CommandOutcome::NotFound).unwrap_err();
    assert!(matches!(err, TaskError::FileNotFoundExceeded { count: 2, limit: 2 }));
    assert_eq!(task.download_result(), ResultCode::MaxFileNotFound);
    assert!(task.create_next_command(4).is_empty());
}

#[test]
fn not_found_is_tolerated_after_progress() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TaskConfig {
        max_file_not_found: 1,
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));
    let cmds = task.create_initial_command().unwrap();
    task.write_data(0, &[0u8; 250]).unwrap();
    assert!(task.finish_command(&cmds[1], CommandOutcome::NotFound).is_ok());
}

#[test]
fn most_recent_uri_result_wins_until_finished() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    assert_eq!(task.download_result(), ResultCode::UnknownError);

    let cmds = task.create_initial_command().unwrap();
    task.finish_command(&cmds[0], CommandOutcome::Failed { code: ResultCode::NetworkProblem })
        .unwrap();
    task.finish_command(&cmds[1], CommandOutcome::Failed { code: ResultCode::TimeOut })
        .unwrap();
    assert_eq!(task.download_result(), ResultCode::TimeOut);
    assert_eq!(task.uri_results().len(), 2);

    for cmd in task.create_next_command(4) {
        complete(&mut task, &cmd);
    }
    for cmd in &cmds[2..] {
        complete(&mut task, cmd);
    }
    assert!(task.all_download_finished());
    assert_eq!(task.download_result(), ResultCode::Finished);
}

#[test]
fn finalize_removes_control_file_and_applies_remote_time() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TaskConfig {
        remote_time: true,
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));
    let cmds = task.create_initial_command().unwrap();
    complete(&mut task, &cmds[0]);
    task.save_control_file().unwrap();
    let dest = dir.path().join("file.bin");
    assert!(control_file_path(&dest).exists());

    let stamp = SystemTime::UNIX_EPOCH + Duration::from_secs(1_600_000_000);
    task.update_last_modified_time(stamp - Duration::from_secs(60));
    task.update_last_modified_time(stamp);
    task.update_last_modified_time(stamp - Duration::from_secs(3600));
    assert_eq!(task.last_modified_time(), Some(stamp));

    for cmd in &cmds[1..] {
        complete(&mut task, cmd);
    }
    let result = task.finalize();
    assert_eq!(result.result, ResultCode::Finished);
    assert_eq!(result.completed_length, 1000);
    assert_eq!(task.phase(), TaskPhase::Done);
    assert!(!control_file_path(&dest).exists());
    let mtime = std::fs::metadata(&dest).unwrap().modified().unwrap();
    assert_eq!(mtime, stamp);
}

#[test]
fn accept_types_are_a_set() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), None);
    assert!(task.accepts_type("text/html"));
    assert!(task.add_accept_type("application/metalink4+xml"));
    assert!(!task.add_accept_type("application/metalink4+xml"));
    assert_eq!(task.accept_types().count(), 1);
    assert!(!task.accepts_type("text/html"));
    assert!(task.remove_accept_type("application/metalink4+xml"));
}

fn uri_list_task(dir: &Path, ids: &mut TaskIdCounter, content: &[u8]) -> DownloadTask {
    let cfg = TaskConfig {
        max_connections: 1,
        ..config(dir)
    };
    let ctx = DownloadContext::from_uris(dir, vec!["https://example.com/mirrors.uris".into()], None)
        .with_expected_length(content.len() as u64);
    let mut task = DownloadTask::new(ids, cfg, ctx);
    task.add_pre_download_handler(Box::new(InMemoryPreHandler::new(vec![".uris".into()])));
    task.add_post_download_handler(Box::new(UriListPostHandler::new(vec![".uris".into()])));
    task
}

#[test]
fn uri_list_spawns_children_after_finish() {
    let dir = tempfile::tempdir().unwrap();
    let mut ids = TaskIdCounter::default();
    let content = b"https://a.test/x.iso https://b.test/x.iso\n# skip\nhttps://c.test/y.bin\n";
    let mut task = uri_list_task(dir.path(), &mut ids, content);

    let cmds = task.create_initial_command().unwrap();
    assert!(task.in_memory_download());
    assert!(!task.is_save_control_file_enabled());
    assert_eq!(cmds.len(), 1);
    assert!(task.post_download_processing(&mut ids).is_empty());
    assert!(task.child_ids().is_empty());

    task.write_data(0, content).unwrap();
    complete(&mut task, &cmds[0]);
    assert!(task.download_finished());

    let children = task.post_download_processing(&mut ids);
    assert_eq!(children.len(), 2);
    assert_eq!(task.child_ids(), &[children[0].id(), children[1].id()]);
    for child in &children {
        assert_eq!(child.parent_id(), task.id());
        assert!(child.id() > task.id());
        assert_eq!(child.metadata().unwrap().origin_task, task.id());
    }
    assert_eq!(children[0].context().uris().len(), 2);
    assert!(Rc::ptr_eq(
        children[0].metadata().unwrap(),
        children[1].metadata().unwrap()
    ));

    task.finalize();
    let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(leftovers.is_empty(), "in-memory download touched the disk");
}

struct SpawnThenFail;

impl PostDownloadHandler for SpawnThenFail {
    fn name(&self) -> &'static str {
        "spawn-then-fail"
    }

    fn apply(&self, task: &DownloadTask, spawner: &mut Spawner<'_>) -> Result<HandlerOutcome, HandlerError> {
        let metadata = Rc::new(SpawnMetadata {
            origin_task: task.id(),
            origin_uri: None,
            handler: self.name(),
        });
        let ctx = DownloadContext::from_uris(&task.config().dir, vec![URI.into()], None);
        spawner.spawn(task.config().clone(), ctx, metadata);
        Err(HandlerError::new(self.name(), "boom"))
    }
}

#[test]
fn failing_post_handler_is_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let mut ids = TaskIdCounter::default();
    let content = b"https://c.test/y.bin\n";
    let mut task = uri_list_task(dir.path(), &mut ids, content);
    task.clear_post_download_handlers();
    task.add_post_download_handler(Box::new(SpawnThenFail));
    task.add_post_download_handler(Box::new(UriListPostHandler::new(vec![".uris".into()])));

    let cmds = task.create_initial_command().unwrap();
    task.write_data(0, content).unwrap();
    complete(&mut task, &cmds[0]);

    let children = task.post_download_processing(&mut ids);
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].context().uris(), &["https://c.test/y.bin".to_string()]);
    assert_eq!(task.download_result(), ResultCode::Finished);
}

#[test]
fn control_file_save_load_and_double_remove() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    let cmds = task.create_initial_command().unwrap();
    complete(&mut task, &cmds[2]);
    task.save_control_file().unwrap();

    let path = task.control_file_path().unwrap();
    let state = JsonControlFile.load(&path).unwrap().unwrap();
    assert_eq!(state.total_length, 1000);
    assert_eq!(state.files, vec!["file.bin".to_string()]);
    assert_eq!(state.completed_pieces(), 1);

    task.remove_control_file().unwrap();
    task.remove_control_file().unwrap();
    assert!(!path.exists());
}

#[test]
fn in_memory_task_never_saves_control_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(100));
    task.mark_in_memory_download();
    task.create_initial_command().unwrap();
    task.save_control_file().unwrap();
    assert!(!task.control_file_path().unwrap().exists());
    assert!(!dir.path().join("file.bin").exists());
}

#[test]
fn draining_commands_do_not_mask_failure() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = TaskConfig {
        max_file_not_found: 1,
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));
    let cmds = task.create_initial_command().unwrap();
    assert!(task.finish_command(&cmds[0], CommandOutcome::NotFound).is_err());
    task.finish_command(&cmds[1], CommandOutcome::Failed { code: ResultCode::TimeOut })
        .unwrap();
    assert_eq!(task.last_uri_result().unwrap().code, ResultCode::MaxFileNotFound);
    assert_eq!(task.download_result(), ResultCode::MaxFileNotFound);
}

#[test]
fn in_memory_completion_counts_pieces_not_buffer_size() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    task.mark_in_memory_download();
    let cmds = task.create_initial_command().unwrap();
    assert_eq!(cmds.len(), 4);

    let last = &cmds[3];
    task.write_data(last.segment.start, &vec![9u8; last.segment.len() as usize])
        .unwrap();
    complete(&mut task, last);
    assert!(!task.download_finished());
    assert_eq!(task.completed_length(), 250);

    for cmd in &cmds[..3] {
        task.finish_command(
            cmd,
            CommandOutcome::Failed {
                code: ResultCode::NetworkProblem,
            },
        )
        .unwrap();
    }
    assert!(!task.all_download_finished());
    assert!(!task.is_terminal());
    assert_eq!(task.download_result(), ResultCode::NetworkProblem);

    let retry: Vec<usize> = task.create_next_command(4).iter().map(|c| c.piece).collect();
    assert_eq!(retry, vec![0, 1, 2]);
}

#[test]
fn stream_connections_follow_streaming_commands() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    let cmds = task.create_initial_command().unwrap();
    assert!(cmds.iter().all(|c| c.streaming));
    assert_eq!(task.num_stream_connection(), 4);

    complete(&mut task, &cmds[0]);
    task.finish_command(&cmds[1], CommandOutcome::NotFound).unwrap();
    assert_eq!(task.num_stream_connection(), 2);
    assert!(task.num_stream_connection() <= task.num_command());

    let more = task.create_next_command(4);
    assert_eq!(more.len(), 1);
    assert_eq!(task.num_stream_connection(), 3);
    assert_eq!(task.num_command(), 3);
}

#[test]
fn non_streaming_commands_leave_stream_count_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut ids = TaskIdCounter::default();
    let ctx = DownloadContext::from_uris(dir.path(), vec!["s3://bucket/file.bin".into()], None)
        .with_expected_length(1000);
    let mut task = DownloadTask::new(&mut ids, config(dir.path()), ctx);

    let cmds = task.create_initial_command().unwrap();
    assert_eq!(cmds.len(), 4);
    assert!(cmds.iter().all(|c| !c.streaming));
    assert_eq!(task.num_stream_connection(), 0);
    complete(&mut task, &cmds[0]);
    assert_eq!(task.num_stream_connection(), 0);
}

#[test]
fn control_file_without_destination_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");
    let mut first = task_with(dir.path(), config(dir.path()), Some(1000));
    let cmds = first.create_initial_command().unwrap();
    for cmd in &cmds {
        complete(&mut first, cmd);
    }
    first.save_control_file().unwrap();
    first.close_file();
    drop(first);
    std::fs::remove_file(&dest).unwrap();
    assert!(control_file_path(&dest).exists());

    let mut second = task_with(dir.path(), config(dir.path()), Some(1000));
    let cmds = second.create_initial_command().unwrap();
    assert_eq!(cmds.len(), 4);
    assert_eq!(second.completed_length(), 0);
    assert!(!second.download_finished());
    assert_eq!(second.resume_failure_count(), 0);
    assert!(!control_file_path(&dest).exists());
}

#[test]
fn existing_file_of_expected_length_is_already_complete() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("file.bin");
    std::fs::write(&dest, vec![1u8; 1000]).unwrap();

    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    let cmds = task.create_initial_command().unwrap();
    assert!(cmds.is_empty());
    assert!(task.all_download_finished());
    assert!(task.is_terminal());
    assert_eq!(task.context().first_file_path(), Some(dest.as_path()));

    let result = task.finalize();
    assert_eq!(result.result, ResultCode::Finished);
    assert_eq!(result.completed_length, 1000);
    assert_eq!(std::fs::read(&dest).unwrap(), vec![1u8; 1000]);
}

#[test]
fn existing_file_of_expected_length_is_refetched_when_overwriting() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("file.bin"), vec![1u8; 1000]).unwrap();
    let cfg = TaskConfig {
        allow_overwrite: true,
        ..config(dir.path())
    };
    let mut task = task_with(dir.path(), cfg, Some(1000));
    assert_eq!(task.create_initial_command().unwrap().len(), 4);
    assert!(!task.download_finished());
}

#[test]
fn writes_past_known_length_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), Some(1000));
    task.create_initial_command().unwrap();

    assert!(matches!(task.write_data(990, &[0u8; 20]), Err(TaskError::Storage(_))));
    assert!(matches!(task.write_data(u64::MAX, &[0u8; 1]), Err(TaskError::Storage(_))));
    task.write_data(990, &[0u8; 10]).unwrap();
    assert_eq!(task.calculate_stat().session_download_length, 10);
}

#[test]
fn in_memory_writes_without_length_must_be_contiguous() {
    let dir = tempfile::tempdir().unwrap();
    let mut task = task_with(dir.path(), config(dir.path()), None);
    task.mark_in_memory_download();
    task.create_initial_command().unwrap();

    task.write_data(0, &[1u8; 10]).unwrap();
    task.write_data(10, &[2u8; 5]).unwrap();
    assert!(matches!(task.write_data(20, &[3u8; 1]), Err(TaskError::Storage(_))));
    assert!(matches!(
        task.write_data(u64::MAX - 1, &[3u8; 4]),
        Err(TaskError::Storage(_))
    ));
    assert_eq!(task.in_memory_content().map(<[u8]>::len), Some(15));
}
