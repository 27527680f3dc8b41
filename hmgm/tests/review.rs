use amp_job::{Driver, DriverOptions, Job, JobRequest, JobStatus, Mode, RunResult};
use async_trait::async_trait;
use hmgm::{
    complete_path, HmgmConfig, HmgmError, HmgmJob, NewTask, TaskTracker, TrackerConfig,
    CONTEXT_JSON_PARAM, TAG, TASK_JSON_PARAM, TASK_TYPE_PARAM,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use types::TaskRecord;

#[derive(Default)]
struct FakeTracker {
    created: Mutex<Vec<NewTask>>,
    closed: Mutex<Vec<String>>,
    fail_create: bool,
    fail_close: bool,
}

#[async_trait]
impl TaskTracker for FakeTracker {
    async fn create_task(&self, task: &NewTask) -> Result<TaskRecord, HmgmError> {
        if self.fail_create {
            return Err(HmgmError::Tracker("tracker is down".to_string()));
        }

        let mut created = self.created.lock().unwrap();
        created.push(task.clone());
        let key = format!("AMP-{}", created.len());
        Ok(TaskRecord {
            id: created.len().to_string(),
            url: format!("https://tracker.example.org/{key}"),
            key,
            closed_at: None,
        })
    }

    async fn close_task(&self, record: &TaskRecord) -> Result<(), HmgmError> {
        if self.fail_close {
            return Err(HmgmError::Tracker("tracker is down".to_string()));
        }
        self.closed.lock().unwrap().push(record.key.clone());
        Ok(())
    }
}

const CONTEXT: &str = r#"{
    "unitName": "Archives",
    "collectionName": "Bob%27s tapes",
    "itemName": "Tape 1",
    "primaryfileName": "tape1.wav",
    "workflowName": "Transcribe"
}"#;

const REVIEWABLE: &str = r#"{"entityMap": {"0": {"type": "WORD"}}, "blocks": [{"text": "hello"}]}"#;

struct Fixture {
    _dir: TempDir,
    editor_dir: PathBuf,
    input: PathBuf,
    output: PathBuf,
    task_json: PathBuf,
}

impl Fixture {
    fn new(document: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let editor_dir = dir.path().join("hmgm");
        std::fs::create_dir(&editor_dir).unwrap();

        let input = dir.path().join("transcript.json");
        std::fs::write(&input, document).unwrap();

        let task_json = dir.path().join("task.json");
        let output = dir.path().join("reviewed.json");
        // the workflow engine creates outputs empty
        std::fs::write(&task_json, b"").unwrap();
        std::fs::write(&output, b"").unwrap();

        Self {
            editor_dir,
            input,
            output,
            task_json,
            _dir: dir,
        }
    }

    fn request(&self) -> JobRequest {
        JobRequest::new(TAG, vec![self.input.clone()], vec![self.output.clone()])
            .with_param(TASK_TYPE_PARAM, "transcript")
            .with_param(CONTEXT_JSON_PARAM, CONTEXT)
            .with_param(TASK_JSON_PARAM, self.task_json.to_string_lossy())
    }

    fn config(&self, stale_after_secs: u64) -> HmgmConfig {
        HmgmConfig {
            editor_dir: self.editor_dir.clone(),
            tracker: TrackerConfig {
                base_url: "https://tracker.example.org".to_string(),
                api_token: redact::Secret::new("token".to_string()),
            },
            stale_after_secs,
        }
    }

    fn job(&self, tracker: &Arc<FakeTracker>) -> HmgmJob {
        HmgmJob::new(&self.config(3600), tracker.clone(), &self.request()).unwrap()
    }

    fn record(&self) -> TaskRecord {
        serde_json::from_slice(&std::fs::read(&self.task_json).unwrap()).unwrap()
    }
}

#[tokio::test]
async fn test_submit_stages_document_and_opens_ticket() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker = Arc::new(FakeTracker::default());
    let job = fixture.job(&tracker);

    assert_eq!(job.exists().await.unwrap(), JobStatus::Absent);
    assert_eq!(job.submit().await.unwrap(), RunResult::Wait);

    assert_eq!(std::fs::read_to_string(job.staged_path()).unwrap(), REVIEWABLE);
    assert_eq!(fixture.record().key, "AMP-1");
    assert_eq!(job.exists().await.unwrap(), JobStatus::InProgress);

    let created = tracker.created.lock().unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].context.collection_name, "Bob's tapes");
    assert_eq!(created[0].context.summary(), "tape1.wav - Transcribe");
    assert_eq!(created[0].editor_input, job.staged_path());
}

#[tokio::test]
async fn test_nothing_to_review_passes_input_through() {
    let document = r#"{"entityMap": {}, "blocks": []}"#;
    let fixture = Fixture::new(document);
    let tracker = Arc::new(FakeTracker::default());
    let job = fixture.job(&tracker);

    assert_eq!(job.submit().await.unwrap(), RunResult::Ok);
    assert_eq!(std::fs::read_to_string(&fixture.output).unwrap(), document);
    assert!(tracker.created.lock().unwrap().is_empty());
    assert!(!job.staged_path().exists());
}

#[tokio::test]
async fn test_waits_until_editor_completes() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker = Arc::new(FakeTracker::default());
    let job = fixture.job(&tracker);

    job.submit().await.unwrap();
    assert_eq!(job.check().await.unwrap(), RunResult::Wait);

    let reviewed = r#"{"entityMap": {"0": {"type": "WORD"}}, "blocks": [{"text": "hullo"}]}"#;
    std::fs::write(complete_path(job.staged_path()), reviewed).unwrap();

    assert_eq!(job.check().await.unwrap(), RunResult::Ok);
    assert_eq!(std::fs::read_to_string(&fixture.output).unwrap(), reviewed);
    assert!(fixture.record().is_closed());
    assert_eq!(*tracker.closed.lock().unwrap(), vec!["AMP-1".to_string()]);
    assert!(!job.staged_path().exists());
    assert!(!complete_path(job.staged_path()).exists());

    assert_eq!(job.exists().await.unwrap(), JobStatus::Complete);
    // a repeated check of a finished review is still OK
    assert_eq!(job.check().await.unwrap(), RunResult::Ok);
}

#[tokio::test]
async fn test_close_failure_does_not_lose_review() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker = Arc::new(FakeTracker {
        fail_close: true,
        ..FakeTracker::default()
    });
    let job = fixture.job(&tracker);

    job.submit().await.unwrap();
    std::fs::write(complete_path(job.staged_path()), REVIEWABLE).unwrap();

    assert_eq!(job.check().await.unwrap(), RunResult::Ok);
    assert!(std::fs::metadata(&fixture.output).unwrap().len() > 0);
}

#[tokio::test]
async fn test_tracker_failure_rolls_back_staging() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker = Arc::new(FakeTracker {
        fail_create: true,
        ..FakeTracker::default()
    });
    let job = fixture.job(&tracker);

    assert_eq!(job.submit().await.unwrap(), RunResult::Error);
    assert!(!job.staged_path().exists());
    assert_eq!(job.exists().await.unwrap(), JobStatus::Absent);
}

#[tokio::test]
async fn test_racing_submits_open_one_ticket() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker = Arc::new(FakeTracker::default());
    let first = fixture.job(&tracker);
    let second = fixture.job(&tracker);

    let (first_result, second_result) = tokio::join!(first.submit(), second.submit());

    assert_eq!(first_result.unwrap(), RunResult::Wait);
    assert_eq!(second_result.unwrap(), RunResult::Wait);
    assert_eq!(tracker.created.lock().unwrap().len(), 1);
    assert_eq!(fixture.record().key, "AMP-1");
    assert_eq!(std::fs::read_to_string(first.staged_path()).unwrap(), REVIEWABLE);
}

#[tokio::test]
async fn test_staged_document_without_ticket_means_wait() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker = Arc::new(FakeTracker::default());
    let job = fixture.job(&tracker);

    // another invocation has claimed the review but not opened the ticket yet
    std::fs::write(job.staged_path(), b"").unwrap();

    assert_eq!(job.submit().await.unwrap(), RunResult::Wait);
    assert_eq!(job.check().await.unwrap(), RunResult::Wait);
    assert!(tracker.created.lock().unwrap().is_empty());
    assert!(job.staged_path().exists());
}

#[tokio::test]
async fn test_abandoned_submission_is_replaced() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker = Arc::new(FakeTracker::default());
    let job = HmgmJob::new(&fixture.config(0), tracker.clone(), &fixture.request()).unwrap();

    std::fs::write(job.staged_path(), b"partial").unwrap();

    assert_eq!(job.submit().await.unwrap(), RunResult::Wait);
    assert_eq!(std::fs::read_to_string(job.staged_path()).unwrap(), REVIEWABLE);
    assert_eq!(tracker.created.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cleanup_closes_open_ticket() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker = Arc::new(FakeTracker::default());
    let job = fixture.job(&tracker);

    job.submit().await.unwrap();
    job.cleanup().await.unwrap();

    assert!(!job.staged_path().exists());
    assert_eq!(*tracker.closed.lock().unwrap(), vec!["AMP-1".to_string()]);
    assert_eq!(std::fs::metadata(&fixture.task_json).unwrap().len(), 0);
    assert_eq!(job.exists().await.unwrap(), JobStatus::Absent);
    assert!(job.check().await.is_err());
}

#[tokio::test]
async fn test_bad_parameters() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker: Arc<dyn TaskTracker> = Arc::new(FakeTracker::default());
    let config = fixture.config(3600);

    let unknown_type = fixture.request().with_param(TASK_TYPE_PARAM, "faces");
    assert!(HmgmJob::new(&config, tracker.clone(), &unknown_type).is_err());

    let bad_context = fixture.request().with_param(CONTEXT_JSON_PARAM, "{");
    assert!(HmgmJob::new(&config, tracker.clone(), &bad_context).is_err());

    let inputs = vec![fixture.input.clone()];
    let outputs = vec![fixture.output.clone()];
    let no_task_json = JobRequest::new(TAG, inputs, outputs)
        .with_param(TASK_TYPE_PARAM, "ner")
        .with_param(CONTEXT_JSON_PARAM, CONTEXT);
    assert!(HmgmJob::new(&config, tracker, &no_task_json).is_err());
}

#[tokio::test]
async fn test_cooperative_review_lifecycle() {
    let fixture = Fixture::new(REVIEWABLE);
    let tracker = Arc::new(FakeTracker::default());
    let job = fixture.job(&tracker);
    let options = DriverOptions {
        mode: Mode::Cooperative,
        ..DriverOptions::default()
    };
    let artifacts = fixture.request().artifacts(false);

    for _ in 0..2 {
        let result = Driver::new(&job, options.clone())
            .with_artifacts(artifacts.clone())
            .run()
            .await;
        assert_eq!(result, RunResult::Wait);
    }
    assert_eq!(tracker.created.lock().unwrap().len(), 1);

    std::fs::write(complete_path(job.staged_path()), REVIEWABLE).unwrap();

    let result = Driver::new(&job, options)
        .with_artifacts(artifacts)
        .run()
        .await;
    assert_eq!(result, RunResult::Ok);
    assert_eq!(std::fs::read_to_string(&fixture.output).unwrap(), REVIEWABLE);
    assert_eq!(tracker.closed.lock().unwrap().len(), 1);
}
