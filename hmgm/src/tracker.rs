use async_trait::async_trait;
use redact::Secret;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use types::{ReviewContext, TaskRecord, TaskType};

use crate::HmgmError;

/// A review ticket about to be opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub task_type: TaskType,
    pub context: ReviewContext,
    /// The staged document the reviewer opens in the editor
    pub editor_input: PathBuf,
    /// Stable reference to the job, so trackers that support it can
    /// refuse a duplicate ticket.
    pub external_id: String,
}

impl NewTask {
    pub fn description(&self) -> String {
        format!(
            concat!(
                "Review the {} for \"{}\" ({}), collection \"{}\" of unit \"{}\", ",
                "workflow \"{}\".\nEditor input: {}"
            ),
            self.task_type,
            self.context.item_name,
            self.context.primaryfile_name,
            self.context.collection_name,
            self.context.unit_name,
            self.context.workflow_name,
            self.editor_input.display()
        )
    }
}

/// A ticket system the review tasks are tracked in.
#[async_trait]
pub trait TaskTracker: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> Result<TaskRecord, HmgmError>;

    /// Close the ticket. A ticket someone already closed by hand is not an
    /// error.
    async fn close_task(&self, record: &TaskRecord) -> Result<(), HmgmError>;
}

/// The `hmgm.tracker` configuration section.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    pub base_url: String,
    pub api_token: Secret<String>,
}

#[derive(Debug, Serialize)]
struct CreateTaskBody<'a> {
    project: &'a str,
    summary: String,
    description: String,
    labels: [&'static str; 1],
    external_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
    key: String,
    url: String,
}

/// Tracker reached over a JSON REST API:
/// `POST /tasks` opens a ticket, `POST /tasks/{id}/close` closes it.
pub struct RestTracker {
    client: reqwest::Client,
    base_url: String,
    api_token: Secret<String>,
}

impl RestTracker {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
        }
    }

    fn tasks_url(&self) -> String {
        format!("{}/tasks", self.base_url)
    }

    fn close_url(&self, id: &str) -> String {
        format!("{}/tasks/{id}/close", self.base_url)
    }
}

#[async_trait]
impl TaskTracker for RestTracker {
    async fn create_task(&self, task: &NewTask) -> Result<TaskRecord, HmgmError> {
        let body = CreateTaskBody {
            project: &task.context.unit_name,
            summary: task.context.summary(),
            description: task.description(),
            labels: [task.task_type.as_str()],
            external_id: &task.external_id,
        };

        let created = self
            .client
            .post(self.tasks_url())
            .bearer_auth(self.api_token.expose_secret())
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<CreatedTask>()
            .await?;

        tracing::debug!("tracker created ticket {} ({})", created.key, created.id);

        Ok(TaskRecord {
            id: created.id,
            key: created.key,
            url: created.url,
            closed_at: None,
        })
    }

    async fn close_task(&self, record: &TaskRecord) -> Result<(), HmgmError> {
        let response = self
            .client
            .post(self.close_url(&record.id))
            .bearer_auth(self.api_token.expose_secret())
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            tracing::warn!("ticket {} is already closed, probably by hand", record.key);
            return Ok(());
        }

        response.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn context() -> ReviewContext {
        ReviewContext {
            unit_name: "Archives".to_string(),
            collection_name: "Oral histories".to_string(),
            item_name: "Interview 4".to_string(),
            primaryfile_name: "tape4.wav".to_string(),
            workflow_name: "Transcribe".to_string(),
        }
    }

    #[test]
    fn test_urls() {
        let tracker = RestTracker::new(&TrackerConfig {
            base_url: "https://tracker.example.org/api/".to_string(),
            api_token: Secret::new("token".to_string()),
        });

        assert_eq!(tracker.tasks_url(), "https://tracker.example.org/api/tasks");
        assert_eq!(
            tracker.close_url("5f1"),
            "https://tracker.example.org/api/tasks/5f1/close"
        );
    }

    #[test]
    fn test_token_is_redacted() {
        let config = TrackerConfig {
            base_url: "https://tracker.example.org".to_string(),
            api_token: Secret::new("s3cr3t".to_string()),
        };

        assert!(!format!("{config:?}").contains("s3cr3t"));
    }

    #[test]
    fn test_create_body() {
        let task = NewTask {
            task_type: TaskType::Ner,
            context: context(),
            editor_input: PathBuf::from("/hmgm/NER-abc.json"),
            external_id: "HMGM-abc".to_string(),
        };
        let body = CreateTaskBody {
            project: &task.context.unit_name,
            summary: task.context.summary(),
            description: task.description(),
            labels: [task.task_type.as_str()],
            external_id: &task.external_id,
        };

        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["project"], "Archives");
        assert_eq!(value["summary"], "tape4.wav - Transcribe");
        assert_eq!(value["labels"], serde_json::json!(["ner"]));
        assert!(value["description"]
            .as_str()
            .unwrap()
            .contains("/hmgm/NER-abc.json"));
    }
}
