use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of human review task; one editor per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Transcript,
    Ner,
    Segmentation,
    Ocr,
}

impl TaskType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transcript => "transcript",
            Self::Ner => "ner",
            Self::Segmentation => "segmentation",
            Self::Ocr => "ocr",
        }
    }

    /// Whether `document` carries anything worth sending to a reviewer.
    ///
    /// Documents without reviewable data skip the review step and are
    /// passed through unchanged.
    pub fn has_reviewable_data(self, document: &Value) -> bool {
        let non_empty = |value: Option<&Value>| match value {
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            _ => false,
        };

        match self {
            Self::Transcript => {
                non_empty(document.get("entityMap"))
                    && non_empty(document.get("blocks"))
            }
            Self::Ner => document
                .get("annotations")
                .and_then(Value::as_array)
                .and_then(|annotations| annotations.first())
                .is_some_and(|first| first.get("items").is_some()),
            Self::Segmentation => non_empty(document.get("segments")),
            Self::Ocr => non_empty(document.get("frames")),
        }
    }
}

impl std::str::FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "transcript" => Ok(Self::Transcript),
            "ner" => Ok(Self::Ner),
            "segmentation" => Ok(Self::Segmentation),
            "ocr" => Ok(Self::Ocr),
            other => Err(format!("unknown task type: {other}")),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a review task comes from, as passed by the workflow engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewContext {
    pub unit_name: String,
    pub collection_name: String,
    pub item_name: String,
    pub primaryfile_name: String,
    pub workflow_name: String,
}

impl ReviewContext {
    /// Undo the quote escaping the workflow engine applies to names
    /// (`%27` for `'`, `%22` for `"`).
    #[must_use]
    pub fn desanitized(self) -> Self {
        let decode = |text: String| text.replace("%27", "'").replace("%22", "\"");

        Self {
            unit_name: decode(self.unit_name),
            collection_name: decode(self.collection_name),
            item_name: decode(self.item_name),
            primaryfile_name: decode(self.primaryfile_name),
            workflow_name: decode(self.workflow_name),
        }
    }

    pub fn summary(&self) -> String {
        format!("{} - {}", self.primaryfile_name, self.workflow_name)
    }
}

/// The ticket created for a review task, persisted in the caller's task file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub key: String,
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub const fn is_closed(&self) -> bool {
        self.closed_at.is_some()
    }
}
