//! Prediction job model

use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

/// One ledger entry per /predict request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub filename: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub upload_date: DateTime<Utc>,
    pub status: JobStatus,
    #[serde(default)]
    pub model_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_urls: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phishing_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legitimate_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "optional_bson_date")]
    pub processed_date: Option<DateTime<Utc>>,
}

/// Counts written on successful completion
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResultCounts {
    pub total_urls: i64,
    pub phishing_count: i64,
    pub legitimate_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Terminal transition applied exactly once to a pending job.
/// Serializes to the fields it sets, `status` included.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "UPPERCASE")]
pub enum JobOutcome {
    Completed {
        #[serde(flatten)]
        counts: ResultCounts,
        #[serde(with = "chrono_datetime_as_bson_datetime")]
        processed_date: DateTime<Utc>,
    },
    Failed {
        error_message: String,
        #[serde(with = "chrono_datetime_as_bson_datetime")]
        processed_date: DateTime<Utc>,
    },
}

impl JobOutcome {
    pub fn completed(counts: ResultCounts) -> Self {
        JobOutcome::Completed {
            counts,
            processed_date: Utc::now(),
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        JobOutcome::Failed {
            error_message: error_message.into(),
            processed_date: Utc::now(),
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Completed { .. } => JobStatus::Completed,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }
}

impl JobRecord {
    /// New job in PENDING state with a fresh id
    pub fn pending(filename: &str, model_version: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.to_string(),
            upload_date: Utc::now(),
            status: JobStatus::Pending,
            model_version: model_version.to_string(),
            total_urls: None,
            phishing_count: None,
            legitimate_count: None,
            accuracy: None,
            error_message: None,
            processed_date: None,
        }
    }

    /// Attach terminal fields and move out of PENDING
    pub fn apply(&mut self, outcome: &JobOutcome) {
        self.status = outcome.status();
        match outcome {
            JobOutcome::Completed { counts, processed_date } => {
                self.total_urls = Some(counts.total_urls);
                self.phishing_count = Some(counts.phishing_count);
                self.legitimate_count = Some(counts.legitimate_count);
                self.accuracy = counts.accuracy;
                self.processed_date = Some(*processed_date);
            }
            JobOutcome::Failed { error_message, processed_date } => {
                self.error_message = Some(error_message.clone());
                self.processed_date = Some(*processed_date);
            }
        }
    }
}

/// `chrono_datetime_as_bson_datetime` lifted over `Option`
mod optional_bson_date {
    use super::chrono_datetime_as_bson_datetime;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    struct Date(#[serde(with = "chrono_datetime_as_bson_datetime")] DateTime<Utc>);

    pub fn serialize<S: Serializer>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => chrono_datetime_as_bson_datetime::serialize(date, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<Date>::deserialize(deserializer)?.map(|Date(date)| date))
    }
}
