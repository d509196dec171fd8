//! Prediction handler
//!
//! Lifecycle of one upload: reject early (no ledger write) when the service
//! is not initialized or the upload is unusable, otherwise record a PENDING
//! job, score the file and move the job to COMPLETED or FAILED.

use std::path::Path;

use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::{extract::State, Json};

use crate::{AppState, AppError, AppResult};
use crate::models::{JobOutcome, JobRecord};
use crate::predictor::{PredictError, PredictionSummary};

/// Multipart field carrying the CSV
const FILE_FIELD: &str = "file";

struct Upload {
    filename: String,
    data: Vec<u8>,
}

/// Score an uploaded CSV of URL features
pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<PredictionSummary>> {
    let ledger = match &state.ledger {
        Some(ledger) if state.predictor.is_loaded() => ledger.clone(),
        _ => {
            tracing::warn!("Prediction rejected: service not available due to fatal startup error");
            return Err(AppError::ServiceUnavailable);
        }
    };

    let multipart = multipart.map_err(|e| {
        tracing::debug!("Multipart rejected: {}", e);
        AppError::BadRequest("No file part in the request.".to_string())
    })?;
    let upload = read_upload(multipart).await?;

    if !is_csv(&upload.filename) {
        return Err(AppError::BadRequest(
            "Invalid file type. Please upload a CSV file.".to_string(),
        ));
    }

    let record = JobRecord::pending(&upload.filename, state.predictor.model_version());
    let job_id = record.id.clone();
    ledger.create(&record).await?;
    tracing::info!("Processing job {} for file {}...", job_id, upload.filename);

    let predictor = state.predictor.clone();
    let scored = tokio::task::spawn_blocking(move || predictor.predict_csv(&upload.data))
        .await
        .unwrap_or_else(|e| Err(PredictError::Internal(format!("scoring task failed: {}", e))));

    match scored {
        Ok(summary) => {
            ledger.update(&job_id, &JobOutcome::completed(summary.counts())).await?;
            tracing::info!("Job {} completed successfully", job_id);
            Ok(Json(summary))
        }
        Err(err) => {
            tracing::warn!("Job {} failed: {}", job_id, err);
            ledger.update(&job_id, &JobOutcome::failed(err.to_string())).await?;

            match err {
                PredictError::Validation(inner) => Err(AppError::ValidationFailed(inner.to_string())),
                other => Err(AppError::InternalError(format!("job {}: {}", job_id, other))),
            }
        }
    }
}

/// Pull the `file` part out of the form
async fn read_upload(mut multipart: Multipart) -> AppResult<Upload> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        // A plain form value named `file` is not an upload
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        tracing::debug!("Received file: {} ({} bytes)", filename, data.len());
        return Ok(Upload {
            filename,
            data: data.to_vec(),
        });
    }

    Err(AppError::BadRequest("No file part in the request.".to_string()))
}

fn is_csv(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::db::testing::MemoryLedger;
    use crate::features::{csv_with, FEATURE_COUNT, FEATURE_LAYOUT};
    use crate::model::Label;
    use crate::models::JobStatus;
    use crate::predictor::testing::FixedClassifier;
    use crate::predictor::Predictor;

    const BOUNDARY: &str = "phishing-test-boundary";

    fn state_with(labels: Vec<Label>) -> (AppState, Arc<MemoryLedger>) {
        let ledger = Arc::new(MemoryLedger::default());
        let state = AppState {
            predictor: Arc::new(Predictor::new(Box::new(FixedClassifier(labels)), "phishing_detector.json")),
            ledger: Some(ledger.clone()),
        };
        (state, ledger)
    }

    fn upload(filename: &str, csv: &str) -> Request<Body> {
        let payload = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = filename,
            csv = csv,
        );
        multipart_request(payload)
    }

    fn multipart_request(payload: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(payload))
            .unwrap()
    }

    async fn send(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response = crate::create_router(state, 1024 * 1024)
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[test]
    fn test_is_csv() {
        assert!(is_csv("urls.csv"));
        assert!(is_csv("URLS.CSV"));
        assert!(!is_csv("urls.xlsx"));
        assert!(!is_csv("csv"));
        assert!(!is_csv(""));
    }

    #[tokio::test]
    async fn test_three_rows_completed() {
        let (state, ledger) = state_with(vec![Label::Legitimate, Label::Phishing, Label::Legitimate]);
        let csv = csv_with(&[[1; FEATURE_COUNT], [-1; FEATURE_COUNT], [0; FEATURE_COUNT]]);

        let (status, body) = send(state, upload("urls.csv", &csv)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["total_urls"], 3);
        assert_eq!(body["phishing_count"], 1);
        assert_eq!(body["legitimate_count"], 2);
        assert_eq!(body["detailed_results"].as_array().unwrap().len(), 3);
        assert!(body.get("accuracy").is_none());

        let records = ledger.all();
        assert_eq!(records.len(), 1);
        let job = &records[0];
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.filename, "urls.csv");
        assert_eq!(job.model_version, "phishing_detector.json");
        assert_eq!(job.total_urls, Some(3));
        assert_eq!(job.phishing_count, Some(1));
        assert_eq!(job.legitimate_count, Some(2));
        assert!(job.processed_date.is_some());
    }

    #[tokio::test]
    async fn test_accuracy_reported_and_recorded() {
        let (state, ledger) = state_with(vec![Label::Legitimate]);
        let mut csv = FEATURE_LAYOUT.join(",");
        csv.push_str(",Result\n");
        csv.push_str(&format!("{},1\n", vec!["1"; FEATURE_COUNT].join(",")));

        let (status, body) = send(state, upload("labelled.csv", &csv)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accuracy"], 100.0);
        assert_eq!(ledger.all()[0].accuracy, Some(100.0));
    }

    #[tokio::test]
    async fn test_missing_columns_422() {
        let (state, ledger) = state_with(vec![Label::Legitimate]);
        let csv = "URL_Length,port\n1,1\n";

        let (status, body) = send(state, upload("partial.csv", csv)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let message = body["error"].as_str().unwrap();
        assert!(message.starts_with("Input CSV is missing required features. Missing columns: having_IP_Address"));
        assert!(!message.contains("Data Validation Failure"));
        assert!(!message.contains("URL_Length,") && !message.contains(", port"));

        let job = &ledger.all()[0];
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().starts_with("Data Validation Failure: "));
        assert!(job.total_urls.is_none());
    }

    #[tokio::test]
    async fn test_missing_columns_with_text_truth_422() {
        let (state, ledger) = state_with(vec![Label::Legitimate]);
        let csv = "URL_Length,port,Result\n1,1,phishing\n";

        let (status, body) = send(state, upload("labelled.csv", csv)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Input CSV is missing required features."));

        let job = &ledger.all()[0];
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().contains("Missing columns"));
    }

    #[tokio::test]
    async fn test_non_numeric_422() {
        let (state, ledger) = state_with(vec![Label::Legitimate]);
        let mut csv = csv_with(&[[1; FEATURE_COUNT]]);
        csv.push_str(&format!("1{},https\n", ",1".repeat(FEATURE_COUNT - 2)));

        let (status, body) = send(state, upload("bad.csv", &csv)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("must be numeric"));
        assert_eq!(ledger.all()[0].status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn test_internal_failure_500_with_diagnostic_kept() {
        let (state, ledger) = state_with(vec![Label::Legitimate]);
        let mut csv = FEATURE_LAYOUT.join(",");
        csv.push_str(",Result\n");
        csv.push_str(&format!("{},maybe\n", vec!["1"; FEATURE_COUNT].join(",")));

        let (status, body) = send(state, upload("labelled.csv", &csv)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], crate::error::INTERNAL_ERROR_MESSAGE);

        let job = &ledger.all()[0];
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().contains("\"maybe\""));
    }

    #[tokio::test]
    async fn test_wrong_extension_400_no_record() {
        let (state, ledger) = state_with(vec![Label::Legitimate]);

        let (status, body) = send(state, upload("urls.txt", "a,b\n")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid file type. Please upload a CSV file.");
        assert!(ledger.all().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_400_no_record() {
        let (state, ledger) = state_with(vec![Label::Legitimate]);
        let payload = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{b}--\r\n",
            b = BOUNDARY
        );

        let (status, body) = send(state, multipart_request(payload)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file part in the request.");
        assert!(ledger.all().is_empty());
    }

    #[tokio::test]
    async fn test_not_multipart_400() {
        let (state, ledger) = state_with(vec![Label::Legitimate]);
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let (status, _) = send(state, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(ledger.all().is_empty());
    }

    #[tokio::test]
    async fn test_unloaded_model_503_no_record() {
        let ledger = Arc::new(MemoryLedger::default());
        let state = AppState {
            predictor: Arc::new(Predictor::unloaded("phishing_detector.json")),
            ledger: Some(ledger.clone()),
        };
        let csv = csv_with(&[[1; FEATURE_COUNT]]);

        let (status, body) = send(state, upload("urls.csv", &csv)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Service not available. Check server startup logs.");
        assert!(ledger.all().is_empty());
    }

    #[tokio::test]
    async fn test_missing_ledger_503() {
        let (mut state, _) = state_with(vec![Label::Legitimate]);
        state.ledger = None;

        let (status, _) = send(state, upload("urls.csv", "x\n")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_job_lookup_after_predict() {
        let (state, ledger) = state_with(vec![Label::Phishing]);
        let csv = csv_with(&[[1; FEATURE_COUNT]]);
        let (status, _) = send(state.clone(), upload("urls.csv", &csv)).await;
        assert_eq!(status, StatusCode::OK);

        let id = ledger.all()[0].id.clone();
        let request = Request::builder()
            .uri(format!("/jobs/{}", id))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(state.clone(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["_id"], id.as_str());
        assert_eq!(body["status"], "COMPLETED");
        assert_eq!(body["phishing_count"], 1);

        let request = Request::builder().uri("/jobs/unknown").body(Body::empty()).unwrap();
        let (status, _) = send(state, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_reports_degraded() {
        let state = AppState {
            predictor: Arc::new(Predictor::unloaded("phishing_detector.json")),
            ledger: None,
        };
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let (status, body) = send(state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["model_loaded"], false);
    }
}
