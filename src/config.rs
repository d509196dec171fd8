//! Configuration module

use std::env;
use std::fmt;
use std::path::PathBuf;

use validator::Validate;

/// Required settings, in the order they are reported when missing.
/// Pairs of (struct field, environment variable).
const REQUIRED: &[(&str, &str)] = &[
    ("aws_access_key_id", "AWS_ACCESS_KEY_ID"),
    ("aws_secret_access_key", "AWS_SECRET_ACCESS_KEY"),
    ("s3_bucket_name", "S3_BUCKET_NAME"),
    ("mongo_uri", "MONGO_URI"),
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("CRITICAL ERROR: Configuration variable '{0}' is missing. Check your .env file.")]
    Missing(&'static str),
}

/// Application configuration
#[derive(Clone, Validate)]
pub struct Config {
    /// AWS access key used for the model bucket
    #[validate(length(min = 1))]
    pub aws_access_key_id: String,

    #[validate(length(min = 1))]
    pub aws_secret_access_key: String,

    pub aws_region: String,

    /// Bucket holding the model artifact
    #[validate(length(min = 1))]
    pub s3_bucket_name: String,

    /// Object key of the model artifact; also recorded as the job's model version
    pub model_s3_key: String,

    /// Scratch path the artifact is downloaded to before loading
    pub local_model_path: PathBuf,

    /// MongoDB connection string
    #[validate(length(min = 1))]
    pub mongo_uri: String,

    pub mongo_database: String,

    pub mongo_collection: String,

    /// Bind address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Upper bound on the request body accepted by /predict
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            aws_access_key_id: or("AWS_ACCESS_KEY_ID", ""),
            aws_secret_access_key: or("AWS_SECRET_ACCESS_KEY", ""),
            aws_region: or("AWS_REGION", "us-east-1"),
            s3_bucket_name: or("S3_BUCKET_NAME", ""),
            model_s3_key: or("MODEL_S3_KEY", "phishing_detector.json"),
            local_model_path: PathBuf::from(or("LOCAL_MODEL_PATH", "temp_phishing_detector.json")),
            mongo_uri: or("MONGO_URI", ""),
            mongo_database: or("MONGO_DATABASE", "phishing_db"),
            mongo_collection: or("MONGO_COLLECTION", "prediction_jobs"),
            host: or("HOST", "127.0.0.1"),

            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),

            max_upload_bytes: lookup("MAX_UPLOAD_BYTES")
                .and_then(|b| b.parse().ok())
                .unwrap_or(16 * 1024 * 1024),
        }
    }

    /// Check for critical missing settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Err(errors) = Validate::validate(self) else {
            return Ok(());
        };

        let fields = errors.field_errors();
        for &(field, key) in REQUIRED {
            if fields.contains_key(field) {
                return Err(ConfigError::Missing(key));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("aws_region", &self.aws_region)
            .field("s3_bucket_name", &self.s3_bucket_name)
            .field("model_s3_key", &self.model_s3_key)
            .field("local_model_path", &self.local_model_path)
            .field("mongo_database", &self.mongo_database)
            .field("mongo_collection", &self.mongo_collection)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}
