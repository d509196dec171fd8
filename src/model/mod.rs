//! Model Module - Classifier & Artifact Loading
//!
//! The model is fetched once at startup and shared read-only by every request.

pub mod artifact;
pub mod forest;

use serde::{Serialize, Serializer};

use crate::features::FeatureRow;

// Re-export common types
pub use artifact::{load_model, ObjectStore, S3Store};

/// Binary class produced by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Label {
    Legitimate,
    Phishing,
}

impl Label {
    /// Training-set encoding: 1 legitimate, -1 phishing
    pub fn code(self) -> i8 {
        match self {
            Label::Legitimate => 1,
            Label::Phishing => -1,
        }
    }

    pub fn from_code(code: f64) -> Option<Self> {
        if code == 1.0 {
            Some(Label::Legitimate)
        } else if code == -1.0 {
            Some(Label::Phishing)
        } else {
            None
        }
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i8(self.code())
    }
}

/// Anything that maps a batch of feature rows to one label per row
pub trait Classifier: Send + Sync {
    fn predict(&self, rows: &[FeatureRow]) -> Vec<Label>;
}
