use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid scenario config: {field}: {reason}")]
    Config { field: String, reason: String },

    #[error("Unknown {domain} policy '{name}'")]
    UnknownPolicy { domain: &'static str, name: String },

    #[error("Crop '{crop}' has no reference parameters")]
    UnknownCrop { crop: String },

    #[error("No reference data for {series}")]
    MissingSeries { series: String },

    #[error("Run already reached its end date {end}")]
    RunComplete { end: NaiveDate },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config { field: field.into(), reason: reason.into() }
    }
}

pub type SimResult<T> = Result<T, SimError>;
