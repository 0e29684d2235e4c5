//! Error aggregation for partially failed batches

use std::fmt;
use thiserror::Error;

use crate::task::TaskError;

/// Every failure of a batch that ran to completion
#[derive(Debug)]
pub struct AggregatedError {
    message: String,
    errors: Vec<TaskError>,
}

impl AggregatedError {
    pub fn new<S: Into<String>>(message: S, errors: Vec<TaskError>) -> Self {
        Self { message: message.into(), errors }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Failures in the order they were observed
    pub fn errors(&self) -> &[TaskError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<TaskError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{} tasks failed", self.errors.len())
        } else {
            f.write_str(&self.message)
        }
    }
}

impl std::error::Error for AggregatedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors.first().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Outcome of a failed batch
#[derive(Error, Debug)]
pub enum BatchError {
    /// Fail-fast or cancellation stopped the batch at this failure
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Aggregated(#[from] AggregatedError),
}

impl BatchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BatchError::Task(e) if e.is_cancelled())
    }

    /// All failures carried by this error
    pub fn errors(&self) -> Vec<&TaskError> {
        match self {
            BatchError::Task(e) => vec![e],
            BatchError::Aggregated(aggregated) => aggregated.errors().iter().collect(),
        }
    }
}
