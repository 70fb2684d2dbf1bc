use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("gave up after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
    #[error("evaluation failed: {message}")]
    Evaluation { message: String },
}

impl SchedulerError {
    pub fn evaluation(message: impl Into<String>) -> Self {
        SchedulerError::Evaluation {
            message: message.into(),
        }
    }
}
