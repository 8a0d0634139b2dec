use thiserror::Error;

use crate::jobs::domain::job::JobId;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {0} already finished")]
    AlreadyFinished(JobId),
    #[error("invalid job parameters: {0}")]
    InvalidParams(String),
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}
