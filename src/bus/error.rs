use thiserror::Error;

use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("Bus unavailable: {0}")]
    Unavailable(String),
}

impl Retryable for BusError {
    fn is_retryable(&self) -> bool {
        match self {
            BusError::Unavailable(_) => true,
        }
    }
}
