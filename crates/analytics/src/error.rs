use core_types::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyticsError {
    #[error("Invalid calendar input: {0}")]
    Calendar(#[from] CoreError),

    #[error("Error in calculation: {0}")]
    Calculation(String),
}
