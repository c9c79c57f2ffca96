use serde::Deserialize;

/// Request body for a single profile field update.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    pub field: String,
    pub value: String,
}
