use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeMaintError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl NodeMaintError {
    /// Short error code string, stable across releases for log scraping.
    pub fn code(&self) -> &'static str {
        match self {
            NodeMaintError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeMaintError>;
