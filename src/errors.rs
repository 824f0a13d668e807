use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParasightError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network failure, timeout or non-2xx reply from the vision service.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP error: {status}")]
    HttpStatus { status: u16, body: String },

    /// Response body matched none of the known vision-service shapes.
    #[error("format error: {0}")]
    Format(String),

    /// Caller supplied invalid or missing fields.
    #[error("invalid input: {0}")]
    Input(String),

    /// A single browser action failed.
    #[error("interaction failed: {0}")]
    Interaction(String),

    /// Session-level browser failure (launch, navigation, viewport).
    #[error("browser error: {0}")]
    Browser(String),

    #[error("LLM provider error: {0}")]
    LlmProvider(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl From<chromiumoxide::error::CdpError> for ParasightError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        ParasightError::Browser(err.to_string())
    }
}

impl serde::Serialize for ParasightError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type ParasightResult<T> = Result<T, ParasightError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_strings_are_distinguishable() {
        let transport = ParasightError::Transport("connection refused".into()).to_string();
        let status = ParasightError::HttpStatus { status: 502, body: "bad gateway".into() }.to_string();
        let format = ParasightError::Format("no decoder matched".into()).to_string();
        assert!(transport.starts_with("transport error"));
        assert_eq!(status, "HTTP error: 502");
        assert!(format.starts_with("format error"));
    }

    #[test]
    fn test_serializes_as_display_string() {
        let err = ParasightError::Input("no text provided".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!("invalid input: no text provided"));
    }
}
