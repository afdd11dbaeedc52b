#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployError {
    message: String,
}

impl DeployError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for DeployError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for DeployError {}

impl From<String> for DeployError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for DeployError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}
