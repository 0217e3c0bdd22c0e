//! Error type shared by the atmosphere crates.
//!
//! None of these are meant to reach gameplay code: hosts log them and fall
//! back to "no visual effect".

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AtmosphereError {
    /// Container is absent or has no area yet (layout not complete).
    #[error("environment not ready: {0}")]
    EnvironmentNotReady(String),
    /// A rendering stage is disabled by configuration.
    #[error("capability disabled: {0}")]
    MissingCapability(&'static str),
    /// Non-finite or otherwise unusable particle data.
    #[error("degenerate data: {0}")]
    DegenerateData(String),
    #[error("unknown theme `{0}`")]
    UnknownTheme(String),
    #[error("invalid theme config for {theme}: {reason}")]
    InvalidTheme { theme: &'static str, reason: String },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl AtmosphereError {
    /// True for errors that resolve themselves once layout settles.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::EnvironmentNotReady(_))
    }
}

pub type Result<T, E = AtmosphereError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_problem() {
        let e = AtmosphereError::UnknownTheme("lava".into());
        assert_eq!(e.to_string(), "unknown theme `lava`");
        let e = AtmosphereError::InvalidTheme { theme: "cave", reason: "count is zero".into() };
        assert!(e.to_string().contains("cave"));
    }

    #[test]
    fn only_not_ready_is_transient() {
        assert!(AtmosphereError::EnvironmentNotReady("0x0".into()).is_transient());
        assert!(!AtmosphereError::MissingCapability("turbulence").is_transient());
    }
}
