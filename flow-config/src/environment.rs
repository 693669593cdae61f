use std::env;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Variable selecting which overlay is layered over `configuration/base.*`.
const APP_ENVIRONMENT_ENV_NAME: &str = "APP_ENVIRONMENT";

/// Runtime environment of a pipeline runner.
///
/// Each environment has an overlay file named after it, e.g. `configuration/prod.yaml`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

/// `APP_ENVIRONMENT` named an environment without an overlay.
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("`{0}` is not a supported environment, expected one of: dev, prod")]
    Unsupported(String),

    #[error("`APP_ENVIRONMENT` is not valid unicode")]
    NotUnicode,
}

impl Environment {
    const ALL: [Environment; 2] = [Environment::Dev, Environment::Prod];

    /// Reads `APP_ENVIRONMENT`; an unset variable selects [`Environment::Dev`].
    pub fn load() -> Result<Environment, EnvironmentError> {
        match env::var(APP_ENVIRONMENT_ENV_NAME) {
            Ok(value) => value.parse(),
            Err(env::VarError::NotPresent) => Ok(Environment::default()),
            Err(env::VarError::NotUnicode(_)) => Err(EnvironmentError::NotUnicode),
        }
    }

    /// File stem of the overlay for this environment.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = EnvironmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|environment| environment.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| EnvironmentError::Unsupported(value.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overlay_names_ignoring_case_and_padding() {
        assert_eq!("DEV".parse::<Environment>().unwrap(), Environment::Dev);
        assert_eq!(" prod ".parse::<Environment>().unwrap(), Environment::Prod);
    }

    #[test]
    fn rejects_environment_without_overlay() {
        let err = "staging".parse::<Environment>().unwrap_err();
        assert!(matches!(err, EnvironmentError::Unsupported(ref name) if name == "staging"));
        assert!(err.to_string().contains("dev, prod"));
    }

    #[test]
    fn display_matches_overlay_file_stem() {
        for environment in Environment::ALL {
            assert_eq!(environment.to_string(), environment.as_str());
        }
        assert_eq!(Environment::default(), Environment::Dev);
    }
}
