//! Deployment environments and their designated branches.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A deployment environment tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development: deploys from `develop` or a `feature/*` branch.
    Dev,
    /// Staging: deploys from `main`.
    Stg,
    /// Production: deploys from `main`.
    Prod,
}

impl Environment {
    /// All environments, in promotion order.
    pub const ALL: [Self; 3] = [Self::Dev, Self::Stg, Self::Prod];

    /// Returns the lowercase tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Stg => "stg",
            Self::Prod => "prod",
        }
    }

    /// Returns true if `branch` may deploy to this environment.
    #[must_use]
    pub fn accepts_branch(&self, branch: &str) -> bool {
        match self {
            Self::Dev => {
                branch == "develop"
                    || branch
                        .strip_prefix("feature/")
                        .is_some_and(|name| !name.is_empty() && !name.chars().any(char::is_whitespace))
            }
            Self::Stg | Self::Prod => branch == "main",
        }
    }

    /// Describes the branches this environment accepts.
    #[must_use]
    pub fn designated_branches(&self) -> &'static str {
        match self {
            Self::Dev => "develop or feature/<name>",
            Self::Stg | Self::Prod => "main",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Self::Dev),
            "stg" => Ok(Self::Stg),
            "prod" => Ok(Self::Prod),
            other => Err(format!("unknown environment '{other}' (expected dev, stg or prod)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_branches() {
        assert!(Environment::Dev.accepts_branch("develop"));
        assert!(Environment::Dev.accepts_branch("feature/#486"));
        assert!(!Environment::Dev.accepts_branch("feature/"));
        assert!(!Environment::Dev.accepts_branch("main"));
    }

    #[test]
    fn test_main_only_for_stg_and_prod() {
        assert!(Environment::Stg.accepts_branch("main"));
        assert!(Environment::Prod.accepts_branch("main"));
        assert!(!Environment::Prod.accepts_branch("develop"));
    }

    #[test]
    fn test_parse_and_display() {
        for env in Environment::ALL {
            assert_eq!(env.as_str().parse::<Environment>(), Ok(env));
        }
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Environment::Prod).unwrap();
        assert_eq!(json, r#""prod""#);
    }
}
