use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// CI platform integration variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Github,
    Gitlab,
    Bitbucket,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Github => "github",
            Driver::Gitlab => "gitlab",
            Driver::Bitbucket => "bitbucket",
        }
    }

    /// Infer the driver from the host part of a repository URL.
    pub fn infer(repo: &str) -> Result<Self, ConfigError> {
        let lower = repo.to_ascii_lowercase();
        if lower.contains("github") {
            Ok(Driver::Github)
        } else if lower.contains("gitlab") {
            Ok(Driver::Gitlab)
        } else if lower.contains("bitbucket") {
            Ok(Driver::Bitbucket)
        } else {
            Err(ConfigError::DriverNotInferred(repo.to_string()))
        }
    }

    /// Whether the platform reports per-runner busy state.
    pub fn supports_reuse_idle(&self) -> bool {
        !matches!(self, Driver::Bitbucket)
    }

    /// Whether `--docker-volumes` has any effect.
    pub fn supports_docker_volumes(&self) -> bool {
        matches!(self, Driver::Gitlab)
    }
}

impl FromStr for Driver {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "github" => Ok(Driver::Github),
            "gitlab" => Ok(Driver::Gitlab),
            "bitbucket" => Ok(Driver::Bitbucket),
            _ => Err(ConfigError::UnknownDriver(s.to_string())),
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cloud vendor targeted by a cloud-backed runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
    Kubernetes,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "aws",
            CloudProvider::Azure => "azure",
            CloudProvider::Gcp => "gcp",
            CloudProvider::Kubernetes => "kubernetes",
        }
    }
}

impl FromStr for CloudProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(CloudProvider::Aws),
            "azure" => Ok(CloudProvider::Azure),
            "gcp" => Ok(CloudProvider::Gcp),
            "kubernetes" => Ok(CloudProvider::Kubernetes),
            _ => Err(ConfigError::UnknownCloud(s.to_string())),
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_driver_case_insensitive() {
        assert_eq!("GitHub".parse::<Driver>().unwrap(), Driver::Github);
        assert_eq!(" gitlab ".parse::<Driver>().unwrap(), Driver::Gitlab);
        assert!(matches!(
            "svn".parse::<Driver>(),
            Err(ConfigError::UnknownDriver(_))
        ));
    }

    #[test]
    fn infer_from_repo_host() {
        assert_eq!(
            Driver::infer("https://github.com/org/repo").unwrap(),
            Driver::Github
        );
        assert_eq!(
            Driver::infer("https://gitlab.example.com/group/repo").unwrap(),
            Driver::Gitlab
        );
        assert_eq!(
            Driver::infer("https://bitbucket.org/ws/repo").unwrap(),
            Driver::Bitbucket
        );
        assert!(Driver::infer("https://example.com/repo").is_err());
    }

    #[test]
    fn capabilities() {
        assert!(!Driver::Bitbucket.supports_reuse_idle());
        assert!(Driver::Github.supports_reuse_idle());
        assert!(Driver::Gitlab.supports_docker_volumes());
        assert!(!Driver::Github.supports_docker_volumes());
    }

    #[test]
    fn serde_lowercase() {
        let json = serde_json::to_string(&Driver::Bitbucket).unwrap();
        assert_eq!(json, r#""bitbucket""#);
        let back: CloudProvider = serde_json::from_str(r#""gcp""#).unwrap();
        assert_eq!(back, CloudProvider::Gcp);
    }
}
