use crate::PlatformError;

/// Repository location split into its web origin and path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    /// `scheme://host[:port]`
    pub origin: String,
    pub host: String,
    /// Path without leading/trailing slashes and `.git`, e.g. `org/repo`.
    pub path: String,
}

impl RepoRef {
    pub fn parse(url: &str) -> Result<Self, PlatformError> {
        let invalid = || PlatformError::InvalidRepo(url.to_string());

        let (scheme, rest) = url.trim().split_once("://").ok_or_else(invalid)?;
        if scheme != "https" && scheme != "http" {
            return Err(invalid());
        }
        let (host, path) = rest.split_once('/').ok_or_else(invalid)?;
        let path = path.trim_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        if host.is_empty() || path.is_empty() || !path.contains('/') {
            return Err(invalid());
        }

        Ok(Self {
            origin: format!("{scheme}://{host}"),
            host: host.to_string(),
            path: path.to_string(),
        })
    }

    /// Path percent-encoded as a single segment (GitLab project ids).
    pub fn encoded_path(&self) -> String {
        self.path.replace('/', "%2F")
    }

    /// Last two path segments: owner/workspace and repository name.
    pub fn owner_and_name(&self) -> (&str, &str) {
        match self.path.rsplit_once('/') {
            Some((owner, name)) => (owner, name),
            None => ("", &self.path),
        }
    }
}
