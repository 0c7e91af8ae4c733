mod error;
pub use error::PlatformError;

mod platform;
pub use platform::{CiPlatform, connect};

mod repo;
pub use repo::RepoRef;

mod bitbucket;
mod github;
mod gitlab;
mod http;
mod install;

pub use bitbucket::Bitbucket;
pub use github::Github;
pub use gitlab::Gitlab;
