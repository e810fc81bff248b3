//! Git provider API clients.

pub mod bitbucket;
pub mod github;

use hoist_core::{Error, Result};
use url::Url;

const USER_AGENT: &str = "hoist-ci";

/// Embed `username:token` credentials in an https repository URL.
pub(crate) fn authenticated_url(plain_url: &str, username: &str, token: &str) -> Result<String> {
    let invalid = || Error::InvalidInput(format!("cannot add credentials to '{}'", plain_url));

    let mut url = Url::parse(plain_url)
        .map_err(|e| Error::InvalidInput(format!("bad repository url '{}': {}", plain_url, e)))?;
    url.set_username(username).map_err(|_| invalid())?;
    url.set_password(Some(token)).map_err(|_| invalid())?;

    Ok(url.into())
}
