//! Validation functions for configuration values.
//!
//! Only shape is checked here: whether a folder actually exists is a file
//! access concern of the archiving step, not of configuration validation.

use url::Url;
use validator::ValidationError;

use std::path::Path;

pub fn validate_non_empty_path<P: AsRef<Path>>(path: P) -> Result<(), ValidationError> {
    if path.as_ref().as_os_str().is_empty() {
        return Err(ValidationError::new("EmptyPath").with_message("path must not be empty".into()));
    }

    Ok(())
}

pub fn validate_http_url<S: AsRef<str>>(url: S) -> Result<(), ValidationError> {
    let url = url.as_ref();
    match Url::parse(url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
        Ok(parsed) => Err(ValidationError::new("InvalidUrl")
            .with_message(format!("unsupported scheme {:?} in {url:?}", parsed.scheme()).into())),
        Err(e) => Err(ValidationError::new("InvalidUrl")
            .with_message(format!("cannot parse url {url:?}: {e}").into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validate_non_empty_path() {
        assert!(validate_non_empty_path(PathBuf::from("/vault/agents")).is_ok());
        assert!(validate_non_empty_path(PathBuf::new()).is_err());
    }

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("https://api.backblazeb2.com").is_ok());
        assert!(validate_http_url("http://127.0.0.1:9000").is_ok());
        assert!(validate_http_url("ftp://example.com").is_err());
        assert!(validate_http_url("not a url").is_err());
    }
}
