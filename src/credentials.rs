use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credentials found; set GRAM_USERNAME/GRAM_PASSWORD in env or .env")]
    NoCredentials,
}

/// Login credentials for the automated account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Return candidate .env paths in priority order.
fn env_file_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/grambot/.env"));
    }
    paths.push(PathBuf::from(".env"));
    paths
}

/// Load .env files without overriding variables already set in the
/// environment (earlier files therefore have higher priority).
pub fn load_env_files() {
    for path in env_file_paths() {
        if path.exists() {
            let _ = dotenvy::from_path(&path);
        }
    }
}

/// Load credentials from environment variables, trying .env files first.
pub fn load_credentials() -> Result<Credentials, CredentialError> {
    load_env_files();

    let get = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    match (get("GRAM_USERNAME"), get("GRAM_PASSWORD")) {
        (Some(username), Some(password)) => Ok(Credentials { username, password }),
        _ => Err(CredentialError::NoCredentials),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_is_a_typed_error() {
        unsafe {
            std::env::remove_var("GRAM_USERNAME");
            std::env::remove_var("GRAM_PASSWORD");
        }
        assert!(matches!(
            load_credentials(),
            Err(CredentialError::NoCredentials)
        ));
    }

    #[test]
    fn test_working_directory_env_file_has_lowest_priority() {
        let paths = env_file_paths();
        assert_eq!(paths.last().unwrap(), &PathBuf::from(".env"));
    }
}
