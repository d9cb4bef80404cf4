use std::path::{Path, PathBuf};

/// Source of the bearer token and user identity for stream requests.
///
/// Read once per `start()`; the values are not re-checked mid-stream.
pub trait CredentialStore: Send + Sync {
    fn bearer_token(&self) -> Option<String>;

    fn user_id(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    token: Option<String>,
    user_id: Option<String>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>, user_id: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
            user_id,
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl CredentialStore for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.clone()
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}

/// Reads the token from a file on every lookup, so a token written by a
/// separate login step is picked up by the next query.
#[derive(Debug, Clone)]
pub struct TokenFileCredentials {
    path: PathBuf,
    user_id: Option<String>,
}

impl TokenFileCredentials {
    pub fn new(path: impl Into<PathBuf>, user_id: Option<String>) -> Self {
        Self {
            path: path.into(),
            user_id,
        }
    }

    pub fn default_location(user_id: Option<String>) -> Self {
        Self::new(token_path(), user_id)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for TokenFileCredentials {
    fn bearer_token(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(token) => {
                let token = token.trim();
                (!token.is_empty()).then(|| token.to_string())
            }
            Err(err) => {
                tracing::debug!(path = %self.path.display(), error = %err, "no token file");
                None
            }
        }
    }

    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}

/// Explicit token wins; otherwise fall back to the token file.
pub fn resolve_credentials(
    explicit: Option<String>,
    user_id: Option<String>,
) -> Box<dyn CredentialStore> {
    match explicit.filter(|t| !t.trim().is_empty()) {
        Some(token) => Box::new(StaticCredentials::new(Some(token), user_id)),
        None => Box::new(TokenFileCredentials::default_location(user_id)),
    }
}

/// Write the token where [`TokenFileCredentials::default_location`] reads it.
pub fn store_token(token: &str) -> std::io::Result<PathBuf> {
    let path = token_path();
    write_token_file(&path, token)?;
    Ok(path)
}

fn write_token_file(path: &Path, token: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    use std::io::Write;
    file.write_all(token.trim().as_bytes())?;
    Ok(())
}

pub fn token_path() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
        return PathBuf::from(home).join(".docstream").join("token");
    }

    PathBuf::from("docstream.token")
}
