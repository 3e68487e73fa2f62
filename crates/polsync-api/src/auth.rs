use secrecy::SecretString;

/// Credentials for authenticating with a device.
///
/// Each variant carries the secret material needed for its auth flow.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Username and password exchanged for a session key via keygen.
    Password {
        username: String,
        password: SecretString,
    },

    /// A pre-generated API key, used directly as the session key.
    ApiKey { key: SecretString },
}

impl Credentials {
    /// The administrator name, when known. Used in lock comments and logs.
    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Password { username, .. } => Some(username),
            Self::ApiKey { .. } => None,
        }
    }
}
