//! Request authentication.

use std::fmt;

/// Credential attached to every request, fixed for the process lifetime.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// HTTP Basic. Azure DevOps personal access tokens are sent as the
    /// password with an empty user name.
    Basic { username: String, password: String },
    /// OAuth / Entra ID bearer token.
    Bearer(String),
}

impl Credential {
    /// Basic credential for a personal access token.
    pub fn personal_access_token(token: impl Into<String>) -> Self {
        Credential::Basic {
            username: String::new(),
            password: token.into(),
        }
    }

    /// Attach the credential to a request.
    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Credential::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            Credential::Bearer(token) => request.bearer_auth(token),
        }
    }
}

// Keep tokens out of logs and config dumps.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"***")
                .finish(),
            Credential::Bearer(_) => f.debug_tuple("Bearer").field(&"***").finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_secret() {
        let pat = Credential::personal_access_token("abcdef");
        let bearer = Credential::Bearer("xyz123".into());

        assert!(!format!("{:?}", pat).contains("abcdef"));
        assert!(!format!("{:?}", bearer).contains("xyz123"));
    }

    #[test]
    fn test_pat_uses_empty_username() {
        assert_eq!(
            Credential::personal_access_token("t"),
            Credential::Basic {
                username: String::new(),
                password: "t".into()
            }
        );
    }
}
