use crate::config::ClientCredential;
use std::collections::HashMap;

/// A caller allowed to use the API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credential {
    pub id: String,
    pub token: String,
    pub active: bool,
}

impl From<&ClientCredential> for Credential {
    fn from(client: &ClientCredential) -> Self {
        Credential {
            id: client.id.clone(),
            token: client.token.clone(),
            active: client.active,
        }
    }
}

/// The set of authorized callers, built once at startup and never mutated.
#[derive(Debug, Default)]
pub struct CredentialStore {
    credentials: HashMap<String, Credential>,
}

impl CredentialStore {
    pub fn new(credentials: impl IntoIterator<Item = Credential>) -> Self {
        CredentialStore {
            credentials: credentials
                .into_iter()
                .map(|credential| (credential.id.clone(), credential))
                .collect(),
        }
    }

    pub fn from_config(clients: &[ClientCredential]) -> Self {
        Self::new(clients.iter().map(Credential::from))
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Fails closed. Returns true only for a known, active id whose token
    /// matches exactly. Callers learn nothing about which check failed.
    pub fn authorize(&self, id: Option<&str>, token: Option<&str>) -> bool {
        let (Some(id), Some(token)) = (id, token) else {
            return false;
        };

        if token.is_empty() {
            return false;
        }

        self.credentials.get(id).is_some_and(|credential| {
            credential.active
                && !credential.token.is_empty()
                && tokens_match(credential.token.as_bytes(), token.as_bytes())
        })
    }
}

// Compares every byte so the time taken does not reveal the matching prefix length.
fn tokens_match(expected: &[u8], supplied: &[u8]) -> bool {
    if expected.len() != supplied.len() {
        return false;
    }

    expected
        .iter()
        .zip(supplied)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
