//! Storage credential resolution.
//!
//! A [`CredentialSource`] is chosen once from configuration and CLI flags,
//! then resolved into a concrete [`Credential`] before anything is listed.
//! A source that cannot produce a credential fails the run with
//! [`ShuttleError::AuthResolution`].
//!
//! Ambient resolution order:
//!
//! 1. a SAS query string embedded in the container URL,
//! 2. `AZURE_STORAGE_CONNECTION_STRING`,
//! 3. `AZURE_STORAGE_KEY` (shared key for the URL's account),
//! 4. `AZURE_STORAGE_SAS_TOKEN`,
//! 5. `AZURE_STORAGE_TOKEN` (SAS if it carries a `sig=` parameter, bearer
//!    token otherwise).

use anyhow::Result;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use crate::config::{AuthMode, AzureSettings};
use crate::error::ShuttleError;

pub const ENV_CONNECTION_STRING: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const ENV_ACCOUNT_KEY: &str = "AZURE_STORAGE_KEY";
pub const ENV_SAS_TOKEN: &str = "AZURE_STORAGE_SAS_TOKEN";
pub const ENV_TOKEN: &str = "AZURE_STORAGE_TOKEN";

/// Well-known development storage account (Azurite).
const DEV_ACCOUNT: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_BLOB_ENDPOINT: &str = "http://127.0.0.1:10000/devstoreaccount1";

/// Where a credential comes from. Explicit values win over environment
/// variables of the same kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    Ambient,
    ConnectionString(Option<String>),
    Token(Option<String>),
    AccountKey(Option<String>),
}

impl CredentialSource {
    pub fn from_settings(settings: &AzureSettings) -> Self {
        match settings.auth {
            AuthMode::Ambient => CredentialSource::Ambient,
            AuthMode::ConnectionString => {
                CredentialSource::ConnectionString(settings.connection_string.clone())
            }
            AuthMode::Token => CredentialSource::Token(settings.token.clone()),
            AuthMode::Key => CredentialSource::AccountKey(settings.account_key.clone()),
        }
    }

    /// Resolve against the process environment.
    pub fn resolve(&self, account: &str, embedded_sas: Option<&str>) -> Result<ResolvedCredential> {
        self.resolve_with(account, embedded_sas, |name| std::env::var(name).ok())
    }

    /// Resolve with an injected environment lookup.
    pub fn resolve_with<F>(
        &self,
        account: &str,
        embedded_sas: Option<&str>,
        env: F,
    ) -> Result<ResolvedCredential>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |explicit: &Option<String>, var: &str| {
            explicit
                .clone()
                .or_else(|| env(var))
                .filter(|v| !v.trim().is_empty())
        };

        let resolved = match self {
            CredentialSource::ConnectionString(explicit) => {
                let raw = lookup(explicit, ENV_CONNECTION_STRING).ok_or_else(|| {
                    auth_error(format!(
                        "connection-string auth selected but neither a connection string nor {} is set",
                        ENV_CONNECTION_STRING
                    ))
                })?;
                parse_connection_string(&raw)?
            }
            CredentialSource::AccountKey(explicit) => {
                let key = lookup(explicit, ENV_ACCOUNT_KEY).ok_or_else(|| {
                    auth_error(format!(
                        "key auth selected but neither an account key nor {} is set",
                        ENV_ACCOUNT_KEY
                    ))
                })?;
                ResolvedCredential::new(Credential::shared_key(account, &key)?)
            }
            CredentialSource::Token(explicit) => {
                let token = explicit
                    .clone()
                    .or_else(|| env(ENV_SAS_TOKEN))
                    .or_else(|| env(ENV_TOKEN))
                    .filter(|v| !v.trim().is_empty())
                    .ok_or_else(|| {
                        auth_error(format!(
                            "token auth selected but neither a token, {} nor {} is set",
                            ENV_SAS_TOKEN, ENV_TOKEN
                        ))
                    })?;
                ResolvedCredential::new(Credential::from_token(&token))
            }
            CredentialSource::Ambient => {
                if let Some(sas) = embedded_sas.filter(|s| !s.is_empty()) {
                    debug!("Using SAS token embedded in the container URL");
                    ResolvedCredential::new(Credential::Sas(sas.to_string()))
                } else if let Some(raw) = env(ENV_CONNECTION_STRING) {
                    debug!("Using {}", ENV_CONNECTION_STRING);
                    parse_connection_string(&raw)?
                } else if let Some(key) = env(ENV_ACCOUNT_KEY) {
                    debug!("Using {}", ENV_ACCOUNT_KEY);
                    ResolvedCredential::new(Credential::shared_key(account, &key)?)
                } else if let Some(sas) = env(ENV_SAS_TOKEN) {
                    debug!("Using {}", ENV_SAS_TOKEN);
                    ResolvedCredential::new(Credential::Sas(trim_query(&sas)))
                } else if let Some(token) = env(ENV_TOKEN) {
                    debug!("Using {}", ENV_TOKEN);
                    ResolvedCredential::new(Credential::from_token(&token))
                } else {
                    return Err(auth_error(format!(
                        "no credential found; embed a SAS in the URL or set one of {}, {}, {}, {}",
                        ENV_CONNECTION_STRING, ENV_ACCOUNT_KEY, ENV_SAS_TOKEN, ENV_TOKEN
                    ))
                    .into());
                }
            }
        };
        Ok(resolved)
    }
}

/// A resolved credential.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Account name plus decoded account key, for Shared Key signing.
    SharedKey { account: String, key: Vec<u8> },
    /// SAS query string without the leading `?`.
    Sas(String),
    /// OAuth bearer token.
    Bearer(String),
}

impl Credential {
    fn shared_key(account: &str, key: &str) -> Result<Self> {
        let key = BASE64
            .decode(key.trim())
            .map_err(|e| auth_error(format!("account key is not valid base64: {}", e)))?;
        Ok(Credential::SharedKey {
            account: account.to_string(),
            key,
        })
    }

    fn from_token(token: &str) -> Self {
        let token = trim_query(token);
        if token.contains("sig=") {
            Credential::Sas(token)
        } else {
            Credential::Bearer(token)
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Credential::SharedKey { .. } => "shared-key",
            Credential::Sas(_) => "sas",
            Credential::Bearer(_) => "bearer",
        }
    }
}

// Keeps secrets out of logs.
impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .finish_non_exhaustive(),
            Credential::Sas(_) => f.write_str("Sas(..)"),
            Credential::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

/// A credential plus the blob endpoint a connection string may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub blob_endpoint: Option<String>,
}

impl ResolvedCredential {
    fn new(credential: Credential) -> Self {
        Self {
            credential,
            blob_endpoint: None,
        }
    }
}

fn trim_query(token: &str) -> String {
    token.trim().trim_start_matches('?').to_string()
}

fn auth_error(message: String) -> ShuttleError {
    ShuttleError::AuthResolution(message)
}

/// Parse an Azure Storage connection string.
///
/// Supports `AccountName`/`AccountKey`, `SharedAccessSignature`,
/// `BlobEndpoint`, `DefaultEndpointsProtocol` + `EndpointSuffix`, and
/// `UseDevelopmentStorage=true`.
pub fn parse_connection_string(raw: &str) -> Result<ResolvedCredential> {
    let mut account_name = None;
    let mut account_key = None;
    let mut sas = None;
    let mut blob_endpoint = None;
    let mut protocol = None;
    let mut suffix = None;
    let mut development = false;

    for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((key, value)) = part.split_once('=') else {
            return Err(
                auth_error("malformed connection string (expected Key=Value pairs)".to_string())
                    .into(),
            );
        };
        match key {
            "AccountName" => account_name = Some(value.to_string()),
            "AccountKey" => account_key = Some(value.to_string()),
            "SharedAccessSignature" => sas = Some(trim_query(value)),
            "BlobEndpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
            "DefaultEndpointsProtocol" => protocol = Some(value.to_string()),
            "EndpointSuffix" => suffix = Some(value.to_string()),
            "UseDevelopmentStorage" => development = value.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }

    if development {
        return Ok(ResolvedCredential {
            credential: Credential::shared_key(DEV_ACCOUNT, DEV_ACCOUNT_KEY)?,
            blob_endpoint: Some(blob_endpoint.unwrap_or_else(|| DEV_BLOB_ENDPOINT.to_string())),
        });
    }

    if blob_endpoint.is_none() {
        if let (Some(account), Some(suffix)) = (&account_name, &suffix) {
            let protocol = protocol.as_deref().unwrap_or("https");
            blob_endpoint = Some(format!("{}://{}.blob.{}", protocol, account, suffix));
        }
    }

    let credential = match (account_name, account_key, sas) {
        (Some(account), Some(key), _) => Credential::shared_key(&account, &key)?,
        (_, _, Some(sas)) => Credential::Sas(sas),
        _ => {
            return Err(auth_error(
                "connection string has neither AccountName/AccountKey nor SharedAccessSignature"
                    .to_string(),
            )
            .into())
        }
    };

    Ok(ResolvedCredential {
        credential,
        blob_endpoint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const KEY: &str = "c2VjcmV0LWtleQ==";

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn is_auth_error(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<ShuttleError>(),
            Some(ShuttleError::AuthResolution(_))
        )
    }

    #[test]
    fn test_ambient_prefers_embedded_sas() {
        let env = env_of(&[(ENV_ACCOUNT_KEY, KEY)]);
        let resolved = CredentialSource::Ambient
            .resolve_with("acct", Some("sv=1&sig=abc"), env)
            .unwrap();
        assert_eq!(resolved.credential, Credential::Sas("sv=1&sig=abc".into()));
    }

    #[test]
    fn test_ambient_order() {
        let env = env_of(&[
            (ENV_ACCOUNT_KEY, KEY),
            (ENV_SAS_TOKEN, "?sv=1&sig=x"),
        ]);
        let resolved = CredentialSource::Ambient.resolve_with("acct", None, env).unwrap();
        assert_eq!(
            resolved.credential,
            Credential::SharedKey {
                account: "acct".into(),
                key: b"secret-key".to_vec()
            }
        );

        let env = env_of(&[(ENV_SAS_TOKEN, "?sv=1&sig=x")]);
        let resolved = CredentialSource::Ambient.resolve_with("acct", None, env).unwrap();
        assert_eq!(resolved.credential, Credential::Sas("sv=1&sig=x".into()));

        let env = env_of(&[(ENV_TOKEN, "eyJhbGciOi")]);
        let resolved = CredentialSource::Ambient.resolve_with("acct", None, env).unwrap();
        assert_eq!(resolved.credential, Credential::Bearer("eyJhbGciOi".into()));
    }

    #[test]
    fn test_ambient_without_anything_fails() {
        let err = CredentialSource::Ambient
            .resolve_with("acct", None, env_of(&[]))
            .unwrap_err();
        assert!(is_auth_error(&err));
    }

    #[test]
    fn test_explicit_key_wins_over_env() {
        let env = env_of(&[(ENV_ACCOUNT_KEY, "bm90LXRoaXM=")]);
        let resolved = CredentialSource::AccountKey(Some(KEY.into()))
            .resolve_with("acct", None, env)
            .unwrap();
        assert!(matches!(
            resolved.credential,
            Credential::SharedKey { ref key, .. } if key == b"secret-key"
        ));
    }

    #[test]
    fn test_bad_key_is_auth_error() {
        let err = CredentialSource::AccountKey(Some("not base64 !!".into()))
            .resolve_with("acct", None, env_of(&[]))
            .unwrap_err();
        assert!(is_auth_error(&err));
    }

    #[test]
    fn test_token_mode_missing_fails() {
        let err = CredentialSource::Token(None)
            .resolve_with("acct", Some("sig=ignored"), env_of(&[]))
            .unwrap_err();
        assert!(is_auth_error(&err));
    }

    #[test]
    fn test_connection_string_with_key_and_suffix() {
        let raw = format!(
            "DefaultEndpointsProtocol=https;AccountName=other;AccountKey={};EndpointSuffix=core.windows.net",
            KEY
        );
        let resolved = parse_connection_string(&raw).unwrap();
        assert_eq!(
            resolved.blob_endpoint.as_deref(),
            Some("https://other.blob.core.windows.net")
        );
        assert!(matches!(
            resolved.credential,
            Credential::SharedKey { ref account, .. } if account == "other"
        ));
    }

    #[test]
    fn test_connection_string_with_sas() {
        let resolved = parse_connection_string(
            "BlobEndpoint=https://acct.blob.core.windows.net/;SharedAccessSignature=sv=1&sig=abc",
        )
        .unwrap();
        assert_eq!(resolved.credential, Credential::Sas("sv=1&sig=abc".into()));
        assert_eq!(
            resolved.blob_endpoint.as_deref(),
            Some("https://acct.blob.core.windows.net")
        );
    }

    #[test]
    fn test_development_storage() {
        let resolved = parse_connection_string("UseDevelopmentStorage=true").unwrap();
        assert_eq!(resolved.blob_endpoint.as_deref(), Some(DEV_BLOB_ENDPOINT));
        assert_eq!(resolved.credential.kind(), "shared-key");
    }

    #[test]
    fn test_connection_string_without_credential_fails() {
        let err = parse_connection_string("AccountName=acct").unwrap_err();
        assert!(is_auth_error(&err));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let cred = Credential::Sas("sv=1&sig=topsecret".into());
        assert!(!format!("{:?}", cred).contains("topsecret"));
    }
}
