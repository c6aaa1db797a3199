use std::fmt;

use anyhow::Context;
use oauth2::{basic::BasicClient, AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;

use crate::{config::Config, AppResult, GetField};

use super::AuthError;

type HappyClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    pub fn key(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    fn auth_url(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "https://accounts.google.com/o/oauth2/auth",
            Github => "https://github.com/login/oauth/authorize",
        }
    }

    fn token_url(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "https://oauth2.googleapis.com/token",
            Github => "https://github.com/login/oauth/access_token",
        }
    }

    pub fn scopes(&self) -> &'static [&'static str] {
        use ClientProvider::*;
        match self {
            Google => &["openid", "email", "profile"],
            Github => &["read:user", "user:email"],
        }
    }

    pub fn userinfo_url(&self) -> &'static str {
        use ClientProvider::*;
        match self {
            Google => "https://www.googleapis.com/oauth2/v2/userinfo",
            Github => "https://api.github.com/user",
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone, Default)]
pub struct Clients {
    google_client: Option<HappyClient>,
    github_client: Option<HappyClient>,
}

impl Clients {
    /// Reads the credentials file named in the config. No file means no OAuth providers.
    pub fn load(config: &Config) -> anyhow::Result<Clients> {
        let Some(path) = &config.oauth_clients else {
            return Ok(Clients::default());
        };
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading OAuth clients from {}", path.display()))?;
        let json: Value = serde_json::from_str(&json)?;

        Clients::from_json(json, &config.public_url).map_err(|e| e.0)
    }

    pub fn from_json(json: Value, public_url: &str) -> AppResult<Clients> {
        let client = |provider: ClientProvider| -> AppResult<Option<HappyClient>> {
            let Some(json) = json.get(provider.key()) else {
                return Ok(None);
            };
            let client_id = ClientId::new(json.get_str_field("client_id")?);
            let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

            let auth_url = AuthUrl::new(provider.auth_url().to_owned())?;
            let token_url = TokenUrl::new(provider.token_url().to_owned())?;
            let redirect_url = RedirectUrl::new(format!(
                "{}/auth/oauth/{}/callback",
                public_url.trim_end_matches('/'),
                provider.key()
            ))?;

            Ok(Some(
                BasicClient::new(client_id)
                .set_client_secret(client_secret)
                .set_auth_uri(auth_url)
                .set_token_uri(token_url)
                .set_redirect_uri(redirect_url)
            ))
        };

        Ok(
            Clients {
                google_client: client(ClientProvider::Google)?,
                github_client: client(ClientProvider::Github)?,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> Result<HappyClient, AuthError> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or(AuthError::ProviderUnavailable(provider))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn only_configured_providers_are_available() {
        let clients = Clients::from_json(
            json!({ "google": { "client_id": "id", "client_secret": "secret" } }),
            "http://localhost:8080",
        )
        .unwrap();

        let google = clients.get_client(ClientProvider::Google).unwrap();
        assert_eq!(
            google.redirect_uri().unwrap().as_str(),
            "http://localhost:8080/auth/oauth/google/callback"
        );
        assert!(matches!(
            clients.get_client(ClientProvider::Github),
            Err(AuthError::ProviderUnavailable(ClientProvider::Github))
        ));
    }

    #[test]
    fn missing_secret_is_an_error() {
        let result = Clients::from_json(json!({ "github": { "client_id": "id" } }), "http://x");
        assert!(result.is_err());
    }
}
