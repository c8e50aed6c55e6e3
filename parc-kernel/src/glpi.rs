/**
 * CLIENT GLPI - Appels REST vers l'API GLPI (apirest.php)
 *
 * RÔLE : ouverture/fermeture de session et les quelques appels dont la
 * réconciliation a besoin (ordinateurs, utilisateur affecté, statuts,
 * changement de statut, désaffectation).
 *
 * FONCTIONNEMENT :
 * - POST initSession (App-Token + user_token) → session_token
 * - chaque requête porte Session-Token + App-Token
 * - POST killSession à la fermeture, erreurs seulement loguées
 */

use crate::config::GlpiConf;
use parc_core::InventoryError;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum GlpiError {
    #[error("missing GLPI configuration: {0}")]
    MissingConfig(String),
    #[error("GLPI request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("GLPI returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected GLPI payload: {0}")]
    Payload(String),
}

impl From<GlpiError> for InventoryError {
    fn from(err: GlpiError) -> Self {
        match err {
            GlpiError::MissingConfig(keys) => InventoryError::Configuration(keys),
            GlpiError::Http(e) => InventoryError::Transport(e.to_string()),
            GlpiError::Status { status, body } => InventoryError::Upstream { status, body },
            GlpiError::Payload(msg) => InventoryError::Payload(msg),
        }
    }
}

/// Ordinateur tel que renvoyé par `Computer?expand_dropdowns=true`
#[derive(Debug, Clone, Deserialize)]
pub struct GlpiComputer {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    /// Libellé du statut si expand_dropdowns, 0 si aucun
    #[serde(default)]
    pub states_id: Value,
    #[serde(default)]
    pub date_mod: Option<String>,
    #[serde(default)]
    pub date_creation: Option<String>,
}

impl GlpiComputer {
    pub fn status_label(&self) -> Option<String> {
        self.states_id
            .as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// date_mod, sinon date_creation
    pub fn last_seen(&self) -> Option<String> {
        [&self.date_mod, &self.date_creation]
            .into_iter()
            .flatten()
            .find(|d| !d.trim().is_empty())
            .cloned()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlpiUser {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlpiState {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionOpened {
    session_token: String,
}

#[derive(Clone)]
pub struct GlpiClient {
    http: reqwest::Client,
    base_url: String,
    app_token: String,
    user_token: String,
}

impl GlpiClient {
    pub fn new(conf: &GlpiConf) -> Result<Self, GlpiError> {
        let missing = conf.missing();
        if !missing.is_empty() {
            return Err(GlpiError::MissingConfig(missing.join(", ")));
        }

        let mut builder = reqwest::Client::builder();
        if let Some(secs) = conf.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        let mut base_url = conf.url.trim().to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        Ok(Self {
            http: builder.build()?,
            base_url,
            app_token: conf.app_token.clone(),
            user_token: conf.user_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn open_session(&self) -> Result<GlpiSession, GlpiError> {
        let response = self
            .http
            .post(self.url("initSession"))
            .header("Content-Type", "application/json")
            .header("App-Token", &self.app_token)
            .header("Authorization", format!("user_token {}", self.user_token))
            .send()
            .await?;

        let opened: SessionOpened = check(response).await?.json().await?;
        debug!("session GLPI ouverte");
        Ok(GlpiSession {
            client: self.clone(),
            token: opened.session_token,
        })
    }
}

/// Session GLPI ouverte ; `close` doit être appelé en fin d'opération
pub struct GlpiSession {
    client: GlpiClient,
    token: String,
}

impl GlpiSession {
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .http
            .request(method, self.client.url(path))
            .header("Content-Type", "application/json")
            .header("Session-Token", &self.token)
            .header("App-Token", &self.client.app_token)
    }

    pub async fn list_computers(&self) -> Result<Vec<GlpiComputer>, GlpiError> {
        let response = self
            .request(Method::GET, "Computer?range=0-1000&expand_dropdowns=true")
            .send()
            .await?;
        let value: Value = check(response).await?.json().await?;
        serde_json::from_value(value).map_err(|e| GlpiError::Payload(e.to_string()))
    }

    /// Premier utilisateur lié au poste, s'il y en a un
    pub async fn assigned_user(&self, computer_id: u64) -> Result<Option<GlpiUser>, GlpiError> {
        let response = self
            .request(Method::GET, &format!("Computer/{computer_id}/User"))
            .send()
            .await?;
        let value: Value = check(response).await?.json().await?;
        let users: Vec<GlpiUser> = match value {
            Value::Array(_) => {
                serde_json::from_value(value).map_err(|e| GlpiError::Payload(e.to_string()))?
            }
            _ => Vec::new(),
        };
        Ok(users.into_iter().next())
    }

    /// Entrées `State` ; une réponse qui n'est pas une liste compte comme vide
    pub async fn list_states(&self) -> Result<Vec<GlpiState>, GlpiError> {
        let response = self.request(Method::GET, "State?range=0-100").send().await?;
        let value: Value = check(response).await?.json().await?;
        match value {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect()),
            _ => Ok(Vec::new()),
        }
    }

    pub async fn update_computer_state(&self, computer_id: u64, states_id: u64) -> Result<(), GlpiError> {
        let response = self
            .request(Method::PUT, &format!("Computer/{computer_id}"))
            .json(&json!({ "input": { "states_id": states_id } }))
            .send()
            .await?;
        let body = check(response).await?.text().await.unwrap_or_default();
        debug!("GLPI PUT Computer/{computer_id}: {body}");
        Ok(())
    }

    pub async fn unassign_user(&self, computer_id: u64) -> Result<(), GlpiError> {
        let response = self
            .request(Method::DELETE, &format!("Computer/{computer_id}/User"))
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    pub async fn close(self) {
        match self.request(Method::POST, "killSession").send().await {
            Ok(response) if response.status().is_success() => debug!("session GLPI fermée"),
            Ok(response) => warn!("killSession: HTTP {}", response.status()),
            Err(e) => warn!("killSession: {e}"),
        }
    }
}

async fn check(response: Response) -> Result<Response, GlpiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GlpiError::Status { status: status.as_u16(), body })
}
