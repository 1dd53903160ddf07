use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use shared::domain::DeploymentStatus;
use tracing::debug;
use url::Url;

use crate::error::StateQueryError;

pub const DEPLOYMENTS_PATH: &str = "/api/deployments";

/// Ground-truth deployment state, consulted after every session.
#[async_trait]
pub trait StateQuery: Send + Sync {
    async fn fetch_status(&self, target_name: &str) -> Result<DeploymentStatus, StateQueryError>;
}

pub struct MissingStateQuery;

#[async_trait]
impl StateQuery for MissingStateQuery {
    async fn fetch_status(&self, _target_name: &str) -> Result<DeploymentStatus, StateQueryError> {
        Err(StateQueryError::Unavailable)
    }
}

pub struct HttpStateQuery {
    http: Client,
    server_url: String,
    path: String,
}

impl HttpStateQuery {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            path: DEPLOYMENTS_PATH.to_string(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn deployment_url(&self, target_name: &str) -> Result<Url, StateQueryError> {
        let mut url = Url::parse(&self.server_url)?;
        url.path_segments_mut()
            .map_err(|_| StateQueryError::CannotBeABase(self.server_url.clone()))?
            .pop_if_empty()
            .extend(self.path.split('/').filter(|segment| !segment.is_empty()))
            .push(target_name);
        Ok(url)
    }
}

#[async_trait]
impl StateQuery for HttpStateQuery {
    async fn fetch_status(&self, target_name: &str) -> Result<DeploymentStatus, StateQueryError> {
        let url = self.deployment_url(target_name)?;
        debug!(%url, "fetching deployment state");
        let deployment: Value = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(DeploymentStatus::from_deployment(&deployment)?)
    }
}
