use reqwest::Method;
use shared::{
    domain::{IncidentKey, ProcessDefinitionKey, ProcessInstanceKey, UserProfile},
    protocol::{
        DashboardSummary, HealthStatus, LoginRequest, LoginResponse, OperateStatistics,
        RegisterUserRequest,
    },
};
use tracing::{info, warn};

use crate::{
    error::ClientError,
    transport::{expand_key, ApiClient},
};

impl ApiClient {
    /// Exchanges credentials for a token and stores it in the session.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let path = self.endpoints.token.clone();
        let response: LoginResponse = self
            .post_json(
                &path,
                &LoginRequest {
                    email: email.to_string(),
                    password: password.to_string(),
                },
            )
            .await?;
        self.session().set_token(response.token.clone());
        info!(user_id = response.user.id, "auth: signed in");
        Ok(response)
    }

    /// Validates the stored token. Any failure drops the session.
    pub async fn current_user(&self) -> Result<UserProfile, ClientError> {
        if !self.session().is_authenticated() {
            return Err(ClientError::NotLoggedIn);
        }
        let path = self.endpoints.user.clone();
        match self.get_json::<UserProfile>(&path, &[]).await {
            Ok(user) => Ok(user),
            Err(err) => {
                warn!(error = %err, "auth: session check failed");
                self.session().clear();
                Err(err)
            }
        }
    }

    pub async fn register_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<(), ClientError> {
        let path = self.endpoints.user.clone();
        self.execute(Method::POST, &path, |req| {
            req.json(&RegisterUserRequest {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
            })
        })
        .await?;
        info!(username, "auth: user registered");
        Ok(())
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let path = self.endpoints.health.clone();
        self.get_json(&path, &[]).await
    }

    pub async fn operate_statistics(&self) -> Result<OperateStatistics, ClientError> {
        let path = self.endpoints.statistics.clone();
        self.get_json(&path, &[]).await
    }

    /// Health first, then engine statistics; either failure fails the whole
    /// summary.
    pub async fn fetch_dashboard(&self) -> Result<DashboardSummary, ClientError> {
        let health = self.health().await?;
        let statistics = self.operate_statistics().await?;
        Ok(DashboardSummary {
            health,
            counts: statistics.stats.into(),
            process_stats: statistics.process,
        })
    }

    pub async fn fetch_bpmn_xml(&self, key: ProcessDefinitionKey) -> Result<String, ClientError> {
        let path = expand_key(&self.endpoints.bpmn_xml, key);
        self.get_text(&path).await
    }

    pub async fn resolve_incident(&self, key: IncidentKey) -> Result<(), ClientError> {
        let path = expand_key(&self.endpoints.resolve_incident, key);
        self.post_empty(&path).await?;
        info!(incident_key = key.0, "incident resolved");
        Ok(())
    }

    pub async fn cancel_process_instance(&self, key: ProcessInstanceKey) -> Result<(), ClientError> {
        let path = expand_key(&self.endpoints.cancel_instance, key);
        self.post_empty(&path).await?;
        info!(process_instance_key = key.0, "process instance canceled");
        Ok(())
    }
}
