use std::collections::HashSet;

use serde::Serialize;

use super::Store;
use crate::error::{Error, Result};

/// A job with an accepted proposal, seen as a two-party chat room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub project_id: String,
    pub title: String,
    pub status: String,
    pub client_id: String,
    pub client_name: Option<String>,
    pub provider_id: String,
    pub provider_name: Option<String>,
}

impl Project {
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.client_id == user_id || self.provider_id == user_id
    }

    pub fn display_name_of(&self, user_id: &str) -> Option<&str> {
        if self.client_id == user_id {
            self.client_name.as_deref()
        } else if self.provider_id == user_id {
            self.provider_name.as_deref()
        } else {
            None
        }
    }
}

const PROJECT_SELECT: &str = r#"
    SELECT j.job_id AS project_id, j.title, j.status,
           j.client_id, c.full_name AS client_name,
           p.provider_id, v.full_name AS provider_name
    FROM jobs j
    JOIN proposals p ON p.job_id = j.job_id AND p.status = 'accepted'
    LEFT JOIN profiles c ON c.user_id = j.client_id
    LEFT JOIN profiles v ON v.user_id = p.provider_id
"#;

impl Store {
    /// `None` when the job does not exist or has no accepted proposal yet.
    pub async fn project(&self, project_id: &str) -> Result<Option<Project>> {
        let sql = format!("{PROJECT_SELECT} WHERE j.job_id = ? ORDER BY p.proposal_id LIMIT 1");
        Ok(sqlx::query_as::<_, Project>(&sql)
            .bind(project_id)
            .fetch_optional(&self.db_pool)
            .await?)
    }

    /// Resolves the project and checks that `user_id` is one of its two parties.
    pub async fn authorize_participant(&self, user_id: &str, project_id: &str) -> Result<Project> {
        let project = self
            .project(project_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("project {project_id} not found or not in progress")))?;

        if !project.is_participant(user_id) {
            return Err(Error::forbidden("not a participant of this project"));
        }
        Ok(project)
    }

    /// Every project where `user_id` is the client or the hired provider, once each.
    pub async fn projects_for(&self, user_id: &str) -> Result<Vec<Project>> {
        let sql = format!(
            "{PROJECT_SELECT} WHERE j.client_id = ?1 OR p.provider_id = ?1 ORDER BY j.job_id, p.proposal_id"
        );
        let rows = sqlx::query_as::<_, Project>(&sql)
            .bind(user_id)
            .fetch_all(&self.db_pool)
            .await?;

        Ok(dedupe(rows))
    }
}

fn dedupe(rows: Vec<Project>) -> Vec<Project> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|project| seen.insert(project.project_id.clone()))
        .collect()
}
