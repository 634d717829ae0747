use async_trait::async_trait;

use crate::client::http;
use crate::error::AppError;
use crate::models::geofence::{Geofence, GeofenceDraft};

/// CRUD facade over the geofence REST endpoints.
///
/// Implementations classify errors but never retry; the one mandated
/// re-attempt (re-listing after a successful mutation) belongs to the
/// reconciliation controller.
#[async_trait]
pub trait GeofenceRepository: Send + Sync {
    async fn create(&self, draft: &GeofenceDraft) -> Result<Geofence, AppError>;
    async fn update(&self, id: &str, draft: &GeofenceDraft) -> Result<Geofence, AppError>;
    async fn delete(&self, id: &str) -> Result<(), AppError>;
    async fn list(&self) -> Result<Vec<Geofence>, AppError>;
}

pub struct HttpGeofenceRepository {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeofenceRepository {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl GeofenceRepository for HttpGeofenceRepository {
    async fn create(&self, draft: &GeofenceDraft) -> Result<Geofence, AppError> {
        let response = self
            .client
            .post(format!("{}/geofences", self.base_url))
            .json(draft)
            .send()
            .await?;

        http::parse_json(response).await
    }

    async fn update(&self, id: &str, draft: &GeofenceDraft) -> Result<Geofence, AppError> {
        let response = self
            .client
            .put(format!("{}/geofences/{id}", self.base_url))
            .json(draft)
            .send()
            .await?;

        http::parse_json(response).await
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        let response = self
            .client
            .delete(format!("{}/geofences/{id}", self.base_url))
            .send()
            .await?;

        http::check_ok(response).await
    }

    async fn list(&self) -> Result<Vec<Geofence>, AppError> {
        let response = self
            .client
            .get(format!("{}/geofences", self.base_url))
            .send()
            .await?;

        http::parse_json(response).await
    }
}
