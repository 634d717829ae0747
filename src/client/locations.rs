use async_trait::async_trait;

use crate::client::http;
use crate::error::AppError;
use crate::models::location::VehicleLocation;

/// Read-only source of live vehicle positions.
#[async_trait]
pub trait LocationFeed: Send + Sync {
    /// Full current location set; each call replaces the last, nothing is
    /// merged incrementally.
    async fn list_locations(&self) -> Result<Vec<VehicleLocation>, AppError>;

    /// Single vehicle lookup, used for on-demand "center on vehicle".
    async fn vehicle_location(&self, vehicle_id: &str) -> Result<VehicleLocation, AppError>;
}

pub struct HttpLocationFeed {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLocationFeed {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl LocationFeed for HttpLocationFeed {
    async fn list_locations(&self) -> Result<Vec<VehicleLocation>, AppError> {
        let response = self
            .client
            .get(format!("{}/locations", self.base_url))
            .send()
            .await?;

        http::parse_json(response).await
    }

    async fn vehicle_location(&self, vehicle_id: &str) -> Result<VehicleLocation, AppError> {
        let response = self
            .client
            .get(format!("{}/vehicles/{vehicle_id}/location", self.base_url))
            .send()
            .await?;

        http::parse_json(response).await
    }
}
