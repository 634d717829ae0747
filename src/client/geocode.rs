use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::client::http;
use crate::error::AppError;
use crate::models::geofence::GeoPoint;

/// One forward-geocoding candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub display_name: String,
    pub lat: f64,
    pub lon: f64,
}

impl Suggestion {
    /// The point fed into the codec's circle-center field when the user
    /// picks this suggestion.
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.lat,
            longitude: self.lon,
        }
    }
}

/// External forward-geocoding service, consumed read-only.
#[async_trait]
pub trait GeocodingService: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<Suggestion>, AppError>;
}

pub struct HttpGeocoder {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGeocoder {
    pub fn new(client: reqwest::Client, base_url: String) -> Self {
        Self { client, base_url }
    }
}

#[async_trait]
impl GeocodingService for HttpGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<Suggestion>, AppError> {
        let response = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query), ("format", "json")])
            .send()
            .await?;

        http::parse_json(response).await
    }
}
