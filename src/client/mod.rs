pub mod geocode;
pub mod geofences;
pub mod http;
pub mod locations;

pub use geocode::{GeocodingService, Suggestion};
pub use geofences::GeofenceRepository;
pub use locations::LocationFeed;
