pub mod controller;
pub mod geocoder;
pub mod poller;
