use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ToolError;
use crate::models::{Coordinates, DistanceQuery, DistanceResult, Location};
use crate::services::retry::{check_status, with_retry, RetryPolicy};

/// Mean Earth radius in statute miles.
pub const EARTH_RADIUS_MILES: f64 = 3958.8;

/// Great-circle distance in miles (haversine formula).
pub fn haversine_miles(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();
    EARTH_RADIUS_MILES * c
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, location: &Location) -> Result<Coordinates, ToolError>;
}

#[derive(Debug, Deserialize)]
struct ZipcodeResponse {
    places: Vec<ZipcodePlace>,
}

#[derive(Debug, Deserialize)]
struct ZipcodePlace {
    latitude: String,
    longitude: String,
}

#[derive(Debug, Deserialize)]
struct AddressMatch {
    lat: String,
    lon: String,
}

/// Resolves zipcodes through a Zippopotam.us-style API and free-form
/// addresses through a Nominatim-style search API.
pub struct HttpGeocoder {
    client: reqwest::Client,
    zipcode_base_url: String,
    address_base_url: String,
    retry: RetryPolicy,
}

impl HttpGeocoder {
    pub fn new(
        zipcode_base_url: String,
        address_base_url: String,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("dealer-insights-backend/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            zipcode_base_url: zipcode_base_url.trim_end_matches('/').to_string(),
            address_base_url: address_base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn resolve_zipcode(&self, zipcode: &str) -> Result<Coordinates, ToolError> {
        let url = format!("{}/us/{}", self.zipcode_base_url, zipcode);
        let (client, url) = (&self.client, url.as_str());

        let result = with_retry(&self.retry, "zipcode geocoding", || async move {
            let response = client.get(url).send().await?;
            let response = check_status(response).await?;
            Ok::<_, ToolError>(response.json::<ZipcodeResponse>().await?)
        })
        .await;

        let body = match result {
            Ok(body) => body,
            Err(ToolError::Status { status: 404, .. }) => {
                return Err(ToolError::Lookup(format!("Unknown zipcode {}", zipcode)));
            }
            Err(e) => return Err(e),
        };

        let place = body
            .places
            .first()
            .ok_or_else(|| ToolError::Lookup(format!("No places for zipcode {}", zipcode)))?;
        parse_pair(&place.latitude, &place.longitude)
    }

    async fn resolve_address(&self, address: &str) -> Result<Coordinates, ToolError> {
        let url = format!("{}/search", self.address_base_url);
        let (client, url) = (&self.client, url.as_str());

        let matches = with_retry(&self.retry, "address geocoding", || async move {
            let response = client
                .get(url)
                .query(&[("q", address), ("format", "json"), ("limit", "1")])
                .send()
                .await?;
            let response = check_status(response).await?;
            Ok::<_, ToolError>(response.json::<Vec<AddressMatch>>().await?)
        })
        .await?;

        let first = matches
            .first()
            .ok_or_else(|| ToolError::Lookup(format!("Address not found: {}", address)))?;
        parse_pair(&first.lat, &first.lon)
    }
}

fn parse_pair(lat: &str, lon: &str) -> Result<Coordinates, ToolError> {
    let latitude = lat
        .trim()
        .parse::<f64>()
        .map_err(|_| ToolError::InvalidResponse(format!("Bad latitude '{}'", lat)))?;
    let longitude = lon
        .trim()
        .parse::<f64>()
        .map_err(|_| ToolError::InvalidResponse(format!("Bad longitude '{}'", lon)))?;
    Coordinates::new(latitude, longitude)
        .ok_or_else(|| ToolError::InvalidResponse(format!("Coordinates out of range: {}, {}", lat, lon)))
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn resolve(&self, location: &Location) -> Result<Coordinates, ToolError> {
        match location {
            Location::Coordinates(c) => Ok(*c),
            Location::Zipcode(zip) => self.resolve_zipcode(zip).await,
            Location::Address(address) => self.resolve_address(address).await,
        }
    }
}

pub struct DistanceCalculator {
    geocoder: Arc<dyn Geocoder>,
}

impl DistanceCalculator {
    pub fn new(geocoder: Arc<dyn Geocoder>) -> Self {
        Self { geocoder }
    }

    pub async fn distance(&self, query: &DistanceQuery) -> Result<DistanceResult, ToolError> {
        let (origin, destination) = futures::try_join!(
            self.geocoder.resolve(&query.origin),
            self.geocoder.resolve(&query.destination),
        )?;

        Ok(DistanceResult {
            miles: haversine_miles(origin, destination),
            origin,
            destination,
        })
    }
}
