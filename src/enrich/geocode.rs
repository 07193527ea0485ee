//! Optional geocoding of free-text pickup locations.
//!
//! Not part of the ingestion path: the catalog stores only the location text.
//! Failures are typed so callers can surface them; nothing here retries.

use anyhow::Context;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use super::TextModel;
use crate::config::Config;
use crate::constants::{LOCATION_NOT_FOUND, USER_AGENT};

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("no location to geocode")]
    LocationNotFound,
    #[error("geocoding failed with status {status} for '{address}'")]
    Status { status: String, address: String },
    #[error("geocoding request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoding response had no coordinates")]
    Malformed,
}

/// A resolved point.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Coordinates,
}

/// Client for a Google-Geocoding-compatible JSON endpoint.
#[derive(Clone)]
pub struct GoogleGeocoder {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleGeocoder {
    /// Build a geocoder from configuration, or `None` when no API key is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> anyhow::Result<Option<Self>> {
        let Some(api_key) = config.google_api_key.clone() else {
            return Ok(None);
        };
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Some(Self {
            http,
            base_url: config.geocode_base_url.clone(),
            api_key,
        }))
    }

    /// Resolve an address to coordinates.
    ///
    /// # Errors
    ///
    /// Returns a [`GeocodeError`] for the not-found sentinel, transport
    /// failures, non-`OK` statuses and empty results.
    pub async fn geocode(&self, address: &str) -> Result<Coordinates, GeocodeError> {
        if address.trim().is_empty() || address == LOCATION_NOT_FOUND {
            return Err(GeocodeError::LocationNotFound);
        }

        debug!(address = %address, "Geocoding address");

        let response: GeocodeResponse = self
            .http
            .get(&self.base_url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status != "OK" {
            return Err(GeocodeError::Status {
                status: response.status,
                address: address.to_string(),
            });
        }

        response
            .results
            .into_iter()
            .next()
            .map(|r| r.geometry.location)
            .ok_or(GeocodeError::Malformed)
    }
}

impl std::fmt::Debug for GoogleGeocoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleGeocoder")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Turn a free-text campus location into something a geocoder can find.
///
/// Returns `None` for the sentinel, when the model is missing or fails, or
/// when it cannot name a place.
pub async fn describe_address(
    model: Option<&dyn TextModel>,
    location: &str,
    campus: &str,
) -> Option<String> {
    if location == LOCATION_NOT_FOUND {
        return None;
    }
    let model = model?;

    let prompt = format!(
        "Here is a description of a place near {campus}: {location}. If it mentions building number: what is the full name of building number? Include the word \"building\" in the name. If it mentions building or field name: what is the name? If it refers to a specific address, what is the address? If it refers to a general area, what is in that area? Give me only the building number or name. Do not include the room number or any additional text. If you can't tell, return \"{LOCATION_NOT_FOUND}\"."
    );

    let answer = match model.complete(None, &prompt).await {
        Ok(answer) => answer.trim().to_string(),
        Err(e) => {
            debug!(location = %location, "Address description unavailable: {e:#}");
            return None;
        }
    };

    if answer.is_empty() || answer.contains(LOCATION_NOT_FOUND) {
        return None;
    }
    Some(qualify_address(&answer, campus))
}

/// Anchor a bare building or place name to the campus.
fn qualify_address(answer: &str, campus: &str) -> String {
    if answer.to_lowercase().contains("building") {
        format!("{campus} building {answer}")
    } else {
        format!("{answer} near {campus}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify_address() {
        assert_eq!(qualify_address("Building 32", "MIT"), "MIT building Building 32");
        assert_eq!(qualify_address("Stratton Student Center", "MIT"), "Stratton Student Center near MIT");
    }

    #[tokio::test]
    async fn test_describe_sentinel_is_none() {
        assert!(describe_address(None, LOCATION_NOT_FOUND, "MIT").await.is_none());
        assert!(describe_address(None, "Building 32", "MIT").await.is_none());
    }
}
