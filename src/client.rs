use log::{debug, error, warn};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::auth::{Credential, TokenProvider};
use crate::error::{Error, Result};
use crate::types::{DeviceEntry, LocationEntry, Readings, SampleEntry};

pub const API_URL: &str = "https://ext-api.airthings.com/v1";

/// Outcome of a single request attempt
enum Attempt {
    Response(reqwest::Response),
    AuthExpired,
}

pub struct AirthingsClient {
    client: reqwest::Client,
    base_url: String,
    organization_id: Option<String>,
    credential: Credential,
    token_provider: Arc<dyn TokenProvider>,
}

impl AirthingsClient {
    pub fn new(token_provider: Arc<dyn TokenProvider>, organization_id: Option<String>) -> Self {
        Self::new_with_base_url(token_provider, organization_id, API_URL.to_string())
    }

    pub fn new_with_base_url(
        token_provider: Arc<dyn TokenProvider>,
        organization_id: Option<String>,
        base_url: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            organization_id,
            credential: token_provider.current_token(),
            token_provider,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn organization_id(&self) -> Option<&str> {
        self.organization_id.as_deref()
    }

    pub fn access_token(&self) -> &str {
        &self.credential.access_token
    }

    fn get_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let auth_value = format!("Bearer {}", self.credential.access_token);
        let auth_value = HeaderValue::from_str(&auth_value)
            .map_err(|_| Error::Auth("Access token is not a valid header value".to_string()))?;
        headers.insert(AUTHORIZATION, auth_value);

        Ok(headers)
    }

    async fn send(&self, url: &str) -> Result<Attempt> {
        if self.credential.is_expired() {
            return Ok(Attempt::AuthExpired);
        }

        let mut request = self.client.get(url).headers(self.get_headers()?);
        if let Some(organization_id) = &self.organization_id {
            request = request.query(&[("organizationId", organization_id)]);
        }

        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Ok(Attempt::AuthExpired);
        }

        Ok(Attempt::Response(response))
    }

    async fn refresh_credential(&mut self) -> Result<()> {
        self.token_provider.invalidate(&self.credential);
        let credential = self.token_provider.ensure_valid().await?;
        self.credential = credential;
        Ok(())
    }

    /// GET `path` and decode the body as JSON.
    ///
    /// An expired or rejected token is refreshed through the token provider
    /// and the request retried once. An empty body decodes to an empty object.
    pub async fn get(&mut self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = match self.send(&url).await? {
            Attempt::Response(response) => response,
            Attempt::AuthExpired => {
                warn!("Token expired.");
                self.refresh_credential().await?;

                match self.send(&url).await? {
                    Attempt::Response(response) => response,
                    Attempt::AuthExpired => {
                        error!("Access token still rejected after refresh: {}", path);
                        return Err(Error::Auth(format!(
                            "Access token rejected after refresh for {}",
                            path
                        )));
                    }
                }
            }
        };

        decode(response).await
    }

    pub async fn get_locations(&mut self) -> Result<Vec<LocationEntry>> {
        let data = self.get("/locations").await?;
        let locations = entries(&data, "locations")
            .inspect_err(|_| error!("Did not find locations: {}", data))?;

        debug!("Found {} locations", locations.len());
        Ok(locations)
    }

    pub async fn get_location_devices(&mut self, location_id: &str) -> Result<Vec<DeviceEntry>> {
        let data = self.get(&format!("/locations/{}", location_id)).await?;
        let devices = entries(&data, "devices").inspect_err(|_| {
            error!("Did not find devices on location_id {}: {}", location_id, data)
        })?;

        debug!("Found {} devices on location {}", devices.len(), location_id);
        Ok(devices)
    }

    pub async fn get_location_samples(
        &mut self,
        location_id: &str,
    ) -> Result<BTreeMap<String, Readings>> {
        let data = self
            .get(&format!("/locations/{}/latest-samples", location_id))
            .await?;
        let devices = sample_entries(&data).inspect_err(|_| {
            error!("Did not find devices on location_id {}: {}", location_id, data)
        })?;

        debug!(
            "Received latest samples for location ({}): {}",
            location_id, data["devices"]
        );

        Ok(devices
            .into_iter()
            .map(|d| (d.id, d.data.unwrap_or_default()))
            .collect())
    }
}

async fn decode(response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let response_text = response.text().await?;

    if !status.is_success() {
        // The API reports application errors as `{"error": ...}` bodies
        if let Ok(value) = serde_json::from_str::<Value>(&response_text) {
            if let Some(api_error) = value.get("error") {
                error!("API error ({}): {}", status, api_error);
                return Err(Error::Api(api_error.clone()));
            }
        }
        error!("Request failed with status {}: {}", status, response_text);
        return Err(Error::HttpStatus {
            status: status.as_u16(),
            body: response_text,
        });
    }

    if response_text.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    let value: Value = serde_json::from_str(&response_text).map_err(|e| {
        debug!("Failed to parse response: {}", e);
        Error::MalformedResponse(response_text.clone())
    })?;

    if let Some(api_error) = value.get("error") {
        error!("API error: {}", api_error);
        return Err(Error::Api(api_error.clone()));
    }

    Ok(value)
}

/// Deserialize every element of the array stored under `key`
fn entries<T: DeserializeOwned>(data: &Value, key: &str) -> Result<Vec<T>> {
    let items = data
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::unexpected_shape(key, data))?;

    items
        .iter()
        .map(|item| {
            serde_json::from_value(item.clone())
                .map_err(|e| Error::unexpected_shape(format!("{} entry ({})", key, e), item))
        })
        .collect()
}

/// Like [`entries`] for `devices`, but a malformed sample entry is dropped
/// with a warning instead of failing the whole batch
fn sample_entries(data: &Value) -> Result<Vec<SampleEntry>> {
    let items = data
        .get("devices")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::unexpected_shape("devices", data))?;

    Ok(items
        .iter()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping sample entry ({}): {}", e, item);
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthTokens, OAuthSession};
    use serde_json::json;

    fn provider() -> Arc<dyn TokenProvider> {
        Arc::new(OAuthSession::new(
            "client".to_string(),
            "secret".to_string(),
            AuthTokens {
                access_token: "access123".to_string(),
                refresh_token: "refresh456".to_string(),
                expires_at: None,
            },
            None,
        ))
    }

    #[test]
    fn test_client_creation() {
        let client = AirthingsClient::new(provider(), None);
        assert_eq!(client.base_url(), "https://ext-api.airthings.com/v1");
        assert_eq!(client.access_token(), "access123");
        assert_eq!(client.organization_id(), None);
    }

    #[test]
    fn test_client_with_custom_base_url() {
        let client = AirthingsClient::new_with_base_url(
            provider(),
            Some("org-1".to_string()),
            "https://test.example.com/".to_string(),
        );
        assert_eq!(client.base_url(), "https://test.example.com");
        assert_eq!(client.organization_id(), Some("org-1"));
    }

    #[test]
    fn test_entries_requires_array_under_key() {
        let data = json!({"locations": [{"id": "L1"}, {"id": "L2", "name": "Cabin"}]});
        let locations: Vec<LocationEntry> = entries(&data, "locations").unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[1].name.as_deref(), Some("Cabin"));

        let missing = entries::<LocationEntry>(&json!({}), "locations");
        assert!(matches!(missing, Err(Error::UnexpectedShape { .. })));

        let not_array = entries::<LocationEntry>(&json!({"locations": {}}), "locations");
        assert!(matches!(not_array, Err(Error::UnexpectedShape { .. })));
    }

    #[test]
    fn test_sample_entries_skip_malformed_entries() {
        let data = json!({"devices": [
            {"id": "D1", "data": {"temp": 21.5}},
            {"data": {"temp": 1}},
            {"id": 7, "data": {"temp": 2}}
        ]});
        let samples = sample_entries(&data).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].id, "D1");

        let missing = sample_entries(&json!({"samples": []}));
        assert!(matches!(missing, Err(Error::UnexpectedShape { .. })));
    }

    #[test]
    fn test_entries_rejects_entry_without_id() {
        let data = json!({"devices": [{"deviceType": "WAVE"}]});
        let result = entries::<DeviceEntry>(&data, "devices");
        match result {
            Err(Error::UnexpectedShape { expected, payload }) => {
                assert!(expected.starts_with("devices entry"));
                assert_eq!(payload, r#"{"deviceType":"WAVE"}"#);
            }
            other => panic!("unexpected result: {:?}", other.map(|v| v.len())),
        }
    }
}
