use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use crate::client::AirthingsClient;
use crate::error::Result;
use crate::throttle::Throttle;
use crate::types::{DeviceEntry, LocationEntry, Readings};

const UNKNOWN_DEVICE_TYPE: &str = "UNKNOWN";

/// Non-owning reference from a device to the location that refreshes it.
///
/// Resolved through [`crate::LocationService::refresh_device`]; once the
/// service has replaced its locations the handle simply resolves to nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    location_id: String,
    device_id: String,
}

impl DeviceHandle {
    pub fn location_id(&self) -> &str {
        &self.location_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }
}

/// A single Airthings sensor unit
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    id: String,
    device_type: String,
    segment_name: String,
    location_id: String,
    location_name: String,
    readings: Readings,
}

impl Device {
    pub fn new(
        id: impl Into<String>,
        device_type: Option<String>,
        segment_name: Option<String>,
        location: &Location,
    ) -> Self {
        let id = id.into();
        Self {
            segment_name: segment_name.unwrap_or_else(|| id.clone()),
            id,
            device_type: device_type.unwrap_or_else(|| UNKNOWN_DEVICE_TYPE.to_string()),
            location_id: location.id.clone(),
            location_name: location.name.clone(),
            readings: Readings::new(),
        }
    }

    fn from_entry(entry: DeviceEntry, location: &Location) -> Self {
        let segment_name = entry.segment.and_then(|segment| segment.name);
        Self::new(entry.id, entry.device_type, segment_name, location)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn device_type(&self) -> &str {
        &self.device_type
    }

    /// Name of the room (segment) the device is placed in
    pub fn name(&self) -> &str {
        &self.segment_name
    }

    pub fn location_name(&self) -> &str {
        &self.location_name
    }

    pub fn readings(&self) -> &Readings {
        &self.readings
    }

    pub fn reading(&self, field: &str) -> Option<&Value> {
        self.readings.get(field)
    }

    pub fn handle(&self) -> DeviceHandle {
        DeviceHandle {
            location_id: self.location_id.clone(),
            device_id: self.id.clone(),
        }
    }

    /// Time of the device's last upload, taken from its `time` reading
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.readings.get("time").and_then(unix_timestamp)
    }

    /// Readings are replaced as a whole; fields missing from `readings` are dropped
    pub(crate) fn set_readings(&mut self, readings: Readings) {
        self.readings = readings;
    }
}

/// Convert a Unix timestamp in seconds (integer or fractional) to UTC
pub fn unix_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    if let Some(secs) = value.as_i64() {
        return DateTime::from_timestamp(secs, 0);
    }

    let secs = value.as_f64()?;
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = ((secs - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}

/// A monitored site grouping one or more devices
#[derive(Debug, Clone)]
pub struct Location {
    id: String,
    name: String,
    labels: HashMap<String, String>,
    devices: BTreeMap<String, Device>,
    initialized: bool,
    throttle: Throttle,
}

impl Location {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        labels: HashMap<String, String>,
        scan_interval: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            labels,
            devices: BTreeMap::new(),
            initialized: false,
            throttle: Throttle::new(scan_interval),
        }
    }

    pub(crate) fn from_entry(entry: LocationEntry, scan_interval: Duration) -> Self {
        Self::new(
            entry.id,
            entry.name.unwrap_or_default(),
            entry.labels.unwrap_or_default(),
            scan_interval,
        )
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &HashMap<String, String> {
        &self.labels
    }

    pub fn devices(&self) -> &BTreeMap<String, Device> {
        &self.devices
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.get(device_id)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub(crate) fn build_devices(&self, entries: Vec<DeviceEntry>) -> BTreeMap<String, Device> {
        entries
            .into_iter()
            .map(|entry| {
                let device = Device::from_entry(entry, self);
                (device.id.clone(), device)
            })
            .collect()
    }

    pub(crate) fn install_devices(&mut self, devices: BTreeMap<String, Device>) {
        self.devices = devices;
    }

    /// Fetch the device set once, then load the first readings.
    ///
    /// On failure the location is left without devices so the caller can
    /// skip it for this cycle and retry later.
    pub async fn initialize(&mut self, client: &mut AirthingsClient) -> Result<()> {
        if self.initialized {
            self.update_devices(client).await?;
            return Ok(());
        }

        let entries = client.get_location_devices(&self.id).await?;
        let devices = self.build_devices(entries);
        self.install_devices(devices);

        if let Err(e) = self.force_update_devices(client).await {
            self.devices.clear();
            return Err(e);
        }

        self.initialized = true;
        debug!(
            "Initialized location {} with {} devices",
            self.id,
            self.devices.len()
        );
        Ok(())
    }

    /// Refresh readings of all devices, at most once per scan interval.
    ///
    /// Returns `false` when the call was throttled.
    pub async fn update_devices(&mut self, client: &mut AirthingsClient) -> Result<bool> {
        if !self.throttle.is_ready() {
            debug!("Skipping update of location {}, throttled", self.id);
            return Ok(false);
        }

        self.force_update_devices(client).await?;
        Ok(true)
    }

    pub async fn force_update_devices(&mut self, client: &mut AirthingsClient) -> Result<()> {
        let samples = client.get_location_samples(&self.id).await?;
        self.apply_samples(samples);
        self.throttle.mark();
        Ok(())
    }

    pub(crate) fn apply_samples(&mut self, samples: BTreeMap<String, Readings>) {
        for (device_id, readings) in samples {
            match self.devices.get_mut(&device_id) {
                Some(device) => device.set_readings(readings),
                None => warn!(
                    "Device not created for {}, but got data: {}",
                    device_id,
                    Value::Object(readings)
                ),
            }
        }
    }
}
