use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::client::AirthingsClient;
use crate::error::Result;
use crate::models::{Device, DeviceHandle, Location};
use crate::throttle::{Throttle, SCAN_INTERVAL};
use crate::types::Readings;

/// Outcome of one refresh cycle across all locations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub refreshed: usize,
    pub throttled: usize,
    pub failed: usize,
}

/// Owns the client and every location of the account
pub struct LocationService {
    client: AirthingsClient,
    locations: Vec<Location>,
    scan_interval: Duration,
    throttle: Throttle,
}

impl LocationService {
    pub fn new(client: AirthingsClient) -> Self {
        Self::new_with_scan_interval(client, SCAN_INTERVAL)
    }

    pub fn new_with_scan_interval(client: AirthingsClient, scan_interval: Duration) -> Self {
        Self {
            client,
            locations: Vec::new(),
            scan_interval,
            throttle: Throttle::new(scan_interval),
        }
    }

    pub fn client(&self) -> &AirthingsClient {
        &self.client
    }

    pub fn scan_interval(&self) -> Duration {
        self.scan_interval
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn location(&self, location_id: &str) -> Option<&Location> {
        self.locations.iter().find(|l| l.id() == location_id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.locations.iter().flat_map(|l| l.devices().values())
    }

    pub fn device(&self, handle: &DeviceHandle) -> Option<&Device> {
        self.location(handle.location_id())
            .and_then(|l| l.device(handle.device_id()))
    }

    /// Replace the held locations with the account's current list.
    ///
    /// Devices are not fetched here; see [`Location::initialize`].
    pub async fn refresh_locations(&mut self) -> Result<&[Location]> {
        let entries = self.client.get_locations().await?;
        let scan_interval = self.scan_interval;

        self.locations = entries
            .into_iter()
            .map(|entry| Location::from_entry(entry, scan_interval))
            .collect();

        info!("Found {} locations", self.locations.len());
        Ok(&self.locations)
    }

    /// Fetch a fresh device map for `location` without installing it
    pub async fn get_location_devices(
        &mut self,
        location: &Location,
    ) -> Result<BTreeMap<String, Device>> {
        let entries = self.client.get_location_devices(location.id()).await?;
        Ok(location.build_devices(entries))
    }

    pub async fn get_location_samples(
        &mut self,
        location_id: &str,
    ) -> Result<BTreeMap<String, Readings>> {
        self.client.get_location_samples(location_id).await
    }

    /// Account-level refresh, at most once per scan interval.
    ///
    /// Returns `None` when throttled.
    pub async fn initialize_locations(&mut self) -> Result<Option<CycleReport>> {
        if !self.throttle.is_ready() {
            debug!("Skipping location refresh, throttled");
            return Ok(None);
        }

        self.force_initialize_locations().await.map(Some)
    }

    /// Refresh the location list and initialize every location in turn.
    ///
    /// A location that fails to initialize is skipped for this cycle; only a
    /// failure to list locations aborts the whole refresh.
    pub async fn force_initialize_locations(&mut self) -> Result<CycleReport> {
        self.refresh_locations().await?;

        let mut report = CycleReport::default();

        for location in self.locations.iter_mut() {
            match location.initialize(&mut self.client).await {
                Ok(()) => report.refreshed += 1,
                Err(e) => {
                    warn!("Cannot initialize location {}: {}", location.id(), e);
                    report.failed += 1;
                }
            }
        }

        self.throttle.mark();
        Ok(report)
    }

    /// One periodic cycle: update every location, retrying initialization of
    /// those that have not come up yet. Locations refreshed within the scan
    /// interval are skipped.
    pub async fn update_all(&mut self) -> CycleReport {
        self.run_cycle(false).await
    }

    /// Like [`update_all`](Self::update_all) but ignores the per-location
    /// throttle. Meant for the scheduler that owns the polling interval.
    pub async fn force_update_all(&mut self) -> CycleReport {
        self.run_cycle(true).await
    }

    async fn run_cycle(&mut self, force: bool) -> CycleReport {
        let mut report = CycleReport::default();

        for location in self.locations.iter_mut() {
            let result = if !location.is_initialized() {
                location.initialize(&mut self.client).await.map(|()| true)
            } else if force {
                location.force_update_devices(&mut self.client).await.map(|()| true)
            } else {
                location.update_devices(&mut self.client).await
            };

            match result {
                Ok(true) => report.refreshed += 1,
                Ok(false) => report.throttled += 1,
                Err(e) => {
                    warn!("Cannot update devices of location {}: {}", location.id(), e);
                    report.failed += 1;
                }
            }
        }

        debug!(
            "Cycle finished: {} refreshed, {} throttled, {} failed",
            report.refreshed, report.throttled, report.failed
        );
        report
    }

    /// Refresh the readings of the location owning `handle`.
    ///
    /// Siblings of the device are refreshed too, since samples are only
    /// available per location. A location that was replaced since the handle
    /// was taken is initialized first. Returns `None` if the handle no longer
    /// resolves to a device.
    pub async fn refresh_device(&mut self, handle: &DeviceHandle) -> Result<Option<&Device>> {
        let Some(location) = self
            .locations
            .iter_mut()
            .find(|l| l.id() == handle.location_id())
        else {
            debug!(
                "Location {} of device {} is gone",
                handle.location_id(),
                handle.device_id()
            );
            return Ok(None);
        };

        if location.is_initialized() {
            location.update_devices(&mut self.client).await?;
        } else {
            location.initialize(&mut self.client).await?;
        }
        Ok(location.device(handle.device_id()))
    }
}
