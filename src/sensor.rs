use log::warn;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;

use crate::models::Device;
use crate::service::LocationService;

pub const MANUFACTURER: &str = "Airthings";

/// The `time` reading is surfaced as `last_synced`, not as its own sensor
const TIME_FIELD: &str = "time";

/// Display metadata for one reading field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorType {
    pub field: Cow<'static, str>,
    pub name: Cow<'static, str>,
    pub icon: &'static str,
    pub unit: Option<&'static str>,
    pub device_class: Option<&'static str>,
}

const fn sensor_type(
    field: &'static str,
    name: &'static str,
    icon: &'static str,
    unit: Option<&'static str>,
    device_class: Option<&'static str>,
) -> SensorType {
    SensorType {
        field: Cow::Borrowed(field),
        name: Cow::Borrowed(name),
        icon,
        unit,
        device_class,
    }
}

pub const SENSOR_TYPES: &[SensorType] = &[
    sensor_type("humidity", "Humidity", "mdi:water-percent", Some("%"), Some("humidity")),
    sensor_type("temp", "Temperature", "mdi:thermometer", Some("°C"), Some("temperature")),
    sensor_type("co2", "CO2", "mdi:molecule-co2", Some("ppm"), None),
    sensor_type("voc", "VOC", "mdi:chemical-weapon", Some("ppb"), None),
    sensor_type("pressure", "Pressure", "mdi:gauge", Some("mbar"), Some("pressure")),
    sensor_type("light", "Light level", "mdi:white-balance-sunny", Some("%"), Some("illuminance")),
    sensor_type(
        "radonShortTermAvg",
        "Radon Short term average",
        "mdi:atom",
        Some("Bq/m³ 24h avg"),
        None,
    ),
    sensor_type("mold", "Mold risk indicator", "mdi:mushroom-outline", Some("/ 10"), None),
    sensor_type("virusRisk", "Virus risk indicator", "mdi:virus-outline", Some("/ 10"), None),
    sensor_type("time", "Last synced", "mdi:clock", None, Some("timestamp")),
];

pub fn is_known_field(field: &str) -> bool {
    SENSOR_TYPES.iter().any(|t| t.field == field)
}

/// Look up `field`, falling back to a generic descriptor named after the field
pub fn get_sensor_type(field: &str) -> SensorType {
    SENSOR_TYPES
        .iter()
        .find(|t| t.field == field)
        .cloned()
        .unwrap_or_else(|| SensorType {
            field: Cow::Owned(field.to_string()),
            name: Cow::Owned(field.to_string()),
            icon: "mdi:unknown",
            unit: None,
            device_class: None,
        })
}

/// One exposed measurement: a device paired with one of its reading fields
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorEntity {
    pub unique_id: String,
    pub name: String,
    pub device_name: String,
    pub model: String,
    pub field: String,
    pub state: Option<Value>,
    pub unit: Option<&'static str>,
    pub icon: &'static str,
    pub device_class: Option<&'static str>,
    pub last_synced: Option<String>,
}

impl SensorEntity {
    pub fn new(device: &Device, field: &str) -> Self {
        let sensor_type = get_sensor_type(field);
        let device_name = format!("{} {}", device.location_name(), device.name());

        Self {
            unique_id: format!("{}-{}", device.id(), sensor_type.field),
            name: format!("{} {} {}", MANUFACTURER, device_name, sensor_type.name),
            device_name,
            model: device.device_type().to_string(),
            field: sensor_type.field.into_owned(),
            state: device.reading(field).cloned(),
            unit: sensor_type.unit,
            icon: sensor_type.icon,
            device_class: sensor_type.device_class,
            last_synced: device.last_synced_at().map(|t| t.to_rfc3339()),
        }
    }

    pub fn available(&self) -> bool {
        !matches!(self.state, None | Some(Value::Null))
    }

    /// State rendered for display, with the unit appended when there is one
    pub fn display_state(&self) -> String {
        let value = match &self.state {
            None | Some(Value::Null) => return "Unavailable".to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        match self.unit {
            Some(unit) => format!("{} {}", value, unit),
            None => value,
        }
    }
}

/// Project every device reading of `service` into a sensor entity
pub fn entities(service: &LocationService) -> Vec<SensorEntity> {
    let mut entities = Vec::new();

    for device in service.devices() {
        for field in device.readings().keys() {
            if field == TIME_FIELD {
                continue;
            }

            let entity = SensorEntity::new(device, field);
            if !is_known_field(field) {
                warn!(
                    "Sensor '{}' has unknown field '{}' with state {}",
                    entity.name,
                    field,
                    entity.display_state()
                );
            }
            entities.push(entity);
        }
    }

    entities
}
