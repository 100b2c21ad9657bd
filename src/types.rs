use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Field name → latest value, as reported in a device's `data` object
pub type Readings = Map<String, Value>;

#[derive(Debug, Deserialize, Clone)]
pub struct LocationEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceEntry {
    pub id: String,
    #[serde(rename = "deviceType", default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub segment: Option<Segment>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Segment {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SampleEntry {
    pub id: String,
    #[serde(default)]
    pub data: Option<Readings>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_entry_defaults() {
        let entry: LocationEntry = serde_json::from_str(r#"{"id":"L1"}"#).unwrap();
        assert_eq!(entry.id, "L1");
        assert_eq!(entry.name, None);
        assert_eq!(entry.labels, None);

        let entry: LocationEntry =
            serde_json::from_str(r#"{"id":"L1","name":"Home","labels":null}"#).unwrap();
        assert_eq!(entry.name, Some("Home".to_string()));
        assert_eq!(entry.labels, None);
    }

    #[test]
    fn test_device_entry_parsing() {
        let json = r#"{"id":"D1","deviceType":"WAVE_PLUS","segment":{"id":"S1","name":"Bedroom"}}"#;
        let entry: DeviceEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, "D1");
        assert_eq!(entry.device_type, Some("WAVE_PLUS".to_string()));
        assert_eq!(
            entry.segment.and_then(|s| s.name),
            Some("Bedroom".to_string())
        );

        let entry: DeviceEntry =
            serde_json::from_str(r#"{"id":"D2","deviceType":null}"#).unwrap();
        assert_eq!(entry.device_type, None);
        assert!(entry.segment.is_none());

        let entry: DeviceEntry =
            serde_json::from_str(r#"{"id":"D3","segment":{"id":42,"name":"Attic"}}"#).unwrap();
        assert_eq!(entry.segment.and_then(|s| s.name), Some("Attic".to_string()));
    }

    #[test]
    fn test_sample_entry_without_data() {
        let entry: SampleEntry = serde_json::from_str(r#"{"id":"D1"}"#).unwrap();
        assert!(entry.data.is_none());

        let entry: SampleEntry =
            serde_json::from_str(r#"{"id":"D1","data":{"temp":21.5}}"#).unwrap();
        assert_eq!(entry.data.unwrap().get("temp"), Some(&Value::from(21.5)));
    }
}
