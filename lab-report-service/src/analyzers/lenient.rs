//! Field deserializers for model-produced JSON. A value of the wrong shape
//! reads as absent, so the structure check reports the gap instead of the
//! whole answer failing to parse.
//!
//! Fields using these need `#[serde(default)]` so a missing key is absent too.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `null` or a mistyped value becomes `None`.
pub(crate) fn optional<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

pub(crate) fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    optional(deserializer).map(Option::unwrap_or_default)
}

/// An array keeps its well-formed entries; anything else is `None`.
pub(crate) fn optional_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Value::deserialize(deserializer)? {
        Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        )),
        _ => Ok(None),
    }
}

pub(crate) fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    optional_list(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Sample {
        #[serde(deserialize_with = "optional")]
        score: Option<f64>,
        #[serde(deserialize_with = "or_default")]
        label: String,
        #[serde(deserialize_with = "optional_list")]
        values: Option<Vec<f64>>,
        #[serde(deserialize_with = "list")]
        notes: Vec<String>,
    }

    #[test]
    fn mistyped_and_null_fields_read_as_absent() {
        let sample: Sample = serde_json::from_str(
            r#"{"score": null, "label": 7, "values": "none", "notes": null}"#,
        )
        .unwrap();

        assert_eq!(sample.score, None);
        assert_eq!(sample.label, "");
        assert_eq!(sample.values, None);
        assert!(sample.notes.is_empty());
    }

    #[test]
    fn lists_keep_well_formed_entries() {
        let sample: Sample =
            serde_json::from_str(r#"{"score": 12.5, "values": [1, "two", 3], "notes": ["a", null]}"#)
                .unwrap();

        assert_eq!(sample.score, Some(12.5));
        assert_eq!(sample.values, Some(vec![1.0, 3.0]));
        assert_eq!(sample.notes, vec!["a"]);

        let empty: Sample = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.values, None);
    }
}
