use serde::{Deserialize, Deserializer};

/// The API reports "no value" for some string fields as `""` rather than
/// omitting them.
pub fn deserialize_empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
