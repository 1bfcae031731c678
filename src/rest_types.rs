use serde::{Deserialize, Serialize};

use crate::serde_utils;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct CustomImageCreateRequest {
    pub name: String,
    pub url: String,
    pub region: String,
    pub distribution: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageResponse {
    pub image: Image,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: u64,
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "serde_utils::deserialize_empty_as_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub id: String,
    pub message: String,
}
