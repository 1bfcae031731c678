use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::debug;
use url::Url;

use crate::error::UploaderError;
use crate::rest_types::{CustomImageCreateRequest, ErrorResponse, Image, ImageResponse};

pub const DEFAULT_API_BASE_URL: &str = "https://api.digitalocean.com/";

const IMAGES_ROUTE: &str = "v2/images";

/// The part of the provider API the import needs.
#[async_trait]
pub trait ImageApi: Send + Sync {
    async fn create_custom_image(
        &self,
        request: &CustomImageCreateRequest,
    ) -> Result<Image, UploaderError>;

    async fn get_image(&self, id: u64) -> Result<Image, UploaderError>;
}

pub struct DigitalOceanClient {
    client: Client,
    api_base_url: Url,
    api_token: String,
}

impl DigitalOceanClient {
    pub fn new(mut api_base_url: Url, api_token: String) -> Self {
        if !api_base_url.path().ends_with('/') {
            let path = format!("{}/", api_base_url.path());
            api_base_url.set_path(&path);
        }

        Self {
            client: Client::new(),
            api_base_url,
            api_token,
        }
    }

    fn images_url(&self, id: Option<u64>) -> Result<Url, String> {
        let route = match id {
            Some(id) => format!("{}/{}", IMAGES_ROUTE, id),
            None => IMAGES_ROUTE.to_string(),
        };
        self.api_base_url
            .join(&route)
            .map_err(|e| format!("Failed to construct images URL: {}", e))
    }
}

async fn read_image(response: Response) -> Result<Image, String> {
    let status = response.status();

    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        if let Ok(error) = serde_json::from_str::<ErrorResponse>(&error_body) {
            return Err(format!("{} ({}): {}", status, error.id, error.message));
        }
        return Err(format!("{} - {}", status, error_body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| format!("Failed to read response: {}", e))?;

    serde_json::from_str::<ImageResponse>(&body)
        .map(|response| response.image)
        .map_err(|e| format!("Failed to parse response: {} - Body: {}", e, body))
}

#[async_trait]
impl ImageApi for DigitalOceanClient {
    async fn create_custom_image(
        &self,
        request: &CustomImageCreateRequest,
    ) -> Result<Image, UploaderError> {
        let url = self.images_url(None).map_err(UploaderError::ProviderRequest)?;

        debug!("Creating custom image {} in {}", request.name, request.region);

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .json(request)
            .send()
            .await
            .map_err(|e| UploaderError::ProviderRequest(format!("API request failed: {}", e)))?;

        read_image(response)
            .await
            .map_err(UploaderError::ProviderRequest)
    }

    async fn get_image(&self, id: u64) -> Result<Image, UploaderError> {
        let url = self.images_url(Some(id)).map_err(UploaderError::ProviderPoll)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(|e| UploaderError::ProviderPoll(format!("API request failed: {}", e)))?;

        read_image(response).await.map_err(UploaderError::ProviderPoll)
    }
}
