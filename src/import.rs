//! Submits a custom image import and follows it until it settles.

use std::{path::PathBuf, time::Duration};

use tracing::{debug, info, warn};
use url::Url;

use crate::{
    client::ImageApi,
    error::UploaderError,
    rest_types::{CustomImageCreateRequest, Image},
};

/// The OS type of the image is never inspected.
pub const DISTRIBUTION_UNKNOWN: &str = "Unknown";
pub const STATUS_NEW: &str = "new";
pub const STATUS_AVAILABLE: &str = "available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollIntervals {
    pub importing: Duration,
    pub available: Duration,
}

impl Default for PollIntervals {
    fn default() -> Self {
        Self {
            importing: Duration::from_secs(2),
            available: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub image_file: PathBuf,
    pub name: String,
    pub region: String,
    pub url: Url,
    pub description: Option<String>,
    pub tags: Vec<String>,
}

impl ImportRequest {
    fn to_create_request(&self) -> CustomImageCreateRequest {
        CustomImageCreateRequest {
            name: self.name.clone(),
            url: self.url.to_string(),
            region: self.region.clone(),
            distribution: DISTRIBUTION_UNKNOWN.to_string(),
            description: self.description.clone(),
            tags: self.tags.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadJob {
    pub image_file: PathBuf,
    pub name: String,
    pub region: String,
    pub id: u64,
    pub status: String,
    pub available: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportEvent {
    Created { id: u64 },
    Downloaded { id: u64, status: String },
    Available { id: u64 },
}

fn has_status(image: &Image, status: &str) -> bool {
    image.status.eq_ignore_ascii_case(status)
}

pub struct ImportOrchestrator<A> {
    api: A,
    intervals: PollIntervals,
}

impl<A: ImageApi> ImportOrchestrator<A> {
    pub fn new(api: A, intervals: PollIntervals) -> Self {
        Self { api, intervals }
    }

    pub async fn submit(&self, request: &ImportRequest) -> Result<u64, UploaderError> {
        let image = self
            .api
            .create_custom_image(&request.to_create_request())
            .await?;
        info!(image_id = image.id, status = %image.status, "Created custom image");
        Ok(image.id)
    }

    /// Polls until the image leaves the "new" state. Read failures are logged
    /// and retried forever.
    pub async fn poll_until_not_importing(&self, id: u64) -> Image {
        loop {
            tokio::time::sleep(self.intervals.importing).await;
            match self.api.get_image(id).await {
                Ok(image) if !has_status(&image, STATUS_NEW) => return image,
                Ok(image) => debug!(image_id = id, status = %image.status, "Image still importing"),
                Err(e) => warn!(image_id = id, "{}", e),
            }
        }
    }

    /// Polls until the image is available. A populated `error_message` ends
    /// the wait with [`UploaderError::ImportFailed`].
    pub async fn poll_until_available(&self, id: u64) -> Result<Image, UploaderError> {
        loop {
            tokio::time::sleep(self.intervals.available).await;
            match self.api.get_image(id).await {
                Ok(image) if has_status(&image, STATUS_AVAILABLE) => return Ok(image),
                Ok(Image {
                    error_message: Some(message),
                    ..
                }) => return Err(UploaderError::ImportFailed { id, message }),
                Ok(image) => {
                    debug!(image_id = id, status = %image.status, "Image not yet available")
                }
                Err(e) => warn!(image_id = id, "{}", e),
            }
        }
    }

    pub async fn run(
        &self,
        request: ImportRequest,
        wait_until_available: bool,
        mut on_event: impl FnMut(ImportEvent),
    ) -> Result<UploadJob, UploaderError> {
        let id = self.submit(&request).await?;
        on_event(ImportEvent::Created { id });

        let image = self.poll_until_not_importing(id).await;
        on_event(ImportEvent::Downloaded {
            id,
            status: image.status.clone(),
        });

        let mut job = UploadJob {
            image_file: request.image_file,
            name: request.name,
            region: request.region,
            id,
            available: has_status(&image, STATUS_AVAILABLE),
            status: image.status,
        };

        if wait_until_available {
            let image = self.poll_until_available(id).await?;
            on_event(ImportEvent::Available { id });
            job.status = image.status;
            job.available = true;
        }

        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    enum Read {
        Status(&'static str),
        Failed(&'static str, &'static str),
        Error,
    }

    #[derive(Default)]
    struct ScriptedApi {
        reads: Mutex<VecDeque<Read>>,
        read_count: Mutex<usize>,
        created: Mutex<Vec<CustomImageCreateRequest>>,
        reject_create: bool,
    }

    impl ScriptedApi {
        fn new(reads: Vec<Read>) -> Self {
            Self {
                reads: Mutex::new(reads.into()),
                ..Default::default()
            }
        }

        fn read_count(&self) -> usize {
            *self.read_count.lock().unwrap()
        }
    }

    fn image(id: u64, status: &str) -> Image {
        Image {
            id,
            status: status.to_string(),
            error_message: None,
        }
    }

    #[async_trait]
    impl ImageApi for ScriptedApi {
        async fn create_custom_image(
            &self,
            request: &CustomImageCreateRequest,
        ) -> Result<Image, UploaderError> {
            if self.reject_create {
                return Err(UploaderError::ProviderRequest("unauthorized".to_string()));
            }
            self.created.lock().unwrap().push(request.clone());
            Ok(image(42, "NEW"))
        }

        async fn get_image(&self, id: u64) -> Result<Image, UploaderError> {
            *self.read_count.lock().unwrap() += 1;
            match self.reads.lock().unwrap().pop_front() {
                Some(Read::Status(status)) => Ok(image(id, status)),
                Some(Read::Failed(status, message)) => {
                    let mut image = image(id, status);
                    image.error_message = Some(message.to_string());
                    Ok(image)
                }
                Some(Read::Error) => Err(UploaderError::ProviderPoll("timeout".to_string())),
                None => panic!("status script exhausted"),
            }
        }
    }

    fn assert_elapsed(start: Instant, expected: Duration) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= expected && elapsed < expected + Duration::from_millis(50),
            "elapsed {elapsed:?}, expected {expected:?}"
        );
    }

    fn import_request() -> ImportRequest {
        ImportRequest {
            image_file: PathBuf::from("/images/debian.qcow2"),
            name: "debian-custom".to_string(),
            region: "nyc3".to_string(),
            url: Url::parse("http://203.0.113.7:5379/aBcDeFdebian.qcow2").unwrap(),
            description: None,
            tags: Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_loop_stops_on_first_non_new_status() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi::new(vec![
                Read::Status("new"),
                Read::Status("new"),
                Read::Status("completed"),
            ]),
            PollIntervals::default(),
        );

        let start = Instant::now();
        let image = orchestrator.poll_until_not_importing(42).await;

        assert_eq!(image.status, "completed");
        assert_eq!(orchestrator.api.read_count(), 3);
        assert_elapsed(start, Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_loop_treats_uppercase_new_as_importing() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi::new(vec![Read::Status("NEW"), Read::Status("pending")]),
            PollIntervals::default(),
        );

        let image = orchestrator.poll_until_not_importing(42).await;

        assert_eq!(image.status, "pending");
        assert_eq!(orchestrator.api.read_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_errors_do_not_stop_the_loop() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi::new(vec![
                Read::Error,
                Read::Status("new"),
                Read::Error,
                Read::Status("available"),
            ]),
            PollIntervals::default(),
        );

        let image = orchestrator.poll_until_not_importing(42).await;

        assert_eq!(image.status, "available");
        assert_eq!(orchestrator.api.read_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_loop_waits_for_available() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi::new(vec![
                Read::Status("completed"),
                Read::Status("completed"),
                Read::Status("available"),
            ]),
            PollIntervals::default(),
        );

        let start = Instant::now();
        let image = orchestrator.poll_until_available(42).await.unwrap();

        assert_eq!(image.status, "available");
        assert_eq!(orchestrator.api.read_count(), 3);
        assert_elapsed(start, Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_loop_skips_read_errors() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi::new(vec![
                Read::Error,
                Read::Status("pending"),
                Read::Error,
                Read::Status("available"),
            ]),
            PollIntervals::default(),
        );

        let start = Instant::now();
        let image = orchestrator.poll_until_available(42).await.unwrap();

        assert_eq!(image.status, "available");
        assert_eq!(orchestrator.api.read_count(), 4);
        assert_elapsed(start, Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_loop_fails_on_error_message() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi::new(vec![
                Read::Status("pending"),
                Read::Failed("pending", "unable to download image"),
            ]),
            PollIntervals::default(),
        );

        let result = orchestrator.poll_until_available(42).await;

        match result {
            Err(UploaderError::ImportFailed { id, message }) => {
                assert_eq!(id, 42);
                assert_eq!(message, "unable to download image");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_without_wait_skips_second_loop() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi::new(vec![Read::Status("new"), Read::Status("completed")]),
            PollIntervals::default(),
        );
        let mut events = Vec::new();

        let job = orchestrator
            .run(import_request(), false, |event| events.push(event))
            .await
            .unwrap();

        assert_eq!(job.id, 42);
        assert_eq!(job.status, "completed");
        assert!(!job.available);
        assert_eq!(orchestrator.api.read_count(), 2);
        assert_eq!(
            events,
            vec![
                ImportEvent::Created { id: 42 },
                ImportEvent::Downloaded {
                    id: 42,
                    status: "completed".to_string()
                },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_wait_reports_available() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi::new(vec![
                Read::Status("new"),
                Read::Status("completed"),
                Read::Status("completed"),
                Read::Status("completed"),
                Read::Status("available"),
            ]),
            PollIntervals::default(),
        );
        let mut events = Vec::new();

        let start = Instant::now();
        let job = orchestrator
            .run(import_request(), true, |event| events.push(event))
            .await
            .unwrap();

        assert_eq!(job.status, "available");
        assert!(job.available);
        assert_eq!(orchestrator.api.read_count(), 5);
        assert_elapsed(start, Duration::from_secs(2 * 2 + 3 * 5));
        assert_eq!(events.last(), Some(&ImportEvent::Available { id: 42 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_submits_placeholder_distribution() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi::new(vec![Read::Status("completed")]),
            PollIntervals::default(),
        );

        orchestrator
            .run(import_request(), false, |_| {})
            .await
            .unwrap();

        let created = orchestrator.api.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].distribution, "Unknown");
        assert_eq!(created[0].url, "http://203.0.113.7:5379/aBcDeFdebian.qcow2");
        assert_eq!(created[0].region, "nyc3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_failure_is_fatal() {
        let orchestrator = ImportOrchestrator::new(
            ScriptedApi {
                reject_create: true,
                ..Default::default()
            },
            PollIntervals::default(),
        );

        let result = orchestrator.run(import_request(), true, |_| {}).await;

        assert!(matches!(result, Err(UploaderError::ProviderRequest(_))));
        assert_eq!(orchestrator.api.read_count(), 0);
    }
}
