use std::{
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use rand::{Rng, SeedableRng, rngs::StdRng};
use url::Url;

use crate::{address::NetworkAddress, error::UploaderError};

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Length of the random prefix placed in front of the image file name.
pub const SEGMENT_LENGTH: usize = 6;

pub fn random_string<R: Rng + ?Sized>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

pub fn clock_seeded_rng() -> StdRng {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    StdRng::seed_from_u64(nanos as u64)
}

/// The single path the image is exposed at.
///
/// Only the provider is told the full URL; the random segment is the only
/// thing keeping the file from being fetched by anyone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServingRoute {
    segment: String,
    file_name: String,
}

impl ServingRoute {
    pub fn new(segment: String, image_file: &Path) -> Result<Self, UploaderError> {
        let file_name = image_file
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                UploaderError::InvalidImageFile(format!(
                    "{} has no usable file name",
                    image_file.display()
                ))
            })?;

        Ok(Self {
            segment,
            file_name: file_name.to_string(),
        })
    }

    pub fn generate(image_file: &Path) -> Result<Self, UploaderError> {
        let segment = random_string(&mut clock_seeded_rng(), SEGMENT_LENGTH);
        Self::new(segment, image_file)
    }

    pub fn path(&self) -> String {
        format!("/{}{}", self.segment, self.file_name)
    }

    /// URL handed to the provider. Its path is percent-encoded, and the file
    /// server routes on that encoded form.
    pub fn fetch_url(&self, address: &NetworkAddress) -> Result<Url, UploaderError> {
        let mut url = Url::parse(&format!("http://{}", address)).map_err(|e| {
            UploaderError::AddressLookup(format!("{} is not a usable host: {}", address, e))
        })?;
        url.set_path(&self.path());
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_random_string_is_deterministic_for_seed() {
        let first = random_string(&mut StdRng::seed_from_u64(42), SEGMENT_LENGTH);
        let second = random_string(&mut StdRng::seed_from_u64(42), SEGMENT_LENGTH);
        assert_eq!(first, second);
    }

    #[test]
    fn test_random_string_uses_letters_only() {
        for seed in 0..500 {
            let segment = random_string(&mut StdRng::seed_from_u64(seed), SEGMENT_LENGTH);
            assert_eq!(segment.len(), SEGMENT_LENGTH);
            assert!(segment.chars().all(|c| c.is_ascii_alphabetic()), "{segment}");
        }
    }

    #[test]
    fn test_generated_segment_length() {
        let route = ServingRoute::generate(Path::new("/tmp/disk.img")).unwrap();
        let path = route.path();
        let segment = path
            .strip_prefix('/')
            .and_then(|p| p.strip_suffix("disk.img"))
            .unwrap();
        assert_eq!(segment.len(), SEGMENT_LENGTH);
        assert!(segment.chars().all(|c| c.is_ascii_alphabetic()));
    }

    #[test]
    fn test_fetch_url_layout() {
        let route = ServingRoute::new("aBcDeF".to_string(), &PathBuf::from("/srv/images/debian.qcow2"))
            .unwrap();
        let address = NetworkAddress::new("203.0.113.7".to_string(), 5379);

        let url = route.fetch_url(&address).unwrap();

        assert_eq!(url.as_str(), "http://203.0.113.7:5379/aBcDeFdebian.qcow2");
        assert_eq!(url.path(), route.path());
    }

    #[test]
    fn test_fetch_url_with_ipv6_host() {
        let route = ServingRoute::new("xyzXYZ".to_string(), Path::new("disk.raw")).unwrap();
        let address = NetworkAddress::new("2001:db8::1".to_string(), 8080);

        let url = route.fetch_url(&address).unwrap();

        assert_eq!(url.as_str(), "http://[2001:db8::1]:8080/xyzXYZdisk.raw");
    }

    #[test]
    fn test_fetch_url_encodes_spaces() {
        let route = ServingRoute::new("abcdef".to_string(), Path::new("my disk.img")).unwrap();
        let address = NetworkAddress::new("198.51.100.1".to_string(), 5379);

        let url = route.fetch_url(&address).unwrap();

        assert_eq!(url.path(), "/abcdefmy%20disk.img");
    }

    #[test]
    fn test_route_requires_file_name() {
        let result = ServingRoute::new("abcdef".to_string(), Path::new("/"));
        assert!(matches!(result, Err(UploaderError::InvalidImageFile(_))));
    }
}
