//! Backend construction
//!
//! A profile names its provider; this is the single place that turns a
//! provider into a concrete client. Commands only ever see the trait object.

use osc_core::{Defaults, MemoryClient, ObjectStorageClient, Profile, Provider, Result};
use osc_s3::S3Client;
use osc_swift::SwiftClient;

/// Build the client for a profile
///
/// The profile's default container, if any, is selected on the returned
/// client.
pub async fn connect(profile: Profile, defaults: &Defaults) -> Result<Box<dyn ObjectStorageClient>> {
    tracing::debug!(profile = %profile.name, provider = %profile.provider, "Connecting");

    let client: Box<dyn ObjectStorageClient> = match profile.provider {
        Provider::S3 => {
            let client = S3Client::new(profile).await?.with_part_size(defaults.part_size());
            Box::new(client)
        }
        Provider::Swift => Box::new(SwiftClient::new(profile).await?),
        Provider::Memory => {
            profile.validate()?;
            let mut client = MemoryClient::new().with_region(profile.region.clone());
            if let Some(container) = &profile.container {
                client.use_container(container);
            }
            Box::new(client)
        }
    };

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_memory_profile() {
        let mut profile = Profile::new("mem", Provider::Memory);
        profile.container = Some("photos".to_string());

        let client = connect(profile, &Defaults::default()).await.unwrap();
        assert_eq!(client.name(), "memory");
        assert_eq!(client.default_container(), Some("photos"));
    }

    #[tokio::test]
    async fn test_connect_s3_profile() {
        let mut profile = Profile::s3("minio", "http://localhost:9000", "ak", "sk");
        profile.container = Some("data".to_string());

        let client = connect(profile, &Defaults::default()).await.unwrap();
        assert_eq!(client.name(), "s3");
        assert_eq!(client.default_container(), Some("data"));
    }

    #[tokio::test]
    async fn test_connect_swift_profile_with_token() {
        let mut profile = Profile::new("swift", Provider::Swift);
        profile.endpoint = Some("https://swift.example.com/v1/AUTH_demo".to_string());
        profile.swift = Some(osc_core::SwiftAuth {
            token: Some("tok".to_string()),
            ..Default::default()
        });
        profile.container = Some("data".to_string());

        let client = connect(profile, &Defaults::default()).await.unwrap();
        assert_eq!(client.name(), "swift");
        assert_eq!(client.default_container(), Some("data"));
    }

    #[tokio::test]
    async fn test_connect_swift_needs_credentials() {
        let mut profile = Profile::new("swift", Provider::Swift);
        profile.endpoint = Some("https://swift.example.com/v1/AUTH_demo".to_string());

        let err = connect(profile, &Defaults::default()).await.err().unwrap();
        assert!(matches!(err, osc_core::Error::Config(_)));
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_profile() {
        let mut profile = Profile::new("broken", Provider::Memory);
        profile.bucket_lookup = "sideways".to_string();

        assert!(connect(profile, &Defaults::default()).await.is_err());
    }
}
