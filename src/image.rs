//! Image availability checks for environment provisioning.
//!
//! Provisioning must not proceed until the runtime image is present
//! locally. Verified image references are remembered process-wide so
//! repeated batches skip the registry round-trip; [`invalidate_image`]
//! forces re-verification.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};

use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{debug, info};

use crate::error::ProvisionError;

fn verified_images() -> &'static Mutex<HashSet<String>> {
    static VERIFIED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    VERIFIED.get_or_init(|| Mutex::new(HashSet::new()))
}

fn is_verified(image: &str) -> bool {
    verified_images()
        .lock()
        .map(|set| set.contains(image))
        .unwrap_or(false)
}

fn mark_verified(image: &str) {
    if let Ok(mut set) = verified_images().lock() {
        set.insert(image.to_string());
    }
}

/// Drops an image reference from the verified-available cache so the
/// next provision re-checks (and pulls if needed). Call after removing
/// or retagging images out of band.
pub fn invalidate_image(image: &str) {
    if let Ok(mut set) = verified_images().lock() {
        set.remove(image);
    }
}

/// Ensures `image` is available locally, pulling it on first miss.
pub(crate) async fn ensure_available(docker: &Docker, image: &str) -> Result<(), ProvisionError> {
    if is_verified(image) {
        debug!("image already verified: {image}");
        return Ok(());
    }

    if !image_exists_locally(docker, image).await? {
        pull_image(docker, image).await?;
    }
    mark_verified(image);
    Ok(())
}

/// Check whether a Docker image exists locally.
async fn image_exists_locally(docker: &Docker, image: &str) -> Result<bool, ProvisionError> {
    let images = docker
        .list_images(Some(ListImagesOptions::<String> {
            all: true,
            ..Default::default()
        }))
        .await
        .map_err(|e| ProvisionError::backend_unavailable(e.to_string()))?;

    let (name, tag) = parse_image_tag(image);

    let found = images.iter().any(|summary| {
        summary.repo_tags.iter().any(|repo_tag| match repo_tag.rsplit_once(':') {
            Some((n, t)) => n == name && t == tag,
            None => repo_tag == name && tag == "latest",
        })
    });

    Ok(found)
}

/// Pull a Docker image from its registry, logging progress.
async fn pull_image(docker: &Docker, image: &str) -> Result<(), ProvisionError> {
    info!("pulling image: {image}");

    let options = CreateImageOptions {
        from_image: image,
        ..Default::default()
    };

    let mut stream = docker.create_image(Some(options), None, None);

    while let Some(progress) = stream.next().await {
        match progress {
            Ok(update) => {
                if let Some(error) = update.error {
                    return Err(ProvisionError::image_unavailable(image, error));
                }
                if let Some(status) = update.status {
                    let trimmed = status.trim();
                    if !trimmed.is_empty() {
                        debug!("pull: {trimmed}");
                    }
                }
            }
            Err(e) => return Err(ProvisionError::image_unavailable(image, e.to_string())),
        }
    }

    info!("image ready: {image}");
    Ok(())
}

/// Parse image name and tag from a reference, defaulting to "latest".
fn parse_image_tag(image: &str) -> (&str, &str) {
    match image.rsplit_once(':') {
        // "registry:5000/image" has a colon but no tag
        Some((name, tag)) if !tag.contains('/') => (name, tag),
        _ => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_tag() {
        assert_eq!(parse_image_tag("openjdk:8-alpine"), ("openjdk", "8-alpine"));
        assert_eq!(
            parse_image_tag("myregistry/judge:v1.0"),
            ("myregistry/judge", "v1.0")
        );
        assert_eq!(
            parse_image_tag("registry.example.com:5000/judge:dev"),
            ("registry.example.com:5000/judge", "dev")
        );
    }

    #[test]
    fn test_parse_image_no_tag() {
        assert_eq!(parse_image_tag("alpine"), ("alpine", "latest"));
        assert_eq!(
            parse_image_tag("registry:5000/image"),
            ("registry:5000/image", "latest")
        );
    }

    #[test]
    fn test_verified_cache_round_trip() {
        let image = "judgebox-test-cache:only-in-this-test";
        assert!(!is_verified(image));
        mark_verified(image);
        assert!(is_verified(image));
        invalidate_image(image);
        assert!(!is_verified(image));
    }

    #[test]
    fn test_invalidate_unknown_image_is_noop() {
        invalidate_image("judgebox-test-cache:never-marked");
        assert!(!is_verified("judgebox-test-cache:never-marked"));
    }

    #[tokio::test]
    async fn test_image_exists_locally_no_docker() {
        // Degrades gracefully when the daemon is unreachable.
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return;
        };
        match image_exists_locally(&docker, "judgebox-test:nonexistent").await {
            Ok(exists) => assert!(!exists),
            Err(e) => assert!(e.is_backend_unavailable(), "unexpected error: {e}"),
        }
    }
}
