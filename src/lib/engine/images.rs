use tracing::{debug, info};

use super::types::{Engine, EngineImage, EngineResult};

/// References from `required` that no listed image carries as a repo tag.
pub fn missing_images(required: &[String], available: &[EngineImage]) -> Vec<String> {
    required
        .iter()
        .filter(|wanted| {
            !available
                .iter()
                .any(|image| image.repo_tags.iter().any(|tag| tag == *wanted))
        })
        .cloned()
        .collect()
}

/// Pulls whatever `required` image the engine doesn't have yet, one at a
/// time. The first failed pull aborts; nothing after it is attempted.
/// Returns the images that were pulled.
pub async fn ensure_images(engine: &dyn Engine, required: &[String]) -> EngineResult<Vec<String>> {
    let available = engine.list_images().await?;
    let missing = missing_images(required, &available);

    if missing.is_empty() {
        debug!(count = required.len(), "All required images are present");
        return Ok(missing);
    }

    info!(missing = ?missing, "Pulling missing images, this may take a while");
    for image in &missing {
        engine.pull_image(image).await?;
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lib::engine::mock::{EngineCall, MockEngine};
    use crate::lib::engine::types::EngineError;

    fn images(refs: &[&str]) -> Vec<String> {
        refs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn membership_is_exact_tag_match() {
        let available = vec![EngineImage {
            repo_tags: images(&["postgres:12.6", "postgres:latest"]),
        }];
        let missing = missing_images(&images(&["postgres:12.6", "postgres:12"]), &available);
        assert_eq!(missing, images(&["postgres:12"]));
    }

    #[tokio::test]
    async fn pulls_only_missing_images() {
        let engine = MockEngine::with_images(&["postgres:12.6", "minio/minio:latest"]);
        let required = images(&["postgres:12.6", "minio/minio:latest", "minio/mc:latest"]);

        let pulled = ensure_images(&engine, &required).await.unwrap();
        assert_eq!(pulled, images(&["minio/mc:latest"]));
        assert_eq!(engine.pulls(), images(&["minio/mc:latest"]));
    }

    #[tokio::test]
    async fn nothing_pulled_when_all_present() {
        let engine = MockEngine::with_images(&["postgres:12.6"]);
        let pulled = ensure_images(&engine, &images(&["postgres:12.6"])).await.unwrap();
        assert!(pulled.is_empty());
        assert_eq!(engine.calls(), vec![EngineCall::ListImages]);
    }

    #[tokio::test]
    async fn failed_pull_stops_further_pulls() {
        let engine = MockEngine::with_images(&[]);
        engine.fail_pull("postgres:12.6");
        let required = images(&["postgres:12.6", "minio/minio:latest"]);

        let err = ensure_images(&engine, &required).await.unwrap_err();
        assert!(matches!(&err, EngineError::Pull { image, .. } if image == "postgres:12.6"));
        assert!(err.to_string().contains("docker pull postgres:12.6"));
        assert_eq!(engine.pulls(), images(&["postgres:12.6"]));
    }
}
