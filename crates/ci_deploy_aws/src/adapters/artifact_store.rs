use ci_deploy_core::error::DeployError;
use ci_deploy_core::job::Artifact;

/// Object access for pipeline artifacts.
pub trait ArtifactStore {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String>;

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), String>;
}

pub fn download_artifact(
    store: &impl ArtifactStore,
    artifact: &Artifact,
) -> Result<Vec<u8>, DeployError> {
    let location = &artifact.location.s3_location;
    store
        .get_object(&location.bucket_name, &location.object_key)
        .map_err(|error| {
            DeployError::new(format!(
                "Failed to download artifact {} from s3://{}/{}: {error}",
                artifact.name, location.bucket_name, location.object_key
            ))
        })
}

pub fn upload_artifact(
    store: &impl ArtifactStore,
    artifact: &Artifact,
    body: &[u8],
) -> Result<(), DeployError> {
    let location = &artifact.location.s3_location;
    store
        .put_object(&location.bucket_name, &location.object_key, body)
        .map_err(|error| {
            DeployError::new(format!(
                "Failed to upload artifact {} to s3://{}/{}: {error}",
                artifact.name, location.bucket_name, location.object_key
            ))
        })
}
