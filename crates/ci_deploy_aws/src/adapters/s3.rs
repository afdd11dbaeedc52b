use aws_config::SdkConfig;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration,
    VersioningConfiguration,
};
use ci_deploy_core::bucket::BucketStore;
use ci_deploy_core::job::ArtifactCredentials;

use super::artifact_store::ArtifactStore;
use super::block_on;

const ARTIFACT_CREDENTIALS_PROVIDER: &str = "codepipeline-artifact-credentials";

#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(client: aws_sdk_s3::Client) -> Self {
        Self { client }
    }

    /// Client limited to the artifact credentials the pipeline passed in the
    /// job, rather than the function's own role.
    pub fn for_artifacts(sdk_config: &SdkConfig, credentials: &ArtifactCredentials) -> Self {
        let credentials = Credentials::new(
            credentials.access_key_id.clone(),
            credentials.secret_access_key.clone(),
            Some(credentials.session_token.clone()),
            None,
            ARTIFACT_CREDENTIALS_PROVIDER,
        );
        let config = aws_sdk_s3::config::Builder::from(sdk_config)
            .credentials_provider(credentials)
            .build();
        Self::new(aws_sdk_s3::Client::from_conf(config))
    }

    fn put(&self, bucket: &str, key: &str, body: &[u8]) -> Result<Option<String>, String> {
        let client = self.client.clone();
        let bucket_name = bucket.to_string();
        let object_key = key.to_string();
        let body_bytes = body.to_vec();

        block_on(async move {
            client
                .put_object()
                .bucket(bucket_name)
                .key(object_key)
                .body(ByteStream::from(body_bytes))
                .send()
                .await
        })
        .map(|output| output.version_id().map(str::to_string))
        .map_err(|error| {
            format!(
                "failed to write s3://{bucket}/{key}: {}",
                DisplayErrorContext(&error)
            )
        })
    }
}

impl ArtifactStore for S3Store {
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, String> {
        let client = self.client.clone();
        let bucket_name = bucket.to_string();
        let object_key = key.to_string();

        block_on(async move {
            let output = client
                .get_object()
                .bucket(bucket_name)
                .key(object_key)
                .send()
                .await
                .map_err(|error| format!("{}", DisplayErrorContext(&error)))?;
            output
                .body
                .collect()
                .await
                .map(|data| data.into_bytes().to_vec())
                .map_err(|error| format!("failed to read object body: {error}"))
        })
        .map_err(|error| format!("failed to read s3://{bucket}/{key}: {error}"))
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<(), String> {
        self.put(bucket, key, body).map(|_| ())
    }
}

impl BucketStore for S3Store {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, String> {
        let client = self.client.clone();
        let bucket_name = bucket.to_string();

        match block_on(async move { client.head_bucket().bucket(bucket_name).send().await }) {
            Ok(_) => Ok(true),
            Err(error) => {
                if error
                    .as_service_error()
                    .is_some_and(|service_error| service_error.is_not_found())
                {
                    Ok(false)
                } else {
                    Err(format!(
                        "failed to head bucket {bucket}: {}",
                        DisplayErrorContext(&error)
                    ))
                }
            }
        }
    }

    fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> Result<(), String> {
        let client = self.client.clone();
        let bucket_name = bucket.to_string();
        let configuration = location_constraint.map(|region| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(region))
                .build()
        });

        block_on(async move {
            client
                .create_bucket()
                .bucket(bucket_name)
                .set_create_bucket_configuration(configuration)
                .send()
                .await
        })
        .map(|_| ())
        .map_err(|error| format!("{}", DisplayErrorContext(&error)))
    }

    fn versioning_enabled(&self, bucket: &str) -> Result<bool, String> {
        let client = self.client.clone();
        let bucket_name = bucket.to_string();

        block_on(async move {
            client
                .get_bucket_versioning()
                .bucket(bucket_name)
                .send()
                .await
        })
        .map(|output| output.status() == Some(&BucketVersioningStatus::Enabled))
        .map_err(|error| format!("{}", DisplayErrorContext(&error)))
    }

    fn enable_versioning(&self, bucket: &str) -> Result<(), String> {
        let client = self.client.clone();
        let bucket_name = bucket.to_string();
        let configuration = VersioningConfiguration::builder()
            .status(BucketVersioningStatus::Enabled)
            .build();

        block_on(async move {
            client
                .put_bucket_versioning()
                .bucket(bucket_name)
                .versioning_configuration(configuration)
                .send()
                .await
        })
        .map(|_| ())
        .map_err(|error| format!("{}", DisplayErrorContext(&error)))
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<Option<String>, String> {
        self.put(bucket, key, body)
    }

    fn object_version(&self, bucket: &str, key: &str) -> Result<Option<String>, String> {
        let client = self.client.clone();
        let bucket_name = bucket.to_string();
        let object_key = key.to_string();

        block_on(async move {
            client
                .head_object()
                .bucket(bucket_name)
                .key(object_key)
                .send()
                .await
        })
        .map(|output| output.version_id().map(str::to_string))
        .map_err(|error| {
            format!(
                "failed to head s3://{bucket}/{key}: {}",
                DisplayErrorContext(&error)
            )
        })
    }
}
