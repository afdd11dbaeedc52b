use serde_json::json;

use crate::error::DeployError;
use crate::log;
use crate::poll::{poll_until, PollPolicy};

/// The one region S3 refuses as an explicit location constraint.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

pub trait BucketStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, String>;

    fn create_bucket(&self, bucket: &str, location_constraint: Option<&str>)
        -> Result<(), String>;

    fn versioning_enabled(&self, bucket: &str) -> Result<bool, String>;

    fn enable_versioning(&self, bucket: &str) -> Result<(), String>;

    /// Writes the object and returns the version id reported by the store,
    /// if any.
    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<Option<String>, String>;

    /// Latest version id of an existing object.
    fn object_version(&self, bucket: &str, key: &str) -> Result<Option<String>, String>;
}

pub fn build_bucket_name(app_name: &str, region: &str, account_id: &str) -> String {
    format!("builds-{app_name}-{region}-{account_id}")
}

pub fn location_constraint(region: &str) -> Option<&str> {
    (region != DEFAULT_S3_REGION).then_some(region)
}

/// Makes sure `bucket` exists and has versioning turned on. Pipeline
/// artifacts are addressed by object version, so an unversioned bucket is
/// not usable.
pub fn ensure_bucket(
    store: &impl BucketStore,
    bucket: &str,
    region: &str,
    policy: &PollPolicy,
) -> Result<(), DeployError> {
    let exists = store.bucket_exists(bucket).map_err(|error| {
        DeployError::new(format!("Failed to look up bucket {bucket}: {error}"))
    })?;

    if !exists {
        log::info(
            "bucket",
            "creating_bucket",
            json!({ "bucket": bucket, "region": region }),
        );
        store
            .create_bucket(bucket, location_constraint(region))
            .map_err(|error| {
                DeployError::new(format!("Failed to create bucket {bucket}: {error}"))
            })?;

        let appeared = poll_until(policy, || {
            Ok(store
                .bucket_exists(bucket)
                .map_err(DeployError::new)?
                .then_some(()))
        })?;
        if appeared.is_none() {
            return Err(DeployError::new(format!(
                "Timed out waiting for bucket {bucket} to exist"
            )));
        }
    }

    let versioned = store.versioning_enabled(bucket).map_err(|error| {
        DeployError::new(format!(
            "Failed to read versioning of bucket {bucket}: {error}"
        ))
    })?;
    if !versioned {
        log::info("bucket", "enabling_versioning", json!({ "bucket": bucket }));
        store.enable_versioning(bucket).map_err(|error| {
            DeployError::new(format!(
                "Failed to enable versioning on bucket {bucket}: {error}"
            ))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::MemoryBuckets;

    fn instant_policy() -> PollPolicy {
        PollPolicy::new(Duration::ZERO, Duration::from_secs(60))
    }

    #[test]
    fn bucket_name_includes_region_and_account() {
        assert_eq!(
            build_bucket_name("a4tp", "eu-west-1", "123456789012"),
            "builds-a4tp-eu-west-1-123456789012"
        );
    }

    #[test]
    fn us_east_1_is_created_without_location_constraint() {
        assert_eq!(location_constraint("us-east-1"), None);
        assert_eq!(location_constraint("eu-west-1"), Some("eu-west-1"));
    }

    #[test]
    fn creates_and_versions_missing_bucket() {
        let store = MemoryBuckets::new();
        ensure_bucket(&store, "builds-a4tp", "eu-west-1", &instant_policy())
            .expect("bucket should be provisioned");

        assert_eq!(
            store.calls(),
            vec![
                "create:builds-a4tp:eu-west-1".to_string(),
                "versioning:builds-a4tp".to_string(),
            ]
        );
        assert!(store.versioning_enabled("builds-a4tp").expect("known bucket"));
    }

    #[test]
    fn leaves_versioned_bucket_alone() {
        let store = MemoryBuckets::new();
        store.seed_bucket("builds-a4tp", true);

        ensure_bucket(&store, "builds-a4tp", "us-east-1", &instant_policy())
            .expect("bucket should be accepted");
        assert!(store.calls().is_empty());
    }

    #[test]
    fn enables_versioning_on_existing_unversioned_bucket() {
        let store = MemoryBuckets::new();
        store.seed_bucket("builds-a4tp", false);

        ensure_bucket(&store, "builds-a4tp", "us-east-1", &instant_policy())
            .expect("bucket should be accepted");
        assert_eq!(store.calls(), vec!["versioning:builds-a4tp".to_string()]);
    }

    #[test]
    fn us_east_1_bucket_is_created_without_constraint() {
        let store = MemoryBuckets::new();
        ensure_bucket(&store, "builds-a4tp", "us-east-1", &instant_policy())
            .expect("bucket should be provisioned");

        assert_eq!(store.calls()[0], "create:builds-a4tp:-");
    }

    #[test]
    fn bucket_that_never_appears_times_out() {
        let store = MemoryBuckets::new();
        store.hide_created_buckets();

        let error = ensure_bucket(
            &store,
            "builds-a4tp",
            "eu-west-1",
            &PollPolicy::new(Duration::ZERO, Duration::ZERO),
        )
        .expect_err("bucket never appears");
        assert_eq!(
            error.message(),
            "Timed out waiting for bucket builds-a4tp to exist"
        );
        assert_eq!(store.calls(), vec!["create:builds-a4tp:eu-west-1".to_string()]);
    }
}
