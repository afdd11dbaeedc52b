//! In-memory doubles for the service seams, shared with downstream crates via
//! the `test-helpers` feature.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use crate::bucket::BucketStore;
use crate::probe::SiteProbe;
use crate::stack::{StackDescription, StackOps, StackParameter, StackStatus, UpdateOutcome};

/// Each `describe` pops the next scripted status for that stack; the last
/// entry sticks. `None` entries mean "does not exist". Mutating calls are
/// recorded as `verb:stack[:param count]`.
#[derive(Default)]
pub struct ScriptedStacks {
    statuses: Mutex<BTreeMap<String, VecDeque<Option<&'static str>>>>,
    outputs: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    params: Mutex<BTreeMap<String, Vec<StackParameter>>>,
    calls: Mutex<Vec<String>>,
    update_outcome: Mutex<Option<Result<UpdateOutcome, String>>>,
    describe_errors: Mutex<BTreeMap<String, String>>,
}

impl ScriptedStacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, name: &str, statuses: &[Option<&'static str>]) {
        self.statuses
            .lock()
            .expect("poisoned mutex")
            .insert(name.to_string(), statuses.iter().copied().collect());
    }

    pub fn set_outputs(&self, name: &str, outputs: &[(&str, &str)]) {
        self.outputs.lock().expect("poisoned mutex").insert(
            name.to_string(),
            outputs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        );
    }

    pub fn set_update_outcome(&self, outcome: Result<UpdateOutcome, String>) {
        *self.update_outcome.lock().expect("poisoned mutex") = Some(outcome);
    }

    /// Every `describe` of `name` fails with `message` from now on.
    pub fn fail_describe(&self, name: &str, message: &str) {
        self.describe_errors
            .lock()
            .expect("poisoned mutex")
            .insert(name.to_string(), message.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("poisoned mutex").clone()
    }

    /// Parameters passed by the most recent create or update of `name`.
    pub fn params_for(&self, name: &str) -> Vec<StackParameter> {
        self.params
            .lock()
            .expect("poisoned mutex")
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        self.calls.lock().expect("poisoned mutex").push(call);
    }
}

impl StackOps for ScriptedStacks {
    fn describe(&self, name: &str) -> Result<Option<StackDescription>, String> {
        if let Some(message) = self.describe_errors.lock().expect("poisoned mutex").get(name) {
            return Err(message.clone());
        }
        let mut statuses = self.statuses.lock().expect("poisoned mutex");
        let Some(queue) = statuses.get_mut(name) else {
            return Ok(None);
        };
        let current = if queue.len() > 1 {
            queue.pop_front().flatten()
        } else {
            queue.front().copied().flatten()
        };

        Ok(current.map(|status| StackDescription {
            name: name.to_string(),
            status: StackStatus::parse(status),
            outputs: self
                .outputs
                .lock()
                .expect("poisoned mutex")
                .get(name)
                .cloned()
                .unwrap_or_default(),
        }))
    }

    fn create(&self, name: &str, _template: &str, params: &[StackParameter]) -> Result<(), String> {
        self.record(format!("create:{name}:{}", params.len()));
        self.params
            .lock()
            .expect("poisoned mutex")
            .insert(name.to_string(), params.to_vec());
        Ok(())
    }

    fn update(
        &self,
        name: &str,
        _template: &str,
        params: &[StackParameter],
    ) -> Result<UpdateOutcome, String> {
        self.record(format!("update:{name}:{}", params.len()));
        self.params
            .lock()
            .expect("poisoned mutex")
            .insert(name.to_string(), params.to_vec());
        self.update_outcome
            .lock()
            .expect("poisoned mutex")
            .clone()
            .unwrap_or(Ok(UpdateOutcome::Started))
    }

    fn delete(&self, name: &str) -> Result<(), String> {
        self.record(format!("delete:{name}"));
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct MemoryBucket {
    versioned: bool,
    objects: BTreeMap<String, Vec<Vec<u8>>>,
}

/// Buckets and objects in memory. Versioned buckets hand out `v<N>` ids.
#[derive(Default)]
pub struct MemoryBuckets {
    buckets: Mutex<BTreeMap<String, MemoryBucket>>,
    calls: Mutex<Vec<String>>,
    versions_only_on_head: Mutex<bool>,
    creations_invisible: Mutex<bool>,
}

impl MemoryBuckets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_bucket(&self, bucket: &str, versioned: bool) {
        self.buckets.lock().expect("poisoned mutex").insert(
            bucket.to_string(),
            MemoryBucket {
                versioned,
                objects: BTreeMap::new(),
            },
        );
    }

    /// Puts stop reporting the new version id; only `object_version` sees it.
    pub fn report_versions_only_on_head(&self) {
        *self.versions_only_on_head.lock().expect("poisoned mutex") = true;
    }

    /// Created buckets never show up in `bucket_exists`.
    pub fn hide_created_buckets(&self) {
        *self.creations_invisible.lock().expect("poisoned mutex") = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("poisoned mutex").clone()
    }

    pub fn latest_object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.buckets
            .lock()
            .expect("poisoned mutex")
            .get(bucket)
            .and_then(|entry| entry.objects.get(key))
            .and_then(|versions| versions.last().cloned())
    }
}

impl BucketStore for MemoryBuckets {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, String> {
        Ok(self
            .buckets
            .lock()
            .expect("poisoned mutex")
            .contains_key(bucket))
    }

    fn create_bucket(
        &self,
        bucket: &str,
        location_constraint: Option<&str>,
    ) -> Result<(), String> {
        self.calls.lock().expect("poisoned mutex").push(format!(
            "create:{bucket}:{}",
            location_constraint.unwrap_or("-")
        ));
        if !*self.creations_invisible.lock().expect("poisoned mutex") {
            self.seed_bucket(bucket, false);
        }
        Ok(())
    }

    fn versioning_enabled(&self, bucket: &str) -> Result<bool, String> {
        self.buckets
            .lock()
            .expect("poisoned mutex")
            .get(bucket)
            .map(|entry| entry.versioned)
            .ok_or_else(|| format!("NoSuchBucket: {bucket}"))
    }

    fn enable_versioning(&self, bucket: &str) -> Result<(), String> {
        self.calls
            .lock()
            .expect("poisoned mutex")
            .push(format!("versioning:{bucket}"));
        let mut buckets = self.buckets.lock().expect("poisoned mutex");
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| format!("NoSuchBucket: {bucket}"))?;
        entry.versioned = true;
        Ok(())
    }

    fn put_object(&self, bucket: &str, key: &str, body: &[u8]) -> Result<Option<String>, String> {
        let head_only = *self.versions_only_on_head.lock().expect("poisoned mutex");
        let mut buckets = self.buckets.lock().expect("poisoned mutex");
        let entry = buckets
            .get_mut(bucket)
            .ok_or_else(|| format!("NoSuchBucket: {bucket}"))?;
        let versions = entry.objects.entry(key.to_string()).or_default();
        versions.push(body.to_vec());
        Ok((entry.versioned && !head_only).then(|| format!("v{}", versions.len())))
    }

    fn object_version(&self, bucket: &str, key: &str) -> Result<Option<String>, String> {
        let buckets = self.buckets.lock().expect("poisoned mutex");
        let entry = buckets
            .get(bucket)
            .ok_or_else(|| format!("NoSuchBucket: {bucket}"))?;
        Ok(entry
            .objects
            .get(key)
            .filter(|_| entry.versioned)
            .map(|versions| format!("v{}", versions.len())))
    }
}

/// Replays scripted responses in order; the last one repeats.
pub struct ScriptedProbe {
    responses: Mutex<VecDeque<Result<String, String>>>,
    requests: Mutex<usize>,
}

impl ScriptedProbe {
    pub fn new(responses: Vec<Result<String, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        *self.requests.lock().expect("poisoned mutex")
    }
}

impl SiteProbe for ScriptedProbe {
    fn fetch(&self, _url: &str) -> Result<String, String> {
        *self.requests.lock().expect("poisoned mutex") += 1;
        let mut responses = self.responses.lock().expect("poisoned mutex");
        if responses.len() > 1 {
            responses
                .pop_front()
                .unwrap_or_else(|| Err("no scripted response".to_string()))
        } else {
            responses
                .front()
                .cloned()
                .unwrap_or_else(|| Err("no scripted response".to_string()))
        }
    }
}
