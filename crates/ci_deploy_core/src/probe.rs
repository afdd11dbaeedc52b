use std::time::Duration;

use serde_json::json;

use crate::log;
use crate::poll::{poll_until, PollPolicy};

/// Text the application's landing page is expected to contain.
pub const SITE_MARKER: &str = "Automation for the People";
pub const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub trait SiteProbe {
    /// Fetches `url` and returns the response body.
    fn fetch(&self, url: &str) -> Result<String, String>;
}

pub fn site_url(balancer_dns_name: &str) -> String {
    format!("http://{balancer_dns_name}")
}

pub fn page_has_marker(body: &str) -> bool {
    body.contains(SITE_MARKER)
}

/// Transport failures mean "not serving yet", never an error.
pub fn site_is_serving(probe: &impl SiteProbe, url: &str) -> bool {
    match probe.fetch(url) {
        Ok(body) => page_has_marker(&body),
        Err(error) => {
            log::warn(
                "probe",
                "site_unreachable",
                json!({ "url": url, "error": error }),
            );
            false
        }
    }
}

pub fn wait_for_site(probe: &impl SiteProbe, url: &str, policy: &PollPolicy) -> bool {
    // The attempt closure never errors.
    poll_until(policy, || Ok(site_is_serving(probe, url).then_some(())))
        .map(|served| served.is_some())
        .unwrap_or(false)
}
