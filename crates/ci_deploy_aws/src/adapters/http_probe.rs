use ci_deploy_core::probe::{SiteProbe, PROBE_REQUEST_TIMEOUT};

use super::block_on;

pub struct HttpSiteProbe {
    client: reqwest::Client,
}

impl HttpSiteProbe {
    pub fn new() -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(PROBE_REQUEST_TIMEOUT)
            .build()
            .map_err(|error| format!("failed to build http client: {error}"))?;
        Ok(Self { client })
    }
}

impl SiteProbe for HttpSiteProbe {
    fn fetch(&self, url: &str) -> Result<String, String> {
        let client = self.client.clone();
        let target = url.to_string();

        block_on(async move {
            client
                .get(target)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await
        })
        .map_err(|error| format!("GET {url} failed: {error}"))
    }
}
