//! HTTP download seam for model artifacts served over `http(s)://`.
//!
//! The trait indirection exists so the artifact-fetch path can be exercised
//! in tests without a live endpoint.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Result, ensure};

/// Fetches the body at `url` as raw bytes, failing on non-success statuses.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    ensure!(
        resp.status().is_success(),
        "GET {url} returned status {}",
        resp.status()
    );
    Ok(resp.bytes().await?.to_vec())
}
