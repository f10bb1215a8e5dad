//! Clients for the three used-car marketplaces.
//!
//! Each site exposes its own facet hierarchy and result shape:
//! - `encar`: JSON navigation facets plus a catalog API with a proprietary
//!   query grammar,
//! - `kbchachacha`: JSON facet endpoints plus an HTML listing page,
//! - `kcar`: JSON-POST facet endpoints plus an HTML listing page.

pub mod encar;
pub mod kbchachacha;
pub mod kcar;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Shared HTTP client. The marketplaces reject requests without a browser
/// User-Agent, and a request that hangs must not wedge a poller forever.
pub fn build_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(std::time::Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .expect("failed to build http client")
}
