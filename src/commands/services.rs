//! Builds the long-lived collaborators a command needs from a [`Config`].

use std::sync::Arc;

use anyhow::Result;
use log::debug;
use reqwest::{
    Client,
    header::{AUTHORIZATION, HeaderMap, HeaderValue},
};

use crate::{
    cache::PackageCache,
    http::HttpClient,
    logger::{LogFacadeLogger, Logger},
    runtime::{RealRuntime, Runtime},
    source::SourceFactory,
};

use super::config::Config;

/// Build an HTTP client with optional authentication token
pub fn build_http_client(token: Option<&str>) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();

    if let Some(token) = token {
        let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", token))?;
        auth_value.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_value);
        debug!("HTTP client configured with authentication");
    }

    let client = Client::builder()
        .user_agent("hangar-cli")
        .default_headers(headers)
        .build()?;

    Ok(HttpClient::new(client))
}

/// Everything shared between the database, the sources and the installers.
pub struct Services {
    pub runtime: Arc<dyn Runtime>,
    pub cache: Arc<PackageCache>,
    pub factory: SourceFactory,
    pub logger: Arc<dyn Logger>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        let runtime: Arc<dyn Runtime> = Arc::new(RealRuntime);
        let cache = Arc::new(PackageCache::open(runtime.clone(), config.cache_root.clone())?);
        let http = build_http_client(config.token.as_deref())?;
        let factory = SourceFactory::new(http, cache.clone(), runtime.clone())
            .with_default_api_url(&config.api_url);

        Ok(Self {
            runtime,
            cache,
            factory,
            logger: Arc::new(LogFacadeLogger),
        })
    }
}
