use crate::error::{ClipError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Tile server used for statistics and colorized tiles.
pub const DEFAULT_TITILER_URL: &str = "https://titiler-897938321824.us-west1.run.app";
/// Clipping service used for metadata, info, clip and status.
pub const DEFAULT_SERVICE_URL: &str = "https://clipping-service-897938321824.us-west1.run.app";
/// Pause between submitting a clip and opening the status stream.
pub const DEFAULT_STATUS_DELAY: Duration = Duration::from_secs(5);
/// Zoom level the map starts at when none is configured.
pub const DEFAULT_START_ZOOM: f64 = 5.0;

#[derive(Clone, Debug)]
pub struct Config {
    pub titiler_url: Url,
    pub service_url: Url,
    pub status_delay: Duration,
    /// Applied to request/response calls only, never to the status stream.
    pub request_timeout: Option<Duration>,
    pub start_lat: f64,
    pub start_lng: f64,
    pub start_zoom: f64,
}

impl Config {
    pub fn load() -> Result<Self> {
        // Load .env file if it exists, ignore if it doesn't
        let _ = dotenv();

        let mut builder = Config::builder();

        if let Ok(url) = env::var("TITILER_URL") {
            builder = builder.with_titiler_url(url);
        }
        if let Ok(url) = env::var("CLIP_SERVICE_URL") {
            builder = builder.with_service_url(url);
        }
        if let Some(secs) = parse_env::<u64>("CLIP_STATUS_DELAY_SECS")? {
            builder = builder.with_status_delay(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_env::<u64>("CLIP_REQUEST_TIMEOUT_SECS")? {
            builder = builder.with_request_timeout(Duration::from_secs(secs));
        }
        if let (Some(lat), Some(lng)) = (
            parse_env::<f64>("CLIP_START_LAT")?,
            parse_env::<f64>("CLIP_START_LNG")?,
        ) {
            builder = builder.with_start_center(lat, lng);
        }
        if let Some(zoom) = parse_env::<f64>("CLIP_START_ZOOM")? {
            builder = builder.with_start_zoom(zoom);
        }

        builder.build()
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Builder prefilled with this configuration, for layering overrides.
    pub fn to_builder(&self) -> ConfigBuilder {
        ConfigBuilder {
            titiler_url: Some(self.titiler_url.to_string()),
            service_url: Some(self.service_url.to_string()),
            status_delay: Some(self.status_delay),
            request_timeout: self.request_timeout,
            start_center: Some((self.start_lat, self.start_lng)),
            start_zoom: Some(self.start_zoom),
        }
    }

    /// `<titiler>/cog/statistics`
    pub fn statistics_endpoint(&self) -> String {
        join(&self.titiler_url, "cog/statistics")
    }

    /// `<titiler>/cog/tiles/WebMercatorQuad`
    pub fn tiles_endpoint(&self) -> String {
        join(&self.titiler_url, "cog/tiles/WebMercatorQuad")
    }

    pub fn metadata_endpoint(&self) -> String {
        join(&self.service_url, "metadata")
    }

    pub fn info_endpoint(&self) -> String {
        join(&self.service_url, "info")
    }

    pub fn epsg_info_endpoint(&self) -> String {
        join(&self.service_url, "epsg_info")
    }

    pub fn clip_endpoint(&self) -> String {
        join(&self.service_url, "clip")
    }

    pub fn status_endpoint(&self) -> String {
        join(&self.service_url, "status")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            titiler_url: Url::parse(DEFAULT_TITILER_URL).expect("default titiler URL is valid"),
            service_url: Url::parse(DEFAULT_SERVICE_URL).expect("default service URL is valid"),
            status_delay: DEFAULT_STATUS_DELAY,
            request_timeout: None,
            start_lat: 0.0,
            start_lng: 0.0,
            start_zoom: DEFAULT_START_ZOOM,
        }
    }
}

/// Builder for [`Config`], validating URLs on [`ConfigBuilder::build`].
#[derive(Default, Debug)]
pub struct ConfigBuilder {
    titiler_url: Option<String>,
    service_url: Option<String>,
    status_delay: Option<Duration>,
    request_timeout: Option<Duration>,
    start_center: Option<(f64, f64)>,
    start_zoom: Option<f64>,
}

impl ConfigBuilder {
    pub fn with_titiler_url(mut self, url: impl Into<String>) -> Self {
        self.titiler_url = Some(url.into());
        self
    }

    pub fn with_service_url(mut self, url: impl Into<String>) -> Self {
        self.service_url = Some(url.into());
        self
    }

    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = Some(delay);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_start_center(mut self, lat: f64, lng: f64) -> Self {
        self.start_center = Some((lat, lng));
        self
    }

    pub fn with_start_zoom(mut self, zoom: f64) -> Self {
        self.start_zoom = Some(zoom);
        self
    }

    pub fn build(self) -> Result<Config> {
        let defaults = Config::default();

        let titiler_url = match self.titiler_url {
            Some(raw) => parse_base_url("TITILER_URL", &raw)?,
            None => defaults.titiler_url,
        };
        let service_url = match self.service_url {
            Some(raw) => parse_base_url("CLIP_SERVICE_URL", &raw)?,
            None => defaults.service_url,
        };

        let (start_lat, start_lng) = self
            .start_center
            .unwrap_or((defaults.start_lat, defaults.start_lng));
        if !(-90.0..=90.0).contains(&start_lat) || !(-180.0..=180.0).contains(&start_lng) {
            return Err(ClipError::config(format!(
                "Start center out of range: lat {}, lng {}",
                start_lat, start_lng
            )));
        }

        Ok(Config {
            titiler_url,
            service_url,
            status_delay: self.status_delay.unwrap_or(defaults.status_delay),
            request_timeout: self.request_timeout,
            start_lat,
            start_lng,
            start_zoom: self.start_zoom.unwrap_or(defaults.start_zoom),
        })
    }
}

fn parse_base_url(name: &str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ClipError::config(format!("{} is not a valid URL ({}): {}", name, raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClipError::config(format!(
            "{} must be an http(s) URL, got {}",
            name, raw
        )));
    }
    Ok(url)
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ClipError::config(format!("{} has an invalid value: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

fn join(base: &Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_joined_without_double_slashes() {
        let config = Config::builder()
            .with_service_url("http://127.0.0.1:5000/")
            .with_titiler_url("http://tiles.local")
            .build()
            .unwrap();

        assert_eq!(config.clip_endpoint(), "http://127.0.0.1:5000/clip");
        assert_eq!(config.status_endpoint(), "http://127.0.0.1:5000/status");
        assert_eq!(
            config.statistics_endpoint(),
            "http://tiles.local/cog/statistics"
        );
    }

    #[test]
    fn builder_rejects_non_http_urls() {
        let err = Config::builder()
            .with_service_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, ClipError::Config(_)));
    }

    #[test]
    fn overrides_layer_on_top_of_loaded_values() {
        let base = Config::builder()
            .with_request_timeout(Duration::from_secs(30))
            .with_start_zoom(8.0)
            .build()
            .unwrap();
        let config = base
            .to_builder()
            .with_service_url("http://localhost:8080")
            .build()
            .unwrap();

        assert_eq!(config.clip_endpoint(), "http://localhost:8080/clip");
        assert_eq!(config.titiler_url, base.titiler_url);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.start_zoom, 8.0);
    }

    #[test]
    fn defaults_use_five_second_status_delay() {
        let config = Config::builder().build().unwrap();
        assert_eq!(config.status_delay, Duration::from_secs(5));
        assert!(config.request_timeout.is_none());
        assert_eq!(config.start_zoom, DEFAULT_START_ZOOM);
    }
}
