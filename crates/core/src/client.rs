//! HTTP client for the tile server and the clipping service.
//!
//! Every call maps transport failures and non-2xx statuses to
//! [`ClipError::NetworkUnreachable`] and undecodable bodies to
//! [`ClipError::MalformedResponse`], tagging both with the endpoint and the
//! raster URL involved.

use crate::colormap::{PERCENTILES, RasterStatistics};
use crate::config::Config;
use crate::error::{ClipError, Result};
use crate::progress::{LogRecord, decode_log_stream};
use futures::Stream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

/// Descriptive metadata published next to a raster.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LayerMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub contact: Option<Contact>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub organization: Option<String>,
}

impl LayerMetadata {
    /// Attribution for the tile layer: the publishing organization.
    pub fn attribution(&self) -> Option<&str> {
        self.contact.as_ref()?.organization.as_deref()
    }
}

/// Native grid of a raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterInfo {
    /// EPSG code of the raster's coordinate system, if it has one.
    pub epsg: Option<u32>,
    /// `(x, y)` pixel size; `y` is usually negative.
    pub pixel_size: (f64, f64),
}

#[derive(Deserialize)]
struct InfoEnvelope {
    info: InfoBody,
}

#[derive(Deserialize)]
struct InfoBody {
    #[serde(default)]
    stac: Option<StacProperties>,
    #[serde(rename = "geoTransform")]
    geo_transform: Vec<f64>,
}

#[derive(Deserialize)]
struct StacProperties {
    #[serde(rename = "proj:epsg", default)]
    epsg: Option<u32>,
}

impl TryFrom<InfoEnvelope> for RasterInfo {
    type Error = String;

    fn try_from(envelope: InfoEnvelope) -> std::result::Result<Self, Self::Error> {
        let gt = &envelope.info.geo_transform;
        if gt.len() < 6 {
            return Err(format!(
                "geoTransform has {} elements, expected 6",
                gt.len()
            ));
        }
        Ok(Self {
            epsg: envelope.info.stac.and_then(|s| s.epsg),
            pixel_size: (gt[1], gt[5]),
        })
    }
}

/// Name and units of a coordinate system.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EpsgInfo {
    pub status: String,
    #[serde(default)]
    pub epsg_name: String,
    #[serde(default)]
    pub srs_units: String,
}

impl EpsgInfo {
    pub fn is_success(&self) -> bool {
        self.status == "success"
    }
}

/// Body of a clip submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipRequest {
    pub cog_url: String,
    /// `[west, south, east, north]`
    pub target_bbox: [f64; 4],
    pub target_epsg: u32,
    /// Omitted to let the service keep the source pixel size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cellsize: Option<[f64; 2]>,
}

/// Result of a finished clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipResponse {
    /// Public download URL of the clipped raster.
    pub url: String,
    /// Human-readable file size, e.g. `"42.3 MB"`.
    pub size: String,
}

/// Boxed stream of decoded status records.
pub type LogRecordStream = Pin<Box<dyn Stream<Item = Result<LogRecord>> + Send>>;

/// Thin async wrapper over the remote endpoints.
#[derive(Clone)]
pub struct RasterClient {
    http: reqwest::Client,
    config: Config,
}

impl RasterClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ClipError::config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Checks that the raster answers a HEAD request.
    pub async fn probe(&self, raster_url: &str) -> Result<()> {
        debug!(raster_url, "probing raster");
        let response = self
            .with_timeout(self.http.head(raster_url))
            .send()
            .await
            .map_err(|e| ClipError::unreachable("HEAD", raster_url, e))?;
        if !response.status().is_success() {
            return Err(ClipError::unreachable(
                "HEAD",
                raster_url,
                response.status(),
            ));
        }
        Ok(())
    }

    /// Band statistics at the fixed percentiles.
    pub async fn statistics(&self, raster_url: &str) -> Result<RasterStatistics> {
        let endpoint = self.config.statistics_endpoint();
        self.get_json(&endpoint, raster_url, &statistics_query(raster_url))
            .await
    }

    pub async fn metadata(&self, raster_url: &str) -> Result<LayerMetadata> {
        let endpoint = self.config.metadata_endpoint();
        self.get_json(&endpoint, raster_url, &[("cog_url", raster_url.to_string())])
            .await
    }

    pub async fn info(&self, raster_url: &str) -> Result<RasterInfo> {
        let endpoint = self.config.info_endpoint();
        let envelope: InfoEnvelope = self
            .get_json(&endpoint, raster_url, &[("cog_url", raster_url.to_string())])
            .await?;
        RasterInfo::try_from(envelope).map_err(|reason| ClipError::malformed(&endpoint, reason))
    }

    pub async fn epsg_info(&self, epsg_code: u32) -> Result<EpsgInfo> {
        let endpoint = self.config.epsg_info_endpoint();
        self.get_json(&endpoint, "", &[("epsg_code", epsg_code.to_string())])
            .await
    }

    /// Submits a clip and waits for the finished result.
    pub async fn submit_clip(&self, request: &ClipRequest) -> Result<ClipResponse> {
        let endpoint = self.config.clip_endpoint();
        let response = self
            .with_timeout(self.http.post(&endpoint).json(request))
            .send()
            .await
            .map_err(|e| ClipError::unreachable(endpoint.as_str(), request.cog_url.as_str(), e))?;
        read_json(response, &endpoint, &request.cog_url).await
    }

    /// Opens the live status stream. No timeout applies to it.
    pub async fn status_stream(&self) -> Result<LogRecordStream> {
        let endpoint = self.config.status_endpoint();
        let response = self
            .http
            .get(&endpoint)
            .send()
            .await
            .map_err(|e| ClipError::unreachable(endpoint.as_str(), "", e))?;
        if !response.status().is_success() {
            return Err(ClipError::unreachable(endpoint, "", response.status()));
        }
        Ok(Box::pin(decode_log_stream(response.bytes_stream(), endpoint)))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        raster_url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        debug!(endpoint, raster_url, "GET");
        let response = self
            .with_timeout(self.http.get(endpoint).query(query))
            .send()
            .await
            .map_err(|e| ClipError::unreachable(endpoint, raster_url, e))?;
        read_json(response, endpoint, raster_url).await
    }

    fn with_timeout(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}

/// `url=<raster>&p=2&p=20&...` for the statistics endpoint.
pub fn statistics_query(raster_url: &str) -> Vec<(&'static str, String)> {
    std::iter::once(("url", raster_url.to_string()))
        .chain(PERCENTILES.iter().map(|p| ("p", p.to_string())))
        .collect()
}

async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
    raster_url: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(ClipError::unreachable(endpoint, raster_url, status));
    }
    let body = response
        .text()
        .await
        .map_err(|e| ClipError::unreachable(endpoint, raster_url, e))?;
    serde_json::from_str(&body).map_err(|e| ClipError::malformed(endpoint, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_query_lists_every_percentile() {
        let query = statistics_query("https://bucket/a.tif");
        let rendered: Vec<String> = query.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        assert_eq!(
            rendered,
            vec![
                "url=https://bucket/a.tif",
                "p=2",
                "p=20",
                "p=40",
                "p=60",
                "p=80",
                "p=98"
            ]
        );
    }

    #[test]
    fn clip_request_omits_absent_cellsize() {
        let request = ClipRequest {
            cog_url: "https://bucket/a.tif".into(),
            target_bbox: [-13.3, 7.2, -12.2, 8.0],
            target_epsg: 4326,
            target_cellsize: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "cog_url": "https://bucket/a.tif",
                "target_bbox": [-13.3, 7.2, -12.2, 8.0],
                "target_epsg": 4326
            })
        );

        let with_cells = ClipRequest {
            target_cellsize: Some([0.01, -0.01]),
            ..request
        };
        let json = serde_json::to_value(&with_cells).unwrap();
        assert_eq!(json["target_cellsize"], serde_json::json!([0.01, -0.01]));
    }

    #[test]
    fn info_reads_epsg_and_pixel_size() {
        let body = r#"{"status":"success","info":{
            "stac":{"proj:epsg":32610},
            "geoTransform":[500000.0,30.0,0.0,4200000.0,0.0,-30.0]}}"#;
        let envelope: InfoEnvelope = serde_json::from_str(body).unwrap();
        let info = RasterInfo::try_from(envelope).unwrap();
        assert_eq!(info.epsg, Some(32610));
        assert_eq!(info.pixel_size, (30.0, -30.0));
    }

    #[test]
    fn info_without_epsg_or_full_transform() {
        let body = r#"{"info":{"stac":{"proj:epsg":null},"geoTransform":[0.0,1.0,0.0,0.0,0.0,-1.0]}}"#;
        let info = RasterInfo::try_from(serde_json::from_str::<InfoEnvelope>(body).unwrap()).unwrap();
        assert_eq!(info.epsg, None);

        let short = r#"{"info":{"geoTransform":[0.0,1.0]}}"#;
        assert!(RasterInfo::try_from(serde_json::from_str::<InfoEnvelope>(short).unwrap()).is_err());
    }

    #[test]
    fn metadata_attribution_is_optional() {
        let full: LayerMetadata =
            serde_json::from_str(r#"{"title":"AWC","contact":{"organization":"NatCap"}}"#).unwrap();
        assert_eq!(full.attribution(), Some("NatCap"));
        assert_eq!(full.title.as_deref(), Some("AWC"));

        let bare: LayerMetadata = serde_json::from_str(r#"{"title":"AWC"}"#).unwrap();
        assert_eq!(bare.attribution(), None);
    }

    #[test]
    fn epsg_info_failure_is_not_success() {
        let info: EpsgInfo =
            serde_json::from_str(r#"{"status":"failure","epsg_name":"","srs_units":""}"#).unwrap();
        assert!(!info.is_success());
    }
}
