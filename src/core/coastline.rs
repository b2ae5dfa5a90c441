use crate::domain::model::Aoi;
use crate::domain::ports::{CoastlineSource, MaskConfigProvider};
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use geo::{Coord, LineString};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
pub const DEFAULT_OVERPASS_TIMEOUT_SECS: u64 = 60;

/// OSM `natural=coastline` ways inside the AOI, fetched from an Overpass API endpoint.
pub struct OverpassCoastline {
    client: Client,
    endpoint: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    geometry: Vec<LatLon>,
}

#[derive(Debug, Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

impl OverpassCoastline {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        // leave headroom over the server-side timeout
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs + 15))
            .user_agent(concat!("sar-ship-etl/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout_secs,
        })
    }

    /// Overpass QL for coastline ways inside the AOI exterior ring.
    pub fn build_query(&self, aoi: &Aoi) -> String {
        let poly = aoi
            .polygon
            .exterior()
            .coords()
            .map(|c| format!("{} {}", c.y, c.x))
            .collect::<Vec<_>>()
            .join(" ");
        format!(
            "[out:json][timeout:{}];\nway[\"natural\"=\"coastline\"](poly:\"{}\");\nout geom;",
            self.timeout_secs, poly
        )
    }
}

#[async_trait]
impl CoastlineSource for OverpassCoastline {
    async fn fetch(&self, aoi: &Aoi) -> Result<Vec<LineString<f64>>> {
        let query = self.build_query(aoi);
        tracing::debug!("Querying Overpass at {}", self.endpoint);

        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("data", query.as_str())])
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("Overpass response status: {}", status);
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EtlError::RemoteServiceError {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let body: OverpassResponse = response.json().await?;
        let lines: Vec<LineString<f64>> = body
            .elements
            .into_iter()
            .filter(|e| e.kind == "way" && e.geometry.len() >= 2)
            .map(|e| {
                e.geometry
                    .into_iter()
                    .map(|p| Coord { x: p.lon, y: p.lat })
                    .collect::<Vec<_>>()
                    .into()
            })
            .collect();

        tracing::info!("🌊 Overpass returned {} coastline ways", lines.len());
        Ok(lines)
    }

    fn describe(&self) -> String {
        format!("overpass:{}", self.endpoint)
    }
}

/// Coastline lines read from a local GeoJSON file.
pub struct GeoJsonCoastline {
    path: String,
}

impl GeoJsonCoastline {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl CoastlineSource for GeoJsonCoastline {
    async fn fetch(&self, _aoi: &Aoi) -> Result<Vec<LineString<f64>>> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        let lines = crate::core::geometry::lines_from_geojson(&text)?;
        tracing::info!("🌊 Loaded {} coastline lines from {}", lines.len(), self.path);
        Ok(lines)
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path)
    }
}

/// Local file when configured, Overpass otherwise.
pub fn coastline_source_for<C: MaskConfigProvider + ?Sized>(
    config: &C,
) -> Result<Box<dyn CoastlineSource>> {
    match config.coastline_file() {
        Some(path) => Ok(Box::new(GeoJsonCoastline::new(path))),
        None => Ok(Box::new(OverpassCoastline::new(
            config.overpass_url(),
            config.overpass_timeout_secs(),
        )?)),
    }
}
