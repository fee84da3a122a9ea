//! Water-body geometry from an Overpass API endpoint.
//!
//! Rivers and streams come back as ways. Lakes and reservoirs are either
//! closed ways or multipolygon relations whose outer member ways have to be
//! chained into a single ring.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use hydro_common::{BoundingBox, FeatureKind, GeometryFeature};

use crate::error::{UpstreamError, UpstreamResult};

pub const DEFAULT_OVERPASS_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";

/// Server-side timeout requested in the query, in seconds.
const QUERY_TIMEOUT_SECS: u64 = 60;

const UNNAMED: &str = "Unnamed";

/// What to fetch from the geometry provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryQuery {
    pub bbox: BoundingBox,
    /// Case-insensitive name fragment.
    pub name: Option<String>,
}

impl GeometryQuery {
    pub fn new(bbox: BoundingBox) -> Self {
        Self { bbox, name: None }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.name = if name.trim().is_empty() {
            None
        } else {
            Some(name.trim().to_string())
        };
        self
    }

    /// Overpass QL for every river, stream, lake and reservoir in the box.
    pub fn to_overpass_ql(&self) -> String {
        let b = &self.bbox;
        let area = format!("({},{},{},{})", b.south, b.west, b.north, b.east);
        let name = self
            .name
            .as_ref()
            .map(|n| format!("[\"name\"~\"{}\",i]", escape_ql(n)))
            .unwrap_or_default();

        format!(
            "[out:json][timeout:{t}];(\
             way[\"waterway\"~\"^(river|stream)$\"]{name}{area};\
             way[\"natural\"=\"water\"]{name}{area};\
             relation[\"natural\"=\"water\"]{name}{area};\
             way[\"landuse\"=\"reservoir\"]{name}{area};\
             );out geom;",
            t = QUERY_TIMEOUT_SECS,
            name = name,
            area = area,
        )
    }
}

fn escape_ql(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control())
        .flat_map(|c| match c {
            '"' | '\\' => vec!['\\', c],
            '.' | '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' => {
                vec!['\\', '\\', c]
            }
            _ => vec![c],
        })
        .collect()
}

/// Source of water-body outlines.
#[async_trait]
pub trait GeometryProvider: Send + Sync {
    async fn fetch_features(&self, query: &GeometryQuery) -> UpstreamResult<Vec<GeometryFeature>>;

    fn name(&self) -> &'static str;
}

/// HTTP client for an Overpass interpreter endpoint.
pub struct OverpassClient {
    client: Client,
    endpoint: String,
}

impl OverpassClient {
    pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("hydro-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl GeometryProvider for OverpassClient {
    #[instrument(skip(self, query), fields(bbox = %query.bbox.cache_key()))]
    async fn fetch_features(&self, query: &GeometryQuery) -> UpstreamResult<Vec<GeometryFeature>> {
        let ql = query.to_overpass_ql();
        let response = self
            .client
            .post(&self.endpoint)
            .form(&[("data", ql.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Http {
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let features = parse_overpass_response(&body)?;
        debug!(features = features.len(), "Parsed geometry features");
        Ok(features)
    }

    fn name(&self) -> &'static str {
        "overpass"
    }
}

// ============================================================================
// Overpass JSON
// ============================================================================

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Element {
    Node {},
    Way {
        id: i64,
        #[serde(default)]
        tags: HashMap<String, String>,
        #[serde(default)]
        geometry: Vec<LatLon>,
    },
    Relation {
        id: i64,
        #[serde(default)]
        tags: HashMap<String, String>,
        #[serde(default)]
        members: Vec<Member>,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct LatLon {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct Member {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    role: String,
    #[serde(default)]
    geometry: Vec<LatLon>,
}

/// Classify an element from its tags.
fn feature_kind(tags: &HashMap<String, String>) -> Option<FeatureKind> {
    match tags.get("waterway").map(String::as_str) {
        Some("river") => return Some(FeatureKind::River),
        Some("stream") => return Some(FeatureKind::Stream),
        _ => {}
    }
    let reservoir = tags.get("landuse").map(String::as_str) == Some("reservoir")
        || tags.get("water").map(String::as_str) == Some("reservoir");
    if reservoir {
        return Some(FeatureKind::Reservoir);
    }
    if tags.get("natural").map(String::as_str) == Some("water") {
        return Some(FeatureKind::Lake);
    }
    None
}

fn feature_name(tags: &HashMap<String, String>) -> String {
    tags.get("name")
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .unwrap_or(UNNAMED)
        .to_string()
}

fn to_coords(points: &[LatLon]) -> Vec<(f64, f64)> {
    points
        .iter()
        .filter(|p| p.lat.is_finite() && p.lon.is_finite())
        .map(|p| (p.lat, p.lon))
        .collect()
}

/// Chain outer member ways into one coordinate sequence.
///
/// Each next way is the one whose start or end touches the current tail;
/// it is reversed when only its end touches. Ways that never connect are
/// appended in order.
pub fn chain_ways(mut ways: Vec<Vec<(f64, f64)>>) -> Vec<(f64, f64)> {
    ways.retain(|w| !w.is_empty());
    if ways.is_empty() {
        return Vec::new();
    }

    let mut ring = ways.remove(0);
    while !ways.is_empty() {
        let tail = ring[ring.len() - 1];
        let next = ways
            .iter()
            .position(|w| w.first() == Some(&tail) || w.last() == Some(&tail));

        let mut way = match next {
            Some(i) => ways.remove(i),
            None => ways.remove(0),
        };
        if way.last() == Some(&tail) && way.first() != Some(&tail) {
            way.reverse();
        }
        if way.first() == Some(&tail) {
            way.remove(0);
        }
        ring.extend(way);
    }
    ring
}

/// Parse an Overpass response into validated features.
pub fn parse_overpass_response(body: &str) -> UpstreamResult<Vec<GeometryFeature>> {
    let response: OverpassResponse = serde_json::from_str(body)?;
    let mut features = Vec::new();

    for element in response.elements {
        let (id, tags, coordinates) = match element {
            Element::Node {} => continue,
            Element::Way { id, tags, geometry } => {
                (format!("way/{}", id), tags, to_coords(&geometry))
            }
            Element::Relation { id, tags, members } => {
                let outers = members
                    .iter()
                    .filter(|m| m.kind == "way" && (m.role == "outer" || m.role.is_empty()))
                    .map(|m| to_coords(&m.geometry))
                    .collect();
                (format!("relation/{}", id), tags, chain_ways(outers))
            }
        };

        let Some(kind) = feature_kind(&tags) else {
            continue;
        };

        let feature = GeometryFeature {
            id,
            name: feature_name(&tags),
            kind,
            coordinates,
        };
        let feature_id = feature.id.clone();
        match feature.normalized() {
            Some(f) => features.push(f),
            None => warn!(id = %feature_id, "Dropping feature with too few points"),
        }
    }

    Ok(features)
}
