use std::collections::HashMap;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";
const DEFAULT_RADIUS_M: u32 = 5000;
const MAX_RESULTS: usize = 10;
const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyHospital {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub facility_type: String,
    pub address: String,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub emergency: bool,
    pub opening_hours: String,
    pub distance: f64,
    pub distance_text: String,
    pub lat: f64,
    pub lng: f64,
    pub is_open: Option<bool>,
    pub is_fallback: bool,
}

impl NearbyHospital {
    pub fn directions_url(&self) -> String {
        format!(
            "https://www.google.com/maps/dir/?api=1&destination={},{}&destination_place_id={}",
            self.lat,
            self.lng,
            urlencode(&self.name)
        )
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}

/// Looks up nearby hospitals and clinics through the Overpass
/// (OpenStreetMap) API; no key required.
#[derive(Debug, Clone)]
pub struct HospitalLocator {
    client: Client,
    endpoint: String,
}

impl HospitalLocator {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
        }
    }

    /// Nearest facilities within `radius_m` meters, sorted by distance,
    /// at most ten.
    pub async fn nearby(
        &self,
        lat: f64,
        lng: f64,
        radius_m: Option<u32>,
    ) -> anyhow::Result<Vec<NearbyHospital>> {
        let radius = radius_m.unwrap_or(DEFAULT_RADIUS_M);
        let query = overpass_query(lat, lng, radius);
        debug!(lat, lng, radius, "overpass hospital lookup");

        let response = self
            .client
            .post(&self.endpoint)
            .body(query)
            .send()
            .await?
            .error_for_status()?
            .json::<OverpassResponse>()
            .await?;

        let hospitals = rank_elements(lat, lng, response.elements);
        info!(result_count = hospitals.len(), "overpass hospital lookup done");
        Ok(hospitals)
    }
}

fn overpass_query(lat: f64, lng: f64, radius_m: u32) -> String {
    format!(
        "[out:json][timeout:25];\n(\n  \
         node[\"amenity\"=\"hospital\"](around:{radius_m},{lat},{lng});\n  \
         way[\"amenity\"=\"hospital\"](around:{radius_m},{lat},{lng});\n  \
         node[\"amenity\"=\"clinic\"](around:{radius_m},{lat},{lng});\n  \
         way[\"amenity\"=\"clinic\"](around:{radius_m},{lat},{lng});\n  \
         node[\"healthcare\"=\"hospital\"](around:{radius_m},{lat},{lng});\n  \
         way[\"healthcare\"=\"hospital\"](around:{radius_m},{lat},{lng});\n);\nout center;"
    )
}

fn rank_elements(lat: f64, lng: f64, elements: Vec<OverpassElement>) -> Vec<NearbyHospital> {
    let mut hospitals: Vec<NearbyHospital> = elements
        .into_iter()
        .filter_map(|element| map_element(lat, lng, element))
        .collect();
    hospitals.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hospitals.truncate(MAX_RESULTS);
    hospitals
}

fn map_element(origin_lat: f64, origin_lng: f64, element: OverpassElement) -> Option<NearbyHospital> {
    // Ways carry their coordinates in `center`.
    let lat = element.lat.or(element.center.as_ref().map(|c| c.lat))?;
    let lng = element.lon.or(element.center.as_ref().map(|c| c.lon))?;
    let tags = element.tags;

    let distance = haversine_km(origin_lat, origin_lng, lat, lng);
    let opening_hours = tags
        .get("opening_hours")
        .cloned()
        .unwrap_or_else(|| "Call for hours".to_owned());
    let emergency = tags.get("emergency").is_some_and(|value| value == "yes")
        || tags
            .get("healthcare:speciality")
            .is_some_and(|value| value.contains("emergency"));

    Some(NearbyHospital {
        id: element.id,
        name: tags
            .get("name")
            .cloned()
            .unwrap_or_else(|| "Healthcare Facility".to_owned()),
        facility_type: tags
            .get("amenity")
            .or_else(|| tags.get("healthcare"))
            .cloned()
            .unwrap_or_else(|| "hospital".to_owned()),
        address: format_address(&tags),
        phone: tags
            .get("phone")
            .or_else(|| tags.get("contact:phone"))
            .cloned(),
        website: tags
            .get("website")
            .or_else(|| tags.get("contact:website"))
            .cloned(),
        emergency,
        is_open: open_state(&opening_hours),
        opening_hours,
        distance,
        distance_text: distance_text(distance),
        lat,
        lng,
        is_fallback: false,
    })
}

pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

fn distance_text(distance_km: f64) -> String {
    if distance_km < 1.0 {
        format!("{}m", (distance_km * 1000.0).round() as i64)
    } else {
        format!("{distance_km:.1}km")
    }
}

fn format_address(tags: &HashMap<String, String>) -> String {
    let parts: Vec<&str> = ["addr:housenumber", "addr:street", "addr:city", "addr:postcode"]
        .iter()
        .filter_map(|key| tags.get(*key).map(String::as_str))
        .collect();

    if parts.is_empty() {
        tags.get("address")
            .cloned()
            .unwrap_or_else(|| "Address not available".to_owned())
    } else {
        parts.join(", ")
    }
}

/// Only the trivial always-open case is decidable without a full
/// opening_hours parser; everything else is unknown.
fn open_state(opening_hours: &str) -> Option<bool> {
    if opening_hours == "24/7" {
        Some(true)
    } else {
        None
    }
}

/// Placeholder entry shown when the lookup fails entirely, so the emergency
/// surface is never empty.
pub fn fallback_hospitals(lat: f64, lng: f64) -> Vec<NearbyHospital> {
    vec![NearbyHospital {
        id: -1,
        name: "Nearest Hospital".to_owned(),
        facility_type: "hospital".to_owned(),
        address: "Search for hospitals in your area".to_owned(),
        phone: None,
        website: None,
        emergency: true,
        opening_hours: "24/7".to_owned(),
        distance: 0.0,
        distance_text: "Enable location".to_owned(),
        lat,
        lng,
        is_open: Some(true),
        is_fallback: true,
    }]
}

fn urlencode(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char);
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}
