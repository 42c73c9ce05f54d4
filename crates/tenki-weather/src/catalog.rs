//! Region hierarchy: centers (地方) own offices (府県予報区).

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::error::ForecastError;
use crate::provider::ForecastClient;
use crate::types::{Region, RegionKind};

/// Top-level region owning a list of offices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Center {
    pub code: String,
    pub name: String,
    /// Office codes in document order
    pub child_codes: Vec<String>,
}

/// Forecast office; the unit a forecast is requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Office {
    pub code: String,
    pub name: String,
    pub parent_code: Option<String>,
    /// False for offices without a forecast endpoint
    pub selectable: bool,
}

/// A center with the offices that may be offered for selection
#[derive(Debug, Clone)]
pub struct RegionGroup<'a> {
    pub center: &'a Center,
    pub offices: Vec<&'a Office>,
}

/// Objects keep their key order (`preserve_order`), so centers come out
/// as listed upstream.
#[derive(Debug, Deserialize)]
struct AreaDocument {
    #[serde(default)]
    centers: Map<String, Value>,
    #[serde(default)]
    offices: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct CenterEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OfficeEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    parent: Option<String>,
}

/// Typed `(code, entry)` pairs of a JSON object, in document order.
fn entries<T: DeserializeOwned>(
    map: Map<String, Value>,
) -> Result<Vec<(String, T)>, serde_json::Error> {
    map.into_iter()
        .map(|(code, value)| serde_json::from_value(value).map(|entry| (code, entry)))
        .collect()
}

/// Read-only index of the region hierarchy, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct RegionCatalog {
    centers: Vec<Center>,
    offices: HashMap<String, Office>,
}

impl RegionCatalog {
    /// Fetch and index the region hierarchy.
    #[tracing::instrument(skip(client, excluded_codes), level = "info")]
    pub async fn load(
        client: &ForecastClient,
        excluded_codes: &[String],
    ) -> Result<Self, ForecastError> {
        let body = client
            .fetch_area_document()
            .await
            .map_err(|e| ForecastError::CatalogUnavailable(e.to_string()))?;

        let catalog = Self::from_json(&body, excluded_codes)?;
        tracing::info!(
            centers = catalog.centers.len(),
            offices = catalog.offices.len(),
            "Region catalog loaded"
        );
        Ok(catalog)
    }

    /// Build the catalog from a region hierarchy document.
    pub fn from_json(body: &str, excluded_codes: &[String]) -> Result<Self, ForecastError> {
        let document: AreaDocument = serde_json::from_str(body)
            .map_err(|e| ForecastError::CatalogUnavailable(format!("invalid area document: {e}")))?;

        if document.offices.is_empty() {
            return Err(ForecastError::CatalogUnavailable(
                "area document lists no offices".to_string(),
            ));
        }

        let invalid = |e: serde_json::Error| {
            ForecastError::CatalogUnavailable(format!("invalid region entry: {e}"))
        };
        let center_entries: Vec<(String, CenterEntry)> =
            entries(document.centers).map_err(invalid)?;
        let office_entries: Vec<(String, OfficeEntry)> =
            entries(document.offices).map_err(invalid)?;

        let excluded: HashSet<String> = excluded_codes.iter().cloned().collect();

        let centers: Vec<Center> = center_entries
            .into_iter()
            .map(|(code, entry)| Center {
                code,
                name: entry.name,
                child_codes: entry.children,
            })
            .collect();

        let offices = office_entries
            .into_iter()
            .map(|(code, entry)| {
                let office = Office {
                    selectable: !excluded.contains(&code),
                    code: code.clone(),
                    name: entry.name,
                    parent_code: entry.parent.filter(|p| !p.is_empty()),
                };
                (code, office)
            })
            .collect();

        Ok(Self { centers, offices })
    }

    /// Office metadata, including excluded offices
    pub fn office(&self, code: &str) -> Option<&Office> {
        self.offices.get(code)
    }

    /// Selectable office by code; excluded or unknown codes yield `None`
    pub fn selectable_office(&self, code: &str) -> Option<&Office> {
        self.office(code).filter(|office| office.selectable)
    }

    /// Region listing for the presentation layer: centers in document
    /// order with their selectable offices in child order.
    pub fn selectable_groups(&self) -> Vec<RegionGroup<'_>> {
        self.centers
            .iter()
            .map(|center| RegionGroup {
                center,
                offices: center
                    .child_codes
                    .iter()
                    .filter_map(|code| self.selectable_office(code))
                    .collect(),
            })
            .collect()
    }

    /// Every center and office as a flat region list, centers first.
    pub fn regions(&self) -> Vec<Region> {
        let centers = self.centers.iter().map(|center| Region {
            code: center.code.clone(),
            name: center.name.clone(),
            kind: RegionKind::Center,
            parent_code: None,
        });

        let mut offices: Vec<&Office> = self.offices.values().collect();
        offices.sort_by(|a, b| a.code.cmp(&b.code));
        let offices = offices.into_iter().map(|office| Region {
            code: office.code.clone(),
            name: office.name.clone(),
            kind: RegionKind::Office,
            parent_code: office.parent_code.clone(),
        });

        centers.chain(offices).collect()
    }
}
