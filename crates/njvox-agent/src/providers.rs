use async_trait::async_trait;
use njvox_campaigns::document::DocumentBody;
use njvox_core::error::Result;
use serde::{Deserialize, Serialize};

/// Result of a successful geocode lookup (`geocode` tool).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lng: f64,
    pub formatted: String,
    /// Set when the result came from the known-location centroid
    /// fallback rather than the live provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approximate: Option<bool>,
}

/// External geocoder. Implementations should fall back to a table of
/// known-location centroids when the live provider is unreachable
/// rather than surfacing a hard error.
#[async_trait]
pub trait GeocodeProvider: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeocodeResult>;
}

/// A table of coarse centroids keyed by lowercase place name, used as
/// the last-resort fallback for [`GeocodeProvider`] implementations.
pub fn centroid_fallback(address: &str) -> Option<GeocodeResult> {
    const KNOWN: &[(&str, f64, f64)] = &[
        ("newark, nj", 40.7357, -74.1724),
        ("jersey city, nj", 40.7178, -74.0431),
        ("trenton, nj", 40.2206, -74.7597),
        ("camden, nj", 39.9259, -75.1196),
        ("new jersey", 40.0583, -74.4057),
    ];
    let needle = address.trim().to_lowercase();
    KNOWN.iter().find(|(name, ..)| needle.contains(name)).map(|(name, lat, lng)| GeocodeResult {
        lat: *lat,
        lng: *lng,
        formatted: name.to_string(),
        approximate: Some(true),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// External, domain-biased web search (`web_search` tool).
#[async_trait]
pub trait WebSearchProvider: Send + Sync {
    async fn search(&self, query: &str, n: usize) -> Result<Vec<WebSearchResult>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub doc_ref: String,
    pub name: String,
    pub updated_at: String,
}

/// Full document CRUD surface backing `doc_{create,read,list,update}`,
/// performed using the requesting user's own credentials — distinct
/// from the read-only [`njvox_campaigns::document::DocumentSource`]
/// the campaign engine uses at send time.
#[async_trait]
pub trait DocumentService: Send + Sync {
    async fn create(&self, user_token: &str, name: &str, body: &DocumentBody) -> Result<DocumentMeta>;
    async fn read(&self, user_token: &str, doc_ref: &str) -> Result<DocumentBody>;
    async fn list(&self, user_token: &str) -> Result<Vec<DocumentMeta>>;
    async fn update(&self, user_token: &str, doc_ref: &str, body: &DocumentBody) -> Result<DocumentMeta>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_fallback_matches_known_city() {
        let result = centroid_fallback("123 Main St, Newark, NJ").unwrap();
        assert_eq!(result.approximate, Some(true));
    }

    #[test]
    fn centroid_fallback_none_for_unknown_place() {
        assert!(centroid_fallback("123 Main St, Nowhere, ZZ").is_none());
    }
}
