use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";
const USER_AGENT: &str = "KompasSeniora/1.0";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeocodeQuery {
    #[serde(alias = "ulica")]
    pub street: Option<String>,
    #[serde(alias = "miejscowosc")]
    pub locality: Option<String>,
    #[serde(alias = "wojewodztwo")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeHit {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
    #[serde(default)]
    display_name: String,
}

/// Folds Polish letters to ASCII but keeps case; Nominatim handles the rest.
fn fold_polish(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'ą' => 'a',
            'ć' => 'c',
            'ę' => 'e',
            'ł' => 'l',
            'ń' => 'n',
            'ó' => 'o',
            'ś' => 's',
            'ź' | 'ż' => 'z',
            'Ą' => 'A',
            'Ć' => 'C',
            'Ę' => 'E',
            'Ł' => 'L',
            'Ń' => 'N',
            'Ó' => 'O',
            'Ś' => 'S',
            'Ź' | 'Ż' => 'Z',
            other => other,
        })
        .collect()
}

/// `"<street>, <locality>, <region>, Poland"`, skipping blank parts.
/// `None` when no locality is given.
pub fn address_line(query: &GeocodeQuery) -> Option<String> {
    let locality = query.locality.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
    let mut parts: Vec<String> = Vec::new();
    if let Some(street) = query.street.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(fold_polish(street));
    }
    parts.push(fold_polish(locality));
    if let Some(region) = query.region.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(fold_polish(region));
    }
    parts.push("Poland".to_string());
    Some(parts.join(", "))
}

fn first_hit(body: &str) -> anyhow::Result<Option<GeocodeHit>> {
    let places: Vec<NominatimPlace> = serde_json::from_str(body).context("parse nominatim response")?;
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    Ok(Some(GeocodeHit {
        latitude: place.lat.parse().with_context(|| format!("bad lat {}", place.lat))?,
        longitude: place.lon.parse().with_context(|| format!("bad lon {}", place.lon))?,
        display_name: place.display_name,
    }))
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    client: reqwest::Client,
    base_url: String,
}

impl Geocoder {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("build geocoding http client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn lookup(&self, address: &str) -> anyhow::Result<Option<GeocodeHit>> {
        tracing::info!("Geocoding {address}");
        let url = format!("{}/search", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("q", address), ("limit", "1")])
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;
        if !resp.status().is_success() {
            return Err(anyhow!("Nominatim error ({}): {}", resp.status(), url));
        }
        let body = resp.text().await.context("read nominatim body")?;
        first_hit(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_line() {
        let q = GeocodeQuery {
            street: Some("ul. Łąkowa 3".to_string()),
            locality: Some("Świątniki Górne".to_string()),
            region: Some(" ".to_string()),
        };
        assert_eq!(
            address_line(&q).as_deref(),
            Some("ul. Lakowa 3, Swiatniki Gorne, Poland")
        );
        assert!(address_line(&GeocodeQuery::default()).is_none());
    }

    #[test]
    fn test_first_hit() {
        let body = r#"[{"lat":"50.0614","lon":"19.9366","display_name":"Kraków, Polska"},
                       {"lat":"1","lon":"2","display_name":"other"}]"#;
        let hit = first_hit(body).unwrap().unwrap();
        assert_eq!(hit.latitude, 50.0614);
        assert_eq!(hit.display_name, "Kraków, Polska");
        assert!(first_hit("[]").unwrap().is_none());
        assert!(first_hit(r#"[{"lat":"x","lon":"2"}]"#).is_err());
    }
}
