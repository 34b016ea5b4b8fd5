use serde::{Deserialize, Serialize};

use crate::text::normalize_polish;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FacilityType {
    #[serde(rename = "DPS")]
    Dps,
    #[serde(rename = "ŚDS")]
    Sds,
}

impl FacilityType {
    pub fn as_str(self) -> &'static str {
        match self {
            FacilityType::Dps => "DPS",
            FacilityType::Sds => "ŚDS",
        }
    }

    /// Accepts the stored form as well as URL-friendly spellings (`dps`, `sds`, `SDS`).
    pub fn parse(s: &str) -> Option<Self> {
        match normalize_polish(s).as_str() {
            "dps" => Some(FacilityType::Dps),
            "sds" => Some(FacilityType::Sds),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Facility {
    pub id: i64,
    pub name: String,
    pub facility_type: FacilityType,
    pub operator: Option<String>,
    pub street: Option<String>,
    pub locality: String,
    pub postal_code: Option<String>,
    pub municipality: Option<String>,
    pub district: String,
    pub region: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
    pub care_profile: Option<String>,
    /// PLN per month; `Some(0.0)` means free of charge, `None` unknown.
    pub monthly_cost: Option<f64>,
    pub source_url: Option<String>,
    pub price_source: Option<String>,
    pub data_source_date: Option<String>,
    pub price_source_date: Option<String>,
    pub verified_at: Option<String>,
    pub notes: Option<String>,
    pub verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Facility {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    pub fn is_free(&self) -> bool {
        self.monthly_cost == Some(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalityKind {
    City,
    Village,
    Other,
}

impl LocalityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LocalityKind::City => "city",
            LocalityKind::Village => "village",
            LocalityKind::Other => "other",
        }
    }

    /// Maps both the stored form and the gazetteer's Polish `rodzaj` column.
    pub fn parse(s: &str) -> Self {
        match normalize_polish(s).as_str() {
            "city" | "miasto" => LocalityKind::City,
            "village" | "wies" => LocalityKind::Village,
            _ => LocalityKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Locality {
    pub id: i64,
    pub name: String,
    pub normalized_name: String,
    pub kind: LocalityKind,
    pub municipality: Option<String>,
    pub district: String,
    pub region: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceEntry {
    pub facility_id: i64,
    pub year: i32,
    pub amount: f64,
    pub cost_kind: String,
    pub source: Option<String>,
    pub verified: bool,
    pub notes: Option<String>,
    pub effective_from: Option<String>,
    pub fetched_at: String,
}

pub const DEFAULT_COST_KIND: &str = "podstawowy";

pub const FACILITY_EVENT_TYPES: [&str; 8] = [
    "view",
    "phone_click",
    "email_click",
    "website_click",
    "favorite_add",
    "favorite_remove",
    "compare_add",
    "share",
];

pub const APP_EVENT_TYPES: [&str; 12] = [
    "empty_results",
    "filter_applied",
    "scroll_depth",
    "return_visit",
    "cross_powiat_view",
    "calculator_start",
    "calculator_result",
    "calculator_no_results",
    "advisor_start",
    "advisor_step",
    "advisor_completed",
    "advisor_abandoned",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    LoginSuccess,
    LoginFailed,
    RateLimit,
    Logout,
    FacilityDeleted,
}

impl SecurityEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            SecurityEvent::LoginSuccess => "login_success",
            SecurityEvent::LoginFailed => "login_failed",
            SecurityEvent::RateLimit => "rate_limit",
            SecurityEvent::Logout => "logout",
            SecurityEvent::FacilityDeleted => "facility_deleted",
        }
    }
}

/// Facility fields as submitted by the admin panel (create and update).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FacilityInput {
    pub name: String,
    pub facility_type: String,
    pub operator: Option<String>,
    pub street: Option<String>,
    pub locality: String,
    pub postal_code: Option<String>,
    pub municipality: Option<String>,
    pub district: String,
    pub region: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub website: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub capacity: Option<i64>,
    pub care_profile: Option<String>,
    pub monthly_cost: Option<f64>,
    pub source_url: Option<String>,
    pub price_source: Option<String>,
    pub data_source_date: Option<String>,
    pub price_source_date: Option<String>,
    pub notes: Option<String>,
    pub verified: bool,
    /// When set together with `monthly_cost`, the year's price entry is upserted too.
    pub price_year: Option<i32>,
    pub force_add: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub(crate) fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl FacilityInput {
    pub fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        let name_len = self.name.trim().chars().count();
        if name_len < 3 {
            errors.push(FieldError::new("name", "Nazwa musi mieć co najmniej 3 znaki"));
        } else if name_len > 200 {
            errors.push(FieldError::new("name", "Nazwa może mieć maksymalnie 200 znaków"));
        }
        if FacilityType::parse(&self.facility_type).is_none() {
            errors.push(FieldError::new("facility_type", "Typ placówki musi być DPS lub ŚDS"));
        }
        for (field, value, label) in [
            ("locality", &self.locality, "Miejscowość"),
            ("district", &self.district, "Powiat"),
            ("region", &self.region, "Województwo"),
        ] {
            if value.trim().chars().count() < 2 {
                errors.push(FieldError::new(field, format!("{label} jest wymagane")));
            }
        }
        if let Some(code) = self.postal_code.as_deref().map(str::trim)
            && !code.is_empty()
            && !is_postal_code(code)
        {
            errors.push(FieldError::new("postal_code", "Kod pocztowy w formacie XX-XXX"));
        }
        if let Some(email) = self.email.as_deref().map(str::trim)
            && !email.is_empty()
            && !is_email(email)
        {
            errors.push(FieldError::new("email", "Nieprawidłowy adres email"));
        }
        if let Some(url) = self.website.as_deref().map(str::trim)
            && !url.is_empty()
            && !is_url(url)
        {
            errors.push(FieldError::new("website", "Nieprawidłowy adres strony"));
        }
        if let Some(capacity) = self.capacity
            && capacity <= 0
        {
            errors.push(FieldError::new("capacity", "Liczba miejsc musi być dodatnia"));
        }
        if let Some(cost) = self.monthly_cost
            && cost < 0.0
        {
            errors.push(FieldError::new("monthly_cost", "Koszt nie może być ujemny"));
        }
        if let Some(year) = self.price_year
            && !(2024..=2030).contains(&year)
        {
            errors.push(FieldError::new("price_year", "Rok musi być z zakresu 2024-2030"));
        }
        if let Some(lat) = self.latitude
            && !(-90.0..=90.0).contains(&lat)
        {
            errors.push(FieldError::new("latitude", "Nieprawidłowa szerokość geograficzna"));
        }
        if let Some(lon) = self.longitude
            && !(-180.0..=180.0).contains(&lon)
        {
            errors.push(FieldError::new("longitude", "Nieprawidłowa długość geograficzna"));
        }

        errors
    }
}

fn is_postal_code(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 6
        && b[2] == b'-'
        && b.iter()
            .enumerate()
            .all(|(i, c)| i == 2 || c.is_ascii_digit())
}

pub(crate) fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !s.chars().any(char::is_whitespace)
}

fn is_url(s: &str) -> bool {
    let rest = s
        .strip_prefix("https://")
        .or_else(|| s.strip_prefix("http://"));
    matches!(rest, Some(host) if host.contains('.') && !host.contains(' '))
}
