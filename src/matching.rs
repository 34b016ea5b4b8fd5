use std::collections::BTreeMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::db::prices::PriceUpsert;
use crate::model::{DEFAULT_COST_KIND, Facility};
use crate::text::{normalize_address, normalize_facility_name, normalize_phone, parse_amount};

const MIN_PHONE_DIGITS: usize = 7;

/// One line of an official price list (`lp, powiat, nazwa, adres, typ, cena_<rok>...`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRow {
    pub lp: String,
    pub district: String,
    pub name: String,
    pub address: Option<String>,
    pub facility_type: Option<String>,
    /// Raw price cells keyed by the year taken from the `cena_<rok>` header.
    pub prices: BTreeMap<i32, String>,
}

pub(crate) fn header_index(headers: &csv::StringRecord, name: &str) -> Result<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
        .with_context(|| format!("CSV missing required header '{name}'"))
}

pub(crate) fn optional_index(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Spreadsheets exported with a Polish locale use `;`.
pub(crate) fn detect_delimiter(data: &[u8]) -> u8 {
    let first_line = data.split(|b| *b == b'\n').next().unwrap_or_default();
    let semicolons = first_line.iter().filter(|b| **b == b';').count();
    let commas = first_line.iter().filter(|b| **b == b',').count();
    if semicolons > commas { b';' } else { b',' }
}

pub fn parse_price_csv(data: &[u8]) -> Result<Vec<PriceRow>> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(detect_delimiter(data))
        .from_reader(data);
    let headers = reader
        .headers()
        .context("Failed reading price list headers")?
        .clone();

    let name_idx = header_index(&headers, "nazwa")?;
    let lp_idx = optional_index(&headers, "lp");
    let district_idx = optional_index(&headers, "powiat");
    let address_idx = optional_index(&headers, "adres");
    let type_idx = optional_index(&headers, "typ");
    let year_columns: Vec<(usize, i32)> = headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| {
            let year = h.trim().to_lowercase().strip_prefix("cena_")?.parse::<i32>().ok()?;
            Some((i, year))
        })
        .collect();

    let cell = |record: &csv::StringRecord, idx: Option<usize>| -> String {
        idx.and_then(|i| record.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let mut out = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed reading price list row {}", line + 2))?;
        let name = cell(&record, Some(name_idx));
        if name.is_empty() {
            continue;
        }
        let prices = year_columns
            .iter()
            .filter_map(|(i, year)| {
                let raw = record.get(*i)?.trim();
                (!raw.is_empty()).then(|| (*year, raw.to_string()))
            })
            .collect();
        out.push(PriceRow {
            lp: cell(&record, lp_idx),
            district: cell(&record, district_idx),
            name,
            address: Some(cell(&record, address_idx)).filter(|v| !v.is_empty()),
            facility_type: Some(cell(&record, type_idx)).filter(|v| !v.is_empty()),
            prices,
        });
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Matched,
    Fuzzy,
    Unmatched,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedFacility {
    pub id: i64,
    pub name: String,
    pub locality: String,
    pub district: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchedRow {
    #[serde(flatten)]
    pub row: PriceRow,
    pub status: MatchStatus,
    pub facility: Option<MatchedFacility>,
    /// Price for the selected year, if the cell parsed.
    pub amount: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub year: i32,
    pub rows: Vec<MatchedRow>,
    pub matched: usize,
    pub fuzzy: usize,
    pub unmatched: usize,
    /// Ready to post back to the apply endpoint once the admin confirms.
    pub updates: Vec<ImportUpdate>,
}

/// Exact normalized name first, then the first record whose normalized name
/// contains the row's or is contained in it.
pub fn match_row<'a>(name: &str, facilities: &'a [Facility]) -> (MatchStatus, Option<&'a Facility>) {
    let key = normalize_facility_name(name);
    if key.is_empty() {
        return (MatchStatus::Unmatched, None);
    }
    let keyed: Vec<(String, &Facility)> = facilities
        .iter()
        .map(|f| (normalize_facility_name(&f.name), f))
        .collect();

    if let Some((_, f)) = keyed.iter().find(|(k, _)| *k == key) {
        return (MatchStatus::Matched, Some(*f));
    }
    let fuzzy = keyed
        .iter()
        .find(|(k, _)| !k.is_empty() && (k.contains(&key) || key.contains(k.as_str())));
    match fuzzy {
        Some((_, f)) => (MatchStatus::Fuzzy, Some(*f)),
        None => (MatchStatus::Unmatched, None),
    }
}

pub fn preview(rows: Vec<PriceRow>, facilities: &[Facility], year: i32) -> ImportPreview {
    let rows: Vec<MatchedRow> = rows
        .into_iter()
        .map(|row| {
            let (status, found) = match_row(&row.name, facilities);
            let amount = row.prices.get(&year).and_then(|raw| parse_amount(raw));
            MatchedRow {
                status,
                facility: found.map(|f| MatchedFacility {
                    id: f.id,
                    name: f.name.clone(),
                    locality: f.locality.clone(),
                    district: f.district.clone(),
                }),
                amount,
                row,
            }
        })
        .collect();
    let count = |s: MatchStatus| rows.iter().filter(|r| r.status == s).count();
    ImportPreview {
        year,
        matched: count(MatchStatus::Matched),
        fuzzy: count(MatchStatus::Fuzzy),
        unmatched: count(MatchStatus::Unmatched),
        updates: accepted_updates(&rows),
        rows,
    }
}

/// A confirmed price from the preview, as sent back by the admin panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportUpdate {
    pub facility_id: i64,
    pub amount: f64,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    pub year: i32,
    pub updates: Vec<ImportUpdate>,
    pub default_source: Option<String>,
}

/// Matched and fuzzy rows that carry a price for the preview year.
fn accepted_updates(rows: &[MatchedRow]) -> Vec<ImportUpdate> {
    rows.iter()
        .filter(|r| r.status != MatchStatus::Unmatched)
        .filter_map(|r| {
            Some(ImportUpdate {
                facility_id: r.facility.as_ref()?.id,
                amount: r.amount?,
                source: None,
            })
        })
        .collect()
}

/// `date` is the human-readable import date written into the notes.
pub fn to_upserts(request: &ImportRequest, date: &str) -> Vec<PriceUpsert> {
    let default_source = request
        .default_source
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    request
        .updates
        .iter()
        .map(|u| PriceUpsert {
            facility_id: u.facility_id,
            year: request.year,
            amount: u.amount,
            cost_kind: Some(DEFAULT_COST_KIND.to_string()),
            source: u
                .source
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .or(default_source)
                .map(str::to_string),
            verified: true,
            notes: Some(format!("Import z CSV - {date}")),
            effective_from: None,
        })
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DuplicateQuery {
    #[serde(alias = "nazwa")]
    pub name: Option<String>,
    #[serde(alias = "miejscowosc")]
    pub locality: Option<String>,
    #[serde(alias = "ulica")]
    pub street: Option<String>,
    #[serde(alias = "telefon")]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchedBy {
    #[serde(rename = "ulica")]
    Street,
    #[serde(rename = "telefon")]
    Phone,
    #[serde(rename = "nazwa")]
    Name,
}

#[derive(Debug, Clone, Serialize)]
pub struct DuplicateCheck {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facility: Option<Facility>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_by: Option<MatchedBy>,
}

impl DuplicateCheck {
    fn none() -> Self {
        Self {
            exists: false,
            facility: None,
            matched_by: None,
        }
    }

    fn found(f: &Facility, by: MatchedBy) -> Self {
        Self {
            exists: true,
            facility: Some(f.clone()),
            matched_by: Some(by),
        }
    }
}

/// Looks for an existing record before a new facility is added, trying
/// street+locality, then phone, then name+locality.
pub fn check_duplicate(query: &DuplicateQuery, facilities: &[Facility]) -> DuplicateCheck {
    let Some(locality) = query
        .locality
        .as_deref()
        .map(str::trim)
        .filter(|l| l.chars().count() >= 2)
    else {
        return DuplicateCheck::none();
    };
    let locality = normalize_address(locality);
    let same_locality = |f: &Facility| normalize_address(&f.locality) == locality;

    if let Some(street) = query.street.as_deref().map(normalize_address)
        && street.chars().count() >= 3
        && let Some(f) = facilities.iter().find(|f| {
            f.street
                .as_deref()
                .is_some_and(|s| normalize_address(s).contains(&street))
                && same_locality(f)
        })
    {
        return DuplicateCheck::found(f, MatchedBy::Street);
    }

    if let Some(phone) = query.phone.as_deref().map(normalize_phone)
        && phone.len() >= MIN_PHONE_DIGITS
        && let Some(f) = facilities
            .iter()
            .find(|f| f.phone.as_deref().is_some_and(|p| normalize_phone(p) == phone))
    {
        return DuplicateCheck::found(f, MatchedBy::Phone);
    }

    if let Some(name) = query.name.as_deref().map(str::trim)
        && name.chars().count() >= 3
    {
        let name = normalize_address(name);
        if let Some(f) = facilities
            .iter()
            .find(|f| normalize_address(&f.name).contains(&name) && same_locality(f))
        {
            return DuplicateCheck::found(f, MatchedBy::Name);
        }
    }

    DuplicateCheck::none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests::facility;

    const PRICE_LIST: &str = "lp;powiat;nazwa;adres;typ;cena_2024;cena_2025\n\
        1;krakowski;Dom Pomocy Społecznej w Skawinie;ul. Polna 1;DPS;5 100,00;5 400,50\n\
        2;krakowski;Liszki;;DPS;;6000\n\
        3;tarnowski;Zupełnie Inny;;;4000;4200\n\
        4;;;;;;\n";

    #[test]
    fn test_parse_semicolon_price_list() {
        let rows = parse_price_csv(PRICE_LIST.as_bytes()).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].district, "krakowski");
        assert_eq!(rows[0].address.as_deref(), Some("ul. Polna 1"));
        assert_eq!(rows[0].prices.get(&2025).map(String::as_str), Some("5 400,50"));
        assert!(rows[1].prices.get(&2024).is_none());
        assert!(rows[2].facility_type.is_none());
    }

    #[test]
    fn test_parse_comma_list_with_bom() {
        let data = "\u{feff}lp,nazwa,cena_2026\n1,DPS Kraków,\"7000,5\"\n";
        let rows = parse_price_csv(data.as_bytes()).unwrap();
        assert_eq!(rows[0].name, "DPS Kraków");
        assert_eq!(rows[0].prices.get(&2026).map(String::as_str), Some("7000,5"));
    }

    #[test]
    fn test_parse_requires_name_column() {
        let err = parse_price_csv(b"lp;powiat\n1;krakowski\n").unwrap_err();
        assert!(err.to_string().contains("nazwa"));
    }

    #[test]
    fn test_preview_statuses_and_amounts() {
        let facilities = vec![
            facility(10, "DPS w Skawinie", "Skawina", "krakowski"),
            facility(11, "Dom Pomocy Społecznej Liszki Stare", "Liszki", "krakowski"),
        ];
        let rows = parse_price_csv(PRICE_LIST.as_bytes()).unwrap();
        let out = preview(rows, &facilities, 2025);

        assert_eq!(out.rows[0].status, MatchStatus::Matched);
        assert_eq!(out.rows[0].facility.as_ref().map(|f| f.id), Some(10));
        assert_eq!(out.rows[0].amount, Some(5400.5));
        assert_eq!(out.rows[1].status, MatchStatus::Fuzzy);
        assert_eq!(out.rows[1].facility.as_ref().map(|f| f.id), Some(11));
        assert_eq!(out.rows[2].status, MatchStatus::Unmatched);
        assert_eq!((out.matched, out.fuzzy, out.unmatched), (1, 1, 1));

        let ids: Vec<i64> = out.updates.iter().map(|u| u.facility_id).collect();
        assert_eq!(ids, vec![10, 11]);
        assert_eq!(out.updates[0].amount, 5400.5);
    }

    #[test]
    fn test_noise_glued_to_punctuation_still_matches_exactly() {
        let facilities = vec![
            facility(1, "Skawina Dolna", "Skawina", "krakowski"),
            facility(2, "Dom Pomocy Społecznej im. św. Józefa", "Kraków", "Kraków"),
            facility(3, "DPS Skawina", "Skawina", "krakowski"),
        ];
        let (status, found) = match_row("DPS im.św. Józefa", &facilities);
        assert_eq!(status, MatchStatus::Matched);
        assert_eq!(found.map(|f| f.id), Some(2));

        let (status, found) = match_row("DPS, Skawina", &facilities);
        assert_eq!(status, MatchStatus::Matched);
        assert_eq!(found.map(|f| f.id), Some(3));
    }

    #[test]
    fn test_noise_only_name_never_matches() {
        let facilities = vec![facility(1, "DPS", "Kraków", "Kraków")];
        assert_eq!(match_row("DPS", &facilities).0, MatchStatus::Unmatched);
    }

    #[test]
    fn test_upserts_use_row_source_then_default() {
        let request = ImportRequest {
            year: 2025,
            updates: vec![
                ImportUpdate {
                    facility_id: 1,
                    amount: 5000.0,
                    source: Some("https://bip.example.pl".to_string()),
                },
                ImportUpdate {
                    facility_id: 2,
                    amount: 6000.0,
                    source: Some(" ".to_string()),
                },
            ],
            default_source: Some("Zarządzenie wojewody".to_string()),
        };
        let upserts = to_upserts(&request, "19.10.2026");
        assert_eq!(upserts[0].source.as_deref(), Some("https://bip.example.pl"));
        assert_eq!(upserts[1].source.as_deref(), Some("Zarządzenie wojewody"));
        assert!(upserts.iter().all(|u| u.verified && u.year == 2025));
        assert_eq!(upserts[0].cost_kind.as_deref(), Some("podstawowy"));
        assert_eq!(upserts[0].notes.as_deref(), Some("Import z CSV - 19.10.2026"));
    }

    fn existing() -> Vec<Facility> {
        let mut a = facility(1, "DPS Pod Lipami", "Kraków", "Kraków");
        a.street = Some("ul. Lipowa 5".to_string());
        a.phone = Some("12 345 67 89".to_string());
        let mut b = facility(2, "ŚDS Promyk", "Tarnów", "Tarnów");
        b.phone = Some("+48 14 111 22 33".to_string());
        vec![a, b]
    }

    #[test]
    fn test_duplicate_by_street_first() {
        let query = DuplicateQuery {
            name: Some("ŚDS Promyk".to_string()),
            locality: Some("krakow".to_string()),
            street: Some("Lipowa".to_string()),
            phone: Some("141112233".to_string()),
        };
        let out = check_duplicate(&query, &existing());
        assert!(out.exists);
        assert_eq!(out.matched_by, Some(MatchedBy::Street));
        assert_eq!(out.facility.map(|f| f.id), Some(1));
    }

    #[test]
    fn test_duplicate_by_phone_then_name() {
        let query = DuplicateQuery {
            locality: Some("Gdańsk".to_string()),
            phone: Some("14 111 22 33".to_string()),
            ..Default::default()
        };
        let out = check_duplicate(&query, &existing());
        assert_eq!(out.matched_by, Some(MatchedBy::Phone));
        assert_eq!(out.facility.map(|f| f.id), Some(2));

        let query = DuplicateQuery {
            name: Some("pod lipami".to_string()),
            locality: Some("Kraków".to_string()),
            phone: Some("123".to_string()),
            ..Default::default()
        };
        let out = check_duplicate(&query, &existing());
        assert_eq!(out.matched_by, Some(MatchedBy::Name));
    }

    #[test]
    fn test_duplicate_name_ignores_extra_whitespace() {
        let mut facilities = existing();
        facilities.push(facility(3, "DPS  Słoneczny   Dom", "Bochnia", "bocheński"));
        let query = DuplicateQuery {
            name: Some("DPS Słoneczny".to_string()),
            locality: Some("Bochnia".to_string()),
            ..Default::default()
        };
        let out = check_duplicate(&query, &facilities);
        assert_eq!(out.matched_by, Some(MatchedBy::Name));
        assert_eq!(out.facility.map(|f| f.id), Some(3));
    }

    #[test]
    fn test_duplicate_requires_locality() {
        let query = DuplicateQuery {
            name: Some("DPS Pod Lipami".to_string()),
            locality: Some("K".to_string()),
            ..Default::default()
        };
        let out = check_duplicate(&query, &existing());
        assert!(!out.exists);
        assert!(out.facility.is_none());
    }
}
