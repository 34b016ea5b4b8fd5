use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::model::{Facility, PriceEntry};

/// Column layout shared by the facility export, its template and the importer.
pub const FACILITY_HEADERS: [&str; 28] = [
    "id",
    "nazwa",
    "typ_placowki",
    "prowadzacy",
    "ulica",
    "miejscowosc",
    "kod_pocztowy",
    "gmina",
    "powiat",
    "wojewodztwo",
    "telefon",
    "email",
    "www",
    "latitude",
    "longitude",
    "liczba_miejsc",
    "profil_opieki",
    "koszt_pobytu",
    "data_aktualizacji",
    "zrodlo_dane",
    "zrodlo_cena",
    "data_zrodla_dane",
    "data_zrodla_cena",
    "data_weryfikacji",
    "notatki",
    "verified",
    "created_at",
    "updated_at",
];

/// `2025-03-04T05:06:07Z` -> `2025-03-04`; anything shorter is kept as is.
fn date_only(ts: &str) -> String {
    ts.get(..10).unwrap_or(ts).to_string()
}

/// `2025-03-04...` -> `4.03.2025`, the way Polish spreadsheets show dates.
fn polish_date(ts: &str) -> String {
    match NaiveDate::parse_from_str(&date_only(ts), "%Y-%m-%d") {
        Ok(d) => d.format("%-d.%m.%Y").to_string(),
        Err(_) => ts.to_string(),
    }
}

fn opt(v: &Option<String>) -> String {
    v.clone().unwrap_or_default()
}

fn num<T: ToString>(v: Option<T>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer.into_inner().context("flush csv writer")?;
    String::from_utf8(bytes).context("csv output is not utf-8")
}

pub fn facilities_template() -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(FACILITY_HEADERS)?;
    finish(writer)
}

/// Every facility, ordered by type, region, locality and name.
pub fn facilities_csv(facilities: &[Facility]) -> Result<String> {
    let mut sorted: Vec<&Facility> = facilities.iter().collect();
    sorted.sort_by(|a, b| {
        a.facility_type
            .as_str()
            .cmp(b.facility_type.as_str())
            .then_with(|| a.region.cmp(&b.region))
            .then_with(|| a.locality.cmp(&b.locality))
            .then_with(|| a.name.cmp(&b.name))
    });

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(FACILITY_HEADERS)?;
    for f in sorted {
        writer.write_record([
            f.id.to_string(),
            f.name.clone(),
            f.facility_type.as_str().to_string(),
            opt(&f.operator),
            opt(&f.street),
            f.locality.clone(),
            opt(&f.postal_code),
            opt(&f.municipality),
            f.district.clone(),
            f.region.clone(),
            opt(&f.phone),
            opt(&f.email),
            opt(&f.website),
            num(f.latitude),
            num(f.longitude),
            num(f.capacity),
            opt(&f.care_profile),
            num(f.monthly_cost),
            date_only(&f.updated_at),
            opt(&f.source_url),
            opt(&f.price_source),
            f.data_source_date.as_deref().map(date_only).unwrap_or_default(),
            f.price_source_date.as_deref().map(date_only).unwrap_or_default(),
            f.verified_at.as_deref().map(date_only).unwrap_or_default(),
            opt(&f.notes),
            f.verified.to_string(),
            date_only(&f.created_at),
            date_only(&f.updated_at),
        ])
        .with_context(|| format!("write facility {}", f.id))?;
    }
    finish(writer)
}

/// One row per facility with that year's price, blank when missing.
pub fn prices_csv(facilities: &[Facility], prices: &[PriceEntry], year: i32) -> Result<String> {
    let by_facility: HashMap<i64, &PriceEntry> = prices
        .iter()
        .filter(|p| p.year == year)
        .map(|p| (p.facility_id, p))
        .collect();

    let mut sorted: Vec<&Facility> = facilities.iter().collect();
    sorted.sort_by(|a, b| {
        a.region
            .cmp(&b.region)
            .then_with(|| a.locality.cmp(&b.locality))
            .then_with(|| a.name.cmp(&b.name))
    });

    let price_header = format!("cena_{year}");
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        "id",
        "wojewodztwo",
        "powiat",
        "miejscowosc",
        "nazwa",
        "typ_placowki",
        price_header.as_str(),
        "zrodlo",
        "verified",
        "data_aktualizacji",
        "notatki",
    ])?;
    for f in sorted {
        let price = by_facility.get(&f.id);
        writer.write_record([
            f.id.to_string(),
            f.region.clone(),
            f.district.clone(),
            f.locality.clone(),
            f.name.clone(),
            f.facility_type.as_str().to_string(),
            num(price.map(|p| p.amount)),
            price.and_then(|p| p.source.clone()).unwrap_or_default(),
            price
                .map(|p| if p.verified { "TAK" } else { "NIE" }.to_string())
                .unwrap_or_default(),
            price.map(|p| polish_date(&p.fetched_at)).unwrap_or_default(),
            price.and_then(|p| p.notes.clone()).unwrap_or_default(),
        ])
        .with_context(|| format!("write price row for facility {}", f.id))?;
    }
    finish(writer)
}

pub fn facilities_filename(template: bool, today: &str) -> String {
    if template {
        "placowki_template.csv".to_string()
    } else {
        format!("placowki_export_{today}.csv")
    }
}

pub fn prices_filename(year: i32, today: &str) -> String {
    format!("ceny-dps-{year}-{today}.csv")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FacilityType;
    use crate::search::tests::facility;

    #[test]
    fn test_template_is_header_only() {
        let out = facilities_template().unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("id,nazwa,typ_placowki,prowadzacy,"));
        assert!(out.trim_end().ends_with("verified,created_at,updated_at"));
    }

    #[test]
    fn test_facilities_sorted_and_quoted() {
        let mut a = facility(1, "DPS \"Pod Lipami\", Kraków", "Kraków", "Kraków");
        a.monthly_cost = Some(5200.5);
        let mut b = facility(2, "ŚDS Promyk", "Bochnia", "bocheński");
        b.facility_type = FacilityType::Sds;
        let c = facility(3, "DPS Alwernia", "Alwernia", "chrzanowski");
        let out = facilities_csv(&[b, a, c]).unwrap();

        let mut reader = csv::Reader::from_reader(out.as_bytes());
        let ids: Vec<String> = reader
            .records()
            .map(|r| r.unwrap().get(0).unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
        assert!(out.contains("\"DPS \"\"Pod Lipami\"\", Kraków\""));
        assert!(out.contains(",5200.5,"));
    }

    #[test]
    fn test_prices_for_selected_year() {
        let facilities = vec![
            facility(1, "DPS A", "Kraków", "Kraków"),
            facility(2, "DPS B", "Bochnia", "bocheński"),
        ];
        let prices = vec![
            PriceEntry {
                facility_id: 1,
                year: 2025,
                amount: 4400.0,
                cost_kind: "podstawowy".to_string(),
                source: Some("BIP".to_string()),
                verified: true,
                notes: None,
                effective_from: None,
                fetched_at: "2025-03-04T05:06:07Z".to_string(),
            },
            PriceEntry {
                facility_id: 2,
                year: 2024,
                amount: 3000.0,
                cost_kind: "podstawowy".to_string(),
                source: None,
                verified: false,
                notes: None,
                effective_from: None,
                fetched_at: "2024-03-04T05:06:07Z".to_string(),
            },
        ];
        let out = prices_csv(&facilities, &prices, 2025).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].contains(",cena_2025,"));
        assert_eq!(lines[1], "2,małopolskie,bocheński,Bochnia,DPS B,DPS,,,,,");
        assert_eq!(lines[2], "1,małopolskie,Kraków,Kraków,DPS A,DPS,4400,BIP,TAK,4.03.2025,");
    }
}
