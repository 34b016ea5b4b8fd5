use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use duckdb::Connection;

use crate::cli::ImportArgs;
use crate::db::gazetteer::{self, NewLocality};
use crate::db::mops::{self, NewMopsContact};
use crate::db::{self, facilities};
use crate::download;
use crate::matching::{detect_delimiter, header_index, optional_index};
use crate::model::{FacilityInput, LocalityKind};
use crate::storage::StoragePaths;
use crate::text::{non_empty, parse_amount};

pub async fn run(opts: ImportArgs) -> Result<()> {
    tracing::info!("kompas-backend import");
    tracing::info!("data_dir={}", opts.data_dir);
    if opts.offline {
        tracing::info!("offline=true (will not download missing inputs)");
    }
    if opts.replace {
        tracing::info!("replace=true (existing facilities and prices will be dropped)");
    }

    let paths = StoragePaths::new(&opts.data_dir);
    paths
        .ensure_dirs()
        .context("create backend data directories")?;

    tracing::info!("Step 1/4: open DuckDB + ensure schema");
    let mut conn = db::open(&paths.duckdb_path)?;

    tracing::info!("Step 2/4: facilities");
    match opts.facilities_csv.as_deref() {
        Some(file) => {
            let t0 = std::time::Instant::now();
            let inputs = read_facility_file(Path::new(file))?;
            let (ok, skipped) = load_facilities(&mut conn, &inputs, opts.replace)?;
            tracing::info!(
                "Imported {} facilities ({} skipped) in {:.1}s",
                ok,
                skipped,
                t0.elapsed().as_secs_f64()
            );
        }
        None => tracing::info!("No --facilities-csv given; keeping existing facilities"),
    }

    tracing::info!("Step 3/4: locality gazetteer");
    match download::ensure_gazetteer(&paths, &opts).await? {
        Some(csv_path) => {
            let t1 = std::time::Instant::now();
            let bytes = std::fs::read(&csv_path)
                .with_context(|| format!("read {}", csv_path.display()))?;
            let rows = parse_gazetteer_csv(&bytes)?;
            let n = gazetteer::replace_all(&mut conn, &rows)?;
            tracing::info!("Loaded {} localities in {:.1}s", n, t1.elapsed().as_secs_f64());
        }
        None => tracing::info!("Gazetteer skipped"),
    }

    tracing::info!("Step 4/4: MOPS contacts");
    match opts.mops_csv.as_deref() {
        Some(file) => {
            let bytes = std::fs::read(file).with_context(|| format!("read {file}"))?;
            let rows = parse_mops_csv(&bytes).with_context(|| format!("parse {file}"))?;
            let n = mops::upsert_many(&mut conn, &rows, &db::now_ts())?;
            tracing::info!("Upserted {} MOPS contacts", n);
        }
        None => tracing::info!("No --mops-csv given; keeping existing MOPS contacts"),
    }

    tracing::info!(
        "Done: {} facilities, {} localities, {} MOPS contacts in {}",
        db::table_count(&conn, "facilities")?,
        db::table_count(&conn, "localities")?,
        db::table_count(&conn, "mops_contacts")?,
        paths.duckdb_path.display()
    );
    Ok(())
}

fn read_facility_file(path: &Path) -> Result<Vec<FacilityInput>> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    parse_facility_csv(&bytes).with_context(|| format!("parse {}", path.display()))
}

/// Inserts valid rows in one transaction; returns (inserted, skipped).
fn load_facilities(conn: &mut Connection, inputs: &[FacilityInput], replace: bool) -> Result<(usize, usize)> {
    let existing = db::table_count(conn, "facilities")?;
    if existing > 0 && !replace {
        return Err(anyhow!(
            "facilities table already holds {existing} rows; rerun with --replace to overwrite"
        ));
    }

    let now = db::now_ts();
    let tx = conn.transaction().context("begin tx")?;
    if replace {
        db::clear_table(&tx, "prices")?;
        db::clear_table(&tx, "facilities")?;
    }
    let mut inserted = 0;
    let mut skipped = 0;
    for input in inputs {
        let errors = input.validate();
        if !errors.is_empty() {
            let fields: Vec<&str> = errors.iter().map(|e| e.field).collect();
            tracing::warn!("Skipping '{}': invalid {}", input.name, fields.join(", "));
            skipped += 1;
            continue;
        }
        facilities::insert(&tx, input, &now)
            .with_context(|| format!("insert facility '{}'", input.name))?;
        inserted += 1;
    }
    tx.commit().context("commit facilities")?;
    Ok((inserted, skipped))
}

/// `dd/mm/yyyy` or `yyyy-mm-dd` -> `yyyy-mm-dd`.
fn parse_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(raw.get(..10).unwrap_or(raw), "%Y-%m-%d"))
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

/// "bezpłatne" (free of charge) becomes 0; otherwise the first number in the cell.
fn parse_cost(raw: &str) -> Option<f64> {
    let lowered = raw.trim().to_lowercase();
    if lowered.contains("bezpłatn") || lowered.contains("bezplatn") {
        return Some(0.0);
    }
    let first = lowered
        .split(|c: char| c.is_alphabetic() || c == '/')
        .map(str::trim)
        .find(|s| s.chars().any(|c| c.is_ascii_digit()))?;
    parse_amount(first)
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_lowercase().as_str(),
        "true" | "1" | "tak" | "yes"
    )
}

/// Reads the admin export layout, also accepting the older column names
/// (`miasto_wies`, `geo_lat`, `geo_long`, `zrodlo`, `opis`).
pub fn parse_facility_csv(data: &[u8]) -> Result<Vec<FacilityInput>> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(detect_delimiter(data))
        .from_reader(data);
    let headers = reader.headers().context("Failed reading facility headers")?.clone();

    let name_idx = header_index(&headers, "nazwa")?;
    let any_of = |names: &[&str]| names.iter().find_map(|n| optional_index(&headers, n));
    let type_idx = any_of(&["typ_placowki"]);
    let operator_idx = any_of(&["prowadzacy"]);
    let street_idx = any_of(&["ulica"]);
    let locality_idx = any_of(&["miejscowosc", "miasto_wies"]);
    let postal_idx = any_of(&["kod_pocztowy"]);
    let municipality_idx = any_of(&["gmina"]);
    let district_idx = any_of(&["powiat"]);
    let region_idx = any_of(&["wojewodztwo"]);
    let phone_idx = any_of(&["telefon"]);
    let email_idx = any_of(&["email"]);
    let www_idx = any_of(&["www"]);
    let lat_idx = any_of(&["latitude", "geo_lat"]);
    let lon_idx = any_of(&["longitude", "geo_long"]);
    let capacity_idx = any_of(&["liczba_miejsc"]);
    let care_idx = any_of(&["profil_opieki"]);
    let cost_idx = any_of(&["koszt_pobytu"]);
    let source_idx = any_of(&["zrodlo_dane", "zrodlo"]);
    let price_source_idx = any_of(&["zrodlo_cena"]);
    let data_date_idx = any_of(&["data_zrodla_dane", "data_aktualizacji"]);
    let price_date_idx = any_of(&["data_zrodla_cena"]);
    let notes_idx = any_of(&["notatki", "opis"]);
    let verified_idx = any_of(&["verified"]);

    let mut out = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed reading facility row {}", line + 2))?;
        let cell = |idx: Option<usize>| -> Option<String> {
            non_empty(idx.and_then(|i| record.get(i)).map(str::to_string))
        };
        let Some(name) = cell(Some(name_idx)) else {
            continue;
        };
        out.push(FacilityInput {
            name,
            facility_type: cell(type_idx).unwrap_or_default(),
            operator: cell(operator_idx),
            street: cell(street_idx),
            locality: cell(locality_idx).unwrap_or_default(),
            postal_code: cell(postal_idx),
            municipality: cell(municipality_idx),
            district: cell(district_idx).unwrap_or_default(),
            region: cell(region_idx).unwrap_or_default(),
            phone: cell(phone_idx),
            email: cell(email_idx),
            website: cell(www_idx),
            latitude: cell(lat_idx).and_then(|v| v.replace(',', ".").parse().ok()),
            longitude: cell(lon_idx).and_then(|v| v.replace(',', ".").parse().ok()),
            capacity: cell(capacity_idx).and_then(|v| v.parse().ok()),
            care_profile: cell(care_idx),
            monthly_cost: cell(cost_idx).and_then(|v| parse_cost(&v)),
            source_url: cell(source_idx),
            price_source: cell(price_source_idx),
            data_source_date: cell(data_date_idx).and_then(|v| parse_date(&v)),
            price_source_date: cell(price_date_idx).and_then(|v| parse_date(&v)),
            notes: cell(notes_idx),
            verified: cell(verified_idx).is_some_and(|v| parse_flag(&v)),
            price_year: None,
            force_add: true,
        });
    }
    Ok(out)
}

/// `nazwa;rodzaj;gmina;powiat;wojewodztwo`; rows without a name or district are dropped.
pub fn parse_gazetteer_csv(data: &[u8]) -> Result<Vec<NewLocality>> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(detect_delimiter(data))
        .from_reader(data);
    let headers = reader.headers().context("Failed reading gazetteer headers")?.clone();

    let name_idx = header_index(&headers, "nazwa")?;
    let district_idx = header_index(&headers, "powiat")?;
    let region_idx = header_index(&headers, "wojewodztwo")?;
    let kind_idx = optional_index(&headers, "rodzaj");
    let municipality_idx = optional_index(&headers, "gmina");

    let mut out = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed reading gazetteer row {}", line + 2))?;
        let get = |i: usize| record.get(i).map(str::trim).unwrap_or_default().to_string();
        let name = get(name_idx);
        let district = get(district_idx);
        if name.is_empty() || district.is_empty() {
            continue;
        }
        out.push(NewLocality {
            name,
            kind: kind_idx.map(|i| LocalityKind::parse(&get(i))).unwrap_or(LocalityKind::Other),
            municipality: municipality_idx.map(get).filter(|m| !m.is_empty()),
            district,
            region: get(region_idx),
        });
    }
    Ok(out)
}

/// One office per city; rows without a city or office name are dropped.
pub fn parse_mops_csv(data: &[u8]) -> Result<Vec<NewMopsContact>> {
    let data = data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(detect_delimiter(data))
        .from_reader(data);
    let headers = reader.headers().context("Failed reading MOPS headers")?.clone();

    let any_of = |names: &[&str]| names.iter().find_map(|n| optional_index(&headers, n));
    let city_idx = any_of(&["miasto", "city_display"])
        .ok_or_else(|| anyhow!("Missing column 'miasto' in MOPS CSV"))?;
    let name_idx = header_index(&headers, "nazwa")?;
    let phone_idx = any_of(&["telefon"]);
    let email_idx = any_of(&["email"]);
    let address_idx = any_of(&["adres"]);
    let www_idx = any_of(&["www"]);
    let region_idx = any_of(&["wojewodztwo"]);
    let verified_idx = any_of(&["verified"]);
    let checked_idx = any_of(&["data_weryfikacji", "last_verified"]);
    let notes_idx = any_of(&["notatki"]);

    let mut out = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Failed reading MOPS row {}", line + 2))?;
        let cell = |idx: Option<usize>| -> Option<String> {
            non_empty(idx.and_then(|i| record.get(i)).map(str::to_string))
        };
        let (Some(city_display), Some(name)) = (cell(Some(city_idx)), cell(Some(name_idx))) else {
            continue;
        };
        out.push(NewMopsContact {
            city_display,
            name,
            phone: cell(phone_idx),
            email: cell(email_idx),
            address: cell(address_idx),
            website: cell(www_idx),
            region: cell(region_idx),
            verified: cell(verified_idx).is_some_and(|v| parse_flag(&v)),
            last_verified: cell(checked_idx).and_then(|v| parse_date(&v)),
            notes: cell(notes_idx),
        });
    }
    Ok(out)
}
