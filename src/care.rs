use serde::Serialize;

use crate::model::FacilityType;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CareProfile {
    pub code: &'static str,
    pub label: &'static str,
    pub short: &'static str,
}

const DPS_PROFILES: [CareProfile; 7] = [
    CareProfile { code: "A", label: "Osoby z niepełnosprawnością intelektualną", short: "Niepełn. intelektualna" },
    CareProfile { code: "C", label: "Osoby przewlekle psychicznie chore", short: "Zaburzenia psychiczne" },
    CareProfile { code: "E", label: "Osoby w podeszłym wieku", short: "Osoby starsze" },
    CareProfile { code: "F", label: "Osoby przewlekle somatycznie chore", short: "Choroby przewlekłe" },
    CareProfile { code: "G", label: "Dzieci niepełnosprawne intelektualnie", short: "Dzieci niepełnosprawne" },
    CareProfile { code: "H", label: "Młodzież niepełnosprawna intelektualnie", short: "Młodzież niepełnosprawna" },
    CareProfile { code: "I", label: "Osoby niepełnosprawne fizycznie", short: "Niepełn. fizyczna" },
];

// The same letter means a different profile for day-support centres.
const SDS_PROFILES: [CareProfile; 6] = [
    CareProfile { code: "A", label: "Osoby z niepełnosprawnością intelektualną", short: "Niepełn. intelektualna" },
    CareProfile { code: "B", label: "Osoby z zaburzeniami psychicznymi", short: "Zaburzenia psychiczne" },
    CareProfile { code: "C", label: "Osoby z niepełnosprawnością fizyczną", short: "Niepełn. fizyczna" },
    CareProfile { code: "D", label: "Osoby w podeszłym wieku", short: "Osoby starsze" },
    CareProfile { code: "E", label: "Osoby niewidome i słabowidzące", short: "Niewidomi" },
    CareProfile { code: "F", label: "Osoby niesłyszące i słabosłyszące", short: "Niesłyszący" },
];

pub fn profiles_for(kind: FacilityType) -> &'static [CareProfile] {
    match kind {
        FacilityType::Dps => &DPS_PROFILES,
        FacilityType::Sds => &SDS_PROFILES,
    }
}

/// Splits a stored profile string ("A, E,f") into upper-case codes.
pub fn parse_codes(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = raw
        .split([',', ';', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_uppercase)
        .collect();
    out.dedup();
    out
}

/// True when the facility carries at least one requested code. An empty
/// request matches everything.
pub fn shares_any(profile: Option<&str>, requested: &[String]) -> bool {
    if requested.is_empty() {
        return true;
    }
    let Some(profile) = profile else {
        return false;
    };
    let codes = parse_codes(profile);
    requested
        .iter()
        .any(|r| codes.iter().any(|c| c.eq_ignore_ascii_case(r)))
}

pub fn labels(kind: FacilityType, profile: Option<&str>) -> Vec<CareProfile> {
    let Some(profile) = profile else {
        return Vec::new();
    };
    let known = profiles_for(kind);
    parse_codes(profile)
        .iter()
        .filter_map(|code| known.iter().find(|p| p.code == code).copied())
        .collect()
}
