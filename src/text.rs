use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

const NAME_NOISE_PHRASE: [&str; 3] = ["dom", "pomocy", "spolecznej"];
const NAME_NOISE: [&str; 3] = ["dps", "im.", "sw."];
const ADDRESS_NOISE: [&str; 2] = ["ul.", "os."];

/// Lowercases, folds Polish diacritics to ASCII and trims.
///
/// `ł` has no canonical decomposition, so it is mapped explicitly before the
/// NFD pass strips combining marks from everything else ("Łódź" -> "lodz").
pub fn normalize_polish(s: &str) -> String {
    let lowered = s.to_lowercase().replace('ł', "l");
    lowered
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Name key used when matching imported price lists against facility records.
///
/// Noise is dropped per token, so "dps" never eats the middle of "odpszczyna"
/// while "DPS, Skawina" and "im.św." still lose it.
pub fn normalize_facility_name(s: &str) -> String {
    let normalized = normalize_polish(s);
    let tokens = name_tokens(&normalized);
    let mut kept = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i..].starts_with(&NAME_NOISE_PHRASE) {
            i += NAME_NOISE_PHRASE.len();
            continue;
        }
        if !NAME_NOISE.contains(&tokens[i]) {
            kept.push(tokens[i]);
        }
        i += 1;
    }
    kept.join(" ")
}

/// Splits on anything but letters, digits and `.`; a `.` closes its token
/// ("im.św." -> ["im.", "św."]).
fn name_tokens(s: &str) -> Vec<&str> {
    s.split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .flat_map(|piece| piece.split_inclusive('.'))
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn normalize_address(s: &str) -> String {
    let mut out = normalize_polish(s);
    for noise in ADDRESS_NOISE {
        out = out.replace(noise, "");
    }
    collapse_whitespace(&out)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Digits only, without the `48` country prefix.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() > 9 && digits.starts_with("48") {
        digits[2..].to_string()
    } else {
        digits
    }
}

/// Formats a Polish phone number as `XX XXX XX XX`; anything that is not
/// nine digits after normalization is returned unchanged.
pub fn format_phone(phone: &str) -> String {
    let d = normalize_phone(phone);
    if d.len() != 9 {
        return phone.to_string();
    }
    format!("{} {} {} {}", &d[0..2], &d[2..5], &d[5..7], &d[7..9])
}

pub fn slugify_city(name: &str) -> String {
    normalize_polish(name)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("+")
}

/// Parses a price the way people type it in spreadsheets: "3 500,50", "3500.5 zł".
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.replace(',', ".").parse::<f64>().ok()
}

pub fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
