use crate::model::Facility;
use crate::text::normalize_polish;

/// Ranks how well a facility answers a free-text locality query.
///
/// The district comparison is prefix based so that a town name still scores
/// against the adjective form of its district ("olkusz" vs "olkuski").
pub fn match_score(query: &str, f: &Facility) -> i32 {
    let q = normalize_polish(query);
    if q.is_empty() {
        return 0;
    }
    let mut score = 0;

    let locality = normalize_polish(&f.locality);
    if locality == q {
        score += 100;
    } else if locality.contains(&q) {
        score += 50;
    }

    if let Some(municipality) = f.municipality.as_deref().map(normalize_polish) {
        if municipality == q {
            score += 80;
        } else if municipality.contains(&q) {
            score += 40;
        }
    }

    let district = normalize_polish(&f.district);
    if district == q {
        score += 60;
    } else {
        let common = common_prefix_len(&q, &district);
        let similarity = common as f64 / q.chars().count() as f64;
        if similarity >= 0.75 && common >= 4 {
            score += 55;
        } else if similarity >= 0.6 && common >= 3 {
            score += 40;
        } else if district.contains(&q) {
            score += 30;
        }
    }

    if normalize_polish(&f.name).contains(&q) {
        score += 20;
    }

    score
}

fn common_prefix_len(a: &str, b: &str) -> usize {
    a.chars().zip(b.chars()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests::facility;

    #[test]
    fn test_exact_locality_beats_partial() {
        let exact = facility(1, "DPS A", "Olkusz", "olkuski");
        let partial = facility(2, "DPS B", "Olkusz-Wschód", "olkuski");
        assert!(match_score("Olkusz", &exact) > match_score("Olkusz", &partial));
    }

    #[test]
    fn test_district_prefix_similarity() {
        // 5 of 6 query chars shared with "olkuski".
        let f = facility(1, "Dom", "Wolbrom", "olkuski");
        assert_eq!(match_score("olkusz", &f), 55);

        let f = facility(1, "Dom", "Wolbrom", "olsztyński");
        // "ols" shares 2 chars with "olk..." -> no prefix bonus, no containment.
        assert_eq!(match_score("olkusz", &f), 0);
    }

    #[test]
    fn test_components_add_up() {
        let mut f = facility(1, "DPS Kraków", "Kraków", "Kraków");
        f.municipality = Some("Kraków".to_string());
        assert_eq!(match_score("krakow", &f), 100 + 80 + 60 + 20);
        assert_eq!(match_score("", &f), 0);
    }
}
