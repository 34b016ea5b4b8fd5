use anyhow::Context;
use duckdb::{Connection, Row, params};
use serde::Serialize;

use crate::partners::NewInquiry;

#[derive(Debug, Clone, Serialize)]
pub struct Inquiry {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub organization: String,
    pub partner_type: String,
    pub phone: Option<String>,
    pub message: String,
    pub gdpr_consent: bool,
    pub status: String,
    pub created_at: String,
}

fn map_row(row: &Row<'_>) -> duckdb::Result<Inquiry> {
    Ok(Inquiry {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        organization: row.get(3)?,
        partner_type: row.get(4)?,
        phone: row.get(5)?,
        message: row.get(6)?,
        gdpr_consent: row.get(7)?,
        status: row.get(8)?,
        created_at: row.get(9)?,
    })
}

pub fn insert(conn: &Connection, inquiry: &NewInquiry, now: &str) -> anyhow::Result<i64> {
    let id: i64 = conn
        .query_row(
            r#"
            INSERT INTO partner_inquiries
              (name, email, organization, partner_type, phone, message, gdpr_consent, created_at)
            VALUES (?, ?, ?, ?, ?, ?, true, CAST(? AS TIMESTAMP))
            RETURNING id
        "#,
            params![
                inquiry.name,
                inquiry.email,
                inquiry.organization,
                inquiry.partner_type.as_str(),
                inquiry.phone,
                inquiry.message,
                now
            ],
            |row| row.get(0),
        )
        .context("insert partner inquiry")?;
    Ok(id)
}

/// Inquiries sent from `email` at or after `since`.
pub fn count_by_email_since(conn: &Connection, email: &str, since: &str) -> anyhow::Result<i64> {
    let n: i64 = conn.query_row(
        r#"
        SELECT COUNT(*)::BIGINT FROM partner_inquiries
        WHERE email = ? AND created_at >= CAST(? AS TIMESTAMP)
    "#,
        params![email.to_lowercase(), since],
        |row| row.get(0),
    )?;
    Ok(n)
}

/// Newest first, optionally narrowed to one status; returns the page and the filtered total.
pub fn list(
    conn: &Connection,
    status: Option<&str>,
    limit: usize,
    offset: usize,
) -> anyhow::Result<(Vec<Inquiry>, i64)> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*)::BIGINT FROM partner_inquiries WHERE CAST(? AS VARCHAR) IS NULL OR status = CAST(? AS VARCHAR)",
        params![status, status],
        |row| row.get(0),
    )?;
    let mut stmt = conn.prepare(
        r#"
        SELECT id, name, email, organization, partner_type, phone, message, gdpr_consent, status,
               strftime(created_at, '%Y-%m-%dT%H:%M:%SZ')
        FROM partner_inquiries
        WHERE CAST(? AS VARCHAR) IS NULL OR status = CAST(? AS VARCHAR)
        ORDER BY created_at DESC, id DESC
        LIMIT ? OFFSET ?
    "#,
    )?;
    let rows = stmt.query_map(params![status, status, limit as i64, offset as i64], map_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r?);
    }
    Ok((out, total))
}

/// Returns false when no inquiry has this id.
pub fn set_status(conn: &Connection, id: i64, status: &str) -> anyhow::Result<bool> {
    let changed = conn
        .execute(
            "UPDATE partner_inquiries SET status = ? WHERE id = ?",
            params![status, id],
        )
        .with_context(|| format!("update inquiry {id}"))?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use crate::partners::PartnerType;

    fn inquiry(email: &str) -> NewInquiry {
        NewInquiry {
            name: "Anna Nowak".to_string(),
            email: email.to_string(),
            organization: "MOPS Kraków".to_string(),
            partner_type: PartnerType::Mops,
            phone: None,
            message: "Chcemy nawiązać współpracę.".to_string(),
        }
    }

    #[test]
    fn test_count_by_email_window() {
        let conn = open_in_memory().unwrap();
        insert(&conn, &inquiry("a@mops.pl"), "2025-06-01 09:00:00").unwrap();
        insert(&conn, &inquiry("a@mops.pl"), "2025-06-02 09:00:00").unwrap();
        insert(&conn, &inquiry("b@mops.pl"), "2025-06-02 10:00:00").unwrap();

        assert_eq!(count_by_email_since(&conn, "A@mops.pl", "2025-06-01 12:00:00").unwrap(), 1);
        assert_eq!(count_by_email_since(&conn, "a@mops.pl", "2025-05-31 00:00:00").unwrap(), 2);
    }

    #[test]
    fn test_list_filters_and_pages() {
        let conn = open_in_memory().unwrap();
        let first = insert(&conn, &inquiry("a@mops.pl"), "2025-06-01 09:00:00").unwrap();
        insert(&conn, &inquiry("b@mops.pl"), "2025-06-02 09:00:00").unwrap();
        insert(&conn, &inquiry("c@mops.pl"), "2025-06-03 09:00:00").unwrap();
        assert!(set_status(&conn, first, "contacted").unwrap());
        assert!(!set_status(&conn, 999, "contacted").unwrap());

        let (page, total) = list(&conn, None, 2, 0).unwrap();
        assert_eq!(total, 3);
        let emails: Vec<&str> = page.iter().map(|i| i.email.as_str()).collect();
        assert_eq!(emails, vec!["c@mops.pl", "b@mops.pl"]);
        assert_eq!(page[0].status, "new");
        assert_eq!(page[0].created_at, "2025-06-03T09:00:00Z");

        let (page, total) = list(&conn, Some("contacted"), 50, 0).unwrap();
        assert_eq!(total, 1);
        assert_eq!(page[0].id, first);
    }
}
