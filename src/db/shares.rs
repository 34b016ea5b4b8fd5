use anyhow::{Context, anyhow};
use duckdb::{Connection, OptionalExt, params};
use rand::Rng;
use serde::Serialize;

const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const TOKEN_LEN: usize = 6;
const MAX_TOKEN_ATTEMPTS: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct SharedList {
    pub token: String,
    pub ids: Vec<i64>,
    pub views: i64,
    pub created_at: String,
}

pub fn generate_token<R: Rng>(rng: &mut R) -> String {
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

fn token_exists(conn: &Connection, token: &str) -> anyhow::Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*)::BIGINT FROM shared_lists WHERE token = ?",
        params![token],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

pub fn create(conn: &Connection, ids: &[i64], now: &str) -> anyhow::Result<SharedList> {
    create_with(conn, ids, now, &mut rand::thread_rng())
}

pub fn create_with<R: Rng>(
    conn: &Connection,
    ids: &[i64],
    now: &str,
    rng: &mut R,
) -> anyhow::Result<SharedList> {
    let mut token = None;
    for _ in 0..MAX_TOKEN_ATTEMPTS {
        let candidate = generate_token(rng);
        if !token_exists(conn, &candidate)? {
            token = Some(candidate);
            break;
        }
    }
    let token = token.ok_or_else(|| anyhow!("failed to generate a unique share token"))?;

    let joined = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
    let created_at: String = conn
        .query_row(
            r#"
            INSERT INTO shared_lists (token, facility_ids, views, created_at)
            VALUES (?, ?, 0, CAST(? AS TIMESTAMP))
            RETURNING strftime(created_at, '%Y-%m-%dT%H:%M:%SZ')
        "#,
            params![token, joined, now],
            |row| row.get(0),
        )
        .context("insert shared list")?;

    Ok(SharedList {
        token,
        ids: ids.to_vec(),
        views: 0,
        created_at,
    })
}

/// Looks up a list and counts the visit.
pub fn resolve(conn: &Connection, token: &str) -> anyhow::Result<Option<SharedList>> {
    let found = conn
        .query_row(
            r#"
            SELECT facility_ids, views, strftime(created_at, '%Y-%m-%dT%H:%M:%SZ')
            FROM shared_lists WHERE token = ?
        "#,
            params![token],
            |row| {
                Ok((
                    row.get::<usize, String>(0)?,
                    row.get::<usize, i64>(1)?,
                    row.get::<usize, String>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((raw_ids, views, created_at)) = found else {
        return Ok(None);
    };

    conn.execute(
        "UPDATE shared_lists SET views = views + 1 WHERE token = ?",
        params![token],
    )?;

    let ids = raw_ids
        .split(',')
        .filter_map(|s| s.trim().parse::<i64>().ok())
        .collect();
    Ok(Some(SharedList {
        token: token.to_string(),
        ids,
        views: views + 1,
        created_at,
    }))
}
