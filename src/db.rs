use sqlx::{Connection, PgConnection};

use crate::dataset::RawTable;
use crate::error::{ForecastError, Result};

/// Fixed schema holding the raw archival copies of the disease tables.
const RAW_SCHEMA: &str = "pandemic_raw";

/// Opens a single store connection for one load operation. An unreachable
/// store fails fast here so the loader never proceeds with partial data.
pub async fn connect(database_url: &str) -> Result<PgConnection> {
    PgConnection::connect(database_url)
        .await
        .map_err(|err| ForecastError::Storage(format!("cannot reach durable store: {err}")))
}

/// Quotes a CSV header for use as an identifier.
fn column_ident(header: &str) -> String {
    let cleaned: String = header
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        format!("c_{cleaned}")
    } else {
        cleaned
    }
}

/// Destructive-replace archive of one raw table: create the schema and table
/// if absent (column types inferred numeric-or-text from the source cells),
/// truncate, then re-insert every row. Never an upsert.
pub async fn replace_raw_table(
    conn: &mut PgConnection,
    table: &str,
    raw: &RawTable,
) -> Result<()> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {RAW_SCHEMA}"))
        .execute(&mut *conn)
        .await?;

    let columns: Vec<String> = raw.headers.iter().map(|header| column_ident(header)).collect();
    let definitions: Vec<String> = columns
        .iter()
        .zip(&raw.numeric)
        .map(|(column, &numeric)| {
            let kind = if numeric { "DOUBLE PRECISION" } else { "VARCHAR(255)" };
            format!("{column} {kind}")
        })
        .collect();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {RAW_SCHEMA}.{table} ({})",
        definitions.join(", ")
    ))
    .execute(&mut *conn)
    .await?;

    sqlx::query(&format!("TRUNCATE TABLE {RAW_SCHEMA}.{table}"))
        .execute(&mut *conn)
        .await?;

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let insert = format!(
        "INSERT INTO {RAW_SCHEMA}.{table} ({}) VALUES ({})",
        columns.join(", "),
        placeholders.join(", ")
    );

    for row in &raw.rows {
        let mut query = sqlx::query(&insert);
        for (cell, &numeric) in row.iter().zip(&raw.numeric) {
            if numeric {
                query = query.bind(cell.parse::<f64>().unwrap_or(0.0));
            } else {
                query = query.bind(cell.clone());
            }
        }
        query.execute(&mut *conn).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_idents_are_safe_identifiers() {
        assert_eq!(column_ident("new_cases"), "new_cases");
        assert_eq!(column_ident("New Cases (7d)"), "new_cases__7d_");
        assert_eq!(column_ident("2024_count"), "c_2024_count");
    }
}
