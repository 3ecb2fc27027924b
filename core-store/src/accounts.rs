//! Remote account records.

use crate::error::Result;
use crate::store::Store;
use crate::value::SqlRow;
use tracing::warn;

/// One configured remote server connection.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub url: String,
    pub database: String,
    pub login: String,
    pub api_key: String,
}

impl Account {
    fn from_row(row: &SqlRow) -> Option<Self> {
        let text = |key: &str| {
            row.get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        Some(Self {
            id: row.get("id")?.as_i64()?,
            name: text("name").unwrap_or_default(),
            url: text("url")?,
            database: text("database").unwrap_or_default(),
            login: text("login").unwrap_or_default(),
            api_key: text("api_key").unwrap_or_default(),
        })
    }
}

/// Load all syncable accounts. Rows without a server URL cannot be
/// reached and are skipped with a warning.
pub async fn list_accounts(store: &Store) -> Result<Vec<Account>> {
    let rows = store
        .fetch(
            "SELECT id, name, url, database, login, api_key FROM accounts ORDER BY id",
            &[],
        )
        .await?;

    let mut accounts = Vec::with_capacity(rows.len());
    for row in &rows {
        match Account::from_row(row) {
            Some(account) if !account.url.trim().is_empty() => accounts.push(account),
            Some(account) => {
                warn!(account_id = account.id, name = %account.name, "Account has no server URL, skipping");
            }
            None => warn!("Malformed account row, skipping"),
        }
    }
    Ok(accounts)
}
