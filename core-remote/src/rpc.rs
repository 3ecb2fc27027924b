//! JSON-RPC implementation of [`RemoteClient`].
//!
//! The server exposes a single `/rpc` endpoint. `connect` authenticates the
//! configured login once to obtain a numeric user id; every subsequent call
//! carries database, user id and api key (the server is stateless between
//! calls, there is no session token to refresh).

use crate::client::{Filter, RemoteClient};
use crate::error::{RemoteError, Result};
use crate::types::{FieldDescriptor, FieldKind, RemoteRecord, RemoteSchema, RemoteValue};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Connection settings for one remote account.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// Base URL of the server (e.g. `https://records.example.com`).
    pub url: String,
    /// Server database name.
    pub database: String,
    /// Login (usually an email address).
    pub login: String,
    /// API key or password, sent with every call.
    pub api_key: String,
}

/// A connected JSON-RPC client for one account.
pub struct RpcClient {
    http: reqwest::Client,
    config: RpcConfig,
    uid: i64,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Authenticate and return a ready client.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Auth`] when the server rejects the
    /// credentials, [`RemoteError::Transport`] on connection failure.
    pub async fn connect(config: RpcConfig) -> Result<Self> {
        let http = reqwest::Client::new();
        let client = Self {
            http,
            config,
            uid: 0,
            next_id: AtomicU64::new(1),
        };

        let result = client
            .call_service(
                "common",
                "authenticate",
                json!([
                    client.config.database,
                    client.config.login,
                    client.config.api_key,
                    {}
                ]),
            )
            .await?;

        // A falsy result means bad credentials rather than a fault.
        let uid = result.as_i64().filter(|id| *id > 0).ok_or_else(|| RemoteError::Auth {
            login: client.config.login.clone(),
            database: client.config.database.clone(),
        })?;

        debug!(login = %client.config.login, uid, "Authenticated against remote server");
        Ok(Self { uid, ..client })
    }

    /// The authenticated user id.
    pub fn uid(&self) -> i64 {
        self.uid
    }

    async fn call_service(&self, service: &str, method: &str, args: Value) -> Result<Value> {
        let request_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": {
                "service": service,
                "method": method,
                "args": args,
            },
            "id": request_id,
        });

        let url = format!("{}/rpc", self.config.url.trim_end_matches('/'));
        let response = self.http.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Transport(format!(
                "HTTP {} from {}",
                status, url
            )));
        }

        let envelope: Value = response
            .json()
            .await
            .map_err(|e| RemoteError::Protocol(format!("invalid JSON-RPC response: {e}")))?;

        if let Some(error) = envelope.get("error") {
            let message = error
                .get("data")
                .and_then(|d| d.get("message"))
                .or_else(|| error.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("unknown server fault")
                .to_string();
            warn!(service, method, %message, "Remote call failed");
            return Err(RemoteError::Remote { message });
        }

        envelope
            .get("result")
            .cloned()
            .ok_or_else(|| RemoteError::Protocol("response has neither result nor error".to_string()))
    }

    /// Invoke `method` on `entity` with positional `args` and keyword
    /// `kwargs`, carrying the per-call credentials.
    async fn execute(
        &self,
        entity: &str,
        method: &str,
        args: Value,
        kwargs: Value,
    ) -> Result<Value> {
        self.call_service(
            "object",
            "execute_kw",
            json!([
                self.config.database,
                self.uid,
                self.config.api_key,
                entity,
                method,
                args,
                kwargs,
            ]),
        )
        .await
    }

    fn domain_to_json(domain: &[Filter]) -> Value {
        Value::Array(
            domain
                .iter()
                .map(|f| json!([f.field, f.op, f.value.to_json()]))
                .collect(),
        )
    }

    fn values_to_json(values: &HashMap<String, RemoteValue>) -> Value {
        Value::Object(
            values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    fn parse_records(result: Value) -> Result<Vec<RemoteRecord>> {
        let items = result
            .as_array()
            .ok_or_else(|| RemoteError::Protocol("expected a record list".to_string()))?;
        Ok(items.iter().filter_map(RemoteRecord::from_json).collect())
    }
}

#[async_trait]
impl RemoteClient for RpcClient {
    async fn search(&self, entity: &str, domain: &[Filter]) -> Result<Vec<i64>> {
        let result = self
            .execute(entity, "search", json!([Self::domain_to_json(domain)]), json!({}))
            .await?;
        let ids = result
            .as_array()
            .ok_or_else(|| RemoteError::Protocol("expected an id list".to_string()))?;
        Ok(ids.iter().filter_map(|v| v.as_i64()).collect())
    }

    async fn search_read(&self, entity: &str, fields: &[String]) -> Result<Vec<RemoteRecord>> {
        let result = self
            .execute(
                entity,
                "search_read",
                json!([[]]),
                json!({ "fields": fields }),
            )
            .await?;
        Self::parse_records(result)
    }

    async fn read(
        &self,
        entity: &str,
        ids: &[i64],
        fields: &[String],
    ) -> Result<Vec<RemoteRecord>> {
        let result = self
            .execute(entity, "read", json!([ids]), json!({ "fields": fields }))
            .await?;
        Self::parse_records(result)
    }

    async fn fields_get(&self, entity: &str) -> Result<RemoteSchema> {
        let result = self
            .execute(
                entity,
                "fields_get",
                json!([]),
                json!({ "attributes": ["type"] }),
            )
            .await?;
        let obj = result
            .as_object()
            .ok_or_else(|| RemoteError::Protocol("expected a schema object".to_string()))?;

        Ok(obj
            .iter()
            .map(|(name, attrs)| {
                let kind = attrs
                    .get("type")
                    .and_then(|t| t.as_str())
                    .map(FieldKind::parse)
                    .unwrap_or(FieldKind::Other);
                (name.clone(), FieldDescriptor { kind })
            })
            .collect())
    }

    async fn create(&self, entity: &str, values: &HashMap<String, RemoteValue>) -> Result<i64> {
        let result = self
            .execute(entity, "create", json!([Self::values_to_json(values)]), json!({}))
            .await?;
        result
            .as_i64()
            .ok_or_else(|| RemoteError::Protocol("create returned no id".to_string()))
    }

    async fn write(
        &self,
        entity: &str,
        ids: &[i64],
        values: &HashMap<String, RemoteValue>,
    ) -> Result<()> {
        self.execute(
            entity,
            "write",
            json!([ids, Self::values_to_json(values)]),
            json!({}),
        )
        .await?;
        Ok(())
    }

    async fn unlink(&self, entity: &str, ids: &[i64]) -> Result<()> {
        self.execute(entity, "unlink", json!([ids]), json!({})).await?;
        Ok(())
    }

    async fn exec_action(&self, entity: &str, action: &str, ids: &[i64]) -> Result<()> {
        self.execute(entity, action, json!([ids]), json!({})).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_serialization() {
        let domain = vec![Filter::eq("user_id", RemoteValue::Int(7))];
        assert_eq!(
            RpcClient::domain_to_json(&domain),
            json!([["user_id", "=", 7]])
        );
        assert_eq!(RpcClient::domain_to_json(&[]), json!([]));
    }

    #[test]
    fn record_list_parsing_skips_malformed_entries() {
        let result = json!([
            {"id": 1, "name": "a"},
            {"name": "missing id"},
            {"id": 2, "name": "b"},
        ]);
        let records = RpcClient::parse_records(result).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 1);
        assert_eq!(records[1].id, 2);
    }
}
