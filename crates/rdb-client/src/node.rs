//! Single-node HTTP client: a pooled connection to one `host:port` speaking
//! the raw-value and bulk protocols over `reqwest`.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_encode};
use rdb_codec::Value;
use rdb_error::RdbError;
use reqwest::StatusCode;

/// Default server listen port (`spec.md` §6).
pub const DEFAULT_PORT: u16 = 6552;

// Percent-encode every byte outside `[A-Za-z0-9]` — "no safe characters"
// per spec.md §4.7.
const KEY_ENCODE_SET: &AsciiSet = NON_ALPHANUMERIC;

fn key_to_ascii(key: &[u8]) -> Result<String, RdbError> {
    if key.is_empty() || !key.is_ascii() {
        return Err(RdbError::invalid_key(
            "keys must be non-empty ASCII byte strings",
        ));
    }
    Ok(String::from_utf8(key.to_vec()).expect("validated ascii"))
}

fn transport_err(e: reqwest::Error) -> RdbError {
    RdbError::transport(e.to_string()).with_source(e)
}

fn status_err(status: StatusCode, reason: &str) -> RdbError {
    RdbError::transport(format!("unexpected status {status}: {reason}"))
}

/// A pooled HTTP client to a single RDB node.
#[derive(Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    base_url: String,
}

impl NodeClient {
    /// Build a client for `host[:port]`. `reqwest::Client` owns its own
    /// connection pool, so constructing one `NodeClient` per node and
    /// reusing it across requests is the pooling story (`spec.md` §3
    /// "Lifecycles").
    pub fn new(addr: impl AsRef<str>) -> Self {
        let addr = addr.as_ref();
        let addr = if addr.contains(':') {
            addr.to_string()
        } else {
            format!("{addr}:{DEFAULT_PORT}")
        };
        Self {
            http: reqwest::Client::new(),
            base_url: format!("http://{addr}"),
        }
    }

    fn data_url(&self, key: &[u8]) -> Result<String, RdbError> {
        let key = key_to_ascii(key)?;
        let encoded = percent_encode(key.as_bytes(), KEY_ENCODE_SET);
        Ok(format!("{}/data/{encoded}", self.base_url))
    }

    /// `GET /data/{key}`. A 404 is surfaced as `ErrorKind::NotFound`.
    #[tracing::instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn get(&self, key: &[u8]) -> Result<Value, RdbError> {
        let resp = self
            .http
            .get(self.data_url(key)?)
            .send()
            .await
            .map_err(transport_err)?;
        match resp.status() {
            StatusCode::OK => {
                let bytes = resp.bytes().await.map_err(transport_err)?;
                rdb_codec::decode_bytes(&bytes)
            }
            StatusCode::NOT_FOUND => Err(RdbError::not_found(format!(
                "key not found: {}",
                String::from_utf8_lossy(key)
            ))),
            other => Err(status_err(other, &resp.text().await.unwrap_or_default())),
        }
    }

    /// `get`, but return `default` instead of failing on
    /// `ErrorKind::NotFound`.
    pub async fn get_or(&self, key: &[u8], default: Value) -> Result<Value, RdbError> {
        match self.get(key).await {
            Err(e) if e.is_not_found() => Ok(default),
            other => other,
        }
    }

    /// `PUT /data/{key}`. A 406 (malformed envelope) is surfaced as
    /// `ErrorKind::BadWireFormat`.
    #[tracing::instrument(skip(self, value), fields(base_url = %self.base_url))]
    pub async fn put(&self, key: &[u8], value: &Value) -> Result<(), RdbError> {
        let body = rdb_codec::encode_bytes(value);
        let resp = self
            .http
            .put(self.data_url(key)?)
            .body(body)
            .send()
            .await
            .map_err(transport_err)?;
        match resp.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_ACCEPTABLE => Err(RdbError::bad_wire_format("malformed envelope")),
            other => Err(status_err(other, &resp.text().await.unwrap_or_default())),
        }
    }

    /// `DELETE /data/{key}`. Absence is not an error (`spec.md` §6).
    #[tracing::instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn delete(&self, key: &[u8]) -> Result<(), RdbError> {
        let resp = self
            .http
            .delete(self.data_url(key)?)
            .send()
            .await
            .map_err(transport_err)?;
        match resp.status() {
            StatusCode::OK => Ok(()),
            other => Err(status_err(other, &resp.text().await.unwrap_or_default())),
        }
    }

    /// POST one of `/_bulk`, `/_get_multi`, `/_put_multi`, `/_delete_multi`,
    /// picking the alias by which single operation this call carries (the
    /// server treats all four identically; the alias plus the keys appended
    /// to the path only exist to make request logs readable, per
    /// `spec.md` §4.7).
    async fn bulk(
        &self,
        body: Vec<(&str, String)>,
        path_keys: &[String],
    ) -> Result<BTreeMap<String, Value>, RdbError> {
        let func = match body.as_slice() {
            [("get", _)] => "_get_multi",
            [("put", _)] => "_put_multi",
            [("delete", _)] => "_delete_multi",
            _ => "_bulk",
        };
        let suffix = path_keys
            .iter()
            .map(|k| percent_encode(k.as_bytes(), KEY_ENCODE_SET).to_string())
            .collect::<Vec<_>>()
            .join("+");
        let url = if suffix.is_empty() {
            format!("{}/{func}", self.base_url)
        } else {
            format!("{}/{func}/{suffix}", self.base_url)
        };
        let resp = self
            .http
            .post(url)
            .form(&body)
            .send()
            .await
            .map_err(transport_err)?;
        if resp.status() != StatusCode::OK {
            return Err(status_err(
                resp.status(),
                &resp.text().await.unwrap_or_default(),
            ));
        }
        let envelopes: BTreeMap<String, rdb_codec::Envelope> =
            resp.json().await.map_err(transport_err)?;
        envelopes
            .into_iter()
            .map(|(k, env)| rdb_codec::decode(&env).map(|v| (k, v)))
            .collect()
    }

    /// `POST /_bulk` with a `get` field. Returned keys that were absent are
    /// omitted (`NoInclude` semantics, `spec.md` §6).
    #[tracing::instrument(skip(self, keys), fields(base_url = %self.base_url, n = keys.len()))]
    pub async fn get_multi(&self, keys: &[Vec<u8>]) -> Result<BTreeMap<Vec<u8>, Value>, RdbError> {
        let ascii_keys = keys
            .iter()
            .map(|k| key_to_ascii(k))
            .collect::<Result<Vec<_>, _>>()?;
        let field = serde_json::json!({ "keys": ascii_keys }).to_string();
        let by_str = self.bulk(vec![("get", field)], &ascii_keys).await?;
        Ok(by_str.into_iter().map(|(k, v)| (k.into_bytes(), v)).collect())
    }

    /// `POST /_bulk` with a `put` field.
    #[tracing::instrument(skip(self, values), fields(base_url = %self.base_url, n = values.len()))]
    pub async fn put_multi(&self, values: &BTreeMap<Vec<u8>, Value>) -> Result<(), RdbError> {
        let mut map = serde_json::Map::new();
        let mut ascii_keys = Vec::with_capacity(values.len());
        for (k, v) in values {
            let key = key_to_ascii(k)?;
            ascii_keys.push(key.clone());
            map.insert(key, serde_json::to_value(rdb_codec::encode(v)).unwrap());
        }
        let field = serde_json::Value::Object(map).to_string();
        self.bulk(vec![("put", field)], &ascii_keys).await?;
        Ok(())
    }

    /// `POST /_bulk` with a `delete` field.
    #[tracing::instrument(skip(self, keys), fields(base_url = %self.base_url, n = keys.len()))]
    pub async fn delete_multi(&self, keys: &[Vec<u8>]) -> Result<(), RdbError> {
        let ascii_keys = keys
            .iter()
            .map(|k| key_to_ascii(k))
            .collect::<Result<Vec<_>, _>>()?;
        let field = serde_json::json!({ "keys": ascii_keys }).to_string();
        self.bulk(vec![("delete", field)], &ascii_keys).await?;
        Ok(())
    }

    /// `GET /_all_keys`. A 501 means the server's backend does not support
    /// iteration.
    pub async fn all_keys(&self) -> Result<Vec<Vec<u8>>, RdbError> {
        let resp = self
            .http
            .get(format!("{}/_all_keys", self.base_url))
            .send()
            .await
            .map_err(transport_err)?;
        match resp.status() {
            StatusCode::OK => {
                let keys: Vec<String> = resp.json().await.map_err(transport_err)?;
                Ok(keys.into_iter().map(String::into_bytes).collect())
            }
            StatusCode::NOT_IMPLEMENTED => Err(RdbError::not_implemented(
                "backend does not support iteration",
            )),
            other => Err(status_err(other, &resp.text().await.unwrap_or_default())),
        }
    }

    /// `GET /_all_data`. A 501 means the server's backend does not support
    /// iteration.
    pub async fn all_data(&self) -> Result<BTreeMap<Vec<u8>, Value>, RdbError> {
        let resp = self
            .http
            .get(format!("{}/_all_data", self.base_url))
            .send()
            .await
            .map_err(transport_err)?;
        match resp.status() {
            StatusCode::OK => {
                let envelopes: BTreeMap<String, rdb_codec::Envelope> =
                    resp.json().await.map_err(transport_err)?;
                envelopes
                    .into_iter()
                    .map(|(k, env)| rdb_codec::decode(&env).map(|v| (k.into_bytes(), v)))
                    .collect()
            }
            StatusCode::NOT_IMPLEMENTED => Err(RdbError::not_implemented(
                "backend does not support iteration",
            )),
            other => Err(status_err(other, &resp.text().await.unwrap_or_default())),
        }
    }

    /// `GET /_stats`.
    pub async fn stats(&self) -> Result<serde_json::Value, RdbError> {
        let resp = self
            .http
            .get(format!("{}/_stats", self.base_url))
            .send()
            .await
            .map_err(transport_err)?;
        match resp.status() {
            StatusCode::OK => resp.json().await.map_err(transport_err),
            other => Err(status_err(other, &resp.text().await.unwrap_or_default())),
        }
    }
}
