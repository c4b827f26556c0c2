use std::time::Duration;

use async_trait::async_trait;
use reqwest::header;
use serde::Deserialize;

use super::{CatalogEntry, CorpusAccessor, CorpusError};
use crate::config::RemoteConfig;

const CATALOG_COLUMNS: &str = "name,embedding,image_url";
/// PostgREST answers with a single object, or 406 unless exactly one row matches.
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

/// PostgREST (Supabase) catalog client.
pub struct RestCorpus {
    client: reqwest::Client,
    catalog_url: String,
    count_url: String,
    order_by: Option<String>,
}

#[derive(Deserialize)]
struct CountRow {
    record_count: Option<i64>,
}

#[derive(Deserialize)]
struct CatalogRow {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    embedding: Option<RawEmbedding>,
    #[serde(default)]
    image_url: Option<String>,
}

/// `embedding` is a JSON array for `float8[]`/`jsonb` columns and a text literal for pgvector.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEmbedding {
    Values(Vec<f64>),
    Text(String),
}

impl RawEmbedding {
    fn into_values(self) -> Result<Vec<f64>, CorpusError> {
        match self {
            RawEmbedding::Values(v) => Ok(v),
            RawEmbedding::Text(s) => parse_vector_literal(&s),
        }
    }
}

/// Parse a pgvector literal such as `[0.1,-0.2,3e-4]`.
pub fn parse_vector_literal(raw: &str) -> Result<Vec<f64>, CorpusError> {
    let inner = raw
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| CorpusError::Decode(format!("not a vector literal: {raw:?}")))?;
    if inner.trim().is_empty() {
        return Ok(vec![]);
    }
    inner
        .split(',')
        .map(|v| {
            v.trim()
                .parse::<f64>()
                .map_err(|e| CorpusError::Decode(format!("bad vector component {v:?}: {e}")))
        })
        .collect()
}

impl RestCorpus {
    pub fn new(cfg: &RemoteConfig) -> Result<Self, CorpusError> {
        let invalid = |e: header::InvalidHeaderValue| CorpusError::Decode(format!("api key: {e}"));

        let mut headers = header::HeaderMap::new();
        headers.insert("apikey", header::HeaderValue::from_str(&cfg.key).map_err(invalid)?);
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {}", cfg.key)).map_err(invalid)?,
        );
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!("celebmatch/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;

        let base = cfg.url.trim_end_matches('/');
        Ok(Self {
            client,
            catalog_url: format!("{}/rest/v1/{}", base, cfg.table),
            count_url: format!("{}/rest/v1/{}", base, cfg.count_table),
            order_by: cfg.order_by.clone(),
        })
    }

    async fn get_text(
        &self,
        url: &str,
        query: &[(&str, String)],
        accept: Option<&'static str>,
    ) -> Result<String, CorpusError> {
        let mut req = self.client.get(url).query(query);
        if let Some(accept) = accept {
            req = req.header(header::ACCEPT, accept);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CorpusError::Status { status, body });
        }
        Ok(resp.text().await?)
    }
}

#[async_trait]
impl CorpusAccessor for RestCorpus {
    async fn count(&self) -> Result<u64, CorpusError> {
        let body = self
            .get_text(
                &self.count_url,
                &[("select", "record_count".to_string())],
                Some(SINGLE_OBJECT),
            )
            .await?;
        let row: CountRow =
            serde_json::from_str(&body).map_err(|e| CorpusError::Decode(e.to_string()))?;

        let count = row.record_count.ok_or(CorpusError::MissingCount)?;
        u64::try_from(count).map_err(|_| CorpusError::Decode(format!("negative record count {count}")))
    }

    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<CatalogEntry>, CorpusError> {
        let mut query = vec![
            ("select", CATALOG_COLUMNS.to_string()),
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(col) = &self.order_by {
            query.push(("order", format!("{col}.asc")));
        }

        let body = self.get_text(&self.catalog_url, &query, None).await?;
        let rows: Vec<CatalogRow> =
            serde_json::from_str(&body).map_err(|e| CorpusError::Decode(e.to_string()))?;
        log::debug!("fetched {} rows at offset {}", rows.len(), offset);

        rows.into_iter()
            .map(|row| {
                Ok(CatalogEntry {
                    name: row.name.unwrap_or_default(),
                    // null embeddings come through empty and are skipped as mismatches
                    embedding: match row.embedding {
                        Some(raw) => raw.into_values()?,
                        None => vec![],
                    },
                    reference_url: row.image_url.unwrap_or_default(),
                })
            })
            .collect()
    }
}
