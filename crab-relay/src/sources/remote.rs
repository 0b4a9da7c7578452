//! Commerce backend client
//!
//! `GET {base}/orders?status=processing&after=<RFC3339>&per_page=50&page=N`
//! with HTTP basic auth, following pages until a short page or the
//! `X-WP-TotalPages` count. Every fetched order is written through the local
//! [`OrderStore`] so the returned copies carry the authoritative flags.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use shared::{Order, OrderContent, OrderLine, OrderStatus};
use std::sync::Arc;
use std::time::Duration;

use super::{OrderSource, OrderStore};
use crate::core::{RelayConfig, RelayError, RelayResult};

const PAGE_SIZE: u32 = 50;
const TOTAL_PAGES_HEADER: &str = "x-wp-totalpages";

#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    base_url: String,
    consumer_key: String,
    consumer_secret: String,
    request_timeout: Duration,
}

impl Endpoint {
    fn from_config(config: &RelayConfig) -> Self {
        Self {
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            consumer_key: config.consumer_key.clone(),
            consumer_secret: config.consumer_secret.clone(),
            request_timeout: config.fetch_timeout(),
        }
    }
}

/// One page of results plus the backend's page count, when reported
struct Page {
    orders: Vec<RemoteOrder>,
    total_pages: Option<u32>,
}

/// [`OrderSource`] backed by the commerce REST API and the local store
#[derive(Clone)]
pub struct RemoteOrderSource {
    client: Client,
    endpoint: Arc<parking_lot::RwLock<Endpoint>>,
    store: OrderStore,
}

impl RemoteOrderSource {
    pub fn new(config: &RelayConfig, store: OrderStore) -> RelayResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| RelayError::ConfigInvalid(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: Arc::new(parking_lot::RwLock::new(Endpoint::from_config(config))),
            store,
        })
    }

    /// Pick up a new backend URL / credentials / timeout after a reload
    pub fn reconfigure(&self, config: &RelayConfig) {
        let next = Endpoint::from_config(config);
        let mut endpoint = self.endpoint.write();
        if *endpoint != next {
            tracing::info!(url = %next.base_url, timeout = ?next.request_timeout, "Backend endpoint updated");
            *endpoint = next;
        }
    }

    pub fn store(&self) -> &OrderStore {
        &self.store
    }

    async fn fetch_page(&self, after: Option<&str>, page: u32) -> RelayResult<Page> {
        let endpoint = self.endpoint.read().clone();
        let url = format!("{}/orders", endpoint.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("status", "processing".to_string()),
            ("per_page", PAGE_SIZE.to_string()),
            ("orderby", "date".to_string()),
            ("order", "asc".to_string()),
            ("page", page.to_string()),
        ];
        if let Some(after) = after {
            query.push(("after", after.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .basic_auth(&endpoint.consumer_key, Some(&endpoint.consumer_secret))
            .timeout(endpoint.request_timeout)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    RelayError::ConfigInvalid(format!("Backend rejected credentials: {status}"))
                }
                _ => RelayError::Fetch(format!("HTTP {status}: {text}")),
            });
        }

        let total_pages = response
            .headers()
            .get(TOTAL_PAGES_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());

        let orders = response
            .json::<Vec<RemoteOrder>>()
            .await
            .map_err(|e| RelayError::Fetch(format!("Invalid order payload: {e}")))?;
        Ok(Page {
            orders,
            total_pages,
        })
    }

    /// All pages matching `after`, oldest first
    async fn fetch_all(&self, after: Option<&str>) -> RelayResult<Vec<RemoteOrder>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let Page {
                orders,
                total_pages,
            } = self.fetch_page(after, page).await?;
            let count = orders.len();
            all.extend(orders);

            let last = match total_pages {
                Some(total) => page >= total,
                None => count < PAGE_SIZE as usize,
            };
            if last || count == 0 {
                break;
            }
            page += 1;
        }
        tracing::debug!(pages = page, count = all.len(), "Fetched order pages");
        Ok(all)
    }
}

#[async_trait]
impl OrderSource for RemoteOrderSource {
    #[tracing::instrument(skip(self))]
    async fn fetch_actionable_since(&self, cursor: Option<i64>) -> RelayResult<Vec<Order>> {
        let after = cursor.and_then(shared::util::millis_to_rfc3339);
        let remote = self.fetch_all(after.as_deref()).await?;
        tracing::debug!(count = remote.len(), "Fetched orders from backend");

        let mut orders = Vec::with_capacity(remote.len());
        for item in remote {
            let order = match item.into_order() {
                Some(order) => order,
                None => {
                    tracing::warn!("Skipping order with unparseable creation date");
                    continue;
                }
            };
            orders.push(self.store.upsert(&order)?);
        }
        Ok(orders)
    }

    async fn get_by_id(&self, id: &str) -> RelayResult<Option<Order>> {
        Ok(self.store.get(id)?)
    }

    async fn mark_printed(&self, id: &str) -> RelayResult<bool> {
        Ok(self.store.mark_printed(id)?)
    }

    async fn mark_notified(&self, id: &str) -> RelayResult<()> {
        if !self.store.mark_notified(id)? {
            tracing::warn!(order_id = %id, "mark_notified on unknown order");
        }
        Ok(())
    }
}

// ========== Wire types ==========

#[derive(Debug, Deserialize)]
struct RemoteOrder {
    id: u64,
    #[serde(default)]
    number: String,
    status: OrderStatus,
    date_created_gmt: String,
    #[serde(default)]
    currency: String,
    #[serde(default)]
    total: String,
    #[serde(default)]
    customer_note: String,
    #[serde(default)]
    payment_method_title: String,
    #[serde(default)]
    billing: Option<RemoteBilling>,
    #[serde(default)]
    shipping_lines: Vec<RemoteShippingLine>,
    #[serde(default)]
    line_items: Vec<RemoteLineItem>,
}

#[derive(Debug, Deserialize)]
struct RemoteBilling {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Debug, Deserialize)]
struct RemoteShippingLine {
    #[serde(default)]
    method_title: String,
}

#[derive(Debug, Deserialize)]
struct RemoteLineItem {
    name: String,
    quantity: i32,
    #[serde(default)]
    total: String,
    #[serde(default)]
    meta_data: Vec<RemoteMeta>,
}

#[derive(Debug, Deserialize)]
struct RemoteMeta {
    #[serde(default)]
    display_key: String,
    #[serde(default)]
    display_value: serde_json::Value,
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse `YYYY-MM-DDTHH:MM:SS` (GMT, no offset) or RFC 3339
fn parse_gmt_millis(s: &str) -> Option<i64> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

impl RemoteOrder {
    fn into_order(self) -> Option<Order> {
        let created_at = parse_gmt_millis(&self.date_created_gmt)?;
        let id = self.id.to_string();
        let number = non_empty(self.number).unwrap_or_else(|| id.clone());

        let customer_name = self
            .billing
            .and_then(|b| non_empty(format!("{} {}", b.first_name, b.last_name)));

        let shipping_method = non_empty(
            self.shipping_lines
                .into_iter()
                .map(|s| s.method_title)
                .collect::<Vec<_>>()
                .join(", "),
        );

        let lines = self
            .line_items
            .into_iter()
            .map(|item| OrderLine {
                name: item.name,
                quantity: item.quantity,
                total: item.total,
                options: item
                    .meta_data
                    .into_iter()
                    .filter(|m| !m.display_key.starts_with('_'))
                    .map(|m| match m.display_value {
                        serde_json::Value::String(v) => format!("{}: {}", m.display_key, v),
                        other => format!("{}: {}", m.display_key, other),
                    })
                    .collect(),
            })
            .collect();

        let mut order = Order::new(id, number, self.status, created_at);
        order.content = OrderContent {
            currency: self.currency,
            total: self.total,
            customer_name,
            customer_note: non_empty(self.customer_note),
            shipping_method,
            payment_method: non_empty(self.payment_method_title),
            lines,
        };
        Some(order)
    }
}
