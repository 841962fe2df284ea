//! Blocking client for the Printify REST API.

use crate::credentials::Credentials;
use crate::error::{CbgError, Result};
use crate::resolver::ArtworkSource;
use crate::retry::{is_transient, BackoffPolicy, RetryPolicy};
use crate::synth::CreateProductPayload;
use crate::types::{Blueprint, Product, ProductPage, UploadedImage};
use base64::Engine as _;
use reqwest::blocking::{Client, Response};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const PAGE_LIMIT: u32 = 50;

/// Shop-admin link for a product.
pub fn product_admin_url(shop_id: &str, product_id: &str) -> String {
    format!("https://printify.com/app/store/{shop_id}/products/{product_id}")
}

// ---------------------------------------------------------------------------
// BlueprintCache
// ---------------------------------------------------------------------------

/// Blueprint lookups keyed by id, owned by the caller for the length of a run.
#[derive(Debug, Default)]
pub struct BlueprintCache {
    entries: HashMap<u64, Blueprint>,
}

impl BlueprintCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u64) -> Option<&Blueprint> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fields accepted by `PUT /shops/{shop}/products/{id}.json`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProductUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ProductUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }
}

// ---------------------------------------------------------------------------
// PrintifyClient
// ---------------------------------------------------------------------------

pub struct PrintifyClient {
    http: Client,
    base_url: String,
    shop_id: String,
    credentials: Credentials,
    retry: RetryPolicy,
}

impl PrintifyClient {
    pub fn new(credentials: Credentials, shop_id: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            shop_id: shop_id.into(),
            credentials,
            retry: RetryPolicy::default(),
        })
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn shop_id(&self) -> &str {
        &self.shop_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn shop_url(&self, path: &str) -> String {
        self.url(&format!("shops/{}/{}", self.shop_id, path.trim_start_matches('/')))
    }

    /// Send a JSON request, retrying server errors per the retry policy.
    fn send<T: DeserializeOwned>(&self, method: Method, url: &str, body: Option<&Value>) -> Result<T> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            let mut req = self
                .http
                .request(method.clone(), url)
                .bearer_auth(self.credentials.token());
            if let Some(b) = body {
                req = req.json(b);
            }
            debug!(%method, url, attempt, "printify request");
            let resp = req.send()?;
            let status = resp.status().as_u16();

            if resp.status().is_success() {
                return Ok(resp.json::<T>()?);
            }

            let text = body_text(resp);
            if is_transient(status) && attempt < attempts {
                let delay = self.retry.delay_for_attempt(attempt);
                warn!(status, attempt, ?delay, url, "transient server error; retrying");
                std::thread::sleep(delay);
                attempt += 1;
                continue;
            }
            if is_transient(status) {
                return Err(CbgError::Transient {
                    status,
                    attempts,
                    body: text,
                });
            }
            return Err(CbgError::Rejected { status, body: text });
        }
    }

    // -- products -----------------------------------------------------------

    pub fn get_product(&self, product_id: &str) -> Result<Product> {
        let url = self.shop_url(&format!("products/{product_id}.json"));
        self.send(Method::GET, &url, None).map_err(|e| match e {
            CbgError::Rejected { status: 404, .. } => CbgError::ProductNotFound(product_id.to_string()),
            other => other,
        })
    }

    /// Every product in the shop, across all pages.
    pub fn list_products(&self) -> Result<Vec<Product>> {
        let mut out = Vec::new();
        let mut page = 1;
        loop {
            let url = self.shop_url(&format!("products.json?page={page}&limit={PAGE_LIMIT}"));
            let batch: ProductPage = self.send(Method::GET, &url, None)?;
            let done = batch.data.is_empty() || batch.current_page >= batch.last_page;
            out.extend(batch.data);
            if done {
                break;
            }
            page += 1;
        }
        debug!(count = out.len(), "listed products");
        Ok(out)
    }

    pub fn list_templates(&self) -> Result<Vec<Product>> {
        Ok(self
            .list_products()?
            .into_iter()
            .filter(Product::is_template)
            .collect())
    }

    pub fn create_product(&self, payload: &CreateProductPayload) -> Result<Product> {
        let url = self.shop_url("products.json");
        let body = serde_json::to_value(payload)?;
        let product: Product = self.send(Method::POST, &url, Some(&body))?;
        info!(id = %product.id, title = %product.title, "product created");
        Ok(product)
    }

    pub fn update_product(&self, product_id: &str, update: &ProductUpdate) -> Result<Product> {
        if update.is_empty() {
            return Err(CbgError::InvalidArgument("update has no fields".to_string()));
        }
        let url = self.shop_url(&format!("products/{product_id}.json"));
        let body = serde_json::to_value(update)?;
        self.send(Method::PUT, &url, Some(&body)).map_err(|e| match e {
            CbgError::Rejected { status: 404, .. } => CbgError::ProductNotFound(product_id.to_string()),
            other => other,
        })
    }

    // -- media --------------------------------------------------------------

    /// Upload artwork to the media library, returning the new image id.
    /// Remote artwork is fetched by Printify; local files go up base64-encoded.
    pub fn upload_image(&self, source: &ArtworkSource, file_name: &str) -> Result<String> {
        let body = match source {
            ArtworkSource::Remote(url) => serde_json::json!({
                "file_name": file_name,
                "url": url,
            }),
            ArtworkSource::Local(path) => {
                let bytes = std::fs::read(path).map_err(|e| CbgError::Upload {
                    source_ref: source.to_string(),
                    reason: e.to_string(),
                })?;
                serde_json::json!({
                    "file_name": file_name,
                    "contents": base64::engine::general_purpose::STANDARD.encode(bytes),
                })
            }
        };
        info!(%source, file_name, "uploading artwork");
        let url = self.url("uploads/images.json");
        let uploaded: UploadedImage =
            self.send(Method::POST, &url, Some(&body))
                .map_err(|e| CbgError::Upload {
                    source_ref: source.to_string(),
                    reason: e.to_string(),
                })?;
        info!(id = %uploaded.id, "artwork uploaded");
        Ok(uploaded.id)
    }

    // -- catalog ------------------------------------------------------------

    pub fn get_blueprint(&self, blueprint_id: u64, cache: &mut BlueprintCache) -> Result<Blueprint> {
        if let Some(hit) = cache.get(blueprint_id) {
            return Ok(hit.clone());
        }
        let url = self.url(&format!("catalog/blueprints/{blueprint_id}.json"));
        let blueprint: Blueprint = self.send(Method::GET, &url, None)?;
        cache.entries.insert(blueprint_id, blueprint.clone());
        Ok(blueprint)
    }
}

fn body_text(resp: Response) -> String {
    resp.text().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
