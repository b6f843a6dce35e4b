//! Marketplace REST client.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use spot_core::{InstanceId, Offer, OfferId};

use crate::error::{MarketError, MarketResult};

/// GPU memory floor (GB) applied to every offer search.
const GPU_RAM_FLOOR: u32 = 4;

/// Disk allocation (GB) requested with every bid. Must be non-zero.
const INSTANCE_DISK_GB: u32 = 32;

/// Parameters for a bid on an offer.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub image: String,
    /// Shell command run when the instance boots.
    pub onstart: String,
    pub env: HashMap<String, String>,
}

/// A successfully provisioned instance.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedInstance {
    /// Contract id assigned by the marketplace; identifies the
    /// instance from here on.
    #[serde(rename = "new_contract")]
    pub instance_id: InstanceId,
}

/// The marketplace operations the fleet manager needs.
///
/// `MarketClient` is the production implementation; tests drive the
/// fleet against scripted fakes.
#[async_trait]
pub trait Marketplace: Send + Sync {
    /// Offers rentable under the price ceiling, ascending by price then
    /// total compute.
    async fn search_offers(&self, price_ceiling: f64) -> MarketResult<Vec<Offer>>;

    /// Bid on an offer. `RejectedOffer` means the offer is gone and the
    /// caller should move to the next one.
    async fn create_instance(
        &self,
        offer_id: OfferId,
        req: &CreateRequest,
    ) -> MarketResult<CreatedInstance>;

    /// Destroy an instance. Non-2xx surfaces as `Network`; callers on
    /// shutdown paths log and continue.
    async fn destroy_instance(&self, instance_id: InstanceId) -> MarketResult<()>;
}

#[derive(Debug, Deserialize)]
struct OfferWire {
    id: OfferId,
    #[serde(rename = "dph_total")]
    price_per_hour: f64,
    #[serde(default)]
    gpu_ram: f64,
    #[serde(default)]
    total_flops: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    offers: Vec<OfferWire>,
}

#[derive(Debug, Serialize)]
struct CreateBody<'a> {
    client_id: &'static str,
    image: &'a str,
    env: &'a HashMap<String, String>,
    disk: u32,
    onstart: &'a str,
    runtype: &'static str,
}

/// Typed HTTP client for the marketplace REST surface.
///
/// Bearer-token header auth on every call; mutating calls also carry
/// the key as a query parameter, as the marketplace accepts both.
#[derive(Clone)]
pub struct MarketClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MarketClient {
    /// `base_url` is the REST root without a trailing slash, e.g.
    /// `https://console.vast.ai/api/v0`.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn search_query(price_ceiling: f64) -> String {
        serde_json::json!({
            "gpu_ram": format!(">={GPU_RAM_FLOOR}"),
            "rentable": {"eq": true},
            "dph_total": {"lte": price_ceiling},
            "sort_option": {"0": ["dph_total", "asc"], "1": ["total_flops", "asc"]},
        })
        .to_string()
    }

    /// Request the instance's recent log output.
    ///
    /// Two round trips: one to ask the marketplace to stage the log,
    /// one to fetch it from the returned URL. Any non-2xx yields `None`.
    pub async fn request_instance_log(&self, instance_id: InstanceId) -> Option<String> {
        #[derive(Deserialize)]
        struct LogStaged {
            result_url: String,
        }

        let url = format!("{}/instances/request_logs/{}/", self.base_url, instance_id);
        let staged = self
            .http
            .put(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({"tail": "1000"}))
            .send()
            .await
            .ok()?;
        if !staged.status().is_success() {
            return None;
        }
        let staged: LogStaged = staged.json().await.ok()?;

        let log = self.http.get(&staged.result_url).send().await.ok()?;
        if !log.status().is_success() {
            return None;
        }
        log.text().await.ok()
    }
}

#[async_trait]
impl Marketplace for MarketClient {
    async fn search_offers(&self, price_ceiling: f64) -> MarketResult<Vec<Offer>> {
        let url = format!("{}/bundles/", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("q", Self::search_query(price_ceiling))])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MarketError::Network(format!(
                "offer search returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| MarketError::Decode(e.to_string()))?;

        let mut offers: Vec<Offer> = body
            .offers
            .into_iter()
            .map(|w| Offer {
                id: w.id,
                price_per_hour: w.price_per_hour,
                gpu_ram: w.gpu_ram,
                total_flops: w.total_flops,
            })
            .filter(|o| o.price_per_hour <= price_ceiling)
            .collect();
        // The server sorts, but the walk order matters enough to not
        // trust it.
        offers.sort_by(|a, b| {
            a.price_per_hour
                .total_cmp(&b.price_per_hour)
                .then(a.total_flops.total_cmp(&b.total_flops))
        });

        debug!(count = offers.len(), price_ceiling, "offer search complete");
        Ok(offers)
    }

    async fn create_instance(
        &self,
        offer_id: OfferId,
        req: &CreateRequest,
    ) -> MarketResult<CreatedInstance> {
        let url = format!("{}/asks/{}/", self.base_url, offer_id);
        let body = CreateBody {
            client_id: "me",
            image: &req.image,
            env: &req.env,
            disk: INSTANCE_DISK_GB,
            onstart: &req.onstart,
            runtype: "ssh ssh_proxy",
        };

        let response = self
            .http
            .put(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::NOT_FOUND {
            let reason = response.text().await.unwrap_or_default();
            return Err(MarketError::RejectedOffer { offer_id, reason });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketError::Provisioning(format!("{status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| MarketError::Decode(e.to_string()))
    }

    async fn destroy_instance(&self, instance_id: InstanceId) -> MarketResult<()> {
        let url = format!("{}/instances/{}/", self.base_url, instance_id);
        let response = self
            .http
            .delete(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| MarketError::Network(e.to_string()))?;

        if !response.status().is_success() {
            warn!(instance_id, status = %response.status(), "instance destroy returned non-2xx");
            return Err(MarketError::Network(format!(
                "destroy returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::{delete, get, put};
    use axum::{Json, Router};

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn offers_fixture() -> serde_json::Value {
        serde_json::json!({
            "offers": [
                {"id": 2, "dph_total": 0.05, "gpu_ram": 24.0, "total_flops": 40.0},
                {"id": 1, "dph_total": 0.02, "gpu_ram": 8.0, "total_flops": 12.0},
                {"id": 3, "dph_total": 0.05, "gpu_ram": 16.0, "total_flops": 20.0},
            ]
        })
    }

    #[tokio::test]
    async fn search_sorts_by_price_then_flops() {
        let app = Router::new().route(
            "/bundles/",
            get(|| async { Json(offers_fixture()) }),
        );
        let base = spawn(app).await;

        let client = MarketClient::new(base, "test-key");
        let offers = client.search_offers(0.10).await.unwrap();

        let ids: Vec<_> = offers.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[tokio::test]
    async fn search_filters_offers_above_ceiling() {
        let app = Router::new().route(
            "/bundles/",
            get(|| async { Json(offers_fixture()) }),
        );
        let base = spawn(app).await;

        let client = MarketClient::new(base, "test-key");
        let offers = client.search_offers(0.03).await.unwrap();
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].id, 1);

        // A ceiling below every offer yields an empty result, not an error.
        let none = client.search_offers(0.01).await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn search_non_2xx_is_a_network_error() {
        let app = Router::new().route(
            "/bundles/",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = spawn(app).await;

        let client = MarketClient::new(base, "test-key");
        assert!(matches!(
            client.search_offers(0.10).await,
            Err(MarketError::Network(_))
        ));
    }

    #[tokio::test]
    async fn search_connection_refused_is_a_network_error() {
        let client = MarketClient::new("http://127.0.0.1:1", "test-key");
        assert!(matches!(
            client.search_offers(0.10).await,
            Err(MarketError::Network(_))
        ));
    }

    fn create_request() -> CreateRequest {
        CreateRequest {
            image: "acme/spotgrid-worker:latest".to_string(),
            onstart: "spotgridd worker".to_string(),
            env: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn create_returns_contract_id() {
        let app = Router::new().route(
            "/asks/{id}/",
            put(|Path(id): Path<u64>| async move {
                Json(serde_json::json!({"success": true, "new_contract": id * 100}))
            }),
        );
        let base = spawn(app).await;

        let client = MarketClient::new(base, "test-key");
        let created = client.create_instance(7, &create_request()).await.unwrap();
        assert_eq!(created.instance_id, 700);
    }

    #[tokio::test]
    async fn create_404_maps_to_rejected_offer() {
        let app = Router::new().route(
            "/asks/{id}/",
            put(|| async { (StatusCode::NOT_FOUND, "no longer available") }),
        );
        let base = spawn(app).await;

        let client = MarketClient::new(base, "test-key");
        let err = client.create_instance(7, &create_request()).await.unwrap_err();
        assert!(err.is_rejected_offer());
    }

    #[tokio::test]
    async fn create_5xx_maps_to_provisioning_error() {
        let app = Router::new().route(
            "/asks/{id}/",
            put(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "capacity") }),
        );
        let base = spawn(app).await;

        let client = MarketClient::new(base, "test-key");
        assert!(matches!(
            client.create_instance(7, &create_request()).await,
            Err(MarketError::Provisioning(_))
        ));
    }

    #[tokio::test]
    async fn destroy_success_and_failure() {
        let app = Router::new().route(
            "/instances/{id}/",
            delete(|Path(id): Path<u64>| async move {
                if id == 1 {
                    StatusCode::OK
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            }),
        );
        let base = spawn(app).await;

        let client = MarketClient::new(base, "test-key");
        assert!(client.destroy_instance(1).await.is_ok());
        assert!(client.destroy_instance(2).await.is_err());
    }
}
