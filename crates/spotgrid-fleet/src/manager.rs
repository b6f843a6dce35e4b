//! The fleet manager.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use spot_core::NodeHandle;
use spotgrid_market::{CreateRequest, Marketplace};

use crate::error::{FleetError, FleetResult};

/// Retry and pacing constants for a rental run.
#[derive(Debug, Clone)]
pub struct RentPolicy {
    /// Bounded attempts for the offer search.
    pub search_attempts: u32,
    /// Fixed delay between failed searches.
    pub search_retry_delay: Duration,
    /// Pacing delay before each bid.
    pub bid_pause: Duration,
    /// Delay before the single destroy retry during termination.
    pub destroy_retry_delay: Duration,
    /// Consecutive provisioning-aborted passes with no progress before
    /// the rental gives up with a partial result.
    pub max_aborted_passes: u32,
}

impl Default for RentPolicy {
    fn default() -> Self {
        Self {
            search_attempts: 10,
            search_retry_delay: Duration::from_secs(5),
            bid_pause: Duration::from_secs(5),
            destroy_retry_delay: Duration::from_secs(5),
            max_aborted_passes: 3,
        }
    }
}

impl RentPolicy {
    /// All delays zeroed, for tests.
    pub fn immediate() -> Self {
        Self {
            search_attempts: 10,
            search_retry_delay: Duration::ZERO,
            bid_pause: Duration::ZERO,
            destroy_retry_delay: Duration::ZERO,
            max_aborted_passes: 3,
        }
    }
}

/// What to rent and what to run on it.
#[derive(Debug, Clone)]
pub struct RentRequest {
    /// Price ceiling in dollars per hour.
    pub price_ceiling: f64,
    /// Target node count; fewer is returned when the marketplace runs
    /// dry, and that is not an error.
    pub max_nodes: usize,
    /// Docker image for the worker.
    pub image: String,
    /// Worker startup command; a default is synthesized when `None`.
    pub command: Option<String>,
    /// Environment exported to the worker process.
    pub env: HashMap<String, String>,
}

impl RentRequest {
    fn create_request(&self) -> CreateRequest {
        let command = self
            .command
            .clone()
            .unwrap_or_else(|| "spotgridd worker --concurrency 1".to_string());
        CreateRequest {
            image: self.image.clone(),
            // The image drops us in an unpredictable cwd.
            onstart: format!("export PATH=$PATH:/ && cd ../ && {command}"),
            env: self.env.clone(),
        }
    }
}

/// Rents nodes under a price ceiling and guarantees their termination.
///
/// Cloneable; clones share the roster.
#[derive(Clone)]
pub struct FleetManager {
    market: Arc<dyn Marketplace>,
    policy: RentPolicy,
    /// Nodes rented by this manager and not yet destroyed.
    roster: Arc<Mutex<Vec<NodeHandle>>>,
}

impl FleetManager {
    pub fn new(market: Arc<dyn Marketplace>, policy: RentPolicy) -> Self {
        Self {
            market,
            policy,
            roster: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Rent up to `req.max_nodes` nodes.
    ///
    /// Walks offers ascending by price; a rejected offer moves on to
    /// the next one, any other creation failure abandons the remaining
    /// offers in this batch and re-searches. The rental ends when the
    /// target count is reached, when a completed pass over fresh offers
    /// yields no new rentals (marketplace exhaustion), or when
    /// provisioning keeps aborting passes without progress. Returning
    /// fewer nodes than requested is not an error.
    pub async fn rent_nodes(&self, req: &RentRequest) -> FleetResult<Vec<NodeHandle>> {
        let mut rented: Vec<NodeHandle> = Vec::new();
        let create_req = req.create_request();
        let mut aborted_streak = 0u32;

        while rented.len() < req.max_nodes {
            let offers = self.search_with_retry(req.price_ceiling).await?;
            let before = rented.len();
            let mut aborted = false;

            for offer in &offers {
                if rented.len() >= req.max_nodes {
                    break;
                }
                tokio::time::sleep(self.policy.bid_pause).await;

                match self.market.create_instance(offer.id, &create_req).await {
                    Ok(created) => {
                        let node = NodeHandle {
                            offer_id: offer.id,
                            instance_id: created.instance_id,
                        };
                        info!(
                            offer_id = offer.id,
                            instance_id = node.instance_id,
                            price = offer.price_per_hour,
                            "node rented"
                        );
                        self.roster.lock().await.push(node.clone());
                        rented.push(node);
                    }
                    Err(e) if e.is_rejected_offer() => {
                        debug!(offer_id = offer.id, "offer unavailable, trying next");
                    }
                    Err(e) => {
                        warn!(offer_id = offer.id, error = %e, "bid failed, searching for fresh offers");
                        aborted = true;
                        break;
                    }
                }
            }

            if rented.len() >= req.max_nodes {
                break;
            }

            if aborted {
                // An aborted batch re-searches, but not forever when no
                // node has been rented along the way.
                aborted_streak = if rented.len() == before {
                    aborted_streak + 1
                } else {
                    0
                };
                if aborted_streak >= self.policy.max_aborted_passes {
                    warn!(
                        rented = rented.len(),
                        requested = req.max_nodes,
                        "provisioning keeps failing, stopping node rental"
                    );
                    break;
                }
                continue;
            }
            aborted_streak = 0;

            if rented.len() == before {
                warn!(
                    rented = rented.len(),
                    requested = req.max_nodes,
                    "no more offers available, stopping node rental"
                );
                break;
            }
        }

        Ok(rented)
    }

    async fn search_with_retry(&self, price_ceiling: f64) -> FleetResult<Vec<spot_core::Offer>> {
        let attempts = self.policy.search_attempts.max(1);
        let mut last = None;
        for attempt in 1..=attempts {
            match self.market.search_offers(price_ceiling).await {
                Ok(offers) => return Ok(offers),
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "offer search failed, retrying");
                    last = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.search_retry_delay).await;
                    }
                }
            }
        }
        Err(FleetError::SearchExhausted {
            attempts,
            // Loop body ran at least once, so `last` is set.
            last: last.unwrap_or_else(|| {
                spotgrid_market::MarketError::Network("no search attempted".into())
            }),
        })
    }

    /// Destroy the given nodes, independently.
    ///
    /// One failed destroy is retried once after a short delay; a node
    /// that still cannot be destroyed is logged and skipped so the rest
    /// of the fleet still comes down. Destroyed nodes are removed from
    /// the roster.
    pub async fn terminate_nodes(&self, nodes: &[NodeHandle]) {
        for node in nodes {
            let destroyed = match self.market.destroy_instance(node.instance_id).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(instance_id = node.instance_id, error = %e, "destroy failed, retrying once");
                    tokio::time::sleep(self.policy.destroy_retry_delay).await;
                    match self.market.destroy_instance(node.instance_id).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!(instance_id = node.instance_id, error = %e, "could not destroy instance");
                            false
                        }
                    }
                }
            };
            if destroyed {
                info!(instance_id = node.instance_id, "node terminated");
            }
            self.roster.lock().await.retain(|n| n != node);
        }
    }

    /// Destroy every node this manager still owns. Wired to shutdown
    /// paths; draining the roster first keeps the destroy-exactly-once
    /// invariant when both an explicit terminate and the shutdown hook
    /// run.
    pub async fn terminate_all(&self) {
        let nodes: Vec<NodeHandle> = self.roster.lock().await.drain(..).collect();
        if nodes.is_empty() {
            return;
        }
        info!(count = nodes.len(), "terminating fleet");
        for node in &nodes {
            if let Err(e) = self.market.destroy_instance(node.instance_id).await {
                warn!(instance_id = node.instance_id, error = %e, "destroy failed, retrying once");
                tokio::time::sleep(self.policy.destroy_retry_delay).await;
                if let Err(e) = self.market.destroy_instance(node.instance_id).await {
                    warn!(instance_id = node.instance_id, error = %e, "could not destroy instance");
                }
            }
        }
    }

    /// Nodes currently on the roster.
    pub async fn active_nodes(&self) -> Vec<NodeHandle> {
        self.roster.lock().await.clone()
    }
}
