//! One generation pass over a customer population.
//!
//! For every customer the runner analyses behaviour, asks the oracle for
//! candidates and persists them. Failures are isolated per customer; only the
//! oracle precondition and customer discovery can fail the whole pass.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::behavior::{BehaviorAnalysis, BehaviorAnalyzer};
use crate::clock::Clock;
use crate::config::WorkflowConfig;
use crate::domain::customer::CustomerId;
use crate::domain::recommendation::{RecommendationRecord, RecommendationType};
use crate::errors::ApplicationError;
use crate::ports::{
    CategoryResolver, CustomerDirectory, OrderSource, RecommendationOracle, RecommendationStore,
};

pub const NO_BEHAVIOR_DATA: &str = "no behavior data available";

/// Every collaborator a pass touches, shared between the runner, scheduler and admin surfaces.
#[derive(Clone)]
pub struct Collaborators {
    pub orders: Arc<dyn OrderSource>,
    pub categories: Arc<dyn CategoryResolver>,
    pub directory: Arc<dyn CustomerDirectory>,
    pub oracle: Arc<dyn RecommendationOracle>,
    pub store: Arc<dyn RecommendationStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Clone, Debug)]
pub struct WorkflowSettings {
    pub recommendation_ttl: chrono::Duration,
    pub customer_timeout: Option<Duration>,
    pub max_concurrency: usize,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            recommendation_ttl: chrono::Duration::days(2),
            customer_timeout: None,
            max_concurrency: 1,
        }
    }
}

impl From<&WorkflowConfig> for WorkflowSettings {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            recommendation_ttl: config.recommendation_ttl(),
            customer_timeout: config.customer_timeout(),
            max_concurrency: config.max_concurrency,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    /// `None` or an empty list discovers every customer with a delivered order.
    pub customer_ids: Option<Vec<CustomerId>>,
    pub force_refresh: bool,
    pub allowed_types: Option<BTreeSet<RecommendationType>>,
}

impl WorkflowRequest {
    pub fn all_customers(force_refresh: bool) -> Self {
        Self { customer_ids: None, force_refresh, allowed_types: None }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerFailure {
    pub customer_id: CustomerId,
    pub error: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub run_id: String,
    /// Includes customers skipped because they already hold active recommendations.
    pub processed: Vec<CustomerId>,
    pub failed: Vec<CustomerFailure>,
    pub total_generated: u64,
    pub skipped: u64,
    /// Customers whose (filtered) candidate set came back empty.
    pub without_recommendations: Vec<CustomerId>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("recommendation oracle is not configured")]
    OracleNotConfigured,
    #[error("customer discovery failed: {0}")]
    CustomerDiscovery(ApplicationError),
}

impl From<WorkflowError> for ApplicationError {
    fn from(error: WorkflowError) -> Self {
        match error {
            WorkflowError::OracleNotConfigured => {
                Self::Configuration("recommendation oracle is not configured".to_string())
            }
            WorkflowError::CustomerDiscovery(inner) => inner,
        }
    }
}

enum CustomerOutcome {
    Skipped,
    NoData,
    NoRecommendations,
    Generated(u64),
}

pub struct WorkflowRunner {
    analyzer: BehaviorAnalyzer,
    collaborators: Collaborators,
    settings: WorkflowSettings,
}

impl WorkflowRunner {
    pub fn new(collaborators: Collaborators, settings: WorkflowSettings) -> Self {
        let analyzer = BehaviorAnalyzer::new(
            collaborators.orders.clone(),
            collaborators.categories.clone(),
            collaborators.clock.clone(),
        );
        Self { analyzer, collaborators, settings }
    }

    pub fn oracle_configured(&self) -> bool {
        self.collaborators.oracle.is_configured()
    }

    pub async fn execute(&self, request: WorkflowRequest) -> Result<WorkflowOutcome, WorkflowError> {
        let run_id = Uuid::new_v4().to_string();
        self.execute_with_run_id(request, run_id).await
    }

    pub async fn execute_with_run_id(
        &self,
        request: WorkflowRequest,
        run_id: String,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        if !self.collaborators.oracle.is_configured() {
            warn!(
                event_name = "workflow.run.rejected",
                correlation_id = %run_id,
                "recommendation oracle is not configured; refusing to start pass"
            );
            return Err(WorkflowError::OracleNotConfigured);
        }

        let customers = self.resolve_customers(request.customer_ids.clone()).await?;
        info!(
            event_name = "workflow.run.started",
            correlation_id = %run_id,
            customers = customers.len(),
            force_refresh = request.force_refresh,
            "starting recommendation generation pass"
        );

        let concurrency = self.settings.max_concurrency.max(1);
        let results: Vec<(CustomerId, Result<CustomerOutcome, String>)> = stream::iter(customers)
            .map(|customer_id| {
                let request = &request;
                let run_id = run_id.as_str();
                async move {
                    let outcome = self.run_customer(&customer_id, request, run_id).await;
                    (customer_id, outcome)
                }
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut outcome = WorkflowOutcome { run_id: run_id.clone(), ..WorkflowOutcome::default() };
        for (customer_id, result) in results {
            match result {
                Ok(CustomerOutcome::Skipped) => {
                    outcome.skipped += 1;
                    outcome.processed.push(customer_id);
                }
                Ok(CustomerOutcome::Generated(count)) => {
                    outcome.total_generated += count;
                    outcome.processed.push(customer_id);
                }
                Ok(CustomerOutcome::NoRecommendations) => {
                    outcome.without_recommendations.push(customer_id);
                }
                Ok(CustomerOutcome::NoData) => outcome
                    .failed
                    .push(CustomerFailure { customer_id, error: NO_BEHAVIOR_DATA.to_string() }),
                Err(error) => outcome.failed.push(CustomerFailure { customer_id, error }),
            }
        }

        info!(
            event_name = "workflow.run.completed",
            correlation_id = %run_id,
            processed = outcome.processed.len(),
            failed = outcome.failed.len(),
            skipped = outcome.skipped,
            total_generated = outcome.total_generated,
            "recommendation generation pass completed"
        );
        Ok(outcome)
    }

    async fn resolve_customers(
        &self,
        requested: Option<Vec<CustomerId>>,
    ) -> Result<Vec<CustomerId>, WorkflowError> {
        let customers = match requested {
            Some(ids) if !ids.is_empty() => ids,
            _ => self
                .collaborators
                .orders
                .list_customers_with_completed_orders()
                .await
                .map_err(WorkflowError::CustomerDiscovery)?,
        };
        Ok(customers.into_iter().filter(|id| !id.is_blank()).collect())
    }

    async fn run_customer(
        &self,
        customer_id: &CustomerId,
        request: &WorkflowRequest,
        run_id: &str,
    ) -> Result<CustomerOutcome, String> {
        let work = self.process_customer(customer_id, request, run_id);
        let result = match self.settings.customer_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => Err(ApplicationError::Timeout(format!(
                    "customer processing exceeded {}s",
                    limit.as_secs()
                ))),
            },
            None => work.await,
        };

        result.map_err(|error| {
            warn!(
                event_name = "workflow.customer.failed",
                correlation_id = %run_id,
                customer_id = %customer_id,
                error = %error,
                "customer processing failed"
            );
            error.to_string()
        })
    }

    async fn process_customer(
        &self,
        customer_id: &CustomerId,
        request: &WorkflowRequest,
        run_id: &str,
    ) -> Result<CustomerOutcome, ApplicationError> {
        let store = &self.collaborators.store;
        let clock = &self.collaborators.clock;

        if !request.force_refresh {
            let active = store.find_active_unexpired(customer_id, clock.now()).await?;
            if !active.is_empty() {
                info!(
                    event_name = "workflow.customer.skipped",
                    correlation_id = %run_id,
                    customer_id = %customer_id,
                    active = active.len(),
                    "customer already holds active recommendations"
                );
                return Ok(CustomerOutcome::Skipped);
            }
        }

        let profile = match self.analyzer.analyze(customer_id).await? {
            BehaviorAnalysis::Profile(profile) => profile,
            BehaviorAnalysis::NoData => {
                info!(
                    event_name = "workflow.customer.no_data",
                    correlation_id = %run_id,
                    customer_id = %customer_id,
                    "customer has no delivered orders"
                );
                return Ok(CustomerOutcome::NoData);
            }
        };

        let candidates = self.collaborators.oracle.score(&profile).await?;
        let candidates: Vec<_> = match &request.allowed_types {
            Some(allowed) => candidates
                .into_iter()
                .filter(|candidate| allowed.contains(&candidate.recommendation_type))
                .collect(),
            None => candidates,
        };
        if candidates.is_empty() {
            info!(
                event_name = "workflow.customer.no_recommendations",
                correlation_id = %run_id,
                customer_id = %customer_id,
                "oracle produced no usable candidates"
            );
            return Ok(CustomerOutcome::NoRecommendations);
        }

        let contact = match self.collaborators.directory.basic_info(customer_id).await {
            Ok(contact) => contact,
            Err(error) => {
                warn!(
                    event_name = "workflow.customer.contact_lookup_failed",
                    correlation_id = %run_id,
                    customer_id = %customer_id,
                    error = %error,
                    "continuing without contact snapshot"
                );
                None
            }
        };

        let now = clock.now();
        let mut records = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let kind = candidate.recommendation_type;
            match RecommendationRecord::from_candidate(
                &profile,
                candidate,
                contact.as_ref(),
                now,
                self.settings.recommendation_ttl,
            ) {
                Ok(record) => records.push(record),
                Err(error) => warn!(
                    event_name = "workflow.candidate.discarded",
                    correlation_id = %run_id,
                    customer_id = %customer_id,
                    recommendation_type = kind.as_str(),
                    error = %error,
                    "discarding invalid candidate"
                ),
            }
        }
        if records.is_empty() {
            return Ok(CustomerOutcome::NoRecommendations);
        }

        // Old active set must be expired before the replacement is visible.
        if request.force_refresh {
            let expired = store.expire_active(Some(customer_id), now).await?;
            if expired > 0 {
                info!(
                    event_name = "workflow.customer.refreshed",
                    correlation_id = %run_id,
                    customer_id = %customer_id,
                    expired,
                    "expired previous active recommendations"
                );
            }
        }

        let mut inserted = 0_u64;
        for record in records {
            store.insert(record).await?;
            inserted += 1;
        }

        info!(
            event_name = "workflow.customer.completed",
            correlation_id = %run_id,
            customer_id = %customer_id,
            inserted,
            "saved recommendations"
        );
        Ok(CustomerOutcome::Generated(inserted))
    }
}
