//! Oracle construction from config, plus the LLM adapter.
//!
//! `build_oracle` only knows the config-selectable oracles. No `LlmClient`
//! ships with this workspace; embedders implement it for their provider and
//! wrap it in [`LlmRecommendationOracle`] when wiring [`Collaborators`] by hand.
//!
//! [`Collaborators`]: reengage_core::workflow::Collaborators

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use reengage_core::config::{OracleConfig, OracleKind};
use reengage_core::domain::profile::CustomerBehaviorProfile;
use reengage_core::domain::recommendation::RecommendationCandidate;
use reengage_core::errors::ApplicationError;
use reengage_core::ports::{PortResult, RecommendationOracle};

use crate::decode::{decode_products, decode_recommendations};
use crate::heuristic::HeuristicOracle;
use crate::llm::LlmClient;
use crate::prompt::{render_analysis_prompt, render_product_prompt};

pub fn build_oracle(config: &OracleConfig) -> Arc<dyn RecommendationOracle> {
    match config.kind {
        OracleKind::Heuristic => Arc::new(HeuristicOracle::new(config.max_candidates)),
        OracleKind::Disabled => Arc::new(DisabledOracle),
    }
}

/// Stands in when no scoring backend is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisabledOracle;

#[async_trait]
impl RecommendationOracle for DisabledOracle {
    fn is_configured(&self) -> bool {
        false
    }

    async fn score(
        &self,
        _profile: &CustomerBehaviorProfile,
    ) -> PortResult<Vec<RecommendationCandidate>> {
        Err(ApplicationError::Configuration("no recommendation oracle is configured".to_string()))
    }
}

pub struct LlmRecommendationOracle<C> {
    client: C,
    max_candidates: usize,
    product_suggestions: bool,
}

impl<C: LlmClient> LlmRecommendationOracle<C> {
    pub fn new(client: C) -> Self {
        Self { client, max_candidates: 3, product_suggestions: false }
    }

    pub fn with_max_candidates(mut self, max_candidates: usize) -> Self {
        self.max_candidates = max_candidates.max(1);
        self
    }

    /// Asks for concrete product types once per decoded candidate.
    pub fn with_product_suggestions(mut self, enabled: bool) -> Self {
        self.product_suggestions = enabled;
        self
    }

    async fn suggest_products(
        &self,
        profile: &CustomerBehaviorProfile,
        candidate: &mut RecommendationCandidate,
    ) {
        let prompt = render_product_prompt(profile, candidate.recommendation_type);
        let suggestions = match self.client.complete(&prompt).await {
            Ok(reply) => decode_products(&reply).map_err(|error| error.to_string()),
            Err(error) => Err(error.to_string()),
        };
        match suggestions {
            Ok(products) => candidate.analysis.recommended_products = products,
            Err(error) => warn!(
                event_name = "oracle.products.failed",
                correlation_id = %profile.customer_id,
                customer_id = %profile.customer_id,
                recommendation_type = candidate.recommendation_type.as_str(),
                error = %error,
                "product suggestions unavailable"
            ),
        }
    }
}

#[async_trait]
impl<C: LlmClient> RecommendationOracle for LlmRecommendationOracle<C> {
    fn is_configured(&self) -> bool {
        self.client.is_ready()
    }

    async fn score(
        &self,
        profile: &CustomerBehaviorProfile,
    ) -> PortResult<Vec<RecommendationCandidate>> {
        let prompt = render_analysis_prompt(profile);
        let reply = self
            .client
            .complete(&prompt)
            .await
            .map_err(|error| ApplicationError::Integration(format!("completion failed: {error}")))?;

        let mut candidates = match decode_recommendations(&reply, profile.customer_id.as_str()) {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(
                    event_name = "oracle.reply.undecodable",
                    correlation_id = %profile.customer_id,
                    customer_id = %profile.customer_id,
                    error = %error,
                    "oracle reply could not be decoded"
                );
                return Ok(Vec::new());
            }
        };
        candidates.truncate(self.max_candidates);

        if self.product_suggestions {
            for candidate in &mut candidates {
                self.suggest_products(profile, candidate).await;
            }
        }
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use reengage_core::config::{OracleConfig, OracleKind};
    use reengage_core::domain::customer::CustomerId;
    use reengage_core::domain::order::ProductId;
    use reengage_core::domain::profile::{CustomerBehaviorProfile, OrderTrends};
    use reengage_core::domain::recommendation::RecommendationType;
    use reengage_core::errors::ApplicationError;
    use reengage_core::ports::RecommendationOracle;

    use super::{build_oracle, LlmRecommendationOracle};
    use crate::llm::LlmClient;

    /// Replays queued replies in order and records every prompt it was sent.
    struct ScriptedClient {
        ready: bool,
        replies: Mutex<VecDeque<Result<String, String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<Result<&str, &str>>) -> Self {
            Self {
                ready: true,
                replies: Mutex::new(
                    replies
                        .into_iter()
                        .map(|reply| reply.map(str::to_string).map_err(str::to_string))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn is_ready(&self) -> bool {
            self.ready
        }

        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().expect("prompts lock").push(prompt.to_string());
            let next = self.replies.lock().expect("replies lock").pop_front();
            match next {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(anyhow!(message)),
                None => Err(anyhow!("script exhausted")),
            }
        }
    }

    fn profile() -> CustomerBehaviorProfile {
        CustomerBehaviorProfile {
            customer_id: CustomerId::new("cust-llm"),
            total_spent: Decimal::from(420),
            order_count: 2,
            average_order_value: Decimal::from(210),
            last_order_date: None,
            days_since_last_order: Some(75),
            purchase_frequency: Decimal::ONE,
            favorite_categories: Vec::new(),
            customer_lifetime_value: Decimal::from(2_520),
            order_trends: OrderTrends::default(),
        }
    }

    const TWO_CANDIDATES: &str = r#"{"recommendations": [
        {"recommendation_type": "churn_risk", "priority_score": 72,
         "reasons": ["gap is growing"], "suggested_actions": ["send a reminder"]},
        {"recommendation_type": "upsell", "priority_score": 35,
         "reasons": ["large baskets"], "suggested_actions": ["show premium sofas"]}
    ]}"#;

    #[tokio::test]
    async fn decoded_candidates_are_truncated_to_limit() {
        let client = ScriptedClient::new(vec![Ok(TWO_CANDIDATES)]);
        let oracle = LlmRecommendationOracle::new(client).with_max_candidates(1);

        let candidates = oracle.score(&profile()).await.expect("score");

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].recommendation_type, RecommendationType::ChurnRisk);
        let prompts = oracle.client.prompts.lock().expect("prompts lock");
        assert!(prompts[0].contains("Customer ID: cust-llm"));
    }

    #[tokio::test]
    async fn completion_error_is_an_integration_failure() {
        let oracle = LlmRecommendationOracle::new(ScriptedClient::new(vec![Err("rate limited")]));

        let error = oracle.score(&profile()).await.expect_err("should fail");

        assert!(matches!(error, ApplicationError::Integration(message) if message.contains("rate limited")));
    }

    #[tokio::test]
    async fn undecodable_reply_yields_no_candidates() {
        let oracle =
            LlmRecommendationOracle::new(ScriptedClient::new(vec![Ok("Sorry, I can't do that.")]));
        assert!(oracle.score(&profile()).await.expect("score").is_empty());
    }

    #[tokio::test]
    async fn product_suggestions_fill_or_fall_back_to_empty() {
        let client = ScriptedClient::new(vec![
            Ok(TWO_CANDIDATES),
            Ok(r#"{"products": ["velvet sofa", "ottoman"]}"#),
            Err("timeout"),
        ]);
        let oracle = LlmRecommendationOracle::new(client).with_product_suggestions(true);

        let candidates = oracle.score(&profile()).await.expect("score");

        assert_eq!(
            candidates[0].analysis.recommended_products,
            vec![ProductId("velvet sofa".to_string()), ProductId("ottoman".to_string())]
        );
        assert!(candidates[1].analysis.recommended_products.is_empty());
        let prompts = oracle.client.prompts.lock().expect("prompts lock");
        assert_eq!(prompts.len(), 3);
        assert!(prompts[2].contains("Recommendation Type: upsell"));
    }

    #[test]
    fn readiness_follows_the_client() {
        let mut client = ScriptedClient::new(Vec::new());
        client.ready = false;
        assert!(!LlmRecommendationOracle::new(client).is_configured());
    }

    #[tokio::test]
    async fn configured_kind_selects_the_oracle() {
        let heuristic = build_oracle(&OracleConfig { kind: OracleKind::Heuristic, max_candidates: 2 });
        assert!(heuristic.is_configured());

        let disabled = build_oracle(&OracleConfig { kind: OracleKind::Disabled, max_candidates: 2 });
        assert!(!disabled.is_configured());
        assert!(matches!(
            disabled.score(&profile()).await,
            Err(ApplicationError::Configuration(_))
        ));
    }
}
