//! Tolerant decoding of model replies into recommendation candidates.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use reengage_core::domain::order::ProductId;
use reengage_core::domain::recommendation::{
    CandidateAnalysis, EngagementLevel, FrequencyLabel, InsightOverrides, RecommendationCandidate,
    RecommendationType, MAX_PRIORITY_SCORE,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("reply contains no JSON object")]
    NoJson,
    #[error("reply has no `{0}` array")]
    MissingField(&'static str),
}

/// Parses the reply after stripping markdown fences, falling back to the outermost `{...}` span.
pub fn extract_json(raw: &str) -> Result<Value, DecodeError> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    if let Ok(value) = serde_json::from_str::<Value>(cleaned.trim()) {
        return Ok(value);
    }

    let start = raw.find('{').ok_or(DecodeError::NoJson)?;
    let end = raw.rfind('}').ok_or(DecodeError::NoJson)?;
    if end <= start {
        return Err(DecodeError::NoJson);
    }
    serde_json::from_str(&raw[start..=end]).map_err(|_| DecodeError::NoJson)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn text(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(str::trim).filter(|text| !text.is_empty()).map(str::to_string)
}

fn field<'a>(section: Option<&'a Value>, name: &str) -> Option<&'a Value> {
    section.and_then(|section| section.get(name))
}

fn score(value: Option<&Value>) -> Option<u8> {
    let raw = match value? {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    Some(raw.round().clamp(0.0, f64::from(MAX_PRIORITY_SCORE)) as u8)
}

/// One candidate, or the reason it was rejected.
pub fn decode_candidate(value: &Value) -> Result<RecommendationCandidate, String> {
    let kind = value
        .get("recommendation_type")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing recommendation_type".to_string())?;
    let recommendation_type = RecommendationType::parse(kind)
        .ok_or_else(|| format!("unknown recommendation_type `{kind}`"))?;
    let priority_score =
        score(value.get("priority_score")).ok_or_else(|| "priority_score is not numeric".to_string())?;

    let reasons = string_list(value.get("reasons"));
    if reasons.is_empty() {
        return Err("no reasons".to_string());
    }
    let suggested_actions = string_list(value.get("suggested_actions"));
    if suggested_actions.is_empty() {
        return Err("no suggested_actions".to_string());
    }

    let insights = value.get("customer_insights");
    let analysis = value.get("ai_analysis");

    Ok(RecommendationCandidate {
        recommendation_type,
        priority_score,
        reasons,
        suggested_actions,
        insights: InsightOverrides {
            purchase_frequency_label: text(field(insights, "purchase_frequency"))
                .and_then(|label| FrequencyLabel::parse(&label)),
            churn_risk_score: score(field(insights, "churn_risk_score")),
        },
        analysis: CandidateAnalysis {
            behavioral_pattern: text(field(analysis, "behavioral_pattern")).unwrap_or_default(),
            engagement_level: text(field(insights, "engagement_level"))
                .and_then(|level| EngagementLevel::parse(&level)),
            predicted_next_purchase_window: text(field(analysis, "predicted_next_purchase_window")),
            recommended_products: Vec::new(),
            personalization_notes: text(field(analysis, "personalization_notes")).unwrap_or_default(),
        },
    })
}

/// Decodes every usable candidate, logging and skipping the rest.
pub fn decode_recommendations(raw: &str, customer_id: &str) -> Result<Vec<RecommendationCandidate>, DecodeError> {
    let value = extract_json(raw)?;
    let entries = value
        .get("recommendations")
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingField("recommendations"))?;

    let mut candidates = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        match decode_candidate(entry) {
            Ok(candidate) => candidates.push(candidate),
            Err(reason) => warn!(
                event_name = "oracle.candidate.discarded",
                correlation_id = %customer_id,
                customer_id = %customer_id,
                index,
                reason = %reason,
                "discarding undecodable oracle candidate"
            ),
        }
    }
    Ok(candidates)
}

pub fn decode_products(raw: &str) -> Result<Vec<ProductId>, DecodeError> {
    let value = extract_json(raw)?;
    let products = value.get("products").ok_or(DecodeError::MissingField("products"))?;
    if !products.is_array() {
        return Err(DecodeError::MissingField("products"));
    }
    Ok(string_list(Some(products)).into_iter().map(ProductId).collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use reengage_core::domain::recommendation::{
        EngagementLevel, FrequencyLabel, RecommendationType,
    };

    use super::{decode_candidate, decode_products, decode_recommendations, extract_json, DecodeError};

    fn reply(body: &str) -> String {
        format!("Here you go:\n```json\n{body}\n```\nLet me know if you need more.")
    }

    #[test]
    fn fenced_reply_with_surrounding_prose_uses_outer_brace_fallback() {
        let raw = reply(r#"{"recommendations": []}"#);
        assert_eq!(extract_json(&raw).expect("json"), json!({"recommendations": []}));
    }

    #[test]
    fn plain_fenced_reply_parses_directly() {
        let raw = "```json\n{\"products\": [\"armchair\"]}\n```";
        assert_eq!(extract_json(raw).expect("json"), json!({"products": ["armchair"]}));
    }

    #[test]
    fn reply_without_json_is_rejected() {
        assert_eq!(extract_json("I cannot help with that."), Err(DecodeError::NoJson));
        assert_eq!(extract_json("} nothing {"), Err(DecodeError::NoJson));
    }

    #[test]
    fn invalid_candidates_are_dropped_and_valid_ones_kept() {
        let raw = reply(
            r#"{"recommendations": [
                {"recommendation_type": "win_back", "priority_score": 140,
                 "reasons": ["quiet for 200 days"], "suggested_actions": ["send a comeback offer"],
                 "customer_insights": {"purchase_frequency": "low", "churn_risk_score": "88.6",
                                       "engagement_level": "sleepy"},
                 "ai_analysis": {"behavioral_pattern": "lapsed",
                                 "predicted_next_purchase_window": "60-90 days"}},
                {"recommendation_type": "mystery", "priority_score": 50,
                 "reasons": ["x"], "suggested_actions": ["y"]},
                {"recommendation_type": "upsell", "priority_score": "high",
                 "reasons": ["x"], "suggested_actions": ["y"]},
                {"recommendation_type": "cross_sell", "priority_score": 40,
                 "reasons": ["  "], "suggested_actions": ["bundle lamps"]}
            ]}"#,
        );

        let candidates = decode_recommendations(&raw, "cust-1").expect("decodes");

        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!(candidate.recommendation_type, RecommendationType::WinBack);
        assert_eq!(candidate.priority_score, 100);
        assert_eq!(candidate.insights.purchase_frequency_label, Some(FrequencyLabel::Low));
        assert_eq!(candidate.insights.churn_risk_score, Some(89));
        assert_eq!(candidate.analysis.engagement_level, None);
        assert_eq!(candidate.analysis.predicted_next_purchase_window.as_deref(), Some("60-90 days"));
        assert_eq!(candidate.analysis.personalization_notes, "");
    }

    #[test]
    fn negative_priority_clamps_to_zero() {
        let candidate = decode_candidate(&json!({
            "recommendation_type": "loyalty_reward",
            "priority_score": -4,
            "reasons": ["steady"],
            "suggested_actions": ["thank them"],
            "customer_insights": {"engagement_level": "high"}
        }))
        .expect("valid");
        assert_eq!(candidate.priority_score, 0);
        assert_eq!(candidate.analysis.engagement_level, Some(EngagementLevel::High));
    }

    #[test]
    fn missing_recommendations_array_is_an_error() {
        assert_eq!(
            decode_recommendations(r#"{"items": []}"#, "cust-1"),
            Err(DecodeError::MissingField("recommendations"))
        );
    }

    #[test]
    fn product_suggestions_decode_to_ids() {
        let products = decode_products(r#"{"products": ["armchair", "", "side table"]}"#)
            .expect("products");
        let names: Vec<&str> = products.iter().map(|product| product.0.as_str()).collect();
        assert_eq!(names, vec!["armchair", "side table"]);
        assert!(decode_products(r#"{"products": "armchair"}"#).is_err());
    }
}
