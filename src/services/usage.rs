// Token usage recording and cost accounting. Provider-reported counts are
// persisted per request; the word-count estimator covers history recorded
// before token metadata was available.

use sqlx::PgPool;
use uuid::Uuid;

/// Prices in USD per million tokens.
pub struct ModelPricing {
    pub input_price: f64,
    pub output_price: f64,
}

impl ModelPricing {
    /// Gemini 2.5 Flash
    /// Source: https://ai.google.dev/gemini-api/docs/pricing
    pub fn gemini_2_5_flash() -> Self {
        Self {
            input_price: 0.30,
            output_price: 2.50,
        }
    }

    /// Calculate cost in USD cents (avoids floating point precision issues)
    /// Returns: (input_cost_cents, output_cost_cents, total_cost_cents)
    pub fn calculate_cost_cents(&self, input_tokens: u32, output_tokens: u32) -> (i64, i64, i64) {
        let input_cost = (input_tokens as f64 / 1_000_000.0) * self.input_price * 100.0;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * self.output_price * 100.0;

        (
            input_cost.round() as i64,
            output_cost.round() as i64,
            (input_cost + output_cost).round() as i64,
        )
    }
}

pub fn pricing_for_model(model: &str) -> ModelPricing {
    match model {
        m if m.contains("gemini-2.5-flash") => ModelPricing::gemini_2_5_flash(),
        _ => {
            tracing::warn!("Unknown model for pricing: {}, using zero pricing", model);
            ModelPricing { input_price: 0.0, output_price: 0.0 }
        }
    }
}

/// Rough token estimate from plain text (1 word ~= 1.3 tokens). Used for
/// admin reporting over messages that predate recorded provider counts.
pub fn estimate_tokens(text: &str) -> i64 {
    let words = text.split_whitespace().count();
    (words as f64 * 1.3) as i64
}

#[derive(Debug)]
pub struct UserUsageSummary {
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost_cents: i64,
    pub total_requests: i64,
}

pub struct TokenUsageService;

impl TokenUsageService {
    /// Record one Gemini request's token counts and cost.
    pub async fn record_gemini_usage(
        pool: &PgPool,
        session_id: Uuid,
        user_id: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<i64, sqlx::Error> {
        let pricing = pricing_for_model(model);
        let (input_cost, output_cost, _) = pricing.calculate_cost_cents(input_tokens, output_tokens);

        let result: (i64,) = sqlx::query_as(
            r#"
            INSERT INTO api_token_usage (
                session_id, user_id, model,
                input_tokens, output_tokens,
                input_cost_cents, output_cost_cents
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .bind(model)
        .bind(input_tokens as i32)
        .bind(output_tokens as i32)
        .bind(input_cost)
        .bind(output_cost)
        .fetch_one(pool)
        .await?;

        tracing::debug!(
            "Recorded Gemini usage: {} input, {} output tokens = ${:.4}",
            input_tokens,
            output_tokens,
            (input_cost + output_cost) as f64 / 100.0
        );

        Ok(result.0)
    }

    /// Recorded totals for one user across all sessions.
    pub async fn get_user_total_usage(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<UserUsageSummary, sqlx::Error> {
        let result: (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(input_tokens), 0),
                COALESCE(SUM(output_tokens), 0),
                COALESCE(SUM(input_cost_cents + output_cost_cents), 0),
                COUNT(*)
            FROM api_token_usage
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(UserUsageSummary {
            total_input_tokens: result.0,
            total_output_tokens: result.1,
            total_cost_cents: result.2,
            total_requests: result.3,
        })
    }

    /// Bump the per-user aggregate counter and activity timestamp after a
    /// chat turn. Creates the profile row if the user never saved one.
    pub async fn bump_user_activity(pool: &PgPool, user_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, message_count, last_active)
            VALUES ($1, 1, NOW())
            ON CONFLICT (user_id) DO UPDATE
                SET message_count = profiles.message_count + 1,
                    last_active = NOW()
            "#,
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_flash_cost_calculation() {
        let pricing = ModelPricing::gemini_2_5_flash();

        let (input, output, total) = pricing.calculate_cost_cents(100_000, 20_000);
        assert_eq!(input, 3);  // (100000/1M) * 0.30 * 100 = 3¢
        assert_eq!(output, 5); // (20000/1M) * 2.50 * 100 = 5¢
        assert_eq!(total, 8);
    }

    #[test]
    fn test_tiny_usage_rounds_to_zero() {
        let pricing = ModelPricing::gemini_2_5_flash();
        let (input, output, total) = pricing.calculate_cost_cents(1000, 300);
        assert_eq!(input, 0);
        assert_eq!(output, 0);
        assert_eq!(total, 0);
    }

    #[test]
    fn test_unknown_model_prices_at_zero() {
        let pricing = pricing_for_model("some-future-model");
        assert_eq!(pricing.calculate_cost_cents(1_000_000, 1_000_000), (0, 0, 0));
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens("what is gravity"), 3); // 3 * 1.3 = 3.9 -> 3
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("ten words here to make a round number of tokens"), 13);
    }
}
