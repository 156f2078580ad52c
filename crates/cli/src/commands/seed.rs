use chrono::Utc;
use reengage_db::fixtures::VerificationResult;
use reengage_db::{DemoDataset, SeedResult};

use crate::commands::{finish, open_pool, prepare, CommandResult, StepFailure};

pub fn run() -> CommandResult {
    let (config, runtime) = match prepare("seed") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;

        let seeded = DemoDataset::load(&pool, Utc::now())
            .await
            .map_err(|error| ("seed_execution", error.to_string(), 5u8))?;
        let verification = DemoDataset::verify(&pool)
            .await
            .map_err(|error| ("seed_verification", error.to_string(), 6u8))?;
        pool.close().await;

        if verification.passed() {
            Ok::<SeedResult, StepFailure>(seeded)
        } else {
            Err(("seed_verification", verification_message(&verification), 6u8))
        }
    });

    finish("seed", result, |seeded| CommandResult::success("seed", summary(&seeded)))
}

fn summary(seeded: &SeedResult) -> String {
    let customers = seeded
        .customers
        .iter()
        .map(|customer| format!("  - {}: {}", customer.customer_id, customer.profile))
        .collect::<Vec<_>>();
    format!(
        "demo dataset loaded: {} customers, {} products, {} orders ({} eligible for recommendations)\n{}",
        seeded.customers.len(),
        seeded.products,
        seeded.orders,
        seeded.eligible_customers,
        customers.join("\n")
    )
}

fn verification_message(verification: &VerificationResult) -> String {
    let failed = verification
        .checks
        .iter()
        .filter(|check| check.expected != check.actual)
        .map(|check| format!("{} (expected {}, found {})", check.name, check.expected, check.actual))
        .collect::<Vec<_>>();
    if failed.is_empty() {
        "Some seed data failed to load".to_string()
    } else {
        format!("Seed verification failed for checks: {}", failed.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use reengage_db::fixtures::{SeedCheck, VerificationResult};

    use super::verification_message;

    #[test]
    fn verification_error_message_targets_failed_checks() {
        let verification = VerificationResult {
            checks: vec![
                SeedCheck { name: "customers", expected: 4, actual: 4 },
                SeedCheck { name: "orders", expected: 9, actual: 7 },
            ],
        };

        assert_eq!(
            verification_message(&verification),
            "Seed verification failed for checks: orders (expected 9, found 7)"
        );
    }

    #[test]
    fn verification_error_message_falls_back_to_generic_when_no_labels() {
        let verification = VerificationResult { checks: Vec::new() };
        assert_eq!(verification_message(&verification), "Some seed data failed to load");
    }
}
