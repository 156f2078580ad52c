use std::collections::BTreeSet;
use std::sync::Arc;

use reengage_agent::build_oracle;
use reengage_core::clock::SystemClock;
use reengage_core::domain::customer::CustomerId;
use reengage_core::domain::recommendation::RecommendationType;
use reengage_core::notify::LogNotifier;
use reengage_core::scheduler::{RecommendationScheduler, SchedulerError, SchedulerSettings};
use reengage_core::workflow::{WorkflowError, WorkflowOutcome, WorkflowRequest, WorkflowSettings};
use reengage_db::repositories::sql_collaborators;

use crate::commands::{finish, open_pool, prepare, CommandResult, StepFailure};

#[derive(Clone, Debug, Default)]
pub struct GenerateArgs {
    pub force_refresh: bool,
    pub customers: Vec<String>,
    pub types: Vec<String>,
}

pub fn run(args: GenerateArgs) -> CommandResult {
    let request = match request_from_args(&args) {
        Ok(request) => request,
        Err(message) => return CommandResult::failure("generate", "invalid_argument", message, 2),
    };
    let (config, runtime) = match prepare("generate") {
        Ok(prepared) => prepared,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_pool(&config).await?;
        let schedule = config
            .scheduler
            .schedule()
            .map_err(|error| ("config_validation", error.to_string(), 2u8))?;
        let scheduler = RecommendationScheduler::new(
            sql_collaborators(&pool, build_oracle(&config.oracle), Arc::new(SystemClock)),
            WorkflowSettings::from(&config.workflow),
            SchedulerSettings { schedule, retention: config.workflow.retention() },
            Arc::new(LogNotifier),
        );

        let outcome = scheduler.generate(request).await.map_err(classify);
        pool.close().await;
        outcome
    });

    finish("generate", result, |outcome: WorkflowOutcome| {
        let message = format!(
            "processed {} customers: {} recommendations generated, {} skipped, {} failed",
            outcome.processed.len(),
            outcome.total_generated,
            outcome.skipped,
            outcome.failed.len()
        );
        CommandResult::success_with_data("generate", message, Some(outcome))
    })
}

fn request_from_args(args: &GenerateArgs) -> Result<WorkflowRequest, String> {
    let allowed_types = if args.types.is_empty() {
        None
    } else {
        let mut kinds = BTreeSet::new();
        for raw in &args.types {
            let kind = RecommendationType::parse(raw)
                .ok_or_else(|| format!("unknown recommendation type `{raw}`"))?;
            kinds.insert(kind);
        }
        Some(kinds)
    };
    let customer_ids = (!args.customers.is_empty())
        .then(|| args.customers.iter().map(|id| CustomerId::new(id.as_str())).collect());

    Ok(WorkflowRequest { customer_ids, force_refresh: args.force_refresh, allowed_types })
}

fn classify(error: SchedulerError) -> StepFailure {
    match error {
        SchedulerError::Workflow(WorkflowError::OracleNotConfigured) => {
            ("oracle_not_configured", error.to_string(), 7)
        }
        SchedulerError::Workflow(WorkflowError::CustomerDiscovery(_)) => {
            ("customer_discovery", error.to_string(), 8)
        }
        other => ("generation", other.to_string(), 8),
    }
}
