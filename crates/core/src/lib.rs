pub mod admin;
pub mod behavior;
pub mod clock;
pub mod config;
pub mod domain;
pub mod errors;
pub mod memory;
pub mod notify;
pub mod ports;
pub mod schedule;
pub mod scheduler;
pub mod workflow;

pub use admin::RecommendationAdmin;
pub use behavior::{BehaviorAnalysis, BehaviorAnalyzer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use domain::customer::{CustomerId, CustomerInfo};
pub use domain::order::{CompletedOrder, OrderLine, OrderStatus, ProductId};
pub use domain::profile::CustomerBehaviorProfile;
pub use domain::recommendation::{
    RecommendationCandidate, RecommendationId, RecommendationRecord, RecommendationStatus,
    RecommendationType,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use notify::{LogNotifier, Notifier};
pub use schedule::{CronSchedule, ScheduleSpec};
pub use scheduler::{RecommendationScheduler, SchedulerError, SchedulerSettings, SchedulerStatus};
pub use workflow::{
    Collaborators, WorkflowError, WorkflowOutcome, WorkflowRequest, WorkflowRunner,
    WorkflowSettings,
};
