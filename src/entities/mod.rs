pub mod effective_classification;
pub mod job_execution;
pub mod target_association;

pub use effective_classification::Entity as EffectiveClassification;
pub use job_execution::Entity as JobExecution;
pub use target_association::Entity as TargetAssociation;
