//! Built-in research catalogs for the DeepDive pipeline.
//!
//! Each catalog is a set of [`Topic`]s plus the aggregator that synthesizes
//! their outputs; [`Workflow`] turns one into a ready-to-run pipeline.

pub mod digest;
pub mod investment;
mod topic;
mod workflow;

pub use digest::DigestTopic;
pub use investment::InvestmentTopic;
pub use topic::Topic;
pub use workflow::Workflow;
