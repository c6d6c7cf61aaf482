//! Orchestrators that move research sessions and curriculum plans through
//! their stages.
//!
//! Every action reads the entity, checks [`state`] for a legal start, claims
//! the in-progress status with a compare-and-set and then runs the slow
//! generation work. Failures are logged, the prior status is restored and the
//! error is returned to the caller unchanged.

mod curriculum;
mod research;
pub mod state;

pub use curriculum::CurriculumPipeline;
pub use research::ResearchPipeline;
