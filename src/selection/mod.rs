// src/selection/mod.rs

//! Candidate filtering, budget enforcement, and final ranking.
//! The scheduler drives these against one recipient at a time.

pub mod budget;
pub mod pool;
pub mod scorer;

pub use budget::{BudgetCaps, BudgetTracker};
pub use pool::{Candidate, build_pool};
pub use scorer::{Ranked, RecentUsage, ScoreInputs, diversity_bonus, rank, score};
