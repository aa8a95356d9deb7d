//! Personal study quiz: LLM-generated questions, per-question statistics and
//! two drill modes (weighted practice, no-repeat test).

pub mod config;
pub mod quiz;
