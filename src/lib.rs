//! Trip Planner — conversational slot filling for an AI travel planner.

pub mod config;
pub mod error;
pub mod llm;
pub mod trip;
