pub mod engine;

pub use engine::MatchingEngine;
