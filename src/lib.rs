//! redub - Automated Video Dubbing
//!
//! Recognizes diarized speech, translates it under per-segment word budgets,
//! synthesizes a new voice track fitted to the original timing and mixes it
//! over the separated background audio.

pub mod budget;
pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod mix;
pub mod pipeline;
pub mod recognize;
pub mod reconcile;
pub mod segment;
pub mod segmenter;
pub mod synthesis;
pub mod translate;
