pub mod charts;
pub mod chunk_plan;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod export;
pub mod html;
pub mod parser;
pub mod pipeline;
pub mod postprocess;
pub mod progress;
pub mod report;
pub mod summarizer;
pub mod util;
