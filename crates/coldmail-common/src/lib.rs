pub mod deadline;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod mcp_api;
pub mod memory;
pub mod openai;
pub mod redis;
pub mod vectordb;
