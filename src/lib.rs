pub mod agent_workflow;
pub mod backend;
pub mod chat;
pub mod checkpoint;
pub mod cli;
pub mod client;
pub mod config;
pub mod diff;
pub mod editing_session;
pub mod enricher;
pub mod error;
pub mod llm;
pub mod markup;
pub mod patch;
pub mod prompt_builder;
pub mod response;
pub mod session_history;
pub mod stream_parser;
pub mod streaming_executor;
pub mod symbols;
pub mod tool_registry;
pub mod tools;
pub mod ui;
pub mod web;
pub mod workspace;

pub use config::Config;
pub use tool_registry::ToolRegistry;
