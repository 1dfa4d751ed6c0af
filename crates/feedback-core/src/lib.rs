pub mod config;
mod config_env;
pub mod conversation;
pub mod feedback_client;
pub mod llm;
pub mod models;
pub mod question_hash;
pub mod repos;
pub mod session;
