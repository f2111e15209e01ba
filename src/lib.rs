//! # Politiko
//!
//! A backend that profiles Philippine public figures by asking an LLM search
//! API, parsing the JSON it embeds in its replies, and caching the result.
//!
//! ## Features
//!
//! - **Summaries**: seven topic prompts run concurrently and merge into one `Summary`
//! - **Defensive parsing**: fenced or bare JSON is recovered, anything else is an error
//! - **Caching**: summaries, trending lists and translations persist in sled
//! - **Translation**: free-text fields of any produced record can be translated

pub mod agent;
pub mod aggregate;
pub mod cache;
pub mod config;
pub mod extract;
pub mod logging;
pub mod server;
pub mod storage;
pub mod subject;
pub mod summary;
pub mod topic;
pub mod translate;

pub use config::Config;
pub use subject::Subject;
pub use summary::Summary;
pub use topic::{Topic, TopicRecord};
