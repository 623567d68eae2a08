//! Domain logic for the travel plan backend: prompt construction, the
//! external model client, response parsing, plan generation, weather
//! lookups, and the model call log.

pub mod apilog;
pub mod generator;
pub mod model;
pub mod parser;
pub mod prompt;
pub mod weather;
