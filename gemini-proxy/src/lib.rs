//! gemini-proxy: forwards browser prompts to the Gemini API with a
//! server-held key and normalizes every outcome into JSON.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;

pub use startup::AppState;
