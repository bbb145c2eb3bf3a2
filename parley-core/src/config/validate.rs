//! Configuration validation rules.

use super::schema::{Config, MAX_SESSION_SECONDS};

/// Validate configuration and return aggregated validation errors.
pub fn validate_config(config: &Config) -> crate::Result<()> {
    let mut errors = Vec::new();

    if config.sessions.expiry_seconds == 0 {
        errors.push("sessions.expiry_seconds must be > 0".to_string());
    }
    if config.sessions.expiry_seconds > MAX_SESSION_SECONDS {
        errors.push(format!(
            "sessions.expiry_seconds must be <= {}",
            MAX_SESSION_SECONDS
        ));
    }
    if config.sessions.retention_grace_seconds > MAX_SESSION_SECONDS {
        errors.push(format!(
            "sessions.retention_grace_seconds must be <= {}",
            MAX_SESSION_SECONDS
        ));
    }
    if config.sessions.sweep.enabled && config.sessions.sweep.interval_s == 0 {
        errors.push("sessions.sweep.interval_s must be > 0 when the sweep is enabled".to_string());
    }

    let context = &config.context;
    if context.max_history_turns == 0 {
        errors.push("context.max_history_turns must be > 0".to_string());
    }
    if context.retrieval_k == 0 {
        errors.push("context.retrieval_k must be > 0".to_string());
    }
    if context.context_k == 0 || context.context_k > context.retrieval_k {
        errors.push("context.context_k must be in [1, context.retrieval_k]".to_string());
    }
    if !(0.0..=1.0).contains(&context.min_relevance_score) {
        errors.push("context.min_relevance_score must be in [0.0, 1.0]".to_string());
    }

    if config.archive.destination.trim().is_empty() {
        errors.push("archive.destination must not be empty".to_string());
    }

    if config.generation.timeout_secs == 0 {
        errors.push("generation.timeout_secs must be > 0".to_string());
    }
    if config.generation.max_tokens == 0 {
        errors.push("generation.max_tokens must be > 0".to_string());
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        errors.push("generation.temperature must be in [0.0, 2.0]".to_string());
    }
    if config.retrieval.is_enabled() && config.retrieval.timeout_secs == 0 {
        errors.push("retrieval.timeout_secs must be > 0 when retrieval is enabled".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(crate::Error::Validation(errors.join("; ")))
    }
}
