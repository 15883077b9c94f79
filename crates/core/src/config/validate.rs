use super::{types::Config, ConfigError};
use crate::notifier::NotifierKind;
use crate::schedule::parse_clock;
use crate::source::MAX_RESULTS_CEILING;
use crate::summarizer::{LlmProvider, CONTENT_PLACEHOLDER};

/// Validate configuration
/// Currently validates:
/// - Helpdesk credentials, quota and result cap
/// - Agent identities usable in a filter expression
/// - Summarizer batching, quota and provider credentials
/// - Notifier section matching the selected kind
/// - Daemon port and business hours
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: &str| Err(ConfigError::ValidationError(msg.to_string()));

    // Helpdesk
    if config.helpdesk.base_url.trim().is_empty() {
        return invalid("helpdesk.base_url cannot be empty");
    }
    if config.helpdesk.api_token.trim().is_empty() {
        return invalid("helpdesk.api_token cannot be empty");
    }
    if config.helpdesk.requests_per_window == 0 || config.helpdesk.window_secs == 0 {
        return invalid("helpdesk.requests_per_window and helpdesk.window_secs must be positive");
    }
    if config.helpdesk.max_results == 0 || config.helpdesk.max_results > MAX_RESULTS_CEILING {
        return Err(ConfigError::ValidationError(format!(
            "helpdesk.max_results must be between 1 and {}",
            MAX_RESULTS_CEILING
        )));
    }
    if config.helpdesk.retry.max_attempts == 0 {
        return invalid("helpdesk.retry.max_attempts must be at least 1");
    }

    // Run
    for agent in &config.run.agents {
        if agent.trim().is_empty() || agent.contains('\'') {
            return Err(ConfigError::ValidationError(format!(
                "run.agents contains an invalid identity: {:?}",
                agent
            )));
        }
    }
    if config.run.new_within_hours <= 0 || config.run.expiring_within_hours <= 0 {
        return invalid("run.new_within_hours and run.expiring_within_hours must be positive");
    }
    if !(-12..=14).contains(&config.run.display_utc_offset_hours) {
        return invalid("run.display_utc_offset_hours must be between -12 and 14");
    }

    // Summarizer
    let summarizer = &config.summarizer;
    if summarizer.batch_size == 0 {
        return invalid("summarizer.batch_size must be at least 1");
    }
    if summarizer.max_concurrency == 0 {
        return invalid("summarizer.max_concurrency must be at least 1");
    }
    if summarizer.requests_per_minute == 0 {
        return invalid("summarizer.requests_per_minute must be positive");
    }
    if summarizer.retry.max_attempts == 0 {
        return invalid("summarizer.retry.max_attempts must be at least 1");
    }
    if !(0.0..=2.0).contains(&summarizer.temperature) {
        return invalid("summarizer.temperature must be between 0.0 and 2.0");
    }
    if !summarizer.prompt_template.contains(CONTENT_PLACEHOLDER) {
        return Err(ConfigError::ValidationError(format!(
            "summarizer.prompt_template must contain {}",
            CONTENT_PLACEHOLDER
        )));
    }
    if summarizer.enabled
        && summarizer.provider != LlmProvider::Ollama
        && summarizer.api_key.as_ref().is_none_or(|k| k.is_empty())
    {
        return invalid("summarizer.api_key is required for hosted providers");
    }

    // Notifier
    if config.notifier.kind == NotifierKind::SendGrid {
        match &config.notifier.sendgrid {
            None => return invalid("notifier.sendgrid section is required for kind = \"sendgrid\""),
            Some(sg) if sg.api_key.is_empty() || sg.from_email.is_empty() => {
                return invalid("notifier.sendgrid.api_key and from_email cannot be empty");
            }
            Some(_) => {}
        }
    }

    // Daemon
    if config.daemon.enabled {
        if config.daemon.port == 0 {
            return invalid("daemon.port cannot be 0");
        }
        if config.run.agents.is_empty() {
            return invalid("run.agents cannot be empty in daemon mode");
        }
    }
    for (key, value) in [
        ("daemon.business_hours_start", &config.daemon.business_hours_start),
        ("daemon.business_hours_end", &config.daemon.business_hours_end),
    ] {
        if parse_clock(value).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "{} must be HH:MM, got {:?}",
                key, value
            )));
        }
    }
    if config.daemon.business_interval_mins == 0 || config.daemon.off_hours_interval_mins == 0 {
        return invalid("daemon intervals must be positive");
    }

    Ok(())
}
