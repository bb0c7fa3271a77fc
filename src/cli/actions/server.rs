use crate::{access::AccessGate, api, auth::AuthConfig};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub public_base_url: String,
    pub token_ttl_seconds: i64,
    pub debounce_window_seconds: i64,
    pub access_list_path: Option<PathBuf>,
    pub success_redirect: String,
    pub failure_redirect: String,
    pub mail_poll_seconds: u64,
    pub mail_batch_size: usize,
    pub mail_max_attempts: u32,
    pub mail_retry_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = AuthConfig::new(args.public_base_url)
        .with_token_ttl_seconds(args.token_ttl_seconds)
        .with_debounce_window_seconds(args.debounce_window_seconds)
        .with_success_redirect(args.success_redirect)
        .with_failure_redirect(args.failure_redirect);

    let mailer_config = api::MailerConfig::new()
        .with_poll_interval_seconds(args.mail_poll_seconds)
        .with_batch_size(args.mail_batch_size)
        .with_max_attempts(args.mail_max_attempts)
        .with_retry_delay_seconds(args.mail_retry_seconds);

    // Fail closed: an unreadable or malformed list leaves the gate empty,
    // the server still starts.
    let gate = Arc::new(AccessGate::new());
    if let Some(path) = &args.access_list_path {
        gate.replace_from_file(path);
    }

    api::new(
        args.port,
        args.dsn,
        auth_config,
        mailer_config,
        gate,
        args.access_list_path,
    )
    .await
}
