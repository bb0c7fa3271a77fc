//! Command-line argument dispatch and server initialization.
//!
//! This module maps validated CLI arguments to the appropriate action, such
//! as starting the server with its full configuration state.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::auth;
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn,
        public_base_url: auth_opts.public_base_url,
        token_ttl_seconds: auth_opts.token_ttl_seconds,
        debounce_window_seconds: auth_opts.debounce_window_seconds,
        access_list_path: auth_opts.access_list_path,
        success_redirect: auth_opts.success_redirect,
        failure_redirect: auth_opts.failure_redirect,
        mail_poll_seconds: auth_opts.mail_poll_seconds,
        mail_batch_size: auth_opts.mail_batch_size,
        mail_max_attempts: auth_opts.mail_max_attempts,
        mail_retry_seconds: auth_opts.mail_retry_seconds,
    }))
}
