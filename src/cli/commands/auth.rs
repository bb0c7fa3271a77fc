use clap::{Arg, ArgMatches, Command};
use std::path::PathBuf;

pub fn with_args(command: Command) -> Command {
    let command = with_flow_args(command);
    with_mailer_args(command)
}

fn with_flow_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("public-base-url")
                .long("public-base-url")
                .help("Public base URL used for login links and CORS")
                .env("SESAMO_PUBLIC_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new("token-ttl-seconds")
                .long("token-ttl-seconds")
                .help("Login token TTL in seconds")
                .env("SESAMO_TOKEN_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("debounce-window-seconds")
                .long("debounce-window-seconds")
                .help("Minimum gap between login links for one address")
                .env("SESAMO_DEBOUNCE_WINDOW_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("access-list-path")
                .long("access-list-path")
                .help("JSON file with the authorized addresses, reloaded on SIGHUP")
                .env("SESAMO_ACCESS_LIST_PATH")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("success-redirect")
                .long("success-redirect")
                .help("Redirect target after a consumed login link")
                .env("SESAMO_SUCCESS_REDIRECT")
                .default_value("/success.html"),
        )
        .arg(
            Arg::new("failure-redirect")
                .long("failure-redirect")
                .help("Redirect target after a rejected login link")
                .env("SESAMO_FAILURE_REDIRECT")
                .default_value("/index.html"),
        )
}

fn with_mailer_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("mail-poll-seconds")
                .long("mail-poll-seconds")
                .help("Mail outbox poll interval in seconds")
                .env("SESAMO_MAIL_POLL_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("mail-batch-size")
                .long("mail-batch-size")
                .help("Mail outbox batch size per poll")
                .env("SESAMO_MAIL_BATCH_SIZE")
                .default_value("10")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("mail-max-attempts")
                .long("mail-max-attempts")
                .help("Max attempts before marking a mail as failed")
                .env("SESAMO_MAIL_MAX_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("mail-retry-seconds")
                .long("mail-retry-seconds")
                .help("Delay before a failed mail is retried")
                .env("SESAMO_MAIL_RETRY_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}

#[derive(Debug)]
pub struct Options {
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

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            public_base_url: matches
                .get_one::<String>("public-base-url")
                .cloned()
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            token_ttl_seconds: matches
                .get_one::<i64>("token-ttl-seconds")
                .copied()
                .unwrap_or(900),
            debounce_window_seconds: matches
                .get_one::<i64>("debounce-window-seconds")
                .copied()
                .unwrap_or(60),
            access_list_path: matches.get_one::<PathBuf>("access-list-path").cloned(),
            success_redirect: matches
                .get_one::<String>("success-redirect")
                .cloned()
                .unwrap_or_else(|| "/success.html".to_string()),
            failure_redirect: matches
                .get_one::<String>("failure-redirect")
                .cloned()
                .unwrap_or_else(|| "/index.html".to_string()),
            mail_poll_seconds: matches
                .get_one::<u64>("mail-poll-seconds")
                .copied()
                .unwrap_or(5),
            mail_batch_size: matches
                .get_one::<usize>("mail-batch-size")
                .copied()
                .unwrap_or(10),
            mail_max_attempts: matches
                .get_one::<u32>("mail-max-attempts")
                .copied()
                .unwrap_or(5),
            mail_retry_seconds: matches
                .get_one::<u64>("mail-retry-seconds")
                .copied()
                .unwrap_or(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_flags() {
        temp_env::with_vars(
            [
                ("SESAMO_DSN", Some("postgres://user@localhost:5432/sesamo")),
                ("SESAMO_PUBLIC_BASE_URL", None::<&str>),
                ("SESAMO_TOKEN_TTL_SECONDS", None),
                ("SESAMO_DEBOUNCE_WINDOW_SECONDS", None),
                ("SESAMO_ACCESS_LIST_PATH", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["sesamo"]);
                let options = Options::parse(&matches);
                assert_eq!(options.public_base_url, "http://localhost:8080");
                assert_eq!(options.token_ttl_seconds, 900);
                assert_eq!(options.debounce_window_seconds, 60);
                assert_eq!(options.access_list_path, None);
                assert_eq!(options.success_redirect, "/success.html");
                assert_eq!(options.failure_redirect, "/index.html");
                assert_eq!(options.mail_poll_seconds, 5);
                assert_eq!(options.mail_batch_size, 10);
                assert_eq!(options.mail_max_attempts, 5);
                assert_eq!(options.mail_retry_seconds, 60);
            },
        );
    }

    #[test]
    fn flags_override_defaults() {
        temp_env::with_vars([("SESAMO_ACCESS_LIST_PATH", None::<&str>)], || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "sesamo",
                "--dsn",
                "postgres://user@localhost:5432/sesamo",
                "--public-base-url",
                "https://login.example.com",
                "--token-ttl-seconds",
                "120",
                "--debounce-window-seconds",
                "10",
                "--access-list-path",
                "/etc/sesamo/users.json",
                "--mail-batch-size",
                "3",
            ]);
            let options = Options::parse(&matches);
            assert_eq!(options.public_base_url, "https://login.example.com");
            assert_eq!(options.token_ttl_seconds, 120);
            assert_eq!(options.debounce_window_seconds, 10);
            assert_eq!(
                options.access_list_path,
                Some(PathBuf::from("/etc/sesamo/users.json"))
            );
            assert_eq!(options.mail_batch_size, 3);
        });
    }
}
