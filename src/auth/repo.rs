//! Database access for tokens, sessions, and the issuance debounce.
//!
//! Single-use consumption and debounce admission are each a single
//! conditional statement, so concurrent callers race inside Postgres and
//! exactly one wins.

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::config::AuthConfig;
use super::utils::build_login_url;

/// Outcome of the atomic debounce check-and-record.
#[derive(Debug)]
pub(super) enum Admission {
    Admitted,
    Debounced { remaining_ms: i64 },
}

/// Outcome of an atomic token consumption attempt.
#[derive(Debug)]
pub(super) enum ConsumeOutcome {
    Consumed {
        session_id: String,
        contact_address: String,
    },
    NotFound,
    Expired,
    AlreadyConsumed,
}

const SCHEMA: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS login_tokens (
        token_hash      BYTEA PRIMARY KEY,
        session_id      TEXT NOT NULL,
        contact_address TEXT NOT NULL,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        expires_at      TIMESTAMPTZ NOT NULL,
        consumed_at     TIMESTAMPTZ
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS session_identities (
        session_id       TEXT PRIMARY KEY,
        contact_address  TEXT NOT NULL,
        authenticated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS issuance_debounce (
        address          TEXT PRIMARY KEY,
        last_admitted_at TIMESTAMPTZ NOT NULL
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS mail_outbox (
        id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
        to_email        TEXT NOT NULL,
        template        TEXT NOT NULL,
        payload_json    JSONB NOT NULL,
        status          TEXT NOT NULL DEFAULT 'pending',
        attempts        INTEGER NOT NULL DEFAULT 0,
        last_error      TEXT,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        next_attempt_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        sent_at         TIMESTAMPTZ
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS mail_outbox_pending_idx
        ON mail_outbox (next_attempt_at) WHERE status = 'pending'
    ",
];

/// Create the backing tables when they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DDL",
            db.statement = statement
        );
        sqlx::query(statement)
            .execute(pool)
            .instrument(span)
            .await
            .context("failed to provision schema")?;
    }
    Ok(())
}

/// Atomically admit or reject an issuance request for a normalized address.
///
/// The `WHERE` clause on the upsert makes check-and-record one statement;
/// two near-simultaneous requests for the same address cannot both win.
pub(super) async fn admit_issuance(
    pool: &PgPool,
    address: &str,
    window_seconds: i64,
) -> Result<Admission> {
    let query = r"
        INSERT INTO issuance_debounce (address, last_admitted_at)
        VALUES ($1, NOW())
        ON CONFLICT (address) DO UPDATE
        SET last_admitted_at = NOW()
        WHERE issuance_debounce.last_admitted_at <= NOW() - ($2 * INTERVAL '1 second')
        RETURNING address
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    let admitted = sqlx::query(query)
        .bind(address)
        .bind(window_seconds)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to record issuance admission")?;

    if admitted.is_some() {
        return Ok(Admission::Admitted);
    }

    let query = r"
        SELECT GREATEST(
            CEIL(EXTRACT(EPOCH FROM (last_admitted_at + ($2 * INTERVAL '1 second') - NOW())) * 1000),
            1
        )::BIGINT AS remaining_ms
        FROM issuance_debounce
        WHERE address = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(address)
        .bind(window_seconds)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to read debounce remainder")?;

    // The record cannot disappear (debounce rows are never deleted), but a
    // concurrent admission may have shifted the window; report at least 1ms.
    let remaining_ms = row.map_or(1, |row| row.get::<i64, _>("remaining_ms").max(1));
    Ok(Admission::Debounced { remaining_ms })
}

/// Store a hashed login token and enqueue the login mail in one transaction.
pub(super) async fn record_issuance(
    pool: &PgPool,
    token_hash: &[u8],
    token: &str,
    session_id: &str,
    contact_address: &str,
    config: &AuthConfig,
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin issuance transaction")?;

    let query = r"
        INSERT INTO login_tokens
            (token_hash, session_id, contact_address, expires_at)
        VALUES ($1, $2, $3, NOW() + ($4 * INTERVAL '1 second'))
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(token_hash)
        .bind(session_id)
        .bind(contact_address)
        .bind(config.token_ttl_seconds())
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert login token")?;

    let login_url = build_login_url(config.public_base_url(), token);
    let payload = json!({
        "email": contact_address,
        "login_url": login_url,
    });
    let payload_text = serde_json::to_string(&payload).context("failed to serialize mail payload")?;

    let query = r"
        INSERT INTO mail_outbox (to_email, template, payload_json)
        VALUES ($1, $2, $3::jsonb)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(contact_address)
        .bind("login_link")
        .bind(payload_text)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to insert mail outbox row")?;

    tx.commit().await.context("commit issuance transaction")?;

    Ok(())
}

/// Consume a login token if it is still live.
///
/// The conditional `UPDATE` is the single-use guarantee: of any number of
/// concurrent attempts on one token, exactly one sees the returned row. A
/// follow-up lookup only classifies the failure for server-side logs.
pub(super) async fn consume_login_token(pool: &PgPool, token_hash: &[u8]) -> Result<ConsumeOutcome> {
    let query = r"
        UPDATE login_tokens
        SET consumed_at = NOW()
        WHERE token_hash = $1
          AND consumed_at IS NULL
          AND expires_at > NOW()
        RETURNING session_id, contact_address
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume login token")?;

    if let Some(row) = row {
        return Ok(ConsumeOutcome::Consumed {
            session_id: row.get("session_id"),
            contact_address: row.get("contact_address"),
        });
    }

    let query = r"
        SELECT consumed_at IS NOT NULL AS consumed
        FROM login_tokens
        WHERE token_hash = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to classify rejected token")?;

    match row {
        None => Ok(ConsumeOutcome::NotFound),
        Some(row) if row.get::<bool, _>("consumed") => Ok(ConsumeOutcome::AlreadyConsumed),
        Some(_) => Ok(ConsumeOutcome::Expired),
    }
}

/// Bind a proven address to a session, replacing any earlier identity.
pub(super) async fn set_authenticated(
    pool: &PgPool,
    session_id: &str,
    contact_address: &str,
) -> Result<()> {
    let query = r"
        INSERT INTO session_identities (session_id, contact_address)
        VALUES ($1, $2)
        ON CONFLICT (session_id) DO UPDATE
        SET contact_address = EXCLUDED.contact_address,
            authenticated_at = NOW()
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(session_id)
        .bind(contact_address)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to persist session identity")?;
    Ok(())
}

/// Look up the address a session has proven, if any.
pub(super) async fn is_authenticated(pool: &PgPool, session_id: &str) -> Result<Option<String>> {
    let query = r"
        SELECT contact_address
        FROM session_identities
        WHERE session_id = $1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(session_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session identity")?;
    Ok(row.map(|row| row.get("contact_address")))
}
