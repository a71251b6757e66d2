//! Schema definition for the six CS relations.
//!
//! `CREDENTIALS`, `METHODS`, `MECHANISMS`, and `TOKENS` use the dedup-target
//! string itself as the SurrealDB record id (`methods:⟨ssotest⟩`), which
//! gives uniqueness for free; `row_id` is still carried as an explicit
//! integer field so `ACL` rows can reference rows by the plain integer id
//! the distilled spec's schema calls for. `counters` holds one record per
//! table, incremented inside the same transaction as the row it numbers —
//! this is how autoincrement integer ids are emulated without relying on
//! a feature SurrealDB does not expose directly.

/// Idempotent DDL for all six relations plus the id-counter table.
pub const SCHEMA_SQL: &str = r#"
DEFINE TABLE IF NOT EXISTS credentials SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS row_id ON credentials TYPE int;
DEFINE FIELD IF NOT EXISTS caption ON credentials TYPE string DEFAULT '';
DEFINE FIELD IF NOT EXISTS username ON credentials TYPE string DEFAULT '';
DEFINE FIELD IF NOT EXISTS password ON credentials TYPE option<string>;
DEFINE FIELD IF NOT EXISTS save_password ON credentials TYPE bool DEFAULT false;
DEFINE FIELD IF NOT EXISTS type ON credentials TYPE int DEFAULT 0;
DEFINE INDEX IF NOT EXISTS credentials_row_id ON credentials FIELDS row_id UNIQUE;

DEFINE TABLE IF NOT EXISTS methods SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS row_id ON methods TYPE int;
DEFINE FIELD IF NOT EXISTS method ON methods TYPE string;
DEFINE INDEX IF NOT EXISTS methods_row_id ON methods FIELDS row_id UNIQUE;

DEFINE TABLE IF NOT EXISTS mechanisms SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS row_id ON mechanisms TYPE int;
DEFINE FIELD IF NOT EXISTS mechanism ON mechanisms TYPE string;
DEFINE INDEX IF NOT EXISTS mechanisms_row_id ON mechanisms FIELDS row_id UNIQUE;

DEFINE TABLE IF NOT EXISTS tokens SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS row_id ON tokens TYPE int;
DEFINE FIELD IF NOT EXISTS token ON tokens TYPE string;
DEFINE INDEX IF NOT EXISTS tokens_row_id ON tokens FIELDS row_id UNIQUE;

DEFINE TABLE IF NOT EXISTS realms SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS identity_id ON realms TYPE int;
DEFINE FIELD IF NOT EXISTS realm ON realms TYPE string;
DEFINE FIELD IF NOT EXISTS hostname ON realms TYPE string;

DEFINE TABLE IF NOT EXISTS acl SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS row_id ON acl TYPE int;
DEFINE FIELD IF NOT EXISTS identity_id ON acl TYPE int;
DEFINE FIELD IF NOT EXISTS method_id ON acl TYPE option<int>;
DEFINE FIELD IF NOT EXISTS mechanism_id ON acl TYPE option<int>;
DEFINE FIELD IF NOT EXISTS token_id ON acl TYPE int;
DEFINE INDEX IF NOT EXISTS acl_row_id ON acl FIELDS row_id UNIQUE;

DEFINE TABLE IF NOT EXISTS counters SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS value ON counters TYPE int DEFAULT 0;
"#;

/// Turn an arbitrary dedup-table value (a method/mechanism/token string)
/// into a record-id-safe slug. SurrealDB record ids accept most UTF-8 text
/// when quoted with `⟨…⟩`; this only guards against the literal `⟩`
/// character so a malicious method name can't break out of the id.
#[must_use]
pub fn record_id_slug(value: &str) -> String {
    value.replace('⟩', "_")
}
