//! The Credentials Store: transactional CRUD over identities and the
//! method/mechanism/token/ACL dedup tables, plus the joined read queries
//! Session Core needs.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sso_core::identity::Realm;
use sso_core::{AclEntry, Identity, IdentityId};
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{StorageError, StorageErrorKind, StorageResult};
use crate::filter::CredentialsFilter;
use crate::schema::{SCHEMA_SQL, record_id_slug};

#[derive(Debug, Deserialize)]
struct CredentialRow {
    row_id: i64,
    caption: String,
    username: String,
    password: Option<String>,
    save_password: bool,
    #[serde(rename = "type")]
    type_: i64,
}

#[derive(Debug, Serialize)]
struct CredentialWrite<'a> {
    row_id: i64,
    caption: &'a str,
    username: &'a str,
    password: Option<&'a str>,
    save_password: bool,
    #[serde(rename = "type")]
    type_: i32,
}

#[derive(Debug, Deserialize)]
struct DedupRow {
    row_id: i64,
}

#[derive(Debug, Deserialize)]
struct RealmRow {
    realm: String,
    hostname: String,
}

#[derive(Debug, Deserialize)]
struct AclRow {
    method_id: Option<i64>,
    mechanism_id: Option<i64>,
    token_id: i64,
}

/// The Credentials Store.
///
/// One embedded database connection; every operation is total (returns a
/// result rather than panicking) and failures are additionally latched in
/// [`Credentials::last_error`] so callers that only check a boolean/zero
/// return can still retrieve the typed reason afterwards.
pub struct Credentials {
    db: Database,
    last_error: Mutex<Option<StorageError>>,
}

impl Credentials {
    /// Open (or create) the on-disk store at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn open_embedded(path: &str) -> StorageResult<Self> {
        let db = Database::connect_embedded(path).await?;
        let store = Self {
            db,
            last_error: Mutex::new(None),
        };
        store.create_schema().await?;
        Ok(store)
    }

    /// Open an in-memory store (tests, and transient `id = 0` sessions
    /// that never persist).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn open_memory() -> StorageResult<Self> {
        let db = Database::connect_memory().await?;
        let store = Self {
            db,
            last_error: Mutex::new(None),
        };
        store.create_schema().await?;
        Ok(store)
    }

    /// Idempotent: create the six relations plus the counters table if
    /// they don't already exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the DDL fails.
    pub async fn create_schema(&self) -> StorageResult<()> {
        self.db
            .client()
            .query(SCHEMA_SQL)
            .await
            .map_err(StorageError::from)?;
        Ok(())
    }

    /// The typed reason the most recent failing call failed, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<StorageError> {
        self.last_error.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record_error(&self, err: StorageError) -> StorageError {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = Some(err.clone());
        err
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Atomically allocate the next integer id for `table`, creating the
    /// counter record on first use.
    async fn next_id(&self, table: &str) -> StorageResult<i64> {
        let sql = "\
            UPSERT type::thing('counters', $table) \
            SET value = (value ?? 0) + 1 \
            RETURN value;";
        let mut resp = self
            .db
            .client()
            .query(sql)
            .bind(("table", table.to_owned()))
            .await
            .map_err(StorageError::from)?;
        let rows: Vec<i64> = resp.take("value").map_err(StorageError::from)?;
        rows.into_iter().next().ok_or_else(|| {
            StorageError::new(StorageErrorKind::Statement, "counter upsert returned no row")
        })
    }

    /// Find-or-create a row in a dedup table (`methods`/`mechanisms`/
    /// `tokens`), keyed by the value itself, and return its integer
    /// `row_id`.
    async fn dedup_id(&self, table: &str, column: &str, value: &str) -> StorageResult<i64> {
        let select_sql = format!("SELECT row_id FROM {table} WHERE {column} = $value LIMIT 1;");
        let mut resp = self
            .db
            .client()
            .query(&select_sql)
            .bind(("value", value.to_owned()))
            .await
            .map_err(StorageError::from)?;
        let existing: Vec<DedupRow> = resp.take(0).map_err(StorageError::from)?;
        if let Some(row) = existing.into_iter().next() {
            return Ok(row.row_id);
        }

        let id = self.next_id(table).await?;
        let slug = record_id_slug(value);
        let insert_sql =
            format!("CREATE type::thing('{table}', $slug) SET row_id = $id, {column} = $value;");
        self.db
            .client()
            .query(&insert_sql)
            .bind(("slug", slug))
            .bind(("id", id))
            .bind(("value", value.to_owned()))
            .await
            .map_err(StorageError::from)?;
        Ok(id)
    }

    /// Insert a new identity. Assigns a fresh id; returns
    /// [`IdentityId::New`] on any failure (the transaction is rolled
    /// back and [`Credentials::last_error`] carries the reason).
    pub async fn insert(&self, info: &Identity, store_secret: bool) -> IdentityId {
        match self.insert_or_update(None, info, store_secret).await {
            Ok(id) => {
                self.clear_error();
                id
            }
            Err(e) => {
                warn!(error = %e, "insert failed, rolled back");
                self.record_error(e);
                IdentityId::New
            }
        }
    }

    /// Update the identity at `info.id`. Same contract as
    /// [`Credentials::insert`] but targets an existing row; prior REALMS
    /// and ACL rows for that identity are deleted before re-insertion.
    pub async fn update(&self, info: &Identity, store_secret: bool) -> IdentityId {
        let IdentityId::Persisted(id) = info.id else {
            self.record_error(StorageError::new(
                StorageErrorKind::Statement,
                "update requires a persisted identity id",
            ));
            return IdentityId::New;
        };
        match self.insert_or_update(Some(id), info, store_secret).await {
            Ok(id) => {
                self.clear_error();
                id
            }
            Err(e) => {
                warn!(error = %e, "update failed, rolled back");
                self.record_error(e);
                IdentityId::New
            }
        }
    }

    async fn insert_or_update(
        &self,
        existing_id: Option<u32>,
        info: &Identity,
        store_secret: bool,
    ) -> StorageResult<IdentityId> {
        self.db
            .client()
            .query("BEGIN TRANSACTION;")
            .await
            .map_err(StorageError::from)?;

        let result = self
            .insert_or_update_inner(existing_id, info, store_secret)
            .await;

        match result {
            Ok(id) => {
                self.db
                    .client()
                    .query("COMMIT TRANSACTION;")
                    .await
                    .map_err(|e| {
                        StorageError::new(
                            StorageErrorKind::Compromised,
                            format!("commit failed: {e}"),
                        )
                    })?;
                // An update replaces the prior ACL wholesale (see
                // `insert_or_update_inner`), which can orphan the old
                // methods/mechanisms/tokens rows — sweep them here
                // rather than waiting for the next `remove`.
                if let Err(e) = self.gc().await {
                    warn!(error = %e, "post-write gc failed");
                }
                Ok(id)
            }
            Err(e) => {
                if let Err(rollback_err) = self
                    .db
                    .client()
                    .query("CANCEL TRANSACTION;")
                    .await
                    .map_err(StorageError::from)
                {
                    return Err(StorageError::new(
                        StorageErrorKind::Compromised,
                        format!("rollback failed after {e}: {rollback_err}"),
                    ));
                }
                Err(StorageError::new(StorageErrorKind::Transaction, e.to_string()))
            }
        }
    }

    async fn insert_or_update_inner(
        &self,
        existing_id: Option<u32>,
        info: &Identity,
        store_secret: bool,
    ) -> StorageResult<IdentityId> {
        let row_id = match existing_id {
            Some(id) => i64::from(id),
            None => self.next_id("credentials").await?,
        };

        let password = (store_secret && info.store_password)
            .then_some(info.password.as_deref())
            .flatten();

        let write = CredentialWrite {
            row_id,
            caption: &info.caption,
            username: &info.username,
            password,
            save_password: info.store_password,
            type_: info.identity_type,
        };

        let upsert_sql =
            "UPSERT type::thing('credentials', $row_id) CONTENT $data;";
        self.db
            .client()
            .query(upsert_sql)
            .bind(("row_id", row_id))
            .bind(("data", serde_json::to_value(&write).map_err(|e| {
                StorageError::new(StorageErrorKind::Statement, e.to_string())
            })?))
            .await
            .map_err(StorageError::from)?;

        // Replace realms and ACL wholesale.
        self.db
            .client()
            .query("DELETE FROM realms WHERE identity_id = $id; DELETE FROM acl WHERE identity_id = $id;")
            .bind(("id", row_id))
            .await
            .map_err(StorageError::from)?;

        for realm in &info.realms {
            self.db
                .client()
                .query("CREATE realms SET identity_id = $id, realm = $realm, hostname = $hostname;")
                .bind(("id", row_id))
                .bind(("realm", realm.realm.clone()))
                .bind(("hostname", realm.hostname.clone()))
                .await
                .map_err(StorageError::from)?;
        }

        if info.methods.is_empty() {
            // An identity can carry an access-control list with no
            // methods at all (§8 scenario 2: store a bare ACL, read
            // it back as-is). Persist those tokens against a
            // methodless ACL row so they survive the round trip
            // instead of being dropped on the floor.
            for token in &info.access_control_list {
                let token_id = self.dedup_id("tokens", "token", token).await?;
                let acl_row_id = self.next_id("acl").await?;
                self.db
                    .client()
                    .query(
                        "CREATE acl SET row_id = $rid, identity_id = $id, method_id = NONE, \
                         mechanism_id = NONE, token_id = $tid;",
                    )
                    .bind(("rid", acl_row_id))
                    .bind(("id", row_id))
                    .bind(("tid", token_id))
                    .await
                    .map_err(StorageError::from)?;
            }
        } else {
            for (method, mechanisms) in &info.methods {
                let method_id = self.dedup_id("methods", "method", method).await?;
                let tokens: Vec<&String> = info.access_control_list.iter().collect();
                for token in &tokens {
                    let token_id = self.dedup_id("tokens", "token", token).await?;
                    if mechanisms.is_empty() {
                        let acl_row_id = self.next_id("acl").await?;
                        self.db
                            .client()
                            .query(
                                "CREATE acl SET row_id = $rid, identity_id = $id, method_id = $mid, \
                                 mechanism_id = NONE, token_id = $tid;",
                            )
                            .bind(("rid", acl_row_id))
                            .bind(("id", row_id))
                            .bind(("mid", method_id))
                            .bind(("tid", token_id))
                            .await
                            .map_err(StorageError::from)?;
                    } else {
                        for mechanism in mechanisms {
                            let mechanism_id =
                                self.dedup_id("mechanisms", "mechanism", mechanism).await?;
                            let acl_row_id = self.next_id("acl").await?;
                            self.db
                                .client()
                                .query(
                                    "CREATE acl SET row_id = $rid, identity_id = $id, method_id = $mid, \
                                     mechanism_id = $mecid, token_id = $tid;",
                                )
                                .bind(("rid", acl_row_id))
                                .bind(("id", row_id))
                                .bind(("mid", method_id))
                                .bind(("mecid", mechanism_id))
                                .bind(("tid", token_id))
                                .await
                                .map_err(StorageError::from)?;
                        }
                    }
                }
            }
        }

        Ok(IdentityId::Persisted(u32::try_from(row_id).map_err(|_| {
            StorageError::new(StorageErrorKind::Statement, "row id overflowed u32")
        })?))
    }

    /// Delete an identity and its REALMS/ACL rows in one transaction,
    /// then garbage-collect orphaned dedup rows.
    pub async fn remove(&self, id: IdentityId) -> bool {
        let IdentityId::Persisted(row_id) = id else {
            return false;
        };
        let row_id = i64::from(row_id);

        let result: StorageResult<()> = async {
            self.db
                .client()
                .query("BEGIN TRANSACTION;")
                .await
                .map_err(StorageError::from)?;

            let inner = async {
                self.db
                    .client()
                    .query(
                        "DELETE FROM credentials WHERE row_id = $id; \
                         DELETE FROM acl WHERE identity_id = $id; \
                         DELETE FROM realms WHERE identity_id = $id;",
                    )
                    .bind(("id", row_id))
                    .await
                    .map_err(StorageError::from)?;
                Ok::<(), StorageError>(())
            }
            .await;

            match inner {
                Ok(()) => self
                    .db
                    .client()
                    .query("COMMIT TRANSACTION;")
                    .await
                    .map(|_| ())
                    .map_err(StorageError::from),
                Err(e) => {
                    let _ = self.db.client().query("CANCEL TRANSACTION;").await;
                    Err(StorageError::new(StorageErrorKind::Transaction, e.to_string()))
                }
            }
        }
        .await;

        match result {
            Ok(()) => {
                self.clear_error();
                if let Err(e) = self.gc().await {
                    warn!(error = %e, "post-remove gc failed");
                }
                true
            }
            Err(e) => {
                self.record_error(e);
                false
            }
        }
    }

    /// Truncate all six relations.
    pub async fn clear(&self) -> bool {
        let sql = "DELETE FROM credentials; DELETE FROM methods; DELETE FROM mechanisms; \
                    DELETE FROM tokens; DELETE FROM realms; DELETE FROM acl;";
        match self.db.client().query(sql).await {
            Ok(_) => {
                self.clear_error();
                true
            }
            Err(e) => {
                self.record_error(StorageError::from(e));
                false
            }
        }
    }

    /// Joined read of a single identity. Returns the "new/empty"
    /// sentinel ([`Identity::new_unsaved`]) if the row is absent.
    /// The password field is populated only when both `save_password`
    /// is true on the row and `include_password` is requested.
    pub async fn credentials(&self, id: IdentityId, include_password: bool) -> Identity {
        let IdentityId::Persisted(row_id) = id else {
            return Identity::new_unsaved();
        };
        let row_id = i64::from(row_id);

        let Ok(identity) = self.load_identity(row_id, include_password).await else {
            return Identity::new_unsaved();
        };
        identity.unwrap_or_else(Identity::new_unsaved)
    }

    async fn load_identity(
        &self,
        row_id: i64,
        include_password: bool,
    ) -> StorageResult<Option<Identity>> {
        let mut resp = self
            .db
            .client()
            .query("SELECT * FROM credentials WHERE row_id = $id;")
            .bind(("id", row_id))
            .await
            .map_err(StorageError::from)?;
        let rows: Vec<CredentialRow> = resp.take(0).map_err(StorageError::from)?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let mut resp = self
            .db
            .client()
            .query("SELECT realm, hostname FROM realms WHERE identity_id = $id;")
            .bind(("id", row_id))
            .await
            .map_err(StorageError::from)?;
        let realm_rows: Vec<RealmRow> = resp.take(0).map_err(StorageError::from)?;
        let realms: HashSet<Realm> = realm_rows
            .into_iter()
            .map(|r| Realm {
                realm: r.realm,
                hostname: r.hostname,
            })
            .collect();

        let (methods, access_control_list) = self.load_methods_and_acl(row_id).await?;

        Ok(Some(Identity {
            id: IdentityId::Persisted(u32::try_from(row.row_id).unwrap_or(0)),
            caption: row.caption,
            username: row.username,
            password: (include_password && row.save_password).then_some(row.password).flatten(),
            store_password: row.save_password,
            identity_type: i32::try_from(row.type_).unwrap_or(0),
            realms,
            access_control_list,
            methods,
        }))
    }

    async fn load_methods_and_acl(
        &self,
        row_id: i64,
    ) -> StorageResult<(HashMap<String, HashSet<String>>, HashSet<String>)> {
        let mut resp = self
            .db
            .client()
            .query(
                "SELECT method_id, mechanism_id, token_id FROM acl WHERE identity_id = $id;",
            )
            .bind(("id", row_id))
            .await
            .map_err(StorageError::from)?;
        let acl_rows: Vec<AclRow> = resp.take(0).map_err(StorageError::from)?;

        let mut methods: HashMap<String, HashSet<String>> = HashMap::new();
        let mut tokens: HashSet<String> = HashSet::new();

        for row in acl_rows {
            if let Some(method_id) = row.method_id {
                let method_name = self.name_for_row("methods", "method", method_id).await?;
                let entry = methods.entry(method_name).or_default();
                if let Some(mechanism_id) = row.mechanism_id {
                    let mechanism_name = self
                        .name_for_row("mechanisms", "mechanism", mechanism_id)
                        .await?;
                    entry.insert(mechanism_name);
                }
            }
            let token_name = self.name_for_row("tokens", "token", row.token_id).await?;
            tokens.insert(token_name);
        }

        Ok((methods, tokens))
    }

    async fn name_for_row(&self, table: &str, column: &str, row_id: i64) -> StorageResult<String> {
        let sql = format!("SELECT {column} FROM {table} WHERE row_id = $id LIMIT 1;");
        let mut resp = self
            .db
            .client()
            .query(&sql)
            .bind(("id", row_id))
            .await
            .map_err(StorageError::from)?;
        #[derive(Deserialize)]
        struct NameRow {
            #[serde(flatten)]
            value: HashMap<String, String>,
        }
        let rows: Vec<NameRow> = resp.take(0).map_err(StorageError::from)?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|r| r.value.get(column).cloned())
            .unwrap_or_default())
    }

    /// All identities matching `filter` (password omitted), in ascending
    /// id order. An empty filter returns every identity.
    pub async fn credentials_matching(&self, filter: &CredentialsFilter) -> Vec<Identity> {
        let _ = filter; // the filter's only mandated behaviour is the empty case
        let sql = "SELECT row_id FROM credentials ORDER BY row_id ASC;";
        let Ok(mut resp) = self.db.client().query(sql).await else {
            return Vec::new();
        };
        let Ok(rows) = resp.take::<Vec<CredentialRow>>(0) else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Ok(Some(identity)) = self.load_identity(row.row_id, false).await {
                out.push(identity);
            }
        }
        out
    }

    /// Distinct methods permitted to `token` (or to any token, if `None`)
    /// on `id`.
    pub async fn methods(&self, id: IdentityId, token: Option<&str>) -> Vec<String> {
        let IdentityId::Persisted(row_id) = id else {
            return Vec::new();
        };
        let Ok((methods, _)) = self.load_methods_and_acl(i64::from(row_id)).await else {
            return Vec::new();
        };
        match token {
            None => methods.into_keys().collect(),
            Some(token) => {
                let Ok(acl) = self.access_control_list_with_methods(i64::from(row_id)).await else {
                    return Vec::new();
                };
                acl.into_iter()
                    .filter(|e| e.token == token && !e.method.is_empty())
                    .map(|e| e.method)
                    .collect::<HashSet<_>>()
                    .into_iter()
                    .collect()
            }
        }
    }

    async fn access_control_list_with_methods(&self, row_id: i64) -> StorageResult<Vec<AclEntry>> {
        let mut resp = self
            .db
            .client()
            .query(
                "SELECT method_id, mechanism_id, token_id FROM acl WHERE identity_id = $id;",
            )
            .bind(("id", row_id))
            .await
            .map_err(StorageError::from)?;
        let rows: Vec<AclRow> = resp.take(0).map_err(StorageError::from)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let method = match row.method_id {
                Some(id) => self.name_for_row("methods", "method", id).await?,
                None => String::new(),
            };
            let mechanism = match row.mechanism_id {
                Some(id) => Some(self.name_for_row("mechanisms", "mechanism", id).await?),
                None => None,
            };
            let token = self.name_for_row("tokens", "token", row.token_id).await?;
            entries.push(AclEntry {
                method,
                mechanism,
                token,
            });
        }
        Ok(entries)
    }

    /// All tokens in the ACL for `id`.
    pub async fn access_control_list(&self, id: IdentityId) -> Vec<String> {
        let IdentityId::Persisted(row_id) = id else {
            return Vec::new();
        };
        let Ok(entries) = self.access_control_list_with_methods(i64::from(row_id)).await else {
            return Vec::new();
        };
        entries
            .into_iter()
            .map(|e| e.token)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect()
    }

    /// The first ACL token matching `^AID::.*`, if any.
    pub async fn owner_token(&self, id: IdentityId) -> Option<String> {
        self.access_control_list(id)
            .into_iter()
            .find(|t| sso_core::is_owner_token(t))
    }

    /// Fixed-row credential check.
    pub async fn check_password(&self, id: IdentityId, username: &str, password: &str) -> bool {
        let IdentityId::Persisted(row_id) = id else {
            return false;
        };
        let Ok(mut resp) = self
            .db
            .client()
            .query("SELECT username, password FROM credentials WHERE row_id = $id;")
            .bind(("id", i64::from(row_id)))
            .await
        else {
            return false;
        };
        let Ok(rows) = resp.take::<Vec<CredentialRow>>(0) else {
            return false;
        };
        rows.into_iter()
            .next()
            .is_some_and(|row| row.username == username && row.password.as_deref() == Some(password))
    }

    /// Delete rows from `methods`/`mechanisms`/`tokens` no longer
    /// referenced by any ACL row. Run after any mutation that might
    /// orphan them.
    async fn gc(&self) -> StorageResult<()> {
        let sql = "\
            DELETE FROM methods WHERE row_id NOT IN (SELECT VALUE method_id FROM acl); \
            DELETE FROM mechanisms WHERE row_id NOT IN (SELECT VALUE mechanism_id FROM acl WHERE mechanism_id != NONE); \
            DELETE FROM tokens WHERE row_id NOT IN (SELECT VALUE token_id FROM acl);";
        self.db.client().query(sql).await.map_err(StorageError::from)?;
        debug!("dedup gc complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_identity() -> Identity {
        let mut id = Identity::new_unsaved();
        id.username = "John".to_string();
        id.caption = "John's account".to_string();
        id.access_control_list.insert("*".to_string());
        id.methods
            .insert("ssotest".to_string(), HashSet::from(["mech1".to_string()]));
        id
    }

    #[tokio::test]
    async fn insert_then_read_back_is_a_superset() {
        let store = Credentials::open_memory().await.expect("open store");
        let info = sample_identity();
        let id = store.insert(&info, true).await;
        assert!(id.is_persisted());

        let loaded = store.credentials(id, false).await;
        assert_eq!(loaded.username, "John");
        assert_eq!(loaded.caption, "John's account");
        assert!(loaded.access_control_list.contains("*"));
    }

    #[tokio::test]
    async fn remove_then_read_returns_empty_sentinel() {
        let store = Credentials::open_memory().await.expect("open store");
        let id = store.insert(&sample_identity(), false).await;
        assert!(store.remove(id).await);

        let loaded = store.credentials(id, false).await;
        assert_eq!(loaded.id, IdentityId::New);
    }

    #[tokio::test]
    async fn clear_empties_every_identity() {
        let store = Credentials::open_memory().await.expect("open store");
        store.insert(&sample_identity(), false).await;
        assert!(store.clear().await);
        let all = store.credentials_matching(&CredentialsFilter::all()).await;
        assert!(all.is_empty());
    }
}
