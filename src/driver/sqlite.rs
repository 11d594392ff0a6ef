use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value as SqlValue};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use serde::de::DeserializeOwned;

use super::schema::SCHEMA;
use super::{AppQuery, DeploymentQuery, Driver, PackageQuery, UserQuery};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::types::*;

const USER_COLUMNS: &str = "SELECT id, email, name, access_keys, linked_providers FROM users";
const APP_COLUMNS: &str = "SELECT id, name, collaborators FROM apps";
const DEPLOYMENT_COLUMNS: &str = "SELECT id, app_id, name, key, history FROM deployments";
const PACKAGE_COLUMNS: &str = "SELECT id, label, app_version, description, package_hash, is_mandatory, rollout,
        size, release_method, original_label, original_deployment, released_by, created
     FROM packages";

pub struct SqliteDriver {
    conn: Mutex<Connection>,
}

impl SqliteDriver {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())?;
        tracing::debug!(path = %db_path.as_ref().display(), "sqlite driver opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    /// Opens the database described by `config`, creating its data
    /// directory when missing.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let driver = Self::new(config.db_path())?;
        driver.conn().busy_timeout(config.busy_timeout())?;
        Ok(driver)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn select<T, F>(&self, base: &str, filter: &Filter, suffix: &str, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let conn = self.conn();
        let sql = format!("{base}{}{suffix}", filter.where_clause());
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(filter.values.iter()), map)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn select_one<T, F>(&self, base: &str, filter: &Filter, map: F) -> Result<Option<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        Ok(self
            .select(base, filter, " ORDER BY rowid LIMIT 1", map)?
            .into_iter()
            .next())
    }
}

/// WHERE clause assembled from a partial-attribute query.
#[derive(Default)]
struct Filter {
    clauses: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filter {
    fn bind(&mut self, value: &str) -> usize {
        self.values.push(SqlValue::Text(value.to_string()));
        self.values.len()
    }

    fn with(&mut self, value: Option<&String>, clause: impl FnOnce(usize) -> String) {
        if let Some(value) = value {
            let idx = self.bind(value);
            self.clauses.push(clause(idx));
        }
    }

    fn eq(&mut self, column: &str, value: Option<&String>) {
        self.with(value, |idx| format!("{column} = ?{idx}"));
    }

    fn any_of(&mut self, column: &str, values: Option<&Vec<String>>) {
        let Some(values) = values else {
            return;
        };
        if values.is_empty() {
            self.clauses.push("0".to_string());
            return;
        }
        let placeholders: Vec<String> = values
            .iter()
            .map(|v| format!("?{}", self.bind(v)))
            .collect();
        self.clauses
            .push(format!("{column} IN ({})", placeholders.join(", ")));
    }

    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn users(query: &UserQuery) -> Self {
        let mut filter = Self::default();
        filter.eq("id", query.id.as_ref());
        filter.eq("email", query.email.as_ref());
        filter.with(query.access_key.as_ref(), |idx| {
            format!(
                "EXISTS (SELECT 1 FROM json_each(users.access_keys)
                 WHERE json_extract(json_each.value, '$.name') = ?{idx})"
            )
        });
        filter
    }

    fn apps(query: &AppQuery) -> Self {
        let mut filter = Self::default();
        filter.eq("id", query.id.as_ref());
        filter.eq("name", query.name.as_ref());
        filter.with(query.collaborator.as_ref(), |idx| {
            format!("EXISTS (SELECT 1 FROM json_each(apps.collaborators) WHERE json_each.key = ?{idx})")
        });
        filter
    }

    fn deployments(query: &DeploymentQuery) -> Self {
        let mut filter = Self::default();
        filter.eq("app_id", query.app_id.as_ref());
        filter.any_of("name", query.names.as_ref());
        filter.eq("key", query.key.as_ref());
        filter
    }

    fn packages(query: &PackageQuery) -> Self {
        let mut filter = Self::default();
        filter.any_of("id", query.ids.as_ref());
        filter.eq("label", query.label.as_ref());
        filter
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn json_column<T: DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        access_keys: json_column(row, 3)?,
        linked_providers: json_column(row, 4)?,
    })
}

fn app_from_row(row: &Row<'_>) -> rusqlite::Result<App> {
    Ok(App {
        id: row.get(0)?,
        name: row.get(1)?,
        collaborators: json_column(row, 2)?,
    })
}

fn deployment_from_row(row: &Row<'_>) -> rusqlite::Result<Deployment> {
    Ok(Deployment {
        id: row.get(0)?,
        app_id: row.get(1)?,
        name: row.get(2)?,
        key: row.get(3)?,
        history: json_column(row, 4)?,
    })
}

fn package_from_row(row: &Row<'_>) -> rusqlite::Result<Package> {
    Ok(Package {
        id: row.get(0)?,
        label: row.get(1)?,
        app_version: row.get(2)?,
        description: row.get(3)?,
        package_hash: row.get(4)?,
        is_mandatory: row.get(5)?,
        rollout: row.get(6)?,
        size: row.get(7)?,
        release_method: row.get(8)?,
        original_label: row.get(9)?,
        original_deployment: row.get(10)?,
        released_by: row.get(11)?,
        created: parse_datetime(&row.get::<_, String>(12)?),
    })
}

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<Metric> {
    let status: String = row.get(3)?;
    let status = MetricStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown metric status '{status}'").into(),
        )
    })?;

    Ok(Metric {
        deployment_key: row.get(0)?,
        client_unique_id: row.get(1)?,
        label: row.get(2)?,
        status,
        app_version: row.get(4)?,
        previous_label_or_app_version: row.get(5)?,
        previous_deployment_key: row.get(6)?,
    })
}

fn constraint_code(e: &rusqlite::Error) -> Option<i32> {
    match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Some(err.extended_code)
        }
        _ => None,
    }
}

fn is_duplicate(e: &rusqlite::Error) -> bool {
    matches!(
        constraint_code(e),
        Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

/// Maps a duplicate-key failure to `Ok(false)`.
fn inserted(result: rusqlite::Result<usize>) -> Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) if is_duplicate(&e) => Ok(false),
        Err(e) => Err(Error::from(e)),
    }
}

fn updated(result: rusqlite::Result<usize>, what: &str, id: &str) -> Result<()> {
    match result {
        Ok(0) => Err(Error::not_found(format!("{what} {id}"))),
        Ok(_) => Ok(()),
        Err(e) if is_duplicate(&e) => Err(Error::already_exists(format!("{what} {id}"))),
        Err(e) => Err(Error::from(e)),
    }
}

#[async_trait]
impl Driver for SqliteDriver {
    async fn init(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        tracing::debug!("sqlite schema initialized");
        Ok(())
    }

    // User operations

    async fn find_user(&self, query: &UserQuery) -> Result<Option<User>> {
        self.select_one(USER_COLUMNS, &Filter::users(query), user_from_row)
    }

    async fn insert_user(&self, user: &User) -> Result<bool> {
        inserted(self.conn().execute(
            "INSERT INTO users (id, email, name, access_keys, linked_providers)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.email,
                user.name,
                serde_json::to_string(&user.access_keys)?,
                serde_json::to_string(&user.linked_providers)?,
            ],
        ))
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE users SET email = ?1, name = ?2, access_keys = ?3, linked_providers = ?4,
                updated_at = datetime('now')
             WHERE id = ?5",
            params![
                user.email,
                user.name,
                serde_json::to_string(&user.access_keys)?,
                serde_json::to_string(&user.linked_providers)?,
                user.id,
            ],
        );
        updated(result, "user", &user.id)
    }

    // App operations

    async fn find_app(&self, query: &AppQuery) -> Result<Option<App>> {
        self.select_one(APP_COLUMNS, &Filter::apps(query), app_from_row)
    }

    async fn find_apps(&self, query: &AppQuery) -> Result<Vec<App>> {
        self.select(APP_COLUMNS, &Filter::apps(query), " ORDER BY rowid", app_from_row)
    }

    async fn insert_app(&self, app: &App) -> Result<bool> {
        inserted(self.conn().execute(
            "INSERT INTO apps (id, name, collaborators) VALUES (?1, ?2, ?3)",
            params![app.id, app.name, serde_json::to_string(&app.collaborators)?],
        ))
    }

    async fn update_app(&self, app: &App) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE apps SET name = ?1, collaborators = ?2, updated_at = datetime('now') WHERE id = ?3",
            params![app.name, serde_json::to_string(&app.collaborators)?, app.id],
        );
        updated(result, "app", &app.id)
    }

    async fn delete_app(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM apps WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Deployment operations

    async fn find_deployment(&self, query: &DeploymentQuery) -> Result<Option<Deployment>> {
        self.select_one(
            DEPLOYMENT_COLUMNS,
            &Filter::deployments(query),
            deployment_from_row,
        )
    }

    async fn find_deployments(&self, query: &DeploymentQuery) -> Result<Vec<Deployment>> {
        self.select(
            DEPLOYMENT_COLUMNS,
            &Filter::deployments(query),
            " ORDER BY rowid",
            deployment_from_row,
        )
    }

    async fn insert_deployment(&self, deployment: &Deployment) -> Result<bool> {
        let result = self.conn().execute(
            "INSERT INTO deployments (id, app_id, name, key, history) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                deployment.id,
                deployment.app_id,
                deployment.name,
                deployment.key,
                serde_json::to_string(&deployment.history)?,
            ],
        );

        match result {
            Err(ref e)
                if constraint_code(e) == Some(rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY) =>
            {
                Err(Error::not_found(format!("app {}", deployment.app_id)))
            }
            other => inserted(other),
        }
    }

    async fn rename_deployment(&self, id: &str, name: &str) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE deployments SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![name, id],
        );
        updated(result, "deployment", id)
    }

    async fn delete_deployment(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM deployments WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    async fn associate_package(&self, deployment_id: &str, package_id: &str) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let history: Option<String> = tx
            .query_row(
                "SELECT history FROM deployments WHERE id = ?1",
                params![deployment_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(history) = history else {
            return Err(Error::not_found(format!("deployment {deployment_id}")));
        };

        let mut ids: Vec<String> = serde_json::from_str(&history)?;
        ids.insert(0, package_id.to_string());

        tx.execute(
            "UPDATE deployments SET history = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![serde_json::to_string(&ids)?, deployment_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn dissociate_packages(
        &self,
        deployment_id: &str,
        package_ids: &[String],
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let history: Option<String> = tx
            .query_row(
                "SELECT history FROM deployments WHERE id = ?1",
                params![deployment_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(history) = history else {
            return Err(Error::not_found(format!("deployment {deployment_id}")));
        };

        let mut ids: Vec<String> = serde_json::from_str(&history)?;
        ids.retain(|id| !package_ids.contains(id));

        tx.execute(
            "UPDATE deployments SET history = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![serde_json::to_string(&ids)?, deployment_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    // Package operations

    async fn find_package(&self, query: &PackageQuery) -> Result<Option<Package>> {
        self.select_one(PACKAGE_COLUMNS, &Filter::packages(query), package_from_row)
    }

    async fn find_packages(&self, query: &PackageQuery) -> Result<Vec<Package>> {
        self.select(PACKAGE_COLUMNS, &Filter::packages(query), "", package_from_row)
    }

    async fn insert_package(&self, pkg: &Package) -> Result<bool> {
        inserted(self.conn().execute(
            "INSERT INTO packages (id, label, app_version, description, package_hash, is_mandatory,
                rollout, size, release_method, original_label, original_deployment, released_by, created)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                pkg.id,
                pkg.label,
                pkg.app_version,
                pkg.description,
                pkg.package_hash,
                pkg.is_mandatory,
                pkg.rollout,
                pkg.size,
                pkg.release_method,
                pkg.original_label,
                pkg.original_deployment,
                pkg.released_by,
                format_datetime(&pkg.created),
            ],
        ))
    }

    async fn update_package(&self, pkg: &Package) -> Result<()> {
        let result = self.conn().execute(
            "UPDATE packages SET label = ?1, app_version = ?2, description = ?3, package_hash = ?4,
                is_mandatory = ?5, rollout = ?6, size = ?7, release_method = ?8, released_by = ?9
             WHERE id = ?10",
            params![
                pkg.label,
                pkg.app_version,
                pkg.description,
                pkg.package_hash,
                pkg.is_mandatory,
                pkg.rollout,
                pkg.size,
                pkg.release_method,
                pkg.released_by,
                pkg.id,
            ],
        );
        updated(result, "package", &pkg.id)
    }

    async fn delete_packages(&self, query: &PackageQuery) -> Result<u64> {
        let filter = Filter::packages(query);
        let rows = self.conn().execute(
            &format!("DELETE FROM packages{}", filter.where_clause()),
            params_from_iter(filter.values.iter()),
        )?;
        Ok(rows as u64)
    }

    // Package content operations

    async fn find_content(&self, package_hash: &str) -> Result<Option<PackageContent>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT package_hash, content, version FROM packages_content WHERE package_hash = ?1",
            params![package_hash],
            |row| {
                Ok(PackageContent {
                    package_hash: row.get(0)?,
                    content: Bytes::from(row.get::<_, Vec<u8>>(1)?),
                    version: row.get(2)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    async fn insert_content(&self, content: &PackageContent) -> Result<bool> {
        inserted(self.conn().execute(
            "INSERT INTO packages_content (package_hash, content, version) VALUES (?1, ?2, ?3)",
            params![
                content.package_hash,
                content.content.as_ref(),
                content.version
            ],
        ))
    }

    // Metric operations

    async fn find_metrics(&self, deployment_key: &str) -> Result<Vec<Metric>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT deployment_key, client_unique_id, label, status, app_version,
                previous_label_or_app_version, previous_deployment_key
             FROM metrics WHERE deployment_key = ?1",
        )?;

        let rows = stmt.query_map(params![deployment_key], metric_from_row)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    async fn insert_metric(&self, metric: &Metric) -> Result<()> {
        self.conn().execute(
            "INSERT INTO metrics (deployment_key, client_unique_id, label, status, app_version,
                previous_label_or_app_version, previous_deployment_key)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                metric.deployment_key,
                metric.client_unique_id,
                metric.label,
                metric.status.as_str(),
                metric.app_version,
                metric.previous_label_or_app_version,
                metric.previous_deployment_key,
            ],
        )?;
        Ok(())
    }

    // Client ratio operations

    async fn find_client_ratio(
        &self,
        client_unique_id: &str,
        package_hash: &str,
    ) -> Result<Option<ClientRatio>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT client_unique_id, package_hash, ratio, updated
             FROM client_ratios WHERE client_unique_id = ?1 AND package_hash = ?2",
            params![client_unique_id, package_hash],
            |row| {
                Ok(ClientRatio {
                    client_unique_id: row.get(0)?,
                    package_hash: row.get(1)?,
                    ratio: row.get(2)?,
                    updated: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    async fn upsert_client_ratio(&self, ratio: &ClientRatio) -> Result<()> {
        self.conn().execute(
            "INSERT INTO client_ratios (client_unique_id, package_hash, ratio, updated)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(client_unique_id, package_hash) DO UPDATE SET
                ratio = excluded.ratio,
                updated = excluded.updated,
                updated_at = datetime('now')",
            params![
                ratio.client_unique_id,
                ratio.package_hash,
                ratio.ratio,
                ratio.updated
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use tempfile::TempDir;

    async fn driver(temp: &TempDir) -> SqliteDriver {
        let driver = SqliteDriver::new(temp.path().join("test.db")).unwrap();
        driver.init().await.unwrap();
        driver
    }

    #[tokio::test]
    async fn test_initialize_creates_tables() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let conn = driver.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "apps",
            "deployments",
            "packages",
            "packages_content",
            "metrics",
            "client_ratios",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_not_inserted() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let first = User::new(NewUser::new("dev@example.com", "Dev"));
        let second = User::new(NewUser::new("dev@example.com", "Other"));

        assert!(driver.insert_user(&first).await.unwrap());
        assert!(!driver.insert_user(&second).await.unwrap());
    }

    #[tokio::test]
    async fn test_user_lookup_by_access_key() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let user = User::new(NewUser::new("dev@example.com", "Dev").with_access_key(AccessKey {
            name: Some("tok-1".to_string()),
            created_by: Some("cli".to_string()),
            ..AccessKey::default()
        }));
        driver.insert_user(&user).await.unwrap();

        let found = driver
            .find_user(&UserQuery::access_key("tok-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found, user);
        assert!(
            driver
                .find_user(&UserQuery::access_key("tok-2"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_apps_by_collaborator() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let mut collaborators = BTreeMap::new();
        collaborators.insert("owner@example.com".to_string(), CollaboratorRole::Owner);
        let app = App::new("MyApp", collaborators);
        driver.insert_app(&app).await.unwrap();
        driver
            .insert_app(&App::new("Other", BTreeMap::new()))
            .await
            .unwrap();

        let apps = driver
            .find_apps(&AppQuery::collaborator("owner@example.com"))
            .await
            .unwrap();
        assert_eq!(apps, vec![app.clone()]);

        let by_name = driver
            .find_app(&AppQuery::collaborator("owner@example.com").name("MyApp"))
            .await
            .unwrap();
        assert_eq!(by_name, Some(app));
    }

    #[tokio::test]
    async fn test_deployment_requires_app() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let result = driver
            .insert_deployment(&Deployment::new("missing", "Staging", "k1"))
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_deleting_app_cascades_to_deployments() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let app = App::new("MyApp", BTreeMap::new());
        driver.insert_app(&app).await.unwrap();
        driver
            .insert_deployment(&Deployment::new(&app.id, "Staging", "k1"))
            .await
            .unwrap();

        assert!(driver.delete_app(&app.id).await.unwrap());
        assert!(
            driver
                .find_deployment(&DeploymentQuery::key("k1"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_associate_prepends_to_history() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let app = App::new("MyApp", BTreeMap::new());
        driver.insert_app(&app).await.unwrap();
        let dep = Deployment::new(&app.id, "Staging", "k1");
        driver.insert_deployment(&dep).await.unwrap();

        driver.associate_package(&dep.id, "p1").await.unwrap();
        driver.associate_package(&dep.id, "p2").await.unwrap();

        let found = driver
            .find_deployment(&DeploymentQuery::key("k1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.history, vec!["p2".to_string(), "p1".to_string()]);

        let missing = driver.associate_package("nope", "p3").await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rename_and_dissociate_leave_other_columns() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let app = App::new("MyApp", BTreeMap::new());
        driver.insert_app(&app).await.unwrap();
        let dep = Deployment::new(&app.id, "Staging", "k1");
        driver.insert_deployment(&dep).await.unwrap();
        driver
            .insert_deployment(&Deployment::new(&app.id, "Production", "k2"))
            .await
            .unwrap();
        for id in ["p1", "p2", "p3"] {
            driver.associate_package(&dep.id, id).await.unwrap();
        }

        driver.rename_deployment(&dep.id, "QA").await.unwrap();
        driver
            .dissociate_packages(&dep.id, &["p1".to_string(), "p3".to_string()])
            .await
            .unwrap();

        let found = driver
            .find_deployment(&DeploymentQuery::key("k1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.name, "QA");
        assert_eq!(found.history, vec!["p2".to_string()]);

        let taken = driver.rename_deployment(&dep.id, "Production").await;
        assert!(matches!(taken, Err(Error::AlreadyExists(_))));
        let missing = driver.rename_deployment("nope", "QA").await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
        let missing = driver.dissociate_packages("nope", &[]).await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_package_membership_queries() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let p1 = Package::new(NewPackage::new("v1", "h1"));
        let p2 = Package::new(NewPackage::new("v2", "h2"));
        let p3 = Package::new(NewPackage::new("v3", "h3"));
        for pkg in [&p1, &p2, &p3] {
            assert!(driver.insert_package(pkg).await.unwrap());
        }

        let ids = vec![p1.id.clone(), p2.id.clone()];
        let found = driver
            .find_packages(&PackageQuery::ids(ids.clone()))
            .await
            .unwrap();
        assert_eq!(found.len(), 2);

        let labelled = driver
            .find_package(&PackageQuery::ids(ids.clone()).label("v2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(labelled, p2);

        assert!(
            driver
                .find_packages(&PackageQuery::ids(Vec::new()))
                .await
                .unwrap()
                .is_empty()
        );

        assert_eq!(driver.delete_packages(&PackageQuery::ids(ids)).await.unwrap(), 2);
        let rest = driver.find_packages(&PackageQuery::default()).await.unwrap();
        assert_eq!(rest, vec![p3]);
    }

    #[tokio::test]
    async fn test_content_is_stored_once() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let content = PackageContent {
            package_hash: "h1".to_string(),
            content: Bytes::from_static(&[0xff, 0x00, 0xfe]),
            version: 1,
        };
        assert!(driver.insert_content(&content).await.unwrap());
        assert!(!driver.insert_content(&content).await.unwrap());

        let stored = driver.find_content("h1").await.unwrap().unwrap();
        assert_eq!(stored, content);
    }

    #[tokio::test]
    async fn test_client_ratio_upsert() {
        let temp = TempDir::new().unwrap();
        let driver = driver(&temp).await;

        let mut ratio = ClientRatio {
            client_unique_id: "c1".to_string(),
            package_hash: "h1".to_string(),
            ratio: 0.25,
            updated: false,
        };
        driver.upsert_client_ratio(&ratio).await.unwrap();
        ratio.updated = true;
        ratio.ratio = 0.5;
        driver.upsert_client_ratio(&ratio).await.unwrap();

        let stored = driver.find_client_ratio("c1", "h1").await.unwrap().unwrap();
        assert_eq!(stored, ratio);

        let count: i64 = driver
            .conn()
            .query_row("SELECT COUNT(*) FROM client_ratios", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_from_config_creates_data_dir() {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig {
            data_dir: temp.path().join("nested/data"),
            ..StoreConfig::default()
        };
        let driver = SqliteDriver::from_config(&config).unwrap();
        driver.init().await.unwrap();
        assert!(config.db_path().exists());
    }
}
