//! SQLite backend implementation
//!
//! Provides persistent storage using SQLite with WAL mode for concurrency.
//! Every write is a native `INSERT … ON CONFLICT … DO UPDATE` upsert, so
//! concurrent ingestion workers never read-modify-write a row.

use crate::{
    Action, CatalogError, CatalogStore, Dataset, PopularityRecord, RankingKind, RankingRecord,
    Result, Site,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed catalog store
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open or create a SQLite database at the specified path
    ///
    /// Automatically runs migrations to set up the schema.
    pub async fn open(path: &str) -> Result<Self> {
        let db_url = if path.starts_with("sqlite://") {
            path.to_string()
        } else {
            format!("sqlite://{}", path)
        };

        if !sqlx::Sqlite::database_exists(&db_url).await.unwrap_or(false) {
            sqlx::Sqlite::create_database(&db_url).await?;
        }

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(10))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        debug!(path = %path, "catalog store opened");

        Ok(Self { pool })
    }

    /// Get the underlying pool (for advanced usage)
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn replicas_of(&self, name: &str) -> Result<BTreeSet<String>> {
        let rows = sqlx::query("SELECT site FROM replicas WHERE dataset = ? ORDER BY site")
            .bind(name)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("site").map_err(CatalogError::from))
            .collect()
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| CatalogError::InvalidRecord(format!("bad date '{}': {}", raw, e)))
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

// Helper to convert SqliteRow to Dataset (replicas filled in by caller)
fn row_to_dataset(row: &SqliteRow) -> Result<Dataset> {
    let creation_date: Option<String> = row.try_get("creation_date")?;
    Ok(Dataset {
        name: row.try_get("name")?,
        size_bytes: row.try_get::<i64, _>("size_bytes")? as u64,
        n_files: row.try_get::<i64, _>("n_files")? as u64,
        data_tier: row.try_get("data_tier")?,
        physics_group: row.try_get("physics_group")?,
        primary_name: row.try_get("primary_name")?,
        ds_type: row.try_get("ds_type")?,
        creation_date: creation_date.as_deref().map(parse_date).transpose()?,
        replicas: BTreeSet::new(),
    })
}

fn row_to_site(row: &SqliteRow) -> Result<Site> {
    Ok(Site {
        name: row.try_get("name")?,
        quota_bytes: row.try_get::<i64, _>("quota_bytes")? as u64,
        used_bytes: row.try_get::<i64, _>("used_bytes")? as u64,
        soft_limit_bytes: row.try_get::<i64, _>("soft_limit_bytes")? as u64,
        performance: row.try_get("performance")?,
        active: row.try_get::<i64, _>("active")? != 0,
    })
}

fn row_to_popularity(row: &SqliteRow) -> Result<PopularityRecord> {
    let date: String = row.try_get("date")?;
    Ok(PopularityRecord {
        dataset: row.try_get("dataset")?,
        date: parse_date(&date)?,
        accesses: row.try_get::<i64, _>("accesses")? as u64,
        cpu_seconds: row.try_get("cpu_seconds")?,
        users: row.try_get::<i64, _>("users")? as u64,
    })
}

fn row_to_ranking(row: &SqliteRow) -> Result<RankingRecord> {
    let date: String = row.try_get("date")?;
    let kind: String = row.try_get("kind")?;
    Ok(RankingRecord {
        name: row.try_get("name")?,
        date: parse_date(&date)?,
        strategy: row.try_get("strategy")?,
        kind: RankingKind::from_str(&kind).map_err(CatalogError::InvalidRecord)?,
        popularity: row.try_get("popularity")?,
        rank: row.try_get("rank")?,
    })
}

#[async_trait]
impl CatalogStore for SqliteStore {
    async fn upsert_dataset(&self, dataset: &Dataset) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO datasets
                 (name, size_bytes, n_files, data_tier, physics_group, primary_name, ds_type, creation_date)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (name) DO UPDATE SET
                 size_bytes = excluded.size_bytes,
                 n_files = excluded.n_files,
                 data_tier = excluded.data_tier,
                 physics_group = excluded.physics_group,
                 primary_name = excluded.primary_name,
                 ds_type = excluded.ds_type,
                 creation_date = excluded.creation_date",
        )
        .bind(&dataset.name)
        .bind(dataset.size_bytes as i64)
        .bind(dataset.n_files as i64)
        .bind(&dataset.data_tier)
        .bind(&dataset.physics_group)
        .bind(&dataset.primary_name)
        .bind(&dataset.ds_type)
        .bind(dataset.creation_date.map(format_date))
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM replicas WHERE dataset = ?")
            .bind(&dataset.name)
            .execute(&mut *tx)
            .await?;

        for site in &dataset.replicas {
            sqlx::query("INSERT INTO replicas (dataset, site) VALUES (?, ?)")
                .bind(&dataset.name)
                .bind(site)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_dataset(&self, name: &str) -> Result<Option<Dataset>> {
        let row = sqlx::query("SELECT * FROM datasets WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let mut ds = row_to_dataset(&r)?;
                ds.replicas = self.replicas_of(name).await?;
                Ok(Some(ds))
            }
            None => Ok(None),
        }
    }

    async fn list_datasets(&self) -> Result<Vec<Dataset>> {
        let rows = sqlx::query("SELECT * FROM datasets ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        let replica_rows = sqlx::query("SELECT dataset, site FROM replicas")
            .fetch_all(&self.pool)
            .await?;

        let mut replicas: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for r in &replica_rows {
            let dataset: String = r.try_get("dataset")?;
            let site: String = r.try_get("site")?;
            replicas.entry(dataset).or_default().insert(site);
        }

        rows.iter()
            .map(|r| {
                let mut ds = row_to_dataset(r)?;
                ds.replicas = replicas.remove(&ds.name).unwrap_or_default();
                Ok(ds)
            })
            .collect()
    }

    async fn dataset_names(&self) -> Result<BTreeSet<String>> {
        let rows = sqlx::query("SELECT name FROM datasets")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|r| r.try_get::<String, _>("name").map_err(CatalogError::from))
            .collect()
    }

    async fn remove_dataset(&self, name: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM replicas WHERE dataset = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM datasets WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn apply_replica_changes(
        &self,
        subscriptions: &[Action],
        deletions: &[Action],
    ) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut changed = 0u64;

        for action in subscriptions {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO replicas (dataset, site)
                 SELECT name, ? FROM datasets WHERE name = ?",
            )
            .bind(&action.site)
            .bind(&action.dataset)
            .execute(&mut *tx)
            .await?;
            changed += result.rows_affected();
        }

        for action in deletions {
            let result = sqlx::query("DELETE FROM replicas WHERE dataset = ? AND site = ?")
                .bind(&action.dataset)
                .bind(&action.site)
                .execute(&mut *tx)
                .await?;
            changed += result.rows_affected();
        }

        tx.commit().await?;
        Ok(changed as usize)
    }

    async fn upsert_site(&self, site: &Site) -> Result<()> {
        sqlx::query(
            "INSERT INTO sites (name, quota_bytes, used_bytes, soft_limit_bytes, performance, active)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (name) DO UPDATE SET
                 quota_bytes = excluded.quota_bytes,
                 used_bytes = excluded.used_bytes,
                 soft_limit_bytes = excluded.soft_limit_bytes,
                 performance = excluded.performance,
                 active = excluded.active",
        )
        .bind(&site.name)
        .bind(site.quota_bytes as i64)
        .bind(site.used_bytes as i64)
        .bind(site.soft_limit_bytes as i64)
        .bind(site.performance)
        .bind(site.active as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query("SELECT * FROM sites ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_site).collect()
    }

    async fn active_sites(&self) -> Result<Vec<Site>> {
        let rows = sqlx::query("SELECT * FROM sites WHERE active = 1 ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_site).collect()
    }

    async fn set_site_active(&self, name: &str, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE sites SET active = ? WHERE name = ?")
            .bind(active as i64)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CatalogError::UnknownSite(name.to_string()));
        }
        Ok(())
    }

    async fn upsert_popularity(&self, record: &PopularityRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO popularity (dataset, date, accesses, cpu_seconds, users)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (dataset, date) DO UPDATE SET
                 accesses = excluded.accesses,
                 cpu_seconds = excluded.cpu_seconds,
                 users = excluded.users",
        )
        .bind(&record.dataset)
        .bind(format_date(record.date))
        .bind(record.accesses as i64)
        .bind(record.cpu_seconds)
        .bind(record.users as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn popularity_range(
        &self,
        dataset: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PopularityRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM popularity
             WHERE dataset = ? AND date >= ? AND date <= ?
             ORDER BY date ASC",
        )
        .bind(dataset)
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_popularity).collect()
    }

    async fn popularity_since(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PopularityRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM popularity
             WHERE date >= ? AND date <= ?
             ORDER BY dataset ASC, date ASC",
        )
        .bind(format_date(start))
        .bind(format_date(end))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_popularity).collect()
    }

    async fn latest_popularity_date(&self) -> Result<Option<NaiveDate>> {
        let row = sqlx::query("SELECT MAX(date) AS latest FROM popularity")
            .fetch_one(&self.pool)
            .await?;
        let latest: Option<String> = row.try_get("latest")?;
        latest.as_deref().map(parse_date).transpose()
    }

    async fn fill_missing_popularity(&self, dataset: &str, dates: &[NaiveDate]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        for date in dates {
            let result = sqlx::query(
                "INSERT INTO popularity (dataset, date, accesses, cpu_seconds, users)
                 VALUES (?, ?, 0, 0, 0)
                 ON CONFLICT (dataset, date) DO NOTHING",
            )
            .bind(dataset)
            .bind(format_date(*date))
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted as usize)
    }

    async fn upsert_ranking(&self, record: &RankingRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO rankings (kind, name, date, strategy, popularity, rank)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (kind, name, date, strategy) DO UPDATE SET
                 popularity = excluded.popularity,
                 rank = excluded.rank",
        )
        .bind(record.kind.to_string())
        .bind(&record.name)
        .bind(format_date(record.date))
        .bind(&record.strategy)
        .bind(record.popularity)
        .bind(record.rank)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_ranking_if_absent(&self, record: &RankingRecord) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO rankings (kind, name, date, strategy, popularity, rank)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (kind, name, date, strategy) DO NOTHING",
        )
        .bind(record.kind.to_string())
        .bind(&record.name)
        .bind(format_date(record.date))
        .bind(&record.strategy)
        .bind(record.popularity)
        .bind(record.rank)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn rankings(
        &self,
        kind: RankingKind,
        date: NaiveDate,
        strategy: &str,
    ) -> Result<Vec<RankingRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM rankings
             WHERE kind = ? AND date = ? AND strategy = ?
             ORDER BY name ASC",
        )
        .bind(kind.to_string())
        .bind(format_date(date))
        .bind(strategy)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_ranking).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_dataset_upsert_replaces_replicas() -> Result<()> {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(tmp.path().to_str().unwrap()).await?;

        let ds = Dataset::new("/A/Run1/AOD", 10, 2).with_replicas(["T1_X", "T2_Y"]);
        store.upsert_dataset(&ds).await?;

        let ds = Dataset::new("/A/Run1/AOD", 12, 3).with_replicas(["T2_Z"]);
        store.upsert_dataset(&ds).await?;

        let loaded = store.get_dataset("/A/Run1/AOD").await?.unwrap();
        assert_eq!(loaded.size_bytes, 12);
        assert_eq!(loaded.replicas, BTreeSet::from(["T2_Z".to_string()]));
        Ok(())
    }

    #[tokio::test]
    async fn test_latest_date_on_empty_table() -> Result<()> {
        let tmp = NamedTempFile::new().unwrap();
        let store = SqliteStore::open(tmp.path().to_str().unwrap()).await?;
        assert_eq!(store.latest_popularity_date().await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() -> Result<()> {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();
        {
            let store = SqliteStore::open(&path).await?;
            store
                .upsert_site(&Site {
                    name: "T2_US".into(),
                    quota_bytes: 100,
                    used_bytes: 40,
                    soft_limit_bytes: 90,
                    performance: 2.0,
                    active: true,
                })
                .await?;
            store.pool().close().await;
        }
        let store = SqliteStore::open(&path).await?;
        let sites = store.list_sites().await?;
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].available_bytes(), 60);
        Ok(())
    }
}
