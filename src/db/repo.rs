use super::model::{BatchWrite, LabelCount, StoredHeadline, WindowStats};
use crate::model::{EnrichedHeadline, RawHeadline};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // sqlx only creates missing database files when asked to.
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    match query_part {
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            if !q.contains("mode=") {
                rebuilt.push_str("&mode=rwc");
            }
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Insert a scraped headline; an existing link is left untouched.
/// Returns whether a row was created.
///
/// Seeding helper: in production `raw_headlines` is filled by the scraper,
/// and the enricher never writes to it.
#[instrument(skip_all)]
pub async fn insert_raw_headline(pool: &Pool, raw: &RawHeadline) -> Result<bool> {
    let res = sqlx::query(
        "INSERT INTO raw_headlines (title, link, source, scraped_at) VALUES (?, ?, ?, ?) \
         ON CONFLICT(link) DO NOTHING",
    )
    .bind(&raw.title)
    .bind(&raw.link)
    .bind(&raw.source)
    .bind(raw.scraped_at)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() == 1)
}

/// Raw headlines whose link has no enrichment row yet, oldest first.
/// Rows stored with `Error` labels count as enriched.
#[instrument(skip_all, fields(limit = limit))]
pub async fn pending_headlines(pool: &Pool, limit: usize) -> Result<Vec<RawHeadline>> {
    let rows = sqlx::query_as::<_, RawHeadline>(
        "SELECT r.title, r.link, r.source, r.scraped_at \
         FROM raw_headlines r \
         LEFT JOIN enriched_headlines e ON r.link = e.source_link \
         WHERE e.source_link IS NULL \
         ORDER BY r.id ASC \
         LIMIT ?",
    )
    .bind(i64::try_from(limit).unwrap_or(i64::MAX))
    .fetch_all(pool)
    .await
    .context("failed to resolve pending headlines")?;
    Ok(rows)
}

/// Exact backlog: raw links with no enrichment row. Backlog checks and
/// tests use it; the run report keeps the cheaper `raw - enriched` figure.
#[instrument(skip_all)]
pub async fn count_pending(pool: &Pool) -> Result<i64> {
    let cnt: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM raw_headlines r \
         LEFT JOIN enriched_headlines e ON r.link = e.source_link \
         WHERE e.source_link IS NULL",
    )
    .fetch_one(pool)
    .await?;
    Ok(cnt)
}

/// Write one batch window in a single transaction.
///
/// Each candidate is inserted with `ON CONFLICT(source_link) DO NOTHING`, so
/// a link that is already enriched is skipped rather than overwritten. Any
/// other failure rolls back the whole batch.
#[instrument(skip_all, fields(batch = candidates.len()))]
pub async fn insert_enriched_batch(
    pool: &Pool,
    candidates: &[EnrichedHeadline],
    processed_at: DateTime<Utc>,
) -> Result<BatchWrite> {
    let mut tx = pool.begin().await.context("failed to begin batch write")?;
    let mut inserted = 0usize;
    for c in candidates {
        let res = sqlx::query(
            "INSERT INTO enriched_headlines \
             (source_link, title, link, source, scraped_at, sentiment, category, confidence, \
             processing_time_seconds, processed_at, model_used) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(source_link) DO NOTHING",
        )
        .bind(&c.source_link)
        .bind(&c.title)
        .bind(&c.link)
        .bind(&c.source)
        .bind(c.scraped_at)
        .bind(c.sentiment.as_str())
        .bind(c.category.as_str())
        .bind(c.confidence)
        .bind(c.processing_time_seconds)
        .bind(processed_at)
        .bind(&c.model_used)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to write enrichment for {}", c.source_link))?;
        inserted += res.rows_affected() as usize;
    }
    tx.commit().await.context("failed to commit batch write")?;
    Ok(BatchWrite {
        submitted: candidates.len(),
        inserted,
    })
}

#[instrument(skip_all)]
pub async fn find_enriched(pool: &Pool, source_link: &str) -> Result<Option<StoredHeadline>> {
    let row = sqlx::query_as::<_, StoredHeadline>(
        "SELECT source_link, title, link, source, scraped_at, sentiment, category, confidence, \
         processing_time_seconds, processed_at, model_used \
         FROM enriched_headlines WHERE source_link = ?",
    )
    .bind(source_link)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

#[instrument(skip_all)]
pub async fn count_raw(pool: &Pool) -> Result<i64> {
    let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_headlines")
        .fetch_one(pool)
        .await?;
    Ok(cnt)
}

#[instrument(skip_all)]
pub async fn count_enriched(pool: &Pool) -> Result<i64> {
    let cnt: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enriched_headlines")
        .fetch_one(pool)
        .await?;
    Ok(cnt)
}

#[instrument(skip_all)]
pub async fn window_stats(pool: &Pool, since: DateTime<Utc>) -> Result<WindowStats> {
    let (processed, errors, avg_time, avg_conf): (i64, i64, Option<f64>, Option<f64>) =
        sqlx::query_as(
            "SELECT COUNT(*), \
             COALESCE(SUM(CASE WHEN sentiment = 'Error' OR category = 'Error' \
             THEN 1 ELSE 0 END), 0), \
             AVG(processing_time_seconds), \
             AVG(CASE WHEN sentiment != 'Error' AND category != 'Error' THEN confidence END) \
             FROM enriched_headlines \
             WHERE julianday(processed_at) >= julianday(?)",
        )
        .bind(since)
        .fetch_one(pool)
        .await?;
    Ok(WindowStats {
        processed,
        errors,
        avg_processing_time_seconds: avg_time.unwrap_or(0.0),
        avg_confidence: avg_conf.unwrap_or(0.0),
    })
}

/// Category distribution since `since`, most frequent first, `Error` excluded.
#[instrument(skip_all)]
pub async fn category_counts(pool: &Pool, since: DateTime<Utc>) -> Result<Vec<LabelCount>> {
    label_counts(pool, "category", since).await
}

/// Sentiment distribution since `since`, most frequent first, `Error` excluded.
#[instrument(skip_all)]
pub async fn sentiment_counts(pool: &Pool, since: DateTime<Utc>) -> Result<Vec<LabelCount>> {
    label_counts(pool, "sentiment", since).await
}

async fn label_counts(
    pool: &Pool,
    column: &'static str,
    since: DateTime<Utc>,
) -> Result<Vec<LabelCount>> {
    let sql = format!(
        "SELECT {col}, COUNT(*) AS cnt FROM enriched_headlines \
         WHERE julianday(processed_at) >= julianday(?) AND {col} != 'Error' \
         GROUP BY {col} ORDER BY cnt DESC, {col} ASC",
        col = column
    );
    let rows: Vec<(String, i64)> = sqlx::query_as(&sql).bind(since).fetch_all(pool).await?;
    Ok(rows
        .into_iter()
        .map(|(label, count)| LabelCount { label, count })
        .collect())
}
