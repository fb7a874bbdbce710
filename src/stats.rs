//! Database statistics and health overview.
//!
//! A quick summary of what has been harvested: article counts, embedding
//! coverage, and per-source and per-category breakdowns. Used by
//! `harvest stats` to confirm that scrapes are landing as expected.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::{db, migrate};

/// Per-source article counts.
struct SourceStats {
    source: String,
    article_count: i64,
    embedded_count: i64,
    last_updated: Option<i64>,
}

/// Run the stats command: query the database and print a summary.
///
/// A database that was never initialized gets its schema first and
/// reports zero articles.
pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
        .fetch_one(&pool)
        .await?;

    let embedded: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE embedding IS NOT NULL")
            .fetch_one(&pool)
            .await?;

    let dated: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE published_date IS NOT NULL")
            .fetch_one(&pool)
            .await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Blog Harvest: Database Stats");
    println!("============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Articles:    {}", total);
    println!(
        "  Embedded:    {} / {} ({}%)",
        embedded,
        total,
        percent(embedded, total)
    );
    println!("  Dated:       {} / {}", dated, total);

    let source_rows = sqlx::query(
        r#"
        SELECT
            source,
            COUNT(*) AS article_count,
            SUM(CASE WHEN embedding IS NOT NULL THEN 1 ELSE 0 END) AS embedded_count,
            MAX(updated_at) AS last_updated
        FROM articles
        GROUP BY source
        ORDER BY article_count DESC, source
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let source_stats: Vec<SourceStats> = source_rows
        .iter()
        .map(|row| SourceStats {
            source: row.get("source"),
            article_count: row.get("article_count"),
            embedded_count: row.get("embedded_count"),
            last_updated: row.get("last_updated"),
        })
        .collect();

    if !source_stats.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<30} {:>8} {:>10}   {}",
            "SOURCE", "ARTICLES", "EMBEDDED", "LAST UPDATE"
        );
        println!("  {}", "-".repeat(70));

        for s in &source_stats {
            let updated = match s.last_updated {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<30} {:>8} {:>10}   {}",
                s.source, s.article_count, s.embedded_count, updated
            );
        }
    }

    let category_rows = sqlx::query(
        "SELECT category, COUNT(*) AS n FROM articles GROUP BY category ORDER BY n DESC, category",
    )
    .fetch_all(&pool)
    .await?;

    if !category_rows.is_empty() {
        println!();
        println!("  By category:");
        for row in &category_rows {
            let category: String = row.get("category");
            let n: i64 = row.get("n");
            println!("  {:<30} {:>8}", category, n);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

fn percent(part: i64, whole: i64) -> i64 {
    if whole > 0 {
        (part * 100) / whole
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        format_ts_iso(ts)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        plural(delta / 60, "min")
    } else if delta < 86400 {
        plural(delta / 3600, "hour")
    } else if delta < 86400 * 30 {
        plural(delta / 86400, "day")
    } else {
        format_ts_iso(ts)
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_relative_time() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 3 * 3600), "3 hours ago");
        assert_eq!(format_ts_relative(now - 86400), "1 day ago");
    }

    #[test]
    fn test_percent_handles_empty() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(3, 4), 75);
    }
}
