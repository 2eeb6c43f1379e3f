use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Row counts recorded in the artifact metadata sidecar.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexCounts {
    pub files: u64,
    pub symbols: u64,
    pub fts_rows: u64,
}

/// The `<branch>_<commit>.metadata.json` sidecar written next to each
/// artifact after a full index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub schema_version: i64,
    /// ISO-8601 creation time.
    pub created_at: String,
    pub branch: String,
    pub commit: String,
    pub counts: IndexCounts,
    /// Files per language tag.
    pub languages: HashMap<String, u64>,
    pub tool_version: String,
}

impl IndexMetadata {
    pub fn new(
        schema_version: i64,
        branch: impl Into<String>,
        commit: impl Into<String>,
        counts: IndexCounts,
        languages: HashMap<String, u64>,
    ) -> Self {
        Self {
            schema_version,
            created_at: iso8601_now(),
            branch: branch.into(),
            commit: commit.into(),
            counts,
            languages,
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Current time as `YYYY-MM-DDThh:mm:ssZ` without a chrono dependency.
fn iso8601_now() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format_iso8601(secs as i64)
}

/// Civil-date conversion of unix seconds (days algorithm from Howard
/// Hinnant's date paper).
pub fn format_iso8601(unix_secs: i64) -> String {
    let days = unix_secs.div_euclid(86_400);
    let secs_of_day = unix_secs.rem_euclid(86_400);

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if m <= 2 { y + 1 } else { y };

    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
        year,
        m,
        d,
        secs_of_day / 3600,
        (secs_of_day % 3600) / 60,
        secs_of_day % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_iso8601_epoch() {
        assert_eq!(format_iso8601(0), "1970-01-01T00:00:00Z");
    }

    #[test]
    fn test_format_iso8601_known_instant() {
        // 2021-01-01 00:00:00 UTC
        assert_eq!(format_iso8601(1_609_459_200), "2021-01-01T00:00:00Z");
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = IndexMetadata::new(
            1,
            "main",
            "abc1234",
            IndexCounts {
                files: 10,
                symbols: 42,
                fts_rows: 10,
            },
            HashMap::from([("rust".to_string(), 8), ("python".to_string(), 2)]),
        );

        let json = serde_json::to_string(&meta).unwrap();
        let back: IndexMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back.branch, "main");
        assert_eq!(back.counts.symbols, 42);
        assert_eq!(back.languages["rust"], 8);
    }
}
