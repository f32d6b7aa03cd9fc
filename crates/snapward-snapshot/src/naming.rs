use chrono::NaiveDate;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;

/// Length of the random suffix on generated snapshot ids.
pub const SUFFIX_LEN: usize = 8;

/// `{identifier}-{YYYY-MM-DD}-{8 ASCII alphanumerics}`.
pub fn generate_snapshot_id(identifier: &str, date: NaiveDate) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{identifier}-{}-{suffix}", date.format("%Y-%m-%d"))
}

/// Matcher for the ids this tool generates for one target.
///
/// Anything else sharing the prefix (manual backups, other tools) never matches.
#[derive(Debug, Clone)]
pub struct SnapshotPattern {
    re: Regex,
}

impl SnapshotPattern {
    pub fn for_target(identifier: &str) -> Result<Self, regex::Error> {
        let pattern = format!(
            "^{}-[0-9]{{4}}-[0-9]{{2}}-[0-9]{{2}}-[A-Za-z0-9]{{{SUFFIX_LEN}}}$",
            regex::escape(identifier)
        );
        Ok(Self {
            re: Regex::new(&pattern)?,
        })
    }

    pub fn matches(&self, snapshot_id: &str) -> bool {
        self.re.is_match(snapshot_id)
    }
}

pub fn is_matching_pattern(snapshot_id: &str, identifier: &str) -> bool {
    SnapshotPattern::for_target(identifier)
        .map(|p| p.matches(snapshot_id))
        .unwrap_or(false)
}
