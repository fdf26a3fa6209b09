//! Endpoint functions, grouped by Azure DevOps service area.
//!
//! Each function is a thin typed wrapper over `ApiClient::get`,
//! `ApiClient::get_object` or `ApiClient::list_all`. Caps on lists without a
//! recency order (projects, definitions) are applied lazily with
//! `StreamExt::take`, so no page past the cap is fetched. Caps on builds,
//! releases and deployments read their whole window and keep the most
//! recent records with `retain_most_recent`.

mod agents;
mod builds;
mod git;
mod projects;
mod releases;
mod workitems;

use chrono::{DateTime, SecondsFormat, Utc};

/// Timestamp in the form the API accepts in query strings.
pub(crate) fn time_param(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_time_param_format() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(time_param(t), "2024-03-01T10:00:00Z");
    }
}
