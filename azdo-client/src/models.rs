//! Typed Azure DevOps REST API models.
//!
//! Only the fields the exporter reads are modelled. Every field is optional or
//! defaulted so that partially populated responses still decode.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Lenient timestamp decoding.
///
/// The API reports unset times as `0001-01-01T00:00:00` and some endpoints
/// omit the offset. Unset or unparsable values decode to `None`; naive values
/// are taken as UTC.
pub(crate) mod serde_time {
    use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse))
    }

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        let parsed = DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").map(|t| t.and_utc())
            })
            .ok()?;

        (parsed.year() > 1).then_some(parsed)
    }
}

/// Identity reference (users, groups, service accounts).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentityRef {
    pub id: String,
    pub display_name: String,
    pub unique_name: String,
}

/// `{id, name}` reference with a numeric id.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct NamedRef {
    pub id: i64,
    pub name: String,
}

/// `{id, name}` reference with a string id.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GuidRef {
    pub id: String,
    pub name: String,
}

// ---------------------------------------------------------------------------
// Core
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    pub state: String,
    pub visibility: String,
    pub revision: i64,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub last_update_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentPool {
    pub id: i64,
    pub name: String,
    pub pool_type: String,
    pub size: i64,
    pub is_hosted: bool,
    pub auto_provision: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Agent {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub os_description: String,
    pub enabled: bool,
    pub status: String,
    pub max_parallelism: i64,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub created_on: Option<DateTime<Utc>>,
    pub assigned_request: Option<JobRequest>,
}

/// A job queued on or running in an agent pool.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct JobRequest {
    pub request_id: i64,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub queue_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub assign_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub receive_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub finish_time: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub plan_type: String,
    pub scope_id: String,
    pub definition: Option<NamedRef>,
    pub owner: Option<NamedRef>,
    pub reserved_agent: Option<NamedRef>,
    pub matches_all_agents_in_pool: bool,
}

impl JobRequest {
    /// Still waiting for an agent.
    pub fn is_queued(&self) -> bool {
        self.finish_time.is_none() && self.assign_time.is_none()
    }

    /// Assigned to an agent and not finished.
    pub fn is_running(&self) -> bool {
        self.finish_time.is_none() && self.assign_time.is_some()
    }
}

// ---------------------------------------------------------------------------
// Builds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PoolRef {
    pub id: i64,
    pub name: String,
    pub is_hosted: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueRef {
    pub id: i64,
    pub name: String,
    pub pool: Option<PoolRef>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DefinitionRef {
    pub id: i64,
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Build {
    pub id: i64,
    pub build_number: String,
    pub status: String,
    pub result: Option<String>,
    pub reason: String,
    pub source_branch: String,
    pub source_version: String,
    pub url: String,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub queue_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub finish_time: Option<DateTime<Utc>>,
    pub definition: DefinitionRef,
    pub queue: Option<QueueRef>,
    pub requested_by: IdentityRef,
}

impl Build {
    /// Result if finished, otherwise the status (`inProgress`, `notStarted`, ...).
    pub fn outcome(&self) -> &str {
        self.result
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.status)
    }

    /// Most recent of finish, start and queue time.
    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.finish_time.or(self.start_time).or(self.queue_time)
    }

    pub fn pool(&self) -> Option<&PoolRef> {
        self.queue.as_ref().and_then(|q| q.pool.as_ref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildDefinition {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub revision: i64,
    pub queue_status: String,
    pub url: String,
    pub queue: Option<QueueRef>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Timeline {
    pub id: String,
    pub records: Vec<TimelineRecord>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct TimelineRecord {
    pub id: String,
    pub parent_id: Option<String>,
    #[serde(rename = "type")]
    pub record_type: String,
    pub name: String,
    pub identifier: Option<String>,
    pub state: String,
    pub result: Option<String>,
    pub worker_name: Option<String>,
    pub error_count: i64,
    pub warning_count: i64,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub finish_time: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Releases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseDefinition {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub release_name_format: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Release {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub reason: String,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub created_on: Option<DateTime<Utc>>,
    pub created_by: IdentityRef,
    pub release_definition: DefinitionRef,
    pub environments: Vec<ReleaseEnvironment>,
    pub artifacts: Vec<ReleaseArtifact>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseEnvironment {
    pub id: i64,
    pub name: String,
    pub status: String,
    pub rank: i64,
    pub definition_environment_id: i64,
    /// Minutes.
    pub time_to_deploy: f64,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub created_on: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub modified_on: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ReleaseArtifact {
    pub source_id: String,
    #[serde(rename = "type")]
    pub artifact_type: String,
    pub alias: String,
    pub definition_reference: HashMap<String, ArtifactSourceRef>,
}

impl ReleaseArtifact {
    fn reference(&self, key: &str) -> &str {
        self.definition_reference
            .get(key)
            .and_then(|r| r.name.as_deref())
            .unwrap_or_default()
    }

    /// Artifact version name, e.g. the build number.
    pub fn version(&self) -> &str {
        self.reference("version")
    }

    /// Source branch the artifact was built from.
    pub fn branch(&self) -> &str {
        self.reference("branch")
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ArtifactSourceRef {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Deployment {
    pub id: i64,
    pub name: String,
    pub release: NamedRef,
    pub release_definition: NamedRef,
    pub release_environment: NamedRef,
    pub attempt: i64,
    pub reason: String,
    pub deployment_status: String,
    pub operation_status: String,
    pub requested_by: IdentityRef,
    pub requested_for: IdentityRef,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub queued_on: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub started_on: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub completed_on: Option<DateTime<Utc>>,
    pub pre_deploy_approvals: Vec<Approval>,
}

impl Deployment {
    /// Display name of whoever approved the deployment; empty when it was
    /// approved automatically or not at all.
    pub fn approved_by(&self) -> &str {
        self.pre_deploy_approvals
            .iter()
            .filter(|a| !a.is_automated)
            .find_map(|a| a.approved_by.as_ref())
            .map(|id| id.display_name.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Approval {
    pub status: String,
    pub is_automated: bool,
    pub approver: Option<IdentityRef>,
    pub approved_by: Option<IdentityRef>,
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Repository {
    pub id: String,
    pub name: String,
    pub url: String,
    pub default_branch: String,
    pub size: i64,
    pub is_disabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GitUserDate {
    pub name: String,
    pub email: String,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Commit {
    pub commit_id: String,
    pub author: GitUserDate,
    pub committer: GitUserDate,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Push {
    pub push_id: i64,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub date: Option<DateTime<Utc>>,
    pub pushed_by: IdentityRef,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PullRequest {
    pub pull_request_id: i64,
    pub title: String,
    pub status: String,
    pub merge_status: String,
    pub is_draft: bool,
    pub source_ref_name: String,
    pub target_ref_name: String,
    pub created_by: IdentityRef,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub creation_date: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "serde_time::deserialize")]
    pub closed_date: Option<DateTime<Utc>>,
    pub repository: GuidRef,
    pub labels: Vec<Label>,
    pub reviewers: Vec<Reviewer>,
}

impl PullRequest {
    /// Aggregated review vote: the lowest non-zero vote wins
    /// (-10 rejected, -5 waiting, 5 approved with suggestions, 10 approved).
    pub fn vote_summary(&self) -> i64 {
        self.reviewers
            .iter()
            .map(|r| r.vote)
            .filter(|v| *v != 0)
            .min()
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Reviewer {
    pub id: String,
    pub display_name: String,
    pub vote: i64,
    pub is_required: bool,
}

// ---------------------------------------------------------------------------
// Work items
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WiqlResult {
    pub query_type: String,
    pub work_items: Vec<WorkItemRef>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkItemRef {
    pub id: i64,
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkItem {
    pub id: i64,
    pub rev: i64,
    pub url: String,
    pub fields: HashMap<String, serde_json::Value>,
}

impl WorkItem {
    /// A field rendered as a label value. Identity fields yield their
    /// display name.
    pub fn field(&self, name: &str) -> String {
        match self.fields.get(name) {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Object(map)) => map
                .get("displayName")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            Some(other) => other.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Resource usage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceUsage {
    pub resource_limit: ResourceLimit,
    pub used_count: i64,
    pub used_minutes: i64,
    pub running_requests: Vec<JobRequest>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceLimit {
    pub parallelism_tag: String,
    pub is_hosted: bool,
    pub is_premium: bool,
    pub total_count: i64,
    pub total_minutes: i64,
    pub failed_to_reach_all_providers: bool,
}
