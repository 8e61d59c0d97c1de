//! ID resolver module
//!
//! Resolves UUID prefixes to full UUIDs by listing the matching resources.
//! This lets users type short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use harvest_client::OrchestratorClient;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Picks the single id matching `id_or_prefix`
///
/// `kind` names the resource in error messages.
pub fn match_unique(
    ids: impl IntoIterator<Item = Uuid>,
    id_or_prefix: &IdOrPrefix,
    kind: &str,
) -> Result<Uuid> {
    let matches: Vec<Uuid> = ids
        .into_iter()
        .filter(|id| id_or_prefix.matches(id))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No {} found with ID starting with '{}'",
            kind,
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple {}s: {}",
                id_or_prefix,
                kind,
                ids.join(", ")
            ))
        }
    }
}

/// Resolve a schedule ID or prefix to a full UUID
pub async fn resolve_schedule_id(
    client: &OrchestratorClient,
    id_or_prefix: &IdOrPrefix,
) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let schedules = client
        .list_schedules()
        .await
        .context("Failed to fetch schedules for ID resolution")?;

    match_unique(schedules.iter().map(|s| s.id), id_or_prefix, "schedule")
}

/// Resolve a job ID or prefix to a full UUID
///
/// Prefixes are searched across the jobs of every existing schedule.
pub async fn resolve_job_id(client: &OrchestratorClient, id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let schedules = client
        .list_schedules()
        .await
        .context("Failed to fetch schedules for ID resolution")?;

    let mut ids = Vec::new();
    for schedule in schedules {
        let jobs = client
            .list_jobs_by_schedule(schedule.id)
            .await
            .with_context(|| format!("Failed to fetch jobs of schedule {}", schedule.id))?;
        ids.extend(jobs.into_iter().map(|j| j.id));
    }

    match_unique(ids, id_or_prefix, "job")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Uuid {
        Uuid::parse_str(s).unwrap()
    }

    #[test]
    fn test_match_unique() {
        let a = id("aaaa1111-0000-4000-8000-000000000000");
        let b = id("aaaa2222-0000-4000-8000-000000000000");
        let ids = [a, b];

        assert_eq!(
            match_unique(ids, &IdOrPrefix::parse("aaaa1"), "schedule").unwrap(),
            a
        );

        let ambiguous = match_unique(ids, &IdOrPrefix::parse("aaaa"), "schedule").unwrap_err();
        assert!(ambiguous.to_string().contains("Ambiguous prefix 'aaaa'"));

        let missing = match_unique(ids, &IdOrPrefix::parse("bbbb"), "job").unwrap_err();
        assert_eq!(
            missing.to_string(),
            "No job found with ID starting with 'bbbb'"
        );
    }
}
