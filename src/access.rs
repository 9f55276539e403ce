//! Role-based access resolution.
//!
//! The role→pattern policy lives in the business store's `role_grants`
//! table when present, with a built-in default for installations that never
//! populated it. Resolution itself is a pure function: identical (role set,
//! catalog) input always yields the identical accessible-object set.

use std::collections::{BTreeMap, BTreeSet};

use sqlx::SqliteConnection;

use crate::models::Role;

pub type AccessPolicy = BTreeMap<String, Vec<String>>;

/// Load the role→pattern policy from `role_grants`, or the built-in
/// defaults when the table is absent.
pub async fn load_policy(conn: &mut SqliteConnection) -> Result<AccessPolicy, sqlx::Error> {
    let grants_exist: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'role_grants'",
    )
    .fetch_one(&mut *conn)
    .await?;

    if !grants_exist {
        return Ok(default_policy());
    }

    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT role_name, pattern FROM role_grants WHERE active = 1")
            .fetch_all(&mut *conn)
            .await?;

    let mut policy = AccessPolicy::new();
    for (role_name, pattern) in rows {
        policy.entry(role_name).or_default().push(pattern);
    }
    Ok(policy)
}

/// Built-in fallback policy. The administrative role carries no patterns;
/// it is granted the full catalog by [`resolve_accessible_objects`].
pub fn default_policy() -> AccessPolicy {
    let mut policy = AccessPolicy::new();
    policy.insert("Admin".to_string(), vec![]);
    policy.insert(
        "Recruiter".to_string(),
        ["Sourcing", "Candidate", "Education", "PreferredLocation", "NoticePeriod"]
            .map(String::from)
            .to_vec(),
    );
    policy.insert(
        "Requestor".to_string(),
        ["Request", "Requisition", "Vacancy", "Position", "WorkLocation", "Employee"]
            .map(String::from)
            .to_vec(),
    );
    policy.insert(
        "Interviewer".to_string(),
        ["Feedback", "Interview", "Interviewer"].map(String::from).to_vec(),
    );
    policy
}

/// Union of accessible objects across all of the caller's roles,
/// deduplicated and deterministically ordered.
pub fn resolve_accessible_objects(
    admin_role: &str,
    roles: &[Role],
    policy: &AccessPolicy,
    catalog: &[String],
) -> BTreeSet<String> {
    let mut accessible = BTreeSet::new();
    for role in roles {
        accessible.extend(objects_for_role(admin_role, &role.name, policy, catalog));
    }
    accessible
}

/// Objects one role may reference: the full catalog for the administrative
/// role; otherwise case-insensitive substring matches of the role's
/// patterns (the role's own name when no mapping exists).
fn objects_for_role(
    admin_role: &str,
    role_name: &str,
    policy: &AccessPolicy,
    catalog: &[String],
) -> BTreeSet<String> {
    if role_name == admin_role {
        return catalog.iter().cloned().collect();
    }

    let own_name = vec![role_name.to_string()];
    let patterns = match policy.get(role_name) {
        Some(patterns) if !patterns.is_empty() => patterns,
        _ => &own_name,
    };
    let lowered: Vec<String> = patterns.iter().map(|p| p.to_lowercase()).collect();

    catalog
        .iter()
        .filter(|object| {
            let object = object.to_lowercase();
            lowered.iter().any(|pattern| object.contains(pattern.as_str()))
        })
        .cloned()
        .collect()
}
