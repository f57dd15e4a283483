use serde::{Deserialize, Serialize};

/// One repository as scraped from a listing page, in its staged form.
///
/// Only the name, id and organization are scraped. The PR and compliance
/// fields are empty placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub organization_name: String,
    pub repository_id: String,
    pub repository_name: String,
    pub repository_owner: String,
    pub num_prs: String,
    pub num_prs_merged: String,
    pub merged_at: String,
    pub is_compliant: String,
}

impl RepositoryRecord {
    pub fn scraped(organization_name: &str, repository_id: String, repository_name: String) -> Self {
        RepositoryRecord {
            organization_name: organization_name.to_string(),
            repository_id,
            repository_name,
            repository_owner: String::new(),
            num_prs: String::new(),
            num_prs_merged: String::new(),
            merged_at: String::new(),
            is_compliant: String::new(),
        }
    }
}

/// One row of the consolidated table, typed per the column schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableRow {
    pub organization_name: Option<String>,
    pub repository_id: Option<String>,
    pub repository_name: Option<String>,
    pub repository_owner: Option<String>,
    pub num_prs: Option<i32>,
    pub num_prs_merged: Option<i32>,
    pub merged_at: Option<String>,
    pub is_compliant: Option<String>,
}
