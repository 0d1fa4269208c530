//! Search projection for RFP text content.
//!
//! The projection is a derived, rebuildable view of title + description +
//! requirements. Postgres keeps it as a `tsvector`; the in-memory store uses
//! [`project`], which yields a deterministic normalized term list so that
//! recomputing it from the same row always produces identical output.

use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::{RfpContent, RfpStatus};

/// Full-text query with visibility filters
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub owner_id: Option<Uuid>,
    pub status: Option<RfpStatus>,
    pub limit: i64,
    pub offset: i64,
}

/// Split text into lowercase alphanumeric terms.
pub fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Build the projection string for a piece of RFP content.
pub fn project(content: &RfpContent) -> String {
    let mut all = terms(&content.title);
    if let Some(description) = &content.description {
        all.extend(terms(description));
    }
    if let Some(requirements) = &content.requirements {
        all.extend(terms(requirements));
    }
    all.into_iter().collect::<Vec<_>>().join(" ")
}

/// Every query term must be present in the projection.
pub fn matches(projection: &str, query: &str) -> bool {
    let wanted = terms(query);
    if wanted.is_empty() {
        return false;
    }
    let have: BTreeSet<&str> = projection.split(' ').collect();
    wanted.iter().all(|t| have.contains(t.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content(title: &str, description: Option<&str>, requirements: Option<&str>) -> RfpContent {
        RfpContent {
            title: title.to_string(),
            description: description.map(str::to_string),
            requirements: requirements.map(str::to_string),
        }
    }

    #[test]
    fn projection_is_deterministic() {
        let c = content("Cloud Migration", Some("Move ERP to cloud"), Some("SOC2, ISO-27001"));
        assert_eq!(project(&c), project(&c));
        assert_eq!(project(&c), "27001 cloud erp iso migration move soc2 to");
    }

    #[test]
    fn query_requires_all_terms() {
        let projection = project(&content("Office furniture", Some("Desks and chairs"), None));
        assert!(matches(&projection, "desks"));
        assert!(matches(&projection, "Office CHAIRS"));
        assert!(!matches(&projection, "desks lamps"));
        assert!(!matches(&projection, "   "));
    }
}
