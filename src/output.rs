//! Output formatting for CLI display.
//!
//! Provides the [`PrettyPrint`] trait for human-readable output
//! as an alternative to JSON serialization.

use chrono::{DateTime, Utc};

use crate::{Asset, Group, Issue, Organization, Policy, Project};

/// Trait for human-readable key-value output.
///
/// Implemented by entity types to provide formatted output
/// suitable for terminal display when `--json` is not specified.
pub trait PrettyPrint {
    /// Returns a formatted string for terminal display.
    fn pretty_print(&self) -> String;
}

fn header(kind: &str, title: &str) -> Vec<String> {
    let header = format!("{kind}: {title}");
    let divider = "─".repeat(header.chars().count().max(30));
    vec![header, divider]
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

impl PrettyPrint for Group {
    fn pretty_print(&self) -> String {
        let mut lines = header("Group", self.name());
        lines.push(format!("ID:             {}", self.id));
        lines.join("\n")
    }
}

impl PrettyPrint for Organization {
    fn pretty_print(&self) -> String {
        let mut lines = header("Organization", self.name());
        lines.push(format!("ID:             {}", self.id));

        if let Some(slug) = self.slug() {
            lines.push(format!("Slug:           {slug}"));
        }
        if let Some(group_id) = self.group_id() {
            lines.push(format!("Group:          {group_id}"));
        }
        if self.attributes.is_personal {
            lines.push("Personal:       yes".to_string());
        }
        if let Some(ref created) = self.attributes.created_at {
            lines.push(format!("Created:        {}", timestamp(created)));
        }

        lines.join("\n")
    }
}

impl PrettyPrint for Project {
    fn pretty_print(&self) -> String {
        let mut lines = header("Project", self.name());
        lines.push(format!("ID:             {}", self.id));
        lines.push(format!("Organization:   {}", self.org_id));

        if let Some(ref project_type) = self.attributes.project_type {
            lines.push(format!("Type:           {project_type}"));
        }
        if let Some(origin) = self.origin() {
            lines.push(format!("Origin:         {origin}"));
        }
        if let Some(ref status) = self.attributes.status {
            lines.push(format!("Status:         {status}"));
        }
        if let Some(ref reference) = self.attributes.target_reference {
            lines.push(format!("Reference:      {reference}"));
        }
        if let Some(ref created) = self.attributes.created {
            lines.push(format!("Created:        {}", timestamp(created)));
        }

        lines.join("\n")
    }
}

impl PrettyPrint for Issue {
    fn pretty_print(&self) -> String {
        let mut lines = header("Issue", self.title());
        lines.push(format!("ID:             {}", self.id));

        if let Some(ref issue_type) = self.attributes.issue_type {
            lines.push(format!("Type:           {issue_type}"));
        }
        if let Some(severity) = self.severity() {
            lines.push(format!("Severity:       {severity}"));
        }
        if let Some(status) = self.status() {
            let ignored = if self.attributes.ignored { " (ignored)" } else { "" };
            lines.push(format!("Status:         {status}{ignored}"));
        }

        let cves = self.cves();
        if !cves.is_empty() {
            lines.push(format!("CVEs:           {}", cves.join(", ")));
        }
        if let Some(ref scan_item) = self.scan_item {
            lines.push(format!(
                "Scan Item:      {} ({})",
                scan_item.id, scan_item.item_type
            ));
        }
        if let Some(ref created) = self.attributes.created_at {
            lines.push(format!("Created:        {}", timestamp(created)));
        }

        lines.join("\n")
    }
}

impl PrettyPrint for Policy {
    fn pretty_print(&self) -> String {
        let mut lines = header("Policy", self.name().unwrap_or(&self.id));
        lines.push(format!("ID:             {}", self.id));

        if let Some(ref action) = self.attributes.action_type {
            lines.push(format!("Action:         {action}"));
        }
        if let Some(ignore_type) = self.ignore_type() {
            lines.push(format!("Ignore Type:    {ignore_type}"));
        }
        if let Some(reason) = self.reason() {
            lines.push(format!("Reason:         {reason}"));
        }
        if let Some(expires) = self.expires() {
            lines.push(format!("Expires:        {}", timestamp(&expires)));
        }
        if !self.conditions().is_empty() {
            lines.push(format!("Conditions:     {}", self.conditions().len()));
        }

        lines.join("\n")
    }
}

impl PrettyPrint for Asset {
    fn pretty_print(&self) -> String {
        let mut lines = header("Asset", self.name());
        lines.push(format!("ID:             {}", self.id));
        lines.push(format!("Type:           {}", self.asset_type));

        if !self.attributes.sources.is_empty() {
            lines.push(format!(
                "Sources:        {}",
                self.attributes.sources.join(", ")
            ));
        }
        if let Some(criticality) = self.business_criticality() {
            lines.push(format!("Criticality:    {criticality}"));
        }
        if let Some(lifecycle) = self.lifecycle() {
            lines.push(format!("Lifecycle:      {lifecycle:?}"));
        }
        if let Some(ref url) = self.attributes.browse_url {
            lines.push(format!("URL:            {url}"));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ParentRef, Session, SnykClient};
    use serde_json::json;
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(SnykClient::new("token", "http://localhost:1").unwrap())
    }

    #[test]
    fn test_project_pretty_print_format() {
        let parent = ParentRef::new(crate::EntityKind::Organization, "o1");
        let project: Arc<Project> = session()
            .materialize(
                json!({"id": "p1", "attributes": {"name": "acme/api", "origin": "github"}}),
                Some(&parent),
            )
            .unwrap();

        let output = project.pretty_print();
        assert!(output.starts_with("Project: acme/api"));
        assert!(output.contains("Organization:   o1"));
        assert!(output.contains("Origin:         github"));
    }

    #[test]
    fn test_issue_pretty_print_lists_cves() {
        let issue: Arc<Issue> = session()
            .materialize(
                json!({"id": "i1", "attributes": {
                    "title": "Prototype Pollution",
                    "status": "open",
                    "ignored": true,
                    "problems": [{"id": "CVE-2020-8203"}, {"id": "CVE-2019-10744"}]
                }}),
                None,
            )
            .unwrap();

        let output = issue.pretty_print();
        assert!(output.contains("Status:         open (ignored)"));
        assert!(output.contains("CVEs:           CVE-2020-8203, CVE-2019-10744"));
    }
}
