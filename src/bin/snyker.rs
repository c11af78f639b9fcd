//! Snyk API CLI binary.
//!
//! A command-line interface for walking the Snyk entity graph.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use snyker::cli::{Cli, Command, GetEntity, ListEntity};
use snyker::output::PrettyPrint;
use snyker::{
    Asset, ClientConfig, Get, Group, GroupScopedId, Issue, OrgScopedId, Organization, PackageUrl,
    Policy, Project, Session, SnykError,
};
use tabled::{Table, Tabled};
use tracing::{warn, Level};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config, cli.verbose);

    let session = match Session::from_env_with_config(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Hint: Set SNYK_TOKEN environment variable");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&session, cli).await;
    session.close();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if matches!(e.status(), Some(401) | Some(403)) {
                eprintln!("Hint: Check that SNYK_TOKEN is valid and has access to this resource");
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> snyker::Result<ClientConfig> {
    let config = match &cli.config {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn init_tracing(config: &ClientConfig, verbose: bool) {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.logging_level.parse().unwrap_or(Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(session: &Session, cli: Cli) -> snyker::Result<()> {
    let group_id = cli.group;
    match cli.command {
        Command::Group => {
            let group = Group::get_or_discover(session, group_id).await?;
            output_single(group.as_ref(), cli.json)
        }
        Command::Get { entity, id, org } => {
            handle_get(session, entity, id, org, group_id, cli.json).await
        }
        Command::List {
            entity,
            org,
            project,
            purl,
            filters,
            query,
        } => {
            let scope = ListScope {
                group: group_id,
                org,
                project,
                purl,
                filters,
                query,
            };
            handle_list(session, entity, scope, cli.json).await
        }
    }
}

async fn handle_get(
    session: &Session,
    entity: GetEntity,
    id: String,
    org: Option<String>,
    group: Option<String>,
    json: bool,
) -> snyker::Result<()> {
    match entity {
        GetEntity::Org => {
            let org = Organization::get(session, id).await?;
            output_single(org.as_ref(), json)
        }
        GetEntity::Project => {
            let org = require_org(org, "project")?;
            let project = Project::get(session, OrgScopedId::new(org, id)).await?;
            output_single(project.as_ref(), json)?;
            if !json {
                match project.repo_url().await {
                    Ok(Some(url)) => println!("Repository:     {url}"),
                    Ok(None) => {}
                    Err(e) => warn!(project = %project.id, error = %e, "integration lookup failed"),
                }
            }
            Ok(())
        }
        GetEntity::Issue => {
            let org = require_org(org, "issue")?;
            let issue = Issue::get(session, OrgScopedId::new(org, id)).await?;
            output_single(issue.as_ref(), json)
        }
        GetEntity::Policy => {
            let org = require_org(org, "policy")?;
            let policy = Policy::get(session, OrgScopedId::new(org, id)).await?;
            output_single(policy.as_ref(), json)
        }
        GetEntity::Asset => {
            let group = Group::get_or_discover(session, group).await?;
            let asset = Asset::get(session, GroupScopedId::new(&group.id, id)).await?;
            output_single(asset.as_ref(), json)
        }
    }
}

struct ListScope {
    group: Option<String>,
    org: Option<String>,
    project: Option<String>,
    purl: Option<String>,
    filters: Vec<(String, String)>,
    query: Option<String>,
}

async fn handle_list(
    session: &Session,
    entity: ListEntity,
    scope: ListScope,
    json: bool,
) -> snyker::Result<()> {
    match entity {
        ListEntity::Orgs => {
            let group = Group::get_or_discover(session, scope.group).await?;
            let orgs = group.organizations().resolve().await?;
            output_list(orgs.as_slice(), json, |o| OrgRow::from(o))
        }
        ListEntity::Projects => {
            let projects = match scope.org {
                Some(org) => Organization::get(session, org)
                    .await?
                    .projects()
                    .resolve()
                    .await?
                    .to_vec(),
                None => {
                    Group::get_or_discover(session, scope.group)
                        .await?
                        .projects()
                        .await?
                }
            };
            output_list(&projects, json, |p| ProjectRow::from(p))
        }
        ListEntity::Issues => {
            let issues = list_issues(session, scope).await?;
            output_list(&issues, json, |i| IssueRow::from(i))
        }
        ListEntity::Policies => {
            let org = require_org(scope.org, "policies")?;
            let policies = Organization::get(session, org)
                .await?
                .policies()
                .resolve()
                .await?;
            output_list(policies.as_slice(), json, |p| PolicyRow::from(p))
        }
        ListEntity::Assets => {
            let query = scope.query.ok_or_else(|| {
                SnykError::Config("--query is required when listing assets".to_string())
            })?;
            let query: serde_json::Value = serde_json::from_str(&query)?;
            let group = Group::get_or_discover(session, scope.group).await?;
            let assets = group.assets(query).resolve().await?;
            output_list(assets.as_slice(), json, |a| AssetRow::from(a))
        }
    }
}

async fn list_issues(session: &Session, scope: ListScope) -> snyker::Result<Vec<Arc<Issue>>> {
    let narrowed = scope.project.is_some() || scope.purl.is_some() || !scope.filters.is_empty();

    let Some(org_id) = scope.org else {
        if narrowed {
            return Err(SnykError::Config(
                "--org is required with --project, --purl or --filter".to_string(),
            ));
        }
        let group = Group::get_or_discover(session, scope.group).await?;
        return Ok(group.issues().resolve().await?.to_vec());
    };

    let org = Organization::get(session, org_id).await?;
    let issues = if let Some(project_id) = scope.project {
        org.project(&project_id).await?.issues().resolve().await?
    } else if let Some(purl) = scope.purl {
        let purl: PackageUrl = purl.parse()?;
        org.issues_for_purl(&purl).resolve().await?
    } else if !scope.filters.is_empty() {
        org.issues_matching(scope.filters).resolve().await?
    } else {
        org.issues().resolve().await?
    };
    Ok(issues.to_vec())
}

fn require_org(org: Option<String>, what: &str) -> snyker::Result<String> {
    org.ok_or_else(|| SnykError::Config(format!("--org is required for {what}")))
}

fn output_single<T: Serialize + PrettyPrint>(item: &T, json: bool) -> snyker::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(item)?);
    } else {
        println!("{}", item.pretty_print());
    }
    Ok(())
}

fn output_list<T, R, F>(items: &[Arc<T>], json: bool, to_row: F) -> snyker::Result<()>
where
    T: Serialize,
    R: Tabled,
    F: Fn(&T) -> R,
{
    if json {
        let items: Vec<&T> = items.iter().map(Arc::as_ref).collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        let rows: Vec<R> = items.iter().map(|item| to_row(item)).collect();
        println!("{}", Table::new(rows));
        println!("\n{} total", items.len());
    }
    Ok(())
}

// Table row types for non-JSON output

#[derive(Tabled)]
struct OrgRow {
    id: String,
    name: String,
    slug: String,
}

impl From<&Organization> for OrgRow {
    fn from(o: &Organization) -> Self {
        Self {
            id: o.id.clone(),
            name: o.name().to_string(),
            slug: o.slug().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Tabled)]
struct ProjectRow {
    id: String,
    name: String,
    #[tabled(rename = "type")]
    project_type: String,
    origin: String,
}

impl From<&Project> for ProjectRow {
    fn from(p: &Project) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name().to_string(),
            project_type: p.attributes.project_type.clone().unwrap_or_default(),
            origin: p.origin().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Tabled)]
struct IssueRow {
    id: String,
    title: String,
    severity: String,
    status: String,
}

impl From<&Issue> for IssueRow {
    fn from(i: &Issue) -> Self {
        Self {
            id: i.id.clone(),
            title: i.title().to_string(),
            severity: i.severity().unwrap_or_default().to_string(),
            status: i.status().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Tabled)]
struct PolicyRow {
    id: String,
    name: String,
    action: String,
    reason: String,
}

impl From<&Policy> for PolicyRow {
    fn from(p: &Policy) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name().unwrap_or_default().to_string(),
            action: p.attributes.action_type.clone().unwrap_or_default(),
            reason: p.reason().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Tabled)]
struct AssetRow {
    id: String,
    name: String,
    #[tabled(rename = "type")]
    asset_type: String,
    criticality: String,
}

impl From<&Asset> for AssetRow {
    fn from(a: &Asset) -> Self {
        Self {
            id: a.id.clone(),
            name: a.name().to_string(),
            asset_type: a.asset_type.clone(),
            criticality: a.business_criticality().unwrap_or_default().to_string(),
        }
    }
}
