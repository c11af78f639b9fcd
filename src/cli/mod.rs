//! CLI argument parsing types.
//!
//! This module provides the command-line interface structure for the snyker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Snyk API command-line interface.
#[derive(Parser, Debug)]
#[command(name = "snyker", about = "Snyk API CLI", version)]
pub struct Cli {
    /// Output results as JSON instead of a table.
    #[arg(long, global = true, default_value = "false")]
    pub json: bool,

    /// Log at debug level regardless of the configured level.
    #[arg(short, long, global = true, default_value = "false")]
    pub verbose: bool,

    /// TOML file with an `[api_client]` table.
    #[arg(long, global = true, env = "SNYKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Group to operate in. Discovered from the token when omitted.
    #[arg(long, global = true, env = "SNYK_GROUP_ID")]
    pub group: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the group.
    Group,

    /// List entities, scoped by the given filters.
    List {
        /// The type of entity to list.
        entity: ListEntity,

        /// Organization ID (required for policies; narrows projects and issues).
        #[arg(long)]
        org: Option<String>,

        /// Project ID (narrows issues; requires --org).
        #[arg(long)]
        project: Option<String>,

        /// Package URL, e.g. pkg:npm/lodash@4.17.21 (narrows issues; requires --org).
        #[arg(long)]
        purl: Option<String>,

        /// Issue query parameter as KEY=VALUE; repeatable (requires --org).
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Asset search body as JSON (required for assets).
        #[arg(long)]
        query: Option<String>,
    },

    /// Get a single entity by ID.
    Get {
        /// The type of entity to get.
        entity: GetEntity,

        /// The entity ID.
        id: String,

        /// Organization ID (required for projects, issues and policies).
        #[arg(long)]
        org: Option<String>,
    },
}

/// Entity types that can be listed.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListEntity {
    /// Organizations in the group.
    #[value(alias = "organizations")]
    Orgs,
    /// Projects.
    Projects,
    /// Issues.
    Issues,
    /// Organization policies.
    Policies,
    /// Inventory assets.
    Assets,
}

/// Entity types that can be fetched by ID.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GetEntity {
    /// An organization.
    #[value(alias = "organization")]
    Org,
    /// A project.
    Project,
    /// An issue.
    Issue,
    /// A policy.
    Policy,
    /// An inventory asset.
    Asset,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}
