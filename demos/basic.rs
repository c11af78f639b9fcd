//! Basic example walking the Snyk entity graph.
//!
//! Run with:
//! ```
//! SNYK_TOKEN=your-token cargo run --example basic
//! ```

use snyker::{Group, Session};

#[tokio::main]
async fn main() -> snyker::Result<()> {
    // Initialize tracing for debugging (optional)
    tracing_subscriber::fmt::init();

    // Create a session from environment variables
    println!("Creating Snyk session...");
    let session = Session::from_env()?;
    println!("Connected to: {}", session.client().base_url());

    // Find the group the token is scoped to
    let group = Group::discover(&session).await?;
    println!("\n--- Group: {} ({}) ---", group.name(), group.id);

    // Organizations are fetched on first resolve and cached afterwards
    let orgs = group.organizations().resolve().await?;
    println!("Found {} organizations", orgs.len());

    for org in orgs.iter().take(5) {
        let projects = org.projects().resolve().await?;
        println!("  - {} ({} projects)", org.name(), projects.len());

        for project in projects.iter().take(3) {
            let url = project.repo_url().await?.unwrap_or_else(|| "-".to_string());
            println!("      {} [{}]", project.name(), url);
        }
    }

    // Issues per project for the first organization, fetched concurrently
    if let Some(org) = orgs.first() {
        println!("\n--- Issues by project in {} ---", org.name());
        for (project, issues) in org.issues_by_project().await? {
            let critical = issues
                .iter()
                .filter(|i| i.severity() == Some("critical"))
                .count();
            println!(
                "  {}: {} issues ({} critical)",
                project.name(),
                issues.len(),
                critical
            );
        }
    }

    session.close();
    Ok(())
}
