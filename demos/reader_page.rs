//! Example loading a docs page and the GitHub repository behind it.
//!
//! Run against a local docs backend with:
//! ```
//! GITHUB_TOKEN=ghp_xxxxxxxxxxxx cargo run --example reader_page -- /docs/default/Component/my-service
//! ```

use integrations_portal::techdocs::{compose, LayoutOptions, PageView, RouteParams};
use integrations_portal::{
    EntityContext, EnvScmAuth, GithubClientFactory, Metrics, PortalConfig, ReaderStateController,
    ScmGithubOctokitApi, TechDocsClient, TechDocsPageHost,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Subset of the repository resource.
#[derive(Debug, Deserialize)]
struct Repository {
    full_name: String,
    default_branch: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let location = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/docs/default/Component/my-service".to_string());

    let config = PortalConfig::builder()
        .techdocs_base_url(
            std::env::var("TECHDOCS_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:7007/api/techdocs".to_string()),
        )
        .timeout(Duration::from_secs(60))
        .build()?;

    let metrics = Arc::new(Metrics::new());
    let docs = Arc::new(TechDocsClient::new(&config)?);
    let reader = ReaderStateController::new(docs.clone(), metrics.clone());
    let mut host = TechDocsPageHost::new(docs, reader, metrics.clone());

    println!("=== Docs page ===");
    let page = host.navigate(RouteParams::parse(&location)?);
    let context = tokio::time::timeout(
        Duration::from_secs(30),
        page.wait_for(|ctx| ctx.entity_metadata.is_settled() && !ctx.is_loading()),
    )
    .await?;
    let reader_state = host.reader().wait_for(|state| state.status().is_settled()).await;

    match compose(&context, &reader_state, LayoutOptions::default()) {
        PageView::NotFound { message } => {
            println!("Not found: {}", message);
            return Ok(());
        }
        PageView::Page(body) => {
            if let Some(header) = body.header {
                println!("{} ({})", header.title, header.subtitle);
                for label in header.labels {
                    println!("  {}: {}", label.label, label.value);
                }
            }
            if let Some(status) = body.status {
                println!("Status: {:?} {}", status.status, status.message.unwrap_or_default());
            }
            if let Some(advisory) = body.advisory {
                println!("Note: {}", advisory);
            }
            println!("Content: {} bytes", body.content.map(|c| c.len()).unwrap_or(0));
        }
    }

    println!("\n=== Source repository ===");
    let octokit = ScmGithubOctokitApi::new(config, Arc::new(EnvScmAuth::from_github_token()))?;
    let factory = GithubClientFactory::with_metrics(Arc::new(octokit), metrics.clone());

    let current = match context.entity_metadata() {
        Some(metadata) => EntityContext::Loaded(metadata.entity.clone()),
        None => EntityContext::Absent,
    };
    match factory.resolve_rest_for_entity(&current, ["repo"]).await {
        Ok(resolved) => {
            let path = format!("/repos/{}", resolved.owner_repo);
            let repo: Repository = resolved.client.get(&path).await?;
            println!("{} (default branch {})", repo.full_name, repo.default_branch);
        }
        Err(e) => println!("No GitHub client: {}", e),
    }

    println!("\n=== Metrics ===");
    println!("{:?}", metrics.snapshot());

    host.close();
    Ok(())
}
