use market_research_orchestrator::config::AppConfig;
use market_research_orchestrator::Coordinator;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    info!("Market Research Orchestrator starting");

    let config = AppConfig::from_env()?;
    config.require_broker_credentials()?;

    let coordinator = Coordinator::from_config(&config)?;

    let request = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "show me the volume surge ranking for today".to_string());

    info!(request = %request, "Running coordinator");

    match coordinator.run(&request).await {
        Ok(report) => {
            println!("\n=== RESEARCH REPORT ===");
            println!("Report ID: {}", report.report_id);
            println!("Domain: {}", report.domain);
            if let Some(trend) = &report.trend {
                println!(
                    "Trend: {:?} ({:.1} recent vs {:.1} yearly)",
                    trend.direction, trend.recent_avg, trend.yearly_avg
                );
            }
            println!("\nFindings:");
            for (i, section) in report.findings.iter().enumerate() {
                println!("  {}: {}", i + 1, section.title);
            }
            if !report.sources.is_empty() {
                println!("\nSources:");
                for source in &report.sources {
                    println!("  - {} ({})", source.title, source.url);
                }
            }
            if !report.partial_failures.is_empty() {
                println!("\nPartial failures:");
                for failure in &report.partial_failures {
                    println!(
                        "  - [{}] {} ({})",
                        failure.kind,
                        failure.message,
                        failure.endpoint.as_deref().unwrap_or("-")
                    );
                }
            }
            println!("\nConclusion: {}", report.conclusion);
            Ok(())
        }
        Err(e) => {
            eprintln!("Research failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
