//! Demo: a week-old report says inflation is 2.0%, today's news says 5.0%.
//! Runs trend analysis over an in-memory store. Without an LLM key the echo
//! client prints the prompt the model would have received.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Local};
use econ_insight_agent::config::AppConfig;
use econ_insight_agent::llm::{build_client, DynLlm, MockLlm};
use econ_insight_agent::prompts::PromptTemplates;
use econ_insight_agent::store::{Chunk, EvidenceGateway, InMemoryStore};
use econ_insight_agent::trend::TrendAnalyzer;

const OLD_REPORT: &str = "## Market Report (7 Days Ago)
## Major Developments
- Inflation is currently stable at 2.0%.
- The Bank of England is considering cutting rates.
- Tech stocks are flat.";

const NEW_NEWS: &str = "BREAKING: Inflation jumps unexpectedly to 5.0% due to energy crisis.
Bank of England actively discussing emergency rate hikes.
Tech stocks plummet as investors panic.";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    econ_insight_agent::init_tracing();

    let now = Local::now();
    let past = now - Duration::days(7);

    let mut report = Chunk::report(OLD_REPORT, past.timestamp());
    report.metadata.title = "Old Market Report".to_string();
    let news = Chunk::news(NEW_NEWS, "Inflation Spike News", None, Some(now.timestamp()));

    println!("--- 1. SETTING UP IN-MEMORY STORE ---");
    println!("Injecting 'Old Report' (timestamp: {})", report.timestamp());
    println!("Injecting 'New News' (timestamp: {})", news.timestamp());
    let gateway = EvidenceGateway::new(Arc::new(InMemoryStore::with_chunks(vec![report, news])));

    let cfg = AppConfig::load()?;
    let llm: DynLlm = match build_client(&cfg.llm) {
        c if c.is_configured() => c,
        _ => {
            println!("(no LLM credential; echoing the prompt instead)");
            Arc::new(MockLlm::echo())
        }
    };

    println!("\n--- 2. RUNNING TREND ANALYSIS ---");
    println!("Expected: inflation moved from 2.0% to 5.0%.");
    let analyzer = TrendAnalyzer::new(gateway, llm, Arc::new(PromptTemplates::builtin()));
    let started = Instant::now();
    let result = analyzer.analyze_trend(None).await?;

    println!("\n--- 3. RESULT ---");
    println!("{result}");
    println!("\n(analysis took {:.2} seconds)", started.elapsed().as_secs_f64());
    Ok(())
}
