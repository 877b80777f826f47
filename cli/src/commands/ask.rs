use anyhow::Result;
use colored::Colorize;
use ponder_core::{
    log_stats, topics, EvolutionHarvester, HeuristicEvaluator, MctsConfig, MctsEngine,
    MessageBus, MessageBusConfig, Orchestrator, PonderConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::generator::ScriptedGenerator;

pub async fn execute(
    config: &PonderConfig,
    query: &str,
    iterations: Option<usize>,
    json_output: bool,
) -> Result<()> {
    let bus = MessageBus::new(MessageBusConfig::from(&config.bus));

    let mut mcts_config = MctsConfig::from(&config.engine);
    if let Some(n) = iterations {
        mcts_config.max_iterations = n;
    }
    info!(
        "Searching with {} iterations (c = {:.3})",
        mcts_config.max_iterations, mcts_config.exploration_weight
    );

    let engine = MctsEngine::new(
        Arc::new(ScriptedGenerator::new()),
        Arc::new(HeuristicEvaluator::new()),
    )
    .with_config(mcts_config);

    let _orchestrator = Orchestrator::attach(&bus, Arc::new(engine));
    let (harvester, _) = EvolutionHarvester::attach(&bus, config.harvest.batch_size);

    let response = bus
        .request(topics::QUERY_SUBMIT, json!({ "text": query }))
        .await?;

    debug!(
        "Harvester holds {} gem(s) toward generation {}",
        harvester.pending().len(),
        harvester.generation() + 1
    );

    if json_output {
        println!(
            "{}",
            serde_json::to_string_pretty(&Value::Object(response.content.clone()))?
        );
    } else {
        print_response(&response.content);
    }

    log_stats(&bus);
    Ok(())
}

fn print_response(content: &serde_json::Map<String, Value>) {
    let query = content.get("query").and_then(Value::as_str).unwrap_or_default();
    println!("\n{} {}", "Query:".bold(), query);

    let steps: Vec<&str> = content
        .get("thought_trace")
        .and_then(Value::as_array)
        .map(|steps| steps.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    if steps.is_empty() {
        println!("{}", "No reasoning steps.".yellow());
    } else {
        println!("\n{}", "Reasoning".green().bold());
        println!("{}", "─".repeat(60).dimmed());
        for (i, step) in steps.iter().enumerate() {
            println!("  {} {}", format!("{:>2}.", i + 1).cyan(), step);
        }
        println!("{}", "─".repeat(60).dimmed());
    }

    if let Some(score) = content.get("path_score").and_then(Value::as_f64) {
        println!("{} {:.3}", "Path score:".dimmed(), score);
    }

    let answer = content.get("answer").and_then(Value::as_str).unwrap_or_default();
    println!("\n{}\n{}", "Answer".green().bold(), answer);
}
