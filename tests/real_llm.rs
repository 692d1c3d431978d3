//! Workflow run against a real hosted model.
//!
//! Run with `cargo test --features real_llm --test real_llm` and
//! `OPENAI_API_KEY` set.

#![cfg(feature = "real_llm")]

mod common;

use chunkflow::agent::catalog;
use chunkflow::workflow::{RunStatus, WorkflowConfig};
use chunkflow::{Agent, ChatModel, SessionKey, Settings};
use common::{write_keyword_xlsx, TestEnv};
use std::sync::Arc;

#[tokio::test]
async fn herbalism_keywords_round_trip() {
    let settings = Settings::load(None).expect("settings");
    let client = settings.chat_client().expect("client");
    if !client.is_available().await {
        eprintln!("OPENAI_API_KEY not set, skipping");
        return;
    }

    let env = TestEnv::new();
    let input = env.fixture("herbs.xlsx");
    write_keyword_xlsx(
        &input,
        &[
            ("chamomile", "beginners"),
            ("ashwagandha", "intermediates"),
            ("xyz123", "general"),
        ],
    );
    let agent = Agent::new(&catalog::KEYWORD_ANALYSIS, settings.model.default_model.clone(), Arc::new(client));

    let report = env
        .runner
        .process_file(&SessionKey::generate(), None, &input, &agent, WorkflowConfig::default())
        .await
        .expect("workflow run");

    println!("{}", report.summary.message);
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.stats.chunks_read, 1);
    assert_eq!(report.stats.chunks_failed, 0, "model call failed: {:?}", report.outputs);
}
