//! turnwise: multi-turn LLM orchestration.
//!
//! Drives a conversation with a model provider through tool calls until the
//! model answers, with retries for transient failures and a streaming variant
//! that multiplexes text, tool-call fragments and retry attempts into one
//! ordered chunk sequence.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use turnwise::prelude::*;
//! use turnwise::provider::openai_responses::OpenAiResponsesAdapter;
//!
//! # async fn example() -> turnwise::error::Result<()> {
//! let config = TurnwiseConfig::load()?;
//! let adapter = OpenAiResponsesAdapter::from_config(&config)?;
//!
//! let tools = ToolSet::new().with_tool(FunctionTool::new(
//!     "weather",
//!     "Current weather for a city",
//!     ToolParameters::object().string("city", "City name", true).build(),
//!     |args, _ctx| async move { Ok(serde_json::json!({ "city": args.get_str("city")?, "temp_c": 21 })) },
//! ));
//!
//! let options = OperateOptions::builder()
//!     .model("gpt-4.1")
//!     .input(vec![HistoryItem::user("What's the weather in Oslo?")])
//!     .tools(Arc::new(tools))
//!     .build()
//!     .with_config(&config);
//!
//! let response = operate(&adapter, options).await?;
//! println!("{:?}", response.text());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod generation;
pub mod hooks;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod types;
pub mod util;
