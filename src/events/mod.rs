//! Agent event translation: batched, streaming, and the helpers both share.

pub mod aggregator;
pub mod partial_json;
pub mod tool_kind;
pub mod tool_state;
pub mod translator;

pub use aggregator::TokenStreamAggregator;
pub use partial_json::PartialDocument;
pub use tool_state::ToolCallStreamState;
pub use translator::EventTranslator;
