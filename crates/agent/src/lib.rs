pub mod coordinator;
pub mod events;
pub mod history;
pub mod request;
pub mod runtime;
pub mod setup;
pub mod thinking;

pub use coordinator::PendingToolCalls;
pub use events::{ChatEvent, EventName, EventSink, JsonLinesSink};
pub use history::{backfill_tool_names, display_chat};
pub use runtime::{ChatOrchestrator, TurnRequest, TurnSummary};
pub use setup::TurnTools;
pub use thinking::{ChunkKind, ThinkingTimer};
