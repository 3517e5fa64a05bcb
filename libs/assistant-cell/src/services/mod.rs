pub mod advice;
pub mod gemini;
pub mod orchestrator;
pub mod prompt;
pub mod tools;

pub use gemini::{ConversationModel, GeminiClient};
pub use orchestrator::BookingOrchestrator;
pub use tools::{BookingTool, ToolExecutor};
