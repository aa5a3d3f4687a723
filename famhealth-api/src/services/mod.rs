/// Services used by route handlers
///
/// - `ai`: chat-completions client (plain, streaming, OCR)
/// - `prompts`: prompt text and builders
/// - `storage`: uploaded file storage
/// - `audit`: background audit log writes
/// - `health_context`: member data gathered for advice and chat

pub mod ai;
pub mod audit;
pub mod health_context;
pub mod prompts;
pub mod storage;
