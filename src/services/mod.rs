pub mod llm;
pub mod report;
pub mod response;
