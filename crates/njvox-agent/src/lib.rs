pub mod adapter;
pub mod cache;
pub mod providers;
pub mod runtime;
pub mod stream;
pub mod tools;

pub use adapter::{AgentAdapter, AssistantOutcome, LlmRuntime, RuntimeError, ToolInvoker, TurnMessage};
pub use cache::AgentInstanceCache;
pub use runtime::AnthropicRuntime;
pub use providers::{centroid_fallback, DocumentMeta, DocumentService, GeocodeProvider, GeocodeResult, WebSearchProvider, WebSearchResult};
pub use stream::{RawChunk, StreamExtractor};
pub use tools::{
    AgentTool, DocOp, DocTool, EnrichBatchTool, EnrichOneTool, GeocodeTool, SaveListTool, ToolOutcome,
    ToolSpec, WarehouseSelectTool, WebSearchTool,
};
