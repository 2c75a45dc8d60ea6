pub mod files;
pub mod frames;

pub use files::{
    ActionRequest, ActionResponse, ExportResponse, FileResponse, FileStatusResponse,
    StatusMessageResponse, TagsResponse,
};
pub use frames::{InboundFrame, OutboundFrame, RagContextItem, RagMetadata};
