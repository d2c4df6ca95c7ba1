// src/api/handlers/mod.rs
mod health;
mod sessions;
pub mod ws;

pub use health::health_check;
pub use sessions::{
    close_session, create_session, download_artifact, error_response, get_session, reveal_report, select_file, submit,
    update_options, AttachmentSink,
};
pub use ws::{ws_handler, SessionUpdate, WsBroker};
