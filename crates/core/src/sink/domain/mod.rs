pub mod backend_catalog;
pub mod sink_state;
pub mod stream_registry;
