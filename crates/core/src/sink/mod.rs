pub mod domain;
pub mod multi_sink_engine;
pub mod sink_input;
pub mod sink_settings;
