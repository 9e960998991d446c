/// Backend selected when no setting overrides it.
pub const DEFAULT_BACKEND: &str = "ffmpeg";

/// Packets buffered between the dispatch path and a backend worker
/// before new packets are dropped.
pub const PACKET_QUEUE_CAPACITY: usize = 512;

pub const SETTINGS_DIR_NAME: &str = "multisink";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
