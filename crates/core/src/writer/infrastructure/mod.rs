#[cfg(test)]
pub mod fake_container;
pub mod ffmpeg_container;
pub mod format_table;
pub mod muxing_writer;
pub mod native_container;
pub mod packet_worker;
pub mod writer_factory;
