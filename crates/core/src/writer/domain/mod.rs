pub mod media_writer;
pub mod packet_queue;
pub mod writer_event;
