pub mod caps;
pub mod constants;
pub mod error;
pub mod packet;
pub mod params;
