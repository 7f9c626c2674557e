pub mod device;
pub mod pass;
pub mod sample;
pub mod severity;
pub mod status;
