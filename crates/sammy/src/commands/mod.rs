pub mod devices;
pub mod flash;
pub mod info;
pub mod pit;
