pub mod batch;
pub mod sitsitem;
