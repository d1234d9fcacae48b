pub mod decoder;
pub mod encoder;
pub mod fs_seg;
