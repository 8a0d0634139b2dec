pub mod compositor;
pub mod filter_type;
pub mod frame_filter;
