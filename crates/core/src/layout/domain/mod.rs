pub mod layout_tracker;
pub mod region_calculator;
