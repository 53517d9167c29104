pub mod chart;
pub mod controls;
