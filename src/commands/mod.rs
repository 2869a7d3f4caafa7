pub mod boot;
pub mod plan;
