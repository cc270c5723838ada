pub mod report;
pub mod smf;
