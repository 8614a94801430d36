pub mod availability;
pub mod dataselect;
pub mod station;
pub mod wfcatalog;
