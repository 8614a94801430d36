pub mod fdsn;

pub use fdsn::{client_accepts_gzip, format_for_path, parse_get, parse_post};
