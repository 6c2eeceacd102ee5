pub mod logging;
pub mod text;

pub use text::{extract_key_requirements, strip_html};
