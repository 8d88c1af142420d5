pub mod http;
pub mod uri;
