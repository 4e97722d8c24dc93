pub mod import;
pub mod ps;
pub mod pull;
pub mod serve;
