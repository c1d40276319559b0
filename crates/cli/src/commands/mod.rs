pub mod extract;
pub mod serve;
