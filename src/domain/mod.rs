pub mod compiler;
pub mod models;
pub mod policy;
pub mod records;
pub mod scoring;
pub mod window;
