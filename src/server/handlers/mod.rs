// API 处理器

pub mod backup;

pub use backup::*;
