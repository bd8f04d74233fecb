pub mod demucs;
pub mod http;
pub mod registry;
pub mod storage;
