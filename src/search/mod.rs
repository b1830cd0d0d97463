pub mod bm25;
pub mod engine;
pub mod filter;
pub mod hybrid;
pub mod passages;
pub mod vector;
