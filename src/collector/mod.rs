mod cache;
mod extract;
mod fetcher;
mod normalize;
mod pipeline;

pub use pipeline::Collector;
