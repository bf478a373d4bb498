pub mod aggregator;
pub mod id_format;
pub mod manifest;
pub mod normalize;
pub mod registry;
pub mod url_builder;
