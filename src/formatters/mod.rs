pub mod chains;
pub mod summary;

pub use chains::ChainFormatter;
pub use summary::SummaryFormatter;
