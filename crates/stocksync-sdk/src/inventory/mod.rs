//! 库存映射与分页提交

pub mod line_item;
pub mod mapper;
pub mod updater;

pub use line_item::LineItem;
pub use mapper::{IdentifierFn, IdentifierStrategy, LineItemMapper};
pub use updater::{AbortedRun, CatalogInventoryUpdater, RunAggregate, UpdaterOptions};
