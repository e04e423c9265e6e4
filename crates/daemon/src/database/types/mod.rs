mod dbool;
mod dlocator;
mod dtimestamp;
mod duuid;

pub use dbool::DBool;
pub use dlocator::DLocator;
pub use dtimestamp::DTimestamp;
pub use duuid::DUuid;
