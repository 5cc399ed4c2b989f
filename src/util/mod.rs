mod arena;
mod comparator;
mod status;

pub use arena::Arena;
pub use comparator::{BytewiseComparator, Comparator};
pub use status::{Code, Result, Status};
