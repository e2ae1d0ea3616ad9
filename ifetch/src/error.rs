mod item;
mod policy;

pub use item::*;
pub use policy::*;
