mod audit;
mod message;
mod outcome;
mod reading;
mod repository;
mod result;

pub use audit::*;
pub use message::*;
pub use outcome::*;
pub use reading::*;
pub use repository::*;
pub use result::*;
