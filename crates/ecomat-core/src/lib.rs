pub mod material;
pub mod parts;
pub mod range;
pub mod similarity;
pub mod sustainability;

pub use material::*;
pub use parts::*;
pub use range::*;
pub use similarity::*;
pub use sustainability::*;
