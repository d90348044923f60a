pub mod decision;
pub mod driver;
