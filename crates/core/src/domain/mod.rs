pub mod assessment;
pub mod consent;
pub mod rights;
