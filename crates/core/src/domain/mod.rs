pub mod customer;
pub mod order;
pub mod profile;
pub mod query;
pub mod recommendation;
