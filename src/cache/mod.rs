pub mod token;
pub mod token_record;
pub mod token_store;
pub mod visitor_ledger;
