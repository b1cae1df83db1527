pub mod issuance;
pub mod ledger;
