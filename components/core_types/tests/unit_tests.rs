//! Integration test runner for unit tests
//! This file makes cargo test discover the unit test modules

#[path = "unit/test_ids.rs"]
mod test_ids;

#[path = "unit/test_method.rs"]
mod test_method;

#[path = "unit/test_profile.rs"]
mod test_profile;

#[path = "contracts/test_contract_compliance.rs"]
mod test_contract_compliance;
