
#[cfg(test)]
mod issuance_tests;
