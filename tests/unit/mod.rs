mod box_office_tests;
mod concurrency_tests;
mod config_tests;
mod stats_tests;
