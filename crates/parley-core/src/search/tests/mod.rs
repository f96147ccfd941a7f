mod config_tests;
mod event_order_tests;
