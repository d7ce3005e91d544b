pub mod fixtures;

#[cfg(test)]
mod notification_list_tests;
#[cfg(test)]
mod webhook_fulfillment_tests;
